//! Materialized debug information entries.
//!
//! A unit's DIEs are stored as a flat vector in depth-first order. Each entry
//! remembers the index of its parent, which is all the classifier needs to
//! answer structural questions ("is this a method?", "is this variable at
//! file scope?") without re-reading the section.

use std::sync::Arc;

use gimli::{constants, DwAt, DwTag};
use smallvec::SmallVec;

/// Upper bound on `DW_AT_specification` / `DW_AT_abstract_origin` hops.
const MAX_ELABORATION_DEPTH: usize = 32;

/// Decoded value of one attribute
///
/// Only the handful of forms the index cares about are kept. Anything else is
/// recorded as `Present` so that presence-only checks (address ranges,
/// locations) still work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue
{
    /// A string (inline or from a string section)
    String(Arc<str>),
    /// `DW_FORM_flag` / `DW_FORM_flag_present`
    Flag(bool),
    /// Any unsigned constant
    Unsigned(u64),
    /// Reference to another DIE in the same section, as an absolute offset
    Reference(u64),
    /// Attribute exists but its value is not needed
    Present,
    /// The form could not be decoded
    Invalid,
}

impl AttrValue
{
    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&Arc<str>>
    {
        match self {
            AttrValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Interpret as a boolean flag (non-zero constants count as set).
    pub fn as_flag(&self) -> Option<bool>
    {
        match self {
            AttrValue::Flag(value) => Some(*value),
            AttrValue::Unsigned(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// The referenced section offset, if this is a reference.
    pub fn as_reference(&self) -> Option<u64>
    {
        match self {
            AttrValue::Reference(offset) => Some(*offset),
            _ => None,
        }
    }
}

/// One attribute of a DIE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr
{
    pub name: DwAt,
    pub value: AttrValue,
}

/// One debug information entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Die
{
    /// Absolute offset within the unit's section
    pub offset: u64,
    pub tag: DwTag,
    /// Index of the parent entry within the same unit, `None` for the unit DIE
    pub parent: Option<usize>,
    pub attrs: SmallVec<[Attr; 4]>,
}

impl Die
{
    pub fn new(offset: u64, tag: DwTag, parent: Option<usize>) -> Self
    {
        Self {
            offset,
            tag,
            parent,
            attrs: SmallVec::new(),
        }
    }

    /// Builder-style attribute append.
    #[must_use]
    pub fn with_attr(mut self, name: DwAt, value: AttrValue) -> Self
    {
        self.attrs.push(Attr { name, value });
        self
    }

    /// First value recorded for `name`.
    pub fn attr(&self, name: DwAt) -> Option<&AttrValue>
    {
        self.attrs.iter().find(|attr| attr.name == name).map(|attr| &attr.value)
    }
}

/// Read-only view over a unit's DIEs that answers structural questions.
#[derive(Clone, Copy)]
pub struct DieTree<'a>
{
    dies: &'a [Die],
}

impl<'a> DieTree<'a>
{
    pub fn new(dies: &'a [Die]) -> Self
    {
        Self { dies }
    }

    pub fn get(&self, index: usize) -> Option<&'a Die>
    {
        self.dies.get(index)
    }

    pub fn parent(&self, index: usize) -> Option<usize>
    {
        self.dies.get(index).and_then(|die| die.parent)
    }

    /// Children immediately follow their parent in depth-first order.
    pub fn first_child(&self, index: usize) -> Option<usize>
    {
        let child = index.checked_add(1)?;
        match self.dies.get(child) {
            Some(die) if die.parent == Some(index) => Some(child),
            _ => None,
        }
    }

    /// Locate a DIE by its section offset.
    pub fn index_of(&self, offset: u64) -> Option<usize>
    {
        self.dies.binary_search_by_key(&offset, |die| die.offset).ok()
    }

    pub fn is_struct_union_or_class(&self, index: usize) -> bool
    {
        self.dies.get(index).is_some_and(|die| {
            matches!(
                die.tag,
                constants::DW_TAG_structure_type | constants::DW_TAG_union_type | constants::DW_TAG_class_type
            )
        })
    }

    /// A subprogram is a method when it, or any DIE it elaborates through
    /// `DW_AT_specification` / `DW_AT_abstract_origin`, is nested directly in
    /// a class, structure or union.
    pub fn is_method(&self, index: usize) -> bool
    {
        self.is_method_via(index, None)
    }

    /// [`DieTree::is_method`] for a DIE whose `DW_AT_specification` target
    /// was already read. A target outside the unit falls back to the
    /// attributes of the DIE itself.
    pub fn is_method_via(&self, index: usize, specification: Option<u64>) -> bool
    {
        if self.parent(index).is_some_and(|parent| self.is_struct_union_or_class(parent)) {
            return true;
        }
        let mut current = specification
            .and_then(|offset| self.index_of(offset))
            .or_else(|| self.elaborated(index));
        for _ in 1..MAX_ELABORATION_DEPTH {
            let Some(at) = current else {
                return false;
            };
            if self.parent(at).is_some_and(|parent| self.is_struct_union_or_class(parent)) {
                return true;
            }
            current = self.elaborated(at);
        }
        false
    }

    /// Variables (and legacy static members) declared outside any function
    /// body.
    pub fn is_global_or_static_scope_variable(&self, index: usize) -> bool
    {
        let Some(die) = self.dies.get(index) else {
            return false;
        };
        if !matches!(die.tag, constants::DW_TAG_variable | constants::DW_TAG_member) {
            return false;
        }

        let mut parent = die.parent;
        while let Some(ancestor) = parent.and_then(|at| self.dies.get(at)) {
            match ancestor.tag {
                constants::DW_TAG_subprogram | constants::DW_TAG_lexical_block | constants::DW_TAG_inlined_subroutine => {
                    return false;
                }
                constants::DW_TAG_compile_unit
                | constants::DW_TAG_partial_unit
                | constants::DW_TAG_type_unit
                | constants::DW_TAG_skeleton_unit => return true,
                _ => {}
            }
            parent = ancestor.parent;
        }
        false
    }

    fn elaborated(&self, index: usize) -> Option<usize>
    {
        let die = self.dies.get(index)?;
        let target = die
            .attr(constants::DW_AT_specification)
            .or_else(|| die.attr(constants::DW_AT_abstract_origin))
            .and_then(AttrValue::as_reference)?;
        self.index_of(target)
    }
}
