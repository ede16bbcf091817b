//! Per-unit classification of DIEs into name categories.

use std::sync::Arc;

use gimli::{constants, DwLang};
use tracing::{debug, trace};

use super::set::IndexSet;
use crate::dwarf::{Die, DieTree, SplitUnit, Unit};
use crate::symbols::ObjcMethodName;
use crate::types::DieRef;

/// Why a unit contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason
{
    /// DWARF 5 skeleton whose split unit could not be found
    MissingSplitUnit,
    /// Pre-DWARF 5 split unit without its `.dwo`, not a module unit
    SkeletonWithoutModule,
    /// The DIEs could not be decoded
    Unreadable,
}

/// Result of classifying one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome
{
    /// The unit itself was indexed
    Indexed,
    /// The unit's split unit(s) were indexed in its place
    IndexedSplit
    {
        /// Number of split units indexed
        units: usize,
    },
    Skipped(SkipReason),
}

/// Attributes of one DIE that matter for classification, gathered in a
/// single pass. Undecodable values leave their field unset.
#[derive(Debug, Default)]
struct EntryAttributes
{
    name: Option<Arc<str>>,
    mangled: Option<Arc<str>>,
    is_declaration: bool,
    has_address: bool,
    has_location_or_const_value: bool,
    /// Target of `DW_AT_specification`
    specification: Option<u64>,
}

impl EntryAttributes
{
    fn scan(die: &Die) -> Self
    {
        let mut attrs = EntryAttributes::default();
        for attr in &die.attrs {
            match attr.name {
                constants::DW_AT_name => attrs.name = attr.value.as_str().cloned(),
                constants::DW_AT_declaration => {
                    attrs.is_declaration = attr.value.as_flag().unwrap_or(false);
                }
                constants::DW_AT_linkage_name | constants::DW_AT_MIPS_linkage_name => {
                    attrs.mangled = attr.value.as_str().cloned();
                }
                constants::DW_AT_low_pc | constants::DW_AT_high_pc | constants::DW_AT_ranges | constants::DW_AT_entry_pc => {
                    attrs.has_address = true;
                }
                constants::DW_AT_location | constants::DW_AT_const_value => {
                    attrs.has_location_or_const_value = true;
                }
                constants::DW_AT_specification => attrs.specification = attr.value.as_reference(),
                _ => {}
            }
        }
        attrs
    }
}

/// The linkage name is worth a separate entry unless it is literally the
/// plain name. Names starting with `_` are always kept since the plain name
/// is not filed as a full name when a linkage name exists.
fn linkage_name_is_distinct(name: &str, mangled: &str) -> bool
{
    mangled.starts_with('_') || name != mangled
}

fn is_objc_language(language: Option<DwLang>) -> bool
{
    matches!(language, Some(constants::DW_LANG_ObjC | constants::DW_LANG_ObjC_plus_plus))
}

/// Walks one unit and files its DIEs into an [`IndexSet`]
///
/// ## Classification rules
///
/// - **Functions** (`subprogram`, `inlined_subroutine`) with an address:
///   Objective-C methods under their class, selector and full names; other
///   methods under `function_methods`; free functions under
///   `function_basenames` and, without a linkage name, `function_fullnames`;
///   linkage names under `function_fullnames`.
/// - **Types**: defining (non-declaration) entries under `types`.
/// - **Namespaces** and imported declarations under `namespaces`.
/// - **Variables** with a location or constant value at file or static scope
///   under `globals`. Before DWARF 5, static data members are `member`
///   declarations inside a class and are treated the same way.
pub struct UnitClassifier<'a>
{
    set: &'a mut IndexSet,
}

impl<'a> UnitClassifier<'a>
{
    pub fn new(set: &'a mut IndexSet) -> Self
    {
        Self { set }
    }

    /// Index one unit, following split DWARF to wherever the real DIEs are.
    pub fn index_unit(&mut self, unit: &Unit) -> UnitOutcome
    {
        trace!(offset = unit.offset(), version = unit.version(), "indexing unit");
        let language = unit.language();

        if unit.dwo_id().is_some() {
            match unit.split_unit() {
                // Package type units are indexed on their own, so only the
                // split compile unit is needed here.
                Some(SplitUnit::Package(split)) => {
                    self.index_dies(split, language.or_else(|| split.language()));
                    return UnitOutcome::IndexedSplit { units: 1 };
                }
                Some(SplitUnit::File(dwo)) => {
                    for split in dwo.units() {
                        self.index_dies(split, language.or_else(|| split.language()));
                    }
                    return UnitOutcome::IndexedSplit { units: dwo.len() };
                }
                None => {
                    // Without its split unit a DWARF 5 skeleton holds nothing
                    // worth indexing.
                    if unit.version() >= 5 && unit.is_skeleton() {
                        debug!(offset = unit.offset(), "skipping skeleton unit without split unit");
                        return UnitOutcome::Skipped(SkipReason::MissingSplitUnit);
                    }
                    // DWARF 4 fission with a missing .dwo, or a -gmodules
                    // pch/pcm. Only the latter starts with a module DIE.
                    if !Self::starts_with_module(unit) {
                        debug!(offset = unit.offset(), "skipping split unit without .dwo");
                        return UnitOutcome::Skipped(SkipReason::SkeletonWithoutModule);
                    }
                }
            }
        }

        if self.index_dies(unit, language) {
            UnitOutcome::Indexed
        } else {
            UnitOutcome::Skipped(SkipReason::Unreadable)
        }
    }

    fn starts_with_module(unit: &Unit) -> bool
    {
        let Ok(dies) = unit.entries() else {
            return false;
        };
        let tree = DieTree::new(&dies);
        tree.first_child(0)
            .and_then(|child| tree.get(child))
            .is_some_and(|die| die.tag == constants::DW_TAG_module)
    }

    /// Returns false when the unit's DIEs could not be read.
    fn index_dies(&mut self, unit: &Unit, language: Option<DwLang>) -> bool
    {
        let dies = match unit.entries() {
            Ok(dies) => dies,
            Err(err) => {
                debug!(offset = unit.offset(), "unable to read unit DIEs: {err}");
                return false;
            }
        };
        let tree = DieTree::new(&dies);
        let objc = is_objc_language(language);

        for (index, die) in dies.iter().enumerate() {
            match die.tag {
                constants::DW_TAG_array_type
                | constants::DW_TAG_base_type
                | constants::DW_TAG_class_type
                | constants::DW_TAG_constant
                | constants::DW_TAG_enumeration_type
                | constants::DW_TAG_inlined_subroutine
                | constants::DW_TAG_namespace
                | constants::DW_TAG_imported_declaration
                | constants::DW_TAG_string_type
                | constants::DW_TAG_structure_type
                | constants::DW_TAG_subprogram
                | constants::DW_TAG_subroutine_type
                | constants::DW_TAG_typedef
                | constants::DW_TAG_union_type
                | constants::DW_TAG_unspecified_type
                | constants::DW_TAG_variable => {}
                // Static const members only use DW_TAG_member before DWARF 5.
                constants::DW_TAG_member if unit.version() < 5 => {}
                _ => continue,
            }

            let attrs = EntryAttributes::scan(die);
            let die_ref = unit.die_ref(die);

            match die.tag {
                constants::DW_TAG_subprogram | constants::DW_TAG_inlined_subroutine => {
                    self.index_function(&tree, index, &attrs, objc, die_ref);
                }
                constants::DW_TAG_array_type
                | constants::DW_TAG_base_type
                | constants::DW_TAG_class_type
                | constants::DW_TAG_constant
                | constants::DW_TAG_enumeration_type
                | constants::DW_TAG_string_type
                | constants::DW_TAG_structure_type
                | constants::DW_TAG_subroutine_type
                | constants::DW_TAG_typedef
                | constants::DW_TAG_union_type
                | constants::DW_TAG_unspecified_type => {
                    if !attrs.is_declaration {
                        if let Some(name) = &attrs.name {
                            self.set.types.insert(name.clone(), die_ref);
                        }
                        if let Some(mangled) = &attrs.mangled {
                            self.set.types.insert(mangled.clone(), die_ref);
                        }
                    }
                }
                constants::DW_TAG_namespace | constants::DW_TAG_imported_declaration => {
                    if let Some(name) = &attrs.name {
                        self.set.namespaces.insert(name.clone(), die_ref);
                    }
                }
                constants::DW_TAG_member => {
                    let parent_is_class = tree.parent(index).is_some_and(|parent| tree.is_struct_union_or_class(parent));
                    if parent_is_class && attrs.is_declaration {
                        self.index_variable(&tree, index, &attrs, die_ref);
                    }
                }
                constants::DW_TAG_variable => self.index_variable(&tree, index, &attrs, die_ref),
                _ => {}
            }
        }
        true
    }

    fn index_function(&mut self, tree: &DieTree<'_>, index: usize, attrs: &EntryAttributes, objc: bool, die_ref: DieRef)
    {
        if !attrs.has_address {
            return;
        }

        if let Some(name) = &attrs.name {
            let mut is_objc_method = false;
            if objc {
                if let Some(method) = ObjcMethodName::parse(name, true) {
                    is_objc_method = true;
                    self.index_objc_method(&method, die_ref);
                }
            }

            let is_method = tree.is_method_via(index, attrs.specification);
            if is_method {
                self.set.function_methods.insert(name.clone(), die_ref);
            } else {
                self.set.function_basenames.insert(name.clone(), die_ref);
            }

            if !is_method && attrs.mangled.is_none() && !is_objc_method {
                self.set.function_fullnames.insert(name.clone(), die_ref);
            }

            if let Some(mangled) = &attrs.mangled {
                if linkage_name_is_distinct(name, mangled) {
                    self.set.function_fullnames.insert(mangled.clone(), die_ref);
                }
            }
        }
    }

    fn index_objc_method(&mut self, method: &ObjcMethodName<'_>, die_ref: DieRef)
    {
        let with_category = method.class_name_with_category();
        let class_name = method.class_name();

        self.set.function_fullnames.insert(method.full_name(), die_ref);
        if !with_category.is_empty() {
            self.set.objc_class_selectors.insert(with_category, die_ref);
        }
        if !class_name.is_empty() && class_name != with_category {
            self.set.objc_class_selectors.insert(class_name, die_ref);
        }
        let selector = method.selector();
        if !selector.is_empty() {
            self.set.function_selectors.insert(selector, die_ref);
        }
        if let Some(without_category) = method.full_name_without_category() {
            self.set.function_fullnames.insert(without_category, die_ref);
        }
    }

    fn index_variable(&mut self, tree: &DieTree<'_>, index: usize, attrs: &EntryAttributes, die_ref: DieRef)
    {
        let Some(name) = &attrs.name else {
            return;
        };
        if !attrs.has_location_or_const_value || !tree.is_global_or_static_scope_variable(index) {
            return;
        }

        self.set.globals.insert(name.clone(), die_ref);
        // A variable "i" may also be known as "_ZN12_GLOBAL__N_11iE".
        if let Some(mangled) = &attrs.mangled {
            if linkage_name_is_distinct(name, mangled) {
                self.set.globals.insert(mangled.clone(), die_ref);
            }
        }
    }
}
