//! Lookup requests accepted by [`ManualIndex`](super::ManualIndex).

use std::sync::Arc;

use bitflags::bitflags;
use gimli::DwTag;

bitflags! {
    /// Which function categories a lookup searches.
    ///
    /// Bit values follow the usual debugger encoding so masks can be passed
    /// through unchanged.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FunctionNameType: u32 {
        /// Linkage names and full Objective-C method names
        const FULL = 1 << 1;
        /// Plain names of free functions
        const BASE = 1 << 3;
        /// Plain names of C++ methods
        const METHOD = 1 << 4;
        /// Objective-C selectors
        const SELECTOR = 1 << 5;
    }
}

/// A function name together with the categories to search it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLookup
{
    pub name: Arc<str>,
    pub name_type: FunctionNameType,
}

impl FunctionLookup
{
    pub fn new(name: impl Into<Arc<str>>, name_type: FunctionNameType) -> Self
    {
        Self {
            name: name.into(),
            name_type,
        }
    }

    /// Search every function category.
    pub fn any(name: impl Into<Arc<str>>) -> Self
    {
        Self::new(name, FunctionNameType::all())
    }
}

/// One scope of a declaration context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclContextEntry
{
    pub tag: DwTag,
    pub name: Option<Arc<str>>,
}

/// Chain of scopes of a declaration, innermost first
///
/// `ns::Outer::Inner` is `[Inner (structure), Outer (class), ns (namespace)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclContext
{
    entries: Vec<DeclContextEntry>,
}

impl DeclContext
{
    pub fn new(entries: Vec<DeclContextEntry>) -> Self
    {
        Self { entries }
    }

    /// Add an enclosing scope.
    #[must_use]
    pub fn with_parent(mut self, tag: DwTag, name: impl Into<Arc<str>>) -> Self
    {
        self.entries.push(DeclContextEntry {
            tag,
            name: Some(name.into()),
        });
        self
    }

    pub fn entries(&self) -> &[DeclContextEntry]
    {
        &self.entries
    }

    /// Name of the declaration itself.
    pub fn innermost_name(&self) -> Option<&str>
    {
        self.entries.first()?.name.as_deref()
    }

    /// `::`-joined qualified name, outermost first; anonymous scopes are
    /// skipped.
    pub fn qualified_name(&self) -> String
    {
        let names: Vec<&str> = self.entries.iter().rev().filter_map(|entry| entry.name.as_deref()).collect();
        names.join("::")
    }
}
