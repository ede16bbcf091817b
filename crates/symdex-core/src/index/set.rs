//! The eight name categories of the manual index.

use std::fmt;

use super::name_index::NameIndex;

/// One name category
///
/// The discriminant order is the order categories are stored, merged,
/// dumped and encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind
{
    FunctionBasenames,
    FunctionFullnames,
    FunctionMethods,
    FunctionSelectors,
    ObjcClassSelectors,
    Globals,
    Types,
    Namespaces,
}

impl IndexKind
{
    pub const ALL: [IndexKind; 8] = [
        IndexKind::FunctionBasenames,
        IndexKind::FunctionFullnames,
        IndexKind::FunctionMethods,
        IndexKind::FunctionSelectors,
        IndexKind::ObjcClassSelectors,
        IndexKind::Globals,
        IndexKind::Types,
        IndexKind::Namespaces,
    ];

    /// Tag written in front of the category in cache files.
    pub fn cache_tag(self) -> u8
    {
        match self {
            IndexKind::FunctionBasenames => 1,
            IndexKind::FunctionFullnames => 2,
            IndexKind::FunctionMethods => 3,
            IndexKind::FunctionSelectors => 4,
            IndexKind::ObjcClassSelectors => 5,
            IndexKind::Globals => 6,
            IndexKind::Types => 7,
            IndexKind::Namespaces => 8,
        }
    }

    pub fn from_cache_tag(tag: u8) -> Option<Self>
    {
        IndexKind::ALL.into_iter().find(|kind| kind.cache_tag() == tag)
    }

    /// Section header used by dumps.
    pub fn title(self) -> &'static str
    {
        match self {
            IndexKind::FunctionBasenames => "Function basenames",
            IndexKind::FunctionFullnames => "Function fullnames",
            IndexKind::FunctionMethods => "Function methods",
            IndexKind::FunctionSelectors => "Function selectors",
            IndexKind::ObjcClassSelectors => "Objective-C class selectors",
            IndexKind::Globals => "Globals and statics",
            IndexKind::Types => "Types",
            IndexKind::Namespaces => "Namespaces",
        }
    }
}

impl fmt::Display for IndexKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.title())
    }
}

/// One [`NameIndex`] per category
///
/// A name may appear in several categories (a function is usually filed
/// under both its basename and its linkage name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet
{
    pub function_basenames: NameIndex,
    pub function_fullnames: NameIndex,
    pub function_methods: NameIndex,
    pub function_selectors: NameIndex,
    pub objc_class_selectors: NameIndex,
    pub globals: NameIndex,
    pub types: NameIndex,
    pub namespaces: NameIndex,
}

impl IndexSet
{
    pub fn get(&self, kind: IndexKind) -> &NameIndex
    {
        match kind {
            IndexKind::FunctionBasenames => &self.function_basenames,
            IndexKind::FunctionFullnames => &self.function_fullnames,
            IndexKind::FunctionMethods => &self.function_methods,
            IndexKind::FunctionSelectors => &self.function_selectors,
            IndexKind::ObjcClassSelectors => &self.objc_class_selectors,
            IndexKind::Globals => &self.globals,
            IndexKind::Types => &self.types,
            IndexKind::Namespaces => &self.namespaces,
        }
    }

    pub fn get_mut(&mut self, kind: IndexKind) -> &mut NameIndex
    {
        match kind {
            IndexKind::FunctionBasenames => &mut self.function_basenames,
            IndexKind::FunctionFullnames => &mut self.function_fullnames,
            IndexKind::FunctionMethods => &mut self.function_methods,
            IndexKind::FunctionSelectors => &mut self.function_selectors,
            IndexKind::ObjcClassSelectors => &mut self.objc_class_selectors,
            IndexKind::Globals => &mut self.globals,
            IndexKind::Types => &mut self.types,
            IndexKind::Namespaces => &mut self.namespaces,
        }
    }

    /// Disjoint mutable borrows of every category, in [`IndexKind::ALL`]
    /// order, so they can be merged concurrently.
    pub fn categories_mut(&mut self) -> [(IndexKind, &mut NameIndex); 8]
    {
        let IndexSet {
            function_basenames,
            function_fullnames,
            function_methods,
            function_selectors,
            objc_class_selectors,
            globals,
            types,
            namespaces,
        } = self;
        [
            (IndexKind::FunctionBasenames, function_basenames),
            (IndexKind::FunctionFullnames, function_fullnames),
            (IndexKind::FunctionMethods, function_methods),
            (IndexKind::FunctionSelectors, function_selectors),
            (IndexKind::ObjcClassSelectors, objc_class_selectors),
            (IndexKind::Globals, globals),
            (IndexKind::Types, types),
            (IndexKind::Namespaces, namespaces),
        ]
    }

    /// Finalize every category.
    pub fn finalize(&mut self)
    {
        for (_, index) in self.categories_mut() {
            index.finalize();
        }
    }

    pub fn is_empty(&self) -> bool
    {
        IndexKind::ALL.iter().all(|kind| self.get(*kind).is_empty())
    }

    /// Total entries across all categories.
    pub fn len(&self) -> usize
    {
        IndexKind::ALL.iter().map(|kind| self.get(*kind).len()).sum()
    }
}
