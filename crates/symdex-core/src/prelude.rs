//! Common module for library exports

pub use crate::dwarf::{load_symbol_file, LoadOptions, ObjectIdentity, SymbolFile};
pub use crate::error::{IndexError, IndexResult};
pub use crate::index::{
    DeclContext, DiskCache, FunctionLookup, FunctionNameType, IndexCache, IndexKind, IndexSet, ManualIndex, SkipSets,
};
pub use crate::types::{DieRef, DieSection, UnitSpan};
