//! # Debug Information Model
//!
//! The view of DWARF the index works against: units, their DIEs, split DWARF
//! resolution and the owning object's identity. The index never decodes
//! DWARF itself; [`loader`] fills this model from an object file with
//! `gimli`, and tests build it by hand.

pub mod die;
pub mod loader;
pub mod symbol_file;
pub mod unit;

pub use die::{Attr, AttrValue, Die, DieTree};
pub use loader::{load_symbol_file, LoadOptions, ObjectFileIdentity};
pub use symbol_file::{ObjectIdentity, SymbolFile};
pub use unit::{DebugInfo, DieSource, ScopedExtract, SplitUnit, Unit, UnitHeader, UnitKind};
