//! # symdex-core
//!
//! Manual DWARF name index for debuggers.
//!
//! When a binary has no accelerator table (`.debug_names`, `.apple_names`),
//! or one that only covers some units, name lookups need an index built by
//! walking the debug information itself. This crate provides:
//! - A debug information model with lazily decoded units and split DWARF
//!   resolution (`dwarf`)
//! - A parallel index builder that files functions, types, globals and
//!   namespaces into name categories (`index`)
//! - A versioned on-disk cache for built indexes
//! - A lookup facade that builds or loads the index on first use
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//!
//! use symdex_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let symbols = load_symbol_file("/path/to/binary".as_ref(), &LoadOptions::default())?;
//!     let pool = Arc::new(rayon::ThreadPoolBuilder::new().build()?);
//!     let index = ManualIndex::new(Arc::new(symbols), pool).with_cache(Arc::new(DiskCache::new("/tmp/symdex")));
//!
//!     let _ = index.get_functions(&FunctionLookup::any("main"), None, |die| {
//!         println!("main at {die}");
//!         ControlFlow::Continue(())
//!     });
//!     Ok(())
//! }
//! ```

pub mod dwarf;
pub mod error;
pub mod index;
pub mod prelude;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use error::{IndexError, IndexResult};
pub use index::{IndexSet, ManualIndex, NameIndex};
pub use types::{DieRef, DieSection, UnitSpan};
