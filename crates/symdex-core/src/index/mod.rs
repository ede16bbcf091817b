//! # Manual Name Index
//!
//! Name lookup for debug info that ships without a usable accelerator table.
//!
//! ## Pipeline
//!
//! 1. [`ParallelIndexBuilder`] collects the units of a [`SymbolFile`](crate::dwarf::SymbolFile)
//!    and materializes their DIEs on a `rayon` pool.
//! 2. [`UnitClassifier`] files every interesting DIE of a unit under one or
//!    more name categories of a per-worker [`IndexSet`].
//! 3. The partial sets are merged per category and finalized.
//! 4. [`codec`] persists the result in an [`IndexCache`], keyed by module,
//!    partial/full and object hash, and validated by a [`CacheSignature`].
//! 5. [`ManualIndex`] runs all of the above on first use and answers lookups.

pub mod builder;
pub mod cache;
pub mod classifier;
pub mod codec;
pub mod manual;
pub mod name_index;
pub mod progress;
pub mod query;
pub mod set;
pub mod signature;

pub use builder::{ParallelIndexBuilder, SkipSets};
pub use cache::{DiskCache, IndexCache, MemoryCache};
pub use classifier::{SkipReason, UnitClassifier, UnitOutcome};
pub use manual::{IndexStats, ManualIndex};
pub use name_index::NameIndex;
pub use progress::{IndexProgress, ProgressObserver, ProgressUpdate, INDEX_PROGRESS_TITLE};
pub use query::{DeclContext, DeclContextEntry, FunctionLookup, FunctionNameType};
pub use set::{IndexKind, IndexSet};
pub use signature::CacheSignature;
