//! # Types
//!
//! Small value types shared by the index, the classifier and the loader.

pub mod die_ref;

// Re-export all public types
pub use die_ref::{DieRef, DieSection, UnitSpan};
