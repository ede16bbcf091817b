//! # Symbol Names
//!
//! Name-level helpers used by the index: splitting Objective-C method names
//! into their parts and presenting mangled names to people.

pub mod demangle;
pub mod objc;

pub use demangle::display_name;
pub use objc::{ObjcMethodKind, ObjcMethodName};
