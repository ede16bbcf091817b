//! Symbol demangling for display.
//!
//! The index stores linkage names exactly as the compiler emitted them. When
//! showing results to a person we prefer the demangled form of Rust symbols
//! (both the legacy `_ZN` and the v0 `_R` schemes). Other names, including
//! C++ Itanium names that are not Rust, are shown unchanged.

use std::borrow::Cow;

use rustc_demangle::try_demangle;

/// Preferred presentation of a linkage name.
///
/// ## Example
///
/// ```rust
/// use symdex_core::symbols::display_name;
///
/// assert_eq!(display_name("main"), "main");
/// assert_eq!(display_name("_ZN4core3fmt5write17h0123456789abcdefE"), "core::fmt::write");
/// ```
pub fn display_name(raw: &str) -> Cow<'_, str>
{
    match try_demangle(raw) {
        // `{:#}` drops the trailing hash
        Ok(demangled) => Cow::Owned(format!("{demangled:#}")),
        Err(_) => Cow::Borrowed(raw),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_display_name_leaves_plain_names()
    {
        assert_eq!(display_name("foo"), "foo");
        assert_eq!(display_name("-[MyClass doThing:]"), "-[MyClass doThing:]");
    }

    #[test]
    fn test_display_name_leaves_cpp_names()
    {
        assert_eq!(display_name("_Z3foov"), "_Z3foov");
    }
}
