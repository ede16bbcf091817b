//! # Error Types
//!
//! General error handling for the DWARF index.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! None of these errors is fatal to a debugging session. Cache errors make the
//! index fall back to a rebuild, and unit load errors only remove that unit's
//! names from the index.

use thiserror::Error;

/// Main error type for index operations
///
/// ## Error Categories
///
/// 1. **Cache errors**: CorruptCache, SignatureMismatch, SignatureUnavailable, Encode
/// 2. **Debug info errors**: Dwarf, Object
/// 3. **Query errors**: InvalidPattern
/// 4. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum IndexError
{
    /// A persisted index could not be decoded
    ///
    /// This happens when the cache file is truncated, was written by an
    /// incompatible format version, or was otherwise damaged. The entry is
    /// discarded and the index is rebuilt.
    #[error("Corrupt index cache: {0}")]
    CorruptCache(String),

    /// The persisted index was built from a different version of the object
    ///
    /// Not a corruption: the binary changed since the cache entry was
    /// written. The stale entry is removed and the index is rebuilt.
    #[error("Index cache signature does not match the object file")]
    SignatureMismatch,

    /// No signature can be derived for the object file
    ///
    /// The object has neither a UUID, a modification time, nor readable
    /// contents, so nothing is persisted for it.
    #[error("Object file has no usable cache signature")]
    SignatureUnavailable,

    /// gimli failed to decode part of the debug information
    #[error("{context}: {source}")]
    Dwarf
    {
        /// What was being read when decoding failed
        context: String,
        /// Underlying decoder error
        #[source]
        source: gimli::Error,
    },

    /// The index could not be serialized
    #[error("Failed to encode index: {0}")]
    Encode(#[from] gimli::write::Error),

    /// The object file could not be parsed
    #[error("Object file error: {0}")]
    Object(String),

    /// A lookup pattern is not a valid regular expression
    #[error("Invalid lookup pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// I/O error (reading binaries, cache files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError
{
    /// Wrap a gimli error with a description of the failed operation.
    pub fn dwarf(context: impl Into<String>, source: gimli::Error) -> Self
    {
        IndexError::Dwarf {
            context: context.into(),
            source,
        }
    }

    /// True for errors that only mean "the cache entry cannot be used".
    #[must_use]
    pub fn is_cache_miss(&self) -> bool
    {
        matches!(
            self,
            IndexError::CorruptCache(_) | IndexError::SignatureMismatch | IndexError::SignatureUnavailable
        )
    }
}

/// Required by gimli loaders that are generic over the error type.
impl From<gimli::Error> for IndexError
{
    fn from(source: gimli::Error) -> Self
    {
        IndexError::dwarf("decoding DWARF", source)
    }
}

/// Convenience type alias for `Result<T, IndexError>`
///
/// ```rust
/// use symdex_core::error::IndexResult;
/// fn foo() -> IndexResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type IndexResult<T> = std::result::Result<T, IndexError>;
