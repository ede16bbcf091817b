//! Binary cache format of an [`IndexSet`].
//!
//! ```text
//! "SDIX"  u16 version
//! signature        tagged fields, end tag 255
//! string table     u32 count, then uleb128 length + UTF-8 bytes per string
//! categories       u8 tag + name index payload, in IndexKind::ALL order
//! 255              end tag
//! ```
//!
//! Everything is little endian. Names are stored once in the string table
//! and referenced by position from every category.

use std::collections::HashMap;
use std::sync::Arc;

use gimli::write::{EndianVec, Writer};
use gimli::{EndianSlice, LittleEndian, Reader};
use tracing::debug;

use super::name_index::NameIndex;
use super::set::{IndexKind, IndexSet};
use super::signature::CacheSignature;
use crate::dwarf::ObjectIdentity;
use crate::error::{IndexError, IndexResult};

pub const CACHE_MAGIC: [u8; 4] = *b"SDIX";
pub const CACHE_FORMAT_VERSION: u16 = 2;

const TAG_END: u8 = 255;

pub(crate) type CacheWriter = EndianVec<LittleEndian>;
pub(crate) type CacheReader<'a> = EndianSlice<'a, LittleEndian>;

/// Map a short read to a corruption error naming what was being read.
pub(crate) fn corrupt(context: &'static str) -> impl FnOnce(gimli::Error) -> IndexError
{
    move |err| IndexError::CorruptCache(format!("{context}: {err}"))
}

/// Interns names while categories are encoded.
#[derive(Debug, Default)]
pub(crate) struct StringTableWriter
{
    positions: HashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

impl StringTableWriter
{
    pub(crate) fn add(&mut self, name: &Arc<str>) -> u32
    {
        if let Some(&position) = self.positions.get(name) {
            return position;
        }
        // The entry counts of every category are u32, so is the table.
        let position = self.strings.len() as u32;
        self.positions.insert(name.clone(), position);
        self.strings.push(name.clone());
        position
    }

    fn encode(&self, writer: &mut CacheWriter) -> IndexResult<()>
    {
        let count = u32::try_from(self.strings.len())
            .map_err(|_| IndexError::CorruptCache("string table too large to encode".to_string()))?;
        writer.write_u32(count)?;
        for name in &self.strings {
            writer.write_uleb128(name.len() as u64)?;
            writer.write(name.as_bytes())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct StringTableReader
{
    strings: Vec<Arc<str>>,
}

impl StringTableReader
{
    fn decode(reader: &mut CacheReader<'_>) -> IndexResult<Self>
    {
        let count = reader.read_u32().map_err(corrupt("string table count"))?;
        if count as usize > reader.len() {
            return Err(IndexError::CorruptCache(format!(
                "string table claims {count} strings but only {} bytes remain",
                reader.len()
            )));
        }
        let mut strings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = reader.read_uleb128().map_err(corrupt("string length"))?;
            let len = usize::try_from(len)
                .ok()
                .filter(|&len| len <= reader.len())
                .ok_or_else(|| IndexError::CorruptCache(format!("string length {len} exceeds remaining input")))?;
            let bytes = reader.split(len).map_err(corrupt("string table entry"))?;
            let name = std::str::from_utf8(bytes.slice())
                .map_err(|err| IndexError::CorruptCache(format!("string table entry is not UTF-8: {err}")))?;
            strings.push(Arc::from(name));
        }
        Ok(Self { strings })
    }

    pub(crate) fn get(&self, position: u32) -> IndexResult<Arc<str>>
    {
        self.strings.get(position as usize).cloned().ok_or_else(|| {
            IndexError::CorruptCache(format!(
                "string index {position} out of range ({} strings)",
                self.strings.len()
            ))
        })
    }
}

/// Serialize `set` for the object described by `identity`.
///
/// Fails with [`IndexError::SignatureUnavailable`] when the object has no
/// valid signature; an index that cannot be validated is never persisted.
pub fn encode(set: &IndexSet, identity: &dyn ObjectIdentity) -> IndexResult<Vec<u8>>
{
    let signature = identity
        .signature()
        .filter(CacheSignature::is_valid)
        .ok_or(IndexError::SignatureUnavailable)?;

    // Categories go first into their own buffer so the string table is
    // complete by the time it is written.
    let mut strings = StringTableWriter::default();
    let mut body = CacheWriter::new(LittleEndian);
    for kind in IndexKind::ALL {
        body.write_u8(kind.cache_tag())?;
        set.get(kind).encode(&mut body, &mut strings)?;
    }
    body.write_u8(TAG_END)?;

    let mut writer = CacheWriter::new(LittleEndian);
    writer.write(&CACHE_MAGIC)?;
    writer.write_u16(CACHE_FORMAT_VERSION)?;
    signature.encode(&mut writer)?;
    strings.encode(&mut writer)?;
    writer.write(body.slice())?;
    Ok(writer.into_vec())
}

/// Deserialize an index written by [`encode`].
///
/// The stored signature must equal the live signature of `identity`,
/// otherwise [`IndexError::SignatureMismatch`] is returned and the entry
/// should be discarded. Any malformed input yields
/// [`IndexError::CorruptCache`].
pub fn decode(bytes: &[u8], identity: &dyn ObjectIdentity) -> IndexResult<IndexSet>
{
    let mut reader = EndianSlice::new(bytes, LittleEndian);

    let magic = reader.split(CACHE_MAGIC.len()).map_err(corrupt("magic"))?;
    if magic.slice() != CACHE_MAGIC.as_slice() {
        return Err(IndexError::CorruptCache("bad magic".to_string()));
    }
    let version = reader.read_u16().map_err(corrupt("format version"))?;
    if version != CACHE_FORMAT_VERSION {
        return Err(IndexError::CorruptCache(format!("unsupported format version {version}")));
    }

    let stored = CacheSignature::decode(&mut reader)?;
    if identity.signature().as_ref() != Some(&stored) {
        debug!(path = %identity.path().display(), "index cache signature mismatch");
        return Err(IndexError::SignatureMismatch);
    }

    let strings = StringTableReader::decode(&mut reader)?;
    let mut set = IndexSet::default();
    for kind in IndexKind::ALL {
        let tag = reader.read_u8().map_err(corrupt("category tag"))?;
        if tag != kind.cache_tag() {
            return Err(match IndexKind::from_cache_tag(tag) {
                Some(found) => IndexError::CorruptCache(format!("expected {kind}, found {found}")),
                None if tag == TAG_END => IndexError::CorruptCache(format!("missing category {kind}")),
                None => IndexError::CorruptCache(format!("unknown category tag {tag}")),
            });
        }
        *set.get_mut(kind) = NameIndex::decode(&mut reader, &strings)?;
    }
    let end = reader.read_u8().map_err(corrupt("end tag"))?;
    if end != TAG_END {
        return Err(IndexError::CorruptCache(format!("expected end tag, found {end}")));
    }
    Ok(set)
}

/// Store key of an index: module prefix, partial/full and object hash.
pub fn cache_key(identity: &dyn ObjectIdentity, partial: bool) -> String
{
    format!(
        "{}-dwarf-index-{}{:#010x}",
        identity.cache_key_prefix(),
        if partial { "partial-" } else { "full-" },
        identity.cache_hash()
    )
}

#[cfg(test)]
mod tests
{
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::types::{DieRef, DieSection};

    struct FixedIdentity
    {
        signature: Option<CacheSignature>,
        path: PathBuf,
    }

    impl FixedIdentity
    {
        fn with_hash(content_hash: u32) -> Self
        {
            Self {
                signature: Some(CacheSignature {
                    uuid: None,
                    mod_time: Some(1_700_000_000),
                    content_hash: Some(content_hash),
                }),
                path: PathBuf::from("/bin/demo"),
            }
        }
    }

    impl ObjectIdentity for FixedIdentity
    {
        fn cache_key_prefix(&self) -> String
        {
            "demo-1a2b".to_string()
        }

        fn signature(&self) -> Option<CacheSignature>
        {
            self.signature.clone()
        }

        fn cache_hash(&self) -> u32
        {
            0xbeef
        }

        fn architecture(&self) -> &str
        {
            "x86_64"
        }

        fn path(&self) -> &Path
        {
            &self.path
        }
    }

    fn sample_set() -> IndexSet
    {
        let mut set = IndexSet::default();
        set.function_basenames.insert("main", DieRef::new(None, DieSection::DebugInfo, 0x2a));
        set.function_fullnames.insert("_Z3foov", DieRef::new(Some(3), DieSection::DebugInfo, 0x100));
        set.types.insert("Point", DieRef::new(None, DieSection::DebugTypes, 0x4000));
        set.types.insert("main", DieRef::new(None, DieSection::DebugInfo, 0x80));
        set.finalize();
        set
    }

    #[test]
    fn test_round_trip_preserves_every_category()
    {
        let identity = FixedIdentity::with_hash(7);
        let set = sample_set();
        let bytes = encode(&set, &identity).unwrap();
        assert_eq!(&bytes[..4], b"SDIX");
        assert_eq!(decode(&bytes, &identity).unwrap(), set);
    }

    #[test]
    fn test_shared_names_are_stored_once()
    {
        let identity = FixedIdentity::with_hash(7);
        let bytes = encode(&sample_set(), &identity).unwrap();
        let needle = b"\x04main";
        let occurrences = bytes.windows(needle.len()).filter(|window| *window == &needle[..]).count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_names_with_nul_and_non_ascii_round_trip()
    {
        let identity = FixedIdentity::with_hash(7);
        let mut set = IndexSet::default();
        set.globals.insert("a\0b", DieRef::new(None, DieSection::DebugInfo, 0x30));
        set.globals.insert("\0", DieRef::new(None, DieSection::DebugInfo, 0x40));
        set.globals.insert("", DieRef::new(None, DieSection::DebugInfo, 0x50));
        set.types.insert("Grüße", DieRef::new(None, DieSection::DebugInfo, 0x60));
        set.finalize();

        let bytes = encode(&set, &identity).unwrap();
        let decoded = decode(&bytes, &identity).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.globals.names().collect::<Vec<_>>(), vec!["", "\0", "a\0b"]);
    }

    #[test]
    fn test_oversized_string_length_is_corrupt()
    {
        let identity = FixedIdentity::with_hash(7);
        let bytes = encode(&sample_set(), &identity).unwrap();
        let at = bytes.windows(5).position(|window| window == b"\x04main").unwrap();
        let mut damaged = bytes[..at].to_vec();
        damaged.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
        damaged.extend_from_slice(&bytes[at + 1..]);
        assert!(matches!(decode(&damaged, &identity), Err(IndexError::CorruptCache(_))));
    }

    #[test]
    fn test_signature_mismatch_is_reported()
    {
        let bytes = encode(&sample_set(), &FixedIdentity::with_hash(7)).unwrap();
        let err = decode(&bytes, &FixedIdentity::with_hash(8)).unwrap_err();
        assert!(matches!(err, IndexError::SignatureMismatch));
    }

    #[test]
    fn test_missing_signature_refuses_to_encode()
    {
        let identity = FixedIdentity {
            signature: None,
            path: PathBuf::from("/bin/demo"),
        };
        let err = encode(&sample_set(), &identity).unwrap_err();
        assert!(matches!(err, IndexError::SignatureUnavailable));
    }

    #[test]
    fn test_truncated_input_is_corrupt_at_every_length()
    {
        let identity = FixedIdentity::with_hash(7);
        let bytes = encode(&sample_set(), &identity).unwrap();
        for len in 0..bytes.len() {
            let err = decode(&bytes[..len], &identity).unwrap_err();
            assert!(matches!(err, IndexError::CorruptCache(_)), "length {len}: {err}");
        }
    }

    #[test]
    fn test_bad_magic_is_corrupt()
    {
        let identity = FixedIdentity::with_hash(7);
        let mut bytes = encode(&sample_set(), &identity).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes, &identity), Err(IndexError::CorruptCache(_))));
    }

    #[test]
    fn test_cache_key_format()
    {
        let identity = FixedIdentity::with_hash(7);
        assert_eq!(cache_key(&identity, false), "demo-1a2b-dwarf-index-full-0x0000beef");
        assert_eq!(cache_key(&identity, true), "demo-1a2b-dwarf-index-partial-0x0000beef");
    }
}
