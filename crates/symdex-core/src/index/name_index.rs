//! Name to DIE multi-map.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use gimli::write::Writer;
use gimli::Reader;
use regex::Regex;

use super::codec::{corrupt, CacheReader, CacheWriter, StringTableReader, StringTableWriter};
use crate::error::{IndexError, IndexResult};
use crate::types::{DieRef, DieSection, UnitSpan};

const DIE_REF_HAS_FILE: u8 = 0x01;
const DIE_REF_DEBUG_TYPES: u8 = 0x02;

/// Append-only multi-map from a name to the DIEs registered under it
///
/// Inserts are unconditional. [`NameIndex::finalize`] sorts the entries and
/// drops duplicate `(name, die)` pairs; it must run after the last insert
/// and before lookups for those to be exact and fast.
///
/// ## Example
///
/// ```rust
/// use std::ops::ControlFlow;
///
/// use symdex_core::index::NameIndex;
/// use symdex_core::types::{DieRef, DieSection};
///
/// let die = DieRef::new(None, DieSection::DebugInfo, 0x40);
/// let mut index = NameIndex::default();
/// index.insert("main", die);
/// index.insert("main", die);
/// index.finalize();
///
/// let mut hits = Vec::new();
/// index.find("main", |found| {
///     hits.push(found);
///     ControlFlow::Continue(())
/// });
/// assert_eq!(hits, vec![die]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIndex
{
    entries: Vec<(Arc<str>, DieRef)>,
    finalized: bool,
}

impl NameIndex
{
    pub fn insert(&mut self, name: impl Into<Arc<str>>, die: DieRef)
    {
        self.entries.push((name.into(), die));
        self.finalized = false;
    }

    /// Append every entry of `other`, duplicates included.
    pub fn append(&mut self, other: &NameIndex)
    {
        if other.entries.is_empty() {
            return;
        }
        self.entries.extend(other.entries.iter().cloned());
        self.finalized = false;
    }

    /// Sort by name then DIE and remove duplicate pairs. Idempotent.
    pub fn finalize(&mut self)
    {
        if self.finalized {
            return;
        }
        self.entries.sort_unstable();
        self.entries.dedup();
        self.entries.shrink_to_fit();
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool
    {
        self.finalized
    }

    /// Number of `(name, die)` entries.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Distinct names in sorted order (finalized indexes only).
    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        let mut previous: Option<&str> = None;
        self.entries.iter().filter_map(move |(name, _)| {
            let name = name.as_ref();
            if previous == Some(name) {
                return None;
            }
            previous = Some(name);
            Some(name)
        })
    }

    /// Call `callback` for every DIE registered under `name`
    ///
    /// Returns `Break` if the callback asked to stop.
    pub fn find<F>(&self, name: &str, mut callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        if self.finalized {
            let start = self.entries.partition_point(|(key, _)| key.as_ref() < name);
            for (key, die) in &self.entries[start..] {
                if key.as_ref() != name {
                    break;
                }
                callback(*die)?;
            }
        } else {
            for (key, die) in &self.entries {
                if key.as_ref() == name {
                    callback(*die)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Call `callback` for every DIE whose name matches `regex`.
    ///
    /// Tests every distinct name; meant for rare, interactive lookups.
    pub fn find_regex<F>(&self, regex: &Regex, mut callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        let mut last: Option<(&str, bool)> = None;
        for (key, die) in &self.entries {
            let matched = match last {
                Some((previous, matched)) if previous == key.as_ref() => matched,
                _ => regex.is_match(key),
            };
            last = Some((key.as_ref(), matched));
            if matched {
                callback(*die)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// Call `callback` for every entry whose DIE lies inside `unit`.
    pub fn find_all_entries_for_unit<F>(&self, unit: &UnitSpan, mut callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        for (_, die) in &self.entries {
            if unit.contains(*die) {
                callback(*die)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// One line per entry: `<die> "<name>"`.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result
    {
        for (name, die) in &self.entries {
            writeln!(out, "{die} \"{name}\"")?;
        }
        Ok(())
    }

    /// Entry count followed by `(string index, die)` pairs.
    pub(crate) fn encode(&self, writer: &mut CacheWriter, strings: &mut StringTableWriter) -> IndexResult<()>
    {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| IndexError::CorruptCache("name index too large to encode".to_string()))?;
        writer.write_u32(count)?;
        for (name, die) in &self.entries {
            writer.write_u32(strings.add(name))?;
            encode_die_ref(writer, *die)?;
        }
        Ok(())
    }

    pub(crate) fn decode(reader: &mut CacheReader<'_>, strings: &StringTableReader) -> IndexResult<Self>
    {
        let count = reader.read_u32().map_err(corrupt("name index entry count"))?;
        // Each entry takes at least 6 bytes; reject counts the input cannot
        // possibly hold before allocating for them.
        if u64::from(count) * 6 > reader.len() as u64 {
            return Err(IndexError::CorruptCache(format!(
                "name index claims {count} entries but only {} bytes remain",
                reader.len()
            )));
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let strx = reader.read_u32().map_err(corrupt("name string index"))?;
            let name = strings.get(strx)?;
            entries.push((name, decode_die_ref(reader)?));
        }

        let mut index = NameIndex {
            entries,
            finalized: false,
        };
        index.finalize();
        Ok(index)
    }
}

fn encode_die_ref(writer: &mut CacheWriter, die: DieRef) -> IndexResult<()>
{
    let mut flags = 0;
    if die.file().is_some() {
        flags |= DIE_REF_HAS_FILE;
    }
    if die.section() == DieSection::DebugTypes {
        flags |= DIE_REF_DEBUG_TYPES;
    }
    writer.write_u8(flags)?;
    if let Some(file) = die.file() {
        writer.write_u32(file)?;
    }
    writer.write_uleb128(die.offset())?;
    Ok(())
}

fn decode_die_ref(reader: &mut CacheReader<'_>) -> IndexResult<DieRef>
{
    let flags = reader.read_u8().map_err(corrupt("DIE reference flags"))?;
    if flags & !(DIE_REF_HAS_FILE | DIE_REF_DEBUG_TYPES) != 0 {
        return Err(IndexError::CorruptCache(format!("unknown DIE reference flags 0x{flags:02x}")));
    }
    let file = if flags & DIE_REF_HAS_FILE != 0 {
        Some(reader.read_u32().map_err(corrupt("DIE reference file"))?)
    } else {
        None
    };
    let section = if flags & DIE_REF_DEBUG_TYPES != 0 {
        DieSection::DebugTypes
    } else {
        DieSection::DebugInfo
    };
    let offset = reader.read_uleb128().map_err(corrupt("DIE reference offset"))?;
    Ok(DieRef::new(file, section, offset))
}
