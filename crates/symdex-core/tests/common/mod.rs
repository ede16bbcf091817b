//! Hand-built debug information shared by the integration tests.

#![allow(dead_code)]

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gimli::{constants, DwAt, DwLang, DwTag};
use rayon::ThreadPool;
use symdex_core::dwarf::{AttrValue, DebugInfo, Die, ObjectIdentity, SplitUnit, SymbolFile, Unit, UnitHeader, UnitKind};
use symdex_core::index::{CacheSignature, ManualIndex, NameIndex};
use symdex_core::types::{DieRef, DieSection, UnitSpan};

/// Identity whose signature can be changed mid-test, as if the binary had
/// been rebuilt.
pub struct TestIdentity
{
    path: PathBuf,
    signature: Mutex<Option<CacheSignature>>,
}

impl TestIdentity
{
    pub fn new(path: &str) -> Self
    {
        Self {
            path: PathBuf::from(path),
            signature: Mutex::new(Some(CacheSignature {
                uuid: Some(vec![0xde, 0xad, 0xbe, 0xef]),
                mod_time: Some(1_700_000_000),
                content_hash: Some(0x1234_5678),
            })),
        }
    }

    pub fn set_signature(&self, signature: Option<CacheSignature>)
    {
        *self.signature.lock().unwrap() = signature;
    }

    /// Simulate a rebuilt binary with the same path and hash.
    pub fn touch(&self)
    {
        let mut signature = self.signature.lock().unwrap();
        if let Some(signature) = signature.as_mut() {
            signature.mod_time = signature.mod_time.map(|t| t + 60);
        }
    }
}

impl ObjectIdentity for TestIdentity
{
    fn cache_key_prefix(&self) -> String
    {
        "a.out-0000abcd".to_string()
    }

    fn signature(&self) -> Option<CacheSignature>
    {
        self.signature.lock().unwrap().clone()
    }

    fn cache_hash(&self) -> u32
    {
        0x1234_5678
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

pub fn pool(threads: usize) -> Arc<ThreadPool>
{
    Arc::new(rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap())
}

pub fn string(value: &str) -> AttrValue
{
    AttrValue::String(Arc::from(value))
}

/// Builds one unit's DIEs in depth-first order with increasing offsets.
pub struct UnitBuilder
{
    span: UnitSpan,
    version: u16,
    kind: UnitKind,
    dwo_id: Option<u64>,
    type_signature: Option<u64>,
    language: Option<DwLang>,
    dies: Vec<Die>,
    stack: Vec<usize>,
    next_offset: u64,
}

impl UnitBuilder
{
    /// A DWARF 5 compile unit at `offset` in `.debug_info`.
    pub fn compile(offset: u64) -> Self
    {
        Self::new(None, DieSection::DebugInfo, offset, UnitKind::Compile, constants::DW_TAG_compile_unit)
    }

    pub fn new(file: Option<u32>, section: DieSection, offset: u64, kind: UnitKind, root: DwTag) -> Self
    {
        let mut builder = Self {
            span: UnitSpan {
                file,
                section,
                offset,
                end: offset,
            },
            version: 5,
            kind,
            dwo_id: None,
            type_signature: None,
            language: Some(constants::DW_LANG_C_plus_plus),
            dies: Vec::new(),
            stack: Vec::new(),
            next_offset: offset + 0x0c,
        };
        builder.open(Die::new(0, root, None));
        builder
    }

    pub fn version(mut self, version: u16) -> Self
    {
        self.version = version;
        self
    }

    pub fn language(mut self, language: DwLang) -> Self
    {
        self.language = Some(language);
        self
    }

    pub fn without_language(mut self) -> Self
    {
        self.language = None;
        self
    }

    pub fn dwo_id(mut self, id: u64) -> Self
    {
        self.dwo_id = Some(id);
        self
    }

    pub fn type_signature(mut self, signature: u64) -> Self
    {
        self.type_signature = Some(signature);
        self
    }

    fn place(&mut self, mut die: Die) -> usize
    {
        die.offset = self.next_offset;
        die.parent = self.stack.last().copied();
        self.next_offset += 0x10;
        self.dies.push(die);
        self.dies.len() - 1
    }

    /// Add a DIE with children; close it with [`UnitBuilder::close`].
    pub fn open(&mut self, die: Die) -> DieRef
    {
        let index = self.place(die);
        self.stack.push(index);
        self.span_ref(index)
    }

    pub fn close(&mut self)
    {
        self.stack.pop();
    }

    /// Add a childless DIE under the innermost open one.
    pub fn leaf(&mut self, die: Die) -> DieRef
    {
        let index = self.place(die);
        self.span_ref(index)
    }

    fn span_ref(&self, index: usize) -> DieRef
    {
        self.span.die_ref(self.dies[index].offset)
    }

    pub fn span(&self) -> UnitSpan
    {
        UnitSpan {
            end: self.next_offset,
            ..self.span
        }
    }

    pub fn build(self) -> Unit
    {
        let header = UnitHeader {
            span: self.span(),
            version: self.version,
            kind: self.kind,
            dwo_id: self.dwo_id,
            type_signature: self.type_signature,
            language: self.language,
        };
        Unit::new(header, self.dies)
    }
}

/// `subprogram` with a name, an optional linkage name and an address range.
pub fn function(name: &str, linkage: Option<&str>) -> Die
{
    let mut die = Die::new(0, constants::DW_TAG_subprogram, None)
        .with_attr(constants::DW_AT_name, string(name))
        .with_attr(constants::DW_AT_low_pc, AttrValue::Unsigned(0x1000));
    if let Some(linkage) = linkage {
        die = die.with_attr(constants::DW_AT_linkage_name, string(linkage));
    }
    die
}

pub fn named(tag: DwTag, name: &str) -> Die
{
    Die::new(0, tag, None).with_attr(constants::DW_AT_name, string(name))
}

/// Global variable with a location.
pub fn global(name: &str) -> Die
{
    named(constants::DW_TAG_variable, name).with_attr(constants::DW_AT_location, AttrValue::Present)
}

pub fn with_flag(die: Die, attr: DwAt) -> Die
{
    die.with_attr(attr, AttrValue::Flag(true))
}

pub fn symbols(units: Vec<Unit>) -> (Arc<TestIdentity>, Arc<SymbolFile>)
{
    let identity = Arc::new(TestIdentity::new("/build/a.out"));
    let info = DebugInfo::new(units.into_iter().map(Arc::new).collect());
    let file = SymbolFile::new(identity.clone(), Arc::new(info));
    (identity, Arc::new(file))
}

/// A skeleton whose split unit lives in a private `.dwo` file.
pub fn skeleton_with_dwo(offset: u64, dwo_id: u64, split_units: Vec<Unit>) -> Unit
{
    let skeleton = UnitBuilder::new(None, DieSection::DebugInfo, offset, UnitKind::Skeleton, constants::DW_TAG_skeleton_unit)
        .dwo_id(dwo_id)
        .build();
    let dwo = DebugInfo::new(split_units.into_iter().map(Arc::new).collect());
    skeleton.with_split(SplitUnit::File(Arc::new(dwo)))
}

pub fn collect(index: &NameIndex, name: &str) -> Vec<DieRef>
{
    let mut found = Vec::new();
    let _ = index.find(name, |die| {
        found.push(die);
        ControlFlow::Continue(())
    });
    found
}

/// Gather every result of a facade lookup.
pub fn gather(lookup: impl FnOnce(&mut dyn FnMut(DieRef) -> ControlFlow<()>) -> ControlFlow<()>) -> Vec<DieRef>
{
    let mut found = Vec::new();
    let _ = lookup(&mut |die| {
        found.push(die);
        ControlFlow::Continue(())
    });
    found
}

pub fn manual_index(symbols: &Arc<SymbolFile>) -> ManualIndex
{
    ManualIndex::new(symbols.clone(), pool(2))
}
