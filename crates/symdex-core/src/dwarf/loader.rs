//! Object file and DWARF loading with `object` and `gimli`.
//!
//! Fills the debug-info model from a binary on disk:
//!
//! - every unit of `.debug_info` and `.debug_types`,
//! - split units of DWARF 5 skeletons and DWARF 4 fission units, taken from
//!   the `.dwp` package when one exists, else from the `.dwo` file named by
//!   `DW_AT_dwo_name` (relative to `DW_AT_comp_dir`),
//! - the type units of the `.dwp` package.
//!
//! Section bytes are copied into reference counted buffers so units can
//! decode their DIEs later, from any thread, without keeping the object file
//! mapped.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use gimli::{
    constants, AttributeValue, DebugTypeSignature, Dwarf, DwarfPackage, DwoId, EndianArcSlice, Reader,
    RunTimeEndian, Section, SectionId, UnitType,
};
use object::{Object, ObjectSection};
use tracing::{debug, info, warn};

use super::die::{Attr, AttrValue, Die};
use super::symbol_file::{ObjectIdentity, SymbolFile};
use super::unit::{DebugInfo, DieSource, SplitUnit, Unit, UnitHeader, UnitKind};
use crate::error::{IndexError, IndexResult};
use crate::index::CacheSignature;
use crate::types::{DieSection, UnitSpan};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;

/// Where to look for split DWARF.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions
{
    /// `.dwp` package; defaults to `<binary>.dwp` next to the binary
    pub dwp: Option<PathBuf>,
    /// Extra directories searched for `.dwo` files
    pub dwo_search_dirs: Vec<PathBuf>,
    /// Ignore split DWARF entirely
    pub skip_split_dwarf: bool,
}

impl LoadOptions
{
    #[must_use]
    pub fn with_dwp(mut self, dwp: impl Into<PathBuf>) -> Self
    {
        self.dwp = Some(dwp.into());
        self
    }

    #[must_use]
    pub fn with_dwo_search_dir(mut self, dir: impl Into<PathBuf>) -> Self
    {
        self.dwo_search_dirs.push(dir.into());
        self
    }

    fn dwp_path(&self, binary: &Path) -> Option<PathBuf>
    {
        if self.skip_split_dwarf {
            return None;
        }
        if let Some(dwp) = &self.dwp {
            return Some(dwp.clone());
        }
        let mut default = binary.as_os_str().to_owned();
        default.push(".dwp");
        let default = PathBuf::from(default);
        default.is_file().then_some(default)
    }
}

/// Identity of an object file on disk.
#[derive(Debug, Clone)]
pub struct ObjectFileIdentity
{
    path: PathBuf,
    architecture: String,
    uuid: Option<Vec<u8>>,
    mod_time: Option<u32>,
    content_hash: u32,
    path_hash: u32,
}

impl ObjectFileIdentity
{
    /// Derive the identity from an already parsed object.
    pub fn from_object(path: &Path, file: &object::File<'_>, data: &[u8]) -> Self
    {
        let uuid = match file.mach_uuid() {
            Ok(Some(uuid)) => Some(uuid.to_vec()),
            _ => file.build_id().ok().flatten().map(<[u8]>::to_vec),
        };
        let mod_time = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .and_then(|elapsed| u32::try_from(elapsed.as_secs()).ok());
        let architecture = architecture_name(file.architecture());

        let mut hasher = blake3::Hasher::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(architecture.as_bytes());
        let path_hash = truncate_hash(hasher.finalize());

        Self {
            path: path.to_path_buf(),
            architecture,
            uuid,
            mod_time,
            content_hash: truncate_hash(blake3::hash(data)),
            path_hash,
        }
    }

    /// Read and parse `path` just for its identity.
    ///
    /// ## Errors
    ///
    /// Fails if the file cannot be read or is not an object file.
    pub fn read(path: &Path) -> IndexResult<Self>
    {
        let data = fs::read(path)?;
        let file = parse_object(path, &data)?;
        Ok(Self::from_object(path, &file, &data))
    }

    pub fn uuid(&self) -> Option<&[u8]>
    {
        self.uuid.as_deref()
    }
}

impl ObjectIdentity for ObjectFileIdentity
{
    fn cache_key_prefix(&self) -> String
    {
        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "object".to_string(), |name| name.to_string_lossy().into_owned());
        format!("{file_name}-{:08x}", self.path_hash)
    }

    fn signature(&self) -> Option<CacheSignature>
    {
        Some(CacheSignature {
            uuid: self.uuid.clone(),
            mod_time: self.mod_time,
            content_hash: Some(self.content_hash),
        })
    }

    fn cache_hash(&self) -> u32
    {
        self.content_hash
    }

    fn architecture(&self) -> &str
    {
        &self.architecture
    }

    fn path(&self) -> &Path
    {
        &self.path
    }
}

fn truncate_hash(hash: blake3::Hash) -> u32
{
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn architecture_name(architecture: object::Architecture) -> String
{
    match architecture {
        object::Architecture::Aarch64 => "arm64".to_string(),
        object::Architecture::X86_64 => "x86_64".to_string(),
        object::Architecture::I386 => "i386".to_string(),
        object::Architecture::Arm => "arm".to_string(),
        object::Architecture::Riscv64 => "riscv64".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

/// Load the debug information of the binary at `path`.
///
/// ## Errors
///
/// Fails if the binary cannot be read or parsed, or its unit headers are
/// malformed. Problems with split DWARF files only drop those files.
pub fn load_symbol_file(path: &Path, options: &LoadOptions) -> IndexResult<SymbolFile>
{
    let data = fs::read(path)?;
    let file = parse_object(path, &data)?;
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    let identity = Arc::new(ObjectFileIdentity::from_object(path, &file, &data));
    let main = Arc::new(load_dwarf(&file, endian, false)?);
    drop(file);

    let mut loader = SplitLoader {
        main: main.clone(),
        endian,
        options,
        next_slot: 0,
        package: None,
    };
    if let Some(dwp) = options.dwp_path(path) {
        match loader.load_package(&dwp) {
            Ok(package) => loader.package = Some(package),
            Err(err) => warn!(path = %dwp.display(), "ignoring unreadable .dwp: {err}"),
        }
    }

    let units = loader.load_main_units()?;
    let mut symbols = SymbolFile::new(identity, Arc::new(DebugInfo::new(units)));
    if let Some(package) = loader.package {
        symbols = symbols.with_dwp(package.units);
    }
    info!(
        module = %symbols.description(),
        units = symbols.debug_info().len(),
        dwp_units = symbols.dwp().map_or(0, DebugInfo::len),
        "loaded debug info"
    );
    Ok(symbols)
}

fn parse_object<'data>(path: &Path, data: &'data [u8]) -> IndexResult<object::File<'data>>
{
    object::File::parse(data).map_err(|err| IndexError::Object(format!("failed to parse {}: {err}", path.display())))
}

/// Section names to try for `id`, Mach-O spellings included.
fn section_names(id: SectionId, split: bool) -> Vec<String>
{
    let name = if split { id.dwo_name() } else { Some(id.name()) };
    let Some(name) = name else {
        return Vec::new();
    };
    let mut names = vec![name.to_string()];
    if let Some(bare) = name.strip_prefix('.') {
        let macho: String = format!("__{bare}").chars().take(16).collect();
        names.push(macho);
    }
    names
}

fn section_data(file: &object::File<'_>, id: SectionId, split: bool) -> IndexResult<Arc<[u8]>>
{
    for name in section_names(id, split) {
        if let Some(section) = file.section_by_name(&name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| IndexError::Object(format!("failed to read {name}: {err}")))?;
            return Ok(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                Cow::Owned(vec) => vec.into(),
            });
        }
    }
    Ok(Arc::<[u8]>::from(Vec::new()))
}

fn load_dwarf(file: &object::File<'_>, endian: RunTimeEndian, split: bool) -> IndexResult<OwnedDwarf>
{
    Dwarf::load(|id| section_data(file, id, split).map(|data| EndianArcSlice::new(data, endian)))
}

/// Absolute offset of a header inside the section it was read from.
fn header_offset(header: &gimli::UnitHeader<OwnedReader>) -> u64
{
    let offset = header.offset();
    offset
        .as_debug_info_offset()
        .map(|offset| offset.0)
        .or_else(|| offset.as_debug_types_offset().map(|offset| offset.0))
        .unwrap_or_default() as u64
}

/// Root DIE facts needed to find split DWARF.
#[derive(Debug, Default)]
struct RootFacts
{
    dwo_name: Option<String>,
    comp_dir: Option<String>,
}

/// Where a unit's header sits, in absolute terms.
#[derive(Debug, Clone, Copy)]
struct Placement
{
    file: Option<u32>,
    section: DieSection,
    /// Absolute offset of the header in the file's section
    offset: u64,
    /// The unit lives in a `.dwo` or `.dwp`
    split: bool,
}

fn reader_to_string(reader: &OwnedReader) -> Option<String>
{
    reader.to_string_lossy().ok().map(Cow::into_owned)
}

/// Build the model of one unit and read the root facts it needs.
fn model_unit(
    dwarf: &Arc<OwnedDwarf>,
    header: gimli::UnitHeader<OwnedReader>,
    placement: Placement,
) -> IndexResult<(Unit, RootFacts)>
{
    let unit = dwarf
        .unit(header.clone())
        .map_err(|err| IndexError::dwarf(format!("parsing unit at 0x{:x}", placement.offset), err))?;

    let mut facts = RootFacts {
        dwo_name: None,
        comp_dir: unit.comp_dir.as_ref().and_then(reader_to_string),
    };
    let mut language = None;
    {
        let mut cursor = unit.entries();
        if let Some((_, root)) = cursor
            .next_dfs()
            .map_err(|err| IndexError::dwarf("reading unit DIE", err))?
        {
            if let Some(attr) = root
                .attr(constants::DW_AT_language)
                .map_err(|err| IndexError::dwarf("reading DW_AT_language", err))?
            {
                if let AttributeValue::Language(lang) = attr.value() {
                    language = Some(lang);
                }
            }
            for name in [constants::DW_AT_dwo_name, constants::DW_AT_GNU_dwo_name] {
                if facts.dwo_name.is_some() {
                    break;
                }
                if let Some(attr) = root
                    .attr(name)
                    .map_err(|err| IndexError::dwarf("reading DW_AT_dwo_name", err))?
                {
                    facts.dwo_name = dwarf
                        .attr_string(&unit, attr.value())
                        .ok()
                        .as_ref()
                        .and_then(reader_to_string);
                }
            }
        }
    }

    let (kind, type_signature) = match header.type_() {
        UnitType::Compilation if placement.split => (UnitKind::SplitCompile, None),
        UnitType::Compilation => (UnitKind::Compile, None),
        UnitType::Partial => (UnitKind::Partial, None),
        UnitType::Skeleton(_) => (UnitKind::Skeleton, None),
        UnitType::SplitCompilation(_) => (UnitKind::SplitCompile, None),
        UnitType::Type { type_signature, .. } if placement.split => (UnitKind::SplitType, Some(type_signature.0)),
        UnitType::Type { type_signature, .. } => (UnitKind::Type, Some(type_signature.0)),
        UnitType::SplitType { type_signature, .. } => (UnitKind::SplitType, Some(type_signature.0)),
    };

    let model_header = UnitHeader {
        span: UnitSpan {
            file: placement.file,
            section: placement.section,
            offset: placement.offset,
            end: placement.offset + header.length_including_self() as u64,
        },
        version: header.version(),
        kind,
        // Split units are what a dwo id resolves to; they never point further.
        dwo_id: if placement.split { None } else { unit.dwo_id.map(|id| id.0) },
        type_signature,
        language,
    };
    let source = GimliDieSource {
        dwarf: dwarf.clone(),
        view_offset: header_offset(&header),
        header,
        base: placement.offset,
    };
    Ok((Unit::new(model_header, source), facts))
}

/// Decodes one unit's DIEs on demand.
struct GimliDieSource
{
    dwarf: Arc<OwnedDwarf>,
    header: gimli::UnitHeader<OwnedReader>,
    /// Absolute offset of the header
    base: u64,
    /// Offset of the header inside `dwarf`, which may be a package slice
    view_offset: u64,
}

impl GimliDieSource
{
    fn convert(&self, unit: &gimli::Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> AttrValue
    {
        match value {
            AttributeValue::Flag(flag) => AttrValue::Flag(flag),
            AttributeValue::UnitRef(offset) => AttrValue::Reference(self.base + offset.0 as u64),
            AttributeValue::DebugInfoRef(offset) => {
                AttrValue::Reference((offset.0 as u64 + self.base).saturating_sub(self.view_offset))
            }
            AttributeValue::String(_)
            | AttributeValue::DebugStrRef(_)
            | AttributeValue::DebugStrRefSup(_)
            | AttributeValue::DebugStrOffsetsIndex(_)
            | AttributeValue::DebugLineStrRef(_) => match self.dwarf.attr_string(unit, value) {
                Ok(reader) => reader_to_string(&reader).map_or(AttrValue::Invalid, |name| AttrValue::String(name.into())),
                Err(_) => AttrValue::Invalid,
            },
            other => other.udata_value().map_or(AttrValue::Present, AttrValue::Unsigned),
        }
    }
}

impl DieSource for GimliDieSource
{
    fn load(&self) -> IndexResult<Vec<Die>>
    {
        let unit = self
            .dwarf
            .unit(self.header.clone())
            .map_err(|err| IndexError::dwarf(format!("parsing unit at 0x{:x}", self.base), err))?;

        let mut dies: Vec<Die> = Vec::new();
        // Indices of the open ancestors, outermost first.
        let mut ancestors: Vec<usize> = Vec::new();
        let mut depth: isize = 0;
        let mut cursor = unit.entries();
        while let Some((delta, entry)) = cursor
            .next_dfs()
            .map_err(|err| IndexError::dwarf("traversing DIE tree", err))?
        {
            depth += delta;
            ancestors.truncate(usize::try_from(depth).unwrap_or(0));

            let mut die = Die::new(self.base + entry.offset().0 as u64, entry.tag(), ancestors.last().copied());
            let mut attrs = entry.attrs();
            while let Some(attr) = attrs
                .next()
                .map_err(|err| IndexError::dwarf("reading DIE attributes", err))?
            {
                die.attrs.push(Attr {
                    name: attr.name(),
                    value: self.convert(&unit, attr.value()),
                });
            }
            ancestors.push(dies.len());
            dies.push(die);
        }
        Ok(dies)
    }
}

/// Paths a skeleton's `.dwo` may live at, in search order.
fn dwo_candidates(options: &LoadOptions, facts: &RootFacts) -> Vec<PathBuf>
{
    let Some(dwo_name) = facts.dwo_name.as_deref() else {
        return Vec::new();
    };
    let dwo_name = Path::new(dwo_name);
    if dwo_name.is_absolute() {
        return vec![dwo_name.to_path_buf()];
    }
    let mut candidates = Vec::new();
    if let Some(comp_dir) = &facts.comp_dir {
        candidates.push(Path::new(comp_dir).join(dwo_name));
    }
    for dir in &options.dwo_search_dirs {
        candidates.push(dir.join(dwo_name));
        if let Some(file_name) = dwo_name.file_name() {
            candidates.push(dir.join(file_name));
        }
    }
    candidates
}

/// A loaded `.dwp` package.
struct Package
{
    package: DwarfPackage<OwnedReader>,
    /// Whole `.debug_info.dwo`, to turn slices back into absolute offsets
    info: OwnedReader,
    slot: u32,
    /// Type units of the package
    units: Arc<DebugInfo>,
}

struct SplitLoader<'a>
{
    main: Arc<OwnedDwarf>,
    endian: RunTimeEndian,
    options: &'a LoadOptions,
    next_slot: u32,
    package: Option<Package>,
}

impl SplitLoader<'_>
{
    fn take_slot(&mut self) -> u32
    {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn load_main_units(&mut self) -> IndexResult<Vec<Arc<Unit>>>
    {
        let main = self.main.clone();
        let mut units = Vec::new();

        let mut headers = main.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| IndexError::dwarf("reading .debug_info unit header", err))?
        {
            let placement = Placement {
                file: None,
                section: DieSection::DebugInfo,
                offset: header_offset(&header),
                split: false,
            };
            units.push(Arc::new(self.main_unit(&main, header, placement)?));
        }

        let mut type_headers = main.type_units();
        while let Some(header) = type_headers
            .next()
            .map_err(|err| IndexError::dwarf("reading .debug_types unit header", err))?
        {
            let placement = Placement {
                file: None,
                section: DieSection::DebugTypes,
                offset: header_offset(&header),
                split: false,
            };
            units.push(Arc::new(self.main_unit(&main, header, placement)?));
        }
        Ok(units)
    }

    /// A primary unit, with its split unit attached when one can be found.
    fn main_unit(
        &mut self,
        main: &Arc<OwnedDwarf>,
        header: gimli::UnitHeader<OwnedReader>,
        placement: Placement,
    ) -> IndexResult<Unit>
    {
        let (unit, facts) = model_unit(main, header, placement)?;
        let Some(dwo_id) = unit.dwo_id() else {
            return Ok(unit);
        };
        if self.options.skip_split_dwarf {
            return Ok(unit);
        }

        if let Some(split) = self.package_compile_unit(dwo_id) {
            return Ok(unit.with_split(SplitUnit::Package(split)));
        }
        if let Some(dwo) = self.dwo_file(&facts) {
            return Ok(unit.with_split(SplitUnit::File(dwo)));
        }
        debug!(offset = unit.offset(), dwo_id = format_args!("0x{dwo_id:016x}"), "split unit not found");
        Ok(unit)
    }

    fn load_package(&mut self, path: &Path) -> IndexResult<Package>
    {
        let data = fs::read(path)?;
        let file = parse_object(path, &data)?;
        let endian = self.endian;
        let mut section =
            |id: SectionId| section_data(&file, id, true).map(|data| EndianArcSlice::new(data, endian));
        let info = section(SectionId::DebugInfo)?;
        let types = section(SectionId::DebugTypes)?;
        let package = DwarfPackage::load(&mut section, EndianArcSlice::new(Arc::<[u8]>::from(Vec::new()), endian))?;
        let slot = self.take_slot();

        let mut units = Vec::new();
        let mut headers = gimli::DebugInfo::from(info.clone()).units();
        while let Some(header) = headers
            .next()
            .map_err(|err| IndexError::dwarf("reading .dwp unit header", err))?
        {
            if let UnitType::SplitType { type_signature, .. } = header.type_() {
                let placement = Placement {
                    file: Some(slot),
                    section: DieSection::DebugInfo,
                    offset: header_offset(&header),
                    split: true,
                };
                units.extend(self.package_type_unit(&package, type_signature, placement));
            }
        }
        let mut headers = gimli::DebugTypes::from(types).units();
        while let Some(header) = headers
            .next()
            .map_err(|err| IndexError::dwarf("reading .dwp type unit header", err))?
        {
            if let UnitType::Type { type_signature, .. } = header.type_() {
                let placement = Placement {
                    file: Some(slot),
                    section: DieSection::DebugTypes,
                    offset: header_offset(&header),
                    split: true,
                };
                units.extend(self.package_type_unit(&package, type_signature, placement));
            }
        }

        debug!(path = %path.display(), type_units = units.len(), "loaded .dwp");
        Ok(Package {
            package,
            info,
            slot,
            units: Arc::new(DebugInfo::new(units)),
        })
    }

    fn package_type_unit(
        &self,
        package: &DwarfPackage<OwnedReader>,
        signature: DebugTypeSignature,
        placement: Placement,
    ) -> Option<Arc<Unit>>
    {
        let result = (|| -> IndexResult<Option<Unit>> {
            let Some(dwarf) = package.find_tu(signature, &self.main)? else {
                return Ok(None);
            };
            let dwarf = Arc::new(dwarf);
            let header = if placement.section == DieSection::DebugTypes {
                dwarf.type_units().next()?
            } else {
                dwarf.units().next()?
            };
            header.map(|header| model_unit(&dwarf, header, placement).map(|(unit, _)| unit)).transpose()
        })();
        match result {
            Ok(unit) => unit.map(Arc::new),
            Err(err) => {
                debug!(signature = format_args!("0x{:016x}", signature.0), "skipping .dwp type unit: {err}");
                None
            }
        }
    }

    /// The split compile unit of `dwo_id` inside the package.
    fn package_compile_unit(&self, dwo_id: u64) -> Option<Arc<Unit>>
    {
        let package = self.package.as_ref()?;
        let result = (|| -> IndexResult<Option<Unit>> {
            let Some(dwarf) = package.package.find_cu(DwoId(dwo_id), &self.main)? else {
                return Ok(None);
            };
            let dwarf = Arc::new(dwarf);
            let Some(header) = dwarf.units().next()? else {
                return Ok(None);
            };
            let contribution = dwarf.debug_info.reader().offset_from(&package.info) as u64;
            let placement = Placement {
                file: Some(package.slot),
                section: DieSection::DebugInfo,
                offset: contribution + header_offset(&header),
                split: true,
            };
            model_unit(&dwarf, header, placement).map(|(unit, _)| Some(unit))
        })();
        match result {
            Ok(unit) => unit.map(Arc::new),
            Err(err) => {
                debug!(dwo_id = format_args!("0x{dwo_id:016x}"), "skipping .dwp compile unit: {err}");
                None
            }
        }
    }

    /// Every unit of the `.dwo` file named by a skeleton.
    fn dwo_file(&mut self, facts: &RootFacts) -> Option<Arc<DebugInfo>>
    {
        let path = dwo_candidates(self.options, facts).into_iter().find(|path| path.is_file())?;
        match self.load_dwo(&path) {
            Ok(info) => Some(info),
            Err(err) => {
                debug!(path = %path.display(), "ignoring unreadable .dwo: {err}");
                None
            }
        }
    }

    fn load_dwo(&mut self, path: &Path) -> IndexResult<Arc<DebugInfo>>
    {
        let data = fs::read(path)?;
        let file = parse_object(path, &data)?;
        let mut dwarf = load_dwarf(&file, self.endian, true)?;
        dwarf.make_dwo(&self.main);
        let dwarf = Arc::new(dwarf);
        let slot = self.take_slot();

        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| IndexError::dwarf("reading .dwo unit header", err))?
        {
            let placement = Placement {
                file: Some(slot),
                section: DieSection::DebugInfo,
                offset: header_offset(&header),
                split: true,
            };
            units.push(Arc::new(model_unit(&dwarf, header, placement)?.0));
        }
        let mut headers = dwarf.type_units();
        while let Some(header) = headers
            .next()
            .map_err(|err| IndexError::dwarf("reading .dwo type unit header", err))?
        {
            let placement = Placement {
                file: Some(slot),
                section: DieSection::DebugTypes,
                offset: header_offset(&header),
                split: true,
            };
            units.push(Arc::new(model_unit(&dwarf, header, placement)?.0));
        }
        Ok(Arc::new(DebugInfo::new(units)))
    }
}
