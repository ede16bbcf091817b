//! Compilation and type units with lazily materialized DIEs.

use std::fmt;
use std::sync::{Arc, RwLock};

use gimli::DwLang;
use tracing::trace;

use super::die::Die;
use crate::error::IndexResult;
use crate::types::{DieRef, UnitSpan};

/// What a unit header declares itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind
{
    Compile,
    Partial,
    Type,
    /// DWARF 5 skeleton unit pointing at a split unit
    Skeleton,
    /// Split compile unit inside a `.dwo` or `.dwp`
    SplitCompile,
    /// Split type unit inside a `.dwo` or `.dwp`
    SplitType,
}

impl UnitKind
{
    pub fn is_type_unit(self) -> bool
    {
        matches!(self, UnitKind::Type | UnitKind::SplitType)
    }
}

/// Header level facts about a unit; available without reading any DIE.
#[derive(Debug, Clone)]
pub struct UnitHeader
{
    pub span: UnitSpan,
    pub version: u16,
    pub kind: UnitKind,
    /// `DW_AT_dwo_id` / `DW_AT_GNU_dwo_id` or the DWARF 5 header id
    pub dwo_id: Option<u64>,
    /// Type signature for type units
    pub type_signature: Option<u64>,
    /// `DW_AT_language` of the unit DIE
    pub language: Option<DwLang>,
}

/// Produces the DIEs of one unit on demand.
///
/// Implemented by the gimli loader; tests implement it with fixed vectors.
/// DIEs must be returned in depth-first order, sorted by offset, with parent
/// indices pointing backwards.
pub trait DieSource: Send + Sync
{
    fn load(&self) -> IndexResult<Vec<Die>>;
}

impl DieSource for Vec<Die>
{
    fn load(&self) -> IndexResult<Vec<Die>>
    {
        Ok(self.clone())
    }
}

/// Where the real contents of a skeleton unit live.
#[derive(Clone)]
pub enum SplitUnit
{
    /// The split unit is part of the shared `.dwp` package
    Package(Arc<Unit>),
    /// The split unit lives in a private `.dwo` file together with its type
    /// units
    File(Arc<DebugInfo>),
}

/// One compilation, partial or type unit.
pub struct Unit
{
    header: UnitHeader,
    source: Box<dyn DieSource>,
    dies: RwLock<Option<Arc<[Die]>>>,
    split: Option<SplitUnit>,
}

impl Unit
{
    pub fn new(header: UnitHeader, source: impl DieSource + 'static) -> Self
    {
        Self {
            header,
            source: Box::new(source),
            dies: RwLock::new(None),
            split: None,
        }
    }

    /// Attach the resolved split unit of a skeleton.
    #[must_use]
    pub fn with_split(mut self, split: SplitUnit) -> Self
    {
        self.split = Some(split);
        self
    }

    pub fn header(&self) -> &UnitHeader
    {
        &self.header
    }

    pub fn span(&self) -> UnitSpan
    {
        self.header.span
    }

    pub fn offset(&self) -> u64
    {
        self.header.span.offset
    }

    pub fn version(&self) -> u16
    {
        self.header.version
    }

    pub fn kind(&self) -> UnitKind
    {
        self.header.kind
    }

    pub fn dwo_id(&self) -> Option<u64>
    {
        self.header.dwo_id
    }

    pub fn type_signature(&self) -> Option<u64>
    {
        self.header.type_signature
    }

    pub fn language(&self) -> Option<DwLang>
    {
        self.header.language
    }

    pub fn is_skeleton(&self) -> bool
    {
        self.header.kind == UnitKind::Skeleton
    }

    /// Resolved split unit, `None` when the unit is not split or the split
    /// file could not be found.
    pub fn split_unit(&self) -> Option<&SplitUnit>
    {
        self.split.as_ref()
    }

    pub fn die_ref(&self, die: &Die) -> DieRef
    {
        self.header.span.die_ref(die.offset)
    }

    /// Whether the DIEs are currently materialized.
    pub fn is_resident(&self) -> bool
    {
        self.dies.read().unwrap().is_some()
    }

    /// The unit's DIEs, materializing them if needed.
    ///
    /// DIEs loaded through this method stay resident; use
    /// [`Unit::extract_dies_scoped`] for temporary residency.
    ///
    /// ## Errors
    ///
    /// Returns the loader's error if the DIEs cannot be decoded.
    pub fn entries(&self) -> IndexResult<Arc<[Die]>>
    {
        if let Some(dies) = self.dies.read().unwrap().as_ref() {
            return Ok(dies.clone());
        }
        let mut slot = self.dies.write().unwrap();
        if let Some(dies) = slot.as_ref() {
            return Ok(dies.clone());
        }
        let dies: Arc<[Die]> = self.source.load()?.into();
        *slot = Some(dies.clone());
        Ok(dies)
    }

    /// Materialize the DIEs for the lifetime of the returned guard
    ///
    /// The guard only owns the residency it created: if the DIEs were already
    /// resident when this was called, releasing the guard leaves them alone.
    ///
    /// ## Errors
    ///
    /// Returns the loader's error if the DIEs cannot be decoded.
    pub fn extract_dies_scoped(&self) -> IndexResult<ScopedExtract<'_>>
    {
        let mut slot = self.dies.write().unwrap();
        let owns_residency = slot.is_none();
        if owns_residency {
            *slot = Some(self.source.load()?.into());
        }
        Ok(ScopedExtract {
            unit: self,
            owns_residency,
        })
    }

    fn clear_dies(&self)
    {
        trace!(offset = self.offset(), "releasing unit DIEs");
        *self.dies.write().unwrap() = None;
    }
}

impl fmt::Debug for Unit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Unit")
            .field("header", &self.header)
            .field("resident", &self.is_resident())
            .field("split", &self.split.is_some())
            .finish_non_exhaustive()
    }
}

/// Keeps a unit's DIEs resident until dropped or released.
#[must_use = "the DIEs are released as soon as the guard is dropped"]
pub struct ScopedExtract<'a>
{
    unit: &'a Unit,
    owns_residency: bool,
}

impl ScopedExtract<'_>
{
    /// True when this guard materialized the DIEs and will clear them.
    pub fn owns_residency(&self) -> bool
    {
        self.owns_residency
    }

    /// Release now instead of at the end of the scope.
    pub fn release(self)
    {
        drop(self);
    }
}

impl Drop for ScopedExtract<'_>
{
    fn drop(&mut self)
    {
        if self.owns_residency {
            self.unit.clear_dies();
        }
    }
}

/// Ordered collection of units from one file.
#[derive(Debug, Default)]
pub struct DebugInfo
{
    units: Vec<Arc<Unit>>,
}

impl DebugInfo
{
    pub fn new(units: Vec<Arc<Unit>>) -> Self
    {
        Self { units }
    }

    pub fn units(&self) -> &[Arc<Unit>]
    {
        &self.units
    }

    pub fn len(&self) -> usize
    {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.units.is_empty()
    }

    pub fn contains_type_units(&self) -> bool
    {
        self.units.iter().any(|unit| unit.kind().is_type_unit())
    }
}
