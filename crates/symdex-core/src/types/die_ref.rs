//! References to debug information entries.

use std::fmt;

/// Section a unit (and therefore each of its DIEs) lives in.
///
/// DWARF 4 type units are stored in `.debug_types`; everything else,
/// including DWARF 5 type units, lives in `.debug_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DieSection
{
    /// `.debug_info` (compile, partial, skeleton, split and DWARF 5 type units)
    DebugInfo,
    /// `.debug_types` (DWARF 4 type units)
    DebugTypes,
}

/// Opaque, copyable handle to one debug information entry
///
/// A `DieRef` names a DIE by the file it came from, the section it lives in,
/// and its absolute offset within that section. The index stores and returns
/// these handles without interpreting them; turning a `DieRef` back into a
/// DIE is the job of whoever owns the debug information.
///
/// ## File slots
///
/// - `None`: the primary object file
/// - `Some(n)`: the n-th split DWARF file (`.dwp` package or `.dwo` file),
///   numbered by the loader that produced the units
///
/// ## Example
///
/// ```rust
/// use symdex_core::types::{DieRef, DieSection};
///
/// let die = DieRef::new(None, DieSection::DebugInfo, 0x2a);
/// assert_eq!(die.offset(), 0x2a);
/// assert_eq!(die.to_string(), "{0x0000002a}");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DieRef
{
    file: Option<u32>,
    section: DieSection,
    offset: u64,
}

impl DieRef
{
    /// Create a reference from its parts.
    #[must_use]
    pub const fn new(file: Option<u32>, section: DieSection, offset: u64) -> Self
    {
        Self { file, section, offset }
    }

    /// Split DWARF file slot, `None` for the primary object.
    #[must_use]
    pub const fn file(self) -> Option<u32>
    {
        self.file
    }

    /// Section containing the DIE.
    #[must_use]
    pub const fn section(self) -> DieSection
    {
        self.section
    }

    /// Absolute offset of the DIE within its section.
    #[must_use]
    pub const fn offset(self) -> u64
    {
        self.offset
    }
}

impl fmt::Display for DieRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let types = if self.section == DieSection::DebugTypes { "TYPE," } else { "" };
        match self.file {
            Some(file) => write!(f, "{{{types}dwo#{file},0x{:08x}}}", self.offset),
            None => write!(f, "{{{types}0x{:08x}}}", self.offset),
        }
    }
}

/// Byte range occupied by a unit inside its section
///
/// Used to answer "does this `DieRef` belong to that unit?" without asking
/// the debug information for the DIE itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitSpan
{
    /// Split DWARF file slot, `None` for the primary object
    pub file: Option<u32>,
    /// Section the unit header lives in
    pub section: DieSection,
    /// Offset of the unit header
    pub offset: u64,
    /// Offset one past the last byte of the unit
    pub end: u64,
}

impl UnitSpan
{
    /// True when `die` lies inside this unit.
    #[must_use]
    pub fn contains(&self, die: DieRef) -> bool
    {
        die.file == self.file && die.section == self.section && (self.offset..self.end).contains(&die.offset)
    }

    /// Reference to the DIE at `offset` inside this unit.
    #[must_use]
    pub fn die_ref(&self, offset: u64) -> DieRef
    {
        DieRef::new(self.file, self.section, offset)
    }
}
