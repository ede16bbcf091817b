//! A module's debug information: primary units, optional `.dwp` package, and
//! the identity of the object they were read from.

use std::path::Path;
use std::sync::Arc;

use super::unit::DebugInfo;
use crate::index::CacheSignature;

/// Stable facts about the object file an index is built from.
///
/// The index uses these to name and validate its cache entries; it never
/// reads the object itself.
pub trait ObjectIdentity: Send + Sync
{
    /// Human-readable, filesystem-safe prefix unique to the module
    fn cache_key_prefix(&self) -> String;

    /// Content fingerprint, `None` when the object is unavailable
    fn signature(&self) -> Option<CacheSignature>;

    /// 32-bit hash distinguishing object files of the same module
    fn cache_hash(&self) -> u32;

    /// Architecture name used in diagnostic output
    fn architecture(&self) -> &str;

    fn path(&self) -> &Path;
}

/// Everything the index needs to know about one module.
pub struct SymbolFile
{
    identity: Arc<dyn ObjectIdentity>,
    main: Arc<DebugInfo>,
    dwp: Option<Arc<DebugInfo>>,
}

impl SymbolFile
{
    pub fn new(identity: Arc<dyn ObjectIdentity>, main: Arc<DebugInfo>) -> Self
    {
        Self {
            identity,
            main,
            dwp: None,
        }
    }

    /// Attach the `.dwp` package whose type units should be indexed too.
    #[must_use]
    pub fn with_dwp(mut self, dwp: Arc<DebugInfo>) -> Self
    {
        self.dwp = Some(dwp);
        self
    }

    pub fn identity(&self) -> &Arc<dyn ObjectIdentity>
    {
        &self.identity
    }

    pub fn debug_info(&self) -> &DebugInfo
    {
        &self.main
    }

    pub fn dwp(&self) -> Option<&DebugInfo>
    {
        self.dwp.as_deref()
    }

    /// Brief description for progress reporting.
    pub fn description(&self) -> String
    {
        format!("{}({})", self.identity.path().display(), self.identity.architecture())
    }
}
