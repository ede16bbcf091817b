//! Progress reporting for long index builds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Title of every manual index build.
pub const INDEX_PROGRESS_TITLE: &str = "Manually indexing DWARF";

/// Snapshot handed to progress observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate
{
    pub title: &'static str,
    /// Module being indexed
    pub details: Arc<str>,
    pub completed: u64,
    pub total: u64,
}

/// Callback invoked after every completed step, from worker threads.
pub type ProgressObserver = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Shared step counter for one build
///
/// A build has two steps per unit (extract, classify) and one per name
/// category (merge + finalize).
pub struct IndexProgress
{
    details: Arc<str>,
    total: u64,
    completed: AtomicU64,
    observer: Option<ProgressObserver>,
}

impl IndexProgress
{
    pub fn new(details: impl Into<Arc<str>>, total: u64, observer: Option<ProgressObserver>) -> Self
    {
        Self {
            details: details.into(),
            total,
            completed: AtomicU64::new(0),
            observer,
        }
    }

    /// Record one finished step.
    pub fn increment(&self)
    {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(completed, total = self.total, "{INDEX_PROGRESS_TITLE}");
        if let Some(observer) = &self.observer {
            observer(&ProgressUpdate {
                title: INDEX_PROGRESS_TITLE,
                details: self.details.clone(),
                completed,
                total: self.total,
            });
        }
    }

    pub fn completed(&self) -> u64
    {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64
    {
        self.total
    }
}

impl fmt::Debug for IndexProgress
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("IndexProgress")
            .field("details", &self.details)
            .field("completed", &self.completed())
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}
