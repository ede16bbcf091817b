//! Parallel construction of the manual index.
//!
//! A build runs in three phases separated by full barriers:
//!
//! 1. **Extract**: materialize every unit's DIEs. Units whose DIEs were not
//!    resident before the build are released once the whole build is done,
//!    not earlier, since classifying one unit may look at DIEs of another.
//! 2. **Classify**: every worker owns one partial [`IndexSet`] and pulls
//!    units from a shared cursor until none are left. Pulling instead of
//!    pre-sharding keeps workers busy when unit sizes vary wildly.
//! 3. **Merge**: one task per name category appends all partial indexes for
//!    that category and finalizes the result.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use once_cell::sync::OnceCell;
use rayon::ThreadPool;
use tracing::{debug, info};

use super::classifier::UnitClassifier;
use super::progress::{IndexProgress, ProgressObserver};
use super::set::{IndexKind, IndexSet};
use crate::dwarf::{ScopedExtract, SymbolFile, Unit};

/// Units already covered by a faster index
///
/// When a binary ships an accelerator table that misses some units, only
/// those units are indexed manually. An index built with either set
/// non-empty is *partial*.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSets
{
    /// Offsets of compile units to leave out
    pub units_to_avoid: HashSet<u64>,
    /// Signatures of `.dwp` type units to leave out
    pub type_sigs_to_avoid: HashSet<u64>,
}

impl SkipSets
{
    pub fn is_partial(&self) -> bool
    {
        !self.units_to_avoid.is_empty() || !self.type_sigs_to_avoid.is_empty()
    }
}

/// Builds an [`IndexSet`] for a symbol file on a shared thread pool.
pub struct ParallelIndexBuilder
{
    pool: Arc<ThreadPool>,
    observer: Option<ProgressObserver>,
}

impl ParallelIndexBuilder
{
    pub fn new(pool: Arc<ThreadPool>) -> Self
    {
        Self { pool, observer: None }
    }

    /// Receive a callback for every completed build step.
    #[must_use]
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self
    {
        self.observer = Some(observer);
        self
    }

    /// Units the build will classify, in order
    ///
    /// All primary units not skipped by offset, followed by the `.dwp` type
    /// units not skipped by signature. Type units of private `.dwo` files
    /// are reached through their skeleton instead.
    pub fn units_to_index<'a>(symbols: &'a SymbolFile, skip: &SkipSets) -> Vec<&'a Unit>
    {
        let mut units: Vec<&Unit> = symbols
            .debug_info()
            .units()
            .iter()
            .map(|unit| &**unit)
            .filter(|unit| !skip.units_to_avoid.contains(&unit.offset()))
            .collect();

        if let Some(dwp) = symbols.dwp().filter(|dwp| dwp.contains_type_units()) {
            units.extend(
                dwp.units()
                    .iter()
                    .map(|unit| &**unit)
                    .filter(|unit| unit.kind().is_type_unit())
                    .filter(|unit| {
                        unit.type_signature()
                            .is_none_or(|signature| !skip.type_sigs_to_avoid.contains(&signature))
                    }),
            );
        }
        units
    }

    /// Build the finalized index. Never fails: unreadable units only leave
    /// their names out.
    pub fn build(&self, symbols: &SymbolFile, skip: &SkipSets) -> IndexSet
    {
        let units = Self::units_to_index(symbols, skip);
        if units.is_empty() {
            debug!("no units to index");
            return IndexSet::default();
        }

        let started = Instant::now();
        let workers = self.pool.current_num_threads().max(1);
        let total_steps = (units.len() * 2 + IndexKind::ALL.len()) as u64;
        let progress = IndexProgress::new(symbols.description(), total_steps, self.observer.clone());

        // Phase 1: the guards live until the end of this function.
        let extracted: Vec<OnceCell<ScopedExtract<'_>>> = units.iter().map(|_| OnceCell::new()).collect();
        self.for_each_unit(&units, workers, &progress, |_, idx, unit| match unit.extract_dies_scoped() {
            Ok(guard) => {
                let _ = extracted[idx].set(guard);
            }
            Err(err) => debug!(offset = unit.offset(), "failed to extract unit DIEs: {err}"),
        });

        // Phase 2. A unit that failed to extract is not decoded again; only
        // its resolved split units can still contribute.
        let partials: Vec<Mutex<IndexSet>> = (0..workers).map(|_| Mutex::new(IndexSet::default())).collect();
        self.for_each_unit(&units, workers, &progress, |worker, idx, unit| {
            if extracted[idx].get().is_none() && unit.split_unit().is_none() {
                return;
            }
            let mut partial = partials[worker].lock().unwrap();
            UnitClassifier::new(&mut partial).index_unit(unit);
        });
        let partials: Vec<IndexSet> = partials.into_iter().map(|partial| partial.into_inner().unwrap()).collect();

        // Phase 3
        let mut result = IndexSet::default();
        self.pool.scope(|scope| {
            for (kind, index) in result.categories_mut() {
                let partials = &partials;
                let progress = &progress;
                scope.spawn(move |_| {
                    for partial in partials {
                        index.append(partial.get(kind));
                    }
                    index.finalize();
                    progress.increment();
                });
            }
        });

        drop(extracted);
        info!(
            units = units.len(),
            workers,
            entries = result.len(),
            elapsed = ?started.elapsed(),
            "manual DWARF index built"
        );
        result
    }

    /// Run `f(worker, unit_index, unit)` for every unit on `workers` tasks
    /// pulling from one atomic cursor, and wait for all of them.
    fn for_each_unit<'a, F>(&self, units: &[&'a Unit], workers: usize, progress: &IndexProgress, f: F)
    where
        F: Fn(usize, usize, &'a Unit) + Sync,
    {
        let next = AtomicUsize::new(0);
        self.pool.scope(|scope| {
            for worker in 0..workers {
                let next = &next;
                let f = &f;
                scope.spawn(move |_| loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&unit) = units.get(idx) else {
                        break;
                    };
                    f(worker, idx, unit);
                    progress.increment();
                });
            }
        });
    }
}
