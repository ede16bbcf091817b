//! Lazily built, cache-backed name index of one symbol file.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use rayon::ThreadPool;
use regex::Regex;
use tracing::{debug, info, warn};

use super::builder::{ParallelIndexBuilder, SkipSets};
use super::cache::IndexCache;
use super::codec;
use super::progress::ProgressObserver;
use super::query::{DeclContext, FunctionLookup, FunctionNameType};
use super::set::{IndexKind, IndexSet};
use crate::dwarf::SymbolFile;
use crate::types::{DieRef, UnitSpan};

/// How the index came to be
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats
{
    /// The index was decoded from the cache instead of built
    pub loaded_from_cache: bool,
    /// A freshly built index was written to the cache
    pub saved_to_cache: bool,
    /// Time spent loading or building
    pub index_time: Duration,
}

struct Indexed
{
    set: IndexSet,
    stats: IndexStats,
}

/// Name index of one symbol file, built on first use
///
/// The first lookup (or an explicit [`ManualIndex::index`]) loads the index
/// from the cache when a valid entry exists, and otherwise builds it on the
/// thread pool and saves it. Later calls reuse the result; concurrent first
/// calls block until the one build finishes.
///
/// All lookups report matches through a callback returning
/// [`ControlFlow`]; `Break` ends the lookup early and is returned to the
/// caller.
///
/// ## Example
///
/// ```rust,no_run
/// use std::ops::ControlFlow;
/// use std::sync::Arc;
///
/// use symdex_core::dwarf::{load_symbol_file, LoadOptions};
/// use symdex_core::index::ManualIndex;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>>
/// {
///     let symbols = load_symbol_file("/path/to/binary".as_ref(), &LoadOptions::default())?;
///     let pool = Arc::new(rayon::ThreadPoolBuilder::new().build()?);
///     let index = ManualIndex::new(Arc::new(symbols), pool);
///
///     let _ = index.get_types("Point", |die| {
///         println!("Point defined at {die}");
///         ControlFlow::Continue(())
///     });
///     Ok(())
/// }
/// ```
pub struct ManualIndex
{
    symbols: Arc<SymbolFile>,
    pool: Arc<ThreadPool>,
    cache: Option<Arc<dyn IndexCache>>,
    skip: SkipSets,
    observer: Option<ProgressObserver>,
    state: OnceCell<Indexed>,
    builds: AtomicUsize,
}

impl ManualIndex
{
    pub fn new(symbols: Arc<SymbolFile>, pool: Arc<ThreadPool>) -> Self
    {
        Self {
            symbols,
            pool,
            cache: None,
            skip: SkipSets::default(),
            observer: None,
            state: OnceCell::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Load from and save to `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn IndexCache>) -> Self
    {
        self.cache = Some(cache);
        self
    }

    /// Leave out units covered by an accelerator table.
    #[must_use]
    pub fn with_skip_sets(mut self, skip: SkipSets) -> Self
    {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self
    {
        self.observer = Some(observer);
        self
    }

    pub fn symbols(&self) -> &SymbolFile
    {
        &self.symbols
    }

    pub fn is_partial(&self) -> bool
    {
        self.skip.is_partial()
    }

    pub fn cache_key(&self) -> String
    {
        codec::cache_key(self.symbols.identity().as_ref(), self.is_partial())
    }

    pub fn is_indexed(&self) -> bool
    {
        self.state.get().is_some()
    }

    /// Statistics of the index, `None` before it exists.
    pub fn stats(&self) -> Option<IndexStats>
    {
        self.state.get().map(|indexed| indexed.stats)
    }

    /// Number of times the index was built from debug info (0 or 1).
    pub fn build_count(&self) -> usize
    {
        self.builds.load(Ordering::Relaxed)
    }

    /// Make sure the index exists and return it.
    pub fn index(&self) -> &IndexSet
    {
        &self.state.get_or_init(|| self.load_or_build()).set
    }

    fn load_or_build(&self) -> Indexed
    {
        let started = Instant::now();
        if let Some(set) = self.load_from_cache() {
            let stats = IndexStats {
                loaded_from_cache: true,
                saved_to_cache: false,
                index_time: started.elapsed(),
            };
            info!(module = %self.symbols.description(), entries = set.len(), "loaded DWARF index from cache");
            return Indexed { set, stats };
        }

        if ParallelIndexBuilder::units_to_index(&self.symbols, &self.skip).is_empty() {
            debug!(module = %self.symbols.description(), "nothing to index");
            return Indexed {
                set: IndexSet::default(),
                stats: IndexStats {
                    index_time: started.elapsed(),
                    ..IndexStats::default()
                },
            };
        }

        self.builds.fetch_add(1, Ordering::Relaxed);
        let mut builder = ParallelIndexBuilder::new(self.pool.clone());
        if let Some(observer) = &self.observer {
            builder = builder.with_observer(observer.clone());
        }
        let set = builder.build(&self.symbols, &self.skip);
        let saved_to_cache = self.save_to_cache(&set);
        Indexed {
            set,
            stats: IndexStats {
                loaded_from_cache: false,
                saved_to_cache,
                index_time: started.elapsed(),
            },
        }
    }

    /// Decode the cached index. Entries that are stale or unreadable are
    /// removed so the next save replaces them.
    fn load_from_cache(&self) -> Option<IndexSet>
    {
        let cache = self.cache.as_ref()?;
        let key = self.cache_key();
        let bytes = cache.get(&key)?;
        match codec::decode(&bytes, self.symbols.identity().as_ref()) {
            Ok(set) => Some(set),
            Err(err) => {
                if err.is_cache_miss() {
                    debug!(%key, "discarding index cache entry: {err}");
                } else {
                    warn!(%key, "discarding unreadable index cache entry: {err}");
                }
                cache.remove(&key);
                None
            }
        }
    }

    fn save_to_cache(&self, set: &IndexSet) -> bool
    {
        let Some(cache) = self.cache.as_ref() else {
            return false;
        };
        let key = self.cache_key();
        match codec::encode(set, self.symbols.identity().as_ref()) {
            Ok(bytes) => cache.put(&key, &bytes),
            Err(err) => {
                debug!(%key, "not caching index: {err}");
                false
            }
        }
    }

    /// Functions named `lookup.name` in the categories of its mask
    ///
    /// `in_decl_context`, when given, filters full and base name matches;
    /// methods and selectors are only searched without it.
    pub fn get_functions<F>(
        &self,
        lookup: &FunctionLookup,
        in_decl_context: Option<&dyn Fn(DieRef) -> bool>,
        mut callback: F,
    ) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        let set = self.index();
        let name = lookup.name.as_ref();
        let mut filtered = |die: DieRef| match in_decl_context {
            Some(filter) if !filter(die) => ControlFlow::Continue(()),
            _ => callback(die),
        };

        if lookup.name_type.contains(FunctionNameType::FULL) {
            set.function_fullnames.find(name, &mut filtered)?;
        }
        if lookup.name_type.contains(FunctionNameType::BASE) {
            set.function_basenames.find(name, &mut filtered)?;
        }
        if in_decl_context.is_none() {
            if lookup.name_type.contains(FunctionNameType::METHOD) {
                set.function_methods.find(name, &mut filtered)?;
            }
            if lookup.name_type.contains(FunctionNameType::SELECTOR) {
                set.function_selectors.find(name, &mut filtered)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// Functions whose base or full name matches `regex`.
    pub fn get_functions_regex<F>(&self, regex: &Regex, mut callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        let set = self.index();
        set.function_basenames.find_regex(regex, &mut callback)?;
        set.function_fullnames.find_regex(regex, &mut callback)
    }

    pub fn get_types<F>(&self, name: &str, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        self.index().types.find(name, callback)
    }

    /// Types named like the innermost scope of `context`; the enclosing
    /// scopes are for the callback to check.
    pub fn get_types_in_context<F>(&self, context: &DeclContext, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        let set = self.index();
        match context.innermost_name() {
            Some(name) => set.types.find(name, callback),
            None => ControlFlow::Continue(()),
        }
    }

    pub fn get_global_variables<F>(&self, name: &str, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        self.index().globals.find(name, callback)
    }

    pub fn get_global_variables_regex<F>(&self, regex: &Regex, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        self.index().globals.find_regex(regex, callback)
    }

    /// Every global defined in `unit`.
    pub fn get_global_variables_for_unit<F>(&self, unit: &UnitSpan, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        self.index().globals.find_all_entries_for_unit(unit, callback)
    }

    pub fn get_namespaces<F>(&self, name: &str, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        self.index().namespaces.find(name, callback)
    }

    /// Objective-C methods of `class_name` (with or without category).
    pub fn get_objc_methods<F>(&self, class_name: &str, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        self.index().objc_class_selectors.find(class_name, callback)
    }

    /// Type DIEs of an Objective-C class
    ///
    /// Every type of that name is reported; telling an implementation from
    /// an interface when `must_be_implementation` is set needs the DIE's
    /// attributes and is up to the callback.
    pub fn get_complete_objc_class<F>(&self, class_name: &str, must_be_implementation: bool, callback: F) -> ControlFlow<()>
    where
        F: FnMut(DieRef) -> ControlFlow<()>,
    {
        let set = self.index();
        if must_be_implementation {
            debug!(class_name, "implementation check deferred to the caller");
        }
        set.types.find(class_name, callback)
    }

    /// Every category with one line per entry.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result
    {
        let set = self.index();
        let identity = self.symbols.identity();
        write!(
            out,
            "Manual DWARF index for ({}) '{}':",
            identity.architecture(),
            identity.path().display()
        )?;
        for kind in IndexKind::ALL {
            write!(out, "\n{}:\n", kind.title())?;
            set.get(kind).dump(out)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ManualIndex
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ManualIndex")
            .field("module", &self.symbols.description())
            .field("partial", &self.is_partial())
            .field("cached", &self.cache.is_some())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
