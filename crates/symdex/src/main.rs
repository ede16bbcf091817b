use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use symdex_core::index::IndexStats;
use symdex_core::prelude::*;
use symdex_core::symbols::display_name;
use symdex_utils::{debug, info, init_logging, init_logging_with_level, IndexSettings, LogFormat, LogLevel, LoggingGuard};

/// Build, cache, and query a manual DWARF name index.
#[derive(Parser, Debug)]
#[command(name = "symdex")]
#[command(version)]
#[command(about = "Build, cache, and query a manual DWARF name index for native binaries", long_about = None)]
struct Cli
{
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalOptions
{
    /// DWARF package (.dwp) holding the split units (default: <binary>.dwp if present)
    #[arg(long, global = true, value_name = "PATH")]
    dwp: Option<PathBuf>,

    /// Extra directory searched for .dwo files
    #[arg(long = "dwo-dir", global = true, value_name = "DIR")]
    dwo_dirs: Vec<PathBuf>,

    /// Neither read nor write the index cache
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    /// Cache directory (default: $SYMDEX_CACHE_DIR or the user cache dir)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Indexing worker threads (default: $SYMDEX_THREADS or all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Build (or load) the index and print statistics
    Index
    {
        /// Binary with DWARF debug info
        binary: PathBuf,
    },
    /// Print every name category of the index
    Dump
    {
        /// Binary with DWARF debug info
        binary: PathBuf,
    },
    /// List the distinct names of one category
    Names
    {
        /// Binary with DWARF debug info
        binary: PathBuf,
        /// Category to list
        #[arg(long, value_enum, default_value_t = Category::Types)]
        kind: Category,
        /// Show demangled names where possible
        #[arg(long, default_value_t = false)]
        demangle: bool,
    },
    /// Find the DIEs registered under a name
    Lookup
    {
        /// Binary with DWARF debug info
        binary: PathBuf,
        #[command(flatten)]
        target: LookupTarget,
        /// Treat the name as a regular expression
        #[arg(long, default_value_t = false)]
        regex: bool,
        /// Stop after this many results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Maintain the index cache directory
    Cache
    {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand
{
    /// Remove every cached index
    Clear,
    /// Print the cache directory
    Path,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct LookupTarget
{
    /// Function base name, full name, method or selector
    #[arg(long)]
    function: Option<String>,
    /// Type name
    #[arg(long = "type")]
    type_name: Option<String>,
    /// Global or static variable name
    #[arg(long)]
    global: Option<String>,
    /// Namespace name
    #[arg(long)]
    namespace: Option<String>,
    /// Objective-C class whose methods to list
    #[arg(long)]
    objc_class: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Category
{
    FunctionBasenames,
    FunctionFullnames,
    FunctionMethods,
    FunctionSelectors,
    ObjcClassSelectors,
    Globals,
    Types,
    Namespaces,
}

impl From<Category> for IndexKind
{
    fn from(category: Category) -> Self
    {
        match category {
            Category::FunctionBasenames => IndexKind::FunctionBasenames,
            Category::FunctionFullnames => IndexKind::FunctionFullnames,
            Category::FunctionMethods => IndexKind::FunctionMethods,
            Category::FunctionSelectors => IndexKind::FunctionSelectors,
            Category::ObjcClassSelectors => IndexKind::ObjcClassSelectors,
            Category::Globals => IndexKind::Globals,
            Category::Types => IndexKind::Types,
            Category::Namespaces => IndexKind::Namespaces,
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main()
{
    let cli = Cli::parse();

    let _guard = match start_logging(cli.options.log_level.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn start_logging(level: Option<&str>) -> CliResult<LoggingGuard>
{
    let guard = match level {
        Some(level) => {
            let format = std::env::var(symdex_utils::logging::LOG_FORMAT_ENV)
                .ok()
                .and_then(|f| f.parse::<LogFormat>().ok())
                .unwrap_or_default();
            init_logging_with_level(level.parse::<LogLevel>()?, format)?
        }
        None => init_logging()?,
    };
    Ok(guard)
}

fn run_command(cli: Cli) -> CliResult<()>
{
    let settings = IndexSettings::from_env()?
        .with_cache_dir(cli.options.cache_dir.clone())
        .with_cache_disabled(cli.options.no_cache)
        .with_threads(cli.options.threads);
    debug!(?settings, "resolved settings");

    match cli.command {
        Commands::Index { binary } => {
            let index = open_index(&binary, &cli.options, &settings)?;
            let set = index.index();
            let stats = index.stats().unwrap_or_default();
            print_summary(&index, set, stats);
            Ok(())
        }
        Commands::Dump { binary } => {
            let index = open_index(&binary, &cli.options, &settings)?;
            let mut text = String::new();
            index.dump(&mut text)?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{text}")?;
            Ok(())
        }
        Commands::Names {
            binary,
            kind,
            demangle,
        } => {
            let index = open_index(&binary, &cli.options, &settings)?;
            let mut stdout = io::stdout().lock();
            for name in index.index().get(kind.into()).names() {
                if demangle {
                    writeln!(stdout, "{}", display_name(name))?;
                } else {
                    writeln!(stdout, "{name}")?;
                }
            }
            Ok(())
        }
        Commands::Lookup {
            binary,
            target,
            regex,
            limit,
        } => {
            let index = open_index(&binary, &cli.options, &settings)?;
            let found = run_lookup(&index, &target, regex, limit)?;
            if found == 0 {
                info!("no matches");
            }
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheCommand::Clear => {
                let cache = DiskCache::new(&settings.cache_dir);
                let removed = cache.clear()?;
                println!("Removed {removed} cached index(es) from {}", settings.cache_dir.display());
                Ok(())
            }
            CacheCommand::Path => {
                println!("{}", settings.cache_dir.display());
                Ok(())
            }
        },
    }
}

fn open_index(binary: &Path, options: &GlobalOptions, settings: &IndexSettings) -> CliResult<ManualIndex>
{
    let mut load = LoadOptions::default();
    if let Some(dwp) = &options.dwp {
        load = load.with_dwp(dwp.clone());
    }
    for dir in &options.dwo_dirs {
        load = load.with_dwo_search_dir(dir.clone());
    }

    info!(binary = %binary.display(), "loading debug info");
    let symbols = load_symbol_file(binary, &load)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads.get())
        .thread_name(|i| format!("symdex-index-{i}"))
        .build()?;

    let mut index = ManualIndex::new(Arc::new(symbols), Arc::new(pool));
    if settings.cache_enabled {
        let cache: Arc<dyn IndexCache> = Arc::new(DiskCache::new(&settings.cache_dir));
        index = index.with_cache(cache);
    }
    Ok(index)
}

fn print_summary(index: &ManualIndex, set: &IndexSet, stats: IndexStats)
{
    let source = if stats.loaded_from_cache {
        "loaded from cache"
    } else if stats.saved_to_cache {
        "built and cached"
    } else {
        "built"
    };
    println!("{}", index.symbols().description());
    println!("  Index: {source} in {:.2?}", stats.index_time);
    println!("  Cache key: {}", index.cache_key());
    println!("  Entries: {}", set.len());
    for kind in IndexKind::ALL {
        println!("    {:<28} {}", kind.title(), set.get(kind).len());
    }
}

/// Print matches; returns how many were printed.
fn run_lookup(index: &ManualIndex, target: &LookupTarget, regex: bool, limit: Option<usize>) -> CliResult<usize>
{
    let limit = limit.unwrap_or(usize::MAX);
    let mut found = 0usize;
    let mut stdout = io::stdout().lock();
    let mut report = |die: DieRef| {
        if writeln!(stdout, "{die}").is_err() {
            return ControlFlow::Break(());
        }
        found += 1;
        if found >= limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };

    let pattern = |name: &str| -> CliResult<Regex> { Ok(Regex::new(name).map_err(IndexError::from)?) };

    let _ = match target {
        LookupTarget { function: Some(name), .. } if regex => index.get_functions_regex(&pattern(name)?, &mut report),
        LookupTarget { function: Some(name), .. } => {
            index.get_functions(&FunctionLookup::any(name.as_str()), None, &mut report)
        }
        LookupTarget { type_name: Some(name), .. } if regex => {
            index.index().types.find_regex(&pattern(name)?, &mut report)
        }
        LookupTarget { type_name: Some(name), .. } => index.get_types(name, &mut report),
        LookupTarget { global: Some(name), .. } if regex => {
            index.get_global_variables_regex(&pattern(name)?, &mut report)
        }
        LookupTarget { global: Some(name), .. } => index.get_global_variables(name, &mut report),
        LookupTarget { namespace: Some(name), .. } if regex => {
            index.index().namespaces.find_regex(&pattern(name)?, &mut report)
        }
        LookupTarget { namespace: Some(name), .. } => index.get_namespaces(name, &mut report),
        LookupTarget { objc_class: Some(name), .. } if regex => {
            index.index().objc_class_selectors.find_regex(&pattern(name)?, &mut report)
        }
        LookupTarget { objc_class: Some(name), .. } => index.get_objc_methods(name, &mut report),
        _ => ControlFlow::Continue(()),
    };
    Ok(found)
}
