//! Tests for building, caching and querying through `ManualIndex`

mod common;

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{function, gather, global, manual_index, named, pool, string, symbols, UnitBuilder};
use gimli::constants;
use regex::Regex;
use symdex_core::dwarf::{AttrValue, Die, SymbolFile, Unit};
use symdex_core::index::codec;
use symdex_core::index::{
    DeclContext, FunctionLookup, FunctionNameType, IndexCache, IndexKind, ManualIndex, MemoryCache, ProgressUpdate,
    SkipSets, INDEX_PROGRESS_TITLE,
};
use symdex_core::types::DieRef;
use symdex_core::IndexError;

/// Memory cache that counts writes and removals.
#[derive(Default)]
struct CountingCache
{
    inner: MemoryCache,
    puts: AtomicUsize,
    removes: AtomicUsize,
}

impl CountingCache
{
    fn puts(&self) -> usize
    {
        self.puts.load(Ordering::SeqCst)
    }

    fn removes(&self) -> usize
    {
        self.removes.load(Ordering::SeqCst)
    }
}

impl IndexCache for CountingCache
{
    fn get(&self, key: &str) -> Option<Vec<u8>>
    {
        self.inner.get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> bool
    {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, bytes)
    }

    fn remove(&self, key: &str)
    {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key);
    }
}

/// A C++ unit with a bit of everything and an Objective-C unit.
fn sample_units() -> Vec<Unit>
{
    let mut cpp = UnitBuilder::compile(0);
    cpp.leaf(function("foo", Some("_Z3foov")));
    cpp.open(named(constants::DW_TAG_namespace, "geo"));
    cpp.open(named(constants::DW_TAG_structure_type, "Point"));
    cpp.leaf(
        named(constants::DW_TAG_subprogram, "length")
            .with_attr(constants::DW_AT_low_pc, AttrValue::Unsigned(0x3000))
            .with_attr(constants::DW_AT_linkage_name, string("_ZNK3geo5Point6lengthEv")),
    );
    cpp.close();
    cpp.close();
    cpp.leaf(global("g_count"));
    cpp.leaf(function("größe", None));

    let mut objc = UnitBuilder::compile(0x400).language(constants::DW_LANG_ObjC);
    objc.leaf(function("-[MyClass(Category) doThing:]", None));
    objc.leaf(named(constants::DW_TAG_structure_type, "MyClass"));
    objc.leaf(global("関数"));

    vec![cpp.build(), objc.build()]
}

/// `count` units, each defining `fn_<i>` and `var_<i>`.
fn numbered_units(count: u64) -> Vec<Unit>
{
    (0..count)
        .map(|i| {
            let mut unit = UnitBuilder::compile(i * 0x1000).language(constants::DW_LANG_C99);
            unit.leaf(function(&format!("fn_{i}"), None));
            unit.leaf(global(&format!("var_{i}")));
            unit.build()
        })
        .collect()
}

/// Base name lookup; free functions without a linkage name are also full
/// names, so `FunctionLookup::any` would report them twice.
fn functions(index: &ManualIndex, name: &str) -> Vec<DieRef>
{
    gather(|cb| index.get_functions(&FunctionLookup::new(name, FunctionNameType::BASE), None, cb))
}

#[test]
fn test_every_function_is_found_in_its_unit()
{
    let units = numbered_units(37);
    let spans: Vec<_> = units.iter().map(Unit::span).collect();
    let (_, file) = symbols(units);
    let index = ManualIndex::new(file, pool(4));

    for (i, span) in spans.iter().enumerate() {
        let found = functions(&index, &format!("fn_{i}"));
        assert!(!found.is_empty(), "fn_{i} missing");
        assert!(found.iter().all(|die| span.contains(*die)));

        let globals = gather(|cb| index.get_global_variables_for_unit(span, cb));
        assert_eq!(globals.len(), 1);
    }
    assert_eq!(index.index().function_basenames.len(), 37);
}

#[test]
fn test_single_worker_matches_many_workers()
{
    let (_, file) = symbols(numbered_units(12));
    let one = ManualIndex::new(file.clone(), pool(1));
    let many = ManualIndex::new(file, pool(6));
    assert_eq!(one.index(), many.index());
}

#[test]
fn test_index_is_built_once_and_saved_once()
{
    let (_, file) = symbols(sample_units());
    let cache = Arc::new(CountingCache::default());
    let index = manual_index(&file).with_cache(cache.clone());

    assert!(!index.is_indexed());
    let first = functions(&index, "foo");
    let second = functions(&index, "foo");

    assert!(index.is_indexed());
    assert_eq!(first, second);
    assert_eq!(index.build_count(), 1);
    assert_eq!(cache.puts(), 1);
    let stats = index.stats().unwrap();
    assert!(!stats.loaded_from_cache);
    assert!(stats.saved_to_cache);
}

#[test]
fn test_concurrent_first_lookups_build_once()
{
    let (_, file) = symbols(numbered_units(20));
    let index = Arc::new(manual_index(&file));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let index = index.clone();
            scope.spawn(move || {
                assert_eq!(functions(&index, "fn_3").len(), 1);
            });
        }
    });
    assert_eq!(index.build_count(), 1);
}

#[test]
fn test_cached_index_round_trips()
{
    let (_, file) = symbols(sample_units());
    let cache = Arc::new(MemoryCache::new());

    let built = manual_index(&file).with_cache(cache.clone());
    let expected = built.index().clone();
    assert_eq!(cache.keys(), vec![built.cache_key()]);

    let loaded = manual_index(&file).with_cache(cache.clone());
    assert_eq!(loaded.index(), &expected);
    assert_eq!(loaded.build_count(), 0);
    assert!(loaded.stats().unwrap().loaded_from_cache);

    // Non-ASCII names survive the string table.
    assert_eq!(functions(&loaded, "größe").len(), 1);
    assert_eq!(gather(|cb| loaded.get_global_variables("関数", cb)).len(), 1);
}

#[test]
fn test_partial_and_full_indexes_use_different_keys()
{
    let (_, file) = symbols(numbered_units(3));
    let cache = Arc::new(MemoryCache::new());

    let mut skip = SkipSets::default();
    skip.units_to_avoid.insert(0x1000);
    let partial = manual_index(&file).with_cache(cache.clone()).with_skip_sets(skip);
    let full = manual_index(&file).with_cache(cache.clone());

    assert!(partial.is_partial());
    assert!(!full.is_partial());
    assert_ne!(partial.cache_key(), full.cache_key());
    assert!(partial.cache_key().contains("-dwarf-index-partial-"));
    assert!(full.cache_key().contains("-dwarf-index-full-"));

    assert!(functions(&partial, "fn_1").is_empty());
    assert_eq!(partial.build_count(), 1);

    // The partial entry must not satisfy the full request.
    assert_eq!(functions(&full, "fn_1").len(), 1);
    assert_eq!(full.build_count(), 1);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_signature_mismatch_forces_rebuild()
{
    let (identity, file) = symbols(sample_units());
    let cache = Arc::new(CountingCache::default());

    let first = manual_index(&file).with_cache(cache.clone());
    first.index();
    let key = first.cache_key();
    let stale = cache.get(&key).unwrap();

    identity.touch();
    assert!(matches!(
        codec::decode(&stale, identity.as_ref()),
        Err(IndexError::SignatureMismatch)
    ));

    let second = manual_index(&file).with_cache(cache.clone());
    assert_eq!(functions(&second, "foo").len(), 1);
    assert_eq!(second.build_count(), 1);
    assert!(!second.stats().unwrap().loaded_from_cache);
    assert_eq!(cache.removes(), 1);
    assert_eq!(cache.puts(), 2);

    // The rewritten entry matches the new signature.
    let fresh = cache.get(&key).unwrap();
    assert_eq!(&codec::decode(&fresh, identity.as_ref()).unwrap(), second.index());
}

#[test]
fn test_missing_signature_is_not_persisted()
{
    let (identity, file) = symbols(sample_units());
    identity.set_signature(None);
    let cache = Arc::new(MemoryCache::new());

    let index = manual_index(&file).with_cache(cache.clone());
    assert_eq!(functions(&index, "foo").len(), 1);
    assert!(!index.stats().unwrap().saved_to_cache);
    assert!(cache.is_empty());
}

#[test]
fn test_corrupt_entry_is_replaced()
{
    let (_, file) = symbols(sample_units());
    let cache = Arc::new(CountingCache::default());
    let key = manual_index(&file).cache_key();
    cache.inner.put(&key, b"SDIX\x01\x00garbage");

    let index = manual_index(&file).with_cache(cache.clone());
    assert_eq!(functions(&index, "foo").len(), 1);
    assert_eq!(index.build_count(), 1);
    assert_eq!(cache.removes(), 1);
    assert!(codec::decode(&cache.get(&key).unwrap(), file.identity().as_ref()).is_ok());
}

#[test]
fn test_empty_module_is_indexed_but_not_saved()
{
    let (_, file) = symbols(Vec::new());
    let cache = Arc::new(MemoryCache::new());
    let index = manual_index(&file).with_cache(cache.clone());

    assert!(index.index().is_empty());
    assert!(index.is_indexed());
    assert_eq!(index.build_count(), 0);
    assert!(cache.is_empty());
}

#[test]
fn test_function_name_type_mask_and_context_filter()
{
    let (_, file) = symbols(sample_units());
    let index = manual_index(&file);

    let base_only = FunctionLookup::new("foo", FunctionNameType::BASE);
    assert_eq!(gather(|cb| index.get_functions(&base_only, None, cb)).len(), 1);
    let full_only = FunctionLookup::new("foo", FunctionNameType::FULL);
    assert!(gather(|cb| index.get_functions(&full_only, None, cb)).is_empty());

    let method = FunctionLookup::new("length", FunctionNameType::METHOD);
    assert_eq!(gather(|cb| index.get_functions(&method, None, cb)).len(), 1);
    // Methods are only searched without a context filter.
    let accept_all: &dyn Fn(DieRef) -> bool = &|_| true;
    assert!(gather(|cb| index.get_functions(&method, Some(accept_all), cb)).is_empty());

    let reject_all: &dyn Fn(DieRef) -> bool = &|_| false;
    assert!(gather(|cb| index.get_functions(&FunctionLookup::any("foo"), Some(reject_all), cb)).is_empty());
    assert_eq!(gather(|cb| index.get_functions(&FunctionLookup::any("foo"), Some(accept_all), cb)).len(), 1);

    let selector = FunctionLookup::new("doThing:", FunctionNameType::SELECTOR);
    assert_eq!(gather(|cb| index.get_functions(&selector, None, cb)).len(), 1);
}

#[test]
fn test_regex_lookups()
{
    let (_, file) = symbols(numbered_units(12));
    let index = manual_index(&file);

    let ones = Regex::new("^fn_1[0-9]?$").unwrap();
    // fn_1, fn_10, fn_11: each found as base and full name.
    assert_eq!(gather(|cb| index.get_functions_regex(&ones, cb)).len(), 6);

    let vars = Regex::new("^var_[2-4]$").unwrap();
    assert_eq!(gather(|cb| index.get_global_variables_regex(&vars, cb)).len(), 3);
}

#[test]
fn test_lookups_stop_when_asked()
{
    let (_, file) = symbols(numbered_units(5));
    let index = manual_index(&file);
    let all = Regex::new("fn_").unwrap();

    let mut seen = 0;
    let flow = index.get_functions_regex(&all, |_| {
        seen += 1;
        if seen == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert_eq!(flow, ControlFlow::Break(()));
    assert_eq!(seen, 2);
}

#[test]
fn test_type_namespace_and_objc_lookups()
{
    let (_, file) = symbols(sample_units());
    let index = manual_index(&file);

    assert_eq!(gather(|cb| index.get_types("Point", cb)).len(), 1);
    assert_eq!(gather(|cb| index.get_namespaces("geo", cb)).len(), 1);

    let context = DeclContext::default()
        .with_parent(constants::DW_TAG_structure_type, "Point")
        .with_parent(constants::DW_TAG_namespace, "geo");
    assert_eq!(
        gather(|cb| index.get_types_in_context(&context, cb)),
        gather(|cb| index.get_types("Point", cb))
    );
    assert!(gather(|cb| index.get_types_in_context(&DeclContext::default(), cb)).is_empty());

    let methods = gather(|cb| index.get_objc_methods("MyClass", cb));
    assert_eq!(methods.len(), 1);
    assert_eq!(gather(|cb| index.get_objc_methods("MyClass(Category)", cb)), methods);
    assert_eq!(gather(|cb| index.get_complete_objc_class("MyClass", true, cb)).len(), 1);
}

#[test]
fn test_progress_reports_every_step()
{
    let (_, file) = symbols(numbered_units(5));
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::default();
    let sink = updates.clone();
    let index = manual_index(&file).with_observer(Arc::new(move |update: &ProgressUpdate| {
        sink.lock().unwrap().push(update.clone());
    }));
    index.index();

    let updates = updates.lock().unwrap();
    let total = 5 * 2 + IndexKind::ALL.len() as u64;
    assert_eq!(updates.len() as u64, total);
    assert!(updates.iter().all(|u| u.total == total && u.title == INDEX_PROGRESS_TITLE));
    assert!(updates.iter().all(|u| u.details.contains("/build/a.out")));
    assert_eq!(updates.iter().map(|u| u.completed).max(), Some(total));
}

#[test]
fn test_build_releases_only_what_it_extracted()
{
    let units = numbered_units(4);
    let (_, file) = symbols(units);
    file.debug_info().units()[1].entries().unwrap();

    let index = manual_index(&file);
    index.index();

    let resident: Vec<bool> = file.debug_info().units().iter().map(|u| u.is_resident()).collect();
    assert_eq!(resident, vec![false, true, false, false]);
}

#[test]
fn test_unreadable_unit_only_loses_its_names()
{
    struct Broken(Arc<AtomicUsize>);
    impl symdex_core::dwarf::DieSource for Broken
    {
        fn load(&self) -> symdex_core::IndexResult<Vec<Die>>
        {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(IndexError::Object("truncated unit".to_string()))
        }
    }

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut units = numbered_units(2);
    let header = units[1].header().clone();
    units[1] = Unit::new(header, Broken(attempts.clone()));
    let (_, file) = symbols(units);
    let index = manual_index(&file);

    assert_eq!(functions(&index, "fn_0").len(), 1);
    assert!(functions(&index, "fn_1").is_empty());
    // Decoding is attempted once per build, not again when classifying.
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dump_lists_categories_in_order()
{
    let mut unit = UnitBuilder::compile(0).language(constants::DW_LANG_C99);
    let main = unit.leaf(function("main", None));
    let (_, file) = symbols(vec![unit.build()]);
    let index = manual_index(&file);

    let mut text = String::new();
    index.dump(&mut text).unwrap();

    assert!(text.starts_with("Manual DWARF index for (x86_64) '/build/a.out':\nFunction basenames:\n"));
    assert!(text.contains(&format!("{main} \"main\"\n")));
    let positions: Vec<usize> = IndexKind::ALL
        .iter()
        .map(|kind| text.find(&format!("\n{}:\n", kind.title())).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_symbol_file_description()
{
    let (_, file): (_, Arc<SymbolFile>) = symbols(Vec::new());
    assert_eq!(file.description(), "/build/a.out(x86_64)");
}
