//! Tests for persisting indexes in a cache directory

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;

use common::{function, global, manual_index, symbols, UnitBuilder};
use symdex_core::index::{DiskCache, IndexCache};

fn sample() -> Vec<symdex_core::dwarf::Unit>
{
    let mut unit = UnitBuilder::compile(0);
    unit.leaf(function("parse", Some("_Z5parsev")));
    unit.leaf(global("verbose"));
    vec![unit.build()]
}

#[test]
fn test_index_survives_a_new_process()
{
    let dir = tempfile::tempdir().unwrap();
    let (_, file) = symbols(sample());

    let first = manual_index(&file).with_cache(Arc::new(DiskCache::new(dir.path())));
    let expected = first.index().clone();
    assert!(first.stats().unwrap().saved_to_cache);
    assert!(DiskCache::new(dir.path()).path_for(&first.cache_key()).is_file());

    // A fresh cache handle over the same directory stands in for a restart.
    let second = manual_index(&file).with_cache(Arc::new(DiskCache::new(dir.path())));
    assert_eq!(second.index(), &expected);
    assert_eq!(second.build_count(), 0);
    assert!(second.stats().unwrap().loaded_from_cache);
}

#[test]
fn test_truncated_cache_file_is_rebuilt()
{
    let dir = tempfile::tempdir().unwrap();
    let (_, file) = symbols(sample());
    let cache = Arc::new(DiskCache::new(dir.path()));

    let first = manual_index(&file).with_cache(cache.clone());
    first.index();
    let path = cache.path_for(&first.cache_key());
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let second = manual_index(&file).with_cache(cache.clone());
    assert_eq!(second.index(), first.index());
    assert_eq!(second.build_count(), 1);
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_clear_removes_only_index_entries()
{
    let dir = tempfile::tempdir().unwrap();
    let (_, file) = symbols(sample());
    let cache = Arc::new(DiskCache::new(dir.path()));
    manual_index(&file).with_cache(cache.clone()).index();
    fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    assert_eq!(cache.clear().unwrap(), 1);
    assert!(dir.path().join("notes.txt").exists());

    let key = manual_index(&file).cache_key();
    assert!(cache.get(&key).is_none());
}

#[test]
fn test_missing_directory_is_created_on_write()
{
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let cache = DiskCache::new(&nested);

    assert!(cache.get("x-dwarf-index-full-0x00000000").is_none());
    assert!(cache.put("x-dwarf-index-full-0x00000000", b"payload"));
    assert_eq!(cache.get("x-dwarf-index-full-0x00000000").as_deref(), Some(&b"payload"[..]));
    cache.remove("x-dwarf-index-full-0x00000000");
    assert!(cache.get("x-dwarf-index-full-0x00000000").is_none());
}

#[test]
fn test_concurrent_writers_of_one_key()
{
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(DiskCache::new(dir.path()));
    let key = "a.out-0000abcd-dwarf-index-full-0x12345678";
    let payloads: Vec<Vec<u8>> = (0..8u8).map(|n| vec![n; 64 * 1024]).collect();

    thread::scope(|scope| {
        for payload in &payloads {
            let cache = &cache;
            scope.spawn(move || {
                for _ in 0..10 {
                    cache.put(key, payload);
                }
            });
        }
    });

    let stored = cache.get(key).unwrap();
    assert!(payloads.contains(&stored));
    let files: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|entry| entry.unwrap().file_name()).collect();
    assert_eq!(files, vec![std::ffi::OsString::from(key)]);
}
