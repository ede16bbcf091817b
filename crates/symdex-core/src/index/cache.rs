//! Persistent stores for encoded indexes.
//!
//! A store maps a key from [`cache_key`](super::codec::cache_key) to the
//! bytes produced by [`encode`](super::codec::encode). Stores never fail
//! loudly: a missing or unreadable entry is a miss and a failed write is
//! logged and forgotten, since the index can always be rebuilt.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

/// Key-value store for encoded indexes, shared between threads.
pub trait IndexCache: Send + Sync
{
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `bytes` under `key`; `false` if nothing was written.
    fn put(&self, key: &str, bytes: &[u8]) -> bool;

    fn remove(&self, key: &str);
}

/// Marker present in every index cache key.
const INDEX_KEY_MARKER: &str = "-dwarf-index-";

/// One file per key in a directory.
///
/// Writes go to a temporary file that is renamed into place, so readers
/// never observe a half-written entry.
#[derive(Debug, Clone)]
pub struct DiskCache
{
    dir: PathBuf,
}

impl DiskCache
{
    pub fn new(dir: impl Into<PathBuf>) -> Self
    {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path
    {
        &self.dir
    }

    /// File holding the entry for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf
    {
        self.dir.join(sanitize_key(key))
    }

    /// Delete every index entry in the directory, returning how many were
    /// removed. Other files are left alone.
    pub fn clear(&self) -> io::Result<usize>
    {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let is_index = entry.file_name().to_str().is_some_and(|name| name.contains(INDEX_KEY_MARKER));
            if is_index && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, "cleared index cache");
        Ok(removed)
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> io::Result<()>
    {
        fs::create_dir_all(&self.dir)?;
        // Every writer gets its own file; a failed persist deletes it.
        let mut tmp = tempfile::Builder::new()
            .prefix(".symdex-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl IndexCache for DiskCache
{
    fn get(&self, key: &str) -> Option<Vec<u8>>
    {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    debug!(path = %path.display(), "failed to read index cache entry: {err}");
                }
                None
            }
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> bool
    {
        let path = self.path_for(key);
        match self.write_atomically(&path, bytes) {
            Ok(()) => true,
            Err(err) => {
                debug!(path = %path.display(), "failed to write index cache entry: {err}");
                false
            }
        }
    }

    fn remove(&self, key: &str)
    {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "failed to remove index cache entry: {err}");
            }
            _ => {}
        }
    }
}

/// In-process store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCache
{
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn len(&self) -> usize
    {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String>
    {
        let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl IndexCache for MemoryCache
{
    fn get(&self, key: &str) -> Option<Vec<u8>>
    {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, bytes: &[u8]) -> bool
    {
        self.entries.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        true
    }

    fn remove(&self, key: &str)
    {
        self.entries.lock().unwrap().remove(key);
    }
}

/// Keys embed module names; keep them to one portable path component.
fn sanitize_key(key: &str) -> String
{
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
