//! The cache contract shared by every backend.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::CacheResult;

/// Key/value cache of named binary files.
///
/// The key is the file name, the value the file's bytes plus the time of the
/// last successful write. Implementations are safe to share across threads and
/// across processes pointing at the same backing store.
pub trait FileCache: Send + Sync {
    /// Store `data` under `name`, replacing any previous entry.
    fn write_file(&self, name: &str, data: &[u8]) -> CacheResult<()>;

    /// Read a snapshot of the entry.
    ///
    /// Fails with [`CacheError::NotFound`](crate::CacheError::NotFound) if the
    /// entry does not exist.
    fn read_file(&self, name: &str) -> CacheResult<CachedFile>;

    /// Delete the entry. Does nothing if it is not cached.
    fn remove_file(&self, name: &str) -> CacheResult<()>;

    /// Whether the entry is cached. Backend failures read as `false`.
    fn is_cached(&self, name: &str) -> bool;

    /// Last write time in milliseconds since the Unix epoch (UTC), or 0 if the
    /// entry is not cached or can't be inspected.
    fn last_modified(&self, name: &str) -> i64;
}

impl<T: FileCache + ?Sized> FileCache for Box<T> {
    fn write_file(&self, name: &str, data: &[u8]) -> CacheResult<()> {
        (**self).write_file(name, data)
    }

    fn read_file(&self, name: &str) -> CacheResult<CachedFile> {
        (**self).read_file(name)
    }

    fn remove_file(&self, name: &str) -> CacheResult<()> {
        (**self).remove_file(name)
    }

    fn is_cached(&self, name: &str) -> bool {
        (**self).is_cached(name)
    }

    fn last_modified(&self, name: &str) -> i64 {
        (**self).last_modified(name)
    }
}

impl<T: FileCache + ?Sized> FileCache for Arc<T> {
    fn write_file(&self, name: &str, data: &[u8]) -> CacheResult<()> {
        (**self).write_file(name, data)
    }

    fn read_file(&self, name: &str) -> CacheResult<CachedFile> {
        (**self).read_file(name)
    }

    fn remove_file(&self, name: &str) -> CacheResult<()> {
        (**self).remove_file(name)
    }

    fn is_cached(&self, name: &str) -> bool {
        (**self).is_cached(name)
    }

    fn last_modified(&self, name: &str) -> i64 {
        (**self).last_modified(name)
    }
}

/// File retrieved from a cache.
///
/// Owns its bytes: changing them never touches the cache. Use
/// [`FileCache::write_file`] to store new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    name: String,
    data: Vec<u8>,
    last_modified: i64,
}

impl CachedFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>, last_modified: i64) -> Self {
        Self {
            name: name.into(),
            data,
            last_modified,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Milliseconds since the Unix epoch (UTC).
    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    /// Last write time as a UTC timestamp, if representable.
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_modified)
    }

    /// Stream view over the snapshot.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.data.as_slice())
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch (UTC).
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
