#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use filecache::{FileCache, FileSystemCache, SqliteCache};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Filesystem cache rooted in `root`. Calling it twice with the same root
/// gives two instances over the same store.
pub fn open_fs(root: &Path) -> Arc<dyn FileCache> {
    Arc::new(FileSystemCache::new(root.join("files")))
}

/// SQLite cache stored in `root`. Calling it twice with the same root gives two
/// instances over the same database file.
pub fn open_sqlite(root: &Path) -> Arc<dyn FileCache> {
    Arc::new(SqliteCache::open(root.join("files.db")).unwrap())
}

/// `len` bytes where neighbouring bytes differ and the pattern depends on `seed`.
pub fn distinct_bytes(len: usize, seed: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_add(seed * 31) % 251) as u8).collect()
}
