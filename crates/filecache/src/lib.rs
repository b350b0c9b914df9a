//! Durable, local, named-blob cache.
//!
//! Maps string names to byte payloads plus a last-modified timestamp,
//! persisted across restarts and safe to share between threads and processes
//! on the same host. Two interchangeable backends implement [`FileCache`]:
//!
//! - [`FileSystemCache`]: one file per entry beneath a base directory, published
//!   atomically with temp-file + rename.
//! - [`SqliteCache`]: one row per entry in a single SQLite database file, with
//!   one connection per file shared process-wide.
//!
//! # Quick Start
//!
//! ```no_run
//! use filecache::{FileCache, FileSystemCache, SqliteCache};
//!
//! # fn example() -> Result<(), filecache::CacheError> {
//! let cache = FileSystemCache::new("/var/cache/app");
//! cache.write_file("some/directory/structure/small", &[1, 2, 3])?;
//! let file = cache.read_file("some/directory/structure/small")?;
//! assert_eq!(file.data(), &[1, 2, 3]);
//!
//! let db = SqliteCache::open("/var/cache/app/files.db")?;
//! db.write_file("k", b"payload")?;
//! assert!(db.is_cached("k"));
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! `write_file` and `read_file` report failures; `read_file` of a missing entry
//! is [`CacheError::NotFound`]. `is_cached` and `last_modified` never fail: a
//! broken backend reads as "not cached" (`false` / `0`) and the cause is logged
//! through `tracing`.

pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod sqlite;

pub use cache::{CachedFile, FileCache};
pub use config::{
    load_config, open_cache, parse_config, Backend, CacheConfig, ConfigError, SqliteOptions,
};
pub use error::{CacheError, CacheResult, IoCause};
pub use fs::FileSystemCache;
pub use sqlite::{ConnectionHolder, SqliteCache};
