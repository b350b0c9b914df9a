//! SQLite-backed cache.
//!
//! All entries live in a single `files` table:
//!
//! ```text
//! files(name TEXT NOT NULL, data BLOB, lastModified INTEGER)
//! ```
//!
//! `lastModified` is the wall-clock time of the write in milliseconds since the
//! Unix epoch. A unique index on `name` keeps one row per entry.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use crate::cache::{now_millis, CachedFile, FileCache};
use crate::config::SqliteOptions;
use crate::error::{CacheError, CacheResult};

pub mod registry;
pub(crate) mod schema;

pub use registry::ConnectionHolder;

const SQL_WRITE: &str = r#"
INSERT INTO files (name, data, lastModified) VALUES (?1, ?2, ?3)
ON CONFLICT(name) DO UPDATE SET data = excluded.data, lastModified = excluded.lastModified
"#;

const SQL_READ: &str = "SELECT data, lastModified FROM files WHERE name = ?1";

const SQL_EXISTS: &str = "SELECT 1 FROM files WHERE name = ?1 LIMIT 1";

const SQL_LAST_MODIFIED: &str = "SELECT lastModified FROM files WHERE name = ?1";

const SQL_REMOVE: &str = "DELETE FROM files WHERE name = ?1";

/// [`FileCache`] storing entries as rows of a SQLite database.
///
/// Instances opened on the same database file share one connection.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    holder: Arc<ConnectionHolder>,
}

impl SqliteCache {
    /// Open (or create) the cache stored in `db_path` with default options.
    pub fn open(db_path: impl AsRef<Path>) -> CacheResult<Self> {
        Self::open_with(db_path, &SqliteOptions::default())
    }

    /// Open (or create) the cache stored in `db_path`.
    ///
    /// `options` only apply if no other cache in this process has the same
    /// database open already.
    pub fn open_with(db_path: impl AsRef<Path>, options: &SqliteOptions) -> CacheResult<Self> {
        let db_path = db_path.as_ref();
        let label = db_path.display().to_string();

        let holder = registry::holder_for(db_path, options)
            .map_err(|e| CacheError::io(label.as_str(), e))?;
        holder
            .with_connection(schema::init_schema_impl)
            .map_err(|e| CacheError::io(label.as_str(), e))?;

        debug!(path = %holder.path().display(), "sqlite cache ready");
        Ok(Self { holder })
    }

    /// Canonical path of the database file.
    pub fn db_path(&self) -> &Path {
        self.holder.path()
    }

    /// Connection holder shared with every other cache on the same file.
    pub fn holder(&self) -> &Arc<ConnectionHolder> {
        &self.holder
    }

    fn probe<T>(&self, name: &str, sql: &str) -> CacheResult<Option<T>>
    where
        T: rusqlite::types::FromSql,
    {
        check_name(name)?;
        self.holder
            .with_connection(|conn| {
                conn.prepare_cached(sql)?
                    .query_row(params![name], |row| row.get::<_, T>(0))
                    .optional()
            })
            .map_err(|e| CacheError::io(name, e))
    }
}

/// Names are opaque to SQL, but never empty.
fn check_name(name: &str) -> CacheResult<()> {
    if name.is_empty() {
        return Err(CacheError::invalid_name(name, "name is empty"));
    }
    Ok(())
}

impl FileCache for SqliteCache {
    fn write_file(&self, name: &str, data: &[u8]) -> CacheResult<()> {
        check_name(name)?;

        self.holder
            .with_connection(|conn| {
                // Taken under the holder lock: commit order and timestamp order agree.
                let last_modified = now_millis();
                conn.prepare_cached(SQL_WRITE)?
                    .execute(params![name, data, last_modified])
            })
            .map_err(|e| CacheError::io(name, e))?;

        debug!(name, bytes = data.len(), "wrote file");
        Ok(())
    }

    fn read_file(&self, name: &str) -> CacheResult<CachedFile> {
        check_name(name)?;
        let row: Option<(Option<Vec<u8>>, Option<i64>)> = self
            .holder
            .with_connection(|conn| {
                conn.prepare_cached(SQL_READ)?
                    .query_row(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()
            })
            .map_err(|e| CacheError::io(name, e))?;

        let Some((data, last_modified)) = row else {
            debug!(name, "file not in cache");
            return Err(CacheError::not_found(name));
        };
        let data = data.unwrap_or_default();

        debug!(name, bytes = data.len(), "read file");
        Ok(CachedFile::new(name, data, last_modified.unwrap_or(0)))
    }

    fn remove_file(&self, name: &str) -> CacheResult<()> {
        if let Err(e) = check_name(name) {
            warn!(name, error = %e, "ignoring remove of invalid name");
            return Ok(());
        }
        let removed = self
            .holder
            .with_connection(|conn| conn.prepare_cached(SQL_REMOVE)?.execute(params![name]))
            .map_err(|e| CacheError::io(name, e))?;

        if removed > 0 {
            debug!(name, "removed file");
        }
        Ok(())
    }

    fn is_cached(&self, name: &str) -> bool {
        match self.probe::<i64>(name, SQL_EXISTS) {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(name, error = %e, "existence check failed");
                false
            }
        }
    }

    fn last_modified(&self, name: &str) -> i64 {
        match self.probe::<Option<i64>>(name, SQL_LAST_MODIFIED) {
            Ok(found) => found.flatten().unwrap_or(0),
            Err(e) => {
                warn!(name, error = %e, "last-modified lookup failed");
                0
            }
        }
    }
}
