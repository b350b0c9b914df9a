//! Process-wide registry of shared SQLite connections.
//!
//! Every [`SqliteCache`](super::SqliteCache) pointing at the same database file
//! shares one [`ConnectionHolder`]. Paths are canonicalised first so that
//! symlinks and relative spellings of the same file resolve to one holder.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::SqliteOptions;
use crate::error::IoCause;

/// Lazily opened connection to one database file.
///
/// Access is serialised: one caller at a time gets the connection, and a
/// closed connection is reopened by whichever caller finds it closed.
#[derive(Debug)]
pub struct ConnectionHolder {
    path: PathBuf,
    options: SqliteOptions,
    conn: Mutex<Option<Connection>>,
}

impl ConnectionHolder {
    fn new(path: PathBuf, options: SqliteOptions) -> Self {
        Self {
            path,
            options,
            conn: Mutex::new(None),
        }
    }

    /// Canonical path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    /// Run `f` with exclusive access to the connection, opening it first if
    /// needed.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, IoCause>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut slot = self.conn.lock().map_err(|_| IoCause::Poisoned)?;
        let conn = match slot.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(f(slot.insert(conn))?)
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Close the connection. Returns `false` if it was already closed.
    ///
    /// The next [`with_connection`](Self::with_connection) reopens it.
    pub fn close(&self) -> Result<bool, IoCause> {
        let mut slot = self.conn.lock().map_err(|_| IoCause::Poisoned)?;
        let Some(conn) = slot.take() else {
            return Ok(false);
        };
        if let Err((conn, e)) = conn.close() {
            *slot = Some(conn);
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "closed sqlite connection");
        Ok(true)
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_millis(self.options.busy_timeout_ms))?;

        if self.options.wal {
            // No-op for filesystems without shared-memory support; SQLite
            // keeps the previous mode and reports it.
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                warn!(
                    path = %self.path.display(),
                    mode = %mode,
                    "sqlite refused WAL journal mode"
                );
            }
        }

        debug!(path = %self.path.display(), "opened sqlite connection");
        Ok(conn)
    }
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<ConnectionHolder>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<ConnectionHolder>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Shared holder for the database at `path`, registering one if needed.
///
/// The options of the first registration win; later callers share the
/// existing connection as configured.
pub fn holder_for(
    path: &Path,
    options: &SqliteOptions,
) -> Result<Arc<ConnectionHolder>, IoCause> {
    let canonical = canonical_db_path(path)?;

    let mut holders = registry().lock().map_err(|_| IoCause::Poisoned)?;
    if let Some(holder) = holders.get(&canonical) {
        if holder.options() != options {
            debug!(
                path = %canonical.display(),
                "sqlite connection already registered with other options"
            );
        }
        return Ok(Arc::clone(holder));
    }

    let holder = Arc::new(ConnectionHolder::new(canonical.clone(), options.clone()));
    holders.insert(canonical, Arc::clone(&holder));
    Ok(holder)
}

/// Resolve `path` to an absolute, symlink-free path.
///
/// The file itself may not exist yet; its parent directory is created and
/// resolved instead.
pub fn canonical_db_path(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return fs::canonicalize(path);
    }

    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("database path has no file name: {}", path.display()),
        )
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(parent)?;
    Ok(fs::canonicalize(parent)?.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_path_of_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let canonical = canonical_db_path(&path).unwrap();

        assert!(canonical.is_absolute());
        assert!(canonical.ends_with("nested/cache.db"));
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_canonical_path_resolves_dot_segments() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let direct = dir.path().join("cache.db");
        let dotted = dir.path().join("sub").join("..").join("cache.db");

        assert_eq!(
            canonical_db_path(&direct).unwrap(),
            canonical_db_path(&dotted).unwrap()
        );
    }

    #[test]
    fn test_canonical_path_rejects_missing_file_name() {
        let dir = TempDir::new().unwrap();
        let err = canonical_db_path(&dir.path().join("missing").join("..")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_same_path_shares_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.db");
        let options = SqliteOptions::default();

        let a = holder_for(&path, &options).unwrap();
        let b = holder_for(&path, &options).unwrap();
        let other = holder_for(&dir.path().join("other.db"), &options).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_close_then_reopen() {
        let dir = TempDir::new().unwrap();
        let holder = holder_for(&dir.path().join("reopen.db"), &SqliteOptions::default()).unwrap();

        assert!(!holder.is_open());
        let one: i64 = holder
            .with_connection(|conn| conn.query_row("SELECT 1", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(one, 1);
        assert!(holder.is_open());

        assert!(holder.close().unwrap());
        assert!(!holder.close().unwrap());
        assert!(!holder.is_open());

        holder
            .with_connection(|conn| conn.execute_batch("SELECT 1"))
            .unwrap();
        assert!(holder.is_open());
    }

    #[test]
    fn test_open_applies_wal() {
        let dir = TempDir::new().unwrap();
        let holder = holder_for(&dir.path().join("wal.db"), &SqliteOptions::default()).unwrap();

        let mode: String = holder
            .with_connection(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }
}
