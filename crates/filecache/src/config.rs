//! Backend selection and tuning, loadable from YAML.
//!
//! ```yaml
//! backend:
//!   kind: sqlite
//!   path: /var/cache/app/files.db
//! sqlite:
//!   busy_timeout_ms: 5000
//!   wal: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::FileCache;
use crate::error::CacheResult;
use crate::fs::FileSystemCache;
use crate::sqlite::SqliteCache;

/// Default time a connection waits on another process's write lock.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CacheConfig {
    pub backend: Backend,

    /// Only used by the SQLite backend.
    #[serde(default)]
    pub sqlite: SqliteOptions,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// One file per entry beneath `path`.
    Filesystem { path: PathBuf },
    /// One row per entry in the database file at `path`.
    Sqlite { path: PathBuf },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SqliteOptions {
    /// How long a blocked writer waits for another process before failing.
    pub busy_timeout_ms: u64,

    /// Open the database in write-ahead-log mode (concurrent readers, one
    /// writer across processes).
    pub wal: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

impl CacheConfig {
    pub fn filesystem(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Filesystem { path: path.into() },
            sqlite: SqliteOptions::default(),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Sqlite { path: path.into() },
            sqlite: SqliteOptions::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<CacheConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<CacheConfig, ConfigError> {
    let cfg: CacheConfig = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let path = match &cfg.backend {
        Backend::Filesystem { path } | Backend::Sqlite { path } => path,
    };
    if path.as_os_str().is_empty() {
        return Err(ConfigError("backend path is empty".into()));
    }
    Ok(cfg)
}

/// Build the cache described by `config`.
pub fn open_cache(config: &CacheConfig) -> CacheResult<Box<dyn FileCache>> {
    match &config.backend {
        Backend::Filesystem { path } => Ok(Box::new(FileSystemCache::new(path.clone()))),
        Backend::Sqlite { path } => Ok(Box::new(SqliteCache::open_with(path, &config.sqlite)?)),
    }
}
