//! Error types for cache operations.

/// Underlying reason for a [`CacheError::Io`].
#[derive(Debug, thiserror::Error)]
pub enum IoCause {
    /// Filesystem or OS error.
    #[error(transparent)]
    Fs(#[from] std::io::Error),

    /// SQLite engine error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Name is not acceptable for this backend.
    #[error("invalid name: {reason}")]
    InvalidName { reason: String },

    /// Name resolves to something other than a regular file.
    #[error("not a regular file")]
    NotAFile,

    /// A lock guarding shared state was poisoned by a panicking thread.
    #[error("lock poisoned")]
    Poisoned,
}

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Entry is not in the cache.
    #[error("file {name} not in cache")]
    NotFound { name: String },

    /// Any other failure to persist or load an entry.
    #[error("cache i/o failed for {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: IoCause,
    },
}

impl CacheError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn io(name: impl Into<String>, source: impl Into<IoCause>) -> Self {
        Self::Io {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::io(
            name,
            IoCause::InvalidName {
                reason: reason.into(),
            },
        )
    }

    /// Name of the entry the error refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::NotFound { name } | Self::Io { name, .. } => name,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
