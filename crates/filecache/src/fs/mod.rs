//! Filesystem-backed cache.
//!
//! # Layout
//!
//! ```text
//! {base_dir}/
//!   some/directory/structure/small    # payload of "some/directory/structure/small"
//!   file-0                            # payload of "file-0"
//! ```
//!
//! The file's mtime is the entry's last-modified time. There is no sidecar
//! metadata, index or lock file; every call re-reads the tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cache::{CachedFile, FileCache};
use crate::error::{CacheError, CacheResult, IoCause};

pub(crate) mod io;
pub(crate) mod keys;

/// [`FileCache`] storing every entry as a file beneath a base directory.
#[derive(Debug, Clone)]
pub struct FileSystemCache {
    base_dir: PathBuf,
}

impl FileSystemCache {
    /// Create a cache rooted at `base_dir`. The directory is created lazily on
    /// the first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn entry_path(&self, name: &str) -> CacheResult<PathBuf> {
        keys::entry_path_impl(&self.base_dir, name)
    }

    /// Fail unless `dir` resolves beneath the base directory, following any
    /// symlinks other tools may have planted in the tree.
    fn check_within_base(&self, name: &str, dir: &Path) -> CacheResult<()> {
        match keys::is_contained_impl(&self.base_dir, dir) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CacheError::invalid_name(
                name,
                "path resolves outside the base directory",
            )),
            Err(e) if is_absent(&e) => Err(CacheError::not_found(name)),
            Err(e) => Err(CacheError::io(name, e)),
        }
    }

    /// [`Self::entry_path`] plus the base-directory check on its parent.
    fn contained_path(&self, name: &str) -> CacheResult<PathBuf> {
        let path = self.entry_path(name)?;
        if let Some(parent) = path.parent() {
            self.check_within_base(name, parent)?;
        }
        Ok(path)
    }

    fn stat(&self, name: &str) -> CacheResult<Option<fs::Metadata>> {
        let path = match self.contained_path(name) {
            Ok(path) => path,
            Err(CacheError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(meta)),
            Ok(_) => Err(CacheError::io(name, IoCause::NotAFile)),
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(CacheError::io(name, e)),
        }
    }
}

/// Errors meaning "no such entry": the file is missing, or some component of
/// its path is a regular file rather than a directory.
fn is_absent(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

/// Writes never report `NotFound`; a base directory vanishing mid-write is an
/// I/O failure.
fn absent_as_io(name: &str, e: CacheError) -> CacheError {
    if e.is_not_found() {
        CacheError::io(name, std::io::Error::from(ErrorKind::NotFound))
    } else {
        e
    }
}

impl FileCache for FileSystemCache {
    fn write_file(&self, name: &str, data: &[u8]) -> CacheResult<()> {
        let path = self.entry_path(name)?;

        if path.is_dir() {
            return Err(CacheError::io(name, IoCause::NotAFile));
        }
        io::ensure_dir_impl(&self.base_dir).map_err(|e| CacheError::io(name, e))?;
        if let Some(parent) = path.parent() {
            // Checked before creating missing directories and again after, so
            // neither create_dir_all nor the rename follows a link out of the tree.
            self.check_within_base(name, parent).map_err(|e| absent_as_io(name, e))?;
            io::ensure_dir_impl(parent).map_err(|e| CacheError::io(name, e))?;
            self.check_within_base(name, parent).map_err(|e| absent_as_io(name, e))?;
        }
        io::write_atomic_impl(&path, data).map_err(|e| CacheError::io(name, e))?;

        debug!(name, bytes = data.len(), "wrote file");
        Ok(())
    }

    fn read_file(&self, name: &str) -> CacheResult<CachedFile> {
        let path = match self.contained_path(name) {
            Ok(path) => path,
            Err(e) => {
                if e.is_not_found() {
                    debug!(name, "file not in cache");
                }
                return Err(e);
            }
        };

        let (data, last_modified) = match io::read_with_mtime_impl(&path) {
            Ok(read) => read,
            Err(e) if is_absent(&e) => {
                debug!(name, "file not in cache");
                return Err(CacheError::not_found(name));
            }
            Err(e) => return Err(CacheError::io(name, e)),
        };

        debug!(name, bytes = data.len(), "read file");
        Ok(CachedFile::new(name, data, last_modified))
    }

    fn remove_file(&self, name: &str) -> CacheResult<()> {
        let path = match self.contained_path(name) {
            Ok(path) => path,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                warn!(name, error = %e, "ignoring remove of invalid name");
                return Ok(());
            }
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!(name, "removed file"),
            Err(e) if is_absent(&e) => {}
            Err(e) => warn!(name, error = %e, "failed to remove cached file"),
        }
        Ok(())
    }

    fn is_cached(&self, name: &str) -> bool {
        match self.stat(name) {
            Ok(meta) => meta.is_some(),
            Err(e) => {
                debug!(name, error = %e, "treating unreadable entry as not cached");
                false
            }
        }
    }

    fn last_modified(&self, name: &str) -> i64 {
        let meta = match self.stat(name) {
            Ok(Some(meta)) => meta,
            Ok(None) => return 0,
            Err(e) => {
                debug!(name, error = %e, "treating unreadable entry as not cached");
                return 0;
            }
        };

        io::mtime_millis_impl(&meta).unwrap_or_else(|e| {
            warn!(name, error = %e, "file has no usable mtime");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (FileSystemCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSystemCache::new(temp_dir.path().join("cache"));
        (cache, temp_dir)
    }

    #[test]
    fn test_write_creates_nested_directories() {
        let (cache, _temp_dir) = create_test_cache();

        cache.write_file("a/b/c", &[1, 2, 3]).unwrap();

        let on_disk = cache.base_dir().join("a").join("b").join("c");
        assert_eq!(fs::read(on_disk).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_rejects_escaping_name() {
        let (cache, temp_dir) = create_test_cache();

        let err = cache.write_file("../escaped", b"nope").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Io {
                source: IoCause::InvalidName { .. },
                ..
            }
        ));
        assert!(!temp_dir.path().join("escaped").exists());
    }

    #[test]
    fn test_write_over_directory_fails() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write_file("dir/child", b"x").unwrap();

        let err = cache.write_file("dir", b"y").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Io {
                source: IoCause::NotAFile,
                ..
            }
        ));
        assert_eq!(cache.read_file("dir/child").unwrap().data(), b"x");
    }

    #[test]
    fn test_write_under_existing_file_fails() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write_file("leaf", b"x").unwrap();

        let err = cache.write_file("leaf/child", b"y").unwrap_err();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_entry_under_a_file_is_not_found() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write_file("leaf", b"x").unwrap();

        let err = cache.read_file("leaf/child").unwrap_err();
        assert!(err.is_not_found(), "got {err:?}");
        assert!(!cache.is_cached("leaf/child"));
        assert_eq!(cache.last_modified("leaf/child"), 0);
        cache.remove_file("leaf/child").unwrap();
        assert_eq!(cache.read_file("leaf").unwrap().data(), b"x");
    }

    #[test]
    fn test_read_before_base_dir_exists_is_not_found() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.read_file("a/b").unwrap_err().is_not_found());
        cache.remove_file("a/b").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_subdirectory_cannot_escape_base() {
        let (cache, temp_dir) = create_test_cache();
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret"), b"s").unwrap();
        fs::create_dir_all(cache.base_dir()).unwrap();
        std::os::unix::fs::symlink(&outside, cache.base_dir().join("link")).unwrap();

        let err = cache.write_file("link/new", b"x").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Io {
                source: IoCause::InvalidName { .. },
                ..
            }
        ));
        assert!(!outside.join("new").exists());

        assert!(!cache.read_file("link/secret").unwrap_err().is_not_found());
        assert!(!cache.is_cached("link/secret"));
        cache.remove_file("link/secret").unwrap();
        assert!(outside.join("secret").exists());
    }

    #[test]
    fn test_directory_is_not_a_cached_file() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write_file("dir/child", b"x").unwrap();

        assert!(!cache.is_cached("dir"));
        assert_eq!(cache.last_modified("dir"), 0);
        let err = cache.read_file("dir").unwrap_err();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_probes_on_invalid_name_degrade() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(!cache.is_cached("../x"));
        assert_eq!(cache.last_modified("/abs"), 0);
        cache.remove_file("a//b").unwrap();
    }

    #[test]
    fn test_remove_keeps_parent_directories() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write_file("a/b/c", b"x").unwrap();

        cache.remove_file("a/b/c").unwrap();

        assert!(!cache.is_cached("a/b/c"));
        assert!(cache.base_dir().join("a/b").is_dir());
    }

    #[test]
    fn test_external_edits_are_visible() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write_file("edited", b"old").unwrap();

        fs::write(cache.base_dir().join("edited"), b"new").unwrap();

        assert_eq!(cache.read_file("edited").unwrap().data(), b"new");
    }
}
