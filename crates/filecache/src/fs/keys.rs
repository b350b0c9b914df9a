//! Name validation and name-to-path mapping.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CacheError, CacheResult};

/// Map `name` to its location beneath `base_dir`.
///
/// Names are `/`-separated relative paths. Anything that could resolve outside
/// `base_dir` (absolute paths, `..`, `.`, empty components) is rejected, as are
/// NUL and backslash, which are separators or terminators on some platforms.
pub(crate) fn entry_path_impl(base_dir: &Path, name: &str) -> CacheResult<PathBuf> {
    if name.is_empty() {
        return Err(CacheError::invalid_name(name, "name is empty"));
    }
    if name.starts_with('/') {
        return Err(CacheError::invalid_name(name, "absolute paths are not allowed"));
    }
    if name.contains('\0') {
        return Err(CacheError::invalid_name(name, "name contains NUL"));
    }
    if name.contains('\\') {
        return Err(CacheError::invalid_name(name, "name contains a backslash"));
    }

    let mut path = base_dir.to_path_buf();
    for component in name.split('/') {
        match component {
            "" => return Err(CacheError::invalid_name(name, "empty path component")),
            "." | ".." => {
                return Err(CacheError::invalid_name(
                    name,
                    "relative path components are not allowed",
                ))
            }
            #[cfg(windows)]
            c if c.contains(':') => {
                return Err(CacheError::invalid_name(name, "name contains a colon"))
            }
            c => path.push(c),
        }
    }
    Ok(path)
}

/// Whether `dir` still lies beneath `base_dir` once symlinks are followed.
///
/// `dir` need not exist yet: its deepest existing ancestor is resolved
/// instead, so a link that would be walked by a later `create_dir_all` is
/// caught before anything is created. Fails if `base_dir` itself is missing.
pub(crate) fn is_contained_impl(base_dir: &Path, dir: &Path) -> io::Result<bool> {
    let base = base_dir.canonicalize()?;

    let mut existing = dir;
    loop {
        match existing.canonicalize() {
            Ok(resolved) => return Ok(resolved.starts_with(&base)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => match existing.parent() {
                Some(parent) => existing = parent,
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
