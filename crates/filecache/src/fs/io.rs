//! Filesystem primitives: atomic publish and timestamp conversion.

use std::fs::{self, Metadata};
use std::io::{self, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

/// Prefix of in-flight temp files. Dotfiles keep them out of casual listings.
pub(crate) const TEMP_PREFIX: &str = ".filecache-";
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Write `data` to `path` so that readers see either the old or the new file.
///
/// The bytes go to a temp file next to `path`, are synced, and the temp file is
/// renamed over the target. On failure the temp file is removed.
pub(crate) fn write_atomic_impl(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX).suffix(TEMP_SUFFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }

    let mut temp = builder.tempfile_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create `dir` and its parents. A concurrent creator winning the race is fine.
pub(crate) fn ensure_dir_impl(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Read the whole file along with its mtime, both taken from the same handle.
pub(crate) fn read_with_mtime_impl(path: &Path) -> io::Result<(Vec<u8>, i64)> {
    let mut file = fs::File::open(path)?;
    let meta = file.metadata()?;
    if meta.is_dir() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "is a directory"));
    }

    let len = usize::try_from(meta.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))?;
    let mut data = Vec::with_capacity(len);
    file.read_to_end(&mut data)?;

    Ok((data, mtime_millis_impl(&meta)?))
}

/// Modification time in milliseconds since the Unix epoch (UTC).
pub(crate) fn mtime_millis_impl(meta: &Metadata) -> io::Result<i64> {
    let modified: DateTime<Utc> = meta.modified()?.into();
    Ok(modified.timestamp_millis())
}
