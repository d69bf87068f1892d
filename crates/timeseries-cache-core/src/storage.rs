//! Local file storage for cache files and downloaded source files.
//!
//! Everything the cache writes to disk goes through this module:
//!
//! - The persisted segment store (one file per dataset instance).
//! - Source files downloaded by fetch adapters (for example yearly text
//!   files kept in a local directory).
//!
//! Writes use write-then-rename so a reader never observes a half-written
//! file, and a crash mid-write leaves the previous version in place.

mod error;

pub use error::{BackendError, StorageError};

use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use snafu::prelude::*;
use tokio::{fs, io::AsyncWriteExt};

use error::{NotFoundSnafu, OtherIoSnafu};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root directory that relative cache paths are resolved against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
}

impl CacheLocation {
    /// Creates a new `CacheLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        CacheLocation::Local(root.into())
    }

    /// Resolve `rel` against this location.
    pub fn join(&self, rel: &Path) -> PathBuf {
        match self {
            CacheLocation::Local(root) => root.join(rel),
        }
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Call after a successful rename.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort; the caller is already propagating another error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn tmp_path_for(abs: &Path) -> PathBuf {
    let mut name = abs
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    abs.with_file_name(name)
}

/// Write `contents` to `rel_path` inside `location` atomically.
///
/// The payload is written to a sibling `*.tmp` file, synced, and renamed
/// over the target. Parent directories are created as needed.
///
/// # Errors
///
/// Returns `StorageError::OtherIo` when any filesystem step fails. The
/// temporary file is removed on failure.
pub async fn write_atomic(
    location: &CacheLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = location.join(rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = tmp_path_for(&abs);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.write_all(contents)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.sync_all()
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;
    }

    fs::rename(&tmp_path, &abs)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    guard.disarm();
    Ok(())
}

/// Read the whole file at `rel_path` within `location`.
///
/// A missing file is reported as `StorageError::NotFound` so callers can
/// tell "never written" apart from "unreadable".
pub async fn read_all_bytes(location: &CacheLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = location.join(rel_path);
    match fs::read(&abs).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BackendError::Local(e)).context(NotFoundSnafu {
                path: abs.display().to_string(),
            })
        }
        Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu {
            path: abs.display().to_string(),
        }),
    }
}

/// Last-modified time of a regular file, or `None` if it does not exist.
///
/// Non-regular files (directories, sockets) are treated as absent.
pub async fn modified_time(
    location: &CacheLocation,
    rel_path: &Path,
) -> StorageResult<Option<SystemTime>> {
    let abs = location.join(rel_path);
    let path_str = abs.display().to_string();

    let meta = match fs::metadata(&abs).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(BackendError::Local(e)).context(OtherIoSnafu { path: path_str }),
    };

    if !meta.is_file() {
        return Ok(None);
    }

    let modified = meta
        .modified()
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: path_str })?;
    Ok(Some(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn write_atomic_creates_parents_and_replaces() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());
        let rel = Path::new("nested/dir/cache.bin");

        write_atomic(&location, rel, b"first").await?;
        write_atomic(&location, rel, b"second").await?;

        let bytes = read_all_bytes(&location, rel).await?;
        assert_eq!(bytes, b"second");

        // No stray temporary file is left behind.
        assert!(!tmp.path().join("nested/dir/cache.bin.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());

        let err = read_all_bytes(&location, Path::new("absent.bin"))
            .await
            .expect_err("missing file should fail");
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn modified_time_reports_absence_and_presence() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());
        let rel = Path::new("omni2_2001.dat");

        assert!(modified_time(&location, rel).await?.is_none());

        write_atomic(&location, rel, b"data").await?;
        assert!(modified_time(&location, rel).await?.is_some());

        // Directories do not count as cached files.
        std::fs::create_dir(tmp.path().join("subdir"))?;
        assert!(modified_time(&location, Path::new("subdir")).await?.is_none());
        Ok(())
    }

    #[test]
    fn tmp_path_keeps_extension_visible() {
        let p = tmp_path_for(Path::new("/x/omni2_2001.dat"));
        assert_eq!(p, PathBuf::from("/x/omni2_2001.dat.tmp"));
    }
}
