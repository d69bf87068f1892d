use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Raw failure from the filesystem under a [`super::CacheLocation`].
#[derive(Debug)]
pub enum BackendError {
    /// `std::io` error from a local directory.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "filesystem: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Failure reading or writing a cache file or a downloaded source file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// Nothing exists at the path yet.
    #[snafu(display("No file at {path}"))]
    NotFound {
        /// Absolute path that was looked up.
        path: String,
        /// Filesystem error reporting the absence.
        source: BackendError,
        /// Captured where the lookup failed.
        backtrace: Backtrace,
    },

    /// Any other filesystem failure (permissions, full disk, rename).
    #[snafu(display("File access failed at {path}: {source}"))]
    OtherIo {
        /// Absolute path of the failing step.
        path: String,
        /// Filesystem error.
        source: BackendError,
        /// Captured where the access failed.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// True when the error reports a missing file rather than a failed access.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
