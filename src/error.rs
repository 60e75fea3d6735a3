use std::path::PathBuf;

use crate::document::DocumentError;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Failures while bringing the bootstrap config up to date. None of them
/// leave the target partially written.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("target {path} is malformed: {source}")]
    MalformedTarget {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("failed to read {path}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }
}
