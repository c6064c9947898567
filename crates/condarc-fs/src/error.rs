//! Error types for condarc-fs

use std::path::PathBuf;

/// Result type for condarc-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in condarc-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move temporary file over {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying I/O error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } | Self::Persist { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
        }
    }
}
