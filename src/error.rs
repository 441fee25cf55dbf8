//! Error types for vault operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Everything that can go wrong while writing or reading a signature vault
#[derive(Error, Debug)]
pub enum VaultError {
    /// Malformed mode, member name, key or source combination
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A source file named in `add` does not exist under the base path
    #[error("Source file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The same member name was added twice to one archive
    #[error("Duplicate entry in vault: {0}")]
    DuplicateEntry(String),

    /// The signature engine rejected its input
    #[error("Signature computation failed: {0}")]
    Signature(String),

    /// An archive member could not be read back as declared
    #[error("Corrupt vault archive {}: {reason}", .path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    /// Filesystem or container failure tied to a specific file
    #[error("IO error on {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem or container failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub fn invalid_argument(msg: impl std::fmt::Display) -> Self {
        Self::InvalidArgument(msg.to_string())
    }

    pub fn signature(msg: impl std::fmt::Display) -> Self {
        Self::Signature(msg.to_string())
    }

    pub fn corrupt(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::CorruptArchive {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an IO error with the file it happened on
    pub fn file(path: &Path, source: std::io::Error) -> Self {
        Self::File {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Attach a path to IO errors, like `anyhow::Context` does for messages
pub(crate) trait IoContext<T> {
    fn on_file(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn on_file(self, path: &Path) -> Result<T> {
        self.map_err(|e| VaultError::file(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_context_keeps_path() {
        let err: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = err.on_file(Path::new("/vaults/proj.sigvault.0001.tgz")).unwrap_err();

        match err {
            VaultError::File { path, source } => {
                assert_eq!(path, PathBuf::from("/vaults/proj.sigvault.0001.tgz"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_messages() {
        let err = VaultError::NotFound(PathBuf::from("data/a.txt"));
        assert!(err.to_string().contains("data/a.txt"));

        let err = VaultError::invalid_argument("mode must be 'r' or 'w'");
        assert_eq!(err.to_string(), "Invalid argument: mode must be 'r' or 'w'");
    }
}
