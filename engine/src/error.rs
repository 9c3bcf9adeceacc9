//! Error types for the migration engine.
//!
//! `EngineError` covers run-level problems that stop a run before the walk
//! begins. File-level problems are `TransferError`s; they are logged and
//! folded into the file's `FileRecord`, never propagated out of the walk.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Structural errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source exists but is not a directory
    #[error("Source must be a directory: {}", path.display())]
    SourceNotDirectory { path: PathBuf },

    /// Source directory is not accessible (permissions)
    #[error("Source directory access denied: {}", path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copy activities need somewhere to write
    #[error("Destination path is required for activity '{activity}'")]
    MissingDestination { activity: String },

    /// Encryption was requested without a key
    #[error("Encryption is enabled but no encryption key was supplied")]
    MissingEncryptionKey,

    /// Destination root is the source root or lies inside it
    #[error("Destination {} must not be inside source {}", destination.display(), root.display())]
    DestinationInsideSource { destination: PathBuf, root: PathBuf },

    /// Failed to create the destination root
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Activity string did not name a known activity
    #[error("Unknown activity '{value}'. Must be copy, copyandpurge, preview or purgeonly")]
    UnknownActivity { value: String },
}

/// Errors raised while processing a single file.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Failed to read file {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write file {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the written file back through the inverse chain failed
    #[error("Failed to verify written file {}: {source}", path.display())]
    VerifyError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not inside source root {}", path.display(), root.display())]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    #[error("Destination is the source file itself: {}", path.display())]
    DestinationIsSource { path: PathBuf },

    #[error("Checksum algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Cipher error: {0}")]
    Cipher(String),
}

/// Errors from a metadata store. Logged by the engine, never fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Metadata store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Metadata store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata store lock poisoned")]
    Poisoned,
}

/// Errors from restoring (decrypting / decompressing) a migrated file.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Missing encryption key for: {}", path.display())]
    MissingKey { path: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_message_includes_io_cause() {
        let err = TransferError::WriteError {
            path: PathBuf::from("/x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"),
        };
        assert_eq!(err.to_string(), "Failed to write file /x: Permission denied");
    }

    #[test]
    fn test_destination_inside_source_message() {
        let err = EngineError::DestinationInsideSource {
            destination: PathBuf::from("/data/in/out"),
            root: PathBuf::from("/data/in"),
        };
        assert!(err.to_string().contains("/data/in/out"));
    }
}
