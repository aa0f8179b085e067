//! Migration-specific error types

use crate::migration::VersionId;
use crate::TideError;
use std::path::PathBuf;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(TideError),
    /// The version is not among the known (discovered) versions
    UnknownVersion(String),
    /// The version is already in the requested state
    AlreadyMarked { version: VersionId, applied: bool },
    /// There is nothing to migrate
    NoPendingMigrations,
    /// The operator declined the confirmation prompt
    DestructiveActionCancelled,
    /// The migrations directory does not exist
    DirectoryNotFound(PathBuf),
    /// Invalid migration file name or content
    InvalidFormat(String),
    /// Invalid combination of options or arguments
    InvalidArgument(String),
    /// Filesystem error outside of discovery
    Io { path: PathBuf, error: std::io::Error },
    /// An applied migration file was edited after it ran
    ChecksumMismatch {
        version: VersionId,
        stored: String,
        current: String,
    },
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {}", e),
            MigrationError::UnknownVersion(version) => {
                write!(f, "Could not find migration version {}", version)
            }
            MigrationError::AlreadyMarked { version, applied: true } => {
                write!(f, "The version \"{}\" already exists in the version table.", version)
            }
            MigrationError::AlreadyMarked { version, applied: false } => {
                write!(f, "The version \"{}\" does not exist in the version table.", version)
            }
            MigrationError::NoPendingMigrations => {
                write!(f, "Could not find any migrations to execute.")
            }
            MigrationError::DestructiveActionCancelled => write!(f, "Migration cancelled!"),
            MigrationError::DirectoryNotFound(path) => {
                write!(
                    f,
                    "Migrations directory \"{}\" does not exist.\n\
                     Suggestion: create it or point --migrations-dir at the right place",
                    path.display()
                )
            }
            MigrationError::InvalidFormat(msg) => write!(f, "Invalid migration format: {}", msg),
            MigrationError::InvalidArgument(msg) => write!(f, "{}", msg),
            MigrationError::Io { path, error } => {
                write!(f, "I/O error on {}: {}", path.display(), error)
            }
            MigrationError::ChecksumMismatch {
                version,
                stored,
                current,
            } => {
                write!(
                    f,
                    "Migration {} has been modified after being applied.\n\
                     Stored checksum: {}\n\
                     Current checksum: {}",
                    version, stored, current
                )
            }
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) => Some(e),
            MigrationError::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<TideError> for MigrationError {
    fn from(error: TideError) -> Self {
        MigrationError::Database(error)
    }
}

impl From<crate::transaction::TransactionError> for MigrationError {
    fn from(error: crate::transaction::TransactionError) -> Self {
        MigrationError::Database(error.into())
    }
}
