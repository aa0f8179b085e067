//! Errors reported by the `tidemark-migrate` commands

use colored::Colorize;
use thiserror::Error;
use tidemark::migration::MigrationError;
use tidemark::{ConnectionError, TideError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Error connecting to database: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Database(#[from] TideError),

    #[error(
        "Database URL not provided. Use --database-url or set TIDEMARK_DATABASE_URL or DATABASE_URL environment variable."
    )]
    MissingDatabaseUrl,

    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("Already at first version.")]
    AlreadyAtFirstVersion,

    #[error("Already at latest version.")]
    AlreadyAtLatestVersion,

    #[error("invalid filter expression: {0}")]
    FilterExpression(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// The operator declined a confirmation prompt
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            CliError::Migration(MigrationError::DestructiveActionCancelled)
        )
    }

    /// Line written to stderr when a command fails
    ///
    /// A declined prompt is reported as a cancellation, not as an error.
    pub fn failure_line(&self) -> String {
        if self.is_cancelled() {
            self.to_string().yellow().to_string()
        } else {
            format!("{} {}", "❌ Error:".red(), self)
        }
    }
}
