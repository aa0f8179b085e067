//! Effective settings: configuration file and environment, overridden by flags

use crate::cli::GlobalArgs;
use crate::error::CliError;
use std::path::PathBuf;
use tidemark::config::{ConfigSource, TidemarkConfig};

#[derive(Debug, Clone)]
pub struct Settings {
    pub name: String,
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub table: String,
    pub filter_expression: Option<String>,
    pub schema_file: PathBuf,
    pub config_source: ConfigSource,
}

impl Settings {
    /// Merge `config` with command-line flags
    ///
    /// The database URL is taken from, in order: `--database-url`,
    /// `TIDEMARK_DATABASE_URL`, the configuration (`[database] url` or
    /// `TIDEMARK__DATABASE__URL`), then `DATABASE_URL`.
    pub fn resolve<F>(config: TidemarkConfig, args: &GlobalArgs, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = config.display_name().to_string();
        let database_url = args
            .database_url
            .clone()
            .or_else(|| env("TIDEMARK_DATABASE_URL"))
            .or(config.database.url)
            .or_else(|| env("DATABASE_URL"));

        Self {
            name,
            database_url,
            migrations_dir: args
                .migrations_dir
                .clone()
                .unwrap_or(config.migrations.directory),
            table: args.table.clone().unwrap_or(config.migrations.table),
            filter_expression: config.migrations.filter_expression,
            schema_file: config.migrations.schema_file,
            config_source: config.source,
        }
    }

    /// # Errors
    ///
    /// Returns `CliError::MissingDatabaseUrl` if no source provided one.
    pub fn database_url(&self) -> Result<&str, CliError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(CliError::MissingDatabaseUrl)
    }
}
