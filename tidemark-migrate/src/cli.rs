//! Command-line arguments

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tidemark-migrate")]
#[command(about = "Migration ledger tool for PostgreSQL")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Database connection URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Configuration file (default: config/tidemark.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Migrations directory path
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Version table name
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Never ask for confirmation
    #[arg(short = 'n', long, global = true)]
    pub no_interaction: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// View the status of a set of migrations
    Status(StatusArgs),

    /// Generate a blank migration file
    Generate(GenerateArgs),

    /// Generate a migration by comparing the database to a target schema file
    Diff(DiffArgs),

    /// Execute a single migration version up or down manually
    Execute(ExecuteArgs),

    /// Execute a migration to a specified version or the latest available version
    Migrate(MigrateArgs),

    /// Manually add and delete migration versions from the version table
    Version(VersionArgs),

    /// Output the latest version number
    Latest,

    /// Check applied migrations against their recorded checksums
    Validate,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// List every available migration and its status
    #[arg(long)]
    pub show_versions: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Migration name, used in the file name and as its description
    pub name: Option<String>,

    /// Open the file with this command once it's created
    #[arg(long)]
    pub editor_cmd: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DiffArgs {
    /// Migration name, used in the file name and as its description
    pub name: Option<String>,

    /// Target schema file (TOML or JSON)
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    /// Only diff tables whose name matches this regular expression
    #[arg(long)]
    pub filter_expression: Option<String>,

    /// Open the file with this command once it's created
    #[arg(long)]
    pub editor_cmd: Option<String>,
}

/// Switches shared by `execute` and `migrate`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Execute the migration as a dry run
    #[arg(long)]
    pub dry_run: bool,

    /// Write the migration SQL to a file (or directory) instead of executing it
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = ".")]
    pub write_sql: Option<PathBuf>,

    /// Time all the queries individually
    #[arg(long)]
    pub query_time: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExecuteArgs {
    /// The version to execute
    pub version: String,

    /// Execute the migration up (default)
    #[arg(long, conflicts_with = "down")]
    pub up: bool,

    /// Execute the migration down
    #[arg(long)]
    pub down: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Version number (YYYYMMDDHHMMSS) or alias (first, prev, current, next, latest)
    #[arg(default_value = "latest")]
    pub version: String,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone, Default)]
#[command(group(ArgGroup::new("action").required(true).args(["add", "delete"])))]
pub struct VersionArgs {
    /// The version to add or delete
    pub version: Option<String>,

    /// Add the specified version
    #[arg(long)]
    pub add: bool,

    /// Delete the specified version
    #[arg(long)]
    pub delete: bool,

    /// Apply to all the versions
    #[arg(long, conflicts_with_all = ["range_from", "range_to"])]
    pub all: bool,

    /// Apply from the specified version
    #[arg(long, requires = "range_to")]
    pub range_from: Option<String>,

    /// Apply to the specified version
    #[arg(long, requires = "range_from")]
    pub range_to: Option<String>,
}
