//! Tidemark Migration CLI Tool
//!
//! Command-line interface for the Tidemark migration ledger.
//! Supports both interactive use and CI/CD pipelines (`--no-interaction`).

use clap::Parser;
use colored::Colorize;
use std::io::{self, Write};
use std::process;
use tidemark::config::TidemarkConfig;
use tidemark::migration::{introspect_schema, MigrationError, PostgresVersionStore};
use tidemark::{connect, MayPostgresExecutor, TideExecutor};
use tidemark_migrate::cli::{Cli, Commands, GlobalArgs};
use tidemark_migrate::commands::{self, Context};
use tidemark_migrate::prompt::Interaction;
use tidemark_migrate::settings::Settings;
use tidemark_migrate::CliError;

fn init_logging(global: &GlobalArgs) {
    let level = if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.global);

    let quiet = cli.global.quiet || matches!(cli.command, Commands::Latest);
    match run(cli) {
        Ok(()) => {
            if !quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}", e.failure_line());
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config =
        TidemarkConfig::load(cli.global.config.as_deref()).map_err(|e| CliError::Config(e.to_string()))?;
    let settings = Settings::resolve(config, &cli.global, |key| std::env::var(key).ok());
    let interaction = Interaction::detect(cli.global.no_interaction);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let result = match cli.command {
        Commands::Generate(args) => commands::generate(&settings, &mut out, &args),
        command => run_with_database(&settings, interaction, command, &mut out),
    };
    out.flush()?;
    result
}

fn run_with_database(
    settings: &Settings,
    interaction: Interaction,
    command: Commands,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    // Fail on a missing directory before connecting or creating anything
    if !settings.migrations_dir.is_dir() {
        return Err(MigrationError::DirectoryNotFound(settings.migrations_dir.clone()).into());
    }

    let client = connect(settings.database_url()?)?;
    let executor = MayPostgresExecutor::new(client);
    let store = PostgresVersionStore::new(&executor, settings.table.clone())?;
    let database_name = executor.database_name().unwrap_or_else(|e| {
        log::warn!("Could not read database name: {e}");
        "unknown".to_string()
    });

    let ctx = Context {
        settings,
        store: &store,
        interaction,
        database_name: &database_name,
    };

    match command {
        Commands::Status(args) => commands::status(&ctx, out, &args),
        Commands::Diff(args) => {
            let current = introspect_schema(&executor)?;
            commands::diff(&ctx, out, &current, &args)
        }
        Commands::Execute(args) => commands::execute(&ctx, out, &args),
        Commands::Migrate(args) => commands::migrate(&ctx, out, &args),
        Commands::Version(args) => commands::version(&ctx, out, &args),
        Commands::Latest => commands::latest(&ctx, out),
        Commands::Validate => commands::validate(&ctx, out),
        Commands::Generate(args) => commands::generate(settings, out, &args),
    }
}
