//! Subcommand handlers
//!
//! Handlers write their report to `out` and take the version store and
//! current schema from the caller, so they run the same against PostgreSQL
//! or an in-memory store.

use crate::cli::{DiffArgs, ExecuteArgs, GenerateArgs, MigrateArgs, StatusArgs, VersionArgs};
use crate::error::CliError;
use crate::prompt::Interaction;
use crate::settings::Settings;
use colored::Colorize;
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tidemark::migration::generate as generator;
use tidemark::migration::{
    Alias, Direction, Ledger, MigrateOptions, MigrationError, MigrationPlan, Migrator, PostgresSchemaDiffer,
    Schema, VersionId, VersionStore,
};

const EXECUTE_WARNING: &str = "WARNING! You are about to execute a database migration that could result in schema changes and data lost. Are you sure you wish to continue? (y/n)";
const MARK_WARNING: &str = "WARNING! You are about to add, delete or synchronize migration versions from the version table that could result in data lost. Are you sure you wish to continue? (y/n)";

/// Everything a database-backed command needs
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub store: &'a dyn VersionStore,
    pub interaction: Interaction,
    /// Shown by `status`
    pub database_name: &'a str,
}

impl Context<'_> {
    fn ledger(&self) -> Result<Ledger<'_>, CliError> {
        Ok(Ledger::load(&self.settings.migrations_dir, self.store)?)
    }
}

/// `2024-01-20 12:00:00 (20240120120000)`, or `0` for the zero version
fn format_version(id: &VersionId) -> String {
    if id.is_zero() {
        "0".yellow().to_string()
    } else {
        format!("{} ({})", id.format(), id.as_str().yellow())
    }
}

fn header(out: &mut dyn Write, name: &str) -> Result<(), CliError> {
    let padded = format!("{pad}{name}{pad}", pad = " ".repeat(20));
    let blank = " ".repeat(padded.len());
    writeln!(out, "{}", blank.on_cyan())?;
    writeln!(out, "{}", padded.black().on_cyan())?;
    writeln!(out, "{}", blank.on_cyan())?;
    writeln!(out)?;
    Ok(())
}

fn info_line(out: &mut dyn Write, label: &str, value: &str) -> Result<(), CliError> {
    let pad = " ".repeat(50usize.saturating_sub(label.len()));
    writeln!(out, "    {} {label}: {pad}{value}", ">>".yellow())?;
    Ok(())
}

pub fn status(ctx: &Context<'_>, out: &mut dyn Write, args: &StatusArgs) -> Result<(), CliError> {
    let ledger = ctx.ledger()?;
    let status = ledger.status();

    let prev = status
        .prev
        .as_ref()
        .map_or_else(|| "Already at first version".to_string(), format_version);
    let next = status
        .next
        .as_ref()
        .map_or_else(|| "Already at latest version".to_string(), format_version);

    let unavailable = status.executed_unavailable.len();
    let new = status.new_count();

    writeln!(out, "\n {} Configuration\n", "==".green())?;
    info_line(out, "Name", &ctx.settings.name)?;
    info_line(out, "Database Driver", "postgres")?;
    info_line(out, "Database Name", ctx.database_name)?;
    info_line(out, "Configuration Source", &ctx.settings.config_source.to_string())?;
    info_line(out, "Version Table Name", ledger.store().table_name())?;
    info_line(out, "Migrations Directory", &ledger.directory().display().to_string())?;
    info_line(out, "Previous Version", &prev)?;
    info_line(out, "Current Version", &format_version(&status.current))?;
    info_line(out, "Next Version", &next)?;
    info_line(out, "Latest Version", &format_version(&status.latest))?;
    info_line(out, "Executed Migrations", &status.executed_count.to_string())?;
    info_line(
        out,
        "Executed Unavailable Migrations",
        &if unavailable > 0 {
            unavailable.to_string().red().to_string()
        } else {
            "0".to_string()
        },
    )?;
    info_line(out, "Available Migrations", &status.known_count().to_string())?;
    info_line(
        out,
        "New Migrations",
        &if new > 0 {
            new.to_string().green().to_string()
        } else {
            "0".to_string()
        },
    )?;

    if args.show_versions {
        if !status.versions.is_empty() {
            writeln!(out, "\n {} Available Migration Versions\n", "==".green())?;
            for version in &status.versions {
                let state = if version.applied {
                    "migrated".green()
                } else {
                    "not migrated".red()
                };
                let description = version
                    .description
                    .as_deref()
                    .map(|d| format!("{}{d}", " ".repeat(10)))
                    .unwrap_or_default();
                writeln!(
                    out,
                    "    {} {}    {state}{description}",
                    ">>".yellow(),
                    format_version(&version.id)
                )?;
            }
        }

        if !status.executed_unavailable.is_empty() {
            writeln!(
                out,
                "\n {} Previously Executed Unavailable Migration Versions\n",
                "==".green()
            )?;
            for id in &status.executed_unavailable {
                writeln!(out, "    {} {}", ">>".yellow(), format_version(id))?;
            }
        }
    }
    Ok(())
}

pub fn latest(ctx: &Context<'_>, out: &mut dyn Write) -> Result<(), CliError> {
    let ledger = ctx.ledger()?;
    writeln!(out, "{}", ledger.latest_version())?;
    Ok(())
}

/// Open a freshly written file with `editor_cmd`
fn open_in_editor(editor_cmd: &str, path: &Path) -> Result<(), CliError> {
    let mut parts = editor_cmd.split_whitespace();
    let Some(program) = parts.next() else {
        return Ok(());
    };
    log::debug!("Opening {} with {}", path.display(), editor_cmd);
    Command::new(program).args(parts).arg(path).spawn()?;
    Ok(())
}

pub fn generate(settings: &Settings, out: &mut dyn Write, args: &GenerateArgs) -> Result<(), CliError> {
    let path = generator::generate(&settings.migrations_dir, args.name.as_deref(), &[], &[])?;
    writeln!(out, "Generated new migration file to \"{}\"", path.display().to_string().green())?;

    if let Some(editor_cmd) = &args.editor_cmd {
        open_in_editor(editor_cmd, &path)?;
    }
    Ok(())
}

/// Diff `current` against the target schema file and write a migration for the difference
pub fn diff(ctx: &Context<'_>, out: &mut dyn Write, current: &Schema, args: &DiffArgs) -> Result<(), CliError> {
    let ledger = ctx.ledger()?;

    let schema_file = args.schema_file.as_ref().unwrap_or(&ctx.settings.schema_file);
    let target = Schema::from_file(schema_file)?;
    if target.is_empty() {
        writeln!(out, "{}", "No mapping information to process.".red())?;
        return Ok(());
    }

    let filter = args
        .filter_expression
        .as_ref()
        .or(ctx.settings.filter_expression.as_ref())
        .map(|expr| Regex::new(expr))
        .transpose()?;

    let diff = ledger.diff_against_schema(&PostgresSchemaDiffer, current, &target, filter.as_ref());
    if diff.is_empty() {
        writeln!(out, "{}", "No changes detected in your mapping information.".red())?;
        return Ok(());
    }

    let path = generator::generate(ledger.directory(), args.name.as_deref(), &diff.up, &diff.down)?;
    writeln!(
        out,
        "Generated new migration file to \"{}\" from schema differences.",
        path.display().to_string().green()
    )?;

    if let Some(editor_cmd) = &args.editor_cmd {
        open_in_editor(editor_cmd, &path)?;
    }
    Ok(())
}

/// Warn about applied versions with no file and ask before going on
fn confirm_unavailable(ctx: &Context<'_>, out: &mut dyn Write, ledger: &Ledger<'_>) -> Result<(), CliError> {
    let unavailable = ledger.executed_unavailable();
    if unavailable.is_empty() {
        return Ok(());
    }

    writeln!(
        out,
        "{}",
        format!(
            "WARNING! You have {} previously executed migrations in the database that are not registered migrations.",
            unavailable.len()
        )
        .red()
    )?;
    for applied in &unavailable {
        writeln!(out, "    {} {}", ">>".yellow(), format_version(&applied.version))?;
    }

    if ctx.interaction.is_interactive() && !ctx.interaction.confirm("Are you sure you wish to continue? (y/n)")? {
        return Err(MigrationError::DestructiveActionCancelled.into());
    }
    Ok(())
}

fn confirm_execution(ctx: &Context<'_>, dry_run: bool) -> Result<(), CliError> {
    if dry_run || !ctx.interaction.is_interactive() {
        return Ok(());
    }
    if ctx.interaction.confirm(EXECUTE_WARNING)? {
        Ok(())
    } else {
        Err(MigrationError::DestructiveActionCancelled.into())
    }
}

fn write_plan(out: &mut dyn Write, migrator: &Migrator<'_, '_>, path: &Path, plan: &MigrationPlan) -> Result<(), CliError> {
    let written = migrator.write_sql(path, plan)?;
    writeln!(
        out,
        "Wrote {} version(s) of migration SQL to \"{}\"",
        plan.len(),
        written.display().to_string().green()
    )?;
    Ok(())
}

pub fn migrate(ctx: &Context<'_>, out: &mut dyn Write, args: &MigrateArgs) -> Result<(), CliError> {
    let mut ledger = ctx.ledger()?;
    header(out, &ctx.settings.name)?;

    let alias = Alias::parse(&args.version);
    let Some(target) = ledger.resolve_alias(&alias) else {
        return Err(match alias {
            Alias::Prev => CliError::AlreadyAtFirstVersion,
            Alias::Next => CliError::AlreadyAtLatestVersion,
            _ => CliError::UnknownVersion(args.version.clone()),
        });
    };

    confirm_unavailable(ctx, out, &ledger)?;

    let mut migrator = Migrator::new(&mut ledger);
    if let Some(path) = &args.run.write_sql {
        let plan = migrator.plan(&target)?;
        return write_plan(out, &migrator, path, &plan);
    }

    confirm_execution(ctx, args.run.dry_run)?;
    let report = migrator.migrate(
        &target,
        MigrateOptions {
            dry_run: args.run.dry_run,
            time_queries: args.run.query_time,
        },
    )?;

    if report.executed.is_empty() {
        writeln!(out, "{}", "No migrations to execute.".yellow())?;
    } else {
        for id in &report.executed {
            writeln!(out, "  {} {}", if report.dry_run { "~" } else { "++" }, format_version(id))?;
        }
        writeln!(
            out,
            "\n  {} {} migration(s) in {} ms",
            if report.dry_run { "Would have executed" } else { "Executed" },
            report.executed.len(),
            report.elapsed.as_millis()
        )?;
    }
    Ok(())
}

pub fn execute(ctx: &Context<'_>, out: &mut dyn Write, args: &ExecuteArgs) -> Result<(), CliError> {
    let mut ledger = ctx.ledger()?;
    let direction = if args.down { Direction::Down } else { Direction::Up };
    let id = VersionId::new(args.version.trim());

    confirm_unavailable(ctx, out, &ledger)?;

    let mut migrator = Migrator::new(&mut ledger);
    if let Some(path) = &args.run.write_sql {
        let plan = migrator.plan_single(&id, direction)?;
        return write_plan(out, &migrator, path, &plan);
    }

    // Surface unknown / already-marked before asking
    migrator.plan_single(&id, direction)?;
    confirm_execution(ctx, args.run.dry_run)?;

    let report = migrator.execute(
        &id,
        direction,
        MigrateOptions {
            dry_run: args.run.dry_run,
            time_queries: args.run.query_time,
        },
    )?;
    writeln!(
        out,
        "  {} {} {}",
        if report.dry_run { "~" } else if direction == Direction::Up { "++" } else { "--" },
        format_version(&id),
        direction
    )?;
    Ok(())
}

pub fn version(ctx: &Context<'_>, out: &mut dyn Write, args: &VersionArgs) -> Result<(), CliError> {
    if args.add == args.delete {
        return Err(MigrationError::InvalidArgument(
            "You must specify whether you want to --add or --delete the specified version.".to_string(),
        )
        .into());
    }
    let range = match (&args.range_from, &args.range_to) {
        (Some(from), Some(to)) => Some((VersionId::new(from.as_str()), VersionId::new(to.as_str()))),
        (None, None) => None,
        _ => {
            return Err(MigrationError::InvalidArgument(
                "Options --range-to and --range-from should be used together.".to_string(),
            )
            .into())
        }
    };
    if args.all && range.is_some() {
        return Err(MigrationError::InvalidArgument(
            "Options --all and --range-to/--range-from both used. You should use only one of them.".to_string(),
        )
        .into());
    }
    if !args.all && range.is_none() && args.version.is_none() {
        return Err(MigrationError::InvalidArgument(
            "You must specify a version, --all, or --range-from and --range-to.".to_string(),
        )
        .into());
    }

    let mut ledger = ctx.ledger()?;
    if ctx.interaction.is_interactive() && !ctx.interaction.confirm(MARK_WARNING)? {
        return Err(MigrationError::DestructiveActionCancelled.into());
    }

    let applied = args.add;
    let changed = if args.all {
        ledger.mark_all(applied)?
    } else if let Some((from, to)) = range {
        ledger.mark_range(&from, &to, applied)?
    } else {
        let id = VersionId::new(args.version.as_deref().unwrap_or_default().trim());
        ledger.mark(&id, applied)?;
        vec![id]
    };

    let action = if applied { "Added" } else { "Deleted" };
    if changed.is_empty() {
        writeln!(out, "{}", "No versions changed.".yellow())?;
    }
    for id in &changed {
        writeln!(out, "  {action} {}", format_version(id))?;
    }
    Ok(())
}

/// Compare applied versions against their files' current checksums
pub fn validate(ctx: &Context<'_>, out: &mut dyn Write) -> Result<(), CliError> {
    let ledger = ctx.ledger()?;

    for applied in ledger.executed_unavailable() {
        writeln!(
            out,
            "  {} {} has no migration file",
            "!".yellow(),
            format_version(&applied.version)
        )?;
    }

    let mut drift = ledger.verify_checksums();
    for changed in &drift {
        writeln!(
            out,
            "  {} {} was modified after being applied",
            "x".red(),
            format_version(&changed.version)
        )?;
    }
    if drift.is_empty() {
        writeln!(out, "{}", "All checksums valid".green())?;
        Ok(())
    } else {
        Err(MigrationError::from(drift.remove(0)).into())
    }
}
