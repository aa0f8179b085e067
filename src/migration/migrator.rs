//! Migrator - plans and executes migration versions against a ledger

use crate::migration::ledger::Ledger;
use crate::migration::state_table;
use crate::migration::store::{ChangeBatch, VersionChange};
use crate::migration::{Direction, MigrationError, Version, VersionId};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Execution switches shared by `migrate` and `execute`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Report the SQL without running it or touching the version table
    pub dry_run: bool,
    /// Log how long each statement took
    pub time_queries: bool,
}

/// One version to run in a given direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub version: VersionId,
    pub direction: Direction,
    pub checksum: String,
    pub statements: Vec<String>,
}

impl PlannedStep {
    fn from_version(version: &Version, direction: Direction) -> Self {
        Self {
            version: version.id.clone(),
            direction,
            checksum: version.checksum.clone(),
            statements: version.statements(direction).to_vec(),
        }
    }

    fn change(&self) -> VersionChange {
        match self.direction {
            Direction::Up => VersionChange::Mark {
                version: self.version.clone(),
                checksum: Some(self.checksum.clone()),
            },
            Direction::Down => VersionChange::Unmark {
                version: self.version.clone(),
            },
        }
    }
}

/// Ordered steps that move the ledger from one version to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub direction: Direction,
    pub from: VersionId,
    pub to: VersionId,
    pub steps: Vec<PlannedStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn versions(&self) -> Vec<&VersionId> {
        self.steps.iter().map(|s| &s.version).collect()
    }
}

/// Outcome of running a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions run (or, for a dry run, that would have run), in order
    pub executed: Vec<VersionId>,
    /// Every migration statement, in execution order
    pub sql: Vec<String>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

/// Runs migration versions, one transaction per version
///
/// Each version's statements and its bookkeeping change go through
/// [`Ledger::commit`] together, so a failing statement leaves that version
/// unapplied. Versions committed before the failure stay committed.
pub struct Migrator<'l, 'a> {
    ledger: &'l mut Ledger<'a>,
}

impl<'l, 'a> Migrator<'l, 'a> {
    pub fn new(ledger: &'l mut Ledger<'a>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger<'a> {
        &*self.ledger
    }

    /// Work out which versions to run to reach `target`
    ///
    /// Up (target at or after the current version): known, unapplied
    /// versions up to and including `target`, oldest first. Down: applied,
    /// known versions after `target`, newest first.
    ///
    /// # Errors
    ///
    /// - `NoPendingMigrations` if no versions are known
    /// - `UnknownVersion` if `target` is neither zero nor a known version
    pub fn plan(&self, target: &VersionId) -> Result<MigrationPlan, MigrationError> {
        if self.ledger.versions().is_empty() {
            return Err(MigrationError::NoPendingMigrations);
        }
        if !target.is_zero() && !self.ledger.is_known(target) {
            return Err(MigrationError::UnknownVersion(target.to_string()));
        }

        let current = self.ledger.current_version();
        let direction = if *target >= current {
            Direction::Up
        } else {
            Direction::Down
        };

        let steps = match direction {
            Direction::Up => self
                .ledger
                .versions()
                .iter()
                .filter(|v| !self.ledger.is_applied(&v.id) && v.id <= *target)
                .map(|v| PlannedStep::from_version(v, direction))
                .collect(),
            Direction::Down => self
                .ledger
                .versions()
                .iter()
                .rev()
                .filter(|v| self.ledger.is_applied(&v.id) && v.id > *target)
                .map(|v| PlannedStep::from_version(v, direction))
                .collect(),
        };

        Ok(MigrationPlan {
            direction,
            from: current,
            to: target.clone(),
            steps,
        })
    }

    /// Plan and run a migration to `target`
    ///
    /// # Errors
    ///
    /// Returns planning errors, or the first failing version's error.
    pub fn migrate(
        &mut self,
        target: &VersionId,
        options: MigrateOptions,
    ) -> Result<MigrationReport, MigrationError> {
        let plan = self.plan(target)?;
        log::info!(
            "Migrating {} from {} to {}",
            plan.direction,
            plan.from,
            plan.to
        );
        self.run(&plan, options)
    }

    /// Plan a single version in one direction
    ///
    /// # Errors
    ///
    /// - `UnknownVersion` if `id` is not known
    /// - `AlreadyMarked` if running up an applied version or down an unapplied one
    pub fn plan_single(&self, id: &VersionId, direction: Direction) -> Result<MigrationPlan, MigrationError> {
        let version = self
            .ledger
            .version(id)
            .ok_or_else(|| MigrationError::UnknownVersion(id.to_string()))?;

        if self.ledger.is_applied(id) == direction.marks_applied() {
            return Err(MigrationError::AlreadyMarked {
                version: id.clone(),
                applied: direction.marks_applied(),
            });
        }

        Ok(MigrationPlan {
            direction,
            from: self.ledger.current_version(),
            to: id.clone(),
            steps: vec![PlannedStep::from_version(version, direction)],
        })
    }

    /// Run a single version up or down
    ///
    /// # Errors
    ///
    /// See [`Migrator::plan_single`]; also returns the version's execution error.
    pub fn execute(
        &mut self,
        id: &VersionId,
        direction: Direction,
        options: MigrateOptions,
    ) -> Result<MigrationReport, MigrationError> {
        let plan = self.plan_single(id, direction)?;
        self.run(&plan, options)
    }

    /// Run every step of `plan` in order
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing version's error.
    pub fn run(&mut self, plan: &MigrationPlan, options: MigrateOptions) -> Result<MigrationReport, MigrationError> {
        let start = Instant::now();
        let mut report = MigrationReport {
            dry_run: options.dry_run,
            ..MigrationReport::default()
        };

        for step in &plan.steps {
            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!(
                "tidemark.migration",
                version = %step.version,
                direction = %step.direction
            )
            .entered();

            log::info!(
                "{} {} ({})",
                if step.direction == Direction::Up { "++ migrating" } else { "-- reverting" },
                step.version,
                step.version.format()
            );
            if step.direction == Direction::Down && step.statements.is_empty() {
                log::warn!("Version {} has no down statements", step.version);
            }

            if options.dry_run {
                for statement in &step.statements {
                    log::info!("   -> {statement}");
                }
            } else {
                let batch = ChangeBatch {
                    statements: step.statements.clone(),
                    changes: vec![step.change()],
                };
                let version_start = Instant::now();
                let timings = self.ledger.commit(&batch).map_err(|e| {
                    log::error!("Version {} failed: {}", step.version, e);
                    e
                })?;

                for (statement, elapsed) in step.statements.iter().zip(&timings) {
                    if options.time_queries {
                        log::info!("   -> {statement} ({} ms)", elapsed.as_millis());
                    } else {
                        log::debug!("   -> {statement}");
                    }
                    #[cfg(feature = "metrics")]
                    crate::metrics::METRICS.record_statement(*elapsed);
                }
                #[cfg(feature = "metrics")]
                crate::metrics::METRICS.record_version(step.direction);

                log::info!(
                    "{} {} in {} ms",
                    if step.direction == Direction::Up { "++ migrated" } else { "-- reverted" },
                    step.version,
                    version_start.elapsed().as_millis()
                );
            }

            report.sql.extend(step.statements.iter().cloned());
            report.executed.push(step.version.clone());
        }

        report.elapsed = start.elapsed();
        if !plan.is_empty() {
            log::info!(
                "{} {} version(s) in {} ms",
                if options.dry_run { "Would have run" } else { "Ran" },
                report.executed.len(),
                report.elapsed.as_millis()
            );
        }
        Ok(report)
    }

    /// SQL for `plan`, bookkeeping statements included, as written by [`Migrator::write_sql`]
    pub fn plan_sql(&self, plan: &MigrationPlan) -> String {
        let table = self.ledger.store().table_name();
        let mut out = format!(
            "-- Tidemark migration file generated on {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );

        for step in &plan.steps {
            out.push_str(&format!("\n-- Version {} ({})\n", step.version, step.direction));
            for statement in &step.statements {
                out.push_str(statement);
                out.push_str(";\n");
            }
            let bookkeeping = match step.change() {
                VersionChange::Mark { version, checksum } => {
                    state_table::insert_version_sql(table, &version, checksum.as_deref())
                }
                VersionChange::Unmark { version } => state_table::delete_version_sql(table, &version),
            };
            out.push_str(&bookkeeping);
            out.push_str(";\n");
        }
        out
    }

    /// Write the plan's SQL to `path`
    ///
    /// When `path` is a directory, a file named
    /// `tidemark_migration_{YYYYMMDDHHMMSS}.sql` is created inside it.
    /// Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Io` if the file can't be written.
    pub fn write_sql(&self, path: &Path, plan: &MigrationPlan) -> Result<PathBuf, MigrationError> {
        let target = if path.is_dir() {
            path.join(format!(
                "tidemark_migration_{}.sql",
                Utc::now().format("%Y%m%d%H%M%S")
            ))
        } else {
            path.to_path_buf()
        };

        fs::write(&target, self.plan_sql(plan)).map_err(|error| MigrationError::Io {
            path: target.clone(),
            error,
        })?;
        log::info!("Wrote migration SQL to {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::store::{MemoryVersionStore, VersionStore};
    use tempfile::TempDir;

    fn version(id: &str) -> Version {
        Version {
            id: VersionId::new(id),
            name: None,
            description: None,
            path: PathBuf::from(format!("m{id}.sql")),
            checksum: format!("sum-{id}"),
            up: vec![format!("CREATE TABLE t{id} (id INT)")],
            down: vec![format!("DROP TABLE t{id}")],
        }
    }

    fn ledger<'a>(store: &'a MemoryVersionStore) -> Ledger<'a> {
        Ledger::with_versions(
            PathBuf::from("migrations"),
            ["20200101", "20200102", "20200103"].into_iter().map(version).collect(),
            store,
        )
        .unwrap()
    }

    fn ids(versions: &[VersionId]) -> Vec<&str> {
        versions.iter().map(VersionId::as_str).collect()
    }

    #[test]
    fn test_plan_up_to_latest() {
        let store = MemoryVersionStore::with_applied(["20200101"]);
        let mut ledger = ledger(&store);
        let migrator = Migrator::new(&mut ledger);

        let plan = migrator.plan(&VersionId::new("20200103")).unwrap();
        assert_eq!(plan.direction, Direction::Up);
        assert_eq!(plan.from, VersionId::new("20200101"));
        let versions: Vec<&str> = plan.versions().into_iter().map(VersionId::as_str).collect();
        assert_eq!(versions, vec!["20200102", "20200103"]);
    }

    #[test]
    fn test_plan_down_to_first() {
        let store = MemoryVersionStore::with_applied(["20200101", "20200102"]);
        let mut ledger = ledger(&store);
        let migrator = Migrator::new(&mut ledger);

        let plan = migrator.plan(&VersionId::zero()).unwrap();
        assert_eq!(plan.direction, Direction::Down);
        let versions: Vec<&str> = plan.versions().into_iter().map(VersionId::as_str).collect();
        assert_eq!(versions, vec!["20200102", "20200101"]);
        assert_eq!(plan.steps[0].statements, vec!["DROP TABLE t20200102".to_string()]);
    }

    #[test]
    fn test_plan_errors() {
        let store = MemoryVersionStore::new();
        let mut empty = Ledger::with_versions(PathBuf::from("m"), Vec::new(), &store).unwrap();
        let err = Migrator::new(&mut empty).plan(&VersionId::zero()).unwrap_err();
        assert!(matches!(err, MigrationError::NoPendingMigrations));

        let mut ledger = ledger(&store);
        let err = Migrator::new(&mut ledger)
            .plan(&VersionId::new("20300101"))
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion(_)));
    }

    #[test]
    fn test_migrate_runs_and_marks() {
        let store = MemoryVersionStore::new();
        let mut ledger = ledger(&store);
        let report = Migrator::new(&mut ledger)
            .migrate(&VersionId::new("20200102"), MigrateOptions::default())
            .unwrap();

        assert_eq!(ids(&report.executed), vec!["20200101", "20200102"]);
        assert_eq!(store.commit_count(), 2);
        assert_eq!(
            store.executed_statements(),
            vec!["CREATE TABLE t20200101 (id INT)", "CREATE TABLE t20200102 (id INT)"]
        );
        assert_eq!(ledger.current_version(), VersionId::new("20200102"));
        assert_eq!(ledger.applied()[0].checksum.as_deref(), Some("sum-20200101"));
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let store = MemoryVersionStore::new();
        let mut ledger = ledger(&store);
        let report = Migrator::new(&mut ledger)
            .migrate(
                &VersionId::new("20200103"),
                MigrateOptions {
                    dry_run: true,
                    time_queries: false,
                },
            )
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.executed.len(), 3);
        assert_eq!(report.sql.len(), 3);
        assert_eq!(store.commit_count(), 0);
        assert!(store.applied_versions().unwrap().is_empty());
    }

    #[test]
    fn test_failing_statement_stops_and_rolls_back_that_version() {
        let store = MemoryVersionStore::new();
        store.fail_on("CREATE TABLE t20200102 (id INT)");
        let mut ledger = ledger(&store);

        let result = Migrator::new(&mut ledger).migrate(&VersionId::new("20200103"), MigrateOptions::default());
        assert!(result.is_err());

        let applied: Vec<String> = store
            .applied_versions()
            .unwrap()
            .into_iter()
            .map(|a| a.version.to_string())
            .collect();
        assert_eq!(applied, vec!["20200101"]);
        assert_eq!(ledger.current_version(), VersionId::new("20200101"));
    }

    #[test]
    fn test_execute_single_version() {
        let store = MemoryVersionStore::with_applied(["20200101"]);
        let mut ledger = ledger(&store);
        let mut migrator = Migrator::new(&mut ledger);

        let report = migrator
            .execute(&VersionId::new("20200103"), Direction::Up, MigrateOptions::default())
            .unwrap();
        assert_eq!(ids(&report.executed), vec!["20200103"]);
        assert!(!migrator.ledger().is_applied(&VersionId::new("20200102")));

        let err = migrator
            .execute(&VersionId::new("20200103"), Direction::Up, MigrateOptions::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyMarked { applied: true, .. }));

        let err = migrator
            .execute(&VersionId::new("20200102"), Direction::Down, MigrateOptions::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyMarked { applied: false, .. }));

        let err = migrator
            .execute(&VersionId::new("1"), Direction::Up, MigrateOptions::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion(_)));
    }

    #[test]
    fn test_write_sql_into_directory() {
        let dir = TempDir::new().unwrap();
        let store = MemoryVersionStore::with_applied(["20200101"]);
        let mut ledger = ledger(&store);
        let migrator = Migrator::new(&mut ledger);

        let plan = migrator.plan(&VersionId::zero()).unwrap();
        let path = migrator.write_sql(dir.path(), &plan).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("tidemark_migration_"));
        assert!(name.ends_with(".sql"));

        let sql = fs::read_to_string(&path).unwrap();
        assert!(sql.contains("DROP TABLE t20200101;"));
        assert!(sql.contains("DELETE FROM \"tidemark_migration_versions\""));
        // writing SQL doesn't execute anything
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_write_sql_to_file_includes_insert() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.sql");
        let store = MemoryVersionStore::new();
        let mut ledger = ledger(&store);
        let migrator = Migrator::new(&mut ledger);

        let plan = migrator.plan(&VersionId::new("20200101")).unwrap();
        assert_eq!(migrator.write_sql(&target, &plan).unwrap(), target);

        let sql = fs::read_to_string(&target).unwrap();
        assert!(sql.contains("CREATE TABLE t20200101 (id INT);"));
        assert!(sql.contains("INSERT INTO \"tidemark_migration_versions\""));
        assert!(sql.contains("'sum-20200101'"));
    }
}
