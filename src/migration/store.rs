//! Persisted storage for the applied-version set
//!
//! [`VersionStore`] is the only way the ledger reads or writes applied
//! versions. Every write goes through [`VersionStore::commit`], which runs a
//! [`ChangeBatch`] in a single transaction: either every schema statement
//! and every version change lands, or none do.

use crate::migration::state_table;
use crate::migration::{AppliedVersion, MigrationError, VersionId};
use crate::transaction::Transaction;
use crate::TideExecutor;
use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A single bookkeeping change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChange {
    /// Record the version as applied, with the file checksum if known
    Mark {
        version: VersionId,
        checksum: Option<String>,
    },
    /// Remove the version's record
    Unmark { version: VersionId },
}

impl VersionChange {
    pub fn version(&self) -> &VersionId {
        match self {
            VersionChange::Mark { version, .. } | VersionChange::Unmark { version } => version,
        }
    }
}

/// Schema statements and version changes applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Run first, in order
    pub statements: Vec<String>,
    /// Applied after the statements
    pub changes: Vec<VersionChange>,
}

impl ChangeBatch {
    pub fn from_changes(changes: Vec<VersionChange>) -> Self {
        Self {
            statements: Vec::new(),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.changes.is_empty()
    }
}

/// Accessor for the persisted applied-version set
pub trait VersionStore {
    /// Name of the bookkeeping table; statements mentioning it are kept out of generated diffs
    fn table_name(&self) -> &str;

    /// Create the bookkeeping table if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the table can't be created.
    fn ensure_table(&self) -> Result<(), MigrationError>;

    /// All recorded versions, sorted
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the table can't be read.
    fn applied_versions(&self) -> Result<Vec<AppliedVersion>, MigrationError>;

    /// Apply `batch` in one transaction, returning how long each statement took
    ///
    /// # Errors
    ///
    /// Returns the first failure; nothing from the batch is persisted in that case.
    fn commit(&self, batch: &ChangeBatch) -> Result<Vec<Duration>, MigrationError>;
}

/// [`VersionStore`] backed by a PostgreSQL table
pub struct PostgresVersionStore<'a> {
    executor: &'a dyn TideExecutor,
    table: String,
}

impl<'a> PostgresVersionStore<'a> {
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidArgument` if `table` is not a plain identifier.
    pub fn new(executor: &'a dyn TideExecutor, table: impl Into<String>) -> Result<Self, MigrationError> {
        let table = table.into();
        state_table::validate_table_name(&table)?;
        Ok(Self { executor, table })
    }

    fn change_sql(&self, change: &VersionChange) -> String {
        match change {
            VersionChange::Mark { version, checksum } => {
                state_table::insert_version_sql(&self.table, version, checksum.as_deref())
            }
            VersionChange::Unmark { version } => state_table::delete_version_sql(&self.table, version),
        }
    }
}

impl VersionStore for PostgresVersionStore<'_> {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn ensure_table(&self) -> Result<(), MigrationError> {
        self.executor
            .execute(&state_table::create_table_sql(&self.table), &[])?;
        Ok(())
    }

    fn applied_versions(&self) -> Result<Vec<AppliedVersion>, MigrationError> {
        let rows = self
            .executor
            .query_all(&state_table::select_versions_sql(&self.table), &[])?;

        let mut versions = rows
            .iter()
            .map(AppliedVersion::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        // the column is text, so re-sort with version ordering
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(versions)
    }

    fn commit(&self, batch: &ChangeBatch) -> Result<Vec<Duration>, MigrationError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let tx = Transaction::begin(self.executor)?;
        let mut timings = Vec::with_capacity(batch.statements.len());

        for statement in &batch.statements {
            let start = Instant::now();
            tx.execute(statement, &[])?;
            timings.push(start.elapsed());
        }
        for change in &batch.changes {
            let affected = tx.execute(&self.change_sql(change), &[])?;
            if affected != 1 {
                // dropping `tx` rolls back
                return Err(MigrationError::Database(crate::TideError::QueryError(format!(
                    "expected to change one row for version {}, changed {}",
                    change.version(),
                    affected
                ))));
            }
        }

        tx.commit()?;
        Ok(timings)
    }
}

/// In-memory [`VersionStore`] for tests and dry runs
///
/// Statements are recorded rather than executed. A statement registered with
/// [`MemoryVersionStore::fail_on`] makes the commit fail without persisting
/// anything, which is how rollback behaviour is exercised without a database.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    table: String,
    applied: RefCell<BTreeMap<VersionId, AppliedVersion>>,
    executed: RefCell<Vec<String>>,
    fail_on: RefCell<Option<String>>,
    commits: Cell<usize>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self {
            table: crate::config::DEFAULT_VERSION_TABLE.to_string(),
            ..Self::default()
        }
    }

    /// Store pre-populated with applied versions
    pub fn with_applied<I, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<VersionId>,
    {
        let store = Self::new();
        {
            let mut applied = store.applied.borrow_mut();
            for version in versions {
                let version = version.into();
                applied.insert(version.clone(), AppliedVersion::new(version, Utc::now(), None));
            }
        }
        store
    }

    /// Fail any commit that contains this statement
    pub fn fail_on(&self, statement: impl Into<String>) {
        *self.fail_on.borrow_mut() = Some(statement.into());
    }

    /// Statements from successful commits, in order
    pub fn executed_statements(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    /// Number of successful non-empty commits
    pub fn commit_count(&self) -> usize {
        self.commits.get()
    }
}

impl VersionStore for MemoryVersionStore {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn ensure_table(&self) -> Result<(), MigrationError> {
        Ok(())
    }

    fn applied_versions(&self) -> Result<Vec<AppliedVersion>, MigrationError> {
        Ok(self.applied.borrow().values().cloned().collect())
    }

    fn commit(&self, batch: &ChangeBatch) -> Result<Vec<Duration>, MigrationError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(failing) = self.fail_on.borrow().as_deref() {
            if batch.statements.iter().any(|s| s == failing) {
                return Err(MigrationError::Database(crate::TideError::QueryError(format!(
                    "statement failed: {failing}"
                ))));
            }
        }

        // Validate against a copy so a bad change leaves the real map untouched
        let mut next = self.applied.borrow().clone();
        for change in &batch.changes {
            match change {
                VersionChange::Mark { version, checksum } => {
                    if next.contains_key(version) {
                        return Err(MigrationError::Database(crate::TideError::QueryError(format!(
                            "duplicate key value: version {version}"
                        ))));
                    }
                    next.insert(
                        version.clone(),
                        AppliedVersion::new(version.clone(), Utc::now(), checksum.clone()),
                    );
                }
                VersionChange::Unmark { version } => {
                    if next.remove(version).is_none() {
                        return Err(MigrationError::Database(crate::TideError::QueryError(format!(
                            "no row for version {version}"
                        ))));
                    }
                }
            }
        }

        *self.applied.borrow_mut() = next;
        self.executed
            .borrow_mut()
            .extend(batch.statements.iter().cloned());
        self.commits.set(self.commits.get() + 1);
        Ok(vec![Duration::ZERO; batch.statements.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied_ids(store: &MemoryVersionStore) -> Vec<String> {
        store
            .applied_versions()
            .unwrap()
            .into_iter()
            .map(|v| v.version.to_string())
            .collect()
    }

    #[test]
    fn test_memory_store_commit() {
        let store = MemoryVersionStore::with_applied(["20240101000000"]);
        let batch = ChangeBatch {
            statements: vec!["CREATE TABLE t (id INT)".to_string()],
            changes: vec![
                VersionChange::Mark {
                    version: VersionId::new("20240102000000"),
                    checksum: Some("abc".to_string()),
                },
                VersionChange::Unmark {
                    version: VersionId::new("20240101000000"),
                },
            ],
        };

        store.commit(&batch).unwrap();
        assert_eq!(applied_ids(&store), vec!["20240102000000"]);
        assert_eq!(store.executed_statements(), vec!["CREATE TABLE t (id INT)"]);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_memory_store_rejects_batch_atomically() {
        let store = MemoryVersionStore::with_applied(["20240101000000"]);
        let batch = ChangeBatch::from_changes(vec![
            VersionChange::Mark {
                version: VersionId::new("20240102000000"),
                checksum: None,
            },
            // already applied, fails the whole batch
            VersionChange::Mark {
                version: VersionId::new("20240101000000"),
                checksum: None,
            },
        ]);

        assert!(store.commit(&batch).is_err());
        assert_eq!(applied_ids(&store), vec!["20240101000000"]);
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_memory_store_failing_statement() {
        let store = MemoryVersionStore::new();
        store.fail_on("DROP TABLE users");
        let batch = ChangeBatch {
            statements: vec!["DROP TABLE users".to_string()],
            changes: vec![VersionChange::Mark {
                version: VersionId::new("20240101000000"),
                checksum: None,
            }],
        };

        assert!(store.commit(&batch).is_err());
        assert!(applied_ids(&store).is_empty());
        assert!(store.executed_statements().is_empty());
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let store = MemoryVersionStore::new();
        store.commit(&ChangeBatch::default()).unwrap();
        assert_eq!(store.commit_count(), 0);
    }
}
