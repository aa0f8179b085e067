//! The migration ledger
//!
//! A [`Ledger`] joins the versions discovered on disk with the applied set
//! held by a [`VersionStore`]. It resolves aliases, marks versions by hand,
//! reports status and drives schema diffs. Every write goes through the
//! store and is followed by a re-read of the applied set, so the ledger
//! never holds state the store doesn't.

use crate::migration::checksum::checksum_matches;
use crate::migration::differ::{SchemaDiff, SchemaDiffer};
use crate::migration::file::discover_versions;
use crate::migration::schema::Schema;
use crate::migration::status::{LedgerStatus, VersionStatus};
use crate::migration::store::{ChangeBatch, VersionChange, VersionStore};
use crate::migration::{Alias, AppliedVersion, MigrationError, Version, VersionId};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An applied version whose file changed after it was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDrift {
    pub version: VersionId,
    pub stored: String,
    pub current: String,
}

impl From<ChecksumDrift> for MigrationError {
    fn from(drift: ChecksumDrift) -> Self {
        MigrationError::ChecksumMismatch {
            version: drift.version,
            stored: drift.stored,
            current: drift.current,
        }
    }
}

fn change_for(version: &Version, applied: bool) -> VersionChange {
    if applied {
        VersionChange::Mark {
            version: version.id.clone(),
            checksum: Some(version.checksum.clone()),
        }
    } else {
        VersionChange::Unmark {
            version: version.id.clone(),
        }
    }
}

pub struct Ledger<'a> {
    directory: PathBuf,
    versions: Vec<Version>,
    applied: Vec<AppliedVersion>,
    store: &'a dyn VersionStore,
}

impl<'a> Ledger<'a> {
    /// Discover versions in `directory` and load the applied set
    ///
    /// Discovery runs before anything touches the store, so a missing
    /// directory aborts without creating the bookkeeping table.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DirectoryNotFound` if `directory` is missing,
    /// `InvalidFormat` for bad migration files and `Database` for store failures.
    pub fn load(directory: impl AsRef<Path>, store: &'a dyn VersionStore) -> Result<Self, MigrationError> {
        let directory = directory.as_ref().to_path_buf();
        let versions = discover_versions(&directory)?;
        Self::with_versions(directory, versions, store)
    }

    /// Build a ledger from already discovered versions
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the store can't be prepared or read.
    pub fn with_versions(
        directory: PathBuf,
        mut versions: Vec<Version>,
        store: &'a dyn VersionStore,
    ) -> Result<Self, MigrationError> {
        versions.sort_by(|a, b| a.id.cmp(&b.id));
        store.ensure_table()?;
        let applied = store.applied_versions()?;

        log::debug!(
            "Ledger loaded: {} known, {} applied (table {})",
            versions.len(),
            applied.len(),
            store.table_name()
        );

        Ok(Self {
            directory,
            versions,
            applied,
            store,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Known versions, oldest first
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Applied versions as last read from the store, oldest first
    pub fn applied(&self) -> &[AppliedVersion] {
        &self.applied
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store
    }

    pub fn version(&self, id: &VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| &v.id == id)
    }

    pub fn is_known(&self, id: &VersionId) -> bool {
        self.version(id).is_some()
    }

    pub fn is_applied(&self, id: &VersionId) -> bool {
        self.applied.iter().any(|a| &a.version == id)
    }

    /// Highest applied version that is also known, or the zero version
    pub fn current_version(&self) -> VersionId {
        self.versions
            .iter()
            .rev()
            .find(|v| self.is_applied(&v.id))
            .map_or_else(VersionId::zero, |v| v.id.clone())
    }

    /// Highest known version, or the zero version when nothing is known
    pub fn latest_version(&self) -> VersionId {
        self.versions
            .last()
            .map_or_else(VersionId::zero, |v| v.id.clone())
    }

    /// Resolve an alias against the known sequence `[0, known...]`
    ///
    /// `None` means "no such version": `prev` at the first version, `next`
    /// at the latest, or a literal that isn't known.
    pub fn resolve_alias(&self, alias: &Alias) -> Option<VersionId> {
        match alias {
            Alias::First => Some(VersionId::zero()),
            Alias::Current => Some(self.current_version()),
            Alias::Latest => Some(self.latest_version()),
            Alias::Prev | Alias::Next => {
                let sequence = self.sequence();
                let current = self.current_version();
                let index = sequence.iter().position(|id| *id == current)?;
                let neighbour = if *alias == Alias::Prev {
                    index.checked_sub(1)?
                } else {
                    index + 1
                };
                sequence.get(neighbour).cloned()
            }
            Alias::Version(id) if id.is_zero() || self.is_known(id) => Some(id.clone()),
            Alias::Version(_) => None,
        }
    }

    /// Parse and resolve in one step
    pub fn resolve(&self, input: &str) -> Option<VersionId> {
        self.resolve_alias(&Alias::parse(input))
    }

    fn sequence(&self) -> Vec<VersionId> {
        std::iter::once(VersionId::zero())
            .chain(self.versions.iter().map(|v| v.id.clone()))
            .collect()
    }

    /// Known versions that have been applied, oldest first
    pub fn migrated_versions(&self) -> Vec<&Version> {
        self.versions.iter().filter(|v| self.is_applied(&v.id)).collect()
    }

    /// Known versions not yet applied, oldest first
    pub fn new_versions(&self) -> Vec<&Version> {
        self.versions.iter().filter(|v| !self.is_applied(&v.id)).collect()
    }

    /// Applied versions with no migration file
    pub fn executed_unavailable(&self) -> Vec<&AppliedVersion> {
        self.applied
            .iter()
            .filter(|a| !self.is_known(&a.version))
            .collect()
    }

    /// Commit a batch through the store and re-read the applied set
    ///
    /// # Errors
    ///
    /// Returns the store's error; the applied set is unchanged in that case.
    pub fn commit(&mut self, batch: &ChangeBatch) -> Result<Vec<Duration>, MigrationError> {
        let timings = self.store.commit(batch)?;
        self.reload()?;
        Ok(timings)
    }

    /// Re-read the applied set from the store
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the store can't be read.
    pub fn reload(&mut self) -> Result<(), MigrationError> {
        self.applied = self.store.applied_versions()?;
        Ok(())
    }

    /// Mark a single known version as applied or not applied
    ///
    /// # Errors
    ///
    /// - `UnknownVersion` if `id` is not a known version
    /// - `AlreadyMarked` if the version is already in the requested state
    pub fn mark(&mut self, id: &VersionId, applied: bool) -> Result<(), MigrationError> {
        let version = self
            .version(id)
            .ok_or_else(|| MigrationError::UnknownVersion(id.to_string()))?;

        if self.is_applied(id) == applied {
            return Err(MigrationError::AlreadyMarked {
                version: id.clone(),
                applied,
            });
        }

        let batch = ChangeBatch::from_changes(vec![change_for(version, applied)]);
        self.commit(&batch)?;
        log::info!("Marked {} as {}", id, if applied { "migrated" } else { "not migrated" });
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_marks(1, applied);
        Ok(())
    }

    /// Mark every known version, skipping those already in the requested state
    ///
    /// Returns the versions that changed.
    ///
    /// # Errors
    ///
    /// Returns the store's error; nothing is changed in that case.
    pub fn mark_all(&mut self, applied: bool) -> Result<Vec<VersionId>, MigrationError> {
        let selected: Vec<VersionId> = self.versions.iter().map(|v| v.id.clone()).collect();
        self.mark_bulk(&selected, applied)
    }

    /// Mark known versions in the inclusive range `from..=to`, skipping those
    /// already in the requested state
    ///
    /// Returns the versions that changed.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `from` sorts after `to`
    /// - the store's error, in which case nothing is changed
    pub fn mark_range(
        &mut self,
        from: &VersionId,
        to: &VersionId,
        applied: bool,
    ) -> Result<Vec<VersionId>, MigrationError> {
        if from > to {
            return Err(MigrationError::InvalidArgument(format!(
                "Range start {from} is after range end {to}."
            )));
        }
        let selected: Vec<VersionId> = self
            .versions
            .iter()
            .filter(|v| &v.id >= from && &v.id <= to)
            .map(|v| v.id.clone())
            .collect();
        self.mark_bulk(&selected, applied)
    }

    fn mark_bulk(&mut self, selected: &[VersionId], applied: bool) -> Result<Vec<VersionId>, MigrationError> {
        let mut changes = Vec::new();
        for id in selected {
            if self.is_applied(id) == applied {
                log::debug!("Skipping {id}: already in the requested state");
                continue;
            }
            if let Some(version) = self.version(id) {
                changes.push(change_for(version, applied));
            }
        }

        let changed: Vec<VersionId> = changes.iter().map(|c| c.version().clone()).collect();
        if changed.is_empty() {
            log::info!("No versions to mark");
            return Ok(changed);
        }

        self.commit(&ChangeBatch::from_changes(changes))?;
        log::info!(
            "Marked {} version(s) as {}",
            changed.len(),
            if applied { "migrated" } else { "not migrated" }
        );
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_marks(changed.len() as u64, applied);
        Ok(changed)
    }

    /// Diff `current` against `target`
    ///
    /// When `filter` is given, tables whose unqualified name doesn't match
    /// are removed from both schemas first. Statements that mention the
    /// bookkeeping table are dropped from the result.
    pub fn diff_against_schema(
        &self,
        differ: &dyn SchemaDiffer,
        current: &Schema,
        target: &Schema,
        filter: Option<&Regex>,
    ) -> SchemaDiff {
        let mut current = current.clone();
        let mut target = target.clone();
        if let Some(filter) = filter {
            current.retain_matching(filter);
            target.retain_matching(filter);
        }

        let diff = differ.diff(&current, &target);
        let table = self.store.table_name().to_lowercase();
        let keep = |statements: Vec<String>| -> Vec<String> {
            statements
                .into_iter()
                .filter(|s| !s.to_lowercase().contains(&table))
                .collect()
        };

        SchemaDiff {
            up: keep(diff.up),
            down: keep(diff.down),
        }
    }

    pub fn status(&self) -> LedgerStatus {
        LedgerStatus {
            versions: self
                .versions
                .iter()
                .map(|v| VersionStatus {
                    id: v.id.clone(),
                    applied: self.is_applied(&v.id),
                    description: v.description.clone(),
                })
                .collect(),
            executed_unavailable: self
                .executed_unavailable()
                .into_iter()
                .map(|a| a.version.clone())
                .collect(),
            executed_count: self.applied.len(),
            prev: self.resolve_alias(&Alias::Prev),
            current: self.current_version(),
            next: self.resolve_alias(&Alias::Next),
            latest: self.latest_version(),
        }
    }

    /// Applied versions whose file no longer matches the recorded checksum
    pub fn verify_checksums(&self) -> Vec<ChecksumDrift> {
        self.applied
            .iter()
            .filter_map(|record| {
                let version = self.version(&record.version)?;
                let stored = record.checksum.as_deref()?;
                if checksum_matches(Some(stored), &version.checksum) {
                    None
                } else {
                    Some(ChecksumDrift {
                        version: version.id.clone(),
                        stored: stored.to_string(),
                        current: version.checksum.clone(),
                    })
                }
            })
            .collect()
    }
}
