//! Ledger status snapshot

use crate::migration::VersionId;

/// One known version and whether it has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStatus {
    pub id: VersionId,
    pub applied: bool,
    pub description: Option<String>,
}

/// Counts and resolved aliases for a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatus {
    /// Every known version in order, with its applied flag
    pub versions: Vec<VersionStatus>,

    /// Applied versions with no migration file
    pub executed_unavailable: Vec<VersionId>,

    /// Total rows in the bookkeeping table, available or not
    pub executed_count: usize,

    pub prev: Option<VersionId>,
    pub current: VersionId,
    pub next: Option<VersionId>,
    pub latest: VersionId,
}

impl LedgerStatus {
    /// Number of known versions
    #[must_use]
    pub fn known_count(&self) -> usize {
        self.versions.len()
    }

    /// Known versions that have been applied
    #[must_use]
    pub fn migrated_count(&self) -> usize {
        self.versions.iter().filter(|v| v.applied).count()
    }

    /// Known versions not yet applied
    #[must_use]
    pub fn new_versions(&self) -> Vec<&VersionId> {
        self.versions
            .iter()
            .filter(|v| !v.applied)
            .map(|v| &v.id)
            .collect()
    }

    #[must_use]
    pub fn new_count(&self) -> usize {
        self.versions.len() - self.migrated_count()
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.new_count() == 0
    }

    /// Executed-but-unavailable versions exist; mutations need explicit confirmation
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        !self.executed_unavailable.is_empty()
    }
}
