// ============================================================================
// Staged Change Tracking
// ============================================================================
//
// Implements the Command Pattern for governed-store mutations. A StagedWrite
// collects Changes; commit validates the whole set against the constraint
// rules and the version checks, then applies everything or nothing.
//
// ============================================================================

use chrono::{DateTime, Utc};

use crate::core::EntityRef;

use super::audit::AuditEntry;
use super::record::{AuditTriple, PreservedState};

/// A single mutation staged against the governed store.
#[derive(Debug, Clone)]
pub enum Change {
    /// Soft delete: set the deleted mark, leave the row in place.
    MarkDeleted {
        target: EntityRef,
        expect_version: u64,
        mark: AuditTriple,
    },

    /// Terminal preserve. Write-once; the validator refuses replacements.
    MarkPreserved {
        target: EntityRef,
        expect_version: u64,
        state: PreservedState,
    },

    /// Deactivate (`active = false`) or reactivate a record.
    SetActive {
        target: EntityRef,
        expect_version: u64,
        active: bool,
        actor: String,
        at: DateTime<Utc>,
    },

    /// Physically remove one governed row. `require_deleted` is set when the
    /// row must already carry a soft-delete mark (the purge parent).
    HardDeleteEntity {
        target: EntityRef,
        require_deleted: bool,
    },

    /// Physically remove every allocation referencing the owner.
    PurgeAllocations { owner: EntityRef },

    /// Physically remove every communication referencing the owner.
    PurgeCommunications { owner: EntityRef },

    /// Append one audit-log row.
    AppendAudit { entry: AuditEntry },
}

impl Change {
    /// The governed record this change is aimed at, if any.
    pub fn target(&self) -> Option<EntityRef> {
        match self {
            Change::MarkDeleted { target, .. }
            | Change::MarkPreserved { target, .. }
            | Change::SetActive { target, .. }
            | Change::HardDeleteEntity { target, .. } => Some(*target),
            Change::PurgeAllocations { owner } | Change::PurgeCommunications { owner } => {
                Some(*owner)
            }
            Change::AppendAudit { .. } => None,
        }
    }

    /// True for changes that physically remove rows.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Change::HardDeleteEntity { .. }
                | Change::PurgeAllocations { .. }
                | Change::PurgeCommunications { .. }
        )
    }
}

/// An ordered set of changes committed as one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct StagedWrite {
    changes: Vec<Change>,
}

impl StagedWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// What a committed change-set actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub records_updated: usize,
    pub entities_removed: usize,
    pub evidence_rows_removed: usize,
    pub audit_entries_appended: usize,
}
