use std::sync::Arc;

use crate::core::{EngineError, Result};
use crate::registry::EntityRegistry;

use super::record::EntityRecord;

/// Storage-boundary invariant checks.
///
/// Every staged write passes through here before anything is applied, so an
/// illegal lifecycle state can never reach the tables no matter what the
/// layers above do. Violations surface as `TransactionFailure`: they mean a
/// staged set was built wrong, not that a caller made a bad request.
pub struct ConstraintValidator {
    registry: Arc<EntityRegistry>,
}

impl ConstraintValidator {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    /// Check a single record as stored. Used for inserts, snapshot loads and
    /// whole-store sweeps.
    pub fn check_record(&self, record: &EntityRecord) -> Result<()> {
        let policy = self.registry.policy(record.kind);
        let lifecycle = &record.lifecycle;

        if lifecycle.is_deleted() && lifecycle.is_preserved() {
            return Err(invariant(record, "simultaneously deleted and preserved"));
        }
        if lifecycle.is_deleted() && !policy.deletable {
            return Err(invariant(record, "non-deletable kind carries a deleted mark"));
        }
        if lifecycle.is_deleted() && record.system {
            return Err(invariant(record, "system record carries a deleted mark"));
        }
        if let Some(preserved) = &lifecycle.preserved {
            if !preserved.verb.is_terminal() {
                return Err(invariant(record, "preserved with a non-terminal verb"));
            }
            if preserved.verb != policy.preserve_verb {
                return Err(invariant(record, "preserve verb does not match the kind's policy"));
            }
            if record.system {
                return Err(invariant(record, "system record carries a preserve mark"));
            }
        }
        if record.version == 0 {
            return Err(invariant(record, "version must start at 1"));
        }
        Ok(())
    }

    /// Check a lifecycle transition `before -> after` on one record.
    pub fn check_transition(&self, before: &EntityRecord, after: &EntityRecord) -> Result<()> {
        self.check_record(after)?;

        if before.lifecycle.is_deleted() {
            // only the reaper touches deleted rows, and it removes them
            return Err(invariant(before, "deleted records accept no further transitions"));
        }
        if before.lifecycle.is_preserved() && after.lifecycle.preserved != before.lifecycle.preserved
        {
            return Err(invariant(before, "preserve marks are write-once"));
        }
        if after.version != before.version + 1 {
            return Err(invariant(after, "version must advance by exactly one"));
        }
        Ok(())
    }

    /// Check a physical removal.
    pub fn check_hard_delete(&self, record: &EntityRecord, require_deleted: bool) -> Result<()> {
        if record.lifecycle.is_preserved() {
            return Err(EngineError::TransactionFailure(format!(
                "{} is preserved and can never be purged",
                record.entity_ref()
            )));
        }
        if require_deleted && !record.lifecycle.is_deleted() {
            return Err(EngineError::TransactionFailure(format!(
                "{} carries no soft-delete mark; refusing hard delete",
                record.entity_ref()
            )));
        }
        Ok(())
    }
}

fn invariant(record: &EntityRecord, what: &str) -> EngineError {
    EngineError::TransactionFailure(format!(
        "invariant violated for {}: {}",
        record.entity_ref(),
        what
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityKind, PreserveAction};
    use crate::store::record::{AuditTriple, PreservedState};
    use chrono::Utc;

    fn validator() -> ConstraintValidator {
        ConstraintValidator::new(Arc::new(EntityRegistry::standard()))
    }

    fn mark() -> AuditTriple {
        AuditTriple::new("ops", Utc::now())
    }

    #[test]
    fn deleted_and_preserved_are_mutually_exclusive() {
        let mut record = EntityRecord::new(EntityKind::Customer, "Acme");
        record.lifecycle.deleted = Some(mark());
        record.lifecycle.preserved = Some(PreservedState {
            verb: PreserveAction::Terminate,
            mark: mark().with_reason("account closed for good"),
        });
        assert!(validator().check_record(&record).is_err());
    }

    #[test]
    fn non_deletable_kinds_never_carry_a_deleted_mark() {
        let mut contract = EntityRecord::new(EntityKind::Contract, "Storage agreement");
        contract.lifecycle.deleted = Some(mark());
        assert!(validator().check_record(&contract).is_err());
    }

    #[test]
    fn preserve_marks_are_write_once() {
        let validator = validator();
        let mut before = EntityRecord::new(EntityKind::User, "pat");
        before.lifecycle.preserved = Some(PreservedState {
            verb: PreserveAction::Disable,
            mark: mark().with_reason("left the company"),
        });
        let mut after = before.clone();
        after.lifecycle.preserved = Some(PreservedState {
            verb: PreserveAction::Disable,
            mark: mark().with_reason("rewritten justification"),
        });
        after.version += 1;
        assert!(validator.check_transition(&before, &after).is_err());
    }

    #[test]
    fn deleted_records_accept_no_further_transitions() {
        let validator = validator();
        let mut before = EntityRecord::new(EntityKind::Contact, "Sam");
        before.lifecycle.deleted = Some(mark());
        let mut after = before.clone();
        after.lifecycle.deactivated = Some(mark());
        after.version += 1;
        assert!(validator.check_transition(&before, &after).is_err());
    }

    #[test]
    fn preserved_records_are_never_hard_deleted() {
        let validator = validator();
        let mut record = EntityRecord::new(EntityKind::Customer, "Acme");
        record.lifecycle.preserved = Some(PreservedState {
            verb: PreserveAction::Terminate,
            mark: mark().with_reason("account closed for good"),
        });
        assert!(validator.check_hard_delete(&record, false).is_err());
    }

    #[test]
    fn purge_parents_must_be_soft_deleted_first() {
        let validator = validator();
        let record = EntityRecord::new(EntityKind::Warehouse, "North Dock");
        assert!(validator.check_hard_delete(&record, true).is_err());
        assert!(validator.check_hard_delete(&record, false).is_ok());
    }
}
