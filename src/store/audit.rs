use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AuditAction, EntityId, EntityKind, EntityRef};

/// One row of the append-only audit table shared by every governed kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub kind: EntityKind,
    pub id: EntityId,
    pub action: AuditAction,
    pub actor: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        target: EntityRef,
        action: AuditAction,
        actor: impl Into<String>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: target.kind,
            id: target.id,
            action,
            actor: actor.into(),
            reason,
            occurred_at,
        }
    }

    pub fn target(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }
}

/// In-memory audit log. Append-only; purge removes the governed row but its
/// audit trail stays.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn append(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn for_target(&self, target: EntityRef) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.target() == target)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_filter_by_target() {
        let a = EntityRef::new(EntityKind::Customer, EntityId::new());
        let b = EntityRef::new(EntityKind::Customer, EntityId::new());
        let mut log = AuditLog::default();
        log.append(AuditEntry::new(a, AuditAction::SoftDelete, "ops", None, Utc::now()));
        log.append(AuditEntry::new(b, AuditAction::Terminate, "ops", Some("closed account".into()), Utc::now()));
        log.append(AuditEntry::new(a, AuditAction::Purge, "system", None, Utc::now()));

        let trail = log.for_target(a);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::SoftDelete);
        assert_eq!(trail[1].action, AuditAction::Purge);
    }
}
