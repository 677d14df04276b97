use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ContractStatus, EntityId, EntityKind, EntityRef, PreserveAction};

/// Who did what, when, and why. Attached to every lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTriple {
    pub actor: String,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl AuditTriple {
    pub fn new(actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            at,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Terminal preserve marker. Once written it never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservedState {
    pub verb: PreserveAction,
    pub mark: AuditTriple,
}

/// Lifecycle position of a governed record.
///
/// State is derived from which marks are present, so the flag/timestamp
/// pairing invariants hold by construction: a record is deleted exactly when
/// `deleted` carries a mark and inactive exactly when `deactivated` does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub deleted: Option<AuditTriple>,
    pub preserved: Option<PreservedState>,
    pub deactivated: Option<AuditTriple>,
}

impl Lifecycle {
    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    pub fn is_preserved(&self) -> bool {
        self.preserved.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.deactivated.is_none()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted.as_ref().map(|mark| mark.at)
    }

    pub fn preserved_verb(&self) -> Option<PreserveAction> {
        self.preserved.as_ref().map(|state| state.verb)
    }
}

/// One governed entity instance, as stored.
///
/// `version` backs the optimistic concurrency check: every successful
/// mutation advances it by exactly one, and staged writes carry the version
/// they were planned against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: EntityId,
    pub name: String,
    pub parent: Option<EntityRef>,
    pub test_data: bool,
    pub system: bool,
    pub ever_authenticated: bool,
    pub contract_status: Option<ContractStatus>,
    pub lifecycle: Lifecycle,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: EntityId::new(),
            name: name.into(),
            parent: None,
            test_data: false,
            system: false,
            ever_authenticated: false,
            contract_status: if kind == EntityKind::Contract {
                Some(ContractStatus::Active)
            } else {
                None
            },
            lifecycle: Lifecycle::default(),
            version: 1,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn with_parent(mut self, parent: EntityRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_contract_status(mut self, status: ContractStatus) -> Self {
        self.contract_status = Some(status);
        self
    }

    pub fn as_test_data(mut self) -> Self {
        self.test_data = true;
        self
    }

    pub fn as_system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn with_authentication_history(mut self) -> Self {
        self.ever_authenticated = true;
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_live_and_active() {
        let record = EntityRecord::new(EntityKind::Warehouse, "North Dock");
        assert!(!record.lifecycle.is_deleted());
        assert!(!record.lifecycle.is_preserved());
        assert!(record.lifecycle.is_active());
        assert_eq!(record.version, 1);
    }

    #[test]
    fn new_contracts_start_active() {
        let contract = EntityRecord::new(EntityKind::Contract, "Storage agreement");
        assert_eq!(contract.contract_status, Some(ContractStatus::Active));
        let user = EntityRecord::new(EntityKind::User, "pat");
        assert_eq!(user.contract_status, None);
    }

    #[test]
    fn lifecycle_state_follows_marks() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.deleted = Some(AuditTriple::new("ops", Utc::now()));
        assert!(lifecycle.is_deleted());
        assert!(lifecycle.deleted_at().is_some());

        let mut lifecycle = Lifecycle::default();
        lifecycle.deactivated = Some(AuditTriple::new("ops", Utc::now()));
        assert!(!lifecycle.is_active());
        assert!(!lifecycle.is_deleted());
    }
}
