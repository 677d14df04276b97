use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a single governed record. Wraps a UUID so ids from
/// different kinds can never be confused with raw integers upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// The governed entity kinds. Every kind has a lifecycle policy row in the
/// registry; adding a kind means adding a policy row, not new control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Warehouse,
    Zone,
    Customer,
    Contact,
    Contract,
    User,
    Role,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Warehouse,
        EntityKind::Zone,
        EntityKind::Customer,
        EntityKind::Contact,
        EntityKind::Contract,
        EntityKind::User,
        EntityKind::Role,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Warehouse => "warehouse",
            EntityKind::Zone => "zone",
            EntityKind::Customer => "customer",
            EntityKind::Contact => "contact",
            EntityKind::Contract => "contract",
            EntityKind::User => "user",
            EntityKind::Role => "role",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified reference to a governed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Lifecycle verbs that park a record in a readable terminal (or, for
/// `Deactivate`, reversible) state instead of removing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreserveAction {
    Retire,
    Terminate,
    Disable,
    Archive,
    Deactivate,
}

impl PreserveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreserveAction::Retire => "retire",
            PreserveAction::Terminate => "terminate",
            PreserveAction::Disable => "disable",
            PreserveAction::Archive => "archive",
            PreserveAction::Deactivate => "deactivate",
        }
    }

    /// Past participle, used when telling a caller the record is already
    /// parked ("already retired").
    pub fn past_tense(&self) -> &'static str {
        match self {
            PreserveAction::Retire => "retired",
            PreserveAction::Terminate => "terminated",
            PreserveAction::Disable => "disabled",
            PreserveAction::Archive => "archived",
            PreserveAction::Deactivate => "deactivated",
        }
    }

    /// Terminal verbs are permanent; `Deactivate` is the one reversible verb.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PreserveAction::Deactivate)
    }
}

impl fmt::Display for PreserveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commercial status of a contract record. Archiving is only lawful once
/// the contract has run its course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Expired,
    Terminated,
}

impl ContractStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, ContractStatus::Expired | ContractStatus::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "active",
            ContractStatus::Expired => "expired",
            ContractStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single audit-log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SoftDelete,
    Retire,
    Terminate,
    Disable,
    Archive,
    Deactivate,
    Reactivate,
    Purge,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::Retire => "retire",
            AuditAction::Terminate => "terminate",
            AuditAction::Disable => "disable",
            AuditAction::Archive => "archive",
            AuditAction::Deactivate => "deactivate",
            AuditAction::Reactivate => "reactivate",
            AuditAction::Purge => "purge",
        }
    }
}

impl From<PreserveAction> for AuditAction {
    fn from(verb: PreserveAction) -> Self {
        match verb {
            PreserveAction::Retire => AuditAction::Retire,
            PreserveAction::Terminate => AuditAction::Terminate,
            PreserveAction::Disable => AuditAction::Disable,
            PreserveAction::Archive => AuditAction::Archive,
            PreserveAction::Deactivate => AuditAction::Deactivate,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
