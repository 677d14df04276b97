use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::{EntityId, EntityKind, EntityRef};

/// A storage allocation held by a customer in a warehouse, optionally pinned
/// to one zone. Evidence rows are never governed themselves: the classifier
/// counts them and only the purge cascade removes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Uuid,
    pub warehouse_id: EntityId,
    pub zone_id: Option<EntityId>,
    pub customer_id: EntityId,
    pub created_at: DateTime<Utc>,
}

impl Allocation {
    pub fn new(warehouse_id: EntityId, zone_id: Option<EntityId>, customer_id: EntityId) -> Self {
        Self {
            id: Uuid::new_v4(),
            warehouse_id,
            zone_id,
            customer_id,
            created_at: Utc::now(),
        }
    }
}

/// A logged exchange with a customer contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Communication {
    pub id: Uuid,
    pub contact_id: EntityId,
    pub customer_id: EntityId,
    pub channel: String,
    pub logged_at: DateTime<Utc>,
}

impl Communication {
    pub fn new(contact_id: EntityId, customer_id: EntityId, channel: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            customer_id,
            channel: channel.into(),
            logged_at: Utc::now(),
        }
    }
}

/// The evidence tables, keyed by row id.
#[derive(Debug, Clone, Default)]
pub struct EvidenceTables {
    allocations: BTreeMap<Uuid, Allocation>,
    communications: BTreeMap<Uuid, Communication>,
}

impl EvidenceTables {
    pub fn insert_allocation(&mut self, allocation: Allocation) -> Uuid {
        let id = allocation.id;
        self.allocations.insert(id, allocation);
        id
    }

    pub fn insert_communication(&mut self, communication: Communication) -> Uuid {
        let id = communication.id;
        self.communications.insert(id, communication);
        id
    }

    pub fn count_allocations_for(&self, owner: EntityRef) -> u64 {
        self.allocations
            .values()
            .filter(|a| Self::allocation_references(a, owner))
            .count() as u64
    }

    pub fn count_communications_for(&self, owner: EntityRef) -> u64 {
        self.communications
            .values()
            .filter(|c| Self::communication_references(c, owner))
            .count() as u64
    }

    /// Ids of the evidence rows referencing any of `owners`, each row once.
    /// This is exactly the set a purge cascade over those owners removes.
    pub fn ids_for_any(&self, owners: &[EntityRef]) -> Vec<Uuid> {
        let allocations = self
            .allocations
            .values()
            .filter(|a| owners.iter().any(|o| Self::allocation_references(a, *o)))
            .map(|a| a.id);
        let communications = self
            .communications
            .values()
            .filter(|c| owners.iter().any(|o| Self::communication_references(c, *o)))
            .map(|c| c.id);
        allocations.chain(communications).collect()
    }

    /// Remove every allocation referencing `owner`; returns how many went.
    pub fn purge_allocations_for(&mut self, owner: EntityRef) -> usize {
        let before = self.allocations.len();
        self.allocations
            .retain(|_, a| !Self::allocation_references(a, owner));
        before - self.allocations.len()
    }

    /// Remove every communication referencing `owner`; returns how many went.
    pub fn purge_communications_for(&mut self, owner: EntityRef) -> usize {
        let before = self.communications.len();
        self.communications
            .retain(|_, c| !Self::communication_references(c, owner));
        before - self.communications.len()
    }

    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    pub fn communications(&self) -> impl Iterator<Item = &Communication> {
        self.communications.values()
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    pub fn communication_count(&self) -> usize {
        self.communications.len()
    }

    fn allocation_references(allocation: &Allocation, owner: EntityRef) -> bool {
        match owner.kind {
            EntityKind::Warehouse => allocation.warehouse_id == owner.id,
            EntityKind::Zone => allocation.zone_id == Some(owner.id),
            EntityKind::Customer => allocation.customer_id == owner.id,
            _ => false,
        }
    }

    fn communication_references(communication: &Communication, owner: EntityRef) -> bool {
        match owner.kind {
            EntityKind::Contact => communication.contact_id == owner.id,
            EntityKind::Customer => communication.customer_id == owner.id,
            _ => false,
        }
    }
}
