use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::core::{EngineError, EntityId, EntityKind, EntityRef, Result};
use crate::registry::EntityRegistry;

use super::audit::{AuditEntry, AuditLog};
use super::change::{Change, CommitStats, StagedWrite};
use super::constraints::ConstraintValidator;
use super::evidence::{Allocation, Communication, EvidenceTables};
use super::journal::{AuditJournal, StoreSnapshot};
use super::record::{AuditTriple, EntityRecord};
use super::table::EntityTable;

/// The authoritative store: governed records, evidence rows and the shared
/// audit log.
///
/// All writes arrive as [`StagedWrite`] change-sets. Commit validates the
/// whole set against the constraint rules under one write lock and then
/// applies it, so a committed set is atomic and a failed one leaves no trace.
/// Reads hand out cloned snapshots carrying the record version for the
/// optimistic checks upstream.
pub struct GovernedStore {
    registry: Arc<EntityRegistry>,
    validator: ConstraintValidator,
    inner: RwLock<StoreInner>,
    journal: Option<Mutex<AuditJournal>>,
}

struct StoreInner {
    // indexed by EntityKind discriminant, one table per kind
    tables: Vec<EntityTable>,
    evidence: EvidenceTables,
    audit: AuditLog,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            tables: EntityKind::ALL.iter().map(|k| EntityTable::new(*k)).collect(),
            evidence: EvidenceTables::default(),
            audit: AuditLog::default(),
        }
    }

    fn table(&self, kind: EntityKind) -> &EntityTable {
        &self.tables[kind as usize]
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut EntityTable {
        &mut self.tables[kind as usize]
    }

    fn record(&self, target: EntityRef) -> Option<&EntityRecord> {
        self.table(target.kind).get(target.id)
    }
}

enum PlannedOp {
    Update { target: EntityRef, after: EntityRecord },
    Remove { target: EntityRef },
    PurgeAllocations { owner: EntityRef },
    PurgeCommunications { owner: EntityRef },
    Audit { entry: AuditEntry },
}

impl GovernedStore {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            validator: ConstraintValidator::new(registry.clone()),
            registry,
            inner: RwLock::new(StoreInner::new()),
            journal: None,
        }
    }

    /// Store that mirrors every committed audit entry to a disk journal.
    pub fn with_journal(registry: Arc<EntityRegistry>, journal: AuditJournal) -> Self {
        let mut store = Self::new(registry);
        store.journal = Some(Mutex::new(journal));
        store
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    /// Insert a new governed record. The record must already satisfy every
    /// stored invariant; parent references are checked against the registry
    /// and must point at an existing row.
    pub async fn insert(&self, record: EntityRecord) -> Result<EntityRef> {
        self.validator.check_record(&record)?;
        let policy = self.registry.policy(record.kind);
        let target = record.entity_ref();

        let mut inner = self.inner.write().await;
        match (record.parent, policy.parent_kind) {
            (None, None) => {}
            (None, Some(expected)) => {
                return Err(EngineError::Storage(format!(
                    "{} rows require a {} parent",
                    record.kind, expected
                )));
            }
            (Some(parent), None) => {
                return Err(EngineError::Storage(format!(
                    "{} rows do not take a parent, got {}",
                    record.kind, parent
                )));
            }
            (Some(parent), Some(expected)) => {
                if parent.kind != expected {
                    return Err(EngineError::Storage(format!(
                        "{} rows take a {} parent, got {}",
                        record.kind, expected, parent.kind
                    )));
                }
                if inner.record(parent).is_none() {
                    return Err(EngineError::Storage(format!("parent {} not found", parent)));
                }
            }
        }
        inner.table_mut(record.kind).insert(record)?;
        Ok(target)
    }

    /// Record an allocation. Referenced governed rows must exist, and a zone
    /// reference must belong to the allocation's warehouse.
    pub async fn add_allocation(&self, allocation: Allocation) -> Result<Uuid> {
        let mut inner = self.inner.write().await;
        let warehouse = EntityRef::new(EntityKind::Warehouse, allocation.warehouse_id);
        if inner.record(warehouse).is_none() {
            return Err(EngineError::Storage(format!(
                "allocation references missing {}",
                warehouse
            )));
        }
        if let Some(zone_id) = allocation.zone_id {
            let zone = EntityRef::new(EntityKind::Zone, zone_id);
            match inner.record(zone) {
                None => {
                    return Err(EngineError::Storage(format!(
                        "allocation references missing {}",
                        zone
                    )));
                }
                Some(row) if row.parent != Some(warehouse) => {
                    return Err(EngineError::Storage(format!(
                        "{} does not belong to {}",
                        zone, warehouse
                    )));
                }
                Some(_) => {}
            }
        }
        let customer = EntityRef::new(EntityKind::Customer, allocation.customer_id);
        if inner.record(customer).is_none() {
            return Err(EngineError::Storage(format!(
                "allocation references missing {}",
                customer
            )));
        }
        Ok(inner.evidence.insert_allocation(allocation))
    }

    /// Record a communication. Contact and customer rows must exist.
    pub async fn add_communication(&self, communication: Communication) -> Result<Uuid> {
        let mut inner = self.inner.write().await;
        let contact = EntityRef::new(EntityKind::Contact, communication.contact_id);
        if inner.record(contact).is_none() {
            return Err(EngineError::Storage(format!(
                "communication references missing {}",
                contact
            )));
        }
        let customer = EntityRef::new(EntityKind::Customer, communication.customer_id);
        if inner.record(customer).is_none() {
            return Err(EngineError::Storage(format!(
                "communication references missing {}",
                customer
            )));
        }
        Ok(inner.evidence.insert_communication(communication))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get(&self, kind: EntityKind, id: EntityId) -> Result<EntityRecord> {
        self.inner
            .read()
            .await
            .record(EntityRef::new(kind, id))
            .cloned()
            .ok_or_else(|| EngineError::not_found(kind, id))
    }

    pub async fn try_get(&self, kind: EntityKind, id: EntityId) -> Option<EntityRecord> {
        self.inner
            .read()
            .await
            .record(EntityRef::new(kind, id))
            .cloned()
    }

    /// Every row of `kind`, deleted or not, in id order.
    pub async fn list(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.inner.read().await.table(kind).iter().cloned().collect()
    }

    /// Rows of `kind` without a soft-delete mark. This is the filter every
    /// read-path collaborator is obliged to apply.
    pub async fn list_live(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.inner
            .read()
            .await
            .table(kind)
            .iter()
            .filter(|r| !r.lifecycle.is_deleted())
            .cloned()
            .collect()
    }

    /// Every row naming `parent` as its parent, regardless of lifecycle
    /// state. The purge cascade walks this.
    pub async fn children_of(&self, parent: EntityRef) -> Vec<EntityRecord> {
        let inner = self.inner.read().await;
        let mut children = Vec::new();
        for table in &inner.tables {
            for record in table.iter() {
                if record.parent == Some(parent) {
                    children.push(record.clone());
                }
            }
        }
        children
    }

    /// The read-path contract from the cascade policy: children are listed
    /// only while their parent carries no soft-delete mark. A deleted parent
    /// hides its children without any write to them.
    pub async fn live_children_of(&self, parent: EntityRef) -> Vec<EntityRecord> {
        let inner = self.inner.read().await;
        match inner.record(parent) {
            None => Vec::new(),
            Some(row) if row.lifecycle.is_deleted() => Vec::new(),
            Some(_) => {
                let mut children = Vec::new();
                for table in &inner.tables {
                    for record in table.iter() {
                        if record.parent == Some(parent) && !record.lifecycle.is_deleted() {
                            children.push(record.clone());
                        }
                    }
                }
                children
            }
        }
    }

    /// Children of `parent` with the given kind that carry no soft-delete
    /// mark. Footprint counting reads through the same deleted filter the
    /// rest of the read path uses.
    pub async fn count_live_children_of_kind(&self, parent: EntityRef, kind: EntityKind) -> u64 {
        self.inner
            .read()
            .await
            .table(kind)
            .iter()
            .filter(|r| r.parent == Some(parent) && !r.lifecycle.is_deleted())
            .count() as u64
    }

    pub async fn count_allocations_for(&self, owner: EntityRef) -> u64 {
        self.inner.read().await.evidence.count_allocations_for(owner)
    }

    pub async fn count_communications_for(&self, owner: EntityRef) -> u64 {
        self.inner
            .read()
            .await
            .evidence
            .count_communications_for(owner)
    }

    /// Ids of the evidence rows referencing any of `owners`, each once.
    pub async fn evidence_ids_for_any(&self, owners: &[EntityRef]) -> Vec<Uuid> {
        self.inner.read().await.evidence.ids_for_any(owners)
    }

    /// Soft-deleted rows across every kind, in kind-then-id order.
    pub async fn soft_deleted(&self) -> Vec<EntityRecord> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for table in &inner.tables {
            for record in table.iter() {
                if record.lifecycle.is_deleted() {
                    out.push(record.clone());
                }
            }
        }
        out
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.read().await.audit.entries().to_vec()
    }

    pub async fn audit_for(&self, target: EntityRef) -> Vec<AuditEntry> {
        self.inner.read().await.audit.for_target(target)
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Validate and apply a staged change-set atomically.
    ///
    /// The whole set is planned against the current state first (version
    /// checks, constraint rules, hard-delete guards); only a fully valid set
    /// is applied. With a journal configured, audit entries are written to
    /// disk after planning and before the in-memory apply.
    pub async fn commit(&self, staged: StagedWrite) -> Result<CommitStats> {
        if staged.is_empty() {
            return Ok(CommitStats::default());
        }
        let mut inner = self.inner.write().await;
        let plan = self.plan(&inner, &staged)?;
        if let Some(journal) = &self.journal {
            let entries: Vec<AuditEntry> = plan
                .iter()
                .filter_map(|op| match op {
                    PlannedOp::Audit { entry } => Some(entry.clone()),
                    _ => None,
                })
                .collect();
            if !entries.is_empty() {
                journal.lock().await.append_batch(&entries)?;
            }
        }
        Ok(Self::apply(&mut inner, plan))
    }

    fn plan(&self, inner: &StoreInner, staged: &StagedWrite) -> Result<Vec<PlannedOp>> {
        // overlay of states produced by earlier changes in this set, so each
        // change is validated against what the set has done so far
        let mut pending: HashMap<EntityRef, Option<EntityRecord>> = HashMap::new();
        let mut plan = Vec::with_capacity(staged.len());

        for change in staged.changes() {
            match change {
                Change::MarkDeleted {
                    target,
                    expect_version,
                    mark,
                } => {
                    let before = current_state(inner, &pending, *target)
                        .ok_or_else(|| EngineError::not_found(target.kind, target.id))?;
                    check_version(&before, *expect_version)?;
                    let mut after = before.clone();
                    after.lifecycle.deleted = Some(mark.clone());
                    after.version += 1;
                    self.validator.check_transition(&before, &after)?;
                    pending.insert(*target, Some(after.clone()));
                    plan.push(PlannedOp::Update { target: *target, after });
                }
                Change::MarkPreserved {
                    target,
                    expect_version,
                    state,
                } => {
                    let before = current_state(inner, &pending, *target)
                        .ok_or_else(|| EngineError::not_found(target.kind, target.id))?;
                    check_version(&before, *expect_version)?;
                    let mut after = before.clone();
                    after.lifecycle.preserved = Some(state.clone());
                    after.version += 1;
                    self.validator.check_transition(&before, &after)?;
                    pending.insert(*target, Some(after.clone()));
                    plan.push(PlannedOp::Update { target: *target, after });
                }
                Change::SetActive {
                    target,
                    expect_version,
                    active,
                    actor,
                    at,
                } => {
                    let before = current_state(inner, &pending, *target)
                        .ok_or_else(|| EngineError::not_found(target.kind, target.id))?;
                    check_version(&before, *expect_version)?;
                    if before.lifecycle.is_active() == *active {
                        return Err(EngineError::TransactionFailure(format!(
                            "{} is already {}",
                            target,
                            if *active { "active" } else { "inactive" }
                        )));
                    }
                    let mut after = before.clone();
                    after.lifecycle.deactivated = if *active {
                        None
                    } else {
                        Some(AuditTriple::new(actor.clone(), *at))
                    };
                    after.version += 1;
                    self.validator.check_transition(&before, &after)?;
                    pending.insert(*target, Some(after.clone()));
                    plan.push(PlannedOp::Update { target: *target, after });
                }
                Change::HardDeleteEntity {
                    target,
                    require_deleted,
                } => {
                    let before = current_state(inner, &pending, *target)
                        .ok_or_else(|| EngineError::not_found(target.kind, target.id))?;
                    self.validator.check_hard_delete(&before, *require_deleted)?;
                    // every row still naming the target as its parent must be
                    // removed earlier in this same set, or the removal would
                    // leave a dangling parent reference
                    for table in &inner.tables {
                        for child in table.iter() {
                            let child_ref = child.entity_ref();
                            if child.parent == Some(*target)
                                && !matches!(pending.get(&child_ref), Some(None))
                            {
                                return Err(EngineError::TransactionFailure(format!(
                                    "{} still references {}; refusing hard delete",
                                    child_ref, target
                                )));
                            }
                        }
                    }
                    pending.insert(*target, None);
                    plan.push(PlannedOp::Remove { target: *target });
                }
                Change::PurgeAllocations { owner } => {
                    plan.push(PlannedOp::PurgeAllocations { owner: *owner });
                }
                Change::PurgeCommunications { owner } => {
                    plan.push(PlannedOp::PurgeCommunications { owner: *owner });
                }
                Change::AppendAudit { entry } => {
                    plan.push(PlannedOp::Audit { entry: entry.clone() });
                }
            }
        }
        Ok(plan)
    }

    fn apply(inner: &mut StoreInner, plan: Vec<PlannedOp>) -> CommitStats {
        let mut stats = CommitStats::default();
        for op in plan {
            match op {
                PlannedOp::Update { target, after } => {
                    if let Some(slot) = inner.table_mut(target.kind).get_mut(target.id) {
                        *slot = after;
                        stats.records_updated += 1;
                    }
                }
                PlannedOp::Remove { target } => {
                    if inner.table_mut(target.kind).remove(target.id).is_some() {
                        stats.entities_removed += 1;
                    }
                }
                PlannedOp::PurgeAllocations { owner } => {
                    stats.evidence_rows_removed += inner.evidence.purge_allocations_for(owner);
                }
                PlannedOp::PurgeCommunications { owner } => {
                    stats.evidence_rows_removed += inner.evidence.purge_communications_for(owner);
                }
                PlannedOp::Audit { entry } => {
                    inner.audit.append(entry);
                    stats.audit_entries_appended += 1;
                }
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Integrity and persistence
    // ------------------------------------------------------------------

    /// Sweep every stored record through the constraint rules, including
    /// parent references.
    pub async fn check_invariants(&self) -> Result<()> {
        let inner = self.inner.read().await;
        for table in &inner.tables {
            for record in table.iter() {
                self.validator.check_record(record)?;
                if let Some(parent) = record.parent
                    && inner.record(parent).is_none()
                {
                    return Err(EngineError::Storage(format!(
                        "{} references missing parent {}",
                        record.entity_ref(),
                        parent
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serializable image of the whole store.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        let mut records = Vec::new();
        for table in &inner.tables {
            records.extend(table.iter().cloned());
        }
        StoreSnapshot::new(
            records,
            inner.evidence.allocations().cloned().collect(),
            inner.evidence.communications().cloned().collect(),
            inner.audit.entries().to_vec(),
        )
    }

    /// Replace the store contents with a snapshot, after re-validating every
    /// record and parent reference it carries.
    pub async fn restore(&self, snapshot: StoreSnapshot) -> Result<()> {
        snapshot.check_format()?;
        let mut fresh = StoreInner::new();
        for record in snapshot.records {
            self.validator.check_record(&record)?;
            fresh.table_mut(record.kind).insert(record)?;
        }
        for record in fresh.tables.iter().flat_map(|t| t.iter()) {
            if let Some(parent) = record.parent
                && fresh.record(parent).is_none()
            {
                return Err(EngineError::Storage(format!(
                    "snapshot row {} references missing parent {}",
                    record.entity_ref(),
                    parent
                )));
            }
        }
        for allocation in snapshot.allocations {
            fresh.evidence.insert_allocation(allocation);
        }
        for communication in snapshot.communications {
            fresh.evidence.insert_communication(communication);
        }
        for entry in snapshot.audit {
            fresh.audit.append(entry);
        }
        *self.inner.write().await = fresh;
        Ok(())
    }
}

fn current_state(
    inner: &StoreInner,
    pending: &HashMap<EntityRef, Option<EntityRecord>>,
    target: EntityRef,
) -> Option<EntityRecord> {
    match pending.get(&target) {
        Some(state) => state.clone(),
        None => inner.record(target).cloned(),
    }
}

fn check_version(record: &EntityRecord, expect: u64) -> Result<()> {
    if record.version != expect {
        return Err(EngineError::Conflict(format!(
            "{} changed concurrently (version {}, staged against {})",
            record.entity_ref(),
            record.version,
            expect
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> GovernedStore {
        GovernedStore::new(Arc::new(EntityRegistry::standard()))
    }

    #[tokio::test]
    async fn stale_version_conflicts_and_leaves_no_trace() {
        let store = store();
        let warehouse = EntityRecord::new(EntityKind::Warehouse, "North Dock");
        let target = store.insert(warehouse).await.unwrap();

        let staged = StagedWrite::new().change(Change::MarkDeleted {
            target,
            expect_version: 7,
            mark: AuditTriple::new("ops", Utc::now()),
        });
        let err = store.commit(staged).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let record = store.get(target.kind, target.id).await.unwrap();
        assert!(!record.lifecycle.is_deleted());
        assert_eq!(record.version, 1);
        assert!(store.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn a_failing_change_aborts_the_whole_set() {
        let store = store();
        let a = store
            .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
            .await
            .unwrap();
        let b = store
            .insert(EntityRecord::new(EntityKind::Warehouse, "South Dock"))
            .await
            .unwrap();

        // second change carries a stale version, so the first must not apply
        let staged = StagedWrite::new()
            .change(Change::MarkDeleted {
                target: a,
                expect_version: 1,
                mark: AuditTriple::new("ops", Utc::now()),
            })
            .change(Change::MarkDeleted {
                target: b,
                expect_version: 9,
                mark: AuditTriple::new("ops", Utc::now()),
            });
        assert!(store.commit(staged).await.is_err());

        let a_row = store.get(a.kind, a.id).await.unwrap();
        let b_row = store.get(b.kind, b.id).await.unwrap();
        assert!(!a_row.lifecycle.is_deleted());
        assert!(!b_row.lifecycle.is_deleted());
    }

    #[tokio::test]
    async fn later_changes_see_earlier_ones_in_the_same_set() {
        let store = store();
        let warehouse = store
            .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
            .await
            .unwrap();

        // delete then hard-delete in one set: the hard delete must observe
        // the staged soft-delete mark
        let staged = StagedWrite::new()
            .change(Change::MarkDeleted {
                target: warehouse,
                expect_version: 1,
                mark: AuditTriple::new("ops", Utc::now()),
            })
            .change(Change::HardDeleteEntity {
                target: warehouse,
                require_deleted: true,
            });
        let stats = store.commit(staged).await.unwrap();
        assert_eq!(stats.entities_removed, 1);
        assert!(store.try_get(warehouse.kind, warehouse.id).await.is_none());
    }

    #[tokio::test]
    async fn hard_delete_refuses_rows_with_live_children() {
        let store = store();
        let mut warehouse = EntityRecord::new(EntityKind::Warehouse, "North Dock");
        warehouse.lifecycle.deleted = Some(AuditTriple::new("ops", Utc::now()));
        let warehouse = store.insert(warehouse).await.unwrap();
        let zone = store
            .insert(EntityRecord::new(EntityKind::Zone, "Aisle 3").with_parent(warehouse))
            .await
            .unwrap();

        // removing the parent alone would leave the zone's reference dangling
        let staged = StagedWrite::new().change(Change::HardDeleteEntity {
            target: warehouse,
            require_deleted: true,
        });
        let err = store.commit(staged).await.unwrap_err();
        assert!(matches!(err, EngineError::TransactionFailure(_)));
        assert!(store.try_get(warehouse.kind, warehouse.id).await.is_some());
        assert!(store.try_get(zone.kind, zone.id).await.is_some());
        store.check_invariants().await.unwrap();

        // removing the child in the same set makes the removal legal
        let staged = StagedWrite::new()
            .change(Change::HardDeleteEntity {
                target: zone,
                require_deleted: false,
            })
            .change(Change::HardDeleteEntity {
                target: warehouse,
                require_deleted: true,
            });
        let stats = store.commit(staged).await.unwrap();
        assert_eq!(stats.entities_removed, 2);
        store.check_invariants().await.unwrap();
    }

    #[tokio::test]
    async fn children_require_a_live_parent_row() {
        let store = store();
        let orphan = EntityRecord::new(EntityKind::Zone, "Aisle 3");
        assert!(store.insert(orphan).await.is_err());

        let fake_parent = EntityRef::new(EntityKind::Warehouse, EntityId::new());
        let dangling = EntityRecord::new(EntityKind::Zone, "Aisle 3").with_parent(fake_parent);
        assert!(store.insert(dangling).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_round_trip_restores_everything() {
        let store = store();
        let warehouse = store
            .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
            .await
            .unwrap();
        let customer = store
            .insert(EntityRecord::new(EntityKind::Customer, "Acme"))
            .await
            .unwrap();
        store
            .add_allocation(Allocation::new(warehouse.id, None, customer.id))
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        let other = GovernedStore::new(Arc::new(EntityRegistry::standard()));
        other.restore(snapshot).await.unwrap();

        assert!(other.try_get(warehouse.kind, warehouse.id).await.is_some());
        assert_eq!(other.count_allocations_for(warehouse).await, 1);
    }
}
