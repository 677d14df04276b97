//! The retention reaper: physical removal of soft-deleted rows whose
//! retention window has elapsed.
//!
//! A cycle walks every soft-deleted row, re-checks eligibility and
//! re-classifies at run time, then purges each eligible instance inside one
//! atomic change-set: dependent children first, then the parent row, then
//! the audit entry. Cycles are serialized; a second cycle started while one
//! is running is refused with a conflict. Failures are scoped to a single
//! instance and reported, never retried within the same cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::core::{AuditAction, EngineError, EntityId, EntityKind, EntityRef, Result};
use crate::store::{AuditEntry, Change, EntityRecord, GovernedStore, StagedWrite};

/// Actor recorded on every purge audit entry.
pub const PURGE_ACTOR: &str = "system";

const DEFAULT_INSTANCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct PurgeCycleOptions {
    pub now: DateTime<Utc>,
    pub retention_days: i64,
    pub dry_run: bool,
    pub instance_timeout: Duration,
}

impl PurgeCycleOptions {
    pub fn new(now: DateTime<Utc>, retention_days: i64) -> Self {
        Self {
            now,
            retention_days,
            dry_run: false,
            instance_timeout: DEFAULT_INSTANCE_TIMEOUT,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_instance_timeout(mut self, timeout: Duration) -> Self {
        self.instance_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgedInstance {
    pub kind: EntityKind,
    pub id: EntityId,
    pub name: String,
    pub deleted_at: DateTime<Utc>,
    pub dependents_removed: usize,
    pub evidence_rows_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInstance {
    pub kind: EntityKind,
    pub id: EntityId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeFailure {
    pub kind: EntityKind,
    pub id: EntityId,
    pub error: String,
}

/// Outcome of one cycle. `purged` lists the instances removed, or in a dry
/// run the instances that would have been removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub retention_days: i64,
    pub dry_run: bool,
    pub examined: usize,
    pub purged: Vec<PurgedInstance>,
    pub skipped: Vec<SkippedInstance>,
    pub failures: Vec<PurgeFailure>,
    pub cascade_deleted_rows: usize,
}

impl PurgeReport {
    pub fn purged_refs(&self) -> Vec<EntityRef> {
        self.purged
            .iter()
            .map(|p| EntityRef::new(p.kind, p.id))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct InstanceOutcome {
    purged: PurgedInstance,
    cascade_refs: Vec<EntityRef>,
}

pub struct RetentionReaper {
    store: Arc<GovernedStore>,
    classifier: Classifier,
    cycle_lock: Mutex<()>,
}

impl RetentionReaper {
    pub fn new(store: Arc<GovernedStore>, classifier: Classifier) -> Self {
        Self {
            store,
            classifier,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one purge cycle. Refuses to overlap a cycle already in flight.
    pub async fn run_purge_cycle(&self, opts: PurgeCycleOptions) -> Result<PurgeReport> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| EngineError::Conflict("a purge cycle is already running".to_string()))?;
        self.run_cycle(opts)
            .instrument(info_span!(
                "purge_cycle",
                retention_days = opts.retention_days,
                dry_run = opts.dry_run
            ))
            .await
    }

    async fn run_cycle(&self, opts: PurgeCycleOptions) -> Result<PurgeReport> {
        let started_at = Utc::now();
        let cutoff = opts.now - chrono::Duration::days(opts.retention_days);
        tracing::info!(cutoff = %cutoff, "starting purge cycle");

        let candidates: Vec<EntityRecord> = self
            .store
            .soft_deleted()
            .await
            .into_iter()
            .filter(|r| !r.lifecycle.is_preserved())
            .filter(|r| r.lifecycle.deleted_at().map(|at| at < cutoff).unwrap_or(false))
            .collect();

        // Re-classify all candidates concurrently against the pre-cycle
        // state. Both modes consume the same verdicts, so a dry run predicts
        // the live purge set even when a cascade would change a later
        // candidate's footprint mid-cycle.
        let verdicts = join_all(
            candidates
                .iter()
                .map(|c| self.classifier.classify(c.kind, c.id)),
        )
        .await;

        let mut report = PurgeReport {
            started_at,
            finished_at: started_at,
            retention_days: opts.retention_days,
            dry_run: opts.dry_run,
            examined: candidates.len(),
            purged: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            cascade_deleted_rows: 0,
        };
        // dependents removed (or, dry run, simulated as removed) by an
        // earlier candidate's cascade; both modes must skip these the same
        // way so a dry run predicts the live purge set exactly
        let mut removed_by_cascade: HashSet<EntityRef> = HashSet::new();
        // evidence rows a dry run has already attributed to an earlier
        // instance; a live cascade removes a shared row once, so the dry
        // count must too
        let mut counted_evidence: HashSet<Uuid> = HashSet::new();

        for (candidate, verdict) in candidates.into_iter().zip(verdicts) {
            let target = candidate.entity_ref();
            if removed_by_cascade.contains(&target) {
                report.skipped.push(SkippedInstance {
                    kind: target.kind,
                    id: target.id,
                    reason: "removed by an earlier cascade this cycle".to_string(),
                });
                continue;
            }
            let Some(current) = self.store.try_get(target.kind, target.id).await else {
                report.skipped.push(SkippedInstance {
                    kind: target.kind,
                    id: target.id,
                    reason: "no longer present".to_string(),
                });
                continue;
            };
            if current.lifecycle.is_preserved() {
                report.skipped.push(SkippedInstance {
                    kind: target.kind,
                    id: target.id,
                    reason: "preserved since deletion; preserved always wins".to_string(),
                });
                continue;
            }
            let verdict = match verdict {
                Ok(verdict) => verdict,
                Err(err) => {
                    report.failures.push(PurgeFailure {
                        kind: target.kind,
                        id: target.id,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if verdict.must_preserve {
                report.skipped.push(SkippedInstance {
                    kind: target.kind,
                    id: target.id,
                    reason: format!("classification changed: {}", verdict.reason),
                });
                continue;
            }

            let attempt = tokio::time::timeout(
                opts.instance_timeout,
                self.purge_instance(&current, &opts, &mut counted_evidence),
            )
            .await;
            match attempt {
                Err(_) => {
                    tracing::warn!(target = %target, "purge timed out");
                    report.failures.push(PurgeFailure {
                        kind: target.kind,
                        id: target.id,
                        error: format!("purge timed out after {:?}", opts.instance_timeout),
                    });
                }
                Ok(Err(err)) => {
                    tracing::warn!(target = %target, error = %err, "purge failed");
                    report.failures.push(PurgeFailure {
                        kind: target.kind,
                        id: target.id,
                        error: err.to_string(),
                    });
                }
                Ok(Ok(outcome)) => {
                    removed_by_cascade.extend(outcome.cascade_refs);
                    report.cascade_deleted_rows += outcome.purged.dependents_removed;
                    report.purged.push(outcome.purged);
                }
            }
        }

        report.finished_at = Utc::now();
        tracing::info!(
            examined = report.examined,
            purged = report.purged.len(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            cascade_deleted_rows = report.cascade_deleted_rows,
            "purge cycle finished"
        );
        Ok(report)
    }

    /// Purge one instance: its dependent children deepest-first, its own
    /// evidence rows, the row itself, and the audit entry, in one
    /// change-set. A dry run walks the same cascade and counts instead of
    /// writing.
    async fn purge_instance(
        &self,
        record: &EntityRecord,
        opts: &PurgeCycleOptions,
        counted_evidence: &mut HashSet<Uuid>,
    ) -> Result<InstanceOutcome> {
        let target = record.entity_ref();
        let dependents = self.collect_cascade(target).await?;
        let cascade_refs: Vec<EntityRef> = dependents.iter().map(|d| d.entity_ref()).collect();
        let deleted_at = record.lifecycle.deleted_at().unwrap_or(opts.now);

        let (dependents_removed, evidence_rows_removed) = if opts.dry_run {
            let mut owners = vec![target];
            owners.extend(cascade_refs.iter().copied());
            // attribute each shared evidence row to the first instance that
            // would remove it, the way a live cascade does
            let evidence = self
                .store
                .evidence_ids_for_any(&owners)
                .await
                .into_iter()
                .filter(|id| counted_evidence.insert(*id))
                .count();
            (dependents.len(), evidence)
        } else {
            let staged = build_purge_write(record, &dependents, opts);
            let stats = self.store.commit(staged).await?;
            tracing::debug!(
                target = %target,
                entities = stats.entities_removed,
                evidence = stats.evidence_rows_removed,
                "purged"
            );
            (
                stats.entities_removed.saturating_sub(1),
                stats.evidence_rows_removed,
            )
        };

        Ok(InstanceOutcome {
            purged: PurgedInstance {
                kind: target.kind,
                id: target.id,
                name: record.name.clone(),
                deleted_at,
                dependents_removed,
                evidence_rows_removed,
            },
            cascade_refs,
        })
    }

    /// Gather every dependent of `root`, deepest rows first, so the staged
    /// hard deletes never leave a child pointing at a removed parent.
    /// Contract rows and preserved rows block the whole instance.
    async fn collect_cascade(&self, root: EntityRef) -> Result<Vec<EntityRecord>> {
        let mut ordered: Vec<EntityRecord> = Vec::new();
        let mut stack = vec![root];
        while let Some(parent) = stack.pop() {
            for child in self.store.children_of(parent).await {
                let child_ref = child.entity_ref();
                if child.kind == EntityKind::Contract {
                    return Err(EngineError::TransactionFailure(format!(
                        "contract rows still reference {}; refusing cascade",
                        parent
                    )));
                }
                if child.lifecycle.is_preserved() {
                    return Err(EngineError::TransactionFailure(format!(
                        "{} is preserved and blocks the cascade",
                        child_ref
                    )));
                }
                stack.push(child_ref);
                ordered.push(child);
            }
        }
        ordered.reverse();
        Ok(ordered)
    }
}

fn build_purge_write(
    root: &EntityRecord,
    dependents: &[EntityRecord],
    opts: &PurgeCycleOptions,
) -> StagedWrite {
    let mut staged = StagedWrite::new();
    for dependent in dependents {
        let child_ref = dependent.entity_ref();
        for change in evidence_purges_for(child_ref) {
            staged.push(change);
        }
        staged.push(Change::HardDeleteEntity {
            target: child_ref,
            require_deleted: false,
        });
    }
    let target = root.entity_ref();
    for change in evidence_purges_for(target) {
        staged.push(change);
    }
    staged.push(Change::HardDeleteEntity {
        target,
        require_deleted: true,
    });
    staged.push(Change::AppendAudit {
        entry: AuditEntry::new(
            target,
            AuditAction::Purge,
            PURGE_ACTOR,
            Some(format!(
                "retention window of {} days elapsed",
                opts.retention_days
            )),
            opts.now,
        ),
    });
    staged
}

fn evidence_purges_for(owner: EntityRef) -> Vec<Change> {
    match owner.kind {
        EntityKind::Warehouse | EntityKind::Zone => vec![Change::PurgeAllocations { owner }],
        EntityKind::Customer => vec![
            Change::PurgeAllocations { owner },
            Change::PurgeCommunications { owner },
        ],
        EntityKind::Contact => vec![Change::PurgeCommunications { owner }],
        EntityKind::Contract | EntityKind::User | EntityKind::Role => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntityRegistry;

    fn fixture() -> (Arc<GovernedStore>, RetentionReaper) {
        let registry = Arc::new(EntityRegistry::standard());
        let store = Arc::new(GovernedStore::new(registry.clone()));
        let classifier = Classifier::new(registry, store.clone());
        let reaper = RetentionReaper::new(store.clone(), classifier);
        (store, reaper)
    }

    #[tokio::test]
    async fn an_empty_store_yields_a_clean_empty_report() {
        let (_store, reaper) = fixture();
        let report = reaper
            .run_purge_cycle(PurgeCycleOptions::new(Utc::now(), 180))
            .await
            .unwrap();
        assert_eq!(report.examined, 0);
        assert!(report.purged.is_empty());
        assert!(report.skipped.is_empty());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn a_cycle_in_flight_blocks_a_second_one() {
        let (_store, reaper) = fixture();
        let _held = reaper.cycle_lock.try_lock().unwrap();
        let err = reaper
            .run_purge_cycle(PurgeCycleOptions::new(Utc::now(), 180))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }
}
