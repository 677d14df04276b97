//! Lifecycle transitions: attempt-delete, preserve, deactivate, reactivate.
//!
//! Each operation runs its read, classify and write as one optimistic
//! sequence against the store. The staged write carries the version the
//! sequence read, so a concurrent transition on the same id surfaces as a
//! conflict; the controller retries a lost race once, re-reading and
//! re-classifying from current state, before handing the conflict to the
//! caller.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, EvidentiaryFact};
use crate::core::{
    AuditAction, EngineError, EntityId, EntityKind, EntityRef, PreserveAction, Result,
};
use crate::registry::EntityRegistry;
use crate::store::{AuditEntry, AuditTriple, Change, GovernedStore, PreservedState, StagedWrite};

/// What a rejected delete tells the caller to do instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreserveSuggestion {
    pub action: PreserveAction,
    pub reason_field_required: bool,
    pub min_reason_length: usize,
}

/// Structured payload for a delete the classifier refused: the deciding
/// reason, the gathered facts, and the preserve action to offer instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionGuidance {
    pub reason: String,
    pub facts: Vec<EvidentiaryFact>,
    pub suggestion: PreserveSuggestion,
}

/// A rejection is a guided outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted,
    Rejected(RejectionGuidance),
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, DeleteOutcome::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&RejectionGuidance> {
        match self {
            DeleteOutcome::Rejected(guidance) => Some(guidance),
            DeleteOutcome::Deleted => None,
        }
    }
}

pub struct TransitionController {
    registry: Arc<EntityRegistry>,
    store: Arc<GovernedStore>,
    classifier: Classifier,
}

impl TransitionController {
    pub fn new(
        registry: Arc<EntityRegistry>,
        store: Arc<GovernedStore>,
        classifier: Classifier,
    ) -> Self {
        Self {
            registry,
            store,
            classifier,
        }
    }

    /// Soft-delete `id` if the classifier finds no evidentiary footprint.
    ///
    /// Rejection returns [`DeleteOutcome::Rejected`] with guidance toward
    /// the kind's preserve action. Deleting an already-deleted record is a
    /// no-op success. Never cascades to children.
    pub async fn attempt_delete(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let target = EntityRef::new(kind, id);
        retry_on_conflict("delete", target, || {
            self.try_delete_once(kind, id, actor, reason)
        })
        .await
    }

    /// Move `id` into its kind's terminal preserved state.
    pub async fn preserve(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
        reason: &str,
    ) -> Result<()> {
        let target = EntityRef::new(kind, id);
        retry_on_conflict("preserve", target, || {
            self.try_preserve_once(kind, id, actor, reason)
        })
        .await
    }

    /// Mark `id` inactive without a written justification. Only available
    /// to kinds whose policy names deactivation as their preserve verb.
    pub async fn deactivate(&self, kind: EntityKind, id: EntityId, actor: &str) -> Result<()> {
        let target = EntityRef::new(kind, id);
        retry_on_conflict("deactivate", target, || {
            self.try_deactivate_once(kind, id, actor)
        })
        .await
    }

    /// Undo a deactivation. The one reversible transition in the engine.
    pub async fn reactivate(&self, kind: EntityKind, id: EntityId, actor: &str) -> Result<()> {
        let target = EntityRef::new(kind, id);
        retry_on_conflict("reactivate", target, || {
            self.try_reactivate_once(kind, id, actor)
        })
        .await
    }

    async fn try_delete_once(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let record = self.store.get(kind, id).await?;
        if record.lifecycle.is_deleted() {
            // a second delete must not reset the retention clock
            return Ok(DeleteOutcome::Deleted);
        }

        let verdict = self.classifier.classify(kind, id).await?;
        let target = record.entity_ref();
        if verdict.must_preserve {
            let policy = self.registry.policy(kind);
            log::info!("delete of {} rejected: {}", target, verdict.reason);
            return Ok(DeleteOutcome::Rejected(RejectionGuidance {
                reason: verdict.reason,
                facts: verdict.facts,
                suggestion: PreserveSuggestion {
                    action: verdict.suggested_action,
                    reason_field_required: policy.min_reason_len > 0,
                    min_reason_length: policy.min_reason_len,
                },
            }));
        }

        let now = Utc::now();
        let mut mark = AuditTriple::new(actor, now);
        let mut audit_reason = None;
        if let Some(reason) = reason.map(str::trim)
            && !reason.is_empty()
        {
            mark = mark.with_reason(reason);
            audit_reason = Some(reason.to_string());
        }
        let staged = StagedWrite::new()
            .change(Change::MarkDeleted {
                target,
                expect_version: record.version,
                mark,
            })
            .change(Change::AppendAudit {
                entry: AuditEntry::new(target, AuditAction::SoftDelete, actor, audit_reason, now),
            });
        self.store.commit(staged).await?;
        log::info!("soft-deleted {} (actor {})", target, actor);
        Ok(DeleteOutcome::Deleted)
    }

    async fn try_preserve_once(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
        reason: &str,
    ) -> Result<()> {
        let record = self.store.get(kind, id).await?;
        let policy = self.registry.policy(kind);
        let verb = policy.preserve_verb;

        if !verb.is_terminal() {
            return Err(EngineError::validation(
                "action",
                format!("{}s are deactivated, not preserved; call deactivate", kind),
            ));
        }
        if record.system {
            return Err(EngineError::validation(
                "action",
                format!("system {}s cannot be {}", kind, verb.past_tense()),
            ));
        }
        if policy.requires_closed_status {
            let closed = record
                .contract_status
                .map(|status| status.is_closed())
                .unwrap_or(false);
            if !closed {
                return Err(EngineError::validation(
                    "status",
                    "contract is still active; only expired or terminated contracts can be archived",
                ));
            }
        }
        if let Some(existing) = record.lifecycle.preserved_verb() {
            return Err(EngineError::validation(
                "state",
                format!("already {}", existing.past_tense()),
            ));
        }
        if record.lifecycle.is_deleted() {
            return Err(EngineError::validation("state", "record is deleted"));
        }
        let reason = reason.trim();
        if reason.chars().count() < policy.min_reason_len {
            return Err(EngineError::validation(
                "reason",
                format!("reason must be at least {} characters", policy.min_reason_len),
            ));
        }

        let now = Utc::now();
        let target = record.entity_ref();
        let mut mark = AuditTriple::new(actor, now);
        let mut audit_reason = None;
        if !reason.is_empty() {
            mark = mark.with_reason(reason);
            audit_reason = Some(reason.to_string());
        }
        let staged = StagedWrite::new()
            .change(Change::MarkPreserved {
                target,
                expect_version: record.version,
                state: PreservedState { verb, mark },
            })
            .change(Change::AppendAudit {
                entry: AuditEntry::new(target, verb.into(), actor, audit_reason, now),
            });
        self.store.commit(staged).await?;
        log::info!("{} is now {} (actor {})", target, verb.past_tense(), actor);
        Ok(())
    }

    async fn try_deactivate_once(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
    ) -> Result<()> {
        let record = self.store.get(kind, id).await?;
        if self.registry.policy(kind).preserve_verb != PreserveAction::Deactivate {
            return Err(EngineError::validation(
                "action",
                format!("deactivate is not available for {}s", kind),
            ));
        }
        if record.lifecycle.is_deleted() {
            return Err(EngineError::validation("state", "record is deleted"));
        }
        if !record.lifecycle.is_active() {
            return Err(EngineError::validation("state", "already inactive"));
        }

        let now = Utc::now();
        let target = record.entity_ref();
        let staged = StagedWrite::new()
            .change(Change::SetActive {
                target,
                expect_version: record.version,
                active: false,
                actor: actor.to_string(),
                at: now,
            })
            .change(Change::AppendAudit {
                entry: AuditEntry::new(target, AuditAction::Deactivate, actor, None, now),
            });
        self.store.commit(staged).await?;
        log::info!("deactivated {} (actor {})", target, actor);
        Ok(())
    }

    async fn try_reactivate_once(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
    ) -> Result<()> {
        let record = self.store.get(kind, id).await?;
        if self.registry.policy(kind).preserve_verb != PreserveAction::Deactivate {
            return Err(EngineError::validation(
                "action",
                format!("reactivate is not available for {}s", kind),
            ));
        }
        if record.lifecycle.is_deleted() {
            return Err(EngineError::validation("state", "record is deleted"));
        }
        if record.lifecycle.is_active() {
            return Err(EngineError::validation("state", "already active"));
        }

        let now = Utc::now();
        let target = record.entity_ref();
        let staged = StagedWrite::new()
            .change(Change::SetActive {
                target,
                expect_version: record.version,
                active: true,
                actor: actor.to_string(),
                at: now,
            })
            .change(Change::AppendAudit {
                entry: AuditEntry::new(target, AuditAction::Reactivate, actor, None, now),
            });
        self.store.commit(staged).await?;
        log::info!("reactivated {} (actor {})", target, actor);
        Ok(())
    }
}

/// Run `op`; if it loses an optimistic race, run it once more against the
/// fresh state. A second conflict goes to the caller.
async fn retry_on_conflict<T, F, Fut>(operation: &str, target: EntityRef, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(err) if err.is_conflict() => {
            log::warn!("{} of {} lost a race, retrying: {}", operation, target, err);
            op().await
        }
        other => other,
    }
}
