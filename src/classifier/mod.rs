//! Evidence classification.
//!
//! The classifier answers one question: does this record carry evidentiary
//! value that forbids deleting it? It gathers the kind's fact counts, then
//! walks the registry's predicate chain in priority order and returns the
//! first resolved verdict. Read-only and safe to call repeatedly; the
//! atomicity of acting on a verdict lives in the transition controller.

pub mod predicates;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{EngineError, EntityId, EntityKind, PreserveAction, Result};
use crate::registry::EntityRegistry;
use crate::store::{EntityRecord, GovernedStore};

use predicates::PredicateOutcome;

/// Names of the gathered facts, shared between gathering and the
/// registry's footprint predicates.
pub mod facts {
    pub const ALLOCATION_HISTORY: &str = "allocation history";
    pub const CONFIGURED_ZONES: &str = "configured zones";
    pub const CONTRACTS: &str = "contracts";
    pub const COMMUNICATION_LOG: &str = "communication log entries";
    pub const EVER_AUTHENTICATED: &str = "ever authenticated";
    pub const TEST_DATA: &str = "test data flag";
}

/// One gathered piece of evidence, counted or boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidentiaryFact {
    pub name: String,
    pub present: bool,
    pub count: Option<u64>,
}

impl EvidentiaryFact {
    pub fn counted(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            present: count > 0,
            count: Some(count),
        }
    }

    pub fn flag(name: impl Into<String>, present: bool) -> Self {
        Self {
            name: name.into(),
            present,
            count: None,
        }
    }
}

/// The classification result: whether the record must be preserved, the
/// deciding reason, every gathered fact, and the preserve verb the kind's
/// policy would apply instead of deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub must_preserve: bool,
    pub reason: String,
    pub facts: Vec<EvidentiaryFact>,
    pub suggested_action: PreserveAction,
}

impl Verdict {
    pub fn fact(&self, name: &str) -> Option<&EvidentiaryFact> {
        self.facts.iter().find(|f| f.name == name)
    }
}

/// Read-only view handed to each predicate during a walk.
pub struct ClassifyContext<'a> {
    pub registry: &'a EntityRegistry,
    pub facts: &'a [EvidentiaryFact],
    pub parent: Option<&'a EntityRecord>,
}

impl ClassifyContext<'_> {
    pub fn fact(&self, name: &str) -> Option<&EvidentiaryFact> {
        self.facts.iter().find(|f| f.name == name)
    }
}

#[derive(Clone)]
pub struct Classifier {
    registry: Arc<EntityRegistry>,
    store: Arc<GovernedStore>,
}

impl Classifier {
    pub fn new(registry: Arc<EntityRegistry>, store: Arc<GovernedStore>) -> Self {
        Self { registry, store }
    }

    /// Classify one record. A missing id is an [`EngineError::EntityNotFound`],
    /// never a verdict.
    pub async fn classify(&self, kind: EntityKind, id: EntityId) -> Result<Verdict> {
        let record = self
            .store
            .try_get(kind, id)
            .await
            .ok_or_else(|| EngineError::not_found(kind, id))?;
        let parent = match record.parent {
            Some(parent) => self.store.try_get(parent.kind, parent.id).await,
            None => None,
        };

        let collected = self.gather_facts(&record, parent.as_ref()).await;
        let policy = self.registry.policy(record.kind);
        let ctx = ClassifyContext {
            registry: &self.registry,
            facts: &collected,
            parent: parent.as_ref(),
        };

        for predicate in &policy.predicates {
            match predicate.evaluate(&record, &ctx).await? {
                PredicateOutcome::Preserve { reason } => {
                    log::debug!("{} must be preserved: {}", record.entity_ref(), reason);
                    return Ok(Verdict {
                        must_preserve: true,
                        reason,
                        facts: collected,
                        suggested_action: policy.preserve_verb,
                    });
                }
                PredicateOutcome::Deletable { reason } => {
                    log::debug!("{} is deletable: {}", record.entity_ref(), reason);
                    return Ok(Verdict {
                        must_preserve: false,
                        reason,
                        facts: collected,
                        suggested_action: policy.preserve_verb,
                    });
                }
                PredicateOutcome::Continue => {}
            }
        }

        Ok(Verdict {
            must_preserve: false,
            reason: "no footprint — safe to delete".to_string(),
            facts: collected,
            suggested_action: policy.preserve_verb,
        })
    }

    /// Count the kind's evidence up front. Facts are gathered in full even
    /// though the chain short-circuits, so a verdict always carries every
    /// count for the caller to display.
    async fn gather_facts(
        &self,
        record: &EntityRecord,
        parent: Option<&EntityRecord>,
    ) -> Vec<EvidentiaryFact> {
        let target = record.entity_ref();
        let mut collected = Vec::new();
        match record.kind {
            EntityKind::Warehouse => {
                collected.push(EvidentiaryFact::counted(
                    facts::ALLOCATION_HISTORY,
                    self.store.count_allocations_for(target).await,
                ));
                collected.push(EvidentiaryFact::counted(
                    facts::CONFIGURED_ZONES,
                    self.store
                        .count_live_children_of_kind(target, EntityKind::Zone)
                        .await,
                ));
            }
            EntityKind::Zone => {
                collected.push(EvidentiaryFact::counted(
                    facts::ALLOCATION_HISTORY,
                    self.store.count_allocations_for(target).await,
                ));
            }
            EntityKind::Customer => {
                collected.push(EvidentiaryFact::counted(
                    facts::CONTRACTS,
                    self.store
                        .count_live_children_of_kind(target, EntityKind::Contract)
                        .await,
                ));
                collected.push(EvidentiaryFact::counted(
                    facts::ALLOCATION_HISTORY,
                    self.store.count_allocations_for(target).await,
                ));
                collected.push(EvidentiaryFact::counted(
                    facts::COMMUNICATION_LOG,
                    self.store.count_communications_for(target).await,
                ));
            }
            EntityKind::Contact => {
                collected.push(EvidentiaryFact::counted(
                    facts::COMMUNICATION_LOG,
                    self.store.count_communications_for(target).await,
                ));
            }
            EntityKind::User => {
                collected.push(EvidentiaryFact::flag(
                    facts::EVER_AUTHENTICATED,
                    record.ever_authenticated,
                ));
            }
            EntityKind::Contract | EntityKind::Role => {}
        }
        if self.registry.policy(record.kind).deletable {
            let flagged = record.test_data || parent.map(|p| p.test_data).unwrap_or(false);
            collected.push(EvidentiaryFact::flag(facts::TEST_DATA, flagged));
        }
        collected
    }
}
