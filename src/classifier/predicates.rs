use async_trait::async_trait;

use crate::core::Result;
use crate::store::EntityRecord;

use super::ClassifyContext;

/// What one predicate decided about the record under classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateOutcome {
    /// Evidence found; the record must be preserved.
    Preserve { reason: String },
    /// Affirmatively deletable; stop walking the chain.
    Deletable { reason: String },
    /// No opinion; ask the next predicate.
    Continue,
}

/// One rule in a kind's classification chain.
///
/// Predicates never mutate anything. They read the record, the pre-gathered
/// facts and the parent row, and either resolve the verdict or pass.
#[async_trait]
pub trait EvidencePredicate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(
        &self,
        record: &EntityRecord,
        ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome>;
}

/// A preserved record stays preserved, whatever else is true of it.
pub struct AlreadyPreserved;

#[async_trait]
impl EvidencePredicate for AlreadyPreserved {
    fn name(&self) -> &'static str {
        "already_preserved"
    }

    async fn evaluate(
        &self,
        record: &EntityRecord,
        _ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome> {
        Ok(match record.lifecycle.preserved_verb() {
            Some(verb) => PredicateOutcome::Preserve {
                reason: format!("already {}", verb.past_tense()),
            },
            None => PredicateOutcome::Continue,
        })
    }
}

/// Kinds the registry marks non-deletable always classify as preserved.
pub struct ImmutableKind;

#[async_trait]
impl EvidencePredicate for ImmutableKind {
    fn name(&self) -> &'static str {
        "immutable_kind"
    }

    async fn evaluate(
        &self,
        record: &EntityRecord,
        ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome> {
        let reason = ctx
            .registry
            .policy(record.kind)
            .immutable_reason
            .unwrap_or("kind is not deletable");
        Ok(PredicateOutcome::Preserve {
            reason: reason.to_string(),
        })
    }
}

/// System-owned rows are infrastructure, not data; they never delete.
pub struct SystemInstance;

#[async_trait]
impl EvidencePredicate for SystemInstance {
    fn name(&self) -> &'static str {
        "system_instance"
    }

    async fn evaluate(
        &self,
        record: &EntityRecord,
        _ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome> {
        Ok(if record.system {
            PredicateOutcome::Preserve {
                reason: format!("system {}; cannot be deleted", record.kind),
            }
        } else {
            PredicateOutcome::Continue
        })
    }
}

/// A test-data flag on the record or its parent forces deletability, but
/// only for records that were not independently preserved first (this
/// predicate sits after [`AlreadyPreserved`] in every chain).
pub struct TestDataOverride;

#[async_trait]
impl EvidencePredicate for TestDataOverride {
    fn name(&self) -> &'static str {
        "test_data_override"
    }

    async fn evaluate(
        &self,
        record: &EntityRecord,
        ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome> {
        if record.test_data {
            return Ok(PredicateOutcome::Deletable {
                reason: "flagged as test data".to_string(),
            });
        }
        if let Some(parent) = ctx.parent
            && parent.test_data
        {
            return Ok(PredicateOutcome::Deletable {
                reason: format!("parent {} is flagged as test data", parent.kind),
            });
        }
        Ok(PredicateOutcome::Continue)
    }
}

/// Fires when a named gathered fact is present: the record participated in
/// real activity and must be kept.
pub struct HasFootprint {
    fact: &'static str,
    reason: &'static str,
}

impl HasFootprint {
    pub fn new(fact: &'static str, reason: &'static str) -> Self {
        Self { fact, reason }
    }
}

#[async_trait]
impl EvidencePredicate for HasFootprint {
    fn name(&self) -> &'static str {
        "has_footprint"
    }

    async fn evaluate(
        &self,
        _record: &EntityRecord,
        ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome> {
        Ok(match ctx.fact(self.fact) {
            Some(fact) if fact.present => PredicateOutcome::Preserve {
                reason: self.reason.to_string(),
            },
            _ => PredicateOutcome::Continue,
        })
    }
}

/// Children with no footprint of their own inherit the parent's
/// deletability: gone or deleted parent means the child may go too,
/// any other parent keeps the child as history.
pub struct InheritedFootprint;

#[async_trait]
impl EvidencePredicate for InheritedFootprint {
    fn name(&self) -> &'static str {
        "inherited_footprint"
    }

    async fn evaluate(
        &self,
        _record: &EntityRecord,
        ctx: &ClassifyContext<'_>,
    ) -> Result<PredicateOutcome> {
        Ok(match ctx.parent {
            None => PredicateOutcome::Deletable {
                reason: "parent no longer exists".to_string(),
            },
            Some(parent) if parent.lifecycle.is_deleted() => PredicateOutcome::Deletable {
                reason: format!("parent {} is deleted", parent.kind),
            },
            Some(parent) => match parent.lifecycle.preserved_verb() {
                Some(verb) => PredicateOutcome::Preserve {
                    reason: format!(
                        "belongs to a {} {}; preserved as history",
                        verb.past_tense(),
                        parent.kind
                    ),
                },
                None => PredicateOutcome::Preserve {
                    reason: format!("belongs to an active {}; preserved as history", parent.kind),
                },
            },
        })
    }
}
