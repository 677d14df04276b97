//! Static registry of the governed entity kinds.
//!
//! One [`KindPolicy`] per kind fixes how that kind is deleted and preserved:
//! whether soft delete is available at all, which preservation verb applies,
//! the parent kind it hangs off, and the ordered evidence predicates the
//! classifier walks. The table is compiled in; nothing edits it at runtime.

use std::fmt;

use crate::classifier::facts;
use crate::classifier::predicates::{
    AlreadyPreserved, EvidencePredicate, HasFootprint, ImmutableKind, InheritedFootprint,
    SystemInstance, TestDataOverride,
};
use crate::core::{EntityKind, PreserveAction};

/// Per-kind governance policy.
pub struct KindPolicy {
    pub kind: EntityKind,
    pub deletable: bool,
    pub preserve_verb: PreserveAction,
    pub min_reason_len: usize,
    pub parent_kind: Option<EntityKind>,
    pub immutable_reason: Option<&'static str>,
    pub requires_closed_status: bool,
    pub predicates: Vec<Box<dyn EvidencePredicate>>,
}

impl KindPolicy {
    fn new(kind: EntityKind, preserve_verb: PreserveAction) -> Self {
        Self {
            kind,
            deletable: true,
            preserve_verb,
            min_reason_len: 0,
            parent_kind: None,
            immutable_reason: None,
            requires_closed_status: false,
            predicates: Vec::new(),
        }
    }

    fn immutable(kind: EntityKind, preserve_verb: PreserveAction, reason: &'static str) -> Self {
        let mut policy = Self::new(kind, preserve_verb);
        policy.deletable = false;
        policy.immutable_reason = Some(reason);
        policy
    }

    fn min_reason(mut self, len: usize) -> Self {
        self.min_reason_len = len;
        self
    }

    fn parent(mut self, kind: EntityKind) -> Self {
        self.parent_kind = Some(kind);
        self
    }

    fn requires_closed_status(mut self) -> Self {
        self.requires_closed_status = true;
        self
    }

    fn predicate(mut self, predicate: impl EvidencePredicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }
}

impl fmt::Debug for KindPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindPolicy")
            .field("kind", &self.kind)
            .field("deletable", &self.deletable)
            .field("preserve_verb", &self.preserve_verb)
            .field("min_reason_len", &self.min_reason_len)
            .field("parent_kind", &self.parent_kind)
            .field("requires_closed_status", &self.requires_closed_status)
            .field(
                "predicates",
                &self.predicates.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// The full policy table, indexed by kind.
#[derive(Debug)]
pub struct EntityRegistry {
    policies: Vec<KindPolicy>,
}

impl EntityRegistry {
    /// The built-in table covering every governed kind.
    pub fn standard() -> Self {
        let policies = vec![
            KindPolicy::new(EntityKind::Warehouse, PreserveAction::Retire)
                .min_reason(10)
                .predicate(AlreadyPreserved)
                .predicate(TestDataOverride)
                .predicate(HasFootprint::new(
                    facts::ALLOCATION_HISTORY,
                    "has allocation history",
                ))
                .predicate(HasFootprint::new(
                    facts::CONFIGURED_ZONES,
                    "has configured zones",
                )),
            KindPolicy::new(EntityKind::Zone, PreserveAction::Archive)
                .parent(EntityKind::Warehouse)
                .predicate(AlreadyPreserved)
                .predicate(TestDataOverride)
                .predicate(HasFootprint::new(
                    facts::ALLOCATION_HISTORY,
                    "has allocation history",
                ))
                .predicate(InheritedFootprint),
            KindPolicy::new(EntityKind::Customer, PreserveAction::Terminate)
                .min_reason(10)
                .predicate(AlreadyPreserved)
                .predicate(TestDataOverride)
                .predicate(HasFootprint::new(facts::CONTRACTS, "has contracts"))
                .predicate(HasFootprint::new(
                    facts::ALLOCATION_HISTORY,
                    "has allocation history",
                ))
                .predicate(HasFootprint::new(
                    facts::COMMUNICATION_LOG,
                    "has communication log entries",
                )),
            KindPolicy::new(EntityKind::Contact, PreserveAction::Deactivate)
                .parent(EntityKind::Customer)
                .predicate(AlreadyPreserved)
                .predicate(TestDataOverride)
                .predicate(HasFootprint::new(
                    facts::COMMUNICATION_LOG,
                    "has communication log entries",
                ))
                .predicate(InheritedFootprint),
            KindPolicy::immutable(
                EntityKind::Contract,
                PreserveAction::Archive,
                "contracts are legal documents and cannot be deleted; archive instead",
            )
            .min_reason(10)
            .parent(EntityKind::Customer)
            .requires_closed_status()
            .predicate(AlreadyPreserved)
            .predicate(ImmutableKind),
            KindPolicy::new(EntityKind::User, PreserveAction::Disable)
                .min_reason(10)
                .predicate(AlreadyPreserved)
                .predicate(SystemInstance)
                .predicate(TestDataOverride)
                .predicate(HasFootprint::new(
                    facts::EVER_AUTHENTICATED,
                    "has authenticated before",
                )),
            KindPolicy::immutable(
                EntityKind::Role,
                PreserveAction::Retire,
                "roles define permission history and cannot be deleted; retire instead",
            )
            .min_reason(10)
            .predicate(AlreadyPreserved)
            .predicate(ImmutableKind),
        ];
        debug_assert!(
            policies
                .iter()
                .enumerate()
                .all(|(i, p)| p.kind as usize == i),
            "policy table must follow kind declaration order"
        );
        Self { policies }
    }

    pub fn policy(&self, kind: EntityKind) -> &KindPolicy {
        &self.policies[kind as usize]
    }

    pub fn policies(&self) -> &[KindPolicy] {
        &self.policies
    }

    pub fn is_deletable(&self, kind: EntityKind) -> bool {
        self.policy(kind).deletable
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_policy_in_declaration_order() {
        let registry = EntityRegistry::standard();
        assert_eq!(registry.policies().len(), EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            assert_eq!(registry.policy(kind).kind, kind);
        }
    }

    #[test]
    fn contracts_and_roles_are_immutable() {
        let registry = EntityRegistry::standard();
        for kind in EntityKind::ALL {
            let policy = registry.policy(kind);
            let immutable = matches!(kind, EntityKind::Contract | EntityKind::Role);
            assert_eq!(!policy.deletable, immutable, "{kind}");
            assert_eq!(policy.immutable_reason.is_some(), immutable, "{kind}");
        }
    }

    #[test]
    fn parent_kinds_match_the_hierarchy() {
        let registry = EntityRegistry::standard();
        assert_eq!(
            registry.policy(EntityKind::Zone).parent_kind,
            Some(EntityKind::Warehouse)
        );
        assert_eq!(
            registry.policy(EntityKind::Contact).parent_kind,
            Some(EntityKind::Customer)
        );
        assert_eq!(
            registry.policy(EntityKind::Contract).parent_kind,
            Some(EntityKind::Customer)
        );
        assert_eq!(registry.policy(EntityKind::Warehouse).parent_kind, None);
    }

    #[test]
    fn every_chain_starts_with_the_preserved_guard() {
        let registry = EntityRegistry::standard();
        for policy in registry.policies() {
            let first = policy.predicates.first().map(|p| p.name());
            assert_eq!(first, Some("already_preserved"), "{}", policy.kind);
        }
    }

    #[test]
    fn only_contracts_require_a_closed_status() {
        let registry = EntityRegistry::standard();
        for policy in registry.policies() {
            assert_eq!(
                policy.requires_closed_status,
                policy.kind == EntityKind::Contract
            );
        }
    }
}
