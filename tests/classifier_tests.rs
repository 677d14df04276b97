/// Classifier tests
///
/// Evidence gathering, predicate priority order and verdict shape.
/// Run with: cargo test --test classifier_tests

use retentiondb::classifier::facts;
use retentiondb::store::{Allocation, AuditTriple, Communication, EntityRecord};
use retentiondb::{EngineError, EntityId, EntityKind, PreserveAction, RetentionEngine};
use chrono::Utc;

#[tokio::test]
async fn test_empty_warehouse_classifies_deletable() {
    let engine = RetentionEngine::new();
    let warehouse = engine
        .store()
        .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
        .await
        .unwrap();

    let verdict = engine.classify(warehouse.kind, warehouse.id).await.unwrap();
    assert!(!verdict.must_preserve);
    assert_eq!(verdict.reason, "no footprint — safe to delete");
    assert_eq!(verdict.suggested_action, PreserveAction::Retire);

    // the zero counts ride along for transparency
    let allocations = verdict.fact(facts::ALLOCATION_HISTORY).unwrap();
    assert_eq!(allocations.count, Some(0));
    let zones = verdict.fact(facts::CONFIGURED_ZONES).unwrap();
    assert_eq!(zones.count, Some(0));
}

#[tokio::test]
async fn test_allocation_history_preserves_the_warehouse() {
    let engine = RetentionEngine::new();
    let store = engine.store();
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

    let verdict = engine.classify(warehouse.kind, warehouse.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(verdict.reason, "has allocation history");
    assert_eq!(verdict.fact(facts::ALLOCATION_HISTORY).unwrap().count, Some(1));
}

#[tokio::test]
async fn test_configured_zones_preserve_the_warehouse() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let warehouse = store
        .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
        .await
        .unwrap();
    store
        .insert(EntityRecord::new(EntityKind::Zone, "Aisle 1").with_parent(warehouse))
        .await
        .unwrap();

    let verdict = engine.classify(warehouse.kind, warehouse.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(verdict.reason, "has configured zones");
}

#[tokio::test]
async fn test_customer_with_contract_suggests_terminate() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let customer = store
        .insert(EntityRecord::new(EntityKind::Customer, "Acme"))
        .await
        .unwrap();
    store
        .insert(EntityRecord::new(EntityKind::Contract, "Storage agreement").with_parent(customer))
        .await
        .unwrap();

    let verdict = engine.classify(customer.kind, customer.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(verdict.reason, "has contracts");
    assert_eq!(verdict.suggested_action, PreserveAction::Terminate);
}

#[tokio::test]
async fn test_communication_log_preserves_the_contact() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let customer = store
        .insert(EntityRecord::new(EntityKind::Customer, "Acme"))
        .await
        .unwrap();
    let contact = store
        .insert(EntityRecord::new(EntityKind::Contact, "Dana Reeve").with_parent(customer))
        .await
        .unwrap();
    store
        .add_communication(Communication::new(contact.id, customer.id, "email"))
        .await
        .unwrap();

    let verdict = engine.classify(contact.kind, contact.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(verdict.reason, "has communication log entries");
    assert_eq!(verdict.suggested_action, PreserveAction::Deactivate);
}

#[tokio::test]
async fn test_quiet_contact_inherits_from_its_live_parent() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let customer = store
        .insert(EntityRecord::new(EntityKind::Customer, "Acme"))
        .await
        .unwrap();
    let contact = store
        .insert(EntityRecord::new(EntityKind::Contact, "Dana Reeve").with_parent(customer))
        .await
        .unwrap();

    // no communications of its own, but the customer is live
    let verdict = engine.classify(contact.kind, contact.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(
        verdict.reason,
        "belongs to an active customer; preserved as history"
    );
}

#[tokio::test]
async fn test_zone_of_a_deleted_parent_is_deletable() {
    let engine = RetentionEngine::new();
    let store = engine.store();

    let mut gone = EntityRecord::new(EntityKind::Warehouse, "Old Dock");
    gone.lifecycle.deleted = Some(AuditTriple::new("ops", Utc::now()));
    let gone = store.insert(gone).await.unwrap();
    let zone = store
        .insert(EntityRecord::new(EntityKind::Zone, "Aisle 9").with_parent(gone))
        .await
        .unwrap();

    let verdict = engine.classify(zone.kind, zone.id).await.unwrap();
    assert!(!verdict.must_preserve);
    assert_eq!(verdict.reason, "parent warehouse is deleted");
}

#[tokio::test]
async fn test_test_flag_overrides_a_real_footprint() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let warehouse = store
        .insert(EntityRecord::new(EntityKind::Warehouse, "Loadtest Site").as_test_data())
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

    let verdict = engine.classify(warehouse.kind, warehouse.id).await.unwrap();
    assert!(!verdict.must_preserve);
    assert_eq!(verdict.reason, "flagged as test data");
}

#[tokio::test]
async fn test_a_disabled_user_ignores_the_test_flag() {
    let engine = RetentionEngine::new();
    let user = engine
        .store()
        .insert(EntityRecord::new(EntityKind::User, "pat").as_test_data())
        .await
        .unwrap();
    engine
        .preserve(user.kind, user.id, "ops", "left the company in June")
        .await
        .unwrap();

    // preservation outranks the test-data override
    let verdict = engine.classify(user.kind, user.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(verdict.reason, "already disabled");
}

#[tokio::test]
async fn test_contracts_and_roles_are_categorically_preserved() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let customer = store
        .insert(EntityRecord::new(EntityKind::Customer, "Acme"))
        .await
        .unwrap();
    let contract = store
        .insert(EntityRecord::new(EntityKind::Contract, "Storage agreement").with_parent(customer))
        .await
        .unwrap();
    let role = store
        .insert(EntityRecord::new(EntityKind::Role, "auditor"))
        .await
        .unwrap();

    let verdict = engine.classify(contract.kind, contract.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(
        verdict.reason,
        "contracts are legal documents and cannot be deleted; archive instead"
    );
    assert_eq!(verdict.suggested_action, PreserveAction::Archive);

    let verdict = engine.classify(role.kind, role.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(
        verdict.reason,
        "roles define permission history and cannot be deleted; retire instead"
    );
    assert_eq!(verdict.suggested_action, PreserveAction::Retire);
}

#[tokio::test]
async fn test_login_history_preserves_the_user() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let seasoned = store
        .insert(EntityRecord::new(EntityKind::User, "pat").with_authentication_history())
        .await
        .unwrap();
    let fresh = store
        .insert(EntityRecord::new(EntityKind::User, "sam"))
        .await
        .unwrap();

    let verdict = engine.classify(seasoned.kind, seasoned.id).await.unwrap();
    assert!(verdict.must_preserve);
    assert_eq!(verdict.reason, "has authenticated before");

    let verdict = engine.classify(fresh.kind, fresh.id).await.unwrap();
    assert!(!verdict.must_preserve);
}

#[tokio::test]
async fn test_classifying_a_missing_id_is_not_found() {
    let engine = RetentionEngine::new();
    let err = engine
        .classify(EntityKind::Customer, EntityId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EntityNotFound { .. }));
}

#[tokio::test]
async fn test_classification_is_idempotent() {
    let engine = RetentionEngine::new();
    let store = engine.store();
    let customer = store
        .insert(EntityRecord::new(EntityKind::Customer, "Acme"))
        .await
        .unwrap();
    store
        .insert(EntityRecord::new(EntityKind::Contract, "Storage agreement").with_parent(customer))
        .await
        .unwrap();

    let first = engine.classify(customer.kind, customer.id).await.unwrap();
    let second = engine.classify(customer.kind, customer.id).await.unwrap();
    assert_eq!(first, second);
}
