// ============================================================================
// RetentionDB Library
// ============================================================================

pub mod core;
pub mod store;
pub mod registry;
pub mod classifier;
pub mod controller;
pub mod reaper;
pub mod facade;

// Re-export main types for convenience
pub use facade::{EngineConfig, RetentionEngine};
pub use crate::core::{
    AuditAction, ContractStatus, EngineError, EntityId, EntityKind, EntityRef, PreserveAction,
    Result, ValidationError,
};

// Re-export the subsystem surface
pub use classifier::{Classifier, EvidentiaryFact, Verdict};
pub use controller::{DeleteOutcome, PreserveSuggestion, RejectionGuidance, TransitionController};
pub use reaper::{
    PurgeCycleOptions, PurgeFailure, PurgeReport, PurgedInstance, RetentionReaper, SkippedInstance,
};
pub use registry::{EntityRegistry, KindPolicy};
pub use store::{Allocation, AuditEntry, Communication, EntityRecord, GovernedStore, StagedWrite};
