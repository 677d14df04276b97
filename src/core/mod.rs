pub mod error;
pub mod types;

pub use error::{EngineError, Result, ValidationError};
pub use types::{AuditAction, ContractStatus, EntityId, EntityKind, EntityRef, PreserveAction};
