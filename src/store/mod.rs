//! Governed storage: records, evidence tables, the audit log, staged
//! change-sets and the constraint rules that gate every commit.

pub mod audit;
pub mod change;
pub mod constraints;
pub mod evidence;
pub mod journal;
pub mod memory;
pub mod record;
pub mod table;

pub use audit::{AuditEntry, AuditLog};
pub use change::{Change, CommitStats, StagedWrite};
pub use constraints::ConstraintValidator;
pub use evidence::{Allocation, Communication, EvidenceTables};
pub use journal::{AuditJournal, SnapshotManager, StoreSnapshot};
pub use memory::GovernedStore;
pub use record::{AuditTriple, EntityRecord, Lifecycle, PreservedState};
pub use table::EntityTable;
