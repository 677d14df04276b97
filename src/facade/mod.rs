//! One handle over the whole engine.
//!
//! [`RetentionEngine`] wires the registry, store, classifier, controller and
//! reaper together, and owns the optional journal and snapshot files.
//!
//! One obligation does not live behind this facade. Soft delete never
//! cascades: children of a deleted parent stay untouched, and every read
//! path that lists children is expected to filter by the parent's deleted
//! flag itself. In-process callers get that filter from
//! [`GovernedStore::live_children_of`](crate::store::GovernedStore::live_children_of);
//! external collaborators must apply the equivalent filter in their own
//! queries.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::{JOURNAL_FILE, RetentionEngine, SNAPSHOT_FILE};
