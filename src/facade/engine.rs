use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::classifier::{Classifier, Verdict};
use crate::controller::{DeleteOutcome, TransitionController};
use crate::core::{EntityId, EntityKind, Result};
use crate::reaper::{PurgeCycleOptions, PurgeReport, RetentionReaper};
use crate::registry::EntityRegistry;
use crate::store::{AuditEntry, AuditJournal, GovernedStore, SnapshotManager};

use super::config::EngineConfig;

pub const SNAPSHOT_FILE: &str = "retentiondb.snapshot";
pub const JOURNAL_FILE: &str = "retentiondb.journal";

/// The assembled engine: registry, store, classifier, transition controller
/// and reaper wired together behind one handle.
///
/// # Examples
///
/// ```
/// use retentiondb::{DeleteOutcome, EntityKind, EntityRecord, RetentionEngine};
///
/// # fn main() -> retentiondb::Result<()> {
/// tokio_test::block_on(async {
///     let engine = RetentionEngine::new();
///     let warehouse = engine
///         .store()
///         .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
///         .await?;
///
///     // nothing references the warehouse, so the delete goes through
///     let outcome = engine
///         .attempt_delete(warehouse.kind, warehouse.id, "ops", None)
///         .await?;
///     assert_eq!(outcome, DeleteOutcome::Deleted);
///     Ok(())
/// })
/// # }
/// ```
pub struct RetentionEngine {
    registry: Arc<EntityRegistry>,
    store: Arc<GovernedStore>,
    classifier: Classifier,
    controller: TransitionController,
    reaper: RetentionReaper,
    snapshots: Option<SnapshotManager>,
    config: EngineConfig,
}

impl RetentionEngine {
    /// In-memory engine with default settings and no persistence.
    pub fn new() -> Self {
        Self::assemble(EngineConfig::new(), None, None)
    }

    /// Engine built from `config`. A configured data directory opens the
    /// audit journal and snapshot file under it.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        match &config.data_dir {
            Some(dir) => {
                let journal = AuditJournal::open(dir.join(JOURNAL_FILE))?;
                let snapshots = SnapshotManager::new(dir.join(SNAPSHOT_FILE));
                Ok(Self::assemble(
                    config.clone(),
                    Some(journal),
                    Some(snapshots),
                ))
            }
            None => Ok(Self::assemble(config, None, None)),
        }
    }

    fn assemble(
        config: EngineConfig,
        journal: Option<AuditJournal>,
        snapshots: Option<SnapshotManager>,
    ) -> Self {
        let registry = Arc::new(EntityRegistry::standard());
        let store = Arc::new(match journal {
            Some(journal) => GovernedStore::with_journal(registry.clone(), journal),
            None => GovernedStore::new(registry.clone()),
        });
        let classifier = Classifier::new(registry.clone(), store.clone());
        let controller =
            TransitionController::new(registry.clone(), store.clone(), classifier.clone());
        let reaper = RetentionReaper::new(store.clone(), classifier.clone());
        Self {
            registry,
            store,
            classifier,
            controller,
            reaper,
            snapshots,
            config,
        }
    }

    pub fn store(&self) -> &Arc<GovernedStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn classify(&self, kind: EntityKind, id: EntityId) -> Result<Verdict> {
        self.classifier.classify(kind, id).await
    }

    pub async fn attempt_delete(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<DeleteOutcome> {
        self.controller.attempt_delete(kind, id, actor, reason).await
    }

    pub async fn preserve(
        &self,
        kind: EntityKind,
        id: EntityId,
        actor: &str,
        reason: &str,
    ) -> Result<()> {
        self.controller.preserve(kind, id, actor, reason).await
    }

    pub async fn deactivate(&self, kind: EntityKind, id: EntityId, actor: &str) -> Result<()> {
        self.controller.deactivate(kind, id, actor).await
    }

    pub async fn reactivate(&self, kind: EntityKind, id: EntityId, actor: &str) -> Result<()> {
        self.controller.reactivate(kind, id, actor).await
    }

    /// Run one purge cycle at `now`, using the configured retention window
    /// and per-instance timeout.
    pub async fn run_purge_cycle(&self, now: DateTime<Utc>, dry_run: bool) -> Result<PurgeReport> {
        let mut opts = PurgeCycleOptions::new(now, self.config.retention_days)
            .with_instance_timeout(self.config.instance_timeout);
        if dry_run {
            opts = opts.dry_run();
        }
        self.reaper.run_purge_cycle(opts).await
    }

    /// Run one purge cycle with caller-supplied options.
    pub async fn run_purge_cycle_with(&self, opts: PurgeCycleOptions) -> Result<PurgeReport> {
        self.reaper.run_purge_cycle(opts).await
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.store.audit_entries().await
    }

    /// Restore state from the data directory's snapshot. Returns false when
    /// no snapshot exists or no data directory is configured.
    pub async fn load_snapshot(&self) -> Result<bool> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(false);
        };
        match snapshots.load()? {
            Some(snapshot) => {
                self.store.restore(snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write the current state to the data directory's snapshot file.
    /// Returns false when no data directory is configured.
    pub async fn save_snapshot(&self) -> Result<bool> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(false);
        };
        let snapshot = self.store.snapshot().await;
        snapshots.save(&snapshot)?;
        Ok(true)
    }
}

impl Default for RetentionEngine {
    fn default() -> Self {
        Self::new()
    }
}
