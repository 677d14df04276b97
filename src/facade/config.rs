use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RETENTION_DAYS: i64 = 180;
const DEFAULT_INSTANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine settings: the retention window, the per-instance purge timeout,
/// and an optional data directory for the journal and snapshots.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retention_days: i64,
    pub instance_timeout: Duration,
    pub data_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            instance_timeout: DEFAULT_INSTANCE_TIMEOUT,
            data_dir: None,
        }
    }

    pub fn retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn instance_timeout(mut self, timeout: Duration) -> Self {
        self.instance_timeout = timeout;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
