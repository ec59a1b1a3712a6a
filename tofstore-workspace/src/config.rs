//! Workspace configuration.

use serde::{Deserialize, Serialize};
use tofstore_algorithms::SchedulerConfig;
use tofstore_core::DEFAULT_MRU_CAPACITY;

/// Configuration for an [`crate::EventWorkspace`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Histograms kept in the shared cache. 0 disables caching.
    pub mru_capacity: usize,
    /// Settings for bulk sorts.
    pub scheduler: SchedulerConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            mru_capacity: DEFAULT_MRU_CAPACITY,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Set the histogram cache capacity.
    #[must_use]
    pub fn with_mru_capacity(mut self, capacity: usize) -> Self {
        self.mru_capacity = capacity;
        self
    }

    /// Replace the scheduler settings.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the number of sort workers (clamped to at least 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.scheduler = self.scheduler.with_workers(workers);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.mru_capacity, 50);
        assert_eq!(config.scheduler.tasks_per_worker, 20);
    }

    #[test]
    fn test_json_round_trip() {
        let config = WorkspaceConfig::default()
            .with_mru_capacity(8)
            .with_workers(3);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: WorkspaceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
