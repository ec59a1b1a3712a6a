//! Scheduler configuration.

use crate::{Error, Result};
use sysinfo::System;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of chunks scheduled per worker.
pub const DEFAULT_TASKS_PER_WORKER: usize = 20;

/// Configuration for the parallel sort scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SchedulerConfig {
    /// Number of cores to plan for. `None` uses the physical core count.
    pub workers: Option<usize>,
    /// Target number of chunks per worker; sets the default chunk size.
    pub tasks_per_worker: usize,
    /// Parallel sub-sorts per list (1, 2 or 4). `None` picks automatically
    /// from the ratio of lists to workers.
    pub cores_per_task: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            tasks_per_worker: DEFAULT_TASKS_PER_WORKER,
            cores_per_task: None,
        }
    }
}

impl SchedulerConfig {
    /// Set the number of workers.
    ///
    /// Values less than 1 are clamped to 1. Use [`Self::try_with_workers`]
    /// to surface invalid values as an error instead.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Set the number of chunks scheduled per worker (clamped to at least 1).
    #[must_use]
    pub fn with_tasks_per_worker(mut self, tasks: usize) -> Self {
        self.tasks_per_worker = tasks.max(1);
        self
    }

    /// Set the fan-out per list without validation; checked when a sort
    /// is planned.
    #[must_use]
    pub fn with_cores_per_task(mut self, cores: usize) -> Self {
        self.cores_per_task = Some(cores);
        self
    }

    /// Fallible variant of [`Self::with_workers`].
    ///
    /// # Errors
    /// Returns an error if `workers` is 0.
    pub fn try_with_workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidArgument(
                "workers must be at least 1".to_string(),
            ));
        }
        self.workers = Some(workers);
        Ok(self)
    }

    /// Fallible variant of [`Self::with_cores_per_task`].
    ///
    /// # Errors
    /// Returns an error unless `cores` is 1, 2 or 4.
    pub fn try_with_cores_per_task(mut self, cores: usize) -> Result<Self> {
        validate_cores_per_task(cores)?;
        self.cores_per_task = Some(cores);
        Ok(self)
    }

    /// Checks every field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for zero workers, zero tasks per
    /// worker, or an unsupported fan-out.
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::InvalidArgument(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.tasks_per_worker == 0 {
            return Err(Error::InvalidArgument(
                "tasks_per_worker must be at least 1".to_string(),
            ));
        }
        if let Some(cores) = self.cores_per_task {
            validate_cores_per_task(cores)?;
        }
        Ok(())
    }

    /// Return the configured worker count, or the physical core count.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(physical_core_count).max(1)
    }
}

/// Number of physical cores, falling back to the rayon thread count.
#[must_use]
pub fn physical_core_count() -> usize {
    let system = System::new();
    system
        .physical_core_count()
        .unwrap_or_else(rayon::current_num_threads)
        .max(1)
}

fn validate_cores_per_task(cores: usize) -> Result<()> {
    if matches!(cores, 1 | 2 | 4) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "cores per task should be 1, 2 or 4, got {cores}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_clamp() {
        let config = SchedulerConfig::default()
            .with_workers(0)
            .with_tasks_per_worker(0);
        assert_eq!(config.workers, Some(1));
        assert_eq!(config.tasks_per_worker, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fallible_builders() {
        assert!(SchedulerConfig::default().try_with_workers(0).is_err());
        assert!(SchedulerConfig::default().try_with_cores_per_task(3).is_err());
        let config = SchedulerConfig::default()
            .try_with_cores_per_task(4)
            .unwrap();
        assert_eq!(config.cores_per_task, Some(4));
    }

    #[test]
    fn test_validate_rejects_bad_fanout() {
        let config = SchedulerConfig::default().with_cores_per_task(8);
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_effective_workers() {
        assert_eq!(SchedulerConfig::default().with_workers(6).effective_workers(), 6);
        assert!(SchedulerConfig::default().effective_workers() >= 1);
    }
}
