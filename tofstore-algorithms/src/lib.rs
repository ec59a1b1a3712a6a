//! tofstore-algorithms: Parallel scheduling for event-list batches.
//!
//! This crate sorts many event lists at once:
//! - **Planning** - contiguous chunks costed at `n ln n` per list
//! - **Dispatch** - largest-cost-first from a shared max-heap
//! - **Fan-out** - 1, 2 or 4 sub-sorts per list when lists are few
//!
//! Progress is reported through [`ProgressSink`] and a batch can be
//! interrupted with a shared cancel flag.
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod progress;
mod scheduler;

pub use config::{physical_core_count, SchedulerConfig, DEFAULT_TASKS_PER_WORKER};
pub use error::{Error, Result};
pub use progress::{LogProgress, ProgressCounter, ProgressSink};
pub use scheduler::{sort_cost, ChunkPlan, ChunkRecord, SortPlan, SortReport, SortScheduler};
