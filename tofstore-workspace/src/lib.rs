//! tofstore-workspace: Event workspaces built on tofstore-core.
//!
//! An [`EventWorkspace`] owns one event list per spectrum and the histogram
//! cache they share. It provides parallel aggregates over all lists, bulk
//! sorting through the largest-cost-first scheduler from
//! `tofstore-algorithms`, common-binning updates, and JSON summaries.
//!

pub mod config;
pub mod error;
pub mod summary;
mod workspace;

pub use config::WorkspaceConfig;
pub use error::{Error, Result};
pub use summary::{SpectrumSummary, WorkspaceSummary};
pub use workspace::EventWorkspace;

// Re-export the types needed to drive a workspace
pub use tofstore_algorithms::{
    LogProgress, ProgressCounter, ProgressSink, SchedulerConfig, SortReport,
};
pub use tofstore_core::{BinEdges, EventList, EventType, Histogram, PulseTime, SortOrder};
