//! tofstore-core: Event records, event lists and histogram caching.
//!
//! This crate provides the storage layer for neutron event data: the
//! three event record shapes, per-spectrum event lists with exact
//! sort-state tracking and type promotion, histogram generation, and the
//! bounded histogram cache shared by the lists of a workspace.
//!

pub mod error;
pub mod event;
pub mod event_list;
pub mod histogram;
pub mod mru;
pub mod sort;

pub use error::{Error, Result};
pub use event::{
    Event, EventType, PulseTime, TimedRecord, TofEvent, WeightedEvent, WeightedEventNoTime,
    WeightedRecord,
};
pub use event_list::{EventList, EventStorage, StoredEvent};
pub use histogram::{BinEdges, Histogram};
pub use mru::{CacheKey, HistogramMru, MruStats, DEFAULT_MRU_CAPACITY};
pub use sort::SortOrder;
