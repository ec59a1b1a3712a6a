//! Sort orders and event sorting kernels.

use crate::event::{Event, TimedRecord};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lists shorter than this are always sorted on a single core.
const MIN_EVENTS_PER_WAY: usize = 1024;

/// Ordering of the records in an event list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SortOrder {
    /// No ordering is known.
    #[default]
    Unsorted,
    /// Ascending time-of-flight.
    TofSort,
    /// Ascending pulse time.
    PulseTimeSort,
    /// Ascending pulse time, ties broken by ascending time-of-flight.
    PulseTimeTofSort,
}

impl SortOrder {
    /// Returns true if this order requires pulse times.
    #[must_use]
    pub fn needs_pulse_time(self) -> bool {
        matches!(self, Self::PulseTimeSort | Self::PulseTimeTofSort)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsorted => "UNSORTED",
            Self::TofSort => "TOF_SORT",
            Self::PulseTimeSort => "PULSETIME_SORT",
            Self::PulseTimeTofSort => "PULSETIME_TOF_SORT",
        };
        f.write_str(name)
    }
}

#[inline]
pub(crate) fn cmp_tof<E: Event>(a: &E, b: &E) -> Ordering {
    a.tof().total_cmp(&b.tof())
}

#[inline]
pub(crate) fn cmp_pulse_tof<E: TimedRecord>(a: &E, b: &E) -> Ordering {
    a.pulse().cmp(&b.pulse()).then_with(|| cmp_tof(a, b))
}

/// Stable TOF sort split over `ways` rayon tasks.
///
/// Each run is sorted independently, then the runs are merged pairwise.
/// Ties always resolve towards the earlier run, so the result is identical
/// to a single stable sort.
pub(crate) fn sort_tof_fanout<E: Event>(events: &mut Vec<E>, ways: usize) {
    if ways <= 1 || events.len() < ways * MIN_EVENTS_PER_WAY {
        events.sort_by(cmp_tof);
        return;
    }
    let run_len = events.len().div_ceil(ways);
    events
        .par_chunks_mut(run_len)
        .for_each(|run| run.sort_by(cmp_tof));
    let runs: Vec<&[E]> = events.chunks(run_len).collect();
    let merged = merge_runs(&runs);
    *events = merged;
}

fn merge_runs<E: Event>(runs: &[&[E]]) -> Vec<E> {
    match runs {
        [] => Vec::new(),
        [single] => single.to_vec(),
        _ => {
            let (left, right) = runs.split_at(runs.len() / 2);
            let (left, right) = rayon::join(|| merge_runs(left), || merge_runs(right));
            merge_two(&left, &right)
        }
    }
}

fn merge_two<E: Event>(left: &[E], right: &[E]) -> Vec<E> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if cmp_tof(&right[j], &left[i]) == Ordering::Less {
            out.push(right[j]);
            j += 1;
        } else {
            out.push(left[i]);
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    out
}
