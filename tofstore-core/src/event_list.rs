//! Per-spectrum event storage.
//!
//! An [`EventList`] holds the records of one spectrum in a single
//! homogeneous vector selected by [`EventType`]. Promotion between
//! representations is explicit and one-directional. The list tracks
//! whether its records are known to be sorted and keeps that flag exact:
//! operations that may break an order reset it to [`SortOrder::Unsorted`].

use crate::error::{Error, Result};
use crate::event::{
    Event, EventType, PulseTime, TimedRecord, TofEvent, WeightedEvent, WeightedEventNoTime,
    WeightedRecord,
};
use crate::histogram::{check_bin_edges, check_histogram_shape, find_bin, BinEdges, Histogram};
use crate::mru::HistogramMru;
use crate::sort::{cmp_pulse_tof, cmp_tof, sort_tof_fanout, SortOrder};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::mem::size_of;
use std::sync::{Arc, Weak};

/// Runs `$body` with `$events` bound to the typed vector of `$storage`.
macro_rules! with_events {
    ($storage:expr, $events:ident => $body:expr) => {
        match $storage {
            EventStorage::Tof($events) => $body,
            EventStorage::Weighted($events) => $body,
            EventStorage::WeightedNoTime($events) => $body,
        }
    };
}

/// Homogeneous record storage, one variant per [`EventType`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventStorage {
    /// Unweighted events.
    Tof(Vec<TofEvent>),
    /// Weighted events with pulse time.
    Weighted(Vec<WeightedEvent>),
    /// Weighted events without pulse time.
    WeightedNoTime(Vec<WeightedEventNoTime>),
}

impl Default for EventStorage {
    fn default() -> Self {
        Self::Tof(Vec::new())
    }
}

impl EventStorage {
    /// Representation tag of the stored records.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Tof(_) => EventType::Tof,
            Self::Weighted(_) => EventType::Weighted,
            Self::WeightedNoTime(_) => EventType::WeightedNoTime,
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        with_events!(self, events => events.len())
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the records to `target` if it is more specialised.
    fn promote(&mut self, target: EventType) {
        if target <= self.event_type() {
            return;
        }
        *self = match (std::mem::take(self), target) {
            (Self::Tof(events), EventType::Weighted) => {
                Self::Weighted(events.into_iter().map(WeightedEvent::from).collect())
            }
            (Self::Tof(events), EventType::WeightedNoTime) => {
                Self::WeightedNoTime(events.into_iter().map(WeightedEventNoTime::from).collect())
            }
            (Self::Weighted(events), EventType::WeightedNoTime) => {
                Self::WeightedNoTime(events.into_iter().map(WeightedEventNoTime::from).collect())
            }
            (other, _) => other,
        };
    }
}

/// Record types that can be stored in an [`EventList`].
pub trait StoredEvent: Event {
    /// Wraps a vector of records in storage.
    fn into_storage(events: Vec<Self>) -> EventStorage;

    /// Appends records to storage of equal or more specialised type.
    fn extend_storage(storage: &mut EventStorage, events: &[Self]);
}

impl StoredEvent for TofEvent {
    fn into_storage(events: Vec<Self>) -> EventStorage {
        EventStorage::Tof(events)
    }

    fn extend_storage(storage: &mut EventStorage, events: &[Self]) {
        match storage {
            EventStorage::Tof(out) => out.extend_from_slice(events),
            EventStorage::Weighted(out) => {
                out.extend(events.iter().copied().map(WeightedEvent::from));
            }
            EventStorage::WeightedNoTime(out) => {
                out.extend(events.iter().copied().map(WeightedEventNoTime::from));
            }
        }
    }
}

impl StoredEvent for WeightedEvent {
    fn into_storage(events: Vec<Self>) -> EventStorage {
        EventStorage::Weighted(events)
    }

    fn extend_storage(storage: &mut EventStorage, events: &[Self]) {
        match storage {
            EventStorage::Tof(_) => {
                storage.promote(EventType::Weighted);
                Self::extend_storage(storage, events);
            }
            EventStorage::Weighted(out) => out.extend_from_slice(events),
            EventStorage::WeightedNoTime(out) => {
                out.extend(events.iter().copied().map(WeightedEventNoTime::from));
            }
        }
    }
}

impl StoredEvent for WeightedEventNoTime {
    fn into_storage(events: Vec<Self>) -> EventStorage {
        EventStorage::WeightedNoTime(events)
    }

    fn extend_storage(storage: &mut EventStorage, events: &[Self]) {
        match storage {
            EventStorage::WeightedNoTime(out) => out.extend_from_slice(events),
            _ => {
                storage.promote(EventType::WeightedNoTime);
                Self::extend_storage(storage, events);
            }
        }
    }
}

/// Link from a list to the histogram cache of its workspace.
#[derive(Debug, Clone)]
struct MruLink {
    cache: Weak<HistogramMru>,
    index: usize,
}

/// All events of one spectrum.
#[derive(Debug)]
pub struct EventList {
    events: EventStorage,
    order: SortOrder,
    spectrum_no: i32,
    detector_ids: BTreeSet<i32>,
    x: Arc<BinEdges>,
    mru: Option<MruLink>,
}

impl Default for EventList {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventList {
    /// Deep-copies the records. The copy is detached from any cache.
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            order: self.order,
            spectrum_no: self.spectrum_no,
            detector_ids: self.detector_ids.clone(),
            x: Arc::clone(&self.x),
            mru: None,
        }
    }
}

impl PartialEq for EventList {
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events
            && self.order == other.order
            && self.spectrum_no == other.spectrum_no
            && self.detector_ids == other.detector_ids
            && self.x == other.x
    }
}

impl<E: StoredEvent> From<Vec<E>> for EventList {
    fn from(events: Vec<E>) -> Self {
        Self {
            events: E::into_storage(events),
            ..Self::new()
        }
    }
}

impl EventList {
    /// Creates an empty, unsorted `Tof` list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: EventStorage::default(),
            order: SortOrder::Unsorted,
            spectrum_no: 0,
            detector_ids: BTreeSet::new(),
            x: Arc::new(BinEdges::placeholder()),
            mru: None,
        }
    }

    /// Creates an empty list for the given spectrum number.
    #[must_use]
    pub fn with_spectrum_no(spectrum_no: i32) -> Self {
        Self {
            spectrum_no,
            ..Self::new()
        }
    }

    /// Connects this list to a workspace histogram cache under `index`.
    pub fn attach_mru(&mut self, cache: &Arc<HistogramMru>, index: usize) {
        self.mru = Some(MruLink {
            cache: Arc::downgrade(cache),
            index,
        });
    }

    /// Disconnects this list from its histogram cache.
    pub fn detach_mru(&mut self) {
        self.invalidate_cache();
        self.mru = None;
    }

    fn cache(&self) -> Option<(Arc<HistogramMru>, usize)> {
        let link = self.mru.as_ref()?;
        Some((link.cache.upgrade()?, link.index))
    }

    fn invalidate_cache(&self) {
        if let Some((cache, index)) = self.cache() {
            cache.remove_list(index);
        }
    }

    // ------------------------------------------------------------------
    // Metadata

    /// Current record representation.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.events.event_type()
    }

    /// Known ordering of the records.
    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    /// Returns true if the records are known to be in TOF order.
    #[must_use]
    pub fn is_sorted_by_tof(&self) -> bool {
        self.order == SortOrder::TofSort
    }

    /// Spectrum number of this list.
    #[must_use]
    pub fn spectrum_no(&self) -> i32 {
        self.spectrum_no
    }

    /// Sets the spectrum number.
    pub fn set_spectrum_no(&mut self, spectrum_no: i32) {
        self.spectrum_no = spectrum_no;
    }

    /// Detector IDs contributing to this spectrum.
    #[must_use]
    pub fn detector_ids(&self) -> &BTreeSet<i32> {
        &self.detector_ids
    }

    /// Adds a contributing detector ID.
    pub fn add_detector_id(&mut self, id: i32) {
        self.detector_ids.insert(id);
    }

    /// Replaces the contributing detector IDs.
    pub fn set_detector_ids(&mut self, ids: impl IntoIterator<Item = i32>) {
        self.detector_ids = ids.into_iter().collect();
    }

    /// Returns true if `id` contributes to this spectrum.
    #[must_use]
    pub fn has_detector_id(&self, id: i32) -> bool {
        self.detector_ids.contains(&id)
    }

    /// Number of events.
    #[must_use]
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the list holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Approximate heap and inline memory used by this list, in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        let events = with_events!(&self.events, events => events.capacity() * record_size(events.as_slice()));
        events + size_of::<Self>() + self.detector_ids.len() * size_of::<i32>()
    }

    /// Read access to the raw storage.
    #[must_use]
    pub fn storage(&self) -> &EventStorage {
        &self.events
    }

    /// The records, if the list holds `Tof` events.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for any other representation.
    pub fn tof_events(&self) -> Result<&[TofEvent]> {
        match &self.events {
            EventStorage::Tof(events) => Ok(events),
            other => Err(wrong_type(EventType::Tof, other.event_type())),
        }
    }

    /// The records, if the list holds `Weighted` events.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for any other representation.
    pub fn weighted_events(&self) -> Result<&[WeightedEvent]> {
        match &self.events {
            EventStorage::Weighted(events) => Ok(events),
            other => Err(wrong_type(EventType::Weighted, other.event_type())),
        }
    }

    /// The records, if the list holds `WeightedNoTime` events.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for any other representation.
    pub fn weighted_no_time_events(&self) -> Result<&[WeightedEventNoTime]> {
        match &self.events {
            EventStorage::WeightedNoTime(events) => Ok(events),
            other => Err(wrong_type(EventType::WeightedNoTime, other.event_type())),
        }
    }

    // ------------------------------------------------------------------
    // Appending and clearing

    /// Appends one event. The list becomes unsorted.
    ///
    /// Appending a more specialised record promotes the whole list.
    pub fn push<E: StoredEvent>(&mut self, event: E) {
        self.extend(std::slice::from_ref(&event));
    }

    /// Appends events. The list becomes unsorted.
    pub fn extend<E: StoredEvent>(&mut self, events: &[E]) {
        if events.is_empty() {
            return;
        }
        self.promote_to(E::TYPE);
        E::extend_storage(&mut self.events, events);
        self.order = SortOrder::Unsorted;
        self.invalidate_cache();
    }

    /// Appends one event, keeping the current sort order when the event
    /// does not break it.
    pub fn push_in_order<E: StoredEvent>(&mut self, event: E) {
        self.promote_to(E::TYPE);
        let keep = self.extends_order(event.tof(), event.pulse_time());
        E::extend_storage(&mut self.events, std::slice::from_ref(&event));
        if !keep {
            self.order = SortOrder::Unsorted;
        }
        self.invalidate_cache();
    }

    fn extends_order(&self, tof: f64, pulse: Option<PulseTime>) -> bool {
        let last = with_events!(&self.events, events => events.last().map(|e| (e.tof(), e.pulse_time())));
        let Some((last_tof, last_pulse)) = last else {
            return true;
        };
        let tof_ok = last_tof.total_cmp(&tof) != Ordering::Greater;
        match (self.order, last_pulse, pulse) {
            (SortOrder::Unsorted, _, _) => true,
            (SortOrder::TofSort, _, _) => tof_ok,
            (SortOrder::PulseTimeSort, Some(a), Some(b)) => a <= b,
            (SortOrder::PulseTimeTofSort, Some(a), Some(b)) => a < b || (a == b && tof_ok),
            _ => false,
        }
    }

    /// Merges the events and detector IDs of `other` into this list.
    ///
    /// The result has the more specialised of the two event types.
    pub fn append_list(&mut self, other: &EventList) {
        self.detector_ids.extend(other.detector_ids.iter().copied());
        match &other.events {
            EventStorage::Tof(events) => self.extend(events),
            EventStorage::Weighted(events) => self.extend(events),
            EventStorage::WeightedNoTime(events) => self.extend(events),
        }
    }

    /// Reserves capacity for `additional` more events.
    pub fn reserve(&mut self, additional: usize) {
        with_events!(&mut self.events, events => events.reserve(additional));
    }

    /// Removes all events, and optionally the detector IDs.
    pub fn clear(&mut self, remove_detector_ids: bool) {
        with_events!(&mut self.events, events => events.clear());
        self.order = SortOrder::Unsorted;
        if remove_detector_ids {
            self.detector_ids.clear();
        }
        self.invalidate_cache();
    }

    // ------------------------------------------------------------------
    // Type promotion

    /// Promotes the records to `new_type`.
    ///
    /// Unweighted records receive weight 1 and squared error 1; switching
    /// to `WeightedNoTime` drops pulse times.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if `new_type` is less specialised
    /// than the current type.
    pub fn switch_to(&mut self, new_type: EventType) -> Result<()> {
        let current = self.event_type();
        if new_type < current {
            return Err(Error::InvalidState(format!(
                "cannot switch event list from {current} to {new_type}"
            )));
        }
        self.promote_to(new_type);
        Ok(())
    }

    fn promote_to(&mut self, target: EventType) {
        if target <= self.event_type() {
            return;
        }
        self.events.promote(target);
        if !target.has_pulse_time() && self.order.needs_pulse_time() {
            self.order = SortOrder::Unsorted;
        }
    }

    // ------------------------------------------------------------------
    // Sorting

    /// Sorts the records into `order`. Stable; no-op if already sorted so.
    ///
    /// Sorting to [`SortOrder::Unsorted`] does nothing.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] when a pulse-time order is requested
    /// for a list without pulse times.
    pub fn sort(&mut self, order: SortOrder) -> Result<()> {
        if order == self.order || order == SortOrder::Unsorted {
            return Ok(());
        }
        match order {
            SortOrder::Unsorted => {}
            SortOrder::TofSort => {
                with_events!(&mut self.events, events => events.sort_by(cmp_tof));
            }
            SortOrder::PulseTimeSort => match &mut self.events {
                EventStorage::Tof(events) => events.sort_by_key(TimedRecord::pulse),
                EventStorage::Weighted(events) => events.sort_by_key(TimedRecord::pulse),
                EventStorage::WeightedNoTime(_) => return Err(no_pulse_time("sort by pulse time")),
            },
            SortOrder::PulseTimeTofSort => match &mut self.events {
                EventStorage::Tof(events) => events.sort_by(cmp_pulse_tof),
                EventStorage::Weighted(events) => events.sort_by(cmp_pulse_tof),
                EventStorage::WeightedNoTime(_) => {
                    return Err(no_pulse_time("sort by pulse time and TOF"));
                }
            },
        }
        self.order = order;
        Ok(())
    }

    /// Sorts by TOF using `cores` parallel sub-sorts merged afterwards.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] unless `cores` is 1, 2 or 4.
    pub fn sort_tof_parallel(&mut self, cores: usize) -> Result<()> {
        if !matches!(cores, 1 | 2 | 4) {
            return Err(Error::InvalidArgument(format!(
                "cores per sort must be 1, 2 or 4, got {cores}"
            )));
        }
        if self.order == SortOrder::TofSort {
            return Ok(());
        }
        with_events!(&mut self.events, events => sort_tof_fanout(events, cores));
        self.order = SortOrder::TofSort;
        Ok(())
    }

    // ------------------------------------------------------------------
    // TOF and pulse-time access

    /// Copies out the TOF values.
    #[must_use]
    pub fn tofs(&self) -> Vec<f64> {
        with_events!(&self.events, events => events.iter().map(Event::tof).collect())
    }

    /// Overwrites the TOF values. The list becomes unsorted.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the length differs from the
    /// number of events.
    pub fn set_tofs(&mut self, tofs: &[f64]) -> Result<()> {
        if tofs.len() != self.num_events() {
            return Err(Error::InvalidArgument(format!(
                "got {} TOF values for {} events",
                tofs.len(),
                self.num_events()
            )));
        }
        with_events!(&mut self.events, events => {
            for (event, &tof) in events.iter_mut().zip(tofs) {
                *event.tof_mut() = tof;
            }
        });
        self.order = SortOrder::Unsorted;
        self.invalidate_cache();
        Ok(())
    }

    /// Copies out the event weights.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        with_events!(&self.events, events => events.iter().map(Event::weight).collect())
    }

    /// Copies out the event errors (square roots of the squared errors).
    #[must_use]
    pub fn errors(&self) -> Vec<f64> {
        with_events!(&self.events, events => events.iter().map(|e| e.error_squared().sqrt()).collect())
    }

    /// Copies out the pulse times.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for lists without pulse times.
    pub fn pulse_times(&self) -> Result<Vec<PulseTime>> {
        match &self.events {
            EventStorage::Tof(events) => Ok(events.iter().map(TimedRecord::pulse).collect()),
            EventStorage::Weighted(events) => Ok(events.iter().map(TimedRecord::pulse).collect()),
            EventStorage::WeightedNoTime(_) => Err(no_pulse_time("read pulse times")),
        }
    }

    /// Smallest TOF, O(1) when sorted by TOF.
    #[must_use]
    pub fn tof_min(&self) -> Option<f64> {
        let sorted = self.is_sorted_by_tof();
        with_events!(&self.events, events => {
            if sorted {
                events.first().map(Event::tof)
            } else {
                events.iter().map(Event::tof).min_by(f64::total_cmp)
            }
        })
    }

    /// Largest TOF, O(1) when sorted by TOF.
    #[must_use]
    pub fn tof_max(&self) -> Option<f64> {
        let sorted = self.is_sorted_by_tof();
        with_events!(&self.events, events => {
            if sorted {
                events.last().map(Event::tof)
            } else {
                events.iter().map(Event::tof).max_by(f64::total_cmp)
            }
        })
    }

    /// Smallest and largest pulse time; `None` when empty or without pulse
    /// times. O(1) when sorted by pulse time.
    #[must_use]
    pub fn pulse_time_min_max(&self) -> Option<(PulseTime, PulseTime)> {
        let sorted = self.order.needs_pulse_time();
        match &self.events {
            EventStorage::Tof(events) => pulse_bounds(events, sorted),
            EventStorage::Weighted(events) => pulse_bounds(events, sorted),
            EventStorage::WeightedNoTime(_) => None,
        }
    }

    /// Smallest pulse time.
    #[must_use]
    pub fn pulse_time_min(&self) -> Option<PulseTime> {
        self.pulse_time_min_max().map(|(min, _)| min)
    }

    /// Largest pulse time.
    #[must_use]
    pub fn pulse_time_max(&self) -> Option<PulseTime> {
        self.pulse_time_min_max().map(|(_, max)| max)
    }

    /// Earliest time at which any event passed the sample.
    ///
    /// `tof_factor` scales the TOF to the sample position (L1 / (L1 + L2));
    /// `tof_offset` is in seconds.
    #[must_use]
    pub fn time_at_sample_min(&self, tof_factor: f64, tof_offset: f64) -> Option<PulseTime> {
        self.times_at_sample(tof_factor, tof_offset)
            .and_then(Iterator::min)
    }

    /// Latest time at which any event passed the sample.
    #[must_use]
    pub fn time_at_sample_max(&self, tof_factor: f64, tof_offset: f64) -> Option<PulseTime> {
        self.times_at_sample(tof_factor, tof_offset)
            .and_then(Iterator::max)
    }

    fn times_at_sample(
        &self,
        tof_factor: f64,
        tof_offset: f64,
    ) -> Option<Box<dyn Iterator<Item = PulseTime> + '_>> {
        fn at_sample<E: TimedRecord>(
            events: &[E],
            factor: f64,
            offset: f64,
        ) -> Box<dyn Iterator<Item = PulseTime> + '_> {
            Box::new(
                events
                    .iter()
                    .map(move |e| e.pulse().at_sample(e.tof(), factor, offset)),
            )
        }
        match &self.events {
            EventStorage::Tof(events) => Some(at_sample(events, tof_factor, tof_offset)),
            EventStorage::Weighted(events) => Some(at_sample(events, tof_factor, tof_offset)),
            EventStorage::WeightedNoTime(_) => None,
        }
    }

    // ------------------------------------------------------------------
    // TOF transforms and masking

    /// Applies `tof' = tof * factor + offset` to every event.
    ///
    /// A non-negative factor keeps every sort order. A negative factor
    /// reverses TOF-sorted lists so they stay sorted, and demotes
    /// `PulseTimeTofSort` to `PulseTimeSort`.
    pub fn convert_tof(&mut self, factor: f64, offset: f64) {
        if factor < 0.0 {
            match self.order {
                SortOrder::TofSort => with_events!(&mut self.events, events => events.reverse()),
                SortOrder::PulseTimeTofSort => self.order = SortOrder::PulseTimeSort,
                SortOrder::Unsorted | SortOrder::PulseTimeSort => {}
            }
        }
        with_events!(&mut self.events, events => {
            for event in events.iter_mut() {
                let tof = event.tof_mut();
                *tof = *tof * factor + offset;
            }
        });
        self.invalidate_cache();
    }

    /// Multiplies every TOF by `factor`.
    pub fn scale_tof(&mut self, factor: f64) {
        self.convert_tof(factor, 0.0);
    }

    /// Adds `offset` to every TOF.
    pub fn add_tof(&mut self, offset: f64) {
        self.convert_tof(1.0, offset);
    }

    /// Shifts every pulse time by `seconds`. Sort orders are kept.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for lists without pulse times.
    pub fn add_pulse_time(&mut self, seconds: f64) -> Result<()> {
        fn shift<E: TimedRecord>(events: &mut [E], seconds: f64) {
            for event in events {
                let pulse = event.pulse_mut();
                *pulse = pulse.add_seconds(seconds);
            }
        }
        match &mut self.events {
            EventStorage::Tof(events) => shift(events, seconds),
            EventStorage::Weighted(events) => shift(events, seconds),
            EventStorage::WeightedNoTime(_) => return Err(no_pulse_time("shift pulse times")),
        }
        self.invalidate_cache();
        Ok(())
    }

    /// Removes events with `tof_min <= tof <= tof_max`. Order preserving.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `tof_max <= tof_min`.
    pub fn mask_tof(&mut self, tof_min: f64, tof_max: f64) -> Result<()> {
        if tof_max <= tof_min {
            return Err(Error::InvalidArgument(format!(
                "mask range [{tof_min}, {tof_max}] is empty"
            )));
        }
        let sorted = self.is_sorted_by_tof();
        with_events!(&mut self.events, events => {
            if sorted {
                let lo = events.partition_point(|e| e.tof() < tof_min);
                let hi = events.partition_point(|e| e.tof() <= tof_max);
                if lo < hi {
                    events.drain(lo..hi);
                }
            } else {
                events.retain(|e| !(e.tof() >= tof_min && e.tof() <= tof_max));
            }
        });
        self.invalidate_cache();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Integration and histogramming

    /// Sums the weights of events with `min_x <= tof < max_x`, or of all
    /// events when `entire_range` is set (then `min_x`/`max_x` are ignored).
    #[must_use]
    pub fn integrate(&self, min_x: f64, max_x: f64, entire_range: bool) -> f64 {
        let sorted = self.is_sorted_by_tof();
        with_events!(&self.events, events => {
            if entire_range {
                sum_weights(events)
            } else if sorted {
                let lo = events.partition_point(|e| e.tof() < min_x);
                let hi = events.partition_point(|e| e.tof() < max_x);
                if lo < hi {
                    sum_weights(&events[lo..hi])
                } else {
                    0.0
                }
            } else {
                events
                    .iter()
                    .filter(|e| e.tof() >= min_x && e.tof() < max_x)
                    .map(Event::weight)
                    .sum()
            }
        })
    }

    /// Bins the events by TOF on `x`.
    ///
    /// Events outside `[x[0], x[last])` are excluded. TOF-sorted lists are
    /// binned in one linear pass; otherwise each event is located by binary
    /// search. Errors are `sqrt(sum(error^2))` per bin, or zero when
    /// `skip_error` is set.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `x` is negative, not finite or
    /// decreasing.
    pub fn generate_histogram(&self, x: &[f64], skip_error: bool) -> Result<Histogram> {
        check_bin_edges(x)?;
        Ok(self.bin_tof(x, skip_error))
    }

    fn bin_tof(&self, x: &[f64], skip_error: bool) -> Histogram {
        let sorted = self.is_sorted_by_tof();
        with_events!(&self.events, events => bin_events(events, x, sorted, skip_error, Event::tof))
    }

    /// Bins the events by pulse time (nanoseconds) on `x`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for invalid edges and
    /// [`Error::InvalidState`] for lists without pulse times.
    #[allow(clippy::cast_precision_loss)]
    pub fn generate_histogram_pulse_time(&self, x: &[f64], skip_error: bool) -> Result<Histogram> {
        check_bin_edges(x)?;
        let sorted = self.order.needs_pulse_time();
        match &self.events {
            EventStorage::Tof(events) => Ok(bin_events(events, x, sorted, skip_error, |e| {
                e.pulse().as_nanos() as f64
            })),
            EventStorage::Weighted(events) => Ok(bin_events(events, x, sorted, skip_error, |e| {
                e.pulse().as_nanos() as f64
            })),
            EventStorage::WeightedNoTime(_) => Err(no_pulse_time("histogram by pulse time")),
        }
    }

    /// Shared X axis (bin edges) of this list.
    #[must_use]
    pub fn x(&self) -> &Arc<BinEdges> {
        &self.x
    }

    /// Number of bins in the X axis.
    #[must_use]
    pub fn histogram_size(&self) -> usize {
        self.x.num_bins()
    }

    /// Shares `edges` as this list's X axis.
    pub fn set_x(&mut self, edges: Arc<BinEdges>) {
        if !Arc::ptr_eq(&self.x, &edges) {
            self.x = edges;
            self.invalidate_cache();
        }
    }

    /// Edits the X axis in place, copying it first if other lists share it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the edited edges are invalid;
    /// the axis is left unchanged in that case.
    pub fn with_x_mut(&mut self, edit: impl FnOnce(&mut Vec<f64>)) -> Result<()> {
        let mut values = self.x.to_vec();
        edit(&mut values);
        let edges = BinEdges::new(values)?;
        match Arc::get_mut(&mut self.x) {
            Some(owned) => *owned = edges,
            None => self.x = Arc::new(edges),
        }
        self.invalidate_cache();
        Ok(())
    }

    /// Histogram of the events on this list's own X axis, served from the
    /// workspace cache when available.
    #[must_use]
    pub fn histogram(&self) -> Arc<Histogram> {
        self.histogram_on(&self.x)
    }

    /// Histogram of the events on `edges`, served from the workspace cache
    /// when available.
    #[must_use]
    pub fn histogram_on(&self, edges: &Arc<BinEdges>) -> Arc<Histogram> {
        let Some((cache, index)) = self.cache() else {
            return Arc::new(self.bin_tof(edges, false));
        };
        if let Some(hit) = cache.get(index, edges) {
            return hit;
        }
        let histogram = Arc::new(self.bin_tof(edges, false));
        cache.put(index, Arc::clone(edges), Arc::clone(&histogram));
        histogram
    }

    // ------------------------------------------------------------------
    // Arithmetic

    /// Multiplies every weight by `value` with uncertainty `error`.
    ///
    /// `Tof` lists are promoted to `Weighted`. Relative errors add in
    /// quadrature.
    #[allow(clippy::float_cmp)]
    pub fn multiply(&mut self, value: f64, error: f64) {
        if value == 1.0 && error == 0.0 {
            return;
        }
        self.promote_to(EventType::Weighted);
        match &mut self.events {
            EventStorage::Weighted(events) => scale_weights(events, value, error),
            EventStorage::WeightedNoTime(events) => scale_weights(events, value, error),
            EventStorage::Tof(_) => {}
        }
        self.invalidate_cache();
    }

    /// Divides every weight by `value` with uncertainty `error`.
    ///
    /// # Errors
    /// Returns [`Error::DivideByZero`] if `value` is zero; the list is not
    /// modified.
    pub fn divide(&mut self, value: f64, error: f64) -> Result<()> {
        if value == 0.0 {
            return Err(Error::DivideByZero);
        }
        self.multiply(1.0 / value, error / (value * value));
        Ok(())
    }

    /// Multiplies each event by the bin of (`x`, `y`, `e`) containing its
    /// TOF. Events outside the binning are left unchanged.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the edges are invalid or the
    /// histogram shape is inconsistent; the list is not modified.
    pub fn multiply_histogram(&mut self, x: &[f64], y: &[f64], e: &[f64]) -> Result<()> {
        check_bin_edges(x)?;
        check_histogram_shape(x, y, e)?;
        self.promote_to(EventType::Weighted);
        match &mut self.events {
            EventStorage::Weighted(events) => apply_histogram(events, x, y, e, false),
            EventStorage::WeightedNoTime(events) => apply_histogram(events, x, y, e, false),
            EventStorage::Tof(_) => 0,
        };
        self.invalidate_cache();
        Ok(())
    }

    /// Divides each event by the bin of (`x`, `y`, `e`) containing its TOF.
    /// Events outside the binning are left unchanged.
    ///
    /// Events falling in a zero-valued bin get weight 0 and an infinite
    /// squared error. Returns how many events hit a zero divisor.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the edges are invalid or the
    /// histogram shape is inconsistent; the list is not modified.
    pub fn divide_histogram(&mut self, x: &[f64], y: &[f64], e: &[f64]) -> Result<usize> {
        check_bin_edges(x)?;
        check_histogram_shape(x, y, e)?;
        self.promote_to(EventType::Weighted);
        let zero_divisors = match &mut self.events {
            EventStorage::Weighted(events) => apply_histogram(events, x, y, e, true),
            EventStorage::WeightedNoTime(events) => apply_histogram(events, x, y, e, true),
            EventStorage::Tof(_) => 0,
        };
        if zero_divisors > 0 {
            log::warn!(
                "spectrum {}: {zero_divisors} events divided by a zero bin",
                self.spectrum_no
            );
        }
        self.invalidate_cache();
        Ok(zero_divisors)
    }
}

fn record_size<E>(_: &[E]) -> usize {
    size_of::<E>()
}

fn wrong_type(wanted: EventType, actual: EventType) -> Error {
    Error::InvalidState(format!("event list holds {actual} events, not {wanted}"))
}

fn no_pulse_time(operation: &str) -> Error {
    Error::InvalidState(format!(
        "cannot {operation}: {} events carry no pulse time",
        EventType::WeightedNoTime
    ))
}

fn sum_weights<E: Event>(events: &[E]) -> f64 {
    events.iter().map(Event::weight).sum()
}

fn pulse_bounds<E: TimedRecord>(events: &[E], sorted: bool) -> Option<(PulseTime, PulseTime)> {
    if sorted {
        return Some((events.first()?.pulse(), events.last()?.pulse()));
    }
    events.iter().map(TimedRecord::pulse).fold(None, |acc, p| match acc {
        None => Some((p, p)),
        Some((min, max)) => Some((min.min(p), max.max(p))),
    })
}

#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn bin_events<E: Event>(
    events: &[E],
    x: &[f64],
    sorted: bool,
    skip_error: bool,
    key: impl Fn(&E) -> f64,
) -> Histogram {
    if x.len() < 2 {
        return Histogram::default();
    }
    let num_bins = x.len() - 1;
    let mut histogram = Histogram::zeros(num_bins);
    if sorted {
        let (first, last) = (x[0], x[num_bins]);
        let start = events.partition_point(|e| key(e) < first);
        let mut bin = 0;
        for event in &events[start..] {
            let value = key(event);
            if !(value >= first) {
                continue;
            }
            if value >= last {
                break;
            }
            while value >= x[bin + 1] {
                bin += 1;
            }
            histogram.y[bin] += event.weight();
            histogram.e[bin] += event.error_squared();
        }
    } else {
        for event in events {
            if let Some(bin) = find_bin(x, key(event)) {
                histogram.y[bin] += event.weight();
                histogram.e[bin] += event.error_squared();
            }
        }
    }
    if skip_error {
        histogram.e.iter_mut().for_each(|e| *e = 0.0);
    } else {
        histogram.e.iter_mut().for_each(|e| *e = e.sqrt());
    }
    histogram
}

fn scale_weights<E: WeightedRecord>(events: &mut [E], value: f64, error: f64) {
    let value_squared = value * value;
    let error_squared = error * error;
    for event in events {
        let weight = event.weight();
        event.set_weight(
            weight * value,
            event.error_squared() * value_squared + error_squared * weight * weight,
        );
    }
}

#[allow(clippy::float_cmp)]
fn apply_histogram<E: WeightedRecord>(
    events: &mut [E],
    x: &[f64],
    y: &[f64],
    e: &[f64],
    divide: bool,
) -> usize {
    let mut zero_divisors = 0;
    for event in events {
        let Some(bin) = find_bin(x, event.tof()) else {
            continue;
        };
        let (weight, error_squared) = (event.weight(), event.error_squared());
        let (value, value_error) = (y[bin], e[bin]);
        if divide {
            if value == 0.0 {
                event.set_weight(0.0, f64::INFINITY);
                zero_divisors += 1;
                continue;
            }
            let inverse = 1.0 / value;
            let inverse_squared = inverse * inverse;
            let relative = value_error * inverse;
            event.set_weight(
                weight * inverse,
                (error_squared + weight * weight * relative * relative) * inverse_squared,
            );
        } else {
            event.set_weight(
                weight * value,
                error_squared * value * value + weight * weight * value_error * value_error,
            );
        }
    }
    zero_divisors
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_possible_wrap)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tof_list(tofs: &[f64]) -> EventList {
        let events: Vec<TofEvent> = tofs
            .iter()
            .enumerate()
            .map(|(i, &tof)| TofEvent::new(tof, PulseTime(i as i64)))
            .collect();
        EventList::from(events)
    }

    #[test]
    fn test_push_resets_order() {
        let mut list = tof_list(&[3.0, 1.0]);
        list.sort(SortOrder::TofSort).unwrap();
        list.push(TofEvent::new(10.0, PulseTime(0)));
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
        assert_eq!(list.num_events(), 3);
    }

    #[test]
    fn test_push_in_order_keeps_valid_order() {
        let mut list = tof_list(&[3.0, 1.0]);
        list.sort(SortOrder::TofSort).unwrap();
        list.push_in_order(TofEvent::new(3.0, PulseTime(0)));
        assert_eq!(list.sort_order(), SortOrder::TofSort);
        list.push_in_order(TofEvent::new(2.0, PulseTime(0)));
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
    }

    #[test]
    fn test_push_weighted_promotes() {
        let mut list = tof_list(&[1.0]);
        list.push(WeightedEvent::new(2.0, PulseTime(5), 2.0, 4.0));
        assert_eq!(list.event_type(), EventType::Weighted);
        assert_eq!(list.weights(), vec![1.0, 2.0]);
        assert_eq!(list.errors(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_extend_converts_into_stored_type() {
        let mut weighted = EventList::from(vec![WeightedEvent::new(1.0, PulseTime(0), 3.0, 9.0)]);
        weighted.extend(&[TofEvent::new(2.0, PulseTime(1))]);
        assert_eq!(weighted.event_type(), EventType::Weighted);
        assert_eq!(weighted.weights(), vec![3.0, 1.0]);

        let mut no_time = EventList::from(vec![WeightedEventNoTime::new(1.0, 2.0, 4.0)]);
        no_time.extend(&[TofEvent::new(2.0, PulseTime(1))]);
        no_time.extend(&[WeightedEvent::new(3.0, PulseTime(2), 5.0, 25.0)]);
        assert_eq!(no_time.event_type(), EventType::WeightedNoTime);
        assert_eq!(no_time.tofs(), vec![1.0, 2.0, 3.0]);
        assert_eq!(no_time.weights(), vec![2.0, 1.0, 5.0]);
        assert_eq!(no_time.errors(), vec![2.0, 1.0, 5.0]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut list = tof_list(&[5.0, 2.0, 9.0, 2.0]);
        list.sort(SortOrder::TofSort).unwrap();
        let once = list.clone();
        list.sort(SortOrder::TofSort).unwrap();
        assert_eq!(list, once);
        assert_eq!(list.tofs(), vec![2.0, 2.0, 5.0, 9.0]);
    }

    #[test]
    fn test_sort_pulse_time_tof() {
        let mut list = EventList::from(vec![
            TofEvent::new(5.0, PulseTime(2)),
            TofEvent::new(9.0, PulseTime(1)),
            TofEvent::new(1.0, PulseTime(2)),
        ]);
        list.sort(SortOrder::PulseTimeTofSort).unwrap();
        assert_eq!(list.tofs(), vec![9.0, 1.0, 5.0]);
        assert_eq!(
            list.pulse_time_min_max(),
            Some((PulseTime(1), PulseTime(2)))
        );
    }

    #[test]
    fn test_sort_no_time_by_pulse_fails() {
        let mut list = tof_list(&[1.0]);
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert!(matches!(
            list.sort(SortOrder::PulseTimeSort),
            Err(Error::InvalidState(_))
        ));
        assert!(list.sort(SortOrder::TofSort).is_ok());
    }

    #[test]
    fn test_switch_to_is_monotonic() {
        let mut list = tof_list(&[1.0, 2.0]);
        list.switch_to(EventType::Weighted).unwrap();
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert!(matches!(
            list.switch_to(EventType::Tof),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            list.switch_to(EventType::Weighted),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(list.event_type(), EventType::WeightedNoTime);
        assert!(list.pulse_times().is_err());
    }

    #[test]
    fn test_switch_drops_pulse_order() {
        let mut list = tof_list(&[2.0, 1.0]);
        list.sort(SortOrder::PulseTimeSort).unwrap();
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert_eq!(list.sort_order(), SortOrder::Unsorted);

        let mut list = tof_list(&[2.0, 1.0]);
        list.sort(SortOrder::TofSort).unwrap();
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert_eq!(list.sort_order(), SortOrder::TofSort);
    }

    #[test]
    fn test_integrate() {
        let mut list = tof_list(&[0.5, 1.5, 2.5, 3.5]);
        assert_relative_eq!(list.integrate(1.0, 3.0, false), 2.0);
        list.sort(SortOrder::TofSort).unwrap();
        assert_relative_eq!(list.integrate(1.0, 3.0, false), 2.0);
        assert_relative_eq!(list.integrate(1.5, 2.5, false), 1.0);
        assert_relative_eq!(list.integrate(3.0, 1.0, false), 0.0);
        assert_relative_eq!(list.integrate(3.0, 1.0, true), 4.0);
        assert_relative_eq!(list.integrate(f64::NAN, -5.0, true), 4.0);
    }

    #[test]
    fn test_convert_tof_keeps_sort() {
        let mut list = tof_list(&[1.0, 2.0]);
        list.sort(SortOrder::TofSort).unwrap();
        list.convert_tof(2.0, 0.0);
        assert_eq!(list.tofs(), vec![2.0, 4.0]);
        assert_eq!(list.sort_order(), SortOrder::TofSort);
    }

    #[test]
    fn test_negative_factor_reverses_sorted_list() {
        let mut list = tof_list(&[1.0, 2.0, 3.0]);
        list.sort(SortOrder::TofSort).unwrap();
        list.convert_tof(-1.0, 10.0);
        assert_eq!(list.tofs(), vec![7.0, 8.0, 9.0]);
        assert_eq!(list.sort_order(), SortOrder::TofSort);

        let mut list = tof_list(&[1.0, 2.0]);
        list.sort(SortOrder::PulseTimeTofSort).unwrap();
        list.scale_tof(-1.0);
        assert_eq!(list.sort_order(), SortOrder::PulseTimeSort);
    }

    #[test]
    fn test_add_pulse_time() {
        let mut list = tof_list(&[1.0, 2.0]);
        list.add_pulse_time(1.0).unwrap();
        assert_eq!(
            list.pulse_times().unwrap(),
            vec![PulseTime(1_000_000_000), PulseTime(1_000_000_001)]
        );
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert!(list.add_pulse_time(1.0).is_err());
    }

    #[test]
    fn test_mask_tof() {
        let mut unsorted = tof_list(&[4.0, 1.0, 2.0, 3.0, 2.5]);
        let mut sorted = unsorted.clone();
        sorted.sort(SortOrder::TofSort).unwrap();

        unsorted.mask_tof(2.0, 3.0).unwrap();
        sorted.mask_tof(2.0, 3.0).unwrap();
        assert_eq!(unsorted.tofs(), vec![4.0, 1.0]);
        assert_eq!(sorted.tofs(), vec![1.0, 4.0]);
        assert_eq!(sorted.sort_order(), SortOrder::TofSort);
        assert!(matches!(
            sorted.mask_tof(3.0, 3.0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_generate_histogram_simple() {
        let list = tof_list(&[0.5, 1.5, 2.5, 3.5]);
        let hist = list
            .generate_histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], false)
            .unwrap();
        assert_eq!(hist.y, vec![1.0, 1.0, 1.0, 1.0]);
        assert_eq!(hist.e, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_generate_histogram_excludes_out_of_range() {
        let mut list = tof_list(&[-1.0, 0.0, 3.99, 4.0, 7.0, 2.0, 2.0]);
        let x = [0.0, 2.0, 4.0];
        let unsorted = list.generate_histogram(&x, false).unwrap();
        list.sort(SortOrder::TofSort).unwrap();
        let sorted = list.generate_histogram(&x, false).unwrap();
        assert_eq!(unsorted.y, vec![1.0, 3.0]);
        assert_eq!(unsorted, sorted);
        assert_relative_eq!(sorted.e[1], 3.0_f64.sqrt());

        let skipped = list.generate_histogram(&x, true).unwrap();
        assert_eq!(skipped.e, vec![0.0, 0.0]);
        assert!(list.generate_histogram(&[1.0], false).unwrap().is_empty());
    }

    #[test]
    fn test_generate_histogram_pulse_time() {
        let list = tof_list(&[1.0, 1.0, 1.0]);
        let hist = list
            .generate_histogram_pulse_time(&[0.0, 1.0, 3.0], false)
            .unwrap();
        assert_eq!(hist.y, vec![1.0, 2.0]);
    }

    #[test]
    fn test_multiply_and_divide_scalar() {
        let mut list = tof_list(&[1.0, 2.0]);
        list.multiply(2.0, 0.5);
        assert_eq!(list.event_type(), EventType::Weighted);
        assert_eq!(list.weights(), vec![2.0, 2.0]);
        // 1 * 2^2 + 0.5^2 * 1^2
        assert_relative_eq!(list.errors()[0], 4.25_f64.sqrt(), epsilon = 1e-6);

        list.divide(2.0, 0.0).unwrap();
        assert_eq!(list.weights(), vec![1.0, 1.0]);
        assert_eq!(list.divide(0.0, 0.0), Err(Error::DivideByZero));
        assert_eq!(list.weights(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_multiply_histogram() {
        let mut list = tof_list(&[0.5, 1.5, 5.0]);
        list.multiply_histogram(&[0.0, 1.0, 2.0], &[2.0, 3.0], &[0.0, 0.0])
            .unwrap();
        assert_eq!(list.weights(), vec![2.0, 3.0, 1.0]);
        assert!(list
            .multiply_histogram(&[0.0, 1.0], &[2.0, 3.0], &[0.0, 0.0])
            .is_err());
    }

    #[test]
    fn test_divide_histogram_zero_bin() {
        let mut list = tof_list(&[0.5, 1.5, 1.7]);
        let zeros = list
            .divide_histogram(&[0.0, 1.0, 2.0], &[2.0, 0.0], &[0.0, 0.0])
            .unwrap();
        assert_eq!(zeros, 2);
        assert_eq!(list.weights(), vec![0.5, 0.0, 0.0]);
        let errors = list.errors();
        assert!(errors[1].is_infinite());
        assert!(errors[2].is_infinite());
        assert_relative_eq!(errors[0], 0.5);
    }

    #[test]
    fn test_histogram_ops_reject_bad_edges() {
        let mut list = tof_list(&[0.5, 1.5, 3.0]);
        for x in [[-2.0, -1.0, 5.0], [5.0, 1.0, 0.0], [0.0, f64::NAN, 2.0]] {
            assert!(matches!(
                list.generate_histogram(&x, false),
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                list.generate_histogram_pulse_time(&x, false),
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                list.multiply_histogram(&x, &[2.0, 2.0], &[0.0, 0.0]),
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                list.divide_histogram(&x, &[2.0, 2.0], &[0.0, 0.0]),
                Err(Error::InvalidArgument(_))
            ));
        }
        // rejected before promotion
        assert_eq!(list.event_type(), EventType::Tof);
        assert_eq!(list.weights(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_set_tofs_and_minmax() {
        let mut list = tof_list(&[1.0, 2.0, 3.0]);
        list.sort(SortOrder::TofSort).unwrap();
        list.set_tofs(&[9.0, 4.0, 6.0]).unwrap();
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
        assert_eq!(list.tof_min(), Some(4.0));
        assert_eq!(list.tof_max(), Some(9.0));
        assert!(list.set_tofs(&[1.0]).is_err());
        assert_eq!(EventList::new().tof_min(), None);
    }

    #[test]
    fn test_append_list_promotes() {
        let mut a = tof_list(&[1.0]);
        a.add_detector_id(1);
        let mut b = EventList::from(vec![WeightedEventNoTime::new(2.0, 0.5, 0.25)]);
        b.add_detector_id(2);
        a.append_list(&b);
        assert_eq!(a.event_type(), EventType::WeightedNoTime);
        assert_eq!(a.num_events(), 2);
        assert_eq!(a.weights(), vec![1.0, 0.5]);
        assert!(a.has_detector_id(1) && a.has_detector_id(2));
    }

    #[test]
    fn test_x_is_copy_on_write() {
        let shared = Arc::new(BinEdges::linear(0.0, 4.0, 4).unwrap());
        let mut a = EventList::new();
        let mut b = EventList::new();
        a.set_x(Arc::clone(&shared));
        b.set_x(Arc::clone(&shared));
        drop(shared);

        a.with_x_mut(|x| x.push(8.0)).unwrap();
        assert_eq!(a.histogram_size(), 5);
        assert_eq!(b.histogram_size(), 4);
        assert!(!Arc::ptr_eq(a.x(), b.x()));
        assert!(a.with_x_mut(|x| x.push(1.0)).is_err());
        assert_eq!(a.histogram_size(), 5);
    }

    #[test]
    fn test_histogram_uses_cache() {
        let cache = Arc::new(HistogramMru::new(4));
        let mut list = tof_list(&[0.5, 1.5]);
        list.attach_mru(&cache, 0);
        list.set_x(Arc::new(BinEdges::linear(0.0, 2.0, 2).unwrap()));

        let first = list.histogram();
        let second = list.histogram();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 1);

        // mutation drops the cached entry
        list.add_tof(0.25);
        assert!(cache.is_empty());
        assert_eq!(list.histogram().y, vec![1.0, 1.0]);
    }

    #[test]
    fn test_time_at_sample() {
        let list = tof_list(&[1000.0, 10.0]);
        assert_eq!(list.time_at_sample_min(1.0, 0.0), Some(PulseTime(10_001)));
        assert_eq!(list.time_at_sample_max(1.0, 0.0), Some(PulseTime(1_000_000)));
    }

    #[test]
    fn test_clear_and_memory() {
        let mut list = tof_list(&[1.0, 2.0]);
        list.add_detector_id(3);
        assert!(list.memory_size() >= 2 * size_of::<TofEvent>());
        list.clear(false);
        assert!(list.is_empty());
        assert!(list.has_detector_id(3));
        list.clear(true);
        assert!(list.detector_ids().is_empty());
    }

    #[test]
    fn test_parallel_tof_sort_validates_cores() {
        let mut list = tof_list(&[3.0, 1.0, 2.0]);
        assert!(matches!(
            list.sort_tof_parallel(3),
            Err(Error::InvalidArgument(_))
        ));
        list.sort_tof_parallel(2).unwrap();
        assert_eq!(list.tofs(), vec![1.0, 2.0, 3.0]);
        assert!(list.is_sorted_by_tof());
    }
}
