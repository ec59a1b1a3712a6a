//! The event workspace: one event list per spectrum plus a shared
//! histogram cache.
//!
//! Read-only aggregates (event counts, TOF and pulse-time extrema,
//! integrals) are computed with parallel reductions over the lists.
//! Bulk sorting is delegated to [`SortScheduler`].

use crate::config::WorkspaceConfig;
use crate::Result;
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tofstore_algorithms::{ProgressSink, SortReport, SortScheduler};
use tofstore_core::{
    BinEdges, Error as CoreError, EventList, EventType, Histogram, HistogramMru, MruStats,
    PulseTime, SortOrder,
};

/// An ordered collection of event lists indexed by workspace index.
#[derive(Debug)]
pub struct EventWorkspace {
    lists: Vec<EventList>,
    mru: Arc<HistogramMru>,
    config: WorkspaceConfig,
}

impl EventWorkspace {
    /// Creates `num_spectra` empty `Tof` lists sharing one placeholder X axis.
    ///
    /// List `i` gets spectrum number `i`.
    ///
    /// # Errors
    /// Returns an error if `num_spectra` is 0 or the scheduler
    /// configuration is invalid.
    pub fn new(num_spectra: usize, config: WorkspaceConfig) -> Result<Self> {
        if num_spectra == 0 {
            return Err(CoreError::InvalidArgument(
                "a workspace needs at least one spectrum".to_string(),
            )
            .into());
        }
        config.scheduler.validate()?;

        let mru = Arc::new(HistogramMru::new(config.mru_capacity));
        let x = Arc::new(BinEdges::placeholder());
        let lists = (0..num_spectra)
            .map(|index| {
                let spectrum_no = i32::try_from(index).unwrap_or(i32::MAX);
                let mut list = EventList::with_spectrum_no(spectrum_no);
                list.set_x(Arc::clone(&x));
                list.attach_mru(&mru, index);
                list
            })
            .collect();
        log::debug!(
            "created workspace with {num_spectra} spectra (cache capacity {})",
            config.mru_capacity
        );
        Ok(Self { lists, mru, config })
    }

    /// Creates a workspace with the default configuration.
    ///
    /// # Errors
    /// Returns an error if `num_spectra` is 0.
    pub fn with_spectra(num_spectra: usize) -> Result<Self> {
        Self::new(num_spectra, WorkspaceConfig::default())
    }

    /// Workspace configuration.
    #[must_use]
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Spectrum access

    /// Number of event lists.
    #[must_use]
    pub fn num_histograms(&self) -> usize {
        self.lists.len()
    }

    /// Number of bins in the first list's X axis.
    #[must_use]
    pub fn blocksize(&self) -> usize {
        self.lists.first().map_or(0, EventList::histogram_size)
    }

    /// `num_histograms() * blocksize()`.
    #[must_use]
    pub fn size(&self) -> usize {
        self.lists.len() * self.blocksize()
    }

    /// Event list at `index`.
    ///
    /// # Errors
    /// Returns `IndexOutOfRange` if `index` is not a valid workspace index.
    pub fn spectrum(&self, index: usize) -> Result<&EventList> {
        CoreError::check_index(index, self.lists.len())?;
        Ok(&self.lists[index])
    }

    /// Mutable event list at `index`.
    ///
    /// # Errors
    /// Returns `IndexOutOfRange` if `index` is not a valid workspace index.
    pub fn spectrum_mut(&mut self, index: usize) -> Result<&mut EventList> {
        CoreError::check_index(index, self.lists.len())?;
        Ok(&mut self.lists[index])
    }

    /// All event lists in workspace-index order.
    #[must_use]
    pub fn spectra(&self) -> &[EventList] {
        &self.lists
    }

    /// Applies `op` to every list in parallel, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first error raised by `op`.
    pub fn par_for_each_spectrum_mut<F>(&mut self, op: F) -> Result<()>
    where
        F: Fn(usize, &mut EventList) -> tofstore_core::Result<()> + Send + Sync,
    {
        self.lists
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(index, list)| op(index, list))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregates

    /// Total number of events over all lists.
    #[must_use]
    pub fn num_events(&self) -> usize {
        self.lists.par_iter().map(EventList::num_events).sum()
    }

    /// Approximate heap footprint of the event storage, in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .lists
                .par_iter()
                .map(EventList::memory_size)
                .sum::<usize>()
    }

    /// Most specialised event type present.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.lists
            .iter()
            .map(EventList::event_type)
            .max()
            .unwrap_or(EventType::Tof)
    }

    /// Smallest TOF in the workspace, `None` without events.
    #[must_use]
    pub fn tof_min(&self) -> Option<f64> {
        self.lists
            .par_iter()
            .filter_map(EventList::tof_min)
            .reduce_with(f64::min)
    }

    /// Largest TOF in the workspace, `None` without events.
    #[must_use]
    pub fn tof_max(&self) -> Option<f64> {
        self.lists
            .par_iter()
            .filter_map(EventList::tof_max)
            .reduce_with(f64::max)
    }

    /// Smallest and largest TOF in one parallel pass.
    #[must_use]
    pub fn tof_min_max(&self) -> Option<(f64, f64)> {
        self.lists
            .par_iter()
            .filter_map(|list| Some((list.tof_min()?, list.tof_max()?)))
            .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }

    /// Earliest pulse time; lists without pulse times are ignored.
    #[must_use]
    pub fn pulse_time_min(&self) -> Option<PulseTime> {
        self.lists
            .par_iter()
            .filter_map(EventList::pulse_time_min)
            .min()
    }

    /// Latest pulse time; lists without pulse times are ignored.
    #[must_use]
    pub fn pulse_time_max(&self) -> Option<PulseTime> {
        self.lists
            .par_iter()
            .filter_map(EventList::pulse_time_max)
            .max()
    }

    /// Earliest and latest pulse time in one parallel pass.
    #[must_use]
    pub fn pulse_time_min_max(&self) -> Option<(PulseTime, PulseTime)> {
        self.lists
            .par_iter()
            .filter_map(EventList::pulse_time_min_max)
            .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }

    /// Earliest time at which any event passed the sample.
    ///
    /// `tof_factors[i]` scales the TOFs of list `i` to the sample position;
    /// `tof_offset` is in seconds.
    ///
    /// # Errors
    /// Returns `InvalidArgument` unless there is one factor per list.
    pub fn time_at_sample_min(
        &self,
        tof_factors: &[f64],
        tof_offset: f64,
    ) -> Result<Option<PulseTime>> {
        self.check_factors(tof_factors)?;
        Ok(self
            .lists
            .par_iter()
            .zip(tof_factors)
            .filter_map(|(list, &factor)| list.time_at_sample_min(factor, tof_offset))
            .min())
    }

    /// Latest time at which any event passed the sample.
    ///
    /// # Errors
    /// Returns `InvalidArgument` unless there is one factor per list.
    pub fn time_at_sample_max(
        &self,
        tof_factors: &[f64],
        tof_offset: f64,
    ) -> Result<Option<PulseTime>> {
        self.check_factors(tof_factors)?;
        Ok(self
            .lists
            .par_iter()
            .zip(tof_factors)
            .filter_map(|(list, &factor)| list.time_at_sample_max(factor, tof_offset))
            .max())
    }

    fn check_factors(&self, tof_factors: &[f64]) -> Result<()> {
        if tof_factors.len() != self.lists.len() {
            return Err(CoreError::InvalidArgument(format!(
                "expected {} TOF factors, got {}",
                self.lists.len(),
                tof_factors.len()
            ))
            .into());
        }
        Ok(())
    }

    /// Integrated weight of each list over `[min_x, max_x)`, or over all
    /// events when `entire_range` is set.
    #[must_use]
    pub fn integrated_spectra(&self, min_x: f64, max_x: f64, entire_range: bool) -> Vec<f64> {
        self.lists
            .par_iter()
            .map(|list| list.integrate(min_x, max_x, entire_range))
            .collect()
    }

    // ------------------------------------------------------------------
    // Event type and sorting

    /// Converts every list to `new_type`.
    ///
    /// No list is touched if any of them would be demoted.
    ///
    /// # Errors
    /// Returns `InvalidState` if a list already holds a more specialised type.
    pub fn switch_event_type(&mut self, new_type: EventType) -> Result<()> {
        if let Some(index) = self
            .lists
            .iter()
            .position(|list| list.event_type() > new_type)
        {
            return Err(CoreError::InvalidState(format!(
                "cannot switch spectrum {index} from {} to {new_type}",
                self.lists[index].event_type()
            ))
            .into());
        }
        self.lists
            .par_iter_mut()
            .try_for_each(|list| list.switch_to(new_type))?;
        Ok(())
    }

    /// Common sort order of all lists, or `Unsorted` if any two differ.
    #[must_use]
    pub fn sort_type(&self) -> SortOrder {
        let mut orders = self.lists.iter().map(EventList::sort_order);
        let Some(first) = orders.next() else {
            return SortOrder::Unsorted;
        };
        if orders.all(|order| order == first) {
            first
        } else {
            SortOrder::Unsorted
        }
    }

    /// Sorts every list into `order` on the configured worker pool.
    ///
    /// Returns immediately, reporting all lists as done, when the
    /// workspace is already uniformly in `order`.
    ///
    /// # Errors
    /// Returns the scheduler error if configuration is invalid or a sort
    /// task fails.
    pub fn sort_all(
        &mut self,
        order: SortOrder,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<SortReport> {
        self.sort_all_cancellable(order, progress, None)
    }

    /// Like [`Self::sort_all`], stopping between lists once `cancel` is set.
    ///
    /// # Errors
    /// Returns `Cancelled` with the number of lists finished if interrupted.
    pub fn sort_all_cancellable(
        &mut self,
        order: SortOrder,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SortReport> {
        if self.sort_type() == order {
            log::debug!("workspace already in {order}, skipping sort");
            if let Some(progress) = progress {
                progress.report_increment(self.lists.len(), "Sorting");
            }
            return Ok(SortReport::skipped(order, self.lists.len()));
        }
        let scheduler = SortScheduler::new(self.config.scheduler.clone());
        let report = scheduler.sort_with(&mut self.lists, order, progress, cancel)?;
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Binning and cache

    /// Gives every list the same shared X axis and empties the cache.
    pub fn set_all_x(&mut self, edges: BinEdges) {
        let shared = Arc::new(edges);
        for list in &mut self.lists {
            list.set_x(Arc::clone(&shared));
        }
        self.mru.clear();
    }

    /// Histogram of list `index` on `x`, computed without the cache.
    ///
    /// # Errors
    /// Returns `IndexOutOfRange` for an invalid index, or `InvalidArgument`
    /// for invalid edges.
    pub fn generate_histogram(&self, index: usize, x: &[f64], skip_error: bool) -> Result<Histogram> {
        Ok(self.spectrum(index)?.generate_histogram(x, skip_error)?)
    }

    /// Histogram of the pulse times of list `index` on `x`.
    ///
    /// # Errors
    /// Returns `IndexOutOfRange` for an invalid index, or `InvalidState` if
    /// the list has no pulse times.
    pub fn generate_histogram_pulse_time(
        &self,
        index: usize,
        x: &[f64],
        skip_error: bool,
    ) -> Result<Histogram> {
        Ok(self
            .spectrum(index)?
            .generate_histogram_pulse_time(x, skip_error)?)
    }

    /// Histogram of list `index` on its own X axis, through the cache.
    ///
    /// # Errors
    /// Returns `IndexOutOfRange` for an invalid index.
    pub fn histogram(&self, index: usize) -> Result<Arc<Histogram>> {
        Ok(self.spectrum(index)?.histogram())
    }

    /// Histograms currently cached.
    #[must_use]
    pub fn mru_size(&self) -> usize {
        self.mru.len()
    }

    /// Drops every cached histogram.
    pub fn clear_mru(&self) {
        self.mru.clear();
    }

    /// Cache hit, miss and eviction counters.
    #[must_use]
    pub fn mru_stats(&self) -> MruStats {
        self.mru.stats()
    }

    /// Cache capacity.
    #[must_use]
    pub fn mru_capacity(&self) -> usize {
        self.mru.capacity()
    }
}

impl Clone for EventWorkspace {
    /// Deep-copies every list and binds the copies to a new, empty cache.
    fn clone(&self) -> Self {
        let mru = Arc::new(HistogramMru::new(self.mru.capacity()));
        let lists = self
            .lists
            .iter()
            .enumerate()
            .map(|(index, list)| {
                let mut copy = list.clone();
                copy.attach_mru(&mru, index);
                copy
            })
            .collect();
        Self {
            lists,
            mru,
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::Error;
    use tofstore_core::{TofEvent, WeightedEventNoTime};

    fn workspace(n: usize) -> EventWorkspace {
        EventWorkspace::new(n, WorkspaceConfig::default().with_workers(2)).unwrap()
    }

    #[test]
    fn test_new_rejects_zero_spectra() {
        assert!(matches!(
            EventWorkspace::with_spectra(0),
            Err(Error::Core(CoreError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn test_new_initialises_lists() {
        let ws = workspace(3);
        assert_eq!(ws.num_histograms(), 3);
        assert_eq!(ws.blocksize(), 1);
        assert_eq!(ws.size(), 3);
        assert_eq!(ws.num_events(), 0);
        assert_eq!(ws.event_type(), EventType::Tof);
        assert_eq!(ws.spectrum(2).unwrap().spectrum_no(), 2);
        assert_eq!(ws.spectrum(0).unwrap().x().to_vec(), vec![0.0, f64::MIN_POSITIVE]);
        assert!(Arc::ptr_eq(
            ws.spectrum(0).unwrap().x(),
            ws.spectrum(2).unwrap().x()
        ));
    }

    #[test]
    fn test_spectrum_bounds() {
        let mut ws = workspace(2);
        assert!(matches!(
            ws.spectrum(2),
            Err(Error::Core(CoreError::IndexOutOfRange { index: 2, len: 2 }))
        ));
        assert!(ws.spectrum_mut(5).is_err());
    }

    #[test]
    fn test_extrema_and_empty_lists() {
        let mut ws = workspace(3);
        assert_eq!(ws.tof_min(), None);
        ws.spectrum_mut(0)
            .unwrap()
            .extend(&[TofEvent::new(5.0, PulseTime(30)), TofEvent::new(2.0, PulseTime(10))]);
        ws.spectrum_mut(2)
            .unwrap()
            .extend(&[TofEvent::new(9.0, PulseTime(20))]);
        assert_eq!(ws.tof_min(), Some(2.0));
        assert_eq!(ws.tof_max(), Some(9.0));
        assert_eq!(ws.tof_min_max(), Some((2.0, 9.0)));
        assert_eq!(ws.pulse_time_min(), Some(PulseTime(10)));
        assert_eq!(ws.pulse_time_max(), Some(PulseTime(30)));
        assert_eq!(ws.pulse_time_min_max(), Some((PulseTime(10), PulseTime(30))));
    }

    #[test]
    fn test_time_at_sample_needs_one_factor_per_list() {
        let mut ws = workspace(2);
        ws.spectrum_mut(1)
            .unwrap()
            .push(TofEvent::new(1000.0, PulseTime(0)));
        assert!(ws.time_at_sample_min(&[1.0], 0.0).is_err());
        // 1000 us at factor 0.5 is 500 us = 500_000 ns
        assert_eq!(
            ws.time_at_sample_min(&[1.0, 0.5], 0.0).unwrap(),
            Some(PulseTime(500_000))
        );
    }

    #[test]
    fn test_switch_event_type_is_all_or_nothing() {
        let mut ws = workspace(2);
        ws.spectrum_mut(1)
            .unwrap()
            .push(WeightedEventNoTime::new(1.0, 1.0, 1.0));
        assert_eq!(ws.event_type(), EventType::WeightedNoTime);
        assert!(ws.switch_event_type(EventType::Weighted).is_err());
        assert_eq!(ws.spectrum(0).unwrap().event_type(), EventType::Tof);

        ws.switch_event_type(EventType::WeightedNoTime).unwrap();
        assert!(ws
            .spectra()
            .iter()
            .all(|list| list.event_type() == EventType::WeightedNoTime));
    }

    #[test]
    fn test_sort_type_disagreement() {
        let mut ws = workspace(2);
        ws.spectrum_mut(0).unwrap().sort(SortOrder::TofSort).unwrap();
        assert_eq!(ws.sort_type(), SortOrder::Unsorted);
        ws.spectrum_mut(1).unwrap().sort(SortOrder::TofSort).unwrap();
        assert_eq!(ws.sort_type(), SortOrder::TofSort);
    }

    #[test]
    fn test_histogram_cache_is_shared() {
        let mut ws = workspace(2);
        ws.set_all_x(BinEdges::linear(0.0, 4.0, 4).unwrap());
        for tof in [0.5, 1.5, 2.5, 3.5] {
            ws.spectrum_mut(0)
                .unwrap()
                .push(TofEvent::new(tof, PulseTime(0)));
        }
        assert_eq!(ws.histogram(0).unwrap().y, vec![1.0, 1.0, 1.0, 1.0]);
        ws.histogram(0).unwrap();
        ws.histogram(1).unwrap();
        assert_eq!(ws.mru_size(), 2);
        assert_eq!(ws.mru_stats().hits, 1);

        ws.set_all_x(BinEdges::linear(0.0, 4.0, 2).unwrap());
        assert_eq!(ws.mru_size(), 0);
        assert_eq!(ws.histogram(0).unwrap().y, vec![2.0, 2.0]);
    }

    #[test]
    fn test_par_for_each_spectrum_mut() {
        let mut ws = workspace(4);
        ws.par_for_each_spectrum_mut(|index, list| {
            list.push(TofEvent::new(index as f64, PulseTime(0)));
            Ok(())
        })
        .unwrap();
        assert_eq!(ws.num_events(), 4);
        assert_eq!(ws.integrated_spectra(0.0, 0.0, true), vec![1.0; 4]);

        let result = ws.par_for_each_spectrum_mut(|_, list| list.mask_tof(1.0, 0.0));
        assert!(matches!(
            result,
            Err(Error::Core(CoreError::InvalidArgument(_)))
        ));
    }
}
