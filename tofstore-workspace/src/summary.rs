//! JSON summaries of a workspace.

use crate::{EventWorkspace, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tofstore_core::{EventList, EventType, MruStats, PulseTime, SortOrder};

/// Per-spectrum statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSummary {
    /// Workspace index.
    pub index: usize,
    /// Spectrum number.
    pub spectrum_no: i32,
    /// Number of events.
    pub num_events: usize,
    /// Record type held by the list.
    pub event_type: EventType,
    /// Current sort order.
    pub sort_order: SortOrder,
    /// Smallest and largest TOF, if any events.
    pub tof_range: Option<(f64, f64)>,
}

impl SpectrumSummary {
    fn new(index: usize, list: &EventList) -> Self {
        Self {
            index,
            spectrum_no: list.spectrum_no(),
            num_events: list.num_events(),
            event_type: list.event_type(),
            sort_order: list.sort_order(),
            tof_range: list.tof_min().zip(list.tof_max()),
        }
    }
}

/// Snapshot of a workspace's aggregate state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    /// Number of event lists.
    pub num_spectra: usize,
    /// Total number of events.
    pub num_events: usize,
    /// Most specialised record type present.
    pub event_type: EventType,
    /// Common sort order, or `Unsorted` if the lists disagree.
    pub sort_order: SortOrder,
    /// Bins in the first list's X axis.
    pub blocksize: usize,
    /// Global TOF range.
    pub tof_range: Option<(f64, f64)>,
    /// Global pulse-time range.
    pub pulse_time_range: Option<(PulseTime, PulseTime)>,
    /// Approximate memory used by the events, in bytes.
    pub memory_bytes: usize,
    /// Histogram cache capacity.
    pub mru_capacity: usize,
    /// Histograms currently cached.
    pub mru_size: usize,
    /// Cache counters.
    pub mru_stats: MruStats,
    /// Per-spectrum details; empty unless requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spectra: Vec<SpectrumSummary>,
}

impl WorkspaceSummary {
    /// Serialises the summary as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the summary as JSON to `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        log::debug!("wrote workspace summary to {}", path.as_ref().display());
        Ok(())
    }
}

impl EventWorkspace {
    /// Collects aggregate statistics, with per-spectrum rows when
    /// `per_spectrum` is set.
    #[must_use]
    pub fn summary(&self, per_spectrum: bool) -> WorkspaceSummary {
        let spectra = if per_spectrum {
            self.spectra()
                .iter()
                .enumerate()
                .map(|(index, list)| SpectrumSummary::new(index, list))
                .collect()
        } else {
            Vec::new()
        };
        WorkspaceSummary {
            num_spectra: self.num_histograms(),
            num_events: self.num_events(),
            event_type: self.event_type(),
            sort_order: self.sort_type(),
            blocksize: self.blocksize(),
            tof_range: self.tof_min_max(),
            pulse_time_range: self.pulse_time_min_max(),
            memory_bytes: self.memory_size(),
            mru_capacity: self.mru_capacity(),
            mru_size: self.mru_size(),
            mru_stats: self.mru_stats(),
            spectra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tofstore_core::TofEvent;

    #[test]
    fn test_summary_fields() {
        let mut ws = EventWorkspace::with_spectra(2).unwrap();
        ws.spectrum_mut(1)
            .unwrap()
            .extend(&[TofEvent::new(3.0, PulseTime(7)), TofEvent::new(1.0, PulseTime(9))]);
        let summary = ws.summary(true);
        assert_eq!(summary.num_spectra, 2);
        assert_eq!(summary.num_events, 2);
        assert_eq!(summary.tof_range, Some((1.0, 3.0)));
        assert_eq!(summary.pulse_time_range, Some((PulseTime(7), PulseTime(9))));
        assert_eq!(summary.spectra.len(), 2);
        assert_eq!(summary.spectra[0].tof_range, None);

        let json = summary.to_json().unwrap();
        let parsed: WorkspaceSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, summary);
    }

    #[test]
    fn test_summary_omits_empty_spectra() {
        let ws = EventWorkspace::with_spectra(1).unwrap();
        let json = ws.summary(false).to_json().unwrap();
        assert!(!json.contains("\"spectra\""));
        assert!(json.contains("\"mru_capacity\": 50"));
    }
}
