//! Seeded synthetic event workspaces for benchmarks and summaries.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tofstore_core::{EventList, EventType, PulseTime, TofEvent, WeightedEvent, WeightedEventNoTime};
use tofstore_workspace::{EventWorkspace, WorkspaceConfig};

/// 60 Hz source.
const PULSE_PERIOD_NS: i64 = 16_666_667;

/// Shape of a generated workspace.
#[derive(Clone, Debug)]
pub struct SynthShape {
    pub spectra: usize,
    /// Mean events per spectrum; actual counts vary between 0.5x and 1.5x.
    pub events_per_spectrum: usize,
    pub event_type: EventType,
    pub tof_max: f64,
    pub pulses: i64,
    pub seed: u64,
}

impl Default for SynthShape {
    fn default() -> Self {
        Self {
            spectra: 1000,
            events_per_spectrum: 2000,
            event_type: EventType::Tof,
            tof_max: 20_000.0,
            pulses: 600,
            seed: 42,
        }
    }
}

/// Builds a workspace filled with unsorted events.
///
/// Every spectrum has its own generator derived from the seed, so the
/// contents do not depend on the thread count.
pub fn build_workspace(
    shape: &SynthShape,
    config: WorkspaceConfig,
) -> tofstore_workspace::Result<EventWorkspace> {
    let mut ws = EventWorkspace::new(shape.spectra, config)?;
    ws.par_for_each_spectrum_mut(|index, list| {
        let stream = shape.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(stream);
        fill_list(shape, list, &mut rng);
        list.add_detector_id(list.spectrum_no());
        Ok(())
    })?;
    log::debug!(
        "generated {} events over {} spectra",
        ws.num_events(),
        ws.num_histograms()
    );
    Ok(ws)
}

fn fill_list(shape: &SynthShape, list: &mut EventList, rng: &mut StdRng) {
    let low = shape.events_per_spectrum / 2;
    let high = shape.events_per_spectrum + low;
    let count = if high > low {
        rng.random_range(low..=high)
    } else {
        shape.events_per_spectrum
    };
    let pulses = shape.pulses.max(1);
    list.reserve(count);

    for _ in 0..count {
        let tof = rng.random_range(0.0..shape.tof_max);
        let pulse = PulseTime::from_nanos(rng.random_range(0..pulses) * PULSE_PERIOD_NS);
        let weight: f32 = rng.random_range(0.5..1.5);
        match shape.event_type {
            EventType::Tof => list.push(TofEvent::new(tof, pulse)),
            EventType::Weighted => {
                list.push(WeightedEvent::new(tof, pulse, weight, weight * weight));
            }
            EventType::WeightedNoTime => {
                list.push(WeightedEventNoTime::new(tof, weight, weight * weight));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SynthShape {
        SynthShape {
            spectra: 6,
            events_per_spectrum: 40,
            ..SynthShape::default()
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = build_workspace(&small(), WorkspaceConfig::default()).unwrap();
        let b = build_workspace(&small(), WorkspaceConfig::default()).unwrap();
        assert_eq!(a.spectra(), b.spectra());
        assert!(a.num_events() >= 6 * 20);
        assert!(a.num_events() <= 6 * 60);
    }

    #[test]
    fn test_event_type_respected() {
        let shape = SynthShape {
            event_type: EventType::WeightedNoTime,
            ..small()
        };
        let ws = build_workspace(&shape, WorkspaceConfig::default()).unwrap();
        assert_eq!(ws.event_type(), EventType::WeightedNoTime);
        let (lo, hi) = ws.tof_min_max().unwrap();
        assert!(lo >= 0.0 && hi < shape.tof_max);
    }
}
