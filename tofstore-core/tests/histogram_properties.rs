#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::float_cmp
)]
use std::sync::Arc;
use tofstore_core::{
    BinEdges, EventList, EventType, HistogramMru, PulseTime, SortOrder, TofEvent, WeightedEvent,
};

// Deterministic pseudo-random TOFs spread over [0, 20000) with a few
// values outside the binning on both sides.
fn scattered_tofs(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let raw = (i as u64).wrapping_mul(2_654_435_761) % 21_000;
            raw as f64 - 500.0 + 0.25
        })
        .collect()
}

fn weighted_list(n: usize) -> EventList {
    let events: Vec<WeightedEvent> = scattered_tofs(n)
        .into_iter()
        .enumerate()
        .map(|(i, tof)| {
            // dyadic weights keep every partial sum exactly representable
            let weight = 0.5 * ((i % 4) + 1) as f32;
            WeightedEvent::new(tof, PulseTime(i as i64), weight, weight * weight)
        })
        .collect();
    EventList::from(events)
}

#[test]
fn sorted_and_unsorted_histograms_match() {
    let edges = BinEdges::linear(0.0, 20_000.0, 137).unwrap();
    let unsorted = weighted_list(5_000);
    let mut sorted = unsorted.clone();
    sorted.sort(SortOrder::TofSort).unwrap();

    let a = unsorted.generate_histogram(&edges, false).unwrap();
    let b = sorted.generate_histogram(&edges, false).unwrap();
    assert_eq!(a.len(), 137);
    for (ya, yb) in a.y.iter().zip(&b.y) {
        assert_eq!(ya.to_bits(), yb.to_bits());
    }
    for (ea, eb) in a.e.iter().zip(&b.e) {
        assert_eq!(ea.to_bits(), eb.to_bits());
    }
}

#[test]
fn parallel_tof_sort_matches_serial() {
    let base = weighted_list(20_000);
    let mut serial = base.clone();
    serial.sort(SortOrder::TofSort).unwrap();
    for cores in [2, 4] {
        let mut parallel = base.clone();
        parallel.sort_tof_parallel(cores).unwrap();
        assert_eq!(parallel, serial, "{cores}-core sort differs");
    }
}

#[test]
fn integrate_matches_histogram_total() {
    let mut list = weighted_list(3_000);
    let edges = BinEdges::linear(1_000.0, 9_000.0, 8).unwrap();
    let total = list.generate_histogram(&edges, true).unwrap().total();
    assert_eq!(list.integrate(1_000.0, 9_000.0, false), total);
    list.sort(SortOrder::TofSort).unwrap();
    assert_eq!(list.integrate(1_000.0, 9_000.0, false), total);
}

#[test]
fn cache_with_capacity_one_recomputes_after_eviction() {
    let cache = Arc::new(HistogramMru::new(1));
    let mut list = EventList::from(vec![
        TofEvent::new(0.5, PulseTime(0)),
        TofEvent::new(1.5, PulseTime(0)),
    ]);
    list.attach_mru(&cache, 0);

    let coarse = Arc::new(BinEdges::linear(0.0, 2.0, 1).unwrap());
    let fine = Arc::new(BinEdges::linear(0.0, 2.0, 2).unwrap());

    assert_eq!(list.histogram_on(&coarse).y, vec![2.0]);
    assert_eq!(list.histogram_on(&fine).y, vec![1.0, 1.0]);
    assert_eq!(cache.len(), 1);
    assert_eq!(list.histogram_on(&coarse).y, vec![2.0]);

    let stats = cache.stats();
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.evictions, 2);
}

#[test]
fn promotion_chain_and_demotion() {
    let mut list = EventList::from(vec![TofEvent::new(1.0, PulseTime(1))]);
    list.switch_to(EventType::Weighted).unwrap();
    list.switch_to(EventType::WeightedNoTime).unwrap();
    assert!(list.switch_to(EventType::Tof).is_err());
    assert_eq!(list.weights(), vec![1.0]);
    assert_eq!(list.errors(), vec![1.0]);
}
