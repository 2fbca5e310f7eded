//! Store alignment across mixed round outcomes.

use adb_perf_monitor::collectors::{FrameStats, MemoryUsage};
use adb_perf_monitor::{Metric, RoundRecord, Sample, Store};

fn round(memory: Option<f64>, fps: Option<u32>) -> RoundRecord {
    RoundRecord {
        memory: memory.map_or(Sample::NoData, |total_pss_mb| {
            Sample::Value(MemoryUsage { total_pss_mb })
        }),
        frame: fps.map_or(Sample::NoData, |fps| {
            Sample::Value(FrameStats { fps, jank_count: 0 })
        }),
        ..RoundRecord::default()
    }
}

#[test]
fn test_gaps_stay_in_place_across_eviction() {
    let mut store = Store::new(4);
    let rounds = [
        round(Some(100.0), Some(60)),
        round(None, Some(58)),
        round(Some(102.0), None),
        round(None, None),
        round(Some(105.0), Some(59)),
        round(Some(106.0), None),
    ];

    for (i, record) in rounds.iter().enumerate() {
        store.append_round(format!("10:00:{:02}", i), record);
        assert!(store.is_aligned());
    }

    assert_eq!(store.len(), 4);
    assert_eq!(
        store.timestamps(),
        vec!["10:00:02", "10:00:03", "10:00:04", "10:00:05"]
    );
    assert_eq!(
        store.series(Metric::MemoryTotal),
        vec![Some(102.0), None, Some(105.0), Some(106.0)]
    );
    assert_eq!(
        store.series(Metric::Fps),
        vec![None, None, Some(59.0), None]
    );
    assert_eq!(store.latest(Metric::Fps), None);
    assert_eq!(store.series(Metric::CpuApp), vec![None; 4]);
}

#[test]
fn test_repair_after_out_of_band_writes() {
    let mut store = Store::new(10);
    store.append_round("10:00:00".into(), &round(Some(100.0), Some(60)));

    // A writer that skips the round path leaves the store ragged
    store.push_timestamp("10:00:01".into());
    store.push_value(Metric::MemoryTotal, Some(101.0));
    store.push_value(Metric::MemoryTotal, Some(999.0));
    assert!(!store.is_aligned());

    let repaired = store.ensure_aligned();
    // memory_total was trimmed; the other scalars and both typed series were padded
    assert_eq!(repaired, Metric::ALL.len() + 2);
    assert!(store.is_aligned());
    assert_eq!(
        store.series(Metric::MemoryTotal),
        vec![Some(100.0), Some(101.0)]
    );
    assert_eq!(store.series(Metric::Fps), vec![Some(60.0), None]);
    assert_eq!(store.ensure_aligned(), 0);
}

#[test]
fn test_shrinking_capacity_keeps_newest_rounds() {
    let mut store = Store::new(0);
    for i in 0..10 {
        store.append_round(format!("10:00:{:02}", i), &round(Some(i as f64), None));
    }
    assert_eq!(store.len(), 10);

    store.set_capacity(3);
    assert!(store.is_aligned());
    assert_eq!(
        store.series(Metric::MemoryTotal),
        vec![Some(7.0), Some(8.0), Some(9.0)]
    );
    assert_eq!(store.memory_detail_series().len(), 3);
}
