//! A sampling round must survive any subset of failing collectors.
//!
//! The device stub answers only the meminfo query; every other command either
//! panics or stalls past the collector timeout.

use adb_perf_monitor::collectors::{CollectorKind, Collectors};
use adb_perf_monitor::monitor::{collect_round, RoundTarget};
use adb_perf_monitor::{CommandChannel, Metric, RoundStats, Store};
use std::sync::Arc;
use std::time::Duration;

const MEMINFO: &str = "\
** MEMINFO in pid 4321 [com.example.app] **
        TOTAL   215040    180000     20000        0   250000   200000    50000
 App Summary
           Java Heap:    40960
         Native Heap:    30720
                Code:    10240
               Stack:     1024
            Graphics:    20480
       Private Other:     5120
              System:    10240
           TOTAL PSS:   215040
";

fn target() -> RoundTarget {
    RoundTarget {
        pid: 4321,
        package: "com.example.app".to_string(),
    }
}

fn is_meminfo(cmd: &str) -> bool {
    cmd.starts_with("dumpsys meminfo")
}

fn assert_only_memory_present(store: &Store) {
    assert!(store.is_aligned());
    assert_eq!(store.latest(Metric::MemoryTotal), Some(210.0));
    for metric in Metric::ALL {
        if metric != Metric::MemoryTotal {
            assert_eq!(store.latest(metric), None, "{} should be null", metric.name());
        }
    }
    assert!(store.latest_foreground().is_none());
}

#[tokio::test]
async fn test_panicking_collectors_yield_null_entries() {
    let channel: Arc<dyn CommandChannel> = Arc::new(|cmd: &str| -> String {
        if is_meminfo(cmd) {
            MEMINFO.to_string()
        } else {
            panic!("device unreachable: {}", cmd)
        }
    });
    let collectors = Arc::new(Collectors::with_default_timeouts(channel));
    let stats = RoundStats::new();

    let mut store = Store::new(10);
    store.append_round("10:00:00".into(), &Default::default());

    let record = collect_round(&collectors, &target(), Duration::from_secs(5), &stats).await;
    store.append_round("10:00:01".into(), &record);

    assert_eq!(store.timestamps(), vec!["10:00:00", "10:00:01"]);
    assert_eq!(store.series(Metric::MemoryTotal), vec![None, Some(210.0)]);
    assert_eq!(store.series(Metric::Fps), vec![None, None]);
    assert_only_memory_present(&store);

    let detail = store.memory_detail_series();
    assert_eq!(detail.len(), 2);
    assert_eq!(detail[1].map(|d| d.java_heap_mb), Some(40.0));

    for kind in [
        CollectorKind::Cpu,
        CollectorKind::Battery,
        CollectorKind::Network,
        CollectorKind::Frame,
    ] {
        assert_eq!(stats.failures(kind), 1, "{} failure not recorded", kind);
    }
    assert_eq!(stats.failures(CollectorKind::Memory), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_collectors_time_out_to_null_entries() {
    let channel: Arc<dyn CommandChannel> = Arc::new(|cmd: &str| -> String {
        if is_meminfo(cmd) {
            MEMINFO.to_string()
        } else {
            std::thread::sleep(Duration::from_millis(600));
            String::new()
        }
    });
    let collectors = Arc::new(Collectors::with_default_timeouts(channel));
    let stats = RoundStats::new();

    let started = std::time::Instant::now();
    let record = collect_round(&collectors, &target(), Duration::from_millis(200), &stats).await;
    assert!(started.elapsed() < Duration::from_millis(550));

    let mut store = Store::new(10);
    store.append_round("10:00:00".into(), &record);
    assert_eq!(store.len(), 1);
    assert_only_memory_present(&store);

    for kind in CollectorKind::ALL {
        let expected = if kind == CollectorKind::Memory { 0 } else { 1 };
        assert_eq!(stats.failures(kind), expected, "{}", kind);
    }
}
