//! Memory collector based on `dumpsys meminfo <pid>`.
//!
//! Stateless: every call issues one meminfo query and extracts labelled KB
//! values, converted to MB with two decimals.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::sample::{round2, Sample};

static TOTAL_PSS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"TOTAL\s+(\d+)").expect("valid regex"));
static TOTAL_PSS_LABELLED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TOTAL PSS:\s*(\d+)").expect("valid regex"));

/// App summary labels and the detail field each one feeds.
static DETAIL_RES: Lazy<[Regex; 7]> = Lazy::new(|| {
    [
        r"Java Heap:\s*(\d+)",
        r"Native Heap:\s*(\d+)",
        r"Code:\s*(\d+)",
        r"Stack:\s*(\d+)",
        r"Graphics:\s*(\d+)",
        r"Private Other:\s*(\d+)",
        r"System:\s*(\d+)",
    ]
    .map(|p| Regex::new(p).expect("valid regex"))
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total_pss_mb: f64,
}

/// App summary breakdown from meminfo, all values in MB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryDetail {
    pub java_heap_mb: f64,
    pub native_heap_mb: f64,
    pub code_mb: f64,
    pub stack_mb: f64,
    pub graphics_mb: f64,
    pub private_other_mb: f64,
    pub system_mb: f64,
}

/// Total and detail parsed from a single meminfo query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReport {
    pub total: Sample<MemoryUsage>,
    pub detail: Sample<MemoryDetail>,
}

pub struct MemoryCollector {
    channel: Arc<dyn CommandChannel>,
}

impl MemoryCollector {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    fn query(&self, pid: u32) -> Option<String> {
        let output = self.channel.execute(&format!("dumpsys meminfo {}", pid));
        if output.trim().is_empty() {
            warn!("Empty meminfo output for pid {}", pid);
            None
        } else {
            Some(output)
        }
    }

    pub fn sample(&self, pid: u32) -> Sample<MemoryUsage> {
        self.query(pid)
            .and_then(|output| parse_total_pss(&output))
            .into()
    }

    pub fn sample_detailed(&self, pid: u32) -> Sample<MemoryDetail> {
        self.query(pid).map(|output| parse_detail(&output)).into()
    }

    /// Total and detail from one query; used by the sampling round.
    pub fn sample_report(&self, pid: u32) -> MemoryReport {
        match self.query(pid) {
            Some(output) => MemoryReport {
                total: parse_total_pss(&output).into(),
                detail: Sample::Value(parse_detail(&output)),
            },
            None => MemoryReport {
                total: Sample::NoData,
                detail: Sample::NoData,
            },
        }
    }
}

fn kb_to_mb(kb: u64) -> f64 {
    round2(kb as f64 / 1024.0)
}

fn capture_kb(re: &Regex, output: &str) -> Option<u64> {
    re.captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extracts the total PSS in MB, or `None` if no total line is present.
pub fn parse_total_pss(output: &str) -> Option<MemoryUsage> {
    let kb = capture_kb(&TOTAL_PSS_RE, output).or_else(|| capture_kb(&TOTAL_PSS_LABELLED_RE, output));
    match kb {
        Some(kb) => Some(MemoryUsage {
            total_pss_mb: kb_to_mb(kb),
        }),
        None => {
            debug!("No TOTAL PSS line in meminfo output");
            None
        }
    }
}

/// Extracts the app summary; missing labels default to 0 individually.
pub fn parse_detail(output: &str) -> MemoryDetail {
    let [java, native, code, stack, graphics, private_other, system] =
        DETAIL_RES.each_ref().map(|re| capture_kb(re, output).map(kb_to_mb).unwrap_or(0.0));

    MemoryDetail {
        java_heap_mb: java,
        native_heap_mb: native,
        code_mb: code,
        stack_mb: stack,
        graphics_mb: graphics,
        private_other_mb: private_other,
        system_mb: system,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = r#"Applications Memory Usage (in Kilobytes):
Uptime: 123456 Realtime: 123456

** MEMINFO in pid 4321 [com.example.app] **
                   Pss  Private  Private  SwapPss     Heap     Heap     Heap
                 Total    Dirty    Clean    Dirty     Size    Alloc     Free
                ------   ------   ------   ------   ------   ------   ------
  Native Heap    20480    20400        0        0    30000    25000     5000
  Dalvik Heap    10240    10200        0        0    20000    15000     5000
        TOTAL   102400    80000    10000        0    50000    40000    10000

 App Summary
                       Pss(KB)
                        ------
           Java Heap:    15360
         Native Heap:    20480
                Code:     5120
               Stack:      512
            Graphics:    30720
       Private Other:     2048
              System:    28160
"#;

    #[test]
    fn test_parse_total_pss() {
        let usage = parse_total_pss(MEMINFO).expect("total present");
        assert_eq!(usage.total_pss_mb, 100.0);
    }

    #[test]
    fn test_parse_total_pss_labelled_layout() {
        let usage = parse_total_pss(" TOTAL PSS:   51234 TOTAL RSS: 90000").expect("total present");
        assert_eq!(usage.total_pss_mb, 50.03);
    }

    #[test]
    fn test_parse_detail() {
        let detail = parse_detail(MEMINFO);
        assert_eq!(detail.java_heap_mb, 15.0);
        assert_eq!(detail.native_heap_mb, 20.0);
        assert_eq!(detail.code_mb, 5.0);
        assert_eq!(detail.stack_mb, 0.5);
        assert_eq!(detail.graphics_mb, 30.0);
        assert_eq!(detail.private_other_mb, 2.0);
        assert_eq!(detail.system_mb, 27.5);
    }

    #[test]
    fn test_parse_detail_missing_fields_default_to_zero() {
        let detail = parse_detail("           Java Heap:    2048\n");
        assert_eq!(detail.java_heap_mb, 2.0);
        assert_eq!(detail.graphics_mb, 0.0);
        assert_eq!(detail.system_mb, 0.0);
    }

    #[test]
    fn test_sample_report_single_query() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let channel: Arc<dyn CommandChannel> = Arc::new(move |_cmd: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            MEMINFO.to_string()
        });

        let report = MemoryCollector::new(channel).sample_report(4321);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.total.value().map(|u| u.total_pss_mb), Some(100.0));
        assert!(!report.detail.is_no_data());
    }

    #[test]
    fn test_empty_output_is_no_data() {
        let channel: Arc<dyn CommandChannel> = Arc::new(|_cmd: &str| String::new());
        let collector = MemoryCollector::new(channel);
        assert!(collector.sample(1).is_no_data());
        assert!(collector.sample_detailed(1).is_no_data());
        let report = collector.sample_report(1);
        assert!(report.total.is_no_data());
        assert!(report.detail.is_no_data());
    }
}
