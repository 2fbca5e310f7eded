//! Frame-rate and jank collector.
//!
//! Reads the compositor's per-surface frame latency ring buffer
//! (`dumpsys SurfaceFlinger --latency`) and clears it after every read, so each
//! round only sees frames composited since the previous one. Frame pacing is
//! taken from the middle (actual present) timestamp of each tuple.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::channel::CommandChannel;
use crate::collectors::RoundState;

/// Marks a frame whose fence has not signalled yet.
pub const PENDING_FENCE_TIMESTAMP: i64 = i64::MAX;

/// Fixed jank threshold, roughly ten 60 Hz frame periods.
pub const JANK_THRESHOLD_SECS: f64 = 0.166;

/// Absolute floor for the adaptive rule, two 60 Hz frame periods.
pub const TWO_FRAME_SECS: f64 = 0.0833;

const NANOS_PER_SECOND: f64 = 1e9;

// Window{<hash> [u<user>] <package>[/<activity>]}
static FOCUS_WINDOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"mCurrentFocus.*?\{\S+\s+(?:u\d+\s+)?([^\s/}]+)(?:/([^\s}]+))?")
        .expect("valid regex")
});
static TOP_ACTIVITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ACTIVITY\s+([^\s/]+)/([^\s}]+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub fps: u32,
    pub jank_count: u32,
}

impl FrameStats {
    const EMPTY: FrameStats = FrameStats { fps: 0, jank_count: 0 };
}

/// One composited frame, timestamps in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimestamps {
    pub desired_present: f64,
    pub actual_present: f64,
    pub frame_ready: f64,
}

/// Parsed `--latency` output.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyReport {
    pub refresh_period_secs: f64,
    pub frames: Vec<FrameTimestamps>,
}

#[derive(Debug)]
struct FrameState {
    first_round: bool,
    /// Newest actual-present timestamp accepted in an earlier round.
    last_timestamp: Option<f64>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            first_round: true,
            last_timestamp: None,
        }
    }
}

pub struct FrameCollector {
    channel: Arc<dyn CommandChannel>,
    state: RoundState<FrameState>,
}

impl FrameCollector {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            channel,
            state: RoundState::new(),
        }
    }

    pub fn reset(&self) {
        self.state.reset();
    }

    pub fn sample(&self, package: Option<&str>) -> FrameStats {
        let epoch = self.state.epoch();
        let Some(package) = package.map(str::trim).filter(|p| !p.is_empty()) else {
            return FrameStats::EMPTY;
        };

        let Some(surface) = self.resolve_surface(package) else {
            debug!("No surface resolved for {}", package);
            return FrameStats::EMPTY;
        };
        debug!("Sampling frames of surface {}", surface);

        self.state
            .with_current(epoch, |state| self.read_frames(state, &surface))
            .unwrap_or_else(|| {
                debug!("Frame sample of {} outlived a reset, discarded", surface);
                FrameStats::EMPTY
            })
    }

    /// Reads and clears the latency buffer of `surface`.
    fn read_frames(&self, state: &mut FrameState, surface: &str) -> FrameStats {
        if state.first_round {
            self.clear_latency(surface);
            state.first_round = false;
            state.last_timestamp = None;
            return FrameStats::EMPTY;
        }

        let output = self
            .channel
            .execute(&format!("dumpsys SurfaceFlinger --latency \"{}\"", surface));
        self.clear_latency(surface);

        let report = match parse_latency(&output) {
            Some(report) if report.frames.len() >= 2 => report,
            _ => return FrameStats::EMPTY,
        };

        let mids: Vec<f64> = report
            .frames
            .iter()
            .map(|f| f.actual_present)
            .filter(|&t| state.last_timestamp.map_or(true, |last| t > last))
            .collect();

        if mids.len() < 2 {
            return FrameStats::EMPTY;
        }

        state.last_timestamp = mids.last().copied();
        compute_frame_stats(&mids)
    }

    fn clear_latency(&self, surface: &str) {
        self.channel
            .execute(&format!("dumpsys SurfaceFlinger --latency-clear \"{}\"", surface));
    }

    /// Focused window, then the top activity, then the compositor's layer list.
    fn resolve_surface(&self, package: &str) -> Option<String> {
        let focus = self
            .channel
            .execute("dumpsys window windows | grep -E \"mCurrentFocus\"");
        if let Some(window) = parse_focus_window(&focus, package) {
            return Some(window);
        }

        let top = self.channel.execute("dumpsys activity top | head -30");
        if let Some(window) = parse_top_activity(&top, package) {
            return Some(window);
        }

        let layers = self
            .channel
            .execute(&format!("dumpsys SurfaceFlinger --list | grep {}", package));
        pick_layer(&layers, package)
    }
}

/// Escapes `$` so inner-class window names survive the device shell.
fn escape_window_name(name: &str) -> String {
    name.replace('$', "\\$")
}

pub fn parse_focus_window(output: &str, package: &str) -> Option<String> {
    let caps = FOCUS_WINDOW_RE.captures(output)?;
    let focus_package = caps.get(1)?.as_str();
    if !focus_package.contains(package) {
        debug!("Focused window {} does not belong to {}", focus_package, package);
        return None;
    }

    let window = match caps.get(2) {
        Some(activity) => format!("{}/{}", focus_package, activity.as_str()),
        None => focus_package.to_string(),
    };
    Some(escape_window_name(&window))
}

pub fn parse_top_activity(output: &str, package: &str) -> Option<String> {
    TOP_ACTIVITY_RE
        .captures_iter(output)
        .find(|caps| caps[1].contains(package))
        .map(|caps| escape_window_name(&format!("{}/{}", &caps[1], &caps[2])))
}

/// Prefers a SurfaceView layer of the package, else the last listed layer.
pub fn pick_layer(output: &str, package: &str) -> Option<String> {
    let layers: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    layers
        .iter()
        .find(|l| l.contains("SurfaceView") && l.contains(package))
        .or_else(|| layers.last())
        .map(|l| l.to_string())
}

/// Parses `dumpsys SurfaceFlinger --latency` output.
///
/// The first line is the refresh period in nanoseconds; every following line
/// with exactly three integers is one frame. Pending frames (any field equal
/// to [`PENDING_FENCE_TIMESTAMP`]) and empty `0 0 0` slots are dropped.
/// Returns `None` when the refresh period line is missing, malformed or zero.
pub fn parse_latency(output: &str) -> Option<LatencyReport> {
    let mut lines = output.lines();
    let period_line = lines.next()?.trim();
    if period_line.is_empty() || !period_line.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let refresh_period_ns = period_line.parse::<i64>().ok()?;
    if refresh_period_ns == 0 {
        return None;
    }
    let refresh_period_secs = refresh_period_ns as f64 / NANOS_PER_SECOND;

    let frames = lines
        .filter_map(|line| {
            let fields: Vec<i64> = line
                .split_whitespace()
                .map(|f| f.parse::<i64>())
                .collect::<Result<_, _>>()
                .ok()?;
            if fields.len() != 3 {
                return None;
            }
            if fields.contains(&PENDING_FENCE_TIMESTAMP) || fields.iter().all(|&f| f == 0) {
                return None;
            }
            Some(FrameTimestamps {
                desired_present: fields[0] as f64 / NANOS_PER_SECOND,
                actual_present: fields[1] as f64 / NANOS_PER_SECOND,
                frame_ready: fields[2] as f64 / NANOS_PER_SECOND,
            })
        })
        .collect();

    Some(LatencyReport {
        refresh_period_secs,
        frames,
    })
}

/// FPS and jank over an ordered list of present timestamps (seconds).
pub fn compute_frame_stats(timestamps: &[f64]) -> FrameStats {
    let count = timestamps.len();
    match count {
        0 => FrameStats::EMPTY,
        1 => FrameStats { fps: 1, jank_count: 0 },
        _ => {
            let seconds = timestamps[count - 1] - timestamps[0];
            if seconds <= 0.0 {
                return FrameStats { fps: 1, jank_count: 0 };
            }
            let fps = ((count - 1) as f64 / seconds).round() as u32;
            let jank_count = if count <= 4 {
                count_jank_fixed(timestamps)
            } else {
                count_jank_adaptive(timestamps)
            };
            FrameStats { fps, jank_count }
        }
    }
}

/// Counts frame gaps longer than [`JANK_THRESHOLD_SECS`].
pub fn count_jank_fixed(timestamps: &[f64]) -> u32 {
    timestamps
        .windows(2)
        .filter(|w| w[1] - w[0] > JANK_THRESHOLD_SECS)
        .count() as u32
}

/// Adaptive jank count for five or more frames.
///
/// The first four frames use the fixed threshold. From index 4 on, a frame is
/// janky when its gap exceeds twice the mean of the three preceding gaps and
/// also exceeds [`TWO_FRAME_SECS`].
pub fn count_jank_adaptive(timestamps: &[f64]) -> u32 {
    let head = timestamps.len().min(4);
    let mut jank = count_jank_fixed(&timestamps[..head]);

    for i in 4..timestamps.len() {
        let local_threshold = (timestamps[i - 1] - timestamps[i - 4]) / 3.0 * 2.0;
        let gap = timestamps[i] - timestamps[i - 1];
        if gap > local_threshold && gap > TWO_FRAME_SECS {
            jank += 1;
        }
    }
    jank
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{mpsc, Mutex};
    use std::thread;

    const FOCUS: &str =
        "  mCurrentFocus=Window{3b1c2d u0 com.example.game/com.example.game.MainActivity}\n";

    /// Builds `--latency` output from actual-present times in milliseconds.
    fn latency_output(present_ms: &[u64]) -> String {
        let mut out = String::from("16666666\n");
        for ms in present_ms {
            let ns = ms * 1_000_000;
            out.push_str(&format!("{}\t{}\t{}\n", ns - 1_000, ns, ns + 1_000));
        }
        out
    }

    /// Channel that resolves the focus window and serves queued latency dumps.
    fn scripted(latency: Vec<String>) -> (Arc<dyn CommandChannel>, Arc<Mutex<Vec<String>>>) {
        let queue = Mutex::new(VecDeque::from(latency));
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let channel: Arc<dyn CommandChannel> = Arc::new(move |cmd: &str| {
            seen.lock().unwrap().push(cmd.to_string());
            if cmd.starts_with("dumpsys window windows") {
                FOCUS.to_string()
            } else if cmd.starts_with("dumpsys SurfaceFlinger --latency \"") {
                queue.lock().unwrap().pop_front().unwrap_or_default()
            } else {
                String::new()
            }
        });
        (channel, log)
    }

    #[test]
    fn test_parse_latency_drops_pending_and_empty_slots() {
        let output = format!(
            "16666666\n0\t0\t0\n1000\t2000\t3000\n{max}\t{max}\t{max}\n4000\t{max}\t6000\n7000\t8000\t9000\n",
            max = i64::MAX
        );
        let report = parse_latency(&output).expect("valid period");
        assert!((report.refresh_period_secs - 0.016666666).abs() < 1e-12);
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.frames[0].actual_present, 2000.0 / 1e9);
        assert_eq!(report.frames[1].frame_ready, 9000.0 / 1e9);
    }

    #[test]
    fn test_parse_latency_requires_period() {
        assert!(parse_latency("").is_none());
        assert!(parse_latency("garbage\n1 2 3\n").is_none());
    }

    #[test]
    fn test_fixed_threshold_boundary() {
        // gaps of 100ms and 200ms
        assert_eq!(compute_frame_stats(&[1.0, 1.1, 1.3]).jank_count, 1);
        // gaps of 100ms and 150ms
        assert_eq!(compute_frame_stats(&[1.0, 1.1, 1.25]).jank_count, 0);
    }

    #[test]
    fn test_fps() {
        let timestamps: Vec<f64> = (0..61).map(|i| i as f64 / 60.0).collect();
        let stats = compute_frame_stats(&timestamps);
        assert_eq!(stats.fps, 60);
        assert_eq!(stats.jank_count, 0);
    }

    #[test]
    fn test_degenerate_frame_sets() {
        assert_eq!(compute_frame_stats(&[]), FrameStats { fps: 0, jank_count: 0 });
        assert_eq!(compute_frame_stats(&[2.0]), FrameStats { fps: 1, jank_count: 0 });
        assert_eq!(compute_frame_stats(&[2.0, 2.0, 2.0]), FrameStats { fps: 1, jank_count: 0 });
    }

    #[test]
    fn test_adaptive_jank() {
        // Steady 16ms pacing, then one 100ms hitch at index 5
        let ts = [0.0, 0.016, 0.032, 0.048, 0.064, 0.164, 0.180];
        assert_eq!(count_jank_adaptive(&ts), 1);
        assert_eq!(compute_frame_stats(&ts).jank_count, 1);

        // A gap above twice the local mean but below the two-frame floor is not jank
        let ts = [0.0, 0.010, 0.020, 0.030, 0.040, 0.110];
        assert_eq!(count_jank_adaptive(&ts), 0);
    }

    #[test]
    fn test_adaptive_jank_uses_fixed_rule_for_head() {
        // 200ms gap inside the first four frames
        let ts = [0.0, 0.2, 0.216, 0.232, 0.248, 0.264];
        assert_eq!(count_jank_adaptive(&ts), 1);
    }

    #[test]
    fn test_first_round_clears_and_returns_zero() {
        let (channel, log) = scripted(vec![]);
        let collector = FrameCollector::new(channel);
        assert_eq!(collector.sample(Some("com.example.game")), FrameStats::default());

        let log = log.lock().unwrap();
        assert!(log.iter().any(|c| c
            == "dumpsys SurfaceFlinger --latency-clear \"com.example.game/com.example.game.MainActivity\""));
        assert!(!log.iter().any(|c| c.starts_with("dumpsys SurfaceFlinger --latency \"")));
    }

    #[test]
    fn test_monotonic_filter_rejects_seen_frames() {
        let round1 = latency_output(&[1000, 1016, 1033, 1050]);
        let round2 = latency_output(&[1016, 1033, 1050]);
        let (channel, _log) = scripted(vec![round1, round2]);
        let collector = FrameCollector::new(channel);

        collector.sample(Some("com.example.game"));
        let stats = collector.sample(Some("com.example.game"));
        assert_eq!(stats.fps, 60);

        let stats = collector.sample(Some("com.example.game"));
        assert_eq!(stats, FrameStats { fps: 0, jank_count: 0 });
    }

    #[test]
    fn test_surface_fallbacks() {
        assert_eq!(
            parse_focus_window(FOCUS, "com.example.game").as_deref(),
            Some("com.example.game/com.example.game.MainActivity")
        );
        assert!(parse_focus_window(FOCUS, "com.other").is_none());

        let focus = "mCurrentFocus=Window{1 u0 com.example.game/com.example.game.Outer$Inner}";
        assert_eq!(
            parse_focus_window(focus, "com.example.game").as_deref(),
            Some("com.example.game/com.example.game.Outer\\$Inner")
        );

        let top = "TASK 123 id=5\n  ACTIVITY com.example.game/.MainActivity 9f3a pid=4321\n";
        assert_eq!(
            parse_top_activity(top, "com.example.game").as_deref(),
            Some("com.example.game/.MainActivity")
        );

        let layers = "com.example.game/com.example.game.MainActivity#0\nSurfaceView - com.example.game/com.example.game.MainActivity#0\nBackground for SurfaceView - com.example.game#1\n";
        assert_eq!(
            pick_layer(layers, "com.example.game").as_deref(),
            Some("SurfaceView - com.example.game/com.example.game.MainActivity#0")
        );
        assert_eq!(
            pick_layer("a.b.c#0\na.b.c#1\n", "a.b.c").as_deref(),
            Some("a.b.c#1")
        );
        assert!(pick_layer("", "a.b.c").is_none());
    }

    #[test]
    fn test_unresolved_surface_is_zero() {
        let channel: Arc<dyn CommandChannel> = Arc::new(|_cmd: &str| String::new());
        let collector = FrameCollector::new(channel);
        assert_eq!(collector.sample(Some("com.example.game")), FrameStats::default());
        assert_eq!(collector.sample(None), FrameStats::default());
    }

    #[test]
    fn test_zero_refresh_period_is_zero_stats() {
        let mut output = latency_output(&[1000, 1016, 1033]);
        output.replace_range(..8, "0");
        assert!(output.starts_with("0\n"));
        assert!(parse_latency(&output).is_none());

        let (channel, _log) = scripted(vec![output]);
        let collector = FrameCollector::new(channel);
        collector.sample(Some("com.example.game"));
        assert_eq!(collector.sample(Some("com.example.game")), FrameStats::EMPTY);
    }

    #[test]
    fn test_sample_in_flight_across_reset_keeps_first_round() {
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let gate = Mutex::new(Some((entered_tx, release_rx)));
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let channel: Arc<dyn CommandChannel> = Arc::new(move |cmd: &str| -> String {
            seen.lock().unwrap().push(cmd.to_string());
            if cmd.starts_with("dumpsys window windows") {
                // Only the first surface lookup blocks
                if let Some((entered, release)) = gate.lock().unwrap().take() {
                    entered.send(()).unwrap();
                    release.recv().unwrap();
                }
                FOCUS.to_string()
            } else {
                String::new()
            }
        });
        let collector = Arc::new(FrameCollector::new(channel));

        let in_flight = {
            let collector = collector.clone();
            thread::spawn(move || collector.sample(Some("com.example.game")))
        };
        entered_rx.recv().unwrap();
        collector.reset();
        release_tx.send(()).unwrap();
        assert_eq!(in_flight.join().unwrap(), FrameStats::EMPTY);

        // The discarded sample must not have used up the first round
        log.lock().unwrap().clear();
        collector.sample(Some("com.example.game"));
        let log = log.lock().unwrap();
        assert!(log.iter().any(|c| c.starts_with("dumpsys SurfaceFlinger --latency-clear")));
        assert!(!log.iter().any(|c| c.starts_with("dumpsys SurfaceFlinger --latency \"")));
    }
}
