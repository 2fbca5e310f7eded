//! Foreground application detection.
//!
//! Three independent device queries are tried in order (focused window,
//! resumed activity, top activity), each bounded by its own timeout. The first
//! query that yields a plausible package wins. Display name and pid are looked
//! up concurrently afterwards with a shorter budget and are best-effort.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::channel::CommandChannel;
use crate::sample::Sample;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_INFO_TIMEOUT: Duration = Duration::from_millis(1500);

const FOCUS_QUERY: &str = "dumpsys window windows | grep -E \"mCurrentFocus|mFocusedApp\" | head -3";
const RESUMED_QUERY: &str =
    "dumpsys activity activities | grep -E \"mResumedActivity|ResumedActivity\" | head -3";
const TOP_QUERY: &str = "dumpsys activity top | head -30";

const SYSTEM_PREFIXES: [&str; 5] = [
    "com.android.",
    "com.google.",
    "com.samsung.",
    "com.miui.",
    "com.xiaomi.",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

static FOCUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"mCurrentFocus.*?\{.*?\s+([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
        r"mFocusedApp.*?\{.*?\s+([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
        r"mCurrentFocus.*?\{.*?\s+([a-zA-Z0-9._]+)\s",
    ])
});

static RESUMED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"mResumedActivity.*?\{.*?\s+([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
        r"ResumedActivity.*?\{.*?\s+([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
        r"RESUMED.*?([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
        r"ActivityRecord\{.*?\s+([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
    ])
});

static TOP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let mut patterns = compile(&[
        r"ACTIVITY.*?\s([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
        r"ActivityRecord\{.*?\s+([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+)",
    ]);
    patterns.push(
        RegexBuilder::new(r"([a-zA-Z0-9._]+)/([a-zA-Z0-9._$]+).*?state=RESUMED")
            .case_insensitive(true)
            .build()
            .expect("valid regex"),
    );
    patterns
});

static LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"label=([^,\s]+)").expect("valid regex"));

/// Which query identified the foreground app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForegroundSource {
    Focus,
    Resumed,
    Top,
}

impl ForegroundSource {
    pub fn name(self) -> &'static str {
        match self {
            ForegroundSource::Focus => "focus",
            ForegroundSource::Resumed => "resumed",
            ForegroundSource::Top => "top",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForegroundApp {
    pub package_name: String,
    /// `package/activity`, or the bare package when no activity was reported.
    pub activity_name: String,
    pub app_name: String,
    pub pid: Option<u32>,
    pub is_system_app: bool,
    pub source: ForegroundSource,
}

/// Package and activity matched by one of the queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundMatch {
    pub package_name: String,
    pub activity_name: String,
    pub source: ForegroundSource,
}

pub struct ForegroundAppCollector {
    channel: Arc<dyn CommandChannel>,
    query_timeout: Duration,
    info_timeout: Duration,
}

impl ForegroundAppCollector {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self::with_timeouts(channel, DEFAULT_QUERY_TIMEOUT, DEFAULT_INFO_TIMEOUT)
    }

    pub fn with_timeouts(
        channel: Arc<dyn CommandChannel>,
        query_timeout: Duration,
        info_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            query_timeout,
            info_timeout,
        }
    }

    /// Stateless; kept so every collector resets the same way.
    pub fn reset(&self) {}

    #[instrument(skip(self))]
    pub async fn sample(&self) -> Sample<ForegroundApp> {
        let queries: [(&str, fn(&str) -> Option<ForegroundMatch>); 3] = [
            (FOCUS_QUERY, parse_focus),
            (RESUMED_QUERY, parse_resumed),
            (TOP_QUERY, parse_top),
        ];

        let mut found = None;
        for (query, parse) in queries {
            if let Some(output) = self.run(query.to_string(), self.query_timeout).await {
                if let Some(m) = parse(&output) {
                    found = Some(m);
                    break;
                }
            }
        }

        let Some(found) = found else {
            debug!("No foreground app detected");
            return Sample::NoData;
        };

        let label_cmd = format!(
            "dumpsys package {} | grep -m 1 \"label\" | head -1",
            found.package_name
        );
        let pid_cmd = format!(
            "ps -A | grep -m 1 {} | grep -v grep | head -1",
            found.package_name
        );
        let (label, ps) = tokio::join!(
            self.run(label_cmd, self.info_timeout),
            self.run(pid_cmd, self.info_timeout)
        );

        let app_name = label
            .as_deref()
            .and_then(parse_label)
            .unwrap_or_else(|| found.package_name.clone());
        let pid = ps.as_deref().and_then(parse_ps_pid);

        Sample::Value(ForegroundApp {
            is_system_app: is_system_app(&found.package_name),
            package_name: found.package_name,
            activity_name: found.activity_name,
            app_name,
            pid,
            source: found.source,
        })
    }

    /// Runs one command on the blocking pool, bounded by `limit`.
    async fn run(&self, command: String, limit: Duration) -> Option<String> {
        let channel = self.channel.clone();
        let task = tokio::task::spawn_blocking(move || channel.execute(&command));
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(output)) if !output.trim().is_empty() => Some(output),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!("Foreground query task failed: {}", e);
                None
            }
            Err(_) => {
                debug!("Foreground query exceeded {}ms", limit.as_millis());
                None
            }
        }
    }
}

fn is_valid_package(package: &str) -> bool {
    package != "null" && !package.contains("StatusBar") && package.contains('.') && package.len() > 3
}

pub fn is_system_app(package: &str) -> bool {
    SYSTEM_PREFIXES.iter().any(|prefix| package.starts_with(prefix))
}

fn first_match(patterns: &[Regex], output: &str, source: ForegroundSource) -> Option<ForegroundMatch> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(output)?;
        let package = caps.get(1)?.as_str();
        if !is_valid_package(package) {
            return None;
        }
        let activity_name = match caps.get(2) {
            Some(activity) if !activity.as_str().is_empty() => {
                format!("{}/{}", package, activity.as_str())
            }
            _ => package.to_string(),
        };
        Some(ForegroundMatch {
            package_name: package.to_string(),
            activity_name,
            source,
        })
    })
}

pub fn parse_focus(output: &str) -> Option<ForegroundMatch> {
    first_match(&FOCUS_PATTERNS, output, ForegroundSource::Focus)
}

pub fn parse_resumed(output: &str) -> Option<ForegroundMatch> {
    first_match(&RESUMED_PATTERNS, output, ForegroundSource::Resumed)
}

pub fn parse_top(output: &str) -> Option<ForegroundMatch> {
    first_match(&TOP_PATTERNS, output, ForegroundSource::Top)
}

pub fn parse_label(output: &str) -> Option<String> {
    LABEL_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Pid from the second column of a `ps -A` line.
pub fn parse_ps_pid(output: &str) -> Option<u32> {
    output
        .lines()
        .find(|l| !l.trim().is_empty())?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_LINE: &str =
        "u0_a123      4321   600 15071300 182340 0                   0 S com.example.app\n";

    #[test]
    fn test_parse_focus() {
        let out = "  mCurrentFocus=Window{a1b2c3 u0 com.example.app/com.example.app.MainActivity}\n  mFocusedApp=ActivityRecord{d4e5 u0 com.example.app/.MainActivity t12}\n";
        let m = parse_focus(out).expect("focus match");
        assert_eq!(m.package_name, "com.example.app");
        assert_eq!(m.activity_name, "com.example.app/com.example.app.MainActivity");
        assert_eq!(m.source, ForegroundSource::Focus);
    }

    #[test]
    fn test_parse_focus_rejects_status_bar_and_null() {
        assert!(parse_focus("mCurrentFocus=Window{a1 u0 StatusBar}\n").is_none());
        assert!(parse_focus("mCurrentFocus=null\n").is_none());
    }

    #[test]
    fn test_parse_resumed() {
        let out = "    mResumedActivity: ActivityRecord{7f1e u0 com.tencent.mm/.ui.LauncherUI t301}\n";
        let m = parse_resumed(out).expect("resumed match");
        assert_eq!(m.package_name, "com.tencent.mm");
        assert_eq!(m.activity_name, "com.tencent.mm/.ui.LauncherUI");
        assert_eq!(m.source, ForegroundSource::Resumed);
    }

    #[test]
    fn test_parse_top() {
        let out = "TASK 10 id=42 userId=0\n  ACTIVITY com.example.game/.GameActivity 5c2 pid=9876\n";
        let m = parse_top(out).expect("top match");
        assert_eq!(m.package_name, "com.example.game");
        assert_eq!(m.activity_name, "com.example.game/.GameActivity");
        assert_eq!(m.source, ForegroundSource::Top);
    }

    #[test]
    fn test_system_app_prefixes() {
        assert!(is_system_app("com.android.settings"));
        assert!(is_system_app("com.miui.home"));
        assert!(!is_system_app("com.example.app"));
    }

    #[test]
    fn test_parse_label_and_pid() {
        assert_eq!(
            parse_label("    applicationInfo label=WeChat icon=0x7f0"),
            Some("WeChat".to_string())
        );
        assert_eq!(parse_label(""), None);
        assert_eq!(parse_ps_pid(PS_LINE), Some(4321));
        assert_eq!(parse_ps_pid(""), None);
    }

    #[tokio::test]
    async fn test_sample_falls_back_to_resumed_query() {
        let channel: Arc<dyn CommandChannel> = Arc::new(|cmd: &str| {
            if cmd == RESUMED_QUERY {
                "mResumedActivity: ActivityRecord{1 u0 com.android.settings/.Settings t2}\n".to_string()
            } else if cmd.starts_with("dumpsys package com.android.settings") {
                "label=Settings".to_string()
            } else if cmd.starts_with("ps -A") {
                "system  2222  600 0 0 0 0 S com.android.settings\n".to_string()
            } else {
                String::new()
            }
        });

        let app = ForegroundAppCollector::new(channel)
            .sample()
            .await
            .value()
            .expect("resumed activity detected");
        assert_eq!(app.package_name, "com.android.settings");
        assert_eq!(app.app_name, "Settings");
        assert_eq!(app.pid, Some(2222));
        assert!(app.is_system_app);
        assert_eq!(app.source, ForegroundSource::Resumed);
    }

    #[tokio::test]
    async fn test_slow_query_is_skipped() {
        let channel: Arc<dyn CommandChannel> = Arc::new(|cmd: &str| {
            if cmd == FOCUS_QUERY {
                std::thread::sleep(Duration::from_millis(300));
                "mCurrentFocus=Window{1 u0 com.slow.app/.Main}".to_string()
            } else if cmd == TOP_QUERY {
                "ACTIVITY com.fast.app/.Main 1 pid=1".to_string()
            } else {
                String::new()
            }
        });

        let collector = ForegroundAppCollector::with_timeouts(
            channel,
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let app = collector.sample().await.value().expect("top query detected");
        assert_eq!(app.package_name, "com.fast.app");
        assert_eq!(app.app_name, "com.fast.app");
        assert_eq!(app.pid, None);
    }

    #[tokio::test]
    async fn test_nothing_detected_is_no_data() {
        let channel: Arc<dyn CommandChannel> = Arc::new(|_cmd: &str| String::new());
        assert!(ForegroundAppCollector::new(channel).sample().await.is_no_data());
    }
}
