//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with the session state and all available endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let session = state.monitor.session();
    let target = session.target_package.as_deref().unwrap_or("-");
    let status = if session.is_running { "running" } else { "idle" };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>adb-perf-monitor</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            line-height: 1.6;
        }}
        .container {{
            max-width: 900px;
            margin: 0 auto;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{ color: #333; border-bottom: 3px solid #3ddc84; padding-bottom: 15px; }}
        .info {{
            background: #e9ecef;
            padding: 15px;
            border-radius: 4px;
            display: flex;
            justify-content: space-around;
            flex-wrap: wrap;
        }}
        .info-item {{ margin: 10px; }}
        .info-label {{ font-weight: 600; color: #555; display: block; font-size: 0.9em; }}
        .info-value {{ font-size: 1.2em; color: #2a8a57; }}
        .endpoint-list {{ list-style: none; padding: 0; }}
        .endpoint-list li {{
            margin: 20px 0;
            padding: 15px;
            background: #f8f9fa;
            border-left: 4px solid #3ddc84;
            border-radius: 4px;
        }}
        .endpoint-list a {{ color: #2a8a57; text-decoration: none; font-weight: 600; }}
        .endpoint-desc {{ color: #666; margin-top: 5px; }}
        .footer {{
            margin-top: 40px;
            padding-top: 20px;
            border-top: 1px solid #ddd;
            color: #666;
            font-size: 0.9em;
            text-align: center;
        }}
    </style>
</head>
<body>
<div class="container">
    <h1>adb-perf-monitor</h1>

    <div class="info">
        <div class="info-item">
            <span class="info-label">Version</span>
            <span class="info-value">{version}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Uptime</span>
            <span class="info-value">{uptime}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Target</span>
            <span class="info-value">{target}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Session</span>
            <span class="info-value">{status} / {interval}ms</span>
        </div>
    </div>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li>
            <a href="/metrics">/metrics</a>
            <div class="endpoint-desc">Prometheus metrics: newest value of every series, round counters</div>
        </li>
        <li>
            <a href="/health">/health</a>
            <div class="endpoint-desc">Session state and round statistics (text)</div>
        </li>
        <li>
            <a href="/latest">/latest</a>
            <div class="endpoint-desc">Newest value of every metric (JSON)</div>
        </li>
        <li>
            <a href="/series">/series</a>
            <div class="endpoint-desc">Full time-aligned history (JSON), or one metric with <code>?metric=fps</code></div>
        </li>
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        uptime = uptime_str,
        target = target,
        status = status,
        interval = session.interval_ms,
        footer = FOOTER_TEXT
    );

    Html(html)
}
