//! JSON views of the store.
//!
//! `/latest` returns the newest value of every scalar metric plus the newest
//! foreground app; `/series` returns the full time-aligned history, or a
//! single series with `?metric=<name>`.

use adb_perf_monitor::collectors::ForegroundApp;
use adb_perf_monitor::monitor::MonitorSession;
use adb_perf_monitor::store::Metric;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub session: MonitorSession,
    pub timestamp: Option<String>,
    pub values: BTreeMap<&'static str, Option<f64>>,
    pub foreground: Option<ForegroundApp>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    pub metric: Option<String>,
}

#[derive(Debug, Serialize)]
struct SingleSeries {
    metric: &'static str,
    timestamps: Vec<String>,
    values: Vec<Option<f64>>,
}

/// Handler for the /latest endpoint.
#[instrument(skip(state))]
pub async fn latest_handler(State(state): State<SharedState>) -> Json<LatestResponse> {
    debug!("Processing /latest request");

    let session = state.monitor.session();
    let store_lock = state.monitor.store();
    let store = store_lock.read().await;

    Json(LatestResponse {
        session,
        timestamp: store.timestamps().pop(),
        values: store.latest_all(),
        foreground: store.latest_foreground().cloned(),
    })
}

/// Handler for the /series endpoint.
#[instrument(skip(state))]
pub async fn series_handler(
    State(state): State<SharedState>,
    Query(query): Query<SeriesQuery>,
) -> Response {
    debug!("Processing /series request");

    let store_lock = state.monitor.store();
    let store = store_lock.read().await;

    match query.metric.as_deref() {
        None => Json(store.snapshot()).into_response(),
        Some(name) => match Metric::from_name(name) {
            Some(metric) => Json(SingleSeries {
                metric: metric.name(),
                timestamps: store.timestamps(),
                values: store.series(metric),
            })
            .into_response(),
            None => (
                StatusCode::NOT_FOUND,
                format!("Unknown metric '{}'", name),
            )
                .into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_state;
    use adb_perf_monitor::collectors::FrameStats;
    use adb_perf_monitor::sample::Sample;
    use adb_perf_monitor::store::RoundRecord;
    use std::sync::Arc;

    async fn seeded_state() -> SharedState {
        let state = test_state(Arc::new(|_cmd: &str| String::new()));
        {
            let store_lock = state.monitor.store();
            let mut store = store_lock.write().await;
            store.append_round(
                "12:00:00".into(),
                &RoundRecord {
                    frame: Sample::Value(FrameStats {
                        fps: 58,
                        jank_count: 2,
                    }),
                    ..RoundRecord::default()
                },
            );
        }
        state
    }

    #[tokio::test]
    async fn test_latest_reports_newest_round() {
        let state = seeded_state().await;
        let Json(latest) = latest_handler(State(state)).await;

        assert_eq!(latest.timestamp.as_deref(), Some("12:00:00"));
        assert_eq!(latest.values["fps"], Some(58.0));
        assert_eq!(latest.values["cpu_app"], None);
        assert!(latest.foreground.is_none());
    }

    #[tokio::test]
    async fn test_series_single_metric_and_unknown() {
        let state = seeded_state().await;

        let ok = series_handler(
            State(state.clone()),
            Query(SeriesQuery {
                metric: Some("jank_count".into()),
            }),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = series_handler(
            State(state),
            Query(SeriesQuery {
                metric: Some("gpu".into()),
            }),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
