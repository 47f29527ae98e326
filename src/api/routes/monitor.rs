//! Poll loop handlers.

use super::{IntervalRequest, StartMonitorRequest};
use crate::api::AppState;
use crate::monitor::MonitorSettings;
use crate::types::MonitorStatus;
use axum::{Json, extract::State};

/// GET /monitor/status - Poll loop status
#[utoipa::path(
    get,
    path = "/api/v1/monitor/status",
    tag = "monitor",
    responses(
        (status = 200, description = "Current poll loop state", body = crate::types::MonitorStatus)
    )
)]
pub async fn monitor_status(State(state): State<AppState>) -> Json<MonitorStatus> {
    Json(state.mirror.monitor().status().await)
}

/// POST /monitor/start - Start the poll loop (or update its settings)
#[utoipa::path(
    post,
    path = "/api/v1/monitor/start",
    tag = "monitor",
    request_body(content = StartMonitorRequest, description = "Loop settings"),
    responses(
        (status = 200, description = "Poll loop state after the request", body = crate::types::MonitorStatus)
    )
)]
pub async fn monitor_start(
    State(state): State<AppState>,
    Json(request): Json<StartMonitorRequest>,
) -> Json<MonitorStatus> {
    let interval_seconds = request
        .interval_seconds
        .unwrap_or_else(|| state.config.monitor.default_interval.as_secs());
    let status = state
        .mirror
        .monitor()
        .start(MonitorSettings {
            interval_seconds,
            offline: request.offline,
            crawl_on_update: request.crawl_on_update,
        })
        .await;
    Json(status)
}

/// POST /monitor/stop - Stop the poll loop
#[utoipa::path(
    post,
    path = "/api/v1/monitor/stop",
    tag = "monitor",
    responses(
        (status = 200, description = "Poll loop state after stopping", body = crate::types::MonitorStatus)
    )
)]
pub async fn monitor_stop(State(state): State<AppState>) -> Json<MonitorStatus> {
    Json(state.mirror.monitor().stop().await)
}

/// POST /monitor/interval - Change the poll interval
///
/// Takes effect on the next sleep.
#[utoipa::path(
    post,
    path = "/api/v1/monitor/interval",
    tag = "monitor",
    request_body(content = IntervalRequest, description = "New interval"),
    responses(
        (status = 200, description = "Poll loop state with the new interval", body = crate::types::MonitorStatus)
    )
)]
pub async fn monitor_interval(
    State(state): State<AppState>,
    Json(request): Json<IntervalRequest>,
) -> Json<MonitorStatus> {
    Json(
        state
            .mirror
            .monitor()
            .set_interval(request.interval_seconds)
            .await,
    )
}
