use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    start_time: String,
    uptime: u64,
    timestamp: String,
}

pub async fn status(State(state): State<AppState>) -> Response {
    Json(HealthResponse {
        status: "ok",
        service: "assessment-backend",
        start_time: system_time_iso(state.started_at_system()),
        uptime: state.uptime_seconds(),
        timestamp: now_iso(),
    })
    .into_response()
}

fn system_time_iso(time: std::time::SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
