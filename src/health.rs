use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;
use time::OffsetDateTime;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    /// Seconds since the process started serving.
    pub uptime: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Nanoseconds spent building this response.
    pub response_time: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let start = Instant::now();
    let database = if state.users.is_connected().await {
        "connected"
    } else {
        "disconnected"
    };
    Json(HealthResponse {
        status: "OK",
        database,
        uptime: state.started_at.elapsed().as_secs_f64(),
        timestamp: OffsetDateTime::now_utc(),
        response_time: start.elapsed().as_nanos() as u64,
    })
}
