use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::roster::VANTAGE_ROSTER;
use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub resolver_count: usize,
}

/// GET /health, service liveness.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: Utc::now()
            .signed_duration_since(state.started_at)
            .num_seconds(),
        resolver_count: VANTAGE_ROSTER.len(),
    })
}
