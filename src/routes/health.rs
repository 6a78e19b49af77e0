/**
 * Health Routes
 * Liveness and backend connectivity probes
 */
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::ApiError;
use crate::AppState;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
    pub message: String,
    /// Seconds since start.
    pub uptime: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbCheckResponse {
    pub ok: bool,
    pub sample: Vec<serde_json::Value>,
}

/// GET /health
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ping
pub async fn ping() -> impl IntoResponse {
    Json(PingResponse {
        ok: true,
        message: "pong".to_string(),
        uptime: SERVER_START.elapsed().as_secs(),
    })
}

/// GET /db-check - one-row read through the backend to prove connectivity
pub async fn db_check(State(state): State<AppState>) -> Result<Json<DbCheckResponse>, ApiError> {
    let sample = state.backend.sample_empresa().await?;
    Ok(Json(DbCheckResponse { ok: true, sample }))
}
