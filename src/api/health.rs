use axum::{extract::State, Json};
use serde::Serialize;
use std::time::Duration;
use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub chains: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let acquire = tokio::time::timeout(Duration::from_secs(2), state.db.pool().acquire()).await;
    let db_status = if matches!(acquire, Ok(Ok(_))) {
        "connected".to_string()
    } else {
        "disconnected".to_string()
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        chains: state.reconciler.registry().len(),
    })
}
