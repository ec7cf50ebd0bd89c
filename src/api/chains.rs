use axum::{extract::State, Json};

use crate::{chains::ChainConfig, error::Result, models::ApiResponse};

use super::AppState;

/// GET /api/v1/chains
pub async fn list_chains(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<ChainConfig>>>> {
    let chains = state.reconciler.registry().chains().cloned().collect();
    Ok(Json(ApiResponse::success(chains)))
}
