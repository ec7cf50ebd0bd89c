use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::Result,
    models::{ApiResponse, Watermark},
    services::ReconcileSummary,
};

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    #[serde(rename = "chainId", alias = "chain_id")]
    pub chain_id: Option<String>,
    /// Scan up to this block instead of the chain head.
    #[serde(rename = "currentBlock", alias = "current_block")]
    pub current_block: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_deposits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReconcileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// GET|POST /api/v1/deposits/check?chainId=<id>
///
/// Reconciles one chain when `chainId` is given, every configured chain otherwise.
pub async fn check_deposits(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>> {
    let chain_id = query
        .chain_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    match chain_id {
        Some(chain_id) => {
            tracing::info!("Manually checking deposits for chain {}", chain_id);
            let summary = state
                .reconciler
                .reconcile(&chain_id, query.current_block)
                .await?;

            Ok(Json(CheckResponse {
                success: true,
                chain_id: Some(chain_id),
                new_deposits: Some(summary.new_deposits),
                summary: Some(summary),
                results: None,
                errors: None,
            }))
        }
        None => {
            tracing::info!("Manually checking deposits for all chains");
            let report = state.reconciler.reconcile_all().await;

            Ok(Json(CheckResponse {
                success: true,
                chain_id: None,
                new_deposits: None,
                summary: None,
                results: Some(report.results),
                errors: (!report.errors.is_empty()).then_some(report.errors),
            }))
        }
    }
}

/// GET /api/v1/deposits/watermarks
pub async fn get_watermarks(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Watermark>>>> {
    let watermarks = state.reconciler.watermarks().await?;
    Ok(Json(ApiResponse::success(watermarks)))
}
