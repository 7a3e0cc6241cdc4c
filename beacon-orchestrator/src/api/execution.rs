//! Execution API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use beacon_core::dto::execution::{RetryRequest, RetryResponse};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::retry_service;
use crate::state::AppState;

/// POST /executions/{execution_id}/retry
/// Retry one question of the execution's job in the given region
pub async fn retry_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
    Json(req): Json<RetryRequest>,
) -> ApiResult<Json<RetryResponse>> {
    tracing::info!(
        "Retry requested for execution {} (region {}, question {})",
        execution_id,
        req.region,
        req.question_index
    );

    let response = retry_service::retry_question(&state, execution_id, req).await?;

    Ok(Json(response))
}
