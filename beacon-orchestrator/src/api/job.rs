//! Job API Handlers
//!
//! HTTP endpoints for job submission, inspection, cancellation and recovery.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use beacon_core::domain::diff::CrossRegionDiffView;
use beacon_core::dto::execution::ExecutionListing;
use beacon_core::dto::job::{CancelReport, FanOutReport, JobSummary, RecoveryReport, SubmitJob};

use crate::api::error::ApiResult;
use crate::service::{diff_service, job_service, retry_service};
use crate::state::AppState;

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /jobs
/// Validate a job and fan it out into execution units
pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJob>,
) -> ApiResult<(StatusCode, Json<FanOutReport>)> {
    tracing::info!("Submitting job: {}", req.spec.job_id);

    let report = job_service::submit_job(&state, req).await?;

    Ok((StatusCode::ACCEPTED, Json(report)))
}

/// GET /jobs/{job_id}
/// Get job details by ID
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSummary>> {
    tracing::debug!("Getting job: {}", job_id);

    let job = job_service::get_job(&state, &job_id).await?;

    Ok(Json(job.into()))
}

/// POST /jobs/{job_id}/cancel
/// Cancel every pending execution of a job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelReport>> {
    tracing::info!("Cancelling job: {}", job_id);

    let report = job_service::cancel_job(&state, &job_id).await?;

    Ok(Json(report))
}

/// POST /jobs/{job_id}/recover
/// Re-enqueue every failed execution of a job with global retry priority
pub async fn recover_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<RecoveryReport>> {
    tracing::info!("Recovering job: {}", job_id);

    let report = retry_service::recover_job(&state, &job_id).await?;

    Ok(Json(report))
}

// =============================================================================
// Result Endpoints
// =============================================================================

/// GET /jobs/{job_id}/executions
/// List all execution units of a job with their retry bookkeeping
pub async fn list_executions(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ExecutionListing>> {
    tracing::debug!("Listing executions for job: {}", job_id);

    let executions = job_service::list_executions(&state, &job_id).await?;

    Ok(Json(ExecutionListing::new(job_id, executions)))
}

/// GET /jobs/{job_id}/cross-region
/// Cross-region comparison, precomputed or reconstructed
pub async fn get_cross_region_diff(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CrossRegionDiffView>> {
    tracing::debug!("Getting cross-region diff for job: {}", job_id);

    let view = diff_service::get_cross_region_diff(&state, &job_id).await?;

    Ok(Json(view))
}
