//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod execution;
pub mod health;
pub mod job;
pub mod region;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::submit_job))
        .route("/jobs/{job_id}", get(job::get_job))
        .route("/jobs/{job_id}/executions", get(job::list_executions))
        .route("/jobs/{job_id}/cross-region", get(job::get_cross_region_diff))
        .route("/jobs/{job_id}/cancel", post(job::cancel_job))
        .route("/jobs/{job_id}/recover", post(job::recover_job))
        // Execution endpoints
        .route(
            "/executions/{execution_id}/retry",
            post(execution::retry_execution),
        )
        // Region endpoints
        .route("/regions", get(region::list_regions))
        .route("/regions/{region}/queue", get(region::queue_depth))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
