//! Region API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use beacon_core::domain::queue::QueueDepth;
use beacon_core::region::RegionCatalog;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /regions
/// The region catalog jobs may target
pub async fn list_regions(State(state): State<AppState>) -> Json<RegionCatalog> {
    Json(state.catalog.as_ref().clone())
}

/// GET /regions/{region}/queue
/// Queue depth of a region, by priority class
pub async fn queue_depth(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> ApiResult<Json<QueueDepth>> {
    let code = state.catalog.canonicalize(&region).ok_or_else(|| {
        ApiError::bad_request("UnknownRegion", format!("unknown region '{}'", region))
    })?;

    let depth = state.queue.depth(code).await?;

    Ok(Json(depth))
}
