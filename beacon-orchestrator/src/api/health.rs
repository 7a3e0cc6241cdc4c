//! Health Check API Handler

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health
/// Liveness plus the regions this instance accepts
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "regions": state.catalog.codes().collect::<Vec<_>>(),
    }))
}
