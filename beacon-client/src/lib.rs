//! Beacon HTTP Clients
//!
//! Typed clients for the two services the orchestrator depends on but does not
//! own: the hybrid inference router and the precomputed diffs service.
//!
//! Each client sits behind an `async_trait` seam ([`InferenceBackend`],
//! [`AggregationBackend`]) so the orchestrator can swap in stubs for tests.
//!
//! # Example
//!
//! ```no_run
//! use beacon_client::{HybridRouterClient, InferenceBackend};
//! use beacon_core::dto::inference::InferenceRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let router = HybridRouterClient::new("http://localhost:8000");
//!     let reply = router
//!         .infer(&InferenceRequest::new("llama3.2-1b", "What is 2+2?", "us-east"))
//!         .await?;
//!
//!     println!("{} answered: {}", reply.provider_used.unwrap_or_default(), reply.response);
//!     Ok(())
//! }
//! ```

pub mod error;
mod diffs;
mod inference;

// Re-export commonly used types
pub use diffs::DiffsClient;
pub use error::{ClientError, Result};
pub use inference::HybridRouterClient;

use async_trait::async_trait;
use beacon_core::dto::diff::PrecomputedDiff;
use beacon_core::dto::inference::{InferenceRequest, InferenceResponse};
use serde::de::DeserializeOwned;

/// Something that can run one prompt against one model
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Runs an inference. A router-reported failure is an `Err`.
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse>;
}

/// Source of precomputed cross-region aggregations
#[async_trait]
pub trait AggregationBackend: Send + Sync {
    async fn cross_region_diff(&self, job_id: &str) -> Result<PrecomputedDiff>;
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Check the status code and deserialize a JSON body
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

pub(crate) fn trim_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
