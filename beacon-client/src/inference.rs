//! Hybrid router client

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::dto::inference::{InferenceRequest, InferenceResponse};
use reqwest::Client;

use crate::error::{ClientError, Result};
use crate::{InferenceBackend, handle_response, trim_base_url};

/// Paths tried in order; the router has been deployed under each of them
const INFERENCE_PATHS: [&str; 4] = [
    "/inference",
    "/api/v1/inference",
    "/api/inference",
    "/v1/inference",
];

/// HTTP client for the hybrid inference router
#[derive(Debug, Clone)]
pub struct HybridRouterClient {
    base_url: String,
    client: Client,
}

impl HybridRouterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            client: Client::new(),
        }
    }

    /// Create a router client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            client,
        }
    }

    /// Create a router client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_inference(&self, url: &str, request: &InferenceRequest) -> Result<InferenceResponse> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ClientError::Timeout(format!("POST {url}: {err}"))
                } else {
                    ClientError::RequestFailed(err)
                }
            })?;

        let reply: InferenceResponse = handle_response(response).await?;
        if !reply.success {
            let message = reply
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "unsuccessful".to_string());
            return Err(ClientError::Router(message));
        }
        Ok(reply)
    }
}

#[async_trait]
impl InferenceBackend for HybridRouterClient {
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let mut last_error = None;

        for path in INFERENCE_PATHS {
            let url = format!("{}{}", self.base_url, path);
            match self.post_inference(&url, request).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_not_found() => {
                    tracing::debug!(url = %url, "Inference path not found, trying next");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::NotFound("inference endpoint".to_string())))
    }
}
