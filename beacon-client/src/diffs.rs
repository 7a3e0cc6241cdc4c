//! Diffs service client

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::dto::diff::PrecomputedDiff;
use reqwest::{Client, Url};

use crate::error::{ClientError, Result};
use crate::{AggregationBackend, handle_response, trim_base_url};

/// HTTP client for the precomputed cross-region diffs service
#[derive(Debug, Clone)]
pub struct DiffsClient {
    base_url: String,
    client: Client,
}

impl DiffsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            client: Client::new(),
        }
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            client,
        }
    }

    /// Create a diffs client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The job id is one percent-encoded path segment
    fn diff_url(&self, job_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::ParseError(format!("invalid base URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::ParseError(format!("base URL '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "diffs", "cross-region", job_id]);
        Ok(url)
    }
}

#[async_trait]
impl AggregationBackend for DiffsClient {
    /// GET /api/v1/diffs/cross-region/{job_id}
    async fn cross_region_diff(&self, job_id: &str) -> Result<PrecomputedDiff> {
        let url = self.diff_url(job_id)?;
        let response = self.client.get(url).send().await?;

        handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_client_creation() {
        let client = DiffsClient::new("http://localhost:8001");
        assert_eq!(client.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_client_with_custom_client() {
        let client = DiffsClient::with_client("http://localhost:8001/", Client::new());
        assert_eq!(client.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_job_id_is_one_encoded_segment() {
        let client = DiffsClient::new("http://localhost:8001/");
        let url = client.diff_url("a/b?c#d").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8001/api/v1/diffs/cross-region/a%2Fb%3Fc%23d"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_base_url_prefix_is_kept() {
        let client = DiffsClient::new("http://gateway:9000/aggregator");
        let url = client.diff_url("job-1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://gateway:9000/aggregator/api/v1/diffs/cross-region/job-1"
        );
    }

    #[tokio::test]
    async fn test_silent_service_times_out() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client =
            DiffsClient::with_timeout(format!("http://{addr}"), Duration::from_millis(200)).unwrap();

        let started = Instant::now();
        let err = client.cross_region_diff("job-1").await.unwrap_err();
        assert!(err.is_timeout(), "expected a timeout, got {err}");
        assert!(started.elapsed() < Duration::from_secs(5));

        server.abort();
    }
}
