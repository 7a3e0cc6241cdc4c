//! Inference router DTOs

use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Body of `POST /inference` on the hybrid router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_preference: Option<String>,
    #[serde(default)]
    pub cost_priority: bool,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            region_preference: Some(region.into()),
            cost_priority: false,
        }
    }
}

/// Router reply; every field but `success` may be missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub success: bool,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub provider_used: Option<String>,
    #[serde(default)]
    pub inference_time: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl InferenceResponse {
    /// Output payload stored on a completed execution unit
    pub fn to_output(&self) -> serde_json::Value {
        serde_json::json!({
            "response": self.response,
            "inference_time": self.inference_time,
            "metadata": self.metadata,
        })
    }
}
