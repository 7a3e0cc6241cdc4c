//! Execution DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{ExecutionStatus, ExecutionUnit};

/// Request to retry one question of an execution's job in a region
///
/// `question_index` is signed so negative input reaches the bounds check
/// instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRequest {
    pub region: String,
    pub question_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryResponse {
    pub execution_id: Uuid,
    pub region: String,
    pub question_index: i64,
    pub status: ExecutionStatus,
    pub retry_attempt: u32,
    pub updated_at: DateTime<Utc>,
}

/// All execution units of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionListing {
    pub job_id: String,
    pub total: u64,
    pub executions: Vec<ExecutionUnit>,
}

impl ExecutionListing {
    pub fn new(job_id: impl Into<String>, executions: Vec<ExecutionUnit>) -> Self {
        Self {
            job_id: job_id.into(),
            total: executions.len() as u64,
            executions,
        }
    }
}
