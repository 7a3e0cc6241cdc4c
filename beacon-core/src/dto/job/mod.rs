//! Job DTOs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::MAX_RETRIES_LIMIT;
use crate::domain::job::{JobRecord, JobSpec, JobStatus};
use crate::error::ValidationError;

/// Request to submit a benchmark job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    #[serde(flatten)]
    pub spec: JobSpec,

    /// Per-unit retry limit; the orchestrator default applies when absent
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl SubmitJob {
    /// Requested retry limit, or `default` when the submission sets none
    pub fn resolve_max_retries(&self, default: u32) -> Result<u32, ValidationError> {
        let value = self.max_retries.unwrap_or(default);
        if value > MAX_RETRIES_LIMIT {
            return Err(ValidationError::InvalidMaxRetries {
                value,
                limit: MAX_RETRIES_LIMIT,
            });
        }
        Ok(value)
    }
}

/// Result of fanning a job out into execution units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutReport {
    pub job_id: String,

    /// Units a complete fan-out produces
    pub expected: u64,

    /// Units newly created by this submission
    pub created: u64,

    /// Newly created units successfully handed to their region queue
    pub enqueued: u64,

    /// Units that existed before this submission
    pub already_present: u64,

    /// Created units whose enqueue failed; left `pending` for the sweeper
    pub enqueue_failures: u64,

    /// `enqueued + already_present`
    pub total_executions: u64,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.total_executions == self.expected
    }
}

/// Summary of a stored job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub models: Vec<String>,
    pub questions: Vec<String>,
    pub regions: Vec<String>,
    pub model_regions: BTreeMap<String, Vec<String>>,
    pub expected_units: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobSummary {
    fn from(record: JobRecord) -> Self {
        JobSummary {
            job_id: record.job_id().to_string(),
            status: record.status,
            models: record.spec.models().to_vec(),
            questions: record.spec.questions().to_vec(),
            regions: record.spec.regions().to_vec(),
            model_regions: record.spec.model_regions().clone(),
            expected_units: record.spec.expected_units() as u64,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Result of cancelling a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReport {
    pub job_id: String,
    /// `pending` units moved to `cancelled`
    pub cancelled_units: u64,
}

/// Result of a global recovery pass over one job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub job_id: String,
    /// Units re-enqueued with `global_retry` priority
    pub retried: u64,
    /// Failed units left alone because their retry budget is spent
    pub exhausted: u64,
    /// Units whose retry lost a race with another writer
    pub skipped: u64,
}
