//! Execution unit domain types
//!
//! One [`ExecutionUnit`] exists per (job, model, region, question). It carries
//! its own retry bookkeeping and is never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::queue::PriorityClass;

/// Retry limit applied when the submitter does not override it
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest retry limit a submission may request
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Natural key of an execution unit; the deduplication boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub job_id: String,
    pub model_id: String,
    pub region: String,
    pub question_id: String,
}

impl UnitKey {
    pub fn new(
        job_id: impl Into<String>,
        model_id: impl Into<String>,
        region: impl Into<String>,
        question_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            model_id: model_id.into(),
            region: region.into(),
            question_id: question_id.into(),
        }
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.job_id, self.model_id, self.region, self.question_id
        )
    }
}

/// Durable record of one execution attempt
///
/// Retry bookkeeping fields are always serialized (as `null` / `[]` when
/// unset) so listing consumers can rely on their presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub id: Uuid,
    pub job_id: String,
    pub model_id: String,
    pub region: String,
    pub question_id: String,
    pub status: ExecutionStatus,
    pub output: Option<serde_json::Value>,
    /// First failure message; later failures never replace it
    pub original_error: Option<String>,
    pub provider: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub retry_history: Vec<RetryHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionUnit {
    /// Builds a fresh `pending` unit
    pub fn new(key: UnitKey, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id: key.job_id,
            model_id: key.model_id,
            region: key.region,
            question_id: key.question_id,
            status: ExecutionStatus::Pending,
            output: None,
            original_error: None,
            provider: None,
            retry_count: 0,
            max_retries,
            last_retry_at: None,
            retry_history: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(
            self.job_id.clone(),
            self.model_id.clone(),
            self.region.clone(),
            self.question_id.clone(),
        )
    }

    /// Remaining retry budget
    pub fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    /// True when the unit failed and has no retry budget left
    pub fn is_exhausted(&self) -> bool {
        self.status.is_retryable() && self.retry_count >= self.max_retries
    }

    /// Applies a dispatch outcome to a `running` unit.
    ///
    /// Returns `false` without touching the unit when it is not `running`.
    pub fn apply_outcome(&mut self, outcome: &ExecutionOutcome, at: DateTime<Utc>) -> bool {
        if self.status != ExecutionStatus::Running {
            return false;
        }

        self.status = outcome.status();
        self.updated_at = at;
        self.completed_at = Some(at);
        match outcome {
            ExecutionOutcome::Completed { output, provider } => {
                self.output = Some(output.clone());
                self.provider = provider.clone();
            }
            ExecutionOutcome::Failed { error } | ExecutionOutcome::TimedOut { error } => {
                if self.original_error.is_none() {
                    self.original_error = Some(error.clone());
                }
            }
        }
        true
    }

    /// Moves a failed unit back to `pending`, recording the retry.
    ///
    /// Returns `false` without touching the unit when it is not in
    /// `expected` state or has no retry budget left.
    pub fn apply_retry(
        &mut self,
        expected: ExecutionStatus,
        origin: RetryOrigin,
        at: DateTime<Utc>,
    ) -> bool {
        if self.status != expected || !expected.is_retryable() || self.retry_count >= self.max_retries
        {
            return false;
        }

        self.retry_count += 1;
        self.retry_history.push(RetryHistoryEntry {
            attempt: self.retry_count,
            timestamp: at,
            prior_status: self.status,
            origin,
        });
        self.last_retry_at = Some(at);
        self.status = ExecutionStatus::Pending;
        self.updated_at = at;
        self.started_at = None;
        self.completed_at = None;
        true
    }
}

/// Lifecycle state of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            "timeout" => Some(ExecutionStatus::Timeout),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }

    /// States a retry may start from
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::Timeout)
    }

    /// States no worker will move the unit out of
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Timeout
                | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a retry
///
/// The two callers map onto distinct queue priority classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOrigin {
    /// A user retrying a single unit
    User,
    /// The system-initiated global recovery sweep
    GlobalRecovery,
}

impl RetryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryOrigin::User => "user",
            RetryOrigin::GlobalRecovery => "global_recovery",
        }
    }

    pub fn priority(&self) -> PriorityClass {
        match self {
            RetryOrigin::User => PriorityClass::RegionRetry,
            RetryOrigin::GlobalRecovery => PriorityClass::GlobalRetry,
        }
    }
}

/// One retry of an execution unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryHistoryEntry {
    /// 1-based retry number
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    /// Status the unit was in when the retry was accepted
    pub prior_status: ExecutionStatus,
    pub origin: RetryOrigin,
}

/// Result of dispatching a unit to the inference collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed {
        output: serde_json::Value,
        provider: Option<String>,
    },
    Failed {
        error: String,
    },
    TimedOut {
        error: String,
    },
}

impl ExecutionOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            ExecutionOutcome::Completed { .. } => ExecutionStatus::Completed,
            ExecutionOutcome::Failed { .. } => ExecutionStatus::Failed,
            ExecutionOutcome::TimedOut { .. } => ExecutionStatus::Timeout,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Completed { .. } => None,
            ExecutionOutcome::Failed { error } | ExecutionOutcome::TimedOut { error } => {
                Some(error)
            }
        }
    }
}
