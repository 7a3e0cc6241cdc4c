//! Repository Module
//!
//! Data access layer for the orchestrator. Each repository is a trait with a
//! Postgres implementation and an in-memory implementation for tests and
//! single-process dev runs. Both honour the same conditional-update contract:
//! a transition whose precondition no longer holds affects nothing and is
//! reported as `None`/`false`, never as an error.

pub mod execution;
pub mod job;
pub mod memory;
pub mod queue;

use async_trait::async_trait;
use beacon_core::domain::execution::{
    ExecutionOutcome, ExecutionStatus, ExecutionUnit, RetryOrigin, UnitKey,
};
use beacon_core::domain::job::{JobRecord, JobStatus};
use beacon_core::domain::queue::{PriorityClass, QueueDepth, QueueEntry};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// Re-export for convenience
pub use execution::PgExecutionRepository;
pub use job::PgJobRepository;
pub use memory::{InMemoryExecutionRepository, InMemoryJobRepository, InMemoryRegionQueue};
pub use queue::PgRegionQueue;

/// Storage error shared by every repository
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row could not be mapped back onto a domain type
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A domain value does not fit its column type
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted job records
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts the record unless a job with the same id exists.
    ///
    /// Returns `true` when this call inserted it.
    async fn insert_if_absent(&self, record: &JobRecord) -> StoreResult<bool>;

    async fn find_by_id(&self, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Returns `false` when the job does not exist
    async fn update_status(&self, job_id: &str, status: JobStatus) -> StoreResult<bool>;
}

/// The execution unit store
///
/// The only shared mutable state in the system. Every status transition is a
/// conditional update against the persisted status.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Creates the unit unless one with the same natural key exists.
    ///
    /// Returns `true` when this call created it.
    async fn create_if_absent(&self, unit: &ExecutionUnit) -> StoreResult<bool>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ExecutionUnit>>;

    async fn find_by_key(&self, key: &UnitKey) -> StoreResult<Option<ExecutionUnit>>;

    /// All units of a job, oldest first
    async fn list_by_job(&self, job_id: &str) -> StoreResult<Vec<ExecutionUnit>>;

    /// `pending` → `running`. `None` when the unit is not `pending`.
    async fn claim(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Option<ExecutionUnit>>;

    /// Records a dispatch outcome on a `running` unit.
    ///
    /// Returns `false` when the unit is no longer `running`.
    async fn complete(
        &self,
        id: Uuid,
        outcome: &ExecutionOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Moves a unit from `expected` back to `pending`, bumping its retry
    /// bookkeeping, if and only if it is still in `expected` state and has
    /// retry budget left.
    async fn begin_retry(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        origin: RetryOrigin,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ExecutionUnit>>;

    /// Marks every `pending` unit of the job `cancelled`; returns the count
    async fn cancel_pending(&self, job_id: &str, at: DateTime<Utc>) -> StoreResult<u64>;

    /// `pending` units not updated since `cutoff`, oldest first
    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ExecutionUnit>>;

    /// Bumps `updated_at` of a still-`pending` unit
    async fn touch_pending(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Marks `running` units started before `cutoff` as `timeout`
    async fn timeout_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ExecutionUnit>>;

    /// Jobs owning at least one `failed`/`timeout` unit with budget left
    async fn jobs_with_retryable_units(&self) -> StoreResult<Vec<String>>;
}

/// Per-region priority queues of execution references
#[async_trait]
pub trait RegionQueue: Send + Sync {
    async fn enqueue(
        &self,
        execution_id: Uuid,
        region: &str,
        priority: PriorityClass,
    ) -> StoreResult<QueueEntry>;

    /// Removes and returns the next entry: lowest priority rank, then lowest
    /// sequence. No entry is ever returned to two callers.
    async fn dequeue(&self, region: &str) -> StoreResult<Option<QueueEntry>>;

    async fn depth(&self, region: &str) -> StoreResult<QueueDepth>;

    /// Whether any entry for this execution is still waiting in a queue
    async fn contains(&self, execution_id: Uuid) -> StoreResult<bool>;
}
