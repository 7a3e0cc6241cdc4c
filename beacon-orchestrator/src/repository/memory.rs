//! In-memory repositories for tests and single-process dev runs
//!
//! Each store keeps its state behind one `tokio::sync::Mutex`, which makes
//! every conditional update atomic with respect to other callers, matching
//! the single-statement updates of the Postgres implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::domain::execution::{
    ExecutionOutcome, ExecutionStatus, ExecutionUnit, RetryOrigin, UnitKey,
};
use beacon_core::domain::job::{JobRecord, JobStatus};
use beacon_core::domain::queue::{PriorityClass, QueueDepth, QueueEntry};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ExecutionRepository, JobRepository, RegionQueue, StoreResult};

// =============================================================================
// Jobs
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert_if_absent(&self, record: &JobRecord) -> StoreResult<bool> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(record.job_id()) {
            return Ok(false);
        }
        jobs.insert(record.job_id().to_string(), record.clone());
        Ok(true)
    }

    async fn find_by_id(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self.jobs.lock().await.get(job_id).cloned())
    }

    async fn update_status(&self, job_id: &str, status: JobStatus) -> StoreResult<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(record) => {
                record.status = status;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Execution Units
// =============================================================================

#[derive(Debug, Default)]
struct UnitTable {
    units: HashMap<Uuid, ExecutionUnit>,
    keys: HashMap<UnitKey, Uuid>,
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    table: Mutex<UnitTable>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Overwrites a stored unit. Test fixtures use this to stage states the
    /// public transitions cannot reach directly.
    pub async fn put(&self, unit: ExecutionUnit) {
        let mut table = self.table.lock().await;
        table.keys.insert(unit.key(), unit.id);
        table.units.insert(unit.id, unit);
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create_if_absent(&self, unit: &ExecutionUnit) -> StoreResult<bool> {
        let mut table = self.table.lock().await;
        let key = unit.key();
        if table.keys.contains_key(&key) {
            return Ok(false);
        }
        table.keys.insert(key, unit.id);
        table.units.insert(unit.id, unit.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ExecutionUnit>> {
        Ok(self.table.lock().await.units.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &UnitKey) -> StoreResult<Option<ExecutionUnit>> {
        let table = self.table.lock().await;
        Ok(table
            .keys
            .get(key)
            .and_then(|id| table.units.get(id))
            .cloned())
    }

    async fn list_by_job(&self, job_id: &str) -> StoreResult<Vec<ExecutionUnit>> {
        let table = self.table.lock().await;
        let mut units: Vec<ExecutionUnit> = table
            .units
            .values()
            .filter(|unit| unit.job_id == job_id)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(units)
    }

    async fn claim(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Option<ExecutionUnit>> {
        let mut table = self.table.lock().await;
        match table.units.get_mut(&id) {
            Some(unit) if unit.status == ExecutionStatus::Pending => {
                unit.status = ExecutionStatus::Running;
                unit.started_at = Some(at);
                unit.updated_at = at;
                Ok(Some(unit.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        outcome: &ExecutionOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut table = self.table.lock().await;
        Ok(table
            .units
            .get_mut(&id)
            .is_some_and(|unit| unit.apply_outcome(outcome, at)))
    }

    async fn begin_retry(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        origin: RetryOrigin,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ExecutionUnit>> {
        let mut table = self.table.lock().await;
        let Some(unit) = table.units.get_mut(&id) else {
            return Ok(None);
        };
        if unit.apply_retry(expected, origin, at) {
            Ok(Some(unit.clone()))
        } else {
            Ok(None)
        }
    }

    async fn cancel_pending(&self, job_id: &str, at: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.table.lock().await;
        let mut cancelled = 0;
        for unit in table.units.values_mut() {
            if unit.job_id == job_id && unit.status == ExecutionStatus::Pending {
                unit.status = ExecutionStatus::Cancelled;
                unit.updated_at = at;
                unit.completed_at = Some(at);
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ExecutionUnit>> {
        let table = self.table.lock().await;
        let mut stale: Vec<ExecutionUnit> = table
            .units
            .values()
            .filter(|unit| unit.status == ExecutionStatus::Pending && unit.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|unit| unit.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn touch_pending(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut table = self.table.lock().await;
        match table.units.get_mut(&id) {
            Some(unit) if unit.status == ExecutionStatus::Pending => {
                unit.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn timeout_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ExecutionUnit>> {
        let mut table = self.table.lock().await;
        let outcome = ExecutionOutcome::TimedOut {
            error: error.to_string(),
        };

        let mut timed_out = Vec::new();
        for unit in table.units.values_mut() {
            let stale = unit.status == ExecutionStatus::Running
                && unit.started_at.is_some_and(|started| started < cutoff);
            if stale && unit.apply_outcome(&outcome, at) {
                timed_out.push(unit.clone());
            }
        }
        Ok(timed_out)
    }

    async fn jobs_with_retryable_units(&self) -> StoreResult<Vec<String>> {
        let table = self.table.lock().await;
        let mut job_ids: Vec<String> = table
            .units
            .values()
            .filter(|unit| unit.status.is_retryable() && unit.retry_count < unit.max_retries)
            .map(|unit| unit.job_id.clone())
            .collect();
        job_ids.sort();
        job_ids.dedup();
        Ok(job_ids)
    }
}

// =============================================================================
// Region Queue
// =============================================================================

#[derive(Debug, Default)]
struct QueueState {
    next_seq: i64,
    /// region → (priority rank, seq) → entry
    regions: HashMap<String, BTreeMap<(i16, i64), QueueEntry>>,
}

#[derive(Debug, Default)]
pub struct InMemoryRegionQueue {
    state: Mutex<QueueState>,
}

impl InMemoryRegionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl RegionQueue for InMemoryRegionQueue {
    async fn enqueue(
        &self,
        execution_id: Uuid,
        region: &str,
        priority: PriorityClass,
    ) -> StoreResult<QueueEntry> {
        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let entry = QueueEntry {
            seq: state.next_seq,
            execution_id,
            region: region.to_string(),
            priority,
            enqueued_at: Utc::now(),
        };
        state
            .regions
            .entry(region.to_string())
            .or_default()
            .insert((priority.rank(), entry.seq), entry.clone());
        Ok(entry)
    }

    async fn dequeue(&self, region: &str) -> StoreResult<Option<QueueEntry>> {
        let mut state = self.state.lock().await;
        Ok(state
            .regions
            .get_mut(region)
            .and_then(|entries| entries.pop_first())
            .map(|(_, entry)| entry))
    }

    async fn depth(&self, region: &str) -> StoreResult<QueueDepth> {
        let state = self.state.lock().await;
        let mut depth = QueueDepth::empty(region);
        if let Some(entries) = state.regions.get(region) {
            for entry in entries.values() {
                depth.add(entry.priority, 1);
            }
        }
        Ok(depth)
    }

    async fn contains(&self, execution_id: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .regions
            .values()
            .flat_map(|entries| entries.values())
            .any(|entry| entry.execution_id == execution_id))
    }
}
