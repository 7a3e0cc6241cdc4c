//! Fixtures shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use beacon_client::{AggregationBackend, ClientError, InferenceBackend};
use beacon_core::domain::execution::DEFAULT_MAX_RETRIES;
use beacon_core::domain::job::{JobRecord, JobStatus};
use beacon_core::domain::queue::{PriorityClass, QueueDepth, QueueEntry};
use beacon_core::dto::diff::PrecomputedDiff;
use beacon_core::dto::inference::{InferenceRequest, InferenceResponse};
use beacon_core::region::RegionCatalog;
use uuid::Uuid;

use crate::repository::{
    InMemoryExecutionRepository, InMemoryJobRepository, InMemoryRegionQueue, JobRepository,
    RegionQueue, StoreError, StoreResult,
};
use crate::state::{AppState, DEFAULT_AGGREGATION_TIMEOUT};

/// In-memory state plus concrete handles to its stores
pub struct Fixture {
    pub state: AppState,
    pub executions: Arc<InMemoryExecutionRepository>,
    pub queue: Arc<InMemoryRegionQueue>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_aggregation(Arc::new(UnreachableAggregation))
    }

    pub fn with_aggregation(aggregation: Arc<dyn AggregationBackend>) -> Self {
        let executions = InMemoryExecutionRepository::arc();
        let queue = InMemoryRegionQueue::arc();
        let state = AppState {
            jobs: InMemoryJobRepository::arc(),
            executions: executions.clone(),
            queue: queue.clone(),
            catalog: Arc::new(RegionCatalog::default()),
            aggregation,
            default_max_retries: DEFAULT_MAX_RETRIES,
            aggregation_timeout: DEFAULT_AGGREGATION_TIMEOUT,
        };
        Self {
            state,
            executions,
            queue,
        }
    }
}

/// Aggregation service that is always down
pub struct UnreachableAggregation;

#[async_trait]
impl AggregationBackend for UnreachableAggregation {
    async fn cross_region_diff(&self, job_id: &str) -> beacon_client::Result<PrecomputedDiff> {
        Err(ClientError::api_error(503, format!("diffs unavailable for {job_id}")))
    }
}

/// Aggregation service returning a fixed payload
pub struct FixedAggregation(pub PrecomputedDiff);

#[async_trait]
impl AggregationBackend for FixedAggregation {
    async fn cross_region_diff(&self, _job_id: &str) -> beacon_client::Result<PrecomputedDiff> {
        Ok(self.0.clone())
    }
}

/// Aggregation service that accepts the request and never answers
pub struct HangingAggregation;

#[async_trait]
impl AggregationBackend for HangingAggregation {
    async fn cross_region_diff(&self, job_id: &str) -> beacon_client::Result<PrecomputedDiff> {
        std::future::pending::<()>().await;
        Err(ClientError::Timeout(format!("diffs for {job_id}")))
    }
}

/// Scripted inference backend that counts calls
pub struct ScriptedInference {
    pub calls: AtomicUsize,
    behaviour: Behaviour,
}

enum Behaviour {
    Succeed,
    Fail(String),
    Hang,
}

impl ScriptedInference {
    pub fn succeeding() -> Arc<Self> {
        Self::with(Behaviour::Succeed)
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::with(Behaviour::Fail(message.to_string()))
    }

    pub fn hanging() -> Arc<Self> {
        Self::with(Behaviour::Hang)
    }

    fn with(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behaviour,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedInference {
    async fn infer(&self, request: &InferenceRequest) -> beacon_client::Result<InferenceResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Succeed => Ok(InferenceResponse {
                success: true,
                response: format!("answer to: {}", request.prompt),
                error: None,
                provider_used: Some("modal-us-east".to_string()),
                inference_time: 0.25,
                metadata: serde_json::json!({}),
            }),
            Behaviour::Fail(message) => Err(ClientError::Router(message.clone())),
            Behaviour::Hang => {
                std::future::pending::<()>().await;
                Err(ClientError::Timeout("unreachable".to_string()))
            }
        }
    }
}

/// Queue whose enqueue fails for one region
pub struct FlakyQueue {
    inner: InMemoryRegionQueue,
    failing_region: String,
}

impl FlakyQueue {
    pub fn failing_for(region: &str) -> Self {
        Self {
            inner: InMemoryRegionQueue::new(),
            failing_region: region.to_string(),
        }
    }
}

#[async_trait]
impl RegionQueue for FlakyQueue {
    async fn enqueue(
        &self,
        execution_id: Uuid,
        region: &str,
        priority: PriorityClass,
    ) -> StoreResult<QueueEntry> {
        if region == self.failing_region {
            return Err(StoreError::Unavailable(format!("queue for {region} is down")));
        }
        self.inner.enqueue(execution_id, region, priority).await
    }

    async fn dequeue(&self, region: &str) -> StoreResult<Option<QueueEntry>> {
        self.inner.dequeue(region).await
    }

    async fn depth(&self, region: &str) -> StoreResult<QueueDepth> {
        self.inner.depth(region).await
    }

    async fn contains(&self, execution_id: Uuid) -> StoreResult<bool> {
        self.inner.contains(execution_id).await
    }
}

/// Job store where the first read sees the job as stored and every later
/// read sees it cancelled, as if `cancel_job` ran in between
pub struct CancelAfterFirstRead {
    inner: Arc<dyn JobRepository>,
    read_once: AtomicBool,
}

impl CancelAfterFirstRead {
    pub fn new(inner: Arc<dyn JobRepository>) -> Self {
        Self {
            inner,
            read_once: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl JobRepository for CancelAfterFirstRead {
    async fn insert_if_absent(&self, record: &JobRecord) -> StoreResult<bool> {
        self.inner.insert_if_absent(record).await
    }

    async fn find_by_id(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let record = self.inner.find_by_id(job_id).await?;
        if !self.read_once.swap(true, Ordering::SeqCst) {
            self.inner.update_status(job_id, JobStatus::Cancelled).await?;
        }
        Ok(record)
    }

    async fn update_status(&self, job_id: &str, status: JobStatus) -> StoreResult<bool> {
        self.inner.update_status(job_id, status).await
    }
}
