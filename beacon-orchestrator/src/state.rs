//! Shared application state
//!
//! Handed to every service function and HTTP handler. Repositories are trait
//! objects so the same services run against Postgres or in-memory storage.

use std::sync::Arc;
use std::time::Duration;

use beacon_client::AggregationBackend;
use beacon_core::domain::execution::DEFAULT_MAX_RETRIES;
use beacon_core::region::RegionCatalog;
use sqlx::PgPool;

use crate::repository::{
    ExecutionRepository, InMemoryExecutionRepository, InMemoryJobRepository, InMemoryRegionQueue,
    JobRepository, PgExecutionRepository, PgJobRepository, PgRegionQueue, RegionQueue,
};

/// Upper bound on one precomputed-diff lookup before reconstruction takes over
pub const DEFAULT_AGGREGATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub queue: Arc<dyn RegionQueue>,
    pub catalog: Arc<RegionCatalog>,
    pub aggregation: Arc<dyn AggregationBackend>,
    /// Retry limit for units whose submission did not set one
    pub default_max_retries: u32,
    pub aggregation_timeout: Duration,
}

impl AppState {
    pub fn postgres(
        pool: PgPool,
        catalog: RegionCatalog,
        aggregation: Arc<dyn AggregationBackend>,
    ) -> Self {
        Self {
            jobs: Arc::new(PgJobRepository::new(pool.clone())),
            executions: Arc::new(PgExecutionRepository::new(pool.clone())),
            queue: Arc::new(PgRegionQueue::new(pool)),
            catalog: Arc::new(catalog),
            aggregation,
            default_max_retries: DEFAULT_MAX_RETRIES,
            aggregation_timeout: DEFAULT_AGGREGATION_TIMEOUT,
        }
    }

    pub fn in_memory(catalog: RegionCatalog, aggregation: Arc<dyn AggregationBackend>) -> Self {
        Self {
            jobs: InMemoryJobRepository::arc(),
            executions: InMemoryExecutionRepository::arc(),
            queue: InMemoryRegionQueue::arc(),
            catalog: Arc::new(catalog),
            aggregation,
            default_max_retries: DEFAULT_MAX_RETRIES,
            aggregation_timeout: DEFAULT_AGGREGATION_TIMEOUT,
        }
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_aggregation_timeout(mut self, timeout: Duration) -> Self {
        self.aggregation_timeout = timeout;
        self
    }
}
