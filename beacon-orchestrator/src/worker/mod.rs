//! Regional workers
//!
//! One pool per served region. A pool drains its region's queue, claims each
//! unit with the `pending` → `running` compare-and-set and dispatches it to
//! the inference router. Workers never retry on their own.

pub mod pool;

pub use pool::{Dispatch, RegionWorkerPool, WorkerSettings};

use std::sync::Arc;

use beacon_client::InferenceBackend;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// Starts one pool per region, all stopping on the same shutdown signal
pub fn spawn_region_pools(
    state: &AppState,
    inference: Arc<dyn InferenceBackend>,
    regions: &[String],
    settings: &WorkerSettings,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    regions
        .iter()
        .map(|region| {
            let pool = RegionWorkerPool::new(
                region.clone(),
                state.clone(),
                Arc::clone(&inference),
                settings.clone(),
            );
            tokio::spawn(pool.run(shutdown.clone()))
        })
        .collect()
}
