//! Region worker pool
//!
//! Polls one region queue and runs each claimed unit in its own task, with
//! at most `max_concurrent` dispatches in flight.

use std::sync::Arc;
use std::time::Duration;

use beacon_client::InferenceBackend;
use beacon_core::domain::execution::{ExecutionOutcome, ExecutionStatus};
use beacon_core::domain::queue::QueueEntry;
use beacon_core::dto::inference::InferenceRequest;
use beacon_core::question::Question;
use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::repository::StoreResult;
use crate::state::AppState;

/// Worker pool tuning
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Maximum in-flight dispatches per region
    pub max_concurrent: usize,

    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,

    /// Upper bound on a single inference call
    pub dispatch_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            poll_interval: Duration::from_millis(500),
            dispatch_timeout: Duration::from_secs(120),
        }
    }
}

/// What happened to a dequeued entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The unit was not `pending` (duplicate enqueue or cancelled job)
    Skipped,
    /// The outcome was stored with this status
    Recorded(ExecutionStatus),
    /// The unit left `running` while the call was in flight
    Stale,
}

pub struct RegionWorkerPool {
    region: String,
    state: AppState,
    inference: Arc<dyn InferenceBackend>,
    settings: WorkerSettings,
    semaphore: Arc<Semaphore>,
}

impl RegionWorkerPool {
    pub fn new(
        region: String,
        state: AppState,
        inference: Arc<dyn InferenceBackend>,
        settings: WorkerSettings,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent));
        Self {
            region,
            state,
            inference,
            settings,
            semaphore,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Polls until `shutdown` flips. In-flight dispatches are left to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            region = %self.region,
            max_concurrent = self.settings.max_concurrent,
            "Starting region worker pool (interval: {:?})",
            self.settings.poll_interval
        );

        let mut interval = time::interval(self.settings.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(handles) if !handles.is_empty() => {
                            debug!(region = %self.region, "Dispatched {} execution(s)", handles.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!(region = %self.region, "Error during poll cycle: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!(region = %self.region, "Region worker pool stopped");
    }

    /// Dequeues while permits are free and spawns one task per entry
    pub async fn poll_once(&self) -> StoreResult<Vec<JoinHandle<Dispatch>>> {
        let mut handles = Vec::new();

        loop {
            // At capacity: leave the rest queued for the next cycle
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!(region = %self.region, "Max concurrent dispatches reached");
                break;
            };

            match self.state.queue.dequeue(&self.region).await? {
                Some(entry) => handles.push(self.spawn_dispatch(entry, permit)),
                None => break,
            }
        }

        Ok(handles)
    }

    fn spawn_dispatch(&self, entry: QueueEntry, permit: OwnedSemaphorePermit) -> JoinHandle<Dispatch> {
        let state = self.state.clone();
        let inference = Arc::clone(&self.inference);
        let timeout = self.settings.dispatch_timeout;

        tokio::spawn(async move {
            let execution_id = entry.execution_id;
            let result = process_entry(&state, inference.as_ref(), entry, timeout).await;
            drop(permit);

            result.unwrap_or_else(|e| {
                // The unit stays in its current state for the recovery sweep
                error!(%execution_id, "Failed to process execution: {}", e);
                Dispatch::Stale
            })
        })
    }
}

/// Claims, dispatches and records one dequeued entry
pub async fn process_entry(
    state: &AppState,
    inference: &dyn InferenceBackend,
    entry: QueueEntry,
    timeout: Duration,
) -> StoreResult<Dispatch> {
    let Some(unit) = state.executions.claim(entry.execution_id, Utc::now()).await? else {
        debug!(
            execution_id = %entry.execution_id,
            priority = entry.priority.as_str(),
            "Execution no longer pending, skipping"
        );
        return Ok(Dispatch::Skipped);
    };

    info!(
        execution_id = %unit.id,
        job_id = %unit.job_id,
        model = %unit.model_id,
        region = %unit.region,
        question = %unit.question_id,
        "Dispatching execution"
    );

    let question = Question::from_id(&unit.question_id);
    let request = InferenceRequest::new(&unit.model_id, question.prompt(), &unit.region);

    let outcome = match time::timeout(timeout, inference.infer(&request)).await {
        Ok(Ok(reply)) => ExecutionOutcome::Completed {
            output: reply.to_output(),
            provider: reply.provider_used.clone(),
        },
        Ok(Err(err)) if err.is_timeout() => ExecutionOutcome::TimedOut {
            error: err.to_string(),
        },
        Ok(Err(err)) => ExecutionOutcome::Failed {
            error: err.to_string(),
        },
        Err(_) => ExecutionOutcome::TimedOut {
            error: format!("inference exceeded dispatch timeout of {:?}", timeout),
        },
    };

    if !state.executions.complete(unit.id, &outcome, Utc::now()).await? {
        warn!(
            execution_id = %unit.id,
            status = outcome.status().as_str(),
            "Execution left running before its outcome was recorded"
        );
        return Ok(Dispatch::Stale);
    }

    match outcome.error() {
        Some(reason) => warn!(
            execution_id = %unit.id,
            status = outcome.status().as_str(),
            error = reason,
            "Execution did not complete"
        ),
        None => info!(execution_id = %unit.id, "Execution completed"),
    }

    Ok(Dispatch::Recorded(outcome.status()))
}
