//! Recovery Sweep
//!
//! Periodic reconciliation between the execution unit store and the region
//! queues. Heals units stranded `pending` by a failed enqueue, times out
//! units stuck `running`, and optionally runs global recovery.

use std::collections::HashMap;
use std::time::Duration;

use beacon_core::domain::job::JobStatus;
use beacon_core::domain::queue::PriorityClass;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::repository::StoreError;
use crate::service::retry_service;
use crate::state::AppState;

/// Error recorded on units timed out by the sweep
pub const STALE_RUNNING_ERROR: &str = "execution exceeded stale-running deadline";

#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// How long a unit may sit `pending` before it is re-enqueued
    pub pending_grace: Duration,
    /// How long a unit may stay `running` before it is marked `timeout`
    pub stale_running_after: Duration,
    /// Run global recovery for jobs with retryable units
    pub auto_recover: bool,
    /// Upper bound on pending units re-enqueued per pass
    pub batch_limit: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            pending_grace: Duration::from_secs(120),
            stale_running_after: Duration::from_secs(900),
            auto_recover: false,
            batch_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub requeued: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub recovered_jobs: u64,
    pub recovered_units: u64,
}

/// Runs one reconciliation pass
pub async fn sweep_once(
    state: &AppState,
    settings: &SweepSettings,
) -> Result<SweepReport, StoreError> {
    let now = Utc::now();
    let mut report = SweepReport::default();

    let pending_cutoff = now - to_chrono(settings.pending_grace);
    let stranded = state
        .executions
        .list_stale_pending(pending_cutoff, settings.batch_limit)
        .await?;

    // job id → whether its units may still be dispatched
    let mut dispatchable: HashMap<String, bool> = HashMap::new();

    for unit in stranded {
        let active = match dispatchable.get(&unit.job_id) {
            Some(active) => *active,
            None => {
                let active = state
                    .jobs
                    .find_by_id(&unit.job_id)
                    .await?
                    .is_none_or(|job| job.status == JobStatus::Active);
                dispatchable.insert(unit.job_id.clone(), active);
                active
            }
        };

        if !active {
            let cancelled = state.executions.cancel_pending(&unit.job_id, now).await?;
            if cancelled > 0 {
                tracing::info!(job_id = %unit.job_id, cancelled, "Cancelled units left pending on a cancelled job");
            }
            report.cancelled += cancelled;
            continue;
        }

        match state.queue.contains(unit.id).await {
            Ok(true) => {
                // Still waiting behind a backlog; not stranded
                state.executions.touch_pending(unit.id, now).await?;
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(execution_id = %unit.id, error = %err, "Queue lookup failed");
                continue;
            }
        }

        match state
            .queue
            .enqueue(unit.id, &unit.region, PriorityClass::Normal)
            .await
        {
            Ok(_) => {
                state.executions.touch_pending(unit.id, now).await?;
                report.requeued += 1;
            }
            Err(err) => {
                tracing::warn!(execution_id = %unit.id, error = %err, "Re-enqueue failed");
            }
        }
    }

    let running_cutoff = now - to_chrono(settings.stale_running_after);
    let timed_out = state
        .executions
        .timeout_stale_running(running_cutoff, STALE_RUNNING_ERROR, now)
        .await?;
    for unit in &timed_out {
        tracing::warn!(
            execution_id = %unit.id,
            job_id = %unit.job_id,
            region = %unit.region,
            "Running execution exceeded deadline, marked timeout"
        );
    }
    report.timed_out = timed_out.len() as u64;

    if settings.auto_recover {
        for job_id in state.executions.jobs_with_retryable_units().await? {
            let active = state
                .jobs
                .find_by_id(&job_id)
                .await?
                .is_some_and(|job| job.status == JobStatus::Active);
            if !active {
                continue;
            }

            match retry_service::recover_job(state, &job_id).await {
                Ok(recovery) => {
                    report.recovered_jobs += 1;
                    report.recovered_units += recovery.retried;
                }
                Err(err) => tracing::warn!(job_id = %job_id, error = %err, "Global recovery failed"),
            }
        }
    }

    if report != SweepReport::default() {
        tracing::info!(
            requeued = report.requeued,
            cancelled = report.cancelled,
            timed_out = report.timed_out,
            recovered_jobs = report.recovered_jobs,
            recovered_units = report.recovered_units,
            "Recovery sweep finished"
        );
    } else {
        tracing::debug!("Recovery sweep found nothing to do");
    }

    Ok(report)
}

/// Background task running [`sweep_once`] every `interval` until shutdown
pub struct RecoverySweeper {
    state: AppState,
    settings: SweepSettings,
    interval: Duration,
}

impl RecoverySweeper {
    pub fn new(state: AppState, settings: SweepSettings, interval: Duration) -> Self {
        Self {
            state,
            settings,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "Starting recovery sweeper");

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep_once(&self.state, &self.settings).await {
                        tracing::error!("Recovery sweep failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Recovery sweeper stopped");
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
