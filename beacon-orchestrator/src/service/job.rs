//! Job Service
//!
//! Submission, fan-out, lookup and cancellation of benchmark jobs.

use beacon_core::ValidationError;
use beacon_core::domain::execution::{ExecutionUnit, UnitKey};
use beacon_core::domain::job::{JobRecord, JobStatus, NormalizedJobSpec};
use beacon_core::domain::queue::PriorityClass;
use beacon_core::dto::job::{CancelReport, FanOutReport, SubmitJob};
use beacon_core::normalize::first_duplicate;
use chrono::Utc;
use thiserror::Error;

use crate::repository::StoreError;
use crate::state::AppState;

/// Service error type
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job '{0}' already exists with a different specification")]
    Conflict(String),

    #[error("job '{0}' has been cancelled")]
    Cancelled(String),

    /// A guarantee owned by an upstream component did not hold
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate, persist and fan out a job submission.
///
/// Submitting the same job twice is safe: the second call creates only the
/// units that are missing and reports the rest as already present.
pub async fn submit_job(state: &AppState, req: SubmitJob) -> Result<FanOutReport, JobError> {
    let spec = req.spec.normalize(&state.catalog)?;
    let max_retries = req.resolve_max_retries(state.default_max_retries)?;
    let record = JobRecord::new(spec);

    if state.jobs.insert_if_absent(&record).await? {
        tracing::info!(
            job_id = record.job_id(),
            models = record.spec.models().len(),
            regions = record.spec.regions().len(),
            questions = record.spec.questions().len(),
            "Job created"
        );
    } else {
        let existing = state
            .jobs
            .find_by_id(record.job_id())
            .await?
            .ok_or_else(|| JobError::NotFound(record.job_id().to_string()))?;

        if existing.spec != record.spec {
            return Err(JobError::Conflict(record.job_id().to_string()));
        }
        if existing.status == JobStatus::Cancelled {
            return Err(JobError::Cancelled(record.job_id().to_string()));
        }
        tracing::info!(job_id = record.job_id(), "Job resubmitted");
    }

    fan_out(state, &record.spec, max_retries).await
}

/// Create one execution unit per (model, allowed region, question) and
/// enqueue every newly created unit with `normal` priority.
///
/// Units that already exist are counted but not re-enqueued. An enqueue
/// failure leaves the created unit `pending`; the recovery sweep picks it up.
pub async fn fan_out(
    state: &AppState,
    spec: &NormalizedJobSpec,
    max_retries: u32,
) -> Result<FanOutReport, JobError> {
    if let Some(model) = first_duplicate(spec.models()) {
        tracing::error!(job_id = spec.job_id(), model, "Duplicate model reached fan-out");
        return Err(JobError::InvariantViolation(format!(
            "model '{}' appears more than once in job '{}'",
            model,
            spec.job_id()
        )));
    }

    let mut report = FanOutReport {
        job_id: spec.job_id().to_string(),
        expected: spec.expected_units() as u64,
        ..Default::default()
    };

    for model in spec.models() {
        for region in spec.regions_for(model) {
            for question in spec.questions() {
                let key = UnitKey::new(spec.job_id(), model.as_str(), region, question.as_str());
                let unit = ExecutionUnit::new(key, max_retries);

                if !state.executions.create_if_absent(&unit).await? {
                    report.already_present += 1;
                    continue;
                }
                report.created += 1;

                match state.queue.enqueue(unit.id, region, PriorityClass::Normal).await {
                    Ok(_) => report.enqueued += 1,
                    Err(err) => {
                        report.enqueue_failures += 1;
                        tracing::warn!(
                            execution_id = %unit.id,
                            region,
                            error = %err,
                            "Enqueue failed, unit left pending for the recovery sweep"
                        );
                    }
                }
            }
        }
    }

    report.total_executions = report.enqueued + report.already_present;

    if report.is_complete() {
        tracing::info!(
            job_id = spec.job_id(),
            created = report.created,
            already_present = report.already_present,
            total_executions = report.total_executions,
            "Job fanned out"
        );
    } else {
        tracing::error!(
            job_id = spec.job_id(),
            expected = report.expected,
            total_executions = report.total_executions,
            enqueue_failures = report.enqueue_failures,
            "Fan-out total does not match the expected unit count"
        );
    }

    Ok(report)
}

/// Get a job by ID
pub async fn get_job(state: &AppState, job_id: &str) -> Result<JobRecord, JobError> {
    state
        .jobs
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| JobError::NotFound(job_id.to_string()))
}

/// List every execution unit of a job
pub async fn list_executions(
    state: &AppState,
    job_id: &str,
) -> Result<Vec<ExecutionUnit>, JobError> {
    get_job(state, job_id).await?;
    Ok(state.executions.list_by_job(job_id).await?)
}

/// Cancel a job: every `pending` unit becomes `cancelled`.
///
/// Units already `running` are left to finish or time out.
pub async fn cancel_job(state: &AppState, job_id: &str) -> Result<CancelReport, JobError> {
    get_job(state, job_id).await?;

    state.jobs.update_status(job_id, JobStatus::Cancelled).await?;
    let cancelled_units = state.executions.cancel_pending(job_id, Utc::now()).await?;

    tracing::info!(job_id, cancelled_units, "Job cancelled");

    Ok(CancelReport {
        job_id: job_id.to_string(),
        cancelled_units,
    })
}
