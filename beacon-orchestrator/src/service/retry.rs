//! Retry Service
//!
//! Re-submits failed execution units. All validation happens before the
//! store is touched; the bookkeeping itself is one conditional update, so a
//! retry either fully applies or leaves the unit exactly as it was.

use beacon_core::domain::execution::{ExecutionStatus, ExecutionUnit, RetryOrigin, UnitKey};
use beacon_core::domain::job::JobStatus;
use beacon_core::dto::execution::{RetryRequest, RetryResponse};
use beacon_core::dto::job::RecoveryReport;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::StoreError;
use crate::state::AppState;

/// Service error type
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("execution '{0}' not found")]
    NotFound(String),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("execution {execution_id} is {status} and cannot be retried")]
    InvalidState {
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error("execution {execution_id} has used {retry_count} of {max_retries} retries")]
    RetriesExhausted {
        execution_id: Uuid,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("question index {index} is out of range for a job with {len} questions")]
    InvalidQuestionIndex { index: i64, len: usize },

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("job '{0}' has been cancelled")]
    JobCancelled(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Retry the unit identified by its natural key.
///
/// `origin` decides the queue priority: user retries go out as
/// `region_retry`, global recovery as `global_retry`.
pub async fn retry(
    state: &AppState,
    key: &UnitKey,
    origin: RetryOrigin,
) -> Result<ExecutionUnit, RetryError> {
    let unit = state
        .executions
        .find_by_key(key)
        .await?
        .ok_or_else(|| RetryError::NotFound(key.to_string()))?;

    retry_unit(state, unit, origin).await
}

/// Retry one question of an execution's job in the requested region.
///
/// The execution identified by `execution_id` anchors the job and model; the
/// target unit is (job, model, region, question at `question_index`).
pub async fn retry_question(
    state: &AppState,
    execution_id: Uuid,
    req: RetryRequest,
) -> Result<RetryResponse, RetryError> {
    let anchor = state
        .executions
        .find_by_id(execution_id)
        .await?
        .ok_or_else(|| RetryError::NotFound(execution_id.to_string()))?;

    let job = state
        .jobs
        .find_by_id(&anchor.job_id)
        .await?
        .ok_or_else(|| RetryError::JobNotFound(anchor.job_id.clone()))?;

    let question = job.spec.question_at(req.question_index).ok_or_else(|| {
        RetryError::InvalidQuestionIndex {
            index: req.question_index,
            len: job.spec.questions().len(),
        }
    })?;

    let region = state
        .catalog
        .canonicalize(&req.region)
        .ok_or_else(|| RetryError::UnknownRegion(req.region.clone()))?;

    if job.status == JobStatus::Cancelled {
        return Err(RetryError::JobCancelled(anchor.job_id));
    }

    let key = UnitKey::new(&anchor.job_id, &anchor.model_id, region, question);
    let unit = retry(state, &key, RetryOrigin::User).await?;

    if settle_if_cancelled(state, &anchor.job_id).await? {
        return Err(RetryError::JobCancelled(anchor.job_id));
    }

    tracing::info!(
        execution_id = %unit.id,
        region = %unit.region,
        question_index = req.question_index,
        attempt = unit.retry_count,
        "Execution queued for retry"
    );

    Ok(RetryResponse {
        execution_id: unit.id,
        region: unit.region,
        question_index: req.question_index,
        status: unit.status,
        retry_attempt: unit.retry_count,
        updated_at: unit.updated_at,
    })
}

/// System-initiated recovery of every failed unit of a job.
///
/// Units with budget left are re-enqueued as `global_retry`; exhausted units
/// are counted and left alone.
pub async fn recover_job(state: &AppState, job_id: &str) -> Result<RecoveryReport, RetryError> {
    let job = state
        .jobs
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| RetryError::JobNotFound(job_id.to_string()))?;

    if job.status == JobStatus::Cancelled {
        return Err(RetryError::JobCancelled(job_id.to_string()));
    }

    let mut report = RecoveryReport {
        job_id: job_id.to_string(),
        ..Default::default()
    };

    let units = state.executions.list_by_job(job_id).await?;
    for unit in units.into_iter().filter(|u| u.status.is_retryable()) {
        if unit.retry_count >= unit.max_retries {
            report.exhausted += 1;
            continue;
        }

        let retried = state
            .executions
            .begin_retry(unit.id, unit.status, RetryOrigin::GlobalRecovery, Utc::now())
            .await?;

        match retried {
            Some(updated) => {
                enqueue_retry(state, &updated, RetryOrigin::GlobalRecovery).await;
                report.retried += 1;
            }
            None => report.skipped += 1,
        }
    }

    if report.retried > 0 && settle_if_cancelled(state, job_id).await? {
        return Err(RetryError::JobCancelled(job_id.to_string()));
    }

    tracing::info!(
        job_id,
        retried = report.retried,
        exhausted = report.exhausted,
        skipped = report.skipped,
        "Global recovery finished"
    );

    Ok(report)
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn retry_unit(
    state: &AppState,
    unit: ExecutionUnit,
    origin: RetryOrigin,
) -> Result<ExecutionUnit, RetryError> {
    ensure_retryable(&unit)?;

    let retried = state
        .executions
        .begin_retry(unit.id, unit.status, origin, Utc::now())
        .await?;

    let Some(updated) = retried else {
        // Another writer moved the unit first; report its current state
        let current = state
            .executions
            .find_by_id(unit.id)
            .await?
            .ok_or_else(|| RetryError::NotFound(unit.id.to_string()))?;
        ensure_retryable(&current)?;
        return Err(RetryError::InvalidState {
            execution_id: current.id,
            status: current.status,
        });
    };

    enqueue_retry(state, &updated, origin).await;
    Ok(updated)
}

/// Re-reads the job after a retry was applied. A cancel that landed in
/// between left the retried unit `pending`; cancel it now.
async fn settle_if_cancelled(state: &AppState, job_id: &str) -> Result<bool, RetryError> {
    let cancelled = state
        .jobs
        .find_by_id(job_id)
        .await?
        .is_some_and(|job| job.status == JobStatus::Cancelled);

    if cancelled {
        let swept = state.executions.cancel_pending(job_id, Utc::now()).await?;
        tracing::warn!(job_id, cancelled = swept, "Job cancelled during retry, retried units cancelled");
    }

    Ok(cancelled)
}

fn ensure_retryable(unit: &ExecutionUnit) -> Result<(), RetryError> {
    if !unit.status.is_retryable() {
        return Err(RetryError::InvalidState {
            execution_id: unit.id,
            status: unit.status,
        });
    }
    if unit.retry_count >= unit.max_retries {
        return Err(RetryError::RetriesExhausted {
            execution_id: unit.id,
            retry_count: unit.retry_count,
            max_retries: unit.max_retries,
        });
    }
    Ok(())
}

/// The unit is already `pending`, so a failed enqueue is healed by the
/// recovery sweep rather than reported to the caller.
async fn enqueue_retry(state: &AppState, unit: &ExecutionUnit, origin: RetryOrigin) {
    if let Err(err) = state
        .queue
        .enqueue(unit.id, &unit.region, origin.priority())
        .await
    {
        tracing::warn!(
            execution_id = %unit.id,
            region = %unit.region,
            error = %err,
            "Retry enqueue failed, unit left pending for the recovery sweep"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use beacon_core::domain::job::JobSpec;
    use beacon_core::domain::queue::PriorityClass;
    use beacon_core::dto::job::SubmitJob;

    use super::*;
    use crate::repository::{ExecutionRepository, RegionQueue};
    use crate::service::job_service;
    use crate::test_support::{CancelAfterFirstRead, Fixture};

    async fn submitted(fixture: &Fixture) -> Vec<ExecutionUnit> {
        let req = SubmitJob {
            spec: JobSpec {
                job_id: "bias-job-1".to_string(),
                models: vec!["llama3.2-1b".to_string()],
                questions: vec!["math_basic".to_string(), "taiwan_status".to_string()],
                regions: vec!["US".to_string(), "EU".to_string()],
                model_regions: BTreeMap::new(),
            },
            max_retries: None,
        };
        job_service::submit_job(&fixture.state, req).await.unwrap();

        // Drain the fan-out entries so only retry entries remain queued
        for region in ["us-east", "eu-west"] {
            while fixture.queue.dequeue(region).await.unwrap().is_some() {}
        }
        fixture.executions.list_by_job("bias-job-1").await.unwrap()
    }

    fn find<'a>(units: &'a [ExecutionUnit], region: &str, question: &str) -> &'a ExecutionUnit {
        units
            .iter()
            .find(|u| u.region == region && u.question_id == question)
            .unwrap()
    }

    async fn stage(fixture: &Fixture, unit: &ExecutionUnit, status: ExecutionStatus, retry_count: u32) {
        let mut staged = unit.clone();
        staged.status = status;
        staged.retry_count = retry_count;
        if status.is_retryable() {
            staged.original_error = Some("provider unreachable".to_string());
        }
        fixture.executions.put(staged).await;
    }

    #[tokio::test]
    async fn test_exhausted_retry_is_rejected_without_mutation() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let unit = find(&units, "us-east", "math_basic");
        stage(&fixture, unit, ExecutionStatus::Failed, 3).await;

        let err = retry(&fixture.state, &unit.key(), RetryOrigin::User)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetryError::RetriesExhausted {
                retry_count: 3,
                max_retries: 3,
                ..
            }
        ));

        let stored = fixture.executions.find_by_id(unit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.retry_count, 3);
        assert!(stored.retry_history.is_empty());
        assert_eq!(fixture.queue.depth("us-east").await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_question_index_bounds_checked_before_mutation() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let anchor = find(&units, "us-east", "math_basic");
        stage(&fixture, anchor, ExecutionStatus::Failed, 0).await;

        for index in [-1, 2, 99] {
            let req = RetryRequest {
                region: "us-east".to_string(),
                question_index: index,
            };
            let err = retry_question(&fixture.state, anchor.id, req)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RetryError::InvalidQuestionIndex { len: 2, .. }
            ));
        }

        let stored = fixture.executions.find_by_id(anchor.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn test_user_retry_targets_question_and_region() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let anchor = find(&units, "us-east", "math_basic");
        let target = find(&units, "eu-west", "taiwan_status");
        stage(&fixture, target, ExecutionStatus::Timeout, 0).await;

        let req = RetryRequest {
            region: "EU".to_string(),
            question_index: 1,
        };
        let response = retry_question(&fixture.state, anchor.id, req).await.unwrap();

        assert_eq!(response.execution_id, target.id);
        assert_eq!(response.region, "eu-west");
        assert_eq!(response.status, ExecutionStatus::Pending);
        assert_eq!(response.retry_attempt, 1);

        let stored = fixture.executions.find_by_id(target.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_history.len(), 1);
        assert_eq!(stored.retry_history[0].prior_status, ExecutionStatus::Timeout);
        assert_eq!(stored.retry_history[0].origin, RetryOrigin::User);
        assert_eq!(stored.original_error.as_deref(), Some("provider unreachable"));
        assert!(stored.last_retry_at.is_some());

        let entry = fixture.queue.dequeue("eu-west").await.unwrap().unwrap();
        assert_eq!(entry.execution_id, target.id);
        assert_eq!(entry.priority, PriorityClass::RegionRetry);
    }

    #[tokio::test]
    async fn test_non_retryable_states_rejected() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let unit = find(&units, "us-east", "math_basic");

        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Cancelled,
        ] {
            stage(&fixture, unit, status, 0).await;
            let err = retry(&fixture.state, &unit.key(), RetryOrigin::User)
                .await
                .unwrap_err();
            assert!(
                matches!(err, RetryError::InvalidState { status: s, .. } if s == status),
                "expected InvalidState for {status}"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_region_rejected() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let anchor = find(&units, "us-east", "math_basic");

        let req = RetryRequest {
            region: "mars-north".to_string(),
            question_index: 0,
        };
        let err = retry_question(&fixture.state, anchor.id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::UnknownRegion(_)));
    }

    #[tokio::test]
    async fn test_retry_count_never_exceeds_limit() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let unit = find(&units, "us-east", "math_basic");

        let mut accepted = 0;
        for _ in 0..6 {
            let current = fixture.executions.find_by_id(unit.id).await.unwrap().unwrap();
            stage(&fixture, &current, ExecutionStatus::Failed, current.retry_count).await;
            if retry(&fixture.state, &unit.key(), RetryOrigin::User).await.is_ok() {
                accepted += 1;
            }
        }

        let stored = fixture.executions.find_by_id(unit.id).await.unwrap().unwrap();
        assert_eq!(accepted, 3);
        assert_eq!(stored.retry_count, stored.max_retries);
        assert_eq!(stored.retry_history.len(), 3);
    }

    #[tokio::test]
    async fn test_recover_job_uses_global_priority_and_skips_exhausted() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        stage(&fixture, find(&units, "us-east", "math_basic"), ExecutionStatus::Failed, 0).await;
        stage(&fixture, find(&units, "us-east", "taiwan_status"), ExecutionStatus::Failed, 3).await;
        stage(&fixture, find(&units, "eu-west", "math_basic"), ExecutionStatus::Completed, 0).await;

        let report = recover_job(&fixture.state, "bias-job-1").await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.exhausted, 1);

        let entry = fixture.queue.dequeue("us-east").await.unwrap().unwrap();
        assert_eq!(entry.priority, PriorityClass::GlobalRetry);
        assert!(fixture.queue.dequeue("us-east").await.unwrap().is_none());

        let stored = fixture.executions.find_by_id(entry.execution_id).await.unwrap().unwrap();
        assert_eq!(stored.retry_history[0].origin, RetryOrigin::GlobalRecovery);
    }

    #[tokio::test]
    async fn test_cancelled_job_cannot_be_retried() {
        let fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let anchor = find(&units, "us-east", "math_basic");
        stage(&fixture, anchor, ExecutionStatus::Failed, 0).await;
        job_service::cancel_job(&fixture.state, "bias-job-1").await.unwrap();

        let req = RetryRequest {
            region: "US".to_string(),
            question_index: 0,
        };
        let err = retry_question(&fixture.state, anchor.id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::JobCancelled(_)));
        assert!(matches!(
            recover_job(&fixture.state, "bias-job-1").await,
            Err(RetryError::JobCancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_racing_a_retry_leaves_nothing_pending() {
        let mut fixture = Fixture::new();
        let units = submitted(&fixture).await;
        let anchor = find(&units, "us-east", "math_basic");
        stage(&fixture, anchor, ExecutionStatus::Failed, 0).await;

        // The job reads as active once, then a concurrent cancel flips it
        fixture.state.jobs = Arc::new(CancelAfterFirstRead::new(fixture.state.jobs.clone()));

        let req = RetryRequest {
            region: "US".to_string(),
            question_index: 0,
        };
        let err = retry_question(&fixture.state, anchor.id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::JobCancelled(_)));

        let units = fixture.executions.list_by_job("bias-job-1").await.unwrap();
        assert!(units.iter().all(|u| u.status != ExecutionStatus::Pending));
        assert_eq!(find(&units, "us-east", "math_basic").status, ExecutionStatus::Cancelled);
    }
}
