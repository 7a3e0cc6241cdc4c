//! Cross-Region Diff Service
//!
//! Serves the cross-region comparison of a job. The precomputed aggregation
//! is tried first; any failure there falls back to rebuilding the view from
//! the execution units, which are always authoritative.

use beacon_core::domain::diff::{self, CrossRegionDiffView};
use thiserror::Error;
use tokio::time;

use crate::repository::StoreError;
use crate::state::AppState;

/// Service error type
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("no execution data for job '{0}'")]
    NoExecutionData(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn get_cross_region_diff(
    state: &AppState,
    job_id: &str,
) -> Result<CrossRegionDiffView, DiffError> {
    let lookup = time::timeout(
        state.aggregation_timeout,
        state.aggregation.cross_region_diff(job_id),
    )
    .await;

    match lookup {
        Ok(Ok(precomputed)) if precomputed.job_id != job_id => {
            tracing::warn!(
                job_id,
                returned_job_id = %precomputed.job_id,
                "Diff service answered for another job, reconstructing"
            );
        }
        Ok(Ok(precomputed)) => match precomputed.into_view(&state.catalog) {
            Some(view) => {
                tracing::debug!(job_id, "Serving precomputed cross-region diff");
                return Ok(view);
            }
            None => {
                tracing::warn!(job_id, "Precomputed diff was empty, reconstructing");
            }
        },
        Ok(Err(err)) => {
            tracing::warn!(job_id, error = %err, "Diff service failed, reconstructing");
        }
        Err(_) => {
            tracing::warn!(
                job_id,
                timeout = ?state.aggregation_timeout,
                "Diff service timed out, reconstructing"
            );
        }
    }

    let units = state.executions.list_by_job(job_id).await?;
    let view = diff::reconstruct(job_id, units, &state.catalog)
        .ok_or_else(|| DiffError::NoExecutionData(job_id.to_string()))?;

    tracing::info!(
        job_id,
        regions = view.regions.len(),
        executions = view.summary.total_executions,
        "Reconstructed cross-region diff"
    );

    Ok(view)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
use std::time::{Duration, Instant};

    use beacon_core::domain::diff::Provenance;
    use beacon_core::domain::execution::{ExecutionStatus, ExecutionUnit, UnitKey};
    use beacon_core::dto::diff::{PrecomputedDiff, PrecomputedExecution};

    use super::*;
    use crate::test_support::{FixedAggregation, Fixture, HangingAggregation};

    async fn seed(fixture: &Fixture, job_id: &str, regions: &[&str], per_region: usize, status: ExecutionStatus) {
        for region in regions {
            for index in 0..per_region {
                let key = UnitKey::new(job_id, "llama3.2-1b", *region, format!("q{index}"));
                let mut unit = ExecutionUnit::new(key, 3);
                unit.status = status;
                fixture.executions.put(unit).await;
            }
        }
    }

    #[tokio::test]
    async fn test_reconstructs_when_aggregation_unreachable() {
        let fixture = Fixture::new();
        seed(
            &fixture,
            "job-x",
            &["us-east", "eu-west", "asia-pacific"],
            2,
            ExecutionStatus::Completed,
        )
        .await;

        let view = get_cross_region_diff(&fixture.state, "job-x").await.unwrap();
        assert_eq!(view.provenance, Provenance::Reconstructed);
        assert_eq!(view.regions.len(), 3);
        for group in view.regions.values() {
            assert_eq!(group.execution_count, 2);
            assert_eq!(group.success_rate, 1.0);
        }
    }

    #[tokio::test]
    async fn test_regions_without_data_are_absent() {
        let fixture = Fixture::new();
        seed(&fixture, "job-x", &["us-east"], 3, ExecutionStatus::Completed).await;
        seed(&fixture, "job-x", &["eu-west"], 1, ExecutionStatus::Failed).await;

        let view = get_cross_region_diff(&fixture.state, "job-x").await.unwrap();
        assert_eq!(view.regions.len(), 2);
        assert!(!view.regions.contains_key("asia-pacific"));
        assert_eq!(view.regions["us-east"].completed_count, 3);
        assert_eq!(view.regions["eu-west"].success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_no_units_is_no_execution_data() {
        let fixture = Fixture::new();
        let err = get_cross_region_diff(&fixture.state, "job-x").await.unwrap_err();
        assert!(matches!(err, DiffError::NoExecutionData(_)));
    }

    #[tokio::test]
    async fn test_precomputed_view_preferred() {
        let precomputed = PrecomputedDiff {
            job_id: "job-x".to_string(),
            generated_at: None,
            analysis: None,
            executions: vec![PrecomputedExecution {
                region: "US".to_string(),
                status: "completed".to_string(),
                provider_id: None,
                output: None,
            }],
        };
        let fixture = Fixture::with_aggregation(Arc::new(FixedAggregation(precomputed)));

        let view = get_cross_region_diff(&fixture.state, "job-x").await.unwrap();
        assert_eq!(view.provenance, Provenance::Precomputed);
        assert_eq!(view.regions["us-east"].execution_count, 1);
    }

    #[tokio::test]
    async fn test_empty_precomputed_view_falls_back() {
        let precomputed = PrecomputedDiff {
            job_id: "job-x".to_string(),
            generated_at: None,
            analysis: None,
            executions: Vec::new(),
        };
        let fixture = Fixture::with_aggregation(Arc::new(FixedAggregation(precomputed)));
        seed(&fixture, "job-x", &["eu-west"], 1, ExecutionStatus::Completed).await;

        let view = get_cross_region_diff(&fixture.state, "job-x").await.unwrap();
        assert_eq!(view.provenance, Provenance::Reconstructed);
    }

    #[tokio::test]
    async fn test_silent_aggregation_falls_back() {
        let mut fixture = Fixture::with_aggregation(Arc::new(HangingAggregation));
        fixture.state = fixture
            .state
            .clone()
            .with_aggregation_timeout(Duration::from_millis(50));
        seed(&fixture, "job-x", &["us-east"], 1, ExecutionStatus::Completed).await;

        let started = Instant::now();
        let view = get_cross_region_diff(&fixture.state, "job-x").await.unwrap();
        assert_eq!(view.provenance, Provenance::Reconstructed);
        assert_eq!(view.regions["us-east"].completed_count, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_precomputed_view_for_other_job_ignored() {
        let precomputed = PrecomputedDiff {
            job_id: "job-other".to_string(),
            generated_at: None,
            analysis: None,
            executions: vec![PrecomputedExecution {
                region: "US".to_string(),
                status: "failed".to_string(),
                provider_id: None,
                output: None,
            }],
        };
        let fixture = Fixture::with_aggregation(Arc::new(FixedAggregation(precomputed)));
        seed(&fixture, "job-x", &["eu-west"], 2, ExecutionStatus::Completed).await;

        let view = get_cross_region_diff(&fixture.state, "job-x").await.unwrap();
        assert_eq!(view.provenance, Provenance::Reconstructed);
        assert_eq!(view.job_id, "job-x");
        assert!(!view.regions.contains_key("us-east"));
        assert_eq!(view.regions["eu-west"].execution_count, 2);
    }
}
