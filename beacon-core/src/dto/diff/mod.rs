//! Aggregation service DTOs
//!
//! Shape returned by `GET /api/v1/diffs/cross-region/{job_id}` on the diffs
//! service, and its conversion into a [`CrossRegionDiffView`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::diff::{CrossRegionDiffView, DiffAnalysis, Provenance, RegionGroup};
use crate::region::RegionCatalog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedDiff {
    pub job_id: String,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub analysis: Option<DiffAnalysis>,
    #[serde(default)]
    pub executions: Vec<PrecomputedExecution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedExecution {
    pub region: String,
    pub status: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
}

impl PrecomputedDiff {
    /// Converts the aggregation into a diff view.
    ///
    /// Returns `None` when the aggregation carries no executions, which the
    /// reconciler treats like any other fast-path failure.
    pub fn into_view(self, catalog: &RegionCatalog) -> Option<CrossRegionDiffView> {
        if self.executions.is_empty() {
            return None;
        }

        let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for execution in &self.executions {
            let region = catalog
                .canonicalize(&execution.region)
                .map(str::to_string)
                .unwrap_or_else(|| execution.region.clone());
            let entry = counts.entry(region).or_default();
            entry.0 += 1;
            if execution.status.eq_ignore_ascii_case("completed") {
                entry.1 += 1;
            }
        }

        let groups = counts
            .into_iter()
            .map(|(region, (total, completed))| RegionGroup::from_counts(region, total, completed));

        let mut view = CrossRegionDiffView::from_groups(self.job_id, Provenance::Precomputed, groups);
        view.analysis = self.analysis;
        if let Some(generated_at) = self.generated_at {
            view.generated_at = generated_at;
        }
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_payload_converts_to_view() {
        let payload = r#"{
            "job_id": "bias-job-1",
            "generated_at": "2025-09-01T12:00:00Z",
            "analysis": {
                "bias_variance": 0.23,
                "censorship_rate": 0.15,
                "factual_consistency": 0.87,
                "narrative_divergence": 0.31
            },
            "executions": [
                {"region": "US", "status": "completed", "provider_id": "0x1234"},
                {"region": "EU", "status": "completed"},
                {"region": "ASIA", "status": "failed"}
            ]
        }"#;
        let diff: PrecomputedDiff = serde_json::from_str(payload).unwrap();
        let view = diff.into_view(&RegionCatalog::default()).unwrap();

        assert_eq!(view.provenance, Provenance::Precomputed);
        assert_eq!(view.regions.len(), 3);
        assert_eq!(view.regions["us-east"].success_rate, 1.0);
        assert_eq!(view.regions["asia-pacific"].completed_count, 0);
        assert_eq!(view.summary.completed_executions, 2);
        assert!(view.analysis.is_some());
    }

    #[test]
    fn test_empty_aggregation_is_rejected() {
        let diff = PrecomputedDiff {
            job_id: "bias-job-1".to_string(),
            generated_at: None,
            analysis: None,
            executions: Vec::new(),
        };
        assert!(diff.into_view(&RegionCatalog::default()).is_none());
    }
}
