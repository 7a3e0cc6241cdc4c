//! Cross-region diff read model
//!
//! Never persisted. Built either from a precomputed aggregation or
//! reconstructed from raw execution units on every read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::{ExecutionStatus, ExecutionUnit};
use crate::region::RegionCatalog;

/// Where a diff view came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Precomputed,
    Reconstructed,
}

/// Per-job comparison of results across regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRegionDiffView {
    pub job_id: String,
    pub provenance: Provenance,
    /// Only regions that have at least one execution unit appear here
    pub regions: BTreeMap<String, RegionGroup>,
    pub summary: DiffSummary,
    /// Bias metrics, only supplied by the precomputed aggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<DiffAnalysis>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffAnalysis {
    pub bias_variance: f64,
    pub censorship_rate: f64,
    pub factual_consistency: f64,
    pub narrative_divergence: f64,
}

/// Execution units and statistics for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionGroup {
    pub region: String,
    /// Empty for precomputed views, which carry statistics only
    #[serde(default)]
    pub executions: Vec<ExecutionUnit>,
    pub execution_count: u64,
    pub completed_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub total_regions: u64,
    pub total_executions: u64,
    pub completed_executions: u64,
    pub success_rate: f64,
}

impl RegionGroup {
    /// Builds a statistics-only group
    pub fn from_counts(region: impl Into<String>, execution_count: u64, completed_count: u64) -> Self {
        Self {
            region: region.into(),
            executions: Vec::new(),
            execution_count,
            completed_count,
            success_rate: ratio(completed_count, execution_count),
        }
    }
}

impl CrossRegionDiffView {
    /// Assembles a view from region groups, computing the summary
    pub fn from_groups(
        job_id: impl Into<String>,
        provenance: Provenance,
        groups: impl IntoIterator<Item = RegionGroup>,
    ) -> Self {
        let regions: BTreeMap<String, RegionGroup> = groups
            .into_iter()
            .map(|group| (group.region.clone(), group))
            .collect();

        let total_executions = regions.values().map(|g| g.execution_count).sum();
        let completed_executions = regions.values().map(|g| g.completed_count).sum();

        Self {
            job_id: job_id.into(),
            provenance,
            summary: DiffSummary {
                total_regions: regions.len() as u64,
                total_executions,
                completed_executions,
                success_rate: ratio(completed_executions, total_executions),
            },
            regions,
            analysis: None,
            generated_at: Utc::now(),
        }
    }
}

/// Rebuilds a diff view directly from a job's execution units.
///
/// Units are grouped by canonical region. Returns `None` when there are no
/// units at all; regions without units are absent from the result.
pub fn reconstruct(
    job_id: &str,
    units: Vec<ExecutionUnit>,
    catalog: &RegionCatalog,
) -> Option<CrossRegionDiffView> {
    if units.is_empty() {
        return None;
    }

    let mut by_region: BTreeMap<String, Vec<ExecutionUnit>> = BTreeMap::new();
    for unit in units {
        let region = catalog
            .canonicalize(&unit.region)
            .map(str::to_string)
            .unwrap_or_else(|| unit.region.clone());
        by_region.entry(region).or_default().push(unit);
    }

    let groups = by_region.into_iter().map(|(region, executions)| {
        let execution_count = executions.len() as u64;
        let completed_count = executions
            .iter()
            .filter(|unit| unit.status == ExecutionStatus::Completed)
            .count() as u64;
        RegionGroup {
            region,
            executions,
            execution_count,
            completed_count,
            success_rate: ratio(completed_count, execution_count),
        }
    });

    Some(CrossRegionDiffView::from_groups(
        job_id,
        Provenance::Reconstructed,
        groups,
    ))
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::UnitKey;

    fn unit(region: &str, question: &str, status: ExecutionStatus) -> ExecutionUnit {
        let mut unit = ExecutionUnit::new(UnitKey::new("job-x", "llama3.2-1b", region, question), 3);
        unit.status = status;
        unit
    }

    #[test]
    fn test_reconstruct_all_completed_across_three_regions() {
        let catalog = RegionCatalog::default();
        let mut units = Vec::new();
        for region in ["us-east", "eu-west", "asia-pacific"] {
            for question in ["q1", "q2"] {
                units.push(unit(region, question, ExecutionStatus::Completed));
            }
        }

        let view = reconstruct("job-x", units, &catalog).unwrap();
        assert_eq!(view.provenance, Provenance::Reconstructed);
        assert_eq!(view.regions.len(), 3);
        for group in view.regions.values() {
            assert_eq!(group.execution_count, 2);
            assert_eq!(group.completed_count, 2);
            assert_eq!(group.success_rate, 1.0);
        }
        assert_eq!(view.summary.total_executions, 6);
        assert_eq!(view.summary.success_rate, 1.0);
    }

    #[test]
    fn test_reconstruct_only_regions_with_data() {
        let catalog = RegionCatalog::default();
        let units = vec![
            unit("us-east", "q1", ExecutionStatus::Completed),
            unit("us-east", "q2", ExecutionStatus::Failed),
            unit("eu-west", "q1", ExecutionStatus::Completed),
        ];

        let view = reconstruct("job-x", units, &catalog).unwrap();
        assert_eq!(view.regions.len(), 2);
        assert!(!view.regions.contains_key("asia-pacific"));

        let us = &view.regions["us-east"];
        assert_eq!(us.execution_count, 2);
        assert_eq!(us.completed_count, 1);
        assert_eq!(us.success_rate, 0.5);
        assert_eq!(view.summary.total_regions, 2);
        assert_eq!(view.summary.completed_executions, 2);
    }

    #[test]
    fn test_reconstruct_empty_is_none() {
        assert!(reconstruct("job-x", Vec::new(), &RegionCatalog::default()).is_none());
    }

    #[test]
    fn test_aliased_region_grouped_under_canonical_code() {
        let catalog = RegionCatalog::default();
        let units = vec![
            unit("us-east", "q1", ExecutionStatus::Completed),
            unit("US", "q2", ExecutionStatus::Completed),
        ];
        let view = reconstruct("job-x", units, &catalog).unwrap();
        assert_eq!(view.regions.len(), 1);
        assert_eq!(view.regions["us-east"].execution_count, 2);
    }
}
