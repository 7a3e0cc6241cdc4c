//! Job domain types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::normalize::normalize_models;
use crate::region::RegionCatalog;

/// Caller-supplied description of a benchmark job
///
/// Models may contain duplicates at this stage; regions may use aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: String,
    pub models: Vec<String>,
    pub questions: Vec<String>,
    pub regions: Vec<String>,
    /// Per-model region restrictions. A model listed here only runs in the
    /// listed regions; unlisted models run in every job region.
    #[serde(default)]
    pub model_regions: BTreeMap<String, Vec<String>>,
}

/// A job spec that passed normalization
///
/// Models are distinct, regions canonical and distinct, overrides resolved.
/// The fan-out only accepts this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedJobSpec {
    job_id: String,
    models: Vec<String>,
    questions: Vec<String>,
    regions: Vec<String>,
    model_regions: BTreeMap<String, Vec<String>>,
}

impl JobSpec {
    /// Validates and canonicalizes the spec
    pub fn normalize(&self, catalog: &RegionCatalog) -> Result<NormalizedJobSpec, ValidationError> {
        let job_id = self.job_id.trim();
        if job_id.is_empty() {
            return Err(ValidationError::EmptyJobId);
        }

        let models = normalize_models(&self.models)?.models;
        let questions = normalize_questions(&self.questions)?;

        let regions = canonical_regions(catalog, &self.regions)?;
        if regions.is_empty() {
            return Err(ValidationError::EmptyRegionSet);
        }

        let mut model_regions = BTreeMap::new();
        for (model, allowed) in &self.model_regions {
            let model = model.trim();
            if !models.iter().any(|m| m == model) {
                return Err(ValidationError::OverrideForUnknownModel(model.to_string()));
            }

            let allowed = canonical_regions(catalog, allowed)?;
            if let Some(outside) = allowed.iter().find(|r| !regions.contains(*r)) {
                return Err(ValidationError::OverrideOutsideJobRegions {
                    model: model.to_string(),
                    region: outside.clone(),
                });
            }

            if allowed.is_empty() {
                tracing::warn!(job_id, model, "Model restricted to an empty region set");
            }
            model_regions.insert(model.to_string(), allowed);
        }

        Ok(NormalizedJobSpec {
            job_id: job_id.to_string(),
            models,
            questions,
            regions,
            model_regions,
        })
    }
}

impl NormalizedJobSpec {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Questions in submission order; retry requests index into this
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn model_regions(&self) -> &BTreeMap<String, Vec<String>> {
        &self.model_regions
    }

    /// Regions a model may run in, in job region order
    pub fn regions_for(&self, model: &str) -> Vec<&str> {
        match self.model_regions.get(model) {
            Some(allowed) => self
                .regions
                .iter()
                .filter(|region| allowed.contains(*region))
                .map(String::as_str)
                .collect(),
            None => self.regions.iter().map(String::as_str).collect(),
        }
    }

    /// Number of execution units a complete fan-out produces
    pub fn expected_units(&self) -> usize {
        self.models
            .iter()
            .map(|model| self.regions_for(model).len() * self.questions.len())
            .sum()
    }

    /// Resolves a zero-based question index; negative or out-of-range yields `None`
    pub fn question_at(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.questions.get(idx))
            .map(String::as_str)
    }
}

/// Persisted job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub spec: NormalizedJobSpec,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobRecord {
    pub fn new(spec: NormalizedJobSpec) -> Self {
        let now = chrono::Utc::now();
        Self {
            spec,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job_id(&self) -> &str {
        self.spec.job_id()
    }
}

/// Job-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(JobStatus::Active),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn normalize_questions(questions: &[String]) -> Result<Vec<String>, ValidationError> {
    if questions.is_empty() {
        return Err(ValidationError::EmptyQuestionSet);
    }

    let mut normalized: Vec<String> = Vec::with_capacity(questions.len());
    for (index, question) in questions.iter().enumerate() {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::BlankQuestion(index));
        }
        if normalized.iter().any(|q| q == question) {
            return Err(ValidationError::DuplicateQuestion(question.to_string()));
        }
        normalized.push(question.to_string());
    }

    Ok(normalized)
}

/// Canonicalizes a region list, collapsing aliases of the same region
fn canonical_regions(
    catalog: &RegionCatalog,
    input: &[String],
) -> Result<Vec<String>, ValidationError> {
    let mut regions: Vec<String> = Vec::with_capacity(input.len());
    for raw in input {
        let code = catalog
            .canonicalize(raw)
            .ok_or_else(|| ValidationError::UnknownRegion(raw.clone()))?;
        if !regions.iter().any(|r| r == code) {
            regions.push(code.to_string());
        }
    }
    Ok(regions)
}
