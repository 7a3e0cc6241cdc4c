//! Validation errors
//!
//! Raised synchronously while normalizing caller input. None of these
//! variants is ever produced after state has been mutated.

use thiserror::Error;

/// Rejection reasons for a job submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job id must not be empty")]
    EmptyJobId,

    #[error("job has no valid model identifiers")]
    EmptyModelSet,

    #[error("job has no questions")]
    EmptyQuestionSet,

    #[error("job has no target regions")]
    EmptyRegionSet,

    #[error("question at index {0} is blank")]
    BlankQuestion(usize),

    #[error("question '{0}' appears more than once")]
    DuplicateQuestion(String),

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("region override for unknown model '{0}'")]
    OverrideForUnknownModel(String),

    #[error("model '{model}' is restricted to region '{region}' which the job does not target")]
    OverrideOutsideJobRegions { model: String, region: String },

    #[error("max_retries {value} exceeds the limit of {limit}")]
    InvalidMaxRetries { value: u32, limit: u32 },
}

impl ValidationError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyJobId => "EmptyJobId",
            ValidationError::EmptyModelSet => "EmptyModelSet",
            ValidationError::EmptyQuestionSet => "EmptyQuestionSet",
            ValidationError::EmptyRegionSet => "EmptyRegionSet",
            ValidationError::BlankQuestion(_) => "BlankQuestion",
            ValidationError::DuplicateQuestion(_) => "DuplicateQuestion",
            ValidationError::UnknownRegion(_) => "UnknownRegion",
            ValidationError::OverrideForUnknownModel(_) => "OverrideForUnknownModel",
            ValidationError::OverrideOutsideJobRegions { .. } => "OverrideOutsideJobRegions",
            ValidationError::InvalidMaxRetries { .. } => "InvalidMaxRetries",
        }
    }
}
