//! Model set normalization
//!
//! The one place where duplicate model identifiers are suppressed. Everything
//! downstream of [`normalize_models`] trusts that its model list is distinct.

use std::collections::HashSet;

use crate::error::ValidationError;

/// A model identifier dropped during normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedModel {
    /// Identifier as submitted (untrimmed)
    pub model_id: String,
    /// Zero-based position in the submitted sequence
    pub position: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Identifier already seen earlier in the sequence
    Duplicate,
    /// Identifier is empty or whitespace
    Blank,
}

/// Output of the normalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedModels {
    pub models: Vec<String>,
    pub skipped: Vec<SkippedModel>,
}

/// Removes duplicate and blank model identifiers, keeping first occurrences in order.
///
/// Each dropped identifier is reported through a `warn` event and in
/// [`NormalizedModels::skipped`]. Fails with [`ValidationError::EmptyModelSet`]
/// when nothing valid remains.
pub fn normalize_models<S: AsRef<str>>(input: &[S]) -> Result<NormalizedModels, ValidationError> {
    let mut seen = HashSet::with_capacity(input.len());
    let mut models = Vec::with_capacity(input.len());
    let mut skipped = Vec::new();

    for (position, raw) in input.iter().enumerate() {
        let raw = raw.as_ref();
        let model_id = raw.trim();

        if model_id.is_empty() {
            tracing::warn!(position, "Skipping blank model identifier");
            skipped.push(SkippedModel {
                model_id: raw.to_string(),
                position,
                reason: SkipReason::Blank,
            });
            continue;
        }

        if !seen.insert(model_id.to_string()) {
            tracing::warn!(model_id, position, "Skipping duplicate model identifier");
            skipped.push(SkippedModel {
                model_id: raw.to_string(),
                position,
                reason: SkipReason::Duplicate,
            });
            continue;
        }

        models.push(model_id.to_string());
    }

    if models.is_empty() {
        return Err(ValidationError::EmptyModelSet);
    }

    Ok(NormalizedModels { models, skipped })
}

/// Returns the first identifier that occurs more than once, if any.
///
/// Used by downstream components to assert the normalizer's invariant
/// without repairing it.
pub fn first_duplicate<S: AsRef<str>>(models: &[S]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(models.len());
    models
        .iter()
        .map(|model| model.as_ref())
        .find(|model| !seen.insert(*model))
}
