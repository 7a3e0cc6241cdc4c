//! Region catalog
//!
//! Canonical region codes and the aliases that map onto them. The catalog is
//! configuration data: the orchestrator loads it once and every component that
//! touches a region code (fan-out, retry, cross-region reconciliation) goes
//! through [`RegionCatalog::canonicalize`].

use serde::{Deserialize, Serialize};

/// One canonical region and the inputs accepted for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDefinition {
    /// Canonical code, e.g. "us-east"
    pub code: String,
    /// Human readable name
    pub name: String,
    /// Alternate spellings accepted on input, e.g. "US"
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// The set of regions jobs may target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCatalog {
    regions: Vec<RegionDefinition>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<RegionDefinition>) -> Self {
        Self { regions }
    }

    /// Parses a catalog from its JSON form (`{"regions": [...]}`)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Maps an input region string onto its canonical code.
    ///
    /// Matches the canonical code or any alias, ignoring case and surrounding
    /// whitespace. Unknown inputs yield `None`; there is no fallback region.
    pub fn canonicalize(&self, input: &str) -> Option<&str> {
        let needle = input.trim();
        if needle.is_empty() {
            return None;
        }

        self.regions
            .iter()
            .find(|region| {
                region.code.eq_ignore_ascii_case(needle)
                    || region
                        .aliases
                        .iter()
                        .any(|alias| alias.eq_ignore_ascii_case(needle))
            })
            .map(|region| region.code.as_str())
    }

    /// Looks up a region by canonical code or alias
    pub fn get(&self, input: &str) -> Option<&RegionDefinition> {
        let code = self.canonicalize(input)?;
        self.regions.iter().find(|region| region.code == code)
    }

    /// Canonical codes in catalog order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|region| region.code.as_str())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::new(vec![
            RegionDefinition {
                code: "us-east".to_string(),
                name: "United States".to_string(),
                aliases: vec!["US".to_string()],
            },
            RegionDefinition {
                code: "eu-west".to_string(),
                name: "Europe".to_string(),
                aliases: vec!["EU".to_string()],
            },
            RegionDefinition {
                code: "asia-pacific".to_string(),
                name: "Asia Pacific".to_string(),
                aliases: vec!["APAC".to_string(), "ASIA".to_string()],
            },
        ])
    }
}
