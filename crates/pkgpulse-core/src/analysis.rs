//! The persisted per-package analysis artifact.

use crate::aggregator::AggregatorData;
use crate::llm::LlmAssessments;
use crate::package::{Ecosystem, RepoRef};
use crate::repo::RepoData;
use crate::scores::Scores;
use crate::supply::SupplyChainData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data availability classification for a package.
///
/// Only `Available` and `PartialForge` produce scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataAvailability {
    Available,
    NoRepo,
    RepoNotFound,
    PrivateRepo,
    NotGithub,
    PartialForge,
}

impl DataAvailability {
    pub fn scoreable(&self) -> bool {
        matches!(self, DataAvailability::Available | DataAvailability::PartialForge)
    }
}

/// Human-readable highlights and concerns built at the end of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default)]
    pub maintenance_status: String,
    #[serde(default)]
    pub security_summary: String,
    #[serde(default)]
    pub doc_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_sentiment: Option<String>,
    /// Set for partial-forge packages scored from aggregator metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forge_metrics: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// Complete analysis of one package; written to
/// `<data>/analyzed/<ecosystem>/<name>.json`, overwritten atomically on each
/// analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageAnalysis {
    pub ecosystem: Ecosystem,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_count_30d: Option<u64>,
    pub data_availability: DataAvailability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Scores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_data: Option<RepoData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_assessments: Option<LlmAssessments>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_chain: Option<SupplyChainData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator_data: Option<AggregatorData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisSummary>,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_fetched_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DataAvailability::PartialForge).unwrap(),
            "\"partial_forge\""
        );
        assert_eq!(
            serde_json::to_string(&DataAvailability::NoRepo).unwrap(),
            "\"no_repo\""
        );
    }

    #[test]
    fn only_two_variants_are_scoreable() {
        assert!(DataAvailability::Available.scoreable());
        assert!(DataAvailability::PartialForge.scoreable());
        assert!(!DataAvailability::NoRepo.scoreable());
        assert!(!DataAvailability::RepoNotFound.scoreable());
        assert!(!DataAvailability::PrivateRepo.scoreable());
        assert!(!DataAvailability::NotGithub.scoreable());
    }
}
