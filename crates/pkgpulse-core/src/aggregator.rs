//! Cross-forge intelligence from aggregator services (deps.dev-shaped).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OpenSSF Scorecard results, available for GitHub-hosted projects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorecardData {
    /// 0-10 scale.
    pub overall_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_date: Option<DateTime<Utc>>,
    /// Check name -> score.
    #[serde(default)]
    pub checks: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_review_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintained_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_protection_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dangerous_workflow_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_permissions_score: Option<f64>,
    #[serde(default)]
    pub fuzzing_enabled: bool,
    #[serde(default)]
    pub sast_enabled: bool,
    #[serde(default)]
    pub cii_badge: bool,
}

/// Resolved dependency-graph summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraphSummary {
    #[serde(default)]
    pub direct_count: usize,
    #[serde(default)]
    pub transitive_count: usize,
    #[serde(default)]
    pub vulnerable_direct: usize,
    #[serde(default)]
    pub vulnerable_transitive: usize,
    #[serde(default)]
    pub max_depth: usize,
}

impl DependencyGraphSummary {
    pub fn total_count(&self) -> usize {
        self.direct_count + self.transitive_count
    }

    pub fn total_vulnerable(&self) -> usize {
        self.vulnerable_direct + self.vulnerable_transitive
    }
}

/// Basic project metrics for forges where Scorecard is unavailable
/// (GitLab, Bitbucket).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicProjectMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_issues: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oss_fuzz_line_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oss_fuzz_line_cover_count: Option<u64>,
}

/// All aggregator-sourced intelligence for one package version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorecard: Option<ScorecardData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_metrics: Option<BasicProjectMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_graph: Option<DependencyGraphSummary>,
    #[serde(default)]
    pub slsa_attestation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slsa_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sources_available: Vec<String>,
}

impl AggregatorData {
    /// Whether any project-level data was returned (Scorecard or basic
    /// metrics); this is what promotes a non-GitHub package to partial-forge
    /// availability.
    pub fn has_project_data(&self) -> bool {
        self.scorecard.is_some() || self.project_metrics.is_some()
    }
}
