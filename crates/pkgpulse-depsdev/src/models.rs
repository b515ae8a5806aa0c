//! Wire shapes for the deps.dev v3 API, limited to the fields consumed.

use serde::{Deserialize, Serialize};

/// Version record; carries SLSA attestations and links.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub attestations: Vec<Attestation>,
    #[serde(default)]
    pub links: Option<Links>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// e.g. "SLSA_BUILD_LEVEL_2" or "SLSA_PROVENANCE".
    #[serde(rename = "type", default)]
    pub attestation_type: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Links {
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

/// Resolved dependency graph: nodes plus an edge list; node 0 is the root.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DependencyGraph {
    #[serde(default)]
    pub nodes: Vec<DependencyNode>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub advisory_keys: Vec<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    #[serde(default)]
    pub from_node: usize,
    #[serde(default)]
    pub to_node: usize,
    #[serde(default)]
    pub requirement: String,
}

/// Project record; Scorecard for GitHub, basic metrics for other forges.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default)]
    pub stars_count: Option<u64>,
    #[serde(default)]
    pub forks_count: Option<u64>,
    #[serde(default)]
    pub open_issues_count: Option<u64>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scorecard: Option<ScorecardRecord>,
    #[serde(default)]
    pub oss_fuzz: Option<OssFuzz>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardRecord {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub checks: Vec<ScorecardCheck>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScorecardCheck {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OssFuzz {
    #[serde(default)]
    pub line_count: Option<u64>,
    #[serde(default)]
    pub line_cover_count: Option<u64>,
}
