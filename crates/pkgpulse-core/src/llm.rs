//! Typed results of the qualitative LLM assessments.
//!
//! Each assessment is optional end to end: a failed prompt or an unavailable
//! endpoint yields `None` for that slot, never a pipeline failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadmeAssessment {
    pub clarity: u8,
    pub installation: u8,
    pub quick_start: u8,
    pub examples: u8,
    pub configuration: u8,
    pub troubleshooting: u8,
    pub overall: u8,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_issue: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub overall_score: u8,
    #[serde(default)]
    pub injection_risks: Vec<serde_json::Value>,
    #[serde(default)]
    pub input_validation_score: u8,
    #[serde(default)]
    pub secrets_found: Vec<serde_json::Value>,
    #[serde(default)]
    pub critical_findings: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAssessment {
    /// positive, neutral, negative, mixed.
    pub sentiment: String,
    pub frustration_level: u8,
    /// active, moderate, slow, unresponsive.
    pub maintainer_responsiveness: String,
    #[serde(default)]
    pub common_complaints: Vec<String>,
    #[serde(default)]
    pub praise_themes: Vec<String>,
    #[serde(default)]
    pub abandonment_signals: bool,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationAssessment {
    pub helpfulness: u8,
    pub clarity: u8,
    pub patience: u8,
    pub technical_depth: u8,
    pub welcomingness: u8,
    /// exemplary, good, adequate, poor, hostile.
    pub communication_style: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceAssessment {
    /// actively-maintained, maintained, minimal-maintenance, stale, abandoned.
    pub status: String,
    pub confidence: u8,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub positive_signals: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogAssessment {
    #[serde(default)]
    pub breaking_changes_marked: bool,
    #[serde(default)]
    pub has_migration_guides: bool,
    #[serde(default)]
    pub well_categorized: bool,
    #[serde(default)]
    pub appears_complete: bool,
    #[serde(default)]
    pub clarity_score: u8,
    #[serde(default)]
    pub overall_score: u8,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceAssessment {
    #[serde(default)]
    pub has_succession_plan: bool,
    #[serde(default)]
    pub decision_process_documented: bool,
    #[serde(default)]
    pub contributor_ladder_exists: bool,
    #[serde(default)]
    pub indicates_multiple_maintainers: bool,
    /// low, medium, high, unknown.
    #[serde(default = "unknown")]
    pub bus_factor_risk: String,
    #[serde(default)]
    pub summary: String,
}

fn unknown() -> String {
    "unknown".to_string()
}

/// All assessments for a package; each slot independently optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmAssessments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<ReadmeAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication: Option<CommunicationAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<MaintenanceAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<ChangelogAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<GovernanceAssessment>,
}

impl LlmAssessments {
    pub fn is_empty(&self) -> bool {
        self.readme.is_none()
            && self.security.is_none()
            && self.sentiment.is_none()
            && self.communication.is_none()
            && self.maintenance.is_none()
            && self.changelog.is_none()
            && self.governance.is_none()
    }
}
