//! Supply-chain analysis records: lifecycle scripts, published tarball,
//! version diff, and publishing provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a single detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// A suspicious pattern detected in scripts or package files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousPattern {
    /// obfuscation, network_call, credential_access, process_spawn, ...
    pub pattern_type: String,
    pub severity: PatternSeverity,
    /// file:line or script name.
    pub location: String,
    pub matched_content: String,
    pub description: String,
}

/// Analysis of package-manifest lifecycle scripts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleScriptRisk {
    #[serde(default)]
    pub has_preinstall: bool,
    #[serde(default)]
    pub has_install: bool,
    #[serde(default)]
    pub has_postinstall: bool,
    #[serde(default)]
    pub has_preuninstall: bool,
    #[serde(default)]
    pub has_postuninstall: bool,
    #[serde(default)]
    pub has_prepare: bool,
    #[serde(default)]
    pub has_prepublish: bool,
    /// Lifecycle script name -> command string.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub suspicious_patterns: Vec<SuspiciousPattern>,
    #[serde(default)]
    pub risk_score: u32,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub has_obfuscation: bool,
    #[serde(default)]
    pub has_network_calls: bool,
    #[serde(default)]
    pub has_file_system_access: bool,
    #[serde(default)]
    pub has_process_spawn: bool,
    #[serde(default)]
    pub has_credential_access: bool,
    #[serde(default)]
    pub has_env_access: bool,
    /// Bun, Deno, or similar installed at package install time.
    #[serde(default)]
    pub installs_runtime: bool,
}

/// One member of the published archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TarballFile {
    pub path: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub is_executable: bool,
    #[serde(default)]
    pub is_binary: bool,
}

/// Analysis of the published tarball vs. the repository source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TarballAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarball_url: Option<String>,
    #[serde(default)]
    pub tarball_size_bytes: u64,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub files: Vec<TarballFile>,
    /// Paths present in the tarball but absent from the repository tree and
    /// not matching the expected-generated allow-list.
    #[serde(default)]
    pub files_not_in_repo: Vec<String>,
    /// Known-malicious filenames.
    #[serde(default)]
    pub suspicious_files: Vec<String>,
    #[serde(default)]
    pub has_native_code: bool,
    #[serde(default)]
    pub has_minified_js: bool,
    #[serde(default)]
    pub minified_files: Vec<String>,
    #[serde(default)]
    pub suspicious_patterns: Vec<SuspiciousPattern>,
    #[serde(default)]
    pub risk_score: u32,
}

/// Comparison against the previously published version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDiff {
    pub current_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(default)]
    pub comparison_available: bool,
    #[serde(default)]
    pub scripts_changed: bool,
    #[serde(default)]
    pub scripts_added: Vec<String>,
    #[serde(default)]
    pub dependencies_added: Vec<String>,
    #[serde(default)]
    pub dependencies_removed: Vec<String>,
    #[serde(default)]
    pub is_major_bump: bool,
    #[serde(default)]
    pub is_minor_bump: bool,
    #[serde(default)]
    pub is_patch_bump: bool,
    /// Major delta > 5, or the version went backward.
    #[serde(default)]
    pub version_jump_suspicious: bool,
    #[serde(default)]
    pub risk_score: u32,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

/// Publisher and maintainer provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingInfo {
    #[serde(default)]
    pub has_provenance: bool,
    #[serde(default)]
    pub provenance_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_username: Option<String>,
    #[serde(default = "default_true")]
    pub publisher_is_listed_maintainer: bool,
    #[serde(default)]
    pub maintainer_count: usize,
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub risk_score: u32,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for PublishingInfo {
    fn default() -> Self {
        Self {
            has_provenance: false,
            provenance_verified: false,
            publisher_username: None,
            publisher_is_listed_maintainer: true,
            maintainer_count: 0,
            maintainers: vec![],
            risk_score: 0,
            risk_factors: vec![],
        }
    }
}

/// Overall supply-chain risk band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band a 0-100 risk score: >=75 critical, >=50 high, >=25 medium.
    pub fn from_score(score: u32) -> Self {
        if score >= 75 {
            RiskLevel::Critical
        } else if score >= 50 {
            RiskLevel::High
        } else if score >= 25 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Aggregated supply-chain analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplyChainData {
    #[serde(default)]
    pub lifecycle_scripts: LifecycleScriptRisk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarball: Option<TarballAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_diff: Option<VersionDiff>,
    #[serde(default)]
    pub publishing: PublishingInfo,
    #[serde(default)]
    pub overall_risk_score: u32,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub all_suspicious_patterns: Vec<SuspiciousPattern>,
    /// Human descriptions of every critical-severity pattern.
    #[serde(default)]
    pub critical_findings: Vec<String>,
    /// installs_alternative_runtime, accesses_credentials,
    /// makes_network_calls, contains_obfuscation.
    #[serde(default)]
    pub behavioral_flags: Vec<String>,
}

impl SupplyChainData {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.behavioral_flags.iter().any(|f| f == flag)
    }
}
