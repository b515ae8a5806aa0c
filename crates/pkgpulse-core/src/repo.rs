//! Repository facts assembled by the code-host fetcher.
//!
//! Every sub-record defaults to an empty value so a failed sub-fetch can
//! degrade without failing the whole composite.

use crate::cve::CveHistory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Basic repository record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub open_issues: u64,
    #[serde(default)]
    pub watchers: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_fork: bool,
    #[serde(default)]
    pub has_discussions: bool,
    /// Detected from description/topics, not an API flag.
    #[serde(default)]
    pub is_deprecated: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Contributor growth trajectory over the trailing year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributorTrend {
    Growing,
    #[default]
    Stable,
    Declining,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContributorStats {
    #[serde(default)]
    pub total_contributors: usize,
    #[serde(default)]
    pub active_contributors_6mo: usize,
    /// Share of all contributions held by the top contributor, in percent.
    #[serde(default)]
    pub top_contributor_pct: f64,
    #[serde(default)]
    pub contributors_over_5pct: usize,
    /// Contributors active 6-12 months ago.
    #[serde(default)]
    pub contributors_prev_6mo: usize,
    #[serde(default)]
    pub contributor_trend: ContributorTrend,
    #[serde(default)]
    pub first_time_contributors_6mo: usize,
    /// Shannon entropy of the contribution distribution, in bits.
    /// Undefined (None) when total contributions are zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor_entropy: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commits_last_6mo: u64,
    #[serde(default)]
    pub commits_last_year: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueStats {
    #[serde(default)]
    pub open_issues: u64,
    #[serde(default)]
    pub closed_issues_6mo: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_response_time_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_close_time_hours: Option<f64>,
    #[serde(default)]
    pub good_first_issue_count: u64,
    #[serde(default)]
    pub regression_issue_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrStats {
    #[serde(default)]
    pub open_prs: u64,
    #[serde(default)]
    pub merged_prs_6mo: u64,
    /// Closed without a merged_at timestamp (merge-via-CLI projects).
    #[serde(default)]
    pub closed_prs_6mo: u64,
    /// Open longer than 90 days.
    #[serde(default)]
    pub stale_prs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_merge_time_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseStats {
    #[serde(default)]
    pub total_releases: u64,
    #[serde(default)]
    pub releases_last_year: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub has_signed_releases: bool,
    #[serde(default)]
    pub prerelease_ratio: f64,
}

/// Security posture signals, including the embedded CVE history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityFacts {
    #[serde(default)]
    pub has_security_md: bool,
    #[serde(default)]
    pub has_security_policy: bool,
    #[serde(default)]
    pub signed_commits_pct: f64,
    #[serde(default)]
    pub has_dependabot: bool,
    #[serde(default)]
    pub has_codeql: bool,
    #[serde(default)]
    pub has_security_ci: bool,
    #[serde(default)]
    pub has_snyk: bool,
    #[serde(default)]
    pub has_renovate: bool,
    #[serde(default)]
    pub has_trivy: bool,
    #[serde(default)]
    pub has_semgrep: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slsa_level: Option<u8>,
    #[serde(default)]
    pub has_sigstore: bool,
    #[serde(default)]
    pub has_sbom: bool,
    #[serde(default)]
    pub has_reproducible_builds: bool,
    #[serde(default)]
    pub known_cves: u32,
    #[serde(default)]
    pub vulnerable_deps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve_history: Option<CveHistory>,
}

impl SecurityFacts {
    /// Count of distinct security tooling signals for scoring.
    pub fn security_tool_count(&self) -> u32 {
        [
            self.has_dependabot,
            self.has_codeql,
            self.has_snyk,
            self.has_renovate,
            self.has_trivy,
            self.has_semgrep,
            self.has_security_ci,
        ]
        .iter()
        .filter(|b| **b)
        .count() as u32
    }
}

/// Presence of key repository files and directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoFiles {
    #[serde(default)]
    pub has_readme: bool,
    #[serde(default)]
    pub readme_size_bytes: u64,
    #[serde(default)]
    pub has_license: bool,
    #[serde(default)]
    pub has_changelog: bool,
    #[serde(default)]
    pub has_contributing: bool,
    #[serde(default)]
    pub has_code_of_conduct: bool,
    #[serde(default)]
    pub has_codeowners: bool,
    #[serde(default)]
    pub has_governance: bool,
    #[serde(default)]
    pub has_docs_dir: bool,
    #[serde(default)]
    pub has_examples_dir: bool,
    #[serde(default)]
    pub has_tests_dir: bool,
    #[serde(default)]
    pub has_ci_config: bool,
    #[serde(default)]
    pub has_issue_templates: bool,
    #[serde(default)]
    pub has_pr_template: bool,
    #[serde(default)]
    pub has_funding: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiStatus {
    #[serde(default)]
    pub has_ci: bool,
    #[serde(default)]
    pub workflow_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_runs_pass_rate: Option<f64>,
    #[serde(default)]
    pub has_tests_workflow: bool,
    #[serde(default)]
    pub has_lint_workflow: bool,
    #[serde(default)]
    pub has_security_workflow: bool,
    #[serde(default)]
    pub has_release_workflow: bool,
    /// Tests on >=2 of {ubuntu, windows, macos}.
    #[serde(default)]
    pub has_multi_platform: bool,
}

/// The full repository-facts composite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoData {
    pub repo: RepoInfo,
    #[serde(default)]
    pub contributors: ContributorStats,
    #[serde(default)]
    pub commits: CommitActivity,
    #[serde(default)]
    pub issues: IssueStats,
    #[serde(default)]
    pub prs: PrStats,
    #[serde(default)]
    pub releases: ReleaseStats,
    #[serde(default)]
    pub security: SecurityFacts,
    #[serde(default)]
    pub files: RepoFiles,
    #[serde(default)]
    pub ci: CiStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_tool_count_counts_distinct_signals() {
        let mut s = SecurityFacts::default();
        assert_eq!(s.security_tool_count(), 0);
        s.has_dependabot = true;
        s.has_codeql = true;
        s.has_security_ci = true;
        assert_eq!(s.security_tool_count(), 3);
    }

    #[test]
    fn repo_data_round_trips_with_defaults() {
        let data = RepoData {
            repo: RepoInfo {
                owner: "o".into(),
                name: "r".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&data).unwrap();
        let back: RepoData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.repo.owner, "o");
        assert_eq!(back.contributors.contributor_trend, ContributorTrend::Stable);
    }
}
