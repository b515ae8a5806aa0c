//! GitHub repository data fetcher
//!
//! Pulls repo, contributor, commit, issue, PR, release, security, file, and
//! CI facts for one repository and derives the analysis signals the scorer
//! consumes. Every sub-fetch is failure-isolated: a transient error degrades
//! that sub-record to its default instead of failing the composite. A 404 on
//! the repository itself is absence, not an error.

pub mod client;
pub mod content;
pub mod error;
pub mod signals;

pub use client::{GitHubClient, RateLimitState};
pub use error::{GitHubError, Result};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use pkgpulse_core::{
    CiStatus, CommitActivity, ContributorStats, IssueStats, PrStats, ReleaseStats, RepoData,
    RepoFiles, RepoInfo, RepoRef, SecurityFacts,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Page caps per endpoint; reads are never unbounded.
const CONTRIBUTOR_PAGES: u32 = 5;
const COMMIT_PAGES: u32 = 10;
const ISSUE_PAGES: u32 = 3;
const PR_PAGES: u32 = 3;
const RELEASE_PAGES: u32 = 10;

/// Issues sampled for response-time measurement.
const RESPONSE_SAMPLE: usize = 10;

pub struct GitHubFetcher {
    pub(crate) client: GitHubClient,
}

impl GitHubFetcher {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: GitHubClient::new(token),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: GitHubClient::with_base_url(base_url, token),
        }
    }

    /// Cached remote rate-limit state for the daemon.
    pub fn rate_limit(&self) -> RateLimitState {
        self.client.rate_limit()
    }

    /// Fetch the full facts composite. `Ok(None)` when the repository does
    /// not exist or is inaccessible.
    pub async fn fetch_repo_data(&self, repo_ref: &RepoRef) -> Result<Option<RepoData>> {
        let owner = repo_ref.owner.as_str();
        let repo = repo_ref.repo.as_str();

        let Some(mut info) = self.fetch_repo_info(owner, repo).await? else {
            return Ok(None);
        };

        let (contrib, issues, prs, releases, files, workflows, ci_rate, sec) = tokio::join!(
            self.fetch_contributors_and_commits(owner, repo),
            self.fetch_issue_stats(owner, repo),
            self.fetch_pr_stats(owner, repo),
            self.fetch_release_stats(owner, repo),
            self.fetch_repo_files(owner, repo),
            self.fetch_workflows(owner, repo),
            self.fetch_ci_pass_rate(owner, repo),
            self.fetch_security_configs(owner, repo),
        );

        let (contributors, commits, signed_pct) = degrade(contrib, owner, repo, "contributors");
        let issues = degrade(issues, owner, repo, "issues");
        let prs = degrade(prs, owner, repo, "prs");
        let releases = degrade(releases, owner, repo, "releases");
        let (files, has_reproducible) = degrade(files, owner, repo, "files");
        let (wf_signals, workflow_count) = degrade(workflows, owner, repo, "workflows");
        let ci_pass_rate = degrade(ci_rate, owner, repo, "ci-runs");
        let sec_configs = degrade(sec, owner, repo, "security-configs");

        info.is_deprecated = signals::detect_deprecation(info.description.as_deref(), &info.topics);

        let has_security_ci = wf_signals.has_security_ci
            || sec_configs.has_dependabot
            || sec_configs.has_renovate;

        let security = SecurityFacts {
            has_security_md: sec_configs.has_security_md,
            has_security_policy: sec_configs.has_security_policy,
            signed_commits_pct: signed_pct,
            has_dependabot: sec_configs.has_dependabot,
            has_codeql: wf_signals.has_codeql,
            has_security_ci,
            has_snyk: wf_signals.has_snyk,
            has_renovate: sec_configs.has_renovate,
            has_trivy: wf_signals.has_trivy,
            has_semgrep: wf_signals.has_semgrep,
            slsa_level: wf_signals.slsa_level,
            has_sigstore: wf_signals.has_sigstore,
            has_sbom: wf_signals.has_sbom,
            has_reproducible_builds: has_reproducible,
            ..Default::default()
        };

        let ci = CiStatus {
            has_ci: workflow_count > 0,
            workflow_count,
            recent_runs_pass_rate: ci_pass_rate,
            has_tests_workflow: wf_signals.has_tests,
            has_lint_workflow: wf_signals.has_lint,
            has_security_workflow: has_security_ci,
            has_release_workflow: wf_signals.has_release,
            has_multi_platform: wf_signals.has_multi_platform,
        };

        Ok(Some(RepoData {
            repo: info,
            contributors,
            commits,
            issues,
            prs,
            releases,
            security,
            files,
            ci,
        }))
    }

    async fn fetch_repo_info(&self, owner: &str, repo: &str) -> Result<Option<RepoInfo>> {
        let Some(data) = self.client.get(&format!("/repos/{owner}/{repo}"), &[]).await? else {
            return Ok(None);
        };

        Ok(Some(RepoInfo {
            owner: owner.to_string(),
            name: repo.to_string(),
            description: data
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            stars: data.get("stargazers_count").and_then(Value::as_u64).unwrap_or(0),
            forks: data.get("forks_count").and_then(Value::as_u64).unwrap_or(0),
            open_issues: data
                .get("open_issues_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            watchers: data.get("watchers_count").and_then(Value::as_u64).unwrap_or(0),
            created_at: parse_date(data.get("created_at")),
            updated_at: parse_date(data.get("updated_at")),
            pushed_at: parse_date(data.get("pushed_at")),
            default_branch: data
                .get("default_branch")
                .and_then(Value::as_str)
                .unwrap_or("main")
                .to_string(),
            license: data
                .pointer("/license/spdx_id")
                .and_then(Value::as_str)
                .filter(|s| *s != "NOASSERTION")
                .map(String::from),
            language: data.get("language").and_then(Value::as_str).map(String::from),
            topics: data
                .get("topics")
                .and_then(Value::as_array)
                .map(|t| t.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default(),
            is_archived: data.get("archived").and_then(Value::as_bool).unwrap_or(false),
            is_fork: data.get("fork").and_then(Value::as_bool).unwrap_or(false),
            has_discussions: data
                .get("has_discussions")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            is_deprecated: false,
        }))
    }

    /// Contributor list crossed with the last-year commit stream: totals,
    /// concentration, entropy, activity windows, trend, and the
    /// signed-commit percentage over the first 100 commits.
    async fn fetch_contributors_and_commits(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<(ContributorStats, CommitActivity, f64)> {
        let contributors = self
            .client
            .get_paged(&format!("/repos/{owner}/{repo}/contributors"), &[], CONTRIBUTOR_PAGES)
            .await?;

        let since = (Utc::now() - Duration::days(365)).to_rfc3339();
        let commits = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/commits"),
                &[("since", since)],
                COMMIT_PAGES,
            )
            .await?;

        let contributions: Vec<u64> = contributors
            .iter()
            .filter_map(|c| c.get("contributions").and_then(Value::as_u64))
            .collect();
        let total_contributions: u64 = contributions.iter().sum();

        let top_pct = if total_contributions > 0 {
            let top = contributions.first().copied().unwrap_or(0);
            (top as f64 / total_contributions as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        let threshold = total_contributions as f64 * 0.05;
        let over_5pct = contributions
            .iter()
            .filter(|&&c| c as f64 >= threshold && c > 0)
            .count();

        // Commit stream grouped by author login over two half-year windows.
        let now = Utc::now();
        let six_months_ago = now - Duration::days(180);
        let mut recent_authors: HashSet<String> = HashSet::new();
        let mut prior_authors: HashSet<String> = HashSet::new();
        let mut commits_6mo: u64 = 0;
        let mut last_commit_date: Option<DateTime<Utc>> = None;
        let mut verified: Vec<bool> = Vec::new();

        for commit in &commits {
            let date = parse_date(commit.pointer("/commit/author/date"));
            let login = commit
                .pointer("/author/login")
                .and_then(Value::as_str)
                .or_else(|| commit.pointer("/commit/author/name").and_then(Value::as_str))
                .unwrap_or("")
                .to_lowercase();

            if verified.len() < 100 {
                verified.push(
                    commit
                        .pointer("/commit/verification/verified")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                );
            }

            let Some(date) = date else { continue };
            if last_commit_date.map(|d| date > d).unwrap_or(true) {
                last_commit_date = Some(date);
            }
            if date >= six_months_ago {
                commits_6mo += 1;
                if !login.is_empty() {
                    recent_authors.insert(login);
                }
            } else if !login.is_empty() {
                prior_authors.insert(login);
            }
        }

        let first_time_6mo = recent_authors.difference(&prior_authors).count();
        let trend = signals::classify_trend(recent_authors.len(), prior_authors.len());

        let stats = ContributorStats {
            total_contributors: contributors.len(),
            active_contributors_6mo: recent_authors.len(),
            top_contributor_pct: top_pct,
            contributors_over_5pct: over_5pct,
            contributors_prev_6mo: prior_authors.len(),
            contributor_trend: trend,
            first_time_contributors_6mo: first_time_6mo,
            contributor_entropy: signals::contribution_entropy(&contributions),
        };

        let activity = CommitActivity {
            last_commit_date,
            commits_last_6mo: commits_6mo,
            commits_last_year: commits.len() as u64,
        };

        Ok((stats, activity, signals::signed_commits_pct(&verified)))
    }

    async fn fetch_issue_stats(&self, owner: &str, repo: &str) -> Result<IssueStats> {
        let open = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/issues"),
                &[("state", "open".to_string())],
                ISSUE_PAGES,
            )
            .await?;
        let open: Vec<&Value> = open.iter().filter(|i| i.get("pull_request").is_none()).collect();

        let since = (Utc::now() - Duration::days(180)).to_rfc3339();
        let closed = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/issues"),
                &[("state", "closed".to_string()), ("since", since)],
                ISSUE_PAGES,
            )
            .await?;
        let closed: Vec<&Value> = closed
            .iter()
            .filter(|i| i.get("pull_request").is_none())
            .collect();

        let label_matches = |issue: &Value, pred: &dyn Fn(&str) -> bool| {
            issue
                .get("labels")
                .and_then(Value::as_array)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|l| l.get("name").and_then(Value::as_str))
                        .any(|n| pred(&n.to_lowercase()))
                })
                .unwrap_or(false)
        };

        let good_first = open
            .iter()
            .filter(|i| label_matches(i, &|n| n == "good first issue" || n == "good-first-issue"))
            .count() as u64;
        let regressions = open
            .iter()
            .chain(closed.iter())
            .filter(|i| label_matches(i, &|n| n.contains("regression")))
            .count() as u64;

        // Response and close times over a small sample of recent closures.
        let mut response_hours: Vec<f64> = Vec::new();
        let mut close_hours: Vec<f64> = Vec::new();
        for issue in closed.iter().take(RESPONSE_SAMPLE) {
            let created = parse_date(issue.get("created_at"));
            let closed_at = parse_date(issue.get("closed_at"));
            if let (Some(created), Some(closed_at)) = (created, closed_at) {
                close_hours.push((closed_at - created).num_minutes() as f64 / 60.0);
            }

            let number = issue.get("number").and_then(Value::as_u64);
            let author = issue
                .pointer("/user/login")
                .and_then(Value::as_str)
                .unwrap_or("");
            if let (Some(number), Some(created)) = (number, created) {
                if let Ok(Some(comments)) = self
                    .client
                    .get(
                        &format!("/repos/{owner}/{repo}/issues/{number}/comments"),
                        &[("per_page", "10".to_string())],
                    )
                    .await
                {
                    let first_response = comments.as_array().and_then(|cs| {
                        cs.iter()
                            .filter(|c| {
                                c.pointer("/user/login").and_then(Value::as_str) != Some(author)
                            })
                            .filter_map(|c| parse_date(c.get("created_at")))
                            .min()
                    });
                    if let Some(responded) = first_response {
                        response_hours.push((responded - created).num_minutes() as f64 / 60.0);
                    }
                }
            }
        }

        Ok(IssueStats {
            open_issues: open.len() as u64,
            closed_issues_6mo: closed.len() as u64,
            avg_response_time_hours: mean(&response_hours),
            avg_close_time_hours: mean(&close_hours),
            good_first_issue_count: good_first,
            regression_issue_count: regressions,
        })
    }

    async fn fetch_pr_stats(&self, owner: &str, repo: &str) -> Result<PrStats> {
        let open = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/pulls"),
                &[("state", "open".to_string())],
                PR_PAGES,
            )
            .await?;
        let closed = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/pulls"),
                &[("state", "closed".to_string()), ("sort", "updated".to_string()), ("direction", "desc".to_string())],
                PR_PAGES,
            )
            .await?;

        let now = Utc::now();
        let six_months_ago = now - Duration::days(180);
        let ninety_days_ago = now - Duration::days(90);

        let mut merged_6mo: u64 = 0;
        let mut closed_6mo: u64 = 0;
        let mut merge_hours: Vec<f64> = Vec::new();
        for pr in &closed {
            let merged_at = parse_date(pr.get("merged_at"));
            let closed_at = parse_date(pr.get("closed_at"));
            let created_at = parse_date(pr.get("created_at"));
            match merged_at {
                Some(merged) if merged >= six_months_ago => {
                    merged_6mo += 1;
                    if let Some(created) = created_at {
                        merge_hours.push((merged - created).num_minutes() as f64 / 60.0);
                    }
                }
                None => {
                    if let Some(closed_at) = closed_at {
                        if closed_at >= six_months_ago {
                            closed_6mo += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        let stale = open
            .iter()
            .filter_map(|pr| parse_date(pr.get("created_at")))
            .filter(|created| *created < ninety_days_ago)
            .count() as u64;

        Ok(PrStats {
            open_prs: open.len() as u64,
            merged_prs_6mo: merged_6mo,
            closed_prs_6mo: closed_6mo,
            stale_prs: stale,
            avg_merge_time_hours: mean(&merge_hours),
        })
    }

    async fn fetch_release_stats(&self, owner: &str, repo: &str) -> Result<ReleaseStats> {
        let releases = self
            .client
            .get_paged(&format!("/repos/{owner}/{repo}/releases"), &[], RELEASE_PAGES)
            .await?;

        if releases.is_empty() {
            return Ok(ReleaseStats::default());
        }

        let one_year_ago = Utc::now() - Duration::days(365);
        let mut last_release_date = None;
        let mut latest_version = None;
        let mut releases_last_year = 0;
        let mut prereleases = 0;
        let mut has_signed = false;

        for (i, release) in releases.iter().enumerate() {
            let published = parse_date(release.get("published_at"));
            if i == 0 {
                latest_version = release
                    .get("tag_name")
                    .and_then(Value::as_str)
                    .map(String::from);
                last_release_date = published;
            }
            if published.map(|p| p >= one_year_ago).unwrap_or(false) {
                releases_last_year += 1;
            }
            if release.get("prerelease").and_then(Value::as_bool).unwrap_or(false) {
                prereleases += 1;
            }
            if let Some(assets) = release.get("assets").and_then(Value::as_array) {
                has_signed |= assets
                    .iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .any(|n| {
                        let n = n.to_lowercase();
                        n.ends_with(".sig") || n.ends_with(".asc") || n.contains(".sign")
                    });
            }
        }

        let total = releases.len() as u64;
        Ok(ReleaseStats {
            total_releases: total,
            releases_last_year,
            last_release_date,
            latest_version,
            has_signed_releases: has_signed,
            prerelease_ratio: ((prereleases as f64 / total as f64) * 100.0).round() / 100.0,
        })
    }

    /// All blob paths in the default-branch tree, for tarball comparison.
    pub async fn fetch_tree_paths(
        &self,
        owner: &str,
        repo: &str,
        default_branch: &str,
    ) -> Result<HashSet<String>> {
        let tree = self
            .client
            .get(
                &format!("/repos/{owner}/{repo}/git/trees/{default_branch}"),
                &[("recursive", "1".to_string())],
            )
            .await?;
        Ok(tree
            .and_then(|t| t.get("tree").cloned())
            .and_then(|t| t.as_array().cloned())
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.get("type").and_then(Value::as_str) == Some("blob"))
                    .filter_map(|i| i.get("path").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Tag -> publish date over recent releases, keyed both raw and with the
    /// `v` prefix stripped, for CVE patch-time lookup.
    pub async fn fetch_release_dates(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<HashMap<String, DateTime<Utc>>> {
        let releases = self
            .client
            .get_paged(&format!("/repos/{owner}/{repo}/releases"), &[], RELEASE_PAGES)
            .await?;

        let mut dates = HashMap::new();
        for release in &releases {
            let tag = release.get("tag_name").and_then(Value::as_str);
            let published = parse_date(release.get("published_at"));
            if let (Some(tag), Some(published)) = (tag, published) {
                dates.insert(tag.to_string(), published);
                if let Some(stripped) = tag.strip_prefix('v') {
                    dates.insert(stripped.to_string(), published);
                }
            }
        }
        Ok(dates)
    }

    async fn fetch_repo_files(&self, owner: &str, repo: &str) -> Result<(RepoFiles, bool)> {
        let root = self.client.get(&format!("/repos/{owner}/{repo}/contents"), &[]).await?;
        let Some(root) = root.and_then(|r| r.as_array().cloned()) else {
            return Ok((RepoFiles::default(), false));
        };

        let entries: HashMap<String, String> = root
            .iter()
            .filter_map(|item| {
                let name = item.get("name").and_then(Value::as_str)?;
                let kind = item.get("type").and_then(Value::as_str).unwrap_or("file");
                Some((name.to_lowercase(), kind.to_string()))
            })
            .collect();
        let readme_size = root
            .iter()
            .find(|item| {
                item.get("name")
                    .and_then(Value::as_str)
                    .map(|n| n.to_lowercase().starts_with("readme"))
                    .unwrap_or(false)
            })
            .and_then(|item| item.get("size").and_then(Value::as_u64))
            .unwrap_or(0);

        let has_dir = |names: &[&str]| {
            names
                .iter()
                .any(|n| entries.get(*n).map(|k| k == "dir").unwrap_or(false))
        };
        let has_prefix = |prefix: &str| entries.keys().any(|n| n.starts_with(prefix));

        let mut files = RepoFiles {
            has_readme: has_prefix("readme"),
            readme_size_bytes: readme_size,
            has_license: has_prefix("license") || has_prefix("licence"),
            has_changelog: has_prefix("changelog")
                || entries.contains_key("history.md")
                || entries.contains_key("changes.md"),
            has_contributing: entries.contains_key("contributing.md"),
            has_code_of_conduct: entries.contains_key("code_of_conduct.md"),
            has_governance: entries.contains_key("governance.md"),
            has_docs_dir: has_dir(&["docs", "doc", "documentation"]),
            has_examples_dir: has_dir(&["examples", "example", "samples"]),
            has_tests_dir: has_dir(&["test", "tests", "__tests__", "spec", "specs"]),
            ..Default::default()
        };

        // Reproducible-build indicators at the repo root.
        let has_reproducible = entries.contains_key(".goreleaser.yml")
            || entries.contains_key(".goreleaser.yaml")
            || entries.contains_key("earthfile")
            || entries.get("nix").map(|k| k == "dir").unwrap_or(false)
            || entries.contains_key("flake.nix");

        if let Ok(Some(github_dir)) = self
            .client
            .get(&format!("/repos/{owner}/{repo}/contents/.github"), &[])
            .await
        {
            if let Some(items) = github_dir.as_array() {
                let names: HashSet<String> = items
                    .iter()
                    .filter_map(|i| i.get("name").and_then(Value::as_str))
                    .map(|n| n.to_lowercase())
                    .collect();
                files.has_codeowners = names.contains("codeowners");
                files.has_ci_config = names.contains("workflows");
                files.has_issue_templates = names.contains("issue_template")
                    || names.contains("issue_template.md");
                files.has_pr_template = names.contains("pull_request_template.md");
                files.has_funding = names.contains("funding.yml");
                files.has_contributing |= names.contains("contributing.md");
                files.has_code_of_conduct |= names.contains("code_of_conduct.md");
            }
        }

        Ok((files, has_reproducible))
    }

    /// Workflow filenames plus decoded content, merged into one signal set.
    async fn fetch_workflows(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<(signals::WorkflowSignals, u64)> {
        let listing = self
            .client
            .get(&format!("/repos/{owner}/{repo}/contents/.github/workflows"), &[])
            .await?;
        let Some(items) = listing.and_then(|l| l.as_array().cloned()) else {
            return Ok((signals::WorkflowSignals::default(), 0));
        };

        let mut merged = signals::WorkflowSignals::default();
        let mut count = 0u64;
        for item in &items {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            if !(name.ends_with(".yml") || name.ends_with(".yaml")) {
                continue;
            }
            count += 1;

            let content = self
                .client
                .get(
                    &format!("/repos/{owner}/{repo}/contents/.github/workflows/{name}"),
                    &[],
                )
                .await
                .ok()
                .flatten()
                .and_then(|v| decode_content(&v))
                .unwrap_or_default();

            merged.merge(&signals::scan_workflow(name, &content));
        }

        Ok((merged, count))
    }

    async fn fetch_ci_pass_rate(&self, owner: &str, repo: &str) -> Result<Option<f64>> {
        let runs = self
            .client
            .get(
                &format!("/repos/{owner}/{repo}/actions/runs"),
                &[("per_page", "50".to_string())],
            )
            .await?;
        let Some(runs) = runs.and_then(|r| r.get("workflow_runs").cloned()) else {
            return Ok(None);
        };
        let Some(runs) = runs.as_array() else {
            return Ok(None);
        };

        let completed: Vec<&Value> = runs
            .iter()
            .filter(|r| r.get("status").and_then(Value::as_str) == Some("completed"))
            .collect();
        if completed.is_empty() {
            return Ok(None);
        }
        let successful = completed
            .iter()
            .filter(|r| r.get("conclusion").and_then(Value::as_str) == Some("success"))
            .count();
        Ok(Some(
            (successful as f64 / completed.len() as f64 * 1000.0).round() / 10.0,
        ))
    }

    async fn fetch_security_configs(&self, owner: &str, repo: &str) -> Result<SecurityConfigs> {
        let security_md = self
            .client
            .get(&format!("/repos/{owner}/{repo}/contents/SECURITY.md"), &[])
            .await?
            .is_some();

        let has_security_policy = self
            .client
            .get(&format!("/repos/{owner}/{repo}/community/profile"), &[])
            .await
            .ok()
            .flatten()
            .and_then(|p| p.pointer("/files/security_policy").cloned())
            .map(|v| !v.is_null())
            .unwrap_or(false);

        let mut has_dependabot = false;
        for name in [".github/dependabot.yml", ".github/dependabot.yaml"] {
            if self
                .client
                .get(&format!("/repos/{owner}/{repo}/contents/{name}"), &[])
                .await?
                .is_some()
            {
                has_dependabot = true;
                break;
            }
        }

        let mut has_renovate = false;
        for name in [
            ".github/renovate.json",
            ".github/renovate.json5",
            "renovate.json",
            ".renovaterc",
            ".renovaterc.json",
        ] {
            if self
                .client
                .get(&format!("/repos/{owner}/{repo}/contents/{name}"), &[])
                .await
                .ok()
                .flatten()
                .is_some()
            {
                has_renovate = true;
                break;
            }
        }

        Ok(SecurityConfigs {
            has_security_md: security_md,
            has_security_policy,
            has_dependabot,
            has_renovate,
        })
    }
}

#[derive(Debug, Default)]
struct SecurityConfigs {
    has_security_md: bool,
    has_security_policy: bool,
    has_dependabot: bool,
    has_renovate: bool,
}

fn degrade<T: Default>(result: Result<T>, owner: &str, repo: &str, what: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            warn!(owner, repo, what, "sub-fetch degraded to default: {e}");
            T::default()
        }
    }
}

pub(crate) fn parse_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = value?.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub(crate) fn decode_content(item: &Value) -> Option<String> {
    let raw = item.get("content")?.as_str()?;
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned).ok()?;
    match String::from_utf8(bytes) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!("workflow content is not utf-8: {e}");
            None
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgpulse_core::Platform;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(content: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(content)
    }

    #[tokio::test]
    async fn missing_repo_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher::with_base_url(server.uri(), None);
        let repo = RepoRef::new(Platform::Github, "gone", "gone");
        assert!(fetcher.fetch_repo_data(&repo).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sub_fetch_failures_degrade_to_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stargazers_count": 12, "forks_count": 3, "open_issues_count": 1,
                "default_branch": "main", "archived": false, "fork": false,
                "description": "a tool", "topics": [],
                "created_at": "2020-01-01T00:00:00Z",
                "pushed_at": "2024-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;
        // Everything else 5xx: sub-records must default instead of failing.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher::with_base_url(server.uri(), None);
        let repo = RepoRef::new(Platform::Github, "o", "r");
        let data = fetcher.fetch_repo_data(&repo).await.unwrap().unwrap();
        assert_eq!(data.repo.stars, 12);
        assert_eq!(data.contributors.total_contributors, 0);
        assert_eq!(data.commits.commits_last_year, 0);
    }

    #[tokio::test]
    async fn deprecated_description_sets_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "description": "DEPRECATED - use new-tool instead",
                "topics": [], "default_branch": "main"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher::with_base_url(server.uri(), None);
        let repo = RepoRef::new(Platform::Github, "o", "old");
        let data = fetcher.fetch_repo_data(&repo).await.unwrap().unwrap();
        assert!(data.repo.is_deprecated);
    }

    #[tokio::test]
    async fn release_dates_index_both_tag_forms() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"tag_name": "v1.2.3", "published_at": "2024-03-01T00:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher::with_base_url(server.uri(), None);
        let dates = fetcher.fetch_release_dates("o", "r").await.unwrap();
        assert!(dates.contains_key("v1.2.3"));
        assert!(dates.contains_key("1.2.3"));
    }

    #[test]
    fn decode_content_handles_wrapped_base64() {
        let item = serde_json::json!({"content": format!("{}\n", b64("hello world"))});
        assert_eq!(decode_content(&item).as_deref(), Some("hello world"));
    }
}
