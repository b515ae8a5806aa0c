//! Content fetchers feeding the qualitative assessment phase: README,
//! changelog, governance docs, maintainer comments, recent issues, and
//! security-prioritized source samples.

use crate::{decode_content, GitHubFetcher, Result};
use serde_json::{json, Value};
use tracing::debug;

/// Total bytes and file count bounds for source sampling.
const SOURCE_MAX_BYTES: usize = 15_000;
const SOURCE_MAX_FILES: usize = 10;
/// Individual files above this size are skipped outright.
const SOURCE_FILE_CAP: u64 = 50_000;

/// Language -> source extensions for the security sample.
const LANGUAGE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("python", &[".py"]),
    ("javascript", &[".js", ".mjs", ".cjs"]),
    ("typescript", &[".ts", ".tsx"]),
    ("rust", &[".rs"]),
    ("go", &[".go"]),
    ("ruby", &[".rb"]),
    ("java", &[".java"]),
    ("c", &[".c", ".h"]),
    ("c++", &[".cpp", ".cc", ".cxx", ".hpp", ".h"]),
    ("c#", &[".cs"]),
    ("php", &[".php"]),
    ("shell", &[".sh", ".bash"]),
];

/// Path patterns ranked by security relevance; earlier matches outrank later.
const SECURITY_PRIORITY_PATTERNS: &[&str] = &[
    "main", "app", "index", "server", "cli", "run",
    "config", "settings", "env", "secrets",
    "auth", "login", "session", "token", "password", "credential",
    "input", "parse", "request", "handler", "route", "api",
    "database", "db", "query", "sql", "model",
    "security", "crypto", "encrypt", "hash", "sanitize", "validate",
    "http", "client", "connection", "socket",
];

const SKIP_PATH_PATTERNS: &[&str] = &[
    "test", "spec", "mock", "fixture", "vendor", "node_modules", "dist", "build",
    "__pycache__", ".min.", "example", "sample", "benchmark", "doc/", "docs/",
];

impl GitHubFetcher {
    /// README body via the dedicated endpoint.
    pub async fn fetch_readme_content(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        let readme = self.client.get(&format!("/repos/{owner}/{repo}/readme"), &[]).await?;
        Ok(readme.as_ref().and_then(decode_content))
    }

    /// First changelog found among common filenames.
    pub async fn fetch_changelog_content(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        for name in [
            "CHANGELOG.md", "CHANGELOG", "CHANGELOG.txt", "CHANGES.md", "CHANGES",
            "HISTORY.md", "HISTORY", "NEWS.md", "NEWS",
        ] {
            if let Some(item) = self
                .client
                .get(&format!("/repos/{owner}/{repo}/contents/{name}"), &[])
                .await?
            {
                if let Some(content) = decode_content(&item) {
                    return Ok(Some(content));
                }
            }
        }
        Ok(None)
    }

    /// Governance-adjacent docs concatenated with filename headers.
    pub async fn fetch_governance_docs(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        let mut docs = Vec::new();
        for name in [
            "GOVERNANCE.md",
            "CONTRIBUTING.md",
            "MAINTAINERS.md",
            "MAINTAINERS",
            ".github/CONTRIBUTING.md",
        ] {
            if let Some(item) = self
                .client
                .get(&format!("/repos/{owner}/{repo}/contents/{name}"), &[])
                .await
                .ok()
                .flatten()
            {
                if let Some(content) = decode_content(&item) {
                    docs.push(format!("# {name}\n\n{content}"));
                }
            }
        }
        Ok(if docs.is_empty() {
            None
        } else {
            Some(docs.join("\n\n---\n\n"))
        })
    }

    /// Recent issues simplified for prompt consumption; PRs filtered out,
    /// bodies truncated.
    pub async fn fetch_recent_issues(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let issues = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/issues"),
                &[("state", "all".to_string()), ("sort", "updated".to_string())],
                1,
            )
            .await?;

        Ok(issues
            .iter()
            .filter(|i| i.get("pull_request").is_none())
            .take(limit)
            .map(|issue| {
                let body = issue
                    .get("body")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                json!({
                    "title": issue.get("title"),
                    "state": issue.get("state"),
                    "created_at": issue.get("created_at"),
                    "comments": issue.get("comments"),
                    "labels": issue
                        .get("labels")
                        .and_then(Value::as_array)
                        .map(|ls| ls.iter().filter_map(|l| l.get("name")).cloned().collect::<Vec<_>>())
                        .unwrap_or_default(),
                    "body": truncate(body, 500),
                })
            })
            .collect())
    }

    /// Recent comments authored by maintainers (top contributors plus the
    /// repo owner), truncated for prompting.
    pub async fn fetch_maintainer_comments(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let contributors = self
            .client
            .get_paged(&format!("/repos/{owner}/{repo}/contributors"), &[], 1)
            .await?;

        let top: Vec<&Value> = contributors.iter().take(10).collect();
        let total: u64 = top
            .iter()
            .filter_map(|c| c.get("contributions").and_then(Value::as_u64))
            .sum();
        let threshold = if total > 0 { total as f64 * 0.05 } else { 1.0 };

        let mut maintainers: Vec<String> = top
            .iter()
            .filter(|c| {
                c.get("contributions")
                    .and_then(Value::as_u64)
                    .map(|n| n as f64 >= threshold)
                    .unwrap_or(false)
            })
            .filter_map(|c| c.get("login").and_then(Value::as_str))
            .map(|l| l.to_lowercase())
            .collect();
        maintainers.push(owner.to_lowercase());

        let comments = self
            .client
            .get_paged(
                &format!("/repos/{owner}/{repo}/issues/comments"),
                &[("sort", "updated".to_string()), ("direction", "desc".to_string())],
                2,
            )
            .await?;

        let mut result = Vec::new();
        for comment in &comments {
            let author = comment
                .pointer("/user/login")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
            if !maintainers.contains(&author) {
                continue;
            }
            let body = comment.get("body").and_then(Value::as_str).unwrap_or("");
            if body.len() > 20 {
                result.push(truncate(body, 1000).to_string());
            }
            if result.len() >= limit {
                break;
            }
        }
        Ok(result)
    }

    /// Security-prioritized source sample from a recursive tree walk,
    /// bounded in file count and total bytes.
    pub async fn fetch_source_files_for_security(
        &self,
        owner: &str,
        repo: &str,
        language: Option<&str>,
        default_branch: &str,
    ) -> Result<Option<String>> {
        let Some(language) = language else {
            return Ok(None);
        };
        let lang = language.to_lowercase();
        let extensions: &[&str] = match LANGUAGE_EXTENSIONS.iter().find(|(l, _)| *l == lang) {
            Some((_, exts)) => exts,
            None if lang.contains("python") => &[".py"],
            None if lang.contains("javascript") || lang.contains("node") => &[".js", ".mjs"],
            None if lang.contains("typescript") => &[".ts", ".tsx"],
            None => return Ok(None),
        };

        let tree = self
            .client
            .get(
                &format!("/repos/{owner}/{repo}/git/trees/{default_branch}"),
                &[("recursive", "1".to_string())],
            )
            .await?;
        let Some(items) = tree.as_ref().and_then(|t| t.get("tree")).and_then(Value::as_array)
        else {
            return Ok(None);
        };

        let mut candidates: Vec<(String, String, u64, usize)> = Vec::new();
        for item in items {
            if item.get("type").and_then(Value::as_str) != Some("blob") {
                continue;
            }
            let Some(path) = item.get("path").and_then(Value::as_str) else {
                continue;
            };
            let size = item.get("size").and_then(Value::as_u64).unwrap_or(0);
            if size > SOURCE_FILE_CAP {
                continue;
            }
            if !extensions.iter().any(|ext| path.ends_with(ext)) {
                continue;
            }
            let path_lower = path.to_lowercase();
            if SKIP_PATH_PATTERNS.iter().any(|p| path_lower.contains(p)) {
                continue;
            }
            let Some(sha) = item.get("sha").and_then(Value::as_str) else {
                continue;
            };

            let filename = path_lower.rsplit('/').next().unwrap_or(&path_lower);
            let priority = SECURITY_PRIORITY_PATTERNS
                .iter()
                .position(|p| filename.contains(p) || path_lower.contains(p))
                .map(|i| SECURITY_PRIORITY_PATTERNS.len() - i)
                .unwrap_or(0);

            candidates.push((path.to_string(), sha.to_string(), size, priority));
        }

        if candidates.is_empty() {
            return Ok(None);
        }
        // Highest priority first, shallower paths break ties.
        candidates.sort_by(|a, b| {
            b.3.cmp(&a.3)
                .then_with(|| a.0.matches('/').count().cmp(&b.0.matches('/').count()))
        });

        let mut fetched = Vec::new();
        let mut total_bytes = 0usize;
        for (path, sha, _, _) in candidates {
            if fetched.len() >= SOURCE_MAX_FILES || total_bytes >= SOURCE_MAX_BYTES {
                break;
            }
            let Some(blob) = self
                .client
                .get(&format!("/repos/{owner}/{repo}/git/blobs/{sha}"), &[])
                .await
                .ok()
                .flatten()
            else {
                continue;
            };
            let Some(mut content) = decode_content(&blob) else {
                continue;
            };
            let remaining = SOURCE_MAX_BYTES - total_bytes;
            if content.len() > remaining {
                let head = truncate(&content, remaining).to_string();
                content = format!("{head}\n... (truncated)");
            }
            total_bytes += content.len();
            fetched.push(format!("=== FILE: {path} ===\n{content}"));
        }

        debug!(owner, repo, files = fetched.len(), bytes = total_bytes, "sampled sources");
        Ok(if fetched.is_empty() {
            None
        } else {
            Some(fetched.join("\n\n"))
        })
    }

    /// Structured activity numbers for the maintenance prompt.
    pub fn maintenance_figures(data: &pkgpulse_core::RepoData) -> Value {
        json!({
            "last_commit": data
                .commits
                .last_commit_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            "commits_last_6mo": data.commits.commits_last_6mo,
            "open_issues": data.issues.open_issues,
            "closed_issues_6mo": data.issues.closed_issues_6mo,
            "open_prs": data.prs.open_prs,
            "merged_prs_6mo": data.prs.merged_prs_6mo,
            "last_release": data.releases.last_release_date.map(|d| d.to_rfc3339()),
            "active_contributors_6mo": data.contributors.active_contributors_6mo,
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(content: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(content)
    }

    #[tokio::test]
    async fn changelog_tries_filenames_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/CHANGELOG.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/CHANGELOG"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": b64("## 1.0\n- init")})),
            )
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher::with_base_url(server.uri(), None);
        let changelog = fetcher.fetch_changelog_content("o", "r").await.unwrap();
        assert_eq!(changelog.as_deref(), Some("## 1.0\n- init"));
    }

    #[tokio::test]
    async fn recent_issues_filter_prs_and_truncate() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(900);
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"title": "bug", "state": "open", "body": long_body, "comments": 2, "labels": []},
                {"title": "pr", "state": "open", "pull_request": {}, "labels": []}
            ])))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher::with_base_url(server.uri(), None);
        let issues = fetcher.fetch_recent_issues("o", "r", 15).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["body"].as_str().unwrap().len(), 500);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 3);
        assert!(t.len() <= 3);
        assert!(s.starts_with(t));
    }
}
