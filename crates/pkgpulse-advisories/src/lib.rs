//! OSV vulnerability fetcher
//!
//! Queries the OSV database by package ecosystem, or by
//! `pkg:github/owner/repo` purl for ecosystems without an OSV key
//! (Homebrew), and assembles a sorted `CveHistory` with patch timing
//! derived from the repository's release-date tag map.
//!
//! No authentication required. OSV coverage for purl queries is partial;
//! an empty result is zero *known* CVEs, not evidence of safety.

use chrono::{DateTime, Utc};
use pkgpulse_core::{CveDetail, CveHistory, Ecosystem, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const OSV_API_BASE: &str = "https://api.osv.dev/v1";
const MAX_REFERENCES: usize = 5;
const MAX_SUMMARY_LEN: usize = 500;

#[derive(Error, Debug)]
pub enum OsvError {
    #[error("OSV request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected OSV response: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("OSV returned HTTP {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, OsvError>;

#[derive(Debug, Serialize)]
struct QueryRequest {
    package: QueryPackage,
}

#[derive(Debug, Serialize)]
struct QueryPackage {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ecosystem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purl: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    vulns: Vec<Value>,
}

/// Map our ecosystems to OSV ecosystem keys. Homebrew has none and is
/// queried by repository purl instead.
fn osv_ecosystem(ecosystem: Ecosystem) -> Option<&'static str> {
    match ecosystem {
        Ecosystem::Npm => Some("npm"),
        Ecosystem::Pypi => Some("PyPI"),
        Ecosystem::Crates => Some("crates.io"),
        Ecosystem::Homebrew => None,
    }
}

pub struct OsvFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl OsvFetcher {
    pub fn new() -> Self {
        Self::with_base_url(OSV_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("pkgpulse/0.4")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn query(&self, package: QueryPackage) -> Result<Vec<Value>> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&QueryRequest { package })
            .send()
            .await?;
        match response.status().as_u16() {
            200 => {
                let body: QueryResponse = response.json().await?;
                Ok(body.vulns)
            }
            status => Err(OsvError::Status(status)),
        }
    }

    /// Vulnerabilities by package name within an ecosystem.
    pub async fn fetch_by_package(
        &self,
        package_name: &str,
        ecosystem: Ecosystem,
    ) -> Result<Vec<Value>> {
        let Some(osv_eco) = osv_ecosystem(ecosystem) else {
            return Ok(vec![]);
        };
        self.query(QueryPackage {
            name: Some(package_name.to_string()),
            ecosystem: Some(osv_eco.to_string()),
            purl: None,
        })
        .await
    }

    /// Vulnerabilities by repository purl (GitHub advisory aggregation).
    pub async fn fetch_by_repo(&self, owner: &str, repo: &str) -> Result<Vec<Value>> {
        self.query(QueryPackage {
            name: None,
            ecosystem: None,
            purl: Some(format!("pkg:github/{owner}/{repo}")),
        })
        .await
    }

    /// Complete CVE history for a package, with days-to-patch filled from
    /// the release-date tag map when available.
    pub async fn fetch_cve_history(
        &self,
        package_name: &str,
        ecosystem: Ecosystem,
        repo: Option<(&str, &str)>,
        release_dates: Option<&HashMap<String, DateTime<Utc>>>,
    ) -> Result<CveHistory> {
        let vulns = match (ecosystem, repo) {
            (Ecosystem::Homebrew, Some((owner, repo))) => self.fetch_by_repo(owner, repo).await?,
            (Ecosystem::Homebrew, None) => vec![],
            _ => self.fetch_by_package(package_name, ecosystem).await?,
        };

        debug!(package = package_name, count = vulns.len(), "fetched OSV records");

        let details = vulns
            .iter()
            .map(|v| parse_vulnerability(v, release_dates))
            .collect();
        Ok(CveHistory::from_details(details))
    }
}

impl Default for OsvFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert one OSV record into a `CveDetail`.
fn parse_vulnerability(
    vuln: &Value,
    release_dates: Option<&HashMap<String, DateTime<Utc>>>,
) -> CveDetail {
    let id = vuln
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();

    let summary = vuln
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| {
            vuln.get("details")
                .and_then(Value::as_str)
                .map(|d| truncate(d, 200).to_string())
        })
        .unwrap_or_default();

    let (severity, cvss_score) = parse_severity(vuln);

    let published_at = vuln
        .get("published")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let fixed_version = parse_fixed_version(vuln);

    let patch_release_at = fixed_version
        .as_deref()
        .zip(release_dates)
        .and_then(|(version, dates)| find_release_date(version, dates));
    let days_to_patch =
        patch_release_at.map(|patched| (patched - published_at).num_days().max(0));

    let references = vuln
        .get("references")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("url").and_then(Value::as_str))
                .take(MAX_REFERENCES)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    CveDetail {
        id,
        summary: truncate(&summary, MAX_SUMMARY_LEN).to_string(),
        severity,
        cvss_score,
        published_at,
        fixed_version,
        patch_release_at,
        days_to_patch,
        references,
    }
}

/// Severity parse order: explicit database severity, then CVSS v3 numeric,
/// then ecosystem-specific severity, then UNKNOWN.
fn parse_severity(vuln: &Value) -> (Severity, Option<f64>) {
    let db_specific = vuln.get("database_specific");

    let mut cvss_score: Option<f64> = None;
    if let Some(severities) = vuln.get("severity").and_then(Value::as_array) {
        for sev in severities {
            if sev.get("type").and_then(Value::as_str) == Some("CVSS_V3") {
                if let Some(score) = sev.get("score").and_then(Value::as_f64) {
                    cvss_score = Some(score);
                }
            }
        }
    }
    if cvss_score.is_none() {
        cvss_score = db_specific.and_then(|db| match db.get("cvss") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::Object(o)) => o.get("score").and_then(Value::as_f64),
            _ => None,
        });
    }

    if let Some(label) = db_specific
        .and_then(|db| db.get("severity"))
        .and_then(Value::as_str)
    {
        let parsed = Severity::parse(label);
        if parsed != Severity::Unknown {
            return (parsed, cvss_score);
        }
    }

    if let Some(score) = cvss_score {
        return (Severity::from_cvss(score), Some(score));
    }

    if let Some(affected) = vuln.get("affected").and_then(Value::as_array) {
        for entry in affected {
            if let Some(label) = entry
                .pointer("/ecosystem_specific/severity")
                .and_then(Value::as_str)
            {
                let parsed = Severity::parse(label);
                if parsed != Severity::Unknown {
                    return (parsed, cvss_score);
                }
            }
        }
    }

    (Severity::Unknown, cvss_score)
}

/// First `fixed` event across all affected ranges.
fn parse_fixed_version(vuln: &Value) -> Option<String> {
    for affected in vuln.get("affected")?.as_array()? {
        let Some(ranges) = affected.get("ranges").and_then(Value::as_array) else {
            continue;
        };
        for range in ranges {
            let Some(events) = range.get("events").and_then(Value::as_array) else {
                continue;
            };
            for event in events {
                if let Some(fixed) = event.get("fixed").and_then(Value::as_str) {
                    return Some(fixed.to_string());
                }
            }
        }
    }
    None
}

/// Look up a version in the tag map: exact, then `v`-prefixed, then with a
/// leading `v` stripped.
fn find_release_date(
    version: &str,
    release_dates: &HashMap<String, DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if let Some(date) = release_dates.get(version) {
        return Some(*date);
    }
    if let Some(date) = release_dates.get(&format!("v{version}")) {
        return Some(*date);
    }
    version
        .strip_prefix('v')
        .and_then(|stripped| release_dates.get(stripped))
        .copied()
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
    use chrono::TimeZone;
    use wiremock::matchers::{body_json_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn severity_prefers_explicit_label() {
        let vuln = serde_json::json!({
            "database_specific": {"severity": "HIGH", "cvss": 9.8}
        });
        let (sev, score) = parse_severity(&vuln);
        assert_eq!(sev, Severity::High);
        assert_eq!(score, Some(9.8));
    }

    #[test]
    fn severity_falls_back_to_cvss_then_ecosystem_specific() {
        let by_cvss = serde_json::json!({"database_specific": {"cvss": {"score": 7.5}}});
        assert_eq!(parse_severity(&by_cvss).0, Severity::High);

        let by_eco = serde_json::json!({
            "affected": [{"ecosystem_specific": {"severity": "moderate"}}]
        });
        assert_eq!(parse_severity(&by_eco).0, Severity::Medium);

        let unknown = serde_json::json!({});
        assert_eq!(parse_severity(&unknown).0, Severity::Unknown);
    }

    #[test]
    fn fixed_version_is_first_fixed_event() {
        let vuln = serde_json::json!({
            "affected": [{
                "ranges": [{
                    "type": "SEMVER",
                    "events": [{"introduced": "0"}, {"fixed": "1.2.4"}]
                }]
            }]
        });
        assert_eq!(parse_fixed_version(&vuln).as_deref(), Some("1.2.4"));
        assert_eq!(parse_fixed_version(&serde_json::json!({"affected": []})), None);
    }

    #[test]
    fn release_date_lookup_tries_v_forms() {
        let mut dates = HashMap::new();
        dates.insert(
            "v1.2.4".to_string(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        assert!(find_release_date("1.2.4", &dates).is_some());
        assert!(find_release_date("v1.2.4", &dates).is_some());
        assert!(find_release_date("2.0.0", &dates).is_none());
    }

    #[test]
    fn days_to_patch_clamps_to_zero() {
        let mut dates = HashMap::new();
        // Release predates publication; clamp, don't go negative.
        dates.insert(
            "1.0.1".to_string(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        let vuln = serde_json::json!({
            "id": "GHSA-x",
            "published": "2024-02-01T00:00:00Z",
            "affected": [{"ranges": [{"events": [{"fixed": "1.0.1"}]}]}]
        });
        let detail = parse_vulnerability(&vuln, Some(&dates));
        assert_eq!(detail.days_to_patch, Some(0));
    }

    #[tokio::test]
    async fn homebrew_queries_by_purl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_json_string(
                r#"{"package":{"purl":"pkg:github/o/r"}}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vulns": [{
                    "id": "GHSA-abcd",
                    "summary": "something bad",
                    "published": "2024-01-15T00:00:00Z",
                    "database_specific": {"severity": "LOW"},
                    "affected": [{"ranges": [{"events": [{"fixed": "2.0.0"}]}]}]
                }]
            })))
            .mount(&server)
            .await;

        let fetcher = OsvFetcher::with_base_url(server.uri());
        let history = fetcher
            .fetch_cve_history("wget", Ecosystem::Homebrew, Some(("o", "r")), None)
            .await
            .unwrap();
        assert_eq!(history.total_cves, 1);
        assert_eq!(history.cves[0].severity, Severity::Low);
        assert!(!history.has_unpatched);
    }

    #[tokio::test]
    async fn npm_queries_by_ecosystem_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_json_string(
                r#"{"package":{"name":"lodash","ecosystem":"npm"}}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"vulns": []})))
            .mount(&server)
            .await;

        let fetcher = OsvFetcher::with_base_url(server.uri());
        let history = fetcher
            .fetch_cve_history("lodash", Ecosystem::Npm, None, None)
            .await
            .unwrap();
        assert_eq!(history.total_cves, 0);
        assert!(!history.has_unpatched);
    }
}
