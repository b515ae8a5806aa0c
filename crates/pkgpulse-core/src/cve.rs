//! CVE history aggregated from vulnerability databases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vulnerability severity, ranked CRITICAL < HIGH < MEDIUM < LOW < UNKNOWN
/// for sorting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    /// Sort rank; lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Unknown => 4,
        }
    }

    /// Band a CVSS v3 base score into a severity.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Parse an upstream severity label, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" | "MODERATE" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

/// One vulnerability record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveDetail {
    /// CVE-2024-1234 or GHSA-xxxx identifier.
    pub id: String,
    pub summary: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_release_at: Option<DateTime<Utc>>,
    /// `patch_release_at - published_at`, clamped to >= 0; only set when both
    /// dates are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_patch: Option<i64>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Complete CVE history for one package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CveHistory {
    #[serde(default)]
    pub total_cves: usize,
    #[serde(default)]
    pub cves: Vec<CveDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_days_to_patch: Option<f64>,
    #[serde(default)]
    pub has_unpatched: bool,
}

impl CveHistory {
    /// Build a history from detail records, sorting by severity rank then
    /// published date descending and deriving the aggregates.
    pub fn from_details(mut cves: Vec<CveDetail>) -> Self {
        cves.sort_by(|a, b| {
            a.severity
                .rank()
                .cmp(&b.severity.rank())
                .then(b.published_at.cmp(&a.published_at))
        });

        let has_unpatched = cves.iter().any(|c| c.fixed_version.is_none());
        let patched: Vec<i64> = cves.iter().filter_map(|c| c.days_to_patch).collect();
        let avg_days_to_patch = if patched.is_empty() {
            None
        } else {
            Some(patched.iter().sum::<i64>() as f64 / patched.len() as f64)
        };

        CveHistory {
            total_cves: cves.len(),
            cves,
            avg_days_to_patch,
            has_unpatched,
        }
    }

    /// Whether any unpatched CVE was published more than `days` days ago.
    pub fn has_unpatched_older_than(&self, days: i64, now: DateTime<Utc>) -> bool {
        self.cves.iter().any(|c| {
            c.fixed_version.is_none() && (now - c.published_at).num_days() > days
        })
    }

    /// Whether any unpatched CVE of the given severity exists.
    pub fn has_unpatched_at(&self, severity: Severity) -> bool {
        self.cves
            .iter()
            .any(|c| c.fixed_version.is_none() && c.severity == severity)
    }
}
