//! Shared metrics snapshot for the dashboard.
//!
//! A mutex-protected in-process snapshot persisted as JSON after each
//! significant mutation. Session fields reset on `start_batch`; cumulative
//! fields (result counts, grade distribution, running-average stage timings,
//! activity and error rings) are loaded from the file and survive restarts.
//! Persistence is best-effort: a failed write never disrupts the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

const ERROR_RING: usize = 10;
const ACTIVITY_RING: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub package: String,
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub package: String,
    /// scored, unavailable, error.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Completion status recorded per package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Scored,
    Unavailable,
    Error,
}

impl CompletionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Scored => "scored",
            CompletionStatus::Unavailable => "unavailable",
            CompletionStatus::Error => "error",
        }
    }
}

/// The full snapshot persisted to `<data>/.metrics.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetrics {
    // Session fields, reset per batch.
    #[serde(default)]
    pub ecosystem: String,
    #[serde(default)]
    pub total_packages: u64,
    #[serde(default)]
    pub completed_packages: u64,
    #[serde(default)]
    pub current_package: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    // Cumulative fields, preserved across restarts.
    #[serde(default)]
    pub scored_count: u64,
    #[serde(default)]
    pub unavailable_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default = "empty_grades")]
    pub grade_distribution: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_score: f64,

    // Upstream API status.
    #[serde(default = "default_rate_limit")]
    pub github_rate_limit_remaining: i64,
    #[serde(default = "default_rate_limit")]
    pub github_rate_limit_total: i64,
    #[serde(default)]
    pub github_rate_limit_reset: Option<DateTime<Utc>>,
    #[serde(default)]
    pub llm_available: bool,
    #[serde(default)]
    pub llm_model: String,
    #[serde(default = "unknown_status")]
    pub osv_status: String,

    // Running-average stage timings (seconds) and observation counts.
    #[serde(default)]
    pub stage_timings: BTreeMap<String, f64>,
    #[serde(default)]
    pub stage_counts: BTreeMap<String, u64>,

    #[serde(default)]
    pub recent_errors: VecDeque<ErrorEntry>,
    #[serde(default)]
    pub activity_log: VecDeque<ActivityEntry>,

    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn empty_grades() -> BTreeMap<String, u64> {
    ["A", "B", "C", "D", "F"]
        .iter()
        .map(|g| (g.to_string(), 0))
        .collect()
}

fn default_rate_limit() -> i64 {
    5000
}

fn unknown_status() -> String {
    "unknown".to_string()
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            ecosystem: String::new(),
            total_packages: 0,
            completed_packages: 0,
            current_package: String::new(),
            start_time: None,
            scored_count: 0,
            unavailable_count: 0,
            error_count: 0,
            grade_distribution: empty_grades(),
            total_score: 0.0,
            github_rate_limit_remaining: 5000,
            github_rate_limit_total: 5000,
            github_rate_limit_reset: None,
            llm_available: false,
            llm_model: String::new(),
            osv_status: unknown_status(),
            stage_timings: BTreeMap::new(),
            stage_counts: BTreeMap::new(),
            recent_errors: VecDeque::new(),
            activity_log: VecDeque::new(),
            is_running: false,
            last_updated: None,
        }
    }
}

impl PipelineMetrics {
    pub fn average_score(&self) -> Option<f64> {
        if self.scored_count == 0 {
            None
        } else {
            Some(self.total_score / self.scored_count as f64)
        }
    }
}

/// Thread-safe collector; the single writer of the metrics file.
pub struct MetricsCollector {
    path: PathBuf,
    inner: Mutex<PipelineMetrics>,
}

impl MetricsCollector {
    /// Load any existing snapshot so cumulative fields survive restarts.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let metrics = Self::load_from(&path).unwrap_or_default();
        Self {
            path,
            inner: Mutex::new(metrics),
        }
    }

    fn load_from(path: &Path) -> Option<PipelineMetrics> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Read the snapshot back from disk (dashboard-style read).
    pub fn load(&self) -> PipelineMetrics {
        Self::load_from(&self.path).unwrap_or_default()
    }

    /// Current in-memory snapshot.
    pub fn snapshot(&self) -> PipelineMetrics {
        self.inner.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn with<F: FnOnce(&mut PipelineMetrics)>(&self, persist: bool, mutate: F) {
        let Ok(mut metrics) = self.inner.lock() else {
            return;
        };
        mutate(&mut metrics);
        metrics.last_updated = Some(Utc::now());
        if persist {
            self.save(&metrics);
        }
    }

    /// Best-effort persistence; failures are swallowed.
    fn save(&self, metrics: &PipelineMetrics) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(content) = serde_json::to_string_pretty(metrics) {
            let _ = std::fs::write(&self.path, content);
        }
    }

    /// Start a batch: session fields reset, cumulative fields retained.
    pub fn start_batch(&self, total: u64, ecosystem: &str) {
        self.with(true, |m| {
            m.ecosystem = ecosystem.to_string();
            m.total_packages = total;
            m.completed_packages = 0;
            m.current_package.clear();
            m.start_time = Some(Utc::now());
            m.is_running = true;
        });
    }

    pub fn start_package(&self, name: &str) {
        self.with(true, |m| {
            m.current_package = name.to_string();
        });
    }

    pub fn complete_package(
        &self,
        name: &str,
        status: CompletionStatus,
        score: Option<f64>,
        grade: Option<&str>,
        message: Option<&str>,
    ) {
        self.with(true, |m| {
            m.completed_packages += 1;
            m.current_package.clear();
            match status {
                CompletionStatus::Scored => {
                    m.scored_count += 1;
                    if let Some(score) = score {
                        m.total_score += score;
                    }
                    if let Some(grade) = grade {
                        *m.grade_distribution.entry(grade.to_string()).or_insert(0) += 1;
                    }
                }
                CompletionStatus::Unavailable => m.unavailable_count += 1,
                CompletionStatus::Error => m.error_count += 1,
            }
            m.activity_log.push_back(ActivityEntry {
                timestamp: Utc::now(),
                package: name.to_string(),
                status: status.as_str().to_string(),
                score,
                grade: grade.map(String::from),
                message: message.map(String::from),
            });
            while m.activity_log.len() > ACTIVITY_RING {
                m.activity_log.pop_front();
            }
        });
    }

    pub fn record_error(&self, package: &str, error_type: &str, message: &str) {
        self.with(true, |m| {
            m.recent_errors.push_back(ErrorEntry {
                timestamp: Utc::now(),
                package: package.to_string(),
                error_type: error_type.to_string(),
                message: message.to_string(),
            });
            while m.recent_errors.len() > ERROR_RING {
                m.recent_errors.pop_front();
            }
        });
    }

    /// Update the running average for one stage. Not persisted per
    /// observation; timings are written with the next package event.
    pub fn record_stage_timing(&self, stage: &str, duration_secs: f64) {
        self.with(false, |m| {
            let count = m.stage_counts.get(stage).copied().unwrap_or(0);
            let avg = m.stage_timings.get(stage).copied().unwrap_or(0.0);
            let new_count = count + 1;
            let new_avg = (avg * count as f64 + duration_secs) / new_count as f64;
            m.stage_counts.insert(stage.to_string(), new_count);
            m.stage_timings.insert(stage.to_string(), new_avg);
        });
    }

    pub fn update_github_rate_limit(
        &self,
        remaining: i64,
        total: i64,
        reset: Option<DateTime<Utc>>,
    ) {
        self.with(false, |m| {
            m.github_rate_limit_remaining = remaining;
            m.github_rate_limit_total = total;
            m.github_rate_limit_reset = reset;
        });
    }

    pub fn update_llm_status(&self, available: bool, model: &str) {
        self.with(true, |m| {
            m.llm_available = available;
            m.llm_model = model.to_string();
        });
    }

    pub fn update_osv_status(&self, status: &str) {
        self.with(false, |m| {
            m.osv_status = status.to_string();
        });
    }

    pub fn set_totals(&self, total: u64) {
        self.with(true, |m| {
            m.total_packages = total;
            m.completed_packages = 0;
        });
    }

    pub fn set_running(&self, running: bool) {
        self.with(true, |m| {
            m.is_running = running;
            if !running {
                m.current_package.clear();
            }
        });
    }

    /// Scoped timer recording into the running averages on drop.
    pub fn stage_timer<'a>(&'a self, stage: &str) -> StageTimer<'a> {
        StageTimer {
            collector: self,
            stage: stage.to_string(),
            start: Instant::now(),
        }
    }
}

pub struct StageTimer<'a> {
    collector: &'a MetricsCollector,
    stage: String,
    start: Instant,
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        self.collector
            .record_stage_timing(&self.stage, self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collector(dir: &TempDir) -> MetricsCollector {
        MetricsCollector::new(dir.path().join(".metrics.json"))
    }

    #[test]
    fn running_average_equals_arithmetic_mean() {
        let dir = TempDir::new().unwrap();
        let metrics = collector(&dir);
        let durations = [0.5, 1.5, 2.0, 4.0];
        for d in durations {
            metrics.record_stage_timing("github", d);
        }
        let snapshot = metrics.snapshot();
        let expected = durations.iter().sum::<f64>() / durations.len() as f64;
        assert!((snapshot.stage_timings["github"] - expected).abs() < 1e-9);
        assert_eq!(snapshot.stage_counts["github"], 4);
    }

    #[test]
    fn snapshot_round_trips_through_persistence() {
        let dir = TempDir::new().unwrap();
        let metrics = collector(&dir);
        metrics.start_batch(10, "npm");
        metrics.complete_package("lodash", CompletionStatus::Scored, Some(88.5), Some("B"), None);
        metrics.record_error("left-pad", "FetchError", "timeout");

        let reloaded = metrics.load();
        let snapshot = metrics.snapshot();
        assert_eq!(reloaded.scored_count, snapshot.scored_count);
        assert_eq!(reloaded.grade_distribution, snapshot.grade_distribution);
        assert_eq!(reloaded.total_score, snapshot.total_score);
        assert_eq!(reloaded.recent_errors.len(), 1);
        assert_eq!(reloaded.activity_log.len(), 1);
        assert_eq!(reloaded.ecosystem, "npm");
    }

    #[test]
    fn cumulative_fields_survive_batch_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".metrics.json");
        {
            let metrics = MetricsCollector::new(&path);
            metrics.start_batch(5, "npm");
            metrics.complete_package("a", CompletionStatus::Scored, Some(90.0), Some("A"), None);
            metrics.complete_package("b", CompletionStatus::Unavailable, None, None, Some("no repo"));
        }
        // New process: cumulative counters persist, session fields reset.
        let metrics = MetricsCollector::new(&path);
        metrics.start_batch(7, "pypi");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scored_count, 1);
        assert_eq!(snapshot.unavailable_count, 1);
        assert_eq!(snapshot.grade_distribution["A"], 1);
        assert_eq!(snapshot.completed_packages, 0);
        assert_eq!(snapshot.ecosystem, "pypi");
        assert_eq!(snapshot.total_packages, 7);
    }

    #[test]
    fn rings_are_bounded() {
        let dir = TempDir::new().unwrap();
        let metrics = collector(&dir);
        for i in 0..60 {
            metrics.complete_package(
                &format!("pkg{i}"),
                CompletionStatus::Scored,
                Some(50.0),
                Some("F"),
                None,
            );
        }
        for i in 0..15 {
            metrics.record_error(&format!("pkg{i}"), "E", "boom");
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.activity_log.len(), 50);
        assert_eq!(snapshot.recent_errors.len(), 10);
        assert_eq!(snapshot.activity_log.back().unwrap().package, "pkg59");
    }

    #[test]
    fn stage_timer_records_on_drop() {
        let dir = TempDir::new().unwrap();
        let metrics = collector(&dir);
        {
            let _timer = metrics.stage_timer("metadata");
        }
        assert_eq!(metrics.snapshot().stage_counts["metadata"], 1);
    }

    #[test]
    fn average_score_over_scored_only() {
        let dir = TempDir::new().unwrap();
        let metrics = collector(&dir);
        assert_eq!(metrics.snapshot().average_score(), None);
        metrics.complete_package("a", CompletionStatus::Scored, Some(80.0), Some("B"), None);
        metrics.complete_package("b", CompletionStatus::Scored, Some(60.0), Some("D"), None);
        metrics.complete_package("c", CompletionStatus::Unavailable, None, None, None);
        assert_eq!(metrics.snapshot().average_score(), Some(70.0));
    }
}
