//! Periodic publication of ecosystem summaries.
//!
//! Every N analyzed packages (and once more at shutdown) the publisher
//! rebuilds `<data>/final/<ecosystem>.json` from the persisted artifacts,
//! plus an aggregate `stats.json`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

pub struct Publisher {
    data_dir: PathBuf,
    publish_interval: u64,
    packages_since_publish: u64,
}

impl Publisher {
    pub fn new(data_dir: impl Into<PathBuf>, publish_interval: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            publish_interval: publish_interval.max(1),
            packages_since_publish: 0,
        }
    }

    pub fn record_package(&mut self) {
        self.packages_since_publish += 1;
    }

    /// Publish if the interval has elapsed.
    pub fn maybe_publish(&mut self) -> Result<()> {
        if self.packages_since_publish >= self.publish_interval {
            self.publish()?;
        }
        Ok(())
    }

    /// Publish unconditionally (shutdown path).
    pub fn force_publish(&mut self) -> Result<()> {
        if self.packages_since_publish > 0 {
            self.publish()?;
        }
        Ok(())
    }

    fn publish(&mut self) -> Result<()> {
        let analyzed_dir = self.data_dir.join("analyzed");
        let final_dir = self.data_dir.join("final");
        std::fs::create_dir_all(&final_dir)
            .with_context(|| format!("creating {}", final_dir.display()))?;

        let mut stats: Value = std::fs::read_to_string(final_dir.join("stats.json"))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| json!({}));

        let Ok(entries) = std::fs::read_dir(&analyzed_dir) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let ecosystem = entry.file_name().to_string_lossy().to_string();
            match self.publish_ecosystem(&entry.path(), &ecosystem, &final_dir) {
                Ok(eco_stats) => {
                    stats[&ecosystem] = eco_stats;
                }
                Err(e) => warn!(ecosystem, "publication failed: {e}"),
            }
        }

        std::fs::write(
            final_dir.join("stats.json"),
            serde_json::to_string_pretty(&stats)?,
        )?;
        info!(packages = self.packages_since_publish, "published summaries");
        self.packages_since_publish = 0;
        Ok(())
    }

    /// Lightweight summary rows per package, plus ecosystem aggregates.
    fn publish_ecosystem(
        &self,
        dir: &std::path::Path,
        ecosystem: &str,
        final_dir: &std::path::Path,
    ) -> Result<Value> {
        let mut rows = Vec::new();
        let mut available = 0u64;
        let mut score_sum = 0.0f64;
        let mut scored = 0u64;

        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current)?.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let Ok(analysis) = serde_json::from_str::<Value>(&content) else {
                    continue;
                };

                let availability = analysis
                    .get("data_availability")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                if availability == "available" || availability == "partial_forge" {
                    available += 1;
                }
                if let Some(overall) = analysis.pointer("/scores/overall").and_then(Value::as_f64)
                {
                    score_sum += overall;
                    scored += 1;
                }

                rows.push(json!({
                    "name": analysis.get("name"),
                    "version": analysis.get("version"),
                    "description": analysis.get("description"),
                    "install_count_30d": analysis.get("install_count_30d"),
                    "data_availability": analysis.get("data_availability"),
                    "unavailable_reason": analysis.get("unavailable_reason"),
                    "scores": analysis.get("scores"),
                    "analysis_summary": analysis.get("analysis_summary"),
                    "repository": analysis.get("repository"),
                    "analyzed_at": analysis.get("analyzed_at"),
                }));
            }
        }

        let total = rows.len() as u64;
        std::fs::write(
            final_dir.join(format!("{ecosystem}.json")),
            serde_json::to_string_pretty(&rows)?,
        )?;

        Ok(json!({
            "total_packages": total,
            "available_packages": available,
            "unavailable_packages": total - available,
            "avg_score": if scored > 0 { Some(score_sum / scored as f64) } else { None },
            "last_updated": Utc::now().to_rfc3339(),
        }))
    }
}
