//! Work queue for continuous analysis.
//!
//! Classifies every known package as new (never analyzed), stale (analysis
//! older than the threshold), or up to date, by re-reading the persisted
//! artifact's `analyzed_at`. Serves packages in a ratio interleave
//! (default 3 new : 1 stale), falling through to whichever queue has items
//! when the other is exhausted.

use chrono::{DateTime, Duration, Utc};
use pkgpulse_adapters::RegistryAdapter;
use pkgpulse_core::{Ecosystem, PackageRef};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSource {
    New,
    Stale,
}

#[derive(Debug, Clone)]
pub struct QueuedPackage {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub source: PackageSource,
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl QueuedPackage {
    /// Stable identity of the queued package.
    pub fn package_ref(&self) -> PackageRef {
        PackageRef::new(self.ecosystem, self.name.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkQueueStats {
    pub new_packages: usize,
    pub stale_packages: usize,
    pub up_to_date: usize,
    pub ecosystems: BTreeMap<String, usize>,
}

pub struct WorkQueue {
    data_dir: PathBuf,
    stale_threshold: Duration,
    new_ratio: u32,
    stale_ratio: u32,
    new_queue: VecDeque<QueuedPackage>,
    stale_queue: VecDeque<QueuedPackage>,
    cycle_position: u32,
}

impl WorkQueue {
    pub fn new(data_dir: impl Into<PathBuf>, stale_threshold_days: i64, ratio: (u32, u32)) -> Self {
        Self {
            data_dir: data_dir.into(),
            stale_threshold: Duration::days(stale_threshold_days),
            new_ratio: ratio.0.max(1),
            stale_ratio: ratio.1.max(1),
            new_queue: VecDeque::new(),
            stale_queue: VecDeque::new(),
            cycle_position: 0,
        }
    }

    /// Path of the persisted artifact for a package.
    pub fn analysis_path(data_dir: &Path, ecosystem: Ecosystem, name: &str) -> PathBuf {
        data_dir
            .join("analyzed")
            .join(ecosystem.as_str())
            .join(format!("{name}.json"))
    }

    /// Rebuild both queues from the adapters' listings and the artifacts on
    /// disk. New packages keep discovery order; stale packages are served
    /// oldest first.
    pub async fn refresh(&mut self, adapters: &[Box<dyn RegistryAdapter>]) -> WorkQueueStats {
        let mut stats = WorkQueueStats::default();
        self.new_queue.clear();
        self.stale_queue.clear();
        self.cycle_position = 0;

        let stale_cutoff = Utc::now() - self.stale_threshold;

        for adapter in adapters {
            let ecosystem = adapter.ecosystem();
            let names = match adapter.list_packages(None).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(ecosystem = %ecosystem, "listing failed during refresh: {e}");
                    continue;
                }
            };
            stats
                .ecosystems
                .insert(ecosystem.as_str().to_string(), names.len());

            for name in names {
                let path = Self::analysis_path(&self.data_dir, ecosystem, &name);
                match read_analyzed_at(&path) {
                    None => {
                        self.new_queue.push_back(QueuedPackage {
                            ecosystem,
                            name,
                            source: PackageSource::New,
                            last_analyzed: None,
                        });
                        stats.new_packages += 1;
                    }
                    Some(analyzed_at) if analyzed_at < stale_cutoff => {
                        self.stale_queue.push_back(QueuedPackage {
                            ecosystem,
                            name,
                            source: PackageSource::Stale,
                            last_analyzed: Some(analyzed_at),
                        });
                        stats.stale_packages += 1;
                    }
                    Some(_) => stats.up_to_date += 1,
                }
            }
        }

        self.stale_queue
            .make_contiguous()
            .sort_by_key(|p| p.last_analyzed);

        info!(
            new = stats.new_packages,
            stale = stats.stale_packages,
            up_to_date = stats.up_to_date,
            "work queue refreshed"
        );
        stats
    }

    /// Next package under the interleave policy.
    pub fn next_package(&mut self) -> Option<QueuedPackage> {
        if self.new_queue.is_empty() && self.stale_queue.is_empty() {
            return None;
        }
        // One exhausted queue falls through to the other.
        if self.stale_queue.is_empty() {
            return self.new_queue.pop_front();
        }
        if self.new_queue.is_empty() {
            return self.stale_queue.pop_front();
        }

        let cycle_length = self.new_ratio + self.stale_ratio;
        let from_new = self.cycle_position < self.new_ratio;
        self.cycle_position += 1;
        if self.cycle_position >= cycle_length {
            self.cycle_position = 0;
        }
        if from_new {
            self.new_queue.pop_front()
        } else {
            self.stale_queue.pop_front()
        }
    }

    pub fn remaining(&self) -> usize {
        self.new_queue.len() + self.stale_queue.len()
    }
}

/// Extract `analyzed_at` from an artifact; unreadable files count as never
/// analyzed.
fn read_analyzed_at(path: &Path) -> Option<DateTime<Utc>> {
    let content = std::fs::read_to_string(path).ok()?;
    let data: Value = serde_json::from_str(&content).ok()?;
    let analyzed = data.get("analyzed_at")?.as_str()?;
    DateTime::parse_from_rfc3339(analyzed)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
