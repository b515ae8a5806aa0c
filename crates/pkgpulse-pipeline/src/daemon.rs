//! Continuous analysis daemon.
//!
//! A single cooperative loop: refresh the queue when due, pull the next
//! package, check rate limits, analyze, publish every N packages. Rate-limit
//! exhaustion sleeps until the provider's reset moment plus a buffer;
//! other failures back off exponentially. Shutdown is cooperative: a signal
//! flips a flag, the in-flight package completes, a final publish runs.

use crate::metrics::{CompletionStatus, MetricsCollector};
use crate::pipeline::AnalysisPipeline;
use crate::publisher::Publisher;
use crate::queue::{QueuedPackage, WorkQueue};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pkgpulse_adapters::{adapter_for, RegistryAdapter};
use pkgpulse_core::Ecosystem;
use pkgpulse_github::GitHubFetcher;
use pkgpulse_llm::{LlmClient, LlmMode, LlmOrchestrator};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const EMPTY_QUEUE_SLEEP: Duration = Duration::from_secs(60);
const SHUTDOWN_POLL: Duration = Duration::from_secs(10);
const ERROR_BACKOFF_BASE: f64 = 5.0;
const ERROR_BACKOFF_MAX: f64 = 300.0;

/// Raised when the code-host rate limit is too low to continue.
#[derive(Debug)]
pub struct RateLimitExhausted {
    pub reset_at: DateTime<Utc>,
    pub remaining: i64,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub github_token: Option<String>,
    pub skip_llm: bool,
    pub llm_model: String,
    pub llm_fast_model: String,
    pub parallel_llm: bool,
    pub stale_threshold_days: i64,
    pub interleave_ratio: (u32, u32),
    pub rate_limit_threshold: i64,
    pub publish_interval: u64,
    pub no_publish: bool,
    pub queue_refresh_interval_secs: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            github_token: None,
            skip_llm: true,
            llm_model: "llama3.3:70b".to_string(),
            llm_fast_model: "llama3.1:8b".to_string(),
            parallel_llm: false,
            stale_threshold_days: 7,
            interleave_ratio: (3, 1),
            rate_limit_threshold: 50,
            publish_interval: 50,
            no_publish: false,
            queue_refresh_interval_secs: 3600,
        }
    }
}

pub struct ContinuousDaemon {
    config: DaemonConfig,
    queue: WorkQueue,
    adapters: Vec<Box<dyn RegistryAdapter>>,
    pipelines: HashMap<Ecosystem, AnalysisPipeline>,
    github: Arc<GitHubFetcher>,
    metrics: Arc<MetricsCollector>,
    publisher: Publisher,
    shutdown: Arc<AtomicBool>,
    consecutive_errors: u32,
    total_analyzed: u64,
    last_queue_refresh: Option<DateTime<Utc>>,
}

impl ContinuousDaemon {
    pub fn new(config: DaemonConfig) -> Self {
        let metrics = Arc::new(MetricsCollector::new(config.data_dir.join(".metrics.json")));
        let github = Arc::new(GitHubFetcher::new(config.github_token.clone()));
        let queue = WorkQueue::new(
            &config.data_dir,
            config.stale_threshold_days,
            config.interleave_ratio,
        );
        let adapters: Vec<Box<dyn RegistryAdapter>> =
            [Ecosystem::Homebrew, Ecosystem::Npm, Ecosystem::Pypi]
                .into_iter()
                .filter_map(adapter_for)
                .collect();
        let publisher = Publisher::new(&config.data_dir, config.publish_interval);

        Self {
            config,
            queue,
            adapters,
            pipelines: HashMap::new(),
            github,
            metrics,
            publisher,
            shutdown: Arc::new(AtomicBool::new(false)),
            consecutive_errors: 0,
            total_analyzed: 0,
            last_queue_refresh: None,
        }
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Handle for signal wiring and tests.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn pipeline_for(&mut self, ecosystem: Ecosystem) -> Option<&AnalysisPipeline> {
        if !self.pipelines.contains_key(&ecosystem) {
            let adapter = adapter_for(ecosystem)?;
            let llm = if self.config.skip_llm {
                None
            } else {
                let client = LlmClient::new(
                    self.config.llm_model.clone(),
                    self.config.llm_fast_model.clone(),
                );
                let mode = if self.config.parallel_llm {
                    LlmMode::Parallel
                } else {
                    LlmMode::Sequential
                };
                Some(LlmOrchestrator::new(client, mode))
            };
            let pipeline = AnalysisPipeline::new(
                adapter,
                Arc::clone(&self.github),
                llm,
                &self.config.data_dir,
                Arc::clone(&self.metrics),
            );
            self.pipelines.insert(ecosystem, pipeline);
        }
        self.pipelines.get(&ecosystem)
    }

    fn install_signal_handlers(&self) {
        let flag = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("SIGTERM handler unavailable: {e}");
                        let _ = ctrl_c.await;
                        flag.store(true, Ordering::SeqCst);
                        return;
                    }
                };
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            info!("shutdown requested, finishing current package");
            flag.store(true, Ordering::SeqCst);
        });
    }

    /// Run until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.install_signal_handlers();

        info!(data_dir = %self.config.data_dir.display(), "starting continuous analysis daemon");
        info!(
            llm = %if self.config.skip_llm { "disabled".to_string() } else { self.config.llm_model.clone() },
            publish = %if self.config.no_publish { "disabled".to_string() } else { format!("every {} packages", self.config.publish_interval) },
            "daemon configuration"
        );

        self.refresh_queue_if_needed(true).await;
        self.metrics.set_running(true);

        let result = self.main_loop().await;

        if !self.config.no_publish {
            info!("publishing pending changes before shutdown");
            if let Err(e) = self.publisher.force_publish() {
                warn!("final publish failed: {e}");
            }
        }
        self.metrics.set_running(false);
        info!(total = self.total_analyzed, "daemon shutdown complete");
        result
    }

    async fn main_loop(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.refresh_queue_if_needed(false).await;

            let Some(package) = self.queue.next_package() else {
                info!(
                    total = self.total_analyzed,
                    "work queue empty, waiting for refresh interval"
                );
                self.interruptible_sleep(EMPTY_QUEUE_SLEEP).await;
                continue;
            };

            if let Some(exhausted) = self.check_rate_limits() {
                self.handle_rate_limit(exhausted).await;
                continue;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self.analyze(&package).await {
                Ok(()) => {
                    self.consecutive_errors = 0;
                    self.total_analyzed += 1;
                    if !self.config.no_publish {
                        self.publisher.record_package();
                        if let Err(e) = self.publisher.maybe_publish() {
                            warn!("publication failed: {e}");
                        }
                    }
                }
                Err(e) => self.handle_error(&package, e).await,
            }
        }
        Ok(())
    }

    async fn refresh_queue_if_needed(&mut self, force: bool) {
        let now = Utc::now();
        if !force {
            if let Some(last) = self.last_queue_refresh {
                if (now - last).num_seconds() < self.config.queue_refresh_interval_secs {
                    return;
                }
            }
        }

        info!("refreshing work queue");
        let stats = self.queue.refresh(&self.adapters).await;
        self.last_queue_refresh = Some(now);
        self.metrics
            .set_totals((stats.new_packages + stats.stale_packages) as u64);
    }

    /// Preemptive rate-limit check against the fetcher's cached state.
    fn check_rate_limits(&self) -> Option<RateLimitExhausted> {
        let state = self.github.rate_limit();
        if state.remaining < self.config.rate_limit_threshold {
            if let Some(reset) = state.reset {
                return Some(RateLimitExhausted {
                    reset_at: reset,
                    remaining: state.remaining,
                });
            }
        }
        None
    }

    async fn handle_rate_limit(&mut self, exhausted: RateLimitExhausted) {
        let now = Utc::now();
        if exhausted.reset_at <= now {
            info!("rate limit reset time has passed, continuing");
            return;
        }
        let sleep_until = exhausted.reset_at + ChronoDuration::seconds(10);
        let sleep_secs = (sleep_until - now).num_seconds().max(60) as u64;
        warn!(
            remaining = exhausted.remaining,
            reset = %exhausted.reset_at,
            sleep_secs,
            "rate limit low, sleeping until reset"
        );
        self.metrics.update_github_rate_limit(
            exhausted.remaining,
            self.github.rate_limit().limit,
            Some(exhausted.reset_at),
        );
        self.interruptible_sleep(Duration::from_secs(sleep_secs)).await;
        info!("resuming after rate limit sleep");
    }

    /// Sleep that returns within one poll interval of a shutdown request.
    async fn interruptible_sleep(&self, total: Duration) {
        let start = std::time::Instant::now();
        while start.elapsed() < total {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested during sleep");
                return;
            }
            let remaining = total - start.elapsed();
            tokio::time::sleep(remaining.min(SHUTDOWN_POLL)).await;
        }
    }

    async fn analyze(&mut self, package: &QueuedPackage) -> Result<()> {
        info!(package = %package.package_ref(), "analyzing");
        let metrics = Arc::clone(&self.metrics);
        metrics.start_package(&package.name);

        let Some(pipeline) = self.pipeline_for(package.ecosystem) else {
            anyhow::bail!("no adapter for ecosystem {}", package.ecosystem);
        };

        match pipeline.analyze_package(&package.name, true).await {
            Ok(analysis) => {
                match &analysis.scores {
                    Some(scores) => {
                        metrics.complete_package(
                            &package.name,
                            CompletionStatus::Scored,
                            Some(scores.overall),
                            Some(scores.grade.as_str()),
                            None,
                        );
                        info!(
                            package = %package.name,
                            score = scores.overall,
                            grade = scores.grade.as_str(),
                            "completed"
                        );
                    }
                    None => {
                        metrics.complete_package(
                            &package.name,
                            CompletionStatus::Unavailable,
                            None,
                            None,
                            analysis.unavailable_reason.as_deref(),
                        );
                        info!(
                            package = %package.name,
                            reason = analysis.unavailable_reason.as_deref().unwrap_or(""),
                            "completed (unavailable)"
                        );
                    }
                }
                Ok(())
            }
            Err(e) => {
                metrics.record_error(&package.name, "AnalysisError", &e.to_string());
                Err(e)
            }
        }
    }

    async fn handle_error(&mut self, package: &QueuedPackage, error: anyhow::Error) {
        self.consecutive_errors += 1;
        let backoff =
            (ERROR_BACKOFF_BASE * 2f64.powi(self.consecutive_errors as i32 - 1)).min(ERROR_BACKOFF_MAX);
        error!(
            package = %package.name,
            attempt = self.consecutive_errors,
            backoff_secs = backoff,
            "analysis failed: {error}"
        );
        self.metrics.complete_package(
            &package.name,
            CompletionStatus::Error,
            None,
            None,
            Some(&error.to_string()),
        );
        self.interruptible_sleep(Duration::from_secs_f64(backoff)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> DaemonConfig {
        DaemonConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn interruptible_sleep_returns_promptly_after_flag() {
        let dir = TempDir::new().unwrap();
        let daemon = ContinuousDaemon::new(config(&dir));
        let flag = daemon.shutdown_flag();

        let handle = tokio::spawn(async move {
            let start = std::time::Instant::now();
            daemon.interruptible_sleep(Duration::from_secs(120)).await;
            start.elapsed()
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.store(true, Ordering::SeqCst);
        let elapsed = handle.await.unwrap();
        assert!(elapsed < Duration::from_secs(11));
    }

    #[tokio::test]
    async fn passed_reset_time_does_not_sleep() {
        let dir = TempDir::new().unwrap();
        let mut daemon = ContinuousDaemon::new(config(&dir));
        let start = std::time::Instant::now();
        daemon
            .handle_rate_limit(RateLimitExhausted {
                reset_at: Utc::now() - ChronoDuration::seconds(5),
                remaining: 0,
            })
            .await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = ERROR_BACKOFF_BASE;
        let backoff = |attempt: u32| (base * 2f64.powi(attempt as i32 - 1)).min(ERROR_BACKOFF_MAX);
        assert_eq!(backoff(1), 5.0);
        assert_eq!(backoff(2), 10.0);
        assert_eq!(backoff(3), 20.0);
        assert_eq!(backoff(10), 300.0);
    }

    #[test]
    fn fresh_rate_limit_state_is_not_exhausted() {
        let dir = TempDir::new().unwrap();
        let daemon = ContinuousDaemon::new(config(&dir));
        // Default cached state reports a full budget and no reset time.
        assert!(daemon.check_rate_limits().is_none());
    }
}
