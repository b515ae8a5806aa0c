//! Subcommand implementations.

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use pkgpulse_adapters::{adapter_for, parse_repo_url};
use pkgpulse_core::{Ecosystem, Platform};
use pkgpulse_github::GitHubFetcher;
use pkgpulse_llm::{LlmClient, LlmMode, LlmOrchestrator};
use pkgpulse_pipeline::{
    AnalysisPipeline, CompletionStatus, ContinuousDaemon, DaemonConfig, MetricsCollector,
};
use std::path::Path;
use std::sync::Arc;

fn resolve_ecosystem(name: &str) -> Result<Ecosystem> {
    Ecosystem::parse(name).ok_or_else(|| {
        anyhow!("unsupported ecosystem '{name}' (supported: npm, pypi, homebrew)")
    })
}

fn github_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty())
}

fn llm_models() -> (String, String) {
    let model =
        std::env::var("PKGPULSE_LLM_MODEL").unwrap_or_else(|_| "llama3.3:70b".to_string());
    let fast =
        std::env::var("PKGPULSE_LLM_FAST_MODEL").unwrap_or_else(|_| "llama3.1:8b".to_string());
    (model, fast)
}

pub async fn list_packages(ecosystem: &str, limit: usize) -> Result<()> {
    let ecosystem = resolve_ecosystem(ecosystem)?;
    let adapter =
        adapter_for(ecosystem).ok_or_else(|| anyhow!("no adapter for {ecosystem}"))?;

    let names = adapter.list_packages(Some(limit)).await?;
    println!(
        "{}",
        format!("Top {} {} packages", names.len(), ecosystem).bold()
    );
    for (i, name) in names.iter().enumerate() {
        let stats = adapter.get_install_stats(name).await.unwrap_or(None);
        let installs = stats
            .and_then(|s| s.downloads_last_30d)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:>4}  {:<40} {:>14}", i + 1, name, installs);
    }
    Ok(())
}

pub async fn fetch_package(package: &str, ecosystem: &str, with_github: bool) -> Result<()> {
    let ecosystem = resolve_ecosystem(ecosystem)?;
    let adapter =
        adapter_for(ecosystem).ok_or_else(|| anyhow!("no adapter for {ecosystem}"))?;

    let metadata = adapter
        .get_metadata(package)
        .await
        .context("metadata fetch failed")?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    if with_github {
        let repo = adapter
            .get_source_repo(&metadata)
            .or_else(|| metadata.repository_url.as_deref().and_then(parse_repo_url));
        match repo {
            Some(repo) if repo.platform == Platform::Github => {
                let fetcher = GitHubFetcher::new(github_token());
                match fetcher.fetch_repo_data(&repo).await? {
                    Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                    None => println!("{}", "repository not accessible".yellow()),
                }
            }
            Some(repo) => println!("repository is on {}, skipping", repo.platform.as_str()),
            None => println!("{}", "no source repository found".yellow()),
        }
    }
    Ok(())
}

fn build_pipeline(
    ecosystem: Ecosystem,
    data_dir: &Path,
    skip_llm: bool,
    metrics: Arc<MetricsCollector>,
) -> Result<AnalysisPipeline> {
    let adapter =
        adapter_for(ecosystem).ok_or_else(|| anyhow!("no adapter for {ecosystem}"))?;
    let github = Arc::new(GitHubFetcher::new(github_token()));
    let llm = if skip_llm {
        None
    } else {
        let (model, fast) = llm_models();
        Some(LlmOrchestrator::new(
            LlmClient::new(model, fast),
            LlmMode::Parallel,
        ))
    };
    Ok(AnalysisPipeline::new(adapter, github, llm, data_dir, metrics))
}

pub async fn analyze_package(
    package: &str,
    ecosystem: &str,
    data_dir: &Path,
    skip_llm: bool,
) -> Result<()> {
    let ecosystem = resolve_ecosystem(ecosystem)?;
    let metrics = Arc::new(MetricsCollector::new(data_dir.join(".metrics.json")));
    let pipeline = build_pipeline(ecosystem, data_dir, skip_llm, metrics)?;

    // Package-not-found bubbles to a user-visible failure for
    // single-package runs; batch mode records and continues instead.
    let analysis = pipeline.analyze_package(package, true).await?;

    println!(
        "{} {}/{} v{}",
        "Analyzed".green().bold(),
        analysis.ecosystem,
        analysis.name,
        analysis.version
    );
    match &analysis.scores {
        Some(scores) => {
            println!(
                "  overall {:.1} ({})  tier: {:?}  urgency: {:?}",
                scores.overall,
                scores.grade.as_str(),
                scores.risk_tier,
                scores.update_urgency
            );
            println!(
                "  security {:.0}  maintenance {:.0}  community {:.0}  bus-factor {:.0}  docs {:.0}  stability {:.0}",
                scores.security.score,
                scores.maintenance.score,
                scores.community.score,
                scores.bus_factor.score,
                scores.documentation.score,
                scores.stability.score
            );
        }
        None => println!(
            "  {} {}",
            "not scored:".yellow(),
            analysis.unavailable_reason.as_deref().unwrap_or("unknown")
        ),
    }
    if let Some(summary) = &analysis.analysis_summary {
        for concern in &summary.concerns {
            println!("  {} {}", "!".red().bold(), concern);
        }
        for highlight in &summary.highlights {
            println!("  {} {}", "+".green(), highlight);
        }
    }
    Ok(())
}

pub async fn analyze_batch(
    ecosystem: &str,
    limit: usize,
    data_dir: &Path,
    skip_llm: bool,
) -> Result<()> {
    let ecosystem = resolve_ecosystem(ecosystem)?;
    let metrics = Arc::new(MetricsCollector::new(data_dir.join(".metrics.json")));
    let pipeline = build_pipeline(ecosystem, data_dir, skip_llm, Arc::clone(&metrics))?;
    let adapter =
        adapter_for(ecosystem).ok_or_else(|| anyhow!("no adapter for {ecosystem}"))?;

    let names = adapter.list_packages(Some(limit)).await?;
    metrics.start_batch(names.len() as u64, ecosystem.as_str());

    let total = names.len();
    let mut failures = 0usize;
    for (i, name) in names.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, total, name);
        metrics.start_package(name);
        match pipeline.analyze_package(name, true).await {
            Ok(analysis) => match &analysis.scores {
                Some(scores) => {
                    metrics.complete_package(
                        name,
                        CompletionStatus::Scored,
                        Some(scores.overall),
                        Some(scores.grade.as_str()),
                        None,
                    );
                    println!(
                        "   {} {:.1} ({})",
                        "scored".green(),
                        scores.overall,
                        scores.grade.as_str()
                    );
                }
                None => {
                    metrics.complete_package(
                        name,
                        CompletionStatus::Unavailable,
                        None,
                        None,
                        analysis.unavailable_reason.as_deref(),
                    );
                    println!(
                        "   {} {}",
                        "unavailable".yellow(),
                        analysis.unavailable_reason.as_deref().unwrap_or("")
                    );
                }
            },
            Err(e) => {
                // Batch mode records and continues.
                failures += 1;
                metrics.record_error(name, "AnalysisError", &e.to_string());
                metrics.complete_package(
                    name,
                    CompletionStatus::Error,
                    None,
                    None,
                    Some(&e.to_string()),
                );
                println!("   {} {e:#}", "failed".red());
            }
        }
    }
    metrics.set_running(false);

    if failures == total && total > 0 {
        bail!("all {total} analyses failed");
    }
    Ok(())
}

pub fn monitor(data_dir: &Path) -> Result<()> {
    let metrics = MetricsCollector::new(data_dir.join(".metrics.json"));
    let snapshot = metrics.load();

    let state = if snapshot.is_running {
        "running".green().bold()
    } else {
        "idle".yellow().bold()
    };
    println!("pipeline: {state}");
    if !snapshot.current_package.is_empty() {
        println!("current:  {}", snapshot.current_package);
    }
    println!(
        "progress: {}/{} (session '{}')",
        snapshot.completed_packages, snapshot.total_packages, snapshot.ecosystem
    );
    println!(
        "results:  {} scored, {} unavailable, {} errors",
        snapshot.scored_count, snapshot.unavailable_count, snapshot.error_count
    );
    if let Some(avg) = snapshot.average_score() {
        println!("average:  {avg:.1}");
    }
    let grades = &snapshot.grade_distribution;
    println!(
        "grades:   A:{} B:{} C:{} D:{} F:{}",
        grades.get("A").unwrap_or(&0),
        grades.get("B").unwrap_or(&0),
        grades.get("C").unwrap_or(&0),
        grades.get("D").unwrap_or(&0),
        grades.get("F").unwrap_or(&0)
    );
    println!(
        "github:   {}/{} remaining",
        snapshot.github_rate_limit_remaining, snapshot.github_rate_limit_total
    );
    println!(
        "llm:      {}",
        if snapshot.llm_available {
            snapshot.llm_model.clone()
        } else {
            "unavailable".to_string()
        }
    );
    println!("osv:      {}", snapshot.osv_status);

    if !snapshot.stage_timings.is_empty() {
        println!("stage averages (s):");
        for (stage, avg) in &snapshot.stage_timings {
            println!(
                "  {:<12} {:>8.3}  ({} runs)",
                stage,
                avg,
                snapshot.stage_counts.get(stage).unwrap_or(&0)
            );
        }
    }
    if !snapshot.recent_errors.is_empty() {
        println!("recent errors:");
        for error in snapshot.recent_errors.iter().rev().take(5) {
            println!(
                "  {} {} {}: {}",
                error.timestamp.format("%H:%M:%S"),
                error.package.red(),
                error.error_type,
                error.message
            );
        }
    }
    for entry in snapshot.activity_log.iter().rev().take(10) {
        let label = match entry.status.as_str() {
            "scored" => entry.status.green(),
            "unavailable" => entry.status.yellow(),
            _ => entry.status.red(),
        };
        let detail = entry
            .score
            .map(|s| format!("{s:.1} ({})", entry.grade.as_deref().unwrap_or("-")))
            .or_else(|| entry.message.clone())
            .unwrap_or_default();
        println!(
            "  {} {:<30} {label} {detail}",
            entry.timestamp.format("%H:%M:%S"),
            entry.package
        );
    }
    Ok(())
}

pub async fn run_daemon(
    data_dir: &Path,
    with_llm: bool,
    parallel_llm: bool,
    stale_days: i64,
    no_publish: bool,
    publish_interval: u64,
) -> Result<()> {
    let (model, fast) = llm_models();
    let config = DaemonConfig {
        data_dir: data_dir.to_path_buf(),
        github_token: github_token(),
        skip_llm: !with_llm,
        llm_model: model,
        llm_fast_model: fast,
        parallel_llm,
        stale_threshold_days: stale_days,
        no_publish,
        publish_interval,
        ..Default::default()
    };
    let mut daemon = ContinuousDaemon::new(config);
    daemon.run().await
}
