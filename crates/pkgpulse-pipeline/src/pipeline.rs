//! Per-package analysis orchestration.
//!
//! Stages, in order: metadata, availability classification, repository
//! facts, CVE history, supply chain (npm only), aggregator intelligence,
//! LLM assessments, scoring, summary, persistence. Every stage wraps its
//! timing into the metrics collector; no stage failure except metadata and
//! persistence aborts the package.

use crate::metrics::MetricsCollector;
use anyhow::{Context, Result};
use chrono::Utc;
use pkgpulse_adapters::{NpmAdapter, RegistryAdapter};
use pkgpulse_core::{
    AnalysisSummary, DataAvailability, Ecosystem, LlmAssessments, PackageAnalysis, Platform,
    RepoRef, Scores, ScoringOutcome, SupplyChainData,
};
use pkgpulse_depsdev::DepsDevClient;
use pkgpulse_github::GitHubFetcher;
use pkgpulse_llm::LlmOrchestrator;
use pkgpulse_scoring::{Scorer, ScoringInputs};
use pkgpulse_threats::{ManifestInfo, SupplyChainAnalyzer, SupplyChainInputs};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AnalysisPipeline {
    adapter: Box<dyn RegistryAdapter>,
    /// npm-specific registry reads for the supply-chain stage.
    npm_supply: Option<NpmAdapter>,
    github: Arc<GitHubFetcher>,
    osv: pkgpulse_advisories::OsvFetcher,
    depsdev: DepsDevClient,
    supply_chain: SupplyChainAnalyzer,
    llm: Option<LlmOrchestrator>,
    scorer: Scorer,
    data_dir: PathBuf,
    metrics: Arc<MetricsCollector>,
}

impl AnalysisPipeline {
    pub fn new(
        adapter: Box<dyn RegistryAdapter>,
        github: Arc<GitHubFetcher>,
        llm: Option<LlmOrchestrator>,
        data_dir: impl Into<PathBuf>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let npm_supply = match adapter.ecosystem() {
            Ecosystem::Npm => Some(NpmAdapter::new()),
            _ => None,
        };
        Self {
            adapter,
            npm_supply,
            github,
            osv: pkgpulse_advisories::OsvFetcher::new(),
            depsdev: DepsDevClient::new(),
            supply_chain: SupplyChainAnalyzer::new(),
            llm,
            scorer: Scorer::new(),
            data_dir: data_dir.into(),
            metrics,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.adapter.ecosystem()
    }

    pub fn github(&self) -> &GitHubFetcher {
        &self.github
    }

    /// Run the full analysis for one package and persist the artifact.
    pub async fn analyze_package(&self, package_name: &str, save: bool) -> Result<PackageAnalysis> {
        let ecosystem = self.adapter.ecosystem();
        info!(package = package_name, ecosystem = %ecosystem, "analyzing");

        // Stage 1: registry metadata. The only stage whose failure aborts
        // the package.
        let (metadata, install_stats, repo_ref) = {
            let _timer = self.metrics.stage_timer("metadata");
            let metadata = self.adapter.get_metadata(package_name).await?;
            let install_stats = self
                .adapter
                .get_install_stats(package_name)
                .await
                .unwrap_or_default();
            let repo_ref = self.adapter.get_source_repo(&metadata);
            (metadata, install_stats, repo_ref)
        };
        let install_count = install_stats.as_ref().and_then(|s| s.downloads_last_30d);

        // Stage 2: availability classification.
        let (mut availability, mut unavailable_reason) = match &repo_ref {
            None => (
                DataAvailability::NoRepo,
                Some("No source repository URL found in package metadata".to_string()),
            ),
            Some(r) if r.platform != Platform::Github => (
                DataAvailability::NotGithub,
                Some(format!(
                    "Repository is on {}, not GitHub. Limited analysis available.",
                    r.platform.as_str()
                )),
            ),
            Some(_) => (DataAvailability::Available, None),
        };

        // Stage 3: repository facts.
        let mut repo_data = None;
        if let (DataAvailability::Available, Some(repo)) = (availability, &repo_ref) {
            let _timer = self.metrics.stage_timer("github");
            match self.github.fetch_repo_data(repo).await {
                Ok(Some(data)) => repo_data = Some(data),
                Ok(None) => {
                    availability = DataAvailability::RepoNotFound;
                    unavailable_reason = Some(format!(
                        "Repository {}/{} not accessible (may be private, deleted, or renamed)",
                        repo.owner, repo.repo
                    ));
                }
                Err(e) => {
                    warn!(package = package_name, "repository fetch failed: {e}");
                    availability = DataAvailability::RepoNotFound;
                    unavailable_reason = Some(format!("Repository fetch failed: {e}"));
                }
            }
        }

        // Stage 4: CVE history, attached to the security facts. The
        // release-date tag map feeds patch timing.
        if availability == DataAvailability::Available || repo_ref.is_some() {
            let _timer = self.metrics.stage_timer("cve");
            let release_dates = match (&repo_ref, &repo_data) {
                (Some(repo), Some(_)) => self
                    .github
                    .fetch_release_dates(&repo.owner, &repo.repo)
                    .await
                    .ok(),
                _ => None,
            };
            let repo_pair = repo_ref
                .as_ref()
                .filter(|r| r.platform == Platform::Github)
                .map(|r| (r.owner.as_str(), r.repo.as_str()));
            match self
                .osv
                .fetch_cve_history(
                    package_name,
                    ecosystem,
                    repo_pair,
                    release_dates.as_ref(),
                )
                .await
            {
                Ok(history) => {
                    self.metrics.update_osv_status("ok");
                    if let Some(ref mut data) = repo_data {
                        data.security.known_cves = history.total_cves as u32;
                        data.security.cve_history = Some(history);
                    }
                }
                Err(e) => {
                    self.metrics.update_osv_status("error");
                    warn!(package = package_name, "CVE fetch failed: {e}");
                }
            }
        }

        // Stage 5: supply chain (npm only).
        let supply_chain = if let Some(npm) = &self.npm_supply {
            let _timer = self.metrics.stage_timer("supply_chain");
            Some(self.run_supply_chain(npm, package_name, &repo_ref, &repo_data).await)
        } else {
            None
        };

        // Stage 6: aggregator intelligence. Project-level data for a
        // non-GitHub forge promotes availability to partial-forge.
        let aggregator_data = {
            let _timer = self.metrics.stage_timer("aggregator");
            let data = pkgpulse_depsdev::fetch_all_intelligence(
                &self.depsdev,
                package_name,
                &metadata.version,
                ecosystem,
                repo_ref.as_ref(),
            )
            .await;
            if availability == DataAvailability::NotGithub && data.has_project_data() {
                availability = DataAvailability::PartialForge;
                unavailable_reason = Some(format!(
                    "Repository is on {}; scored from aggregator data.",
                    repo_ref
                        .as_ref()
                        .map(|r| r.platform.as_str())
                        .unwrap_or("another forge")
                ));
            }
            Some(data)
        };

        // Stage 7: qualitative assessments.
        let mut llm_assessments: Option<LlmAssessments> = None;
        if let (Some(orchestrator), Some(data)) = (&self.llm, &repo_data) {
            let _timer = self.metrics.stage_timer("llm");
            if orchestrator.client.is_available().await {
                self.metrics
                    .update_llm_status(true, &orchestrator.client.model);
                let assessments = orchestrator
                    .run(&self.github, data, package_name, ecosystem.as_str())
                    .await;
                if !assessments.is_empty() {
                    llm_assessments = Some(assessments);
                }
            } else {
                self.metrics.update_llm_status(false, "");
                debug!("LLM endpoint unavailable, skipping assessments");
            }
        }

        // Stage 8: scoring.
        let outcome = {
            let _timer = self.metrics.stage_timer("scoring");
            if availability.scoreable() {
                ScoringOutcome::Scored(self.scorer.calculate(&ScoringInputs {
                    repo: repo_data.as_ref(),
                    llm: llm_assessments.as_ref(),
                    install_count,
                    ecosystem: Some(ecosystem),
                    metadata: Some(&metadata),
                    supply_chain: supply_chain.as_ref(),
                    aggregator: aggregator_data.as_ref(),
                }))
            } else {
                ScoringOutcome::Unscored {
                    reason: unavailable_reason
                        .clone()
                        .unwrap_or_else(|| "data unavailable".to_string()),
                }
            }
        };

        // Stage 9: summary.
        let analysis_summary = build_summary(
            &repo_data,
            &llm_assessments,
            &supply_chain,
            &aggregator_data,
            outcome.scores(),
            availability,
        );

        let analysis = PackageAnalysis {
            ecosystem,
            name: package_name.to_string(),
            description: metadata.description.clone(),
            version: metadata.version.clone(),
            homepage: metadata.homepage.clone(),
            repository: repo_ref,
            install_count_30d: install_count,
            data_availability: availability,
            unavailable_reason,
            scores: match outcome {
                ScoringOutcome::Scored(scores) => Some(scores),
                ScoringOutcome::Unscored { .. } => None,
            },
            github_data: repo_data,
            llm_assessments,
            supply_chain,
            aggregator_data,
            analysis_summary: Some(analysis_summary),
            analyzed_at: Utc::now(),
            data_fetched_at: Some(Utc::now()),
        };

        // Stage 10: persistence. Failures here propagate.
        if save {
            let _timer = self.metrics.stage_timer("save");
            self.save_analysis(&analysis)?;
        }

        let rate = self.github.rate_limit();
        self.metrics
            .update_github_rate_limit(rate.remaining, rate.limit, rate.reset);

        Ok(analysis)
    }

    async fn run_supply_chain(
        &self,
        npm: &NpmAdapter,
        package_name: &str,
        repo_ref: &Option<RepoRef>,
        repo_data: &Option<pkgpulse_core::RepoData>,
    ) -> SupplyChainData {
        let info = match npm.get_supply_info(package_name).await {
            Ok(info) => info,
            Err(e) => {
                warn!(package = package_name, "supply-chain inputs unavailable: {e}");
                return SupplyChainData::default();
            }
        };

        let repo_paths = match (repo_ref, repo_data) {
            (Some(repo), Some(data)) if repo.platform == Platform::Github => self
                .github
                .fetch_tree_paths(&repo.owner, &repo.repo, &data.repo.default_branch)
                .await
                .ok(),
            _ => None,
        };

        let publisher = info.current.publisher.clone();
        let inputs = SupplyChainInputs {
            current: ManifestInfo {
                version: info.current.version.clone(),
                scripts: info.current.scripts.clone(),
                dependencies: info.current.dependencies.clone(),
            },
            previous: info.previous.as_ref().map(|p| ManifestInfo {
                version: p.version.clone(),
                scripts: p.scripts.clone(),
                dependencies: p.dependencies.clone(),
            }),
            tarball_url: info.current.tarball_url.clone(),
            maintainers: info.maintainers.clone(),
            publisher,
            has_provenance: info.current.has_provenance,
            provenance_verified: info.current.provenance_verified,
            repo_paths,
        };
        self.supply_chain.analyze(&inputs).await
    }

    /// Atomic overwrite: write a temp file beside the target, then rename.
    fn save_analysis(&self, analysis: &PackageAnalysis) -> Result<PathBuf> {
        let path = crate::queue::WorkQueue::analysis_path(
            &self.data_dir,
            analysis.ecosystem,
            &analysis.name,
        );
        let parent = path
            .parent()
            .context("analysis path has no parent directory")?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;

        let content = serde_json::to_string_pretty(analysis)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("renaming into {}", path.display()))?;
        debug!(path = %path.display(), "persisted analysis");
        Ok(path)
    }
}

/// Human-readable highlights and concerns. Supply-chain critical findings
/// are prepended so they lead the concern list.
fn build_summary(
    repo_data: &Option<pkgpulse_core::RepoData>,
    llm: &Option<LlmAssessments>,
    supply_chain: &Option<SupplyChainData>,
    aggregator: &Option<pkgpulse_core::AggregatorData>,
    scores: Option<&Scores>,
    availability: DataAvailability,
) -> AnalysisSummary {
    let mut summary = AnalysisSummary {
        maintenance_status: "unknown".to_string(),
        ..Default::default()
    };

    if let Some(llm) = llm {
        if let Some(maintenance) = &llm.maintenance {
            summary.maintenance_status = maintenance.status.clone();
            summary.concerns.extend(maintenance.concerns.clone());
            summary
                .highlights
                .extend(maintenance.positive_signals.clone());
        }
        if let Some(readme) = &llm.readme {
            summary.doc_summary = readme.summary.clone();
            if let Some(issue) = &readme.top_issue {
                summary.concerns.push(format!("Docs: {issue}"));
            }
        }
        if let Some(sentiment) = &llm.sentiment {
            summary.community_sentiment = Some(sentiment.sentiment.clone());
            if sentiment.abandonment_signals {
                summary
                    .concerns
                    .push("Possible abandonment signals detected".to_string());
            }
        }
    }

    if let Some(data) = repo_data {
        let mut security_items = Vec::new();
        if data.security.known_cves > 0 {
            security_items.push(format!("{} known CVEs", data.security.known_cves));
        }
        if data.security.has_security_md {
            security_items.push("has SECURITY.md".to_string());
        }
        if data.security.has_dependabot {
            security_items.push("Dependabot enabled".to_string());
        }
        summary.security_summary = if security_items.is_empty() {
            "No issues".to_string()
        } else {
            security_items.join(", ")
        };

        if data.contributors.top_contributor_pct > 80.0 {
            summary.concerns.push(format!(
                "High bus factor risk ({:.0}% from top contributor)",
                data.contributors.top_contributor_pct
            ));
        }
        if data.commits.commits_last_6mo > 20 {
            summary.highlights.push("Actively maintained".to_string());
        }
        if data.ci.has_ci {
            summary.highlights.push("CI/CD configured".to_string());
        }
        if data.repo.is_deprecated {
            summary
                .concerns
                .push("Project is marked deprecated".to_string());
        }
    }

    if availability == DataAvailability::PartialForge {
        if let Some(metrics) = aggregator.as_ref().and_then(|a| a.project_metrics.as_ref()) {
            summary.forge_metrics = Some(format!(
                "forge_metrics: stars={}, forks={}, open_issues={}",
                metrics.stars.unwrap_or(0),
                metrics.forks.unwrap_or(0),
                metrics.open_issues.unwrap_or(0)
            ));
        }
    }

    if let Some(scorecard) = aggregator.as_ref().and_then(|a| a.scorecard.as_ref()) {
        summary
            .highlights
            .push(format!("OpenSSF Scorecard {:.1}/10", scorecard.overall_score));
    }

    if let Some(scores) = scores {
        if scores.overall >= 85.0 {
            summary
                .highlights
                .push(format!("Overall health {:.1} ({})", scores.overall, scores.grade.as_str()));
        }
    }

    if let Some(supply) = supply_chain {
        for finding in supply.critical_findings.iter().rev() {
            summary
                .concerns
                .insert(0, format!("SUPPLY CHAIN: {finding}"));
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgpulse_core::{LifecycleScriptRisk, RiskLevel};

    #[test]
    fn supply_chain_findings_lead_the_concerns() {
        let mut repo = pkgpulse_core::RepoData::default();
        repo.contributors.top_contributor_pct = 95.0;
        let supply = SupplyChainData {
            lifecycle_scripts: LifecycleScriptRisk::default(),
            critical_findings: vec![
                "Remote script piped directly into a shell (preinstall)".to_string(),
                "Known malicious filename: setup_bun.js".to_string(),
            ],
            risk_level: RiskLevel::Critical,
            overall_risk_score: 100,
            ..Default::default()
        };
        let summary = build_summary(
            &Some(repo),
            &None,
            &Some(supply),
            &None,
            None,
            DataAvailability::Available,
        );
        assert!(summary.concerns[0].starts_with("SUPPLY CHAIN:"));
        assert!(summary.concerns[1].starts_with("SUPPLY CHAIN:"));
        assert!(summary
            .concerns
            .iter()
            .any(|c| c.contains("bus factor risk")));
    }

    #[test]
    fn partial_forge_summary_carries_forge_metrics() {
        let aggregator = pkgpulse_core::AggregatorData {
            project_metrics: Some(pkgpulse_core::BasicProjectMetrics {
                stars: Some(500),
                forks: Some(30),
                ..Default::default()
            }),
            ..Default::default()
        };
        let summary = build_summary(
            &None,
            &None,
            &None,
            &Some(aggregator),
            None,
            DataAvailability::PartialForge,
        );
        assert!(summary.forge_metrics.unwrap().contains("stars=500"));
    }
}
