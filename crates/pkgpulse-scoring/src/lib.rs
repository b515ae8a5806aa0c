//! Weighted health/risk scoring
//!
//! Deterministic, component-wise scorer. Each category starts from a
//! baseline, applies additive adjustments, and is clamped into [0,100]
//! before weighting. The weighted mean is grade-banded, then the risk tier,
//! update urgency, confidence, and age band are classified.
//!
//! Weights: security 30, maintenance 25, community 15, bus factor 10,
//! documentation 10, stability 10.

mod profiles;
mod tiers;

pub use profiles::EcosystemProfile;

use chrono::{DateTime, Utc};
use pkgpulse_core::{
    AggregatorData, Ecosystem, Grade, LlmAssessments, PackageMetadata, RepoData, ScoreComponent,
    Scores, Severity, SupplyChainData,
};
use tracing::debug;

pub const WEIGHT_SECURITY: u32 = 30;
pub const WEIGHT_MAINTENANCE: u32 = 25;
pub const WEIGHT_COMMUNITY: u32 = 15;
pub const WEIGHT_BUS_FACTOR: u32 = 10;
pub const WEIGHT_DOCUMENTATION: u32 = 10;
pub const WEIGHT_STABILITY: u32 = 10;

/// Everything the scorer consumes. All evidence is optional; missing data
/// degrades to category baselines.
#[derive(Default)]
pub struct ScoringInputs<'a> {
    pub repo: Option<&'a RepoData>,
    pub llm: Option<&'a LlmAssessments>,
    pub install_count: Option<u64>,
    pub ecosystem: Option<Ecosystem>,
    pub metadata: Option<&'a PackageMetadata>,
    pub supply_chain: Option<&'a SupplyChainData>,
    pub aggregator: Option<&'a AggregatorData>,
}

pub struct Scorer {
    now: DateTime<Utc>,
}

impl Scorer {
    pub fn new() -> Self {
        Self { now: Utc::now() }
    }

    /// Fixed evaluation instant, for reproducible tests.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn calculate(&self, inputs: &ScoringInputs<'_>) -> Scores {
        let profile = EcosystemProfile::for_ecosystem(inputs.ecosystem);

        let security = self.security_score(inputs, &profile);
        let maintenance = self.maintenance_score(inputs, &profile);
        let community = self.community_score(inputs, &profile);
        let bus_factor = self.bus_factor_score(inputs);
        let documentation = self.documentation_score(inputs);
        let stability = self.stability_score(inputs);

        let overall = (security.score * security.weight as f64
            + maintenance.score * maintenance.weight as f64
            + community.score * community.weight as f64
            + bus_factor.score * bus_factor.weight as f64
            + documentation.score * documentation.weight as f64
            + stability.score * stability.weight as f64)
            / 100.0;

        // Supply-chain risk at or above the high band caps the overall score.
        let overall = match inputs.supply_chain {
            Some(supply) if supply.overall_risk_score >= 50 => {
                overall.min(100.0 - supply.overall_risk_score as f64)
            }
            _ => overall,
        };
        let overall = (overall.max(0.0) * 10.0).round() / 10.0;

        let risk_tier = tiers::classify_risk_tier(inputs, overall, security.score);
        let update_urgency = tiers::classify_update_urgency(inputs);
        let (confidence, confidence_factors) = tiers::classify_confidence(inputs, self.now);
        let project_age_band = tiers::classify_age_band(inputs, self.now);

        debug!(overall, ?risk_tier, ?update_urgency, "scored package");

        Scores {
            overall,
            grade: Grade::from_score(overall),
            percentile: None,
            risk_tier,
            update_urgency,
            confidence,
            confidence_factors,
            project_age_band,
            security,
            maintenance,
            community,
            bus_factor,
            documentation,
            stability,
        }
    }

    fn security_score(
        &self,
        inputs: &ScoringInputs<'_>,
        _profile: &EcosystemProfile,
    ) -> ScoreComponent {
        let mut score: f64 = if inputs.repo.is_some() { 100.0 } else { 50.0 };

        if let Some(repo) = inputs.repo {
            let sec = &repo.security;

            // Severity-weighted CVE penalty, capped at -60. Falls back to a
            // flat -10 per CVE when only a count is known.
            let cve_penalty = match &sec.cve_history {
                Some(history) => history
                    .cves
                    .iter()
                    .map(|c| match c.severity {
                        Severity::Critical => 20.0,
                        Severity::High => 15.0,
                        Severity::Medium => 8.0,
                        Severity::Low => 3.0,
                        Severity::Unknown => 10.0,
                    })
                    .sum::<f64>(),
                None => sec.known_cves as f64 * 10.0,
            };
            score -= cve_penalty.min(60.0);

            if let Some(history) = &sec.cve_history {
                if let Some(avg) = history.avg_days_to_patch {
                    if avg < 7.0 {
                        score += 10.0;
                    } else if avg < 30.0 {
                        score += 5.0;
                    } else if avg > 90.0 {
                        score -= 10.0;
                    }
                }
                if history.has_unpatched_older_than(30, self.now) {
                    score -= 15.0;
                }
            }

            let vulnerable_deps = (sec.vulnerable_deps as usize).max(
                inputs
                    .aggregator
                    .and_then(|a| a.dependency_graph.as_ref())
                    .map(|g| g.total_vulnerable())
                    .unwrap_or(0),
            );
            score -= (vulnerable_deps as f64 * 5.0).min(20.0);

            if !sec.has_security_md && !sec.has_security_policy {
                score -= 10.0;
            }

            match sec.security_tool_count() {
                0 => score -= 10.0,
                1 => {}
                2 => score += 5.0,
                _ => score += 10.0,
            }

            if sec.signed_commits_pct >= 80.0 {
                score += 10.0;
            } else if sec.signed_commits_pct >= 50.0 {
                score += 5.0;
            }

            let slsa_level = sec
                .slsa_level
                .max(inputs.aggregator.and_then(|a| a.slsa_level));
            score += match slsa_level {
                Some(1) => 5.0,
                Some(2) => 10.0,
                Some(3) | Some(4) => 15.0,
                _ => 0.0,
            };
            if sec.has_sigstore {
                score += 10.0;
            }
            if sec.has_sbom {
                score += 5.0;
            }
            if sec.has_reproducible_builds {
                score += 5.0;
            }
        }

        if let Some(supply) = inputs.supply_chain {
            score += supply_chain_adjustment(supply);
        }

        if let Some(llm_sec) = inputs.llm.and_then(|l| l.security.as_ref()) {
            score = score * 0.8 + (llm_sec.overall_score as f64 * 10.0) * 0.2;
            score -= (llm_sec.critical_findings.len() as f64 * 10.0).min(20.0);
        }

        ScoreComponent::new(score, WEIGHT_SECURITY)
    }

    fn maintenance_score(
        &self,
        inputs: &ScoringInputs<'_>,
        profile: &EcosystemProfile,
    ) -> ScoreComponent {
        let Some(repo) = inputs.repo else {
            return ScoreComponent::new(50.0, WEIGHT_MAINTENANCE);
        };

        let mut score: f64 = 100.0;

        if repo.repo.is_archived {
            score -= 40.0;
        }
        if repo.repo.is_deprecated {
            score -= 30.0;
        }

        // Commit recency contributes at most 70% of the category.
        if let Some(last) = repo.commits.last_commit_date {
            let days = (self.now - last).num_days().max(0) as f64;
            let recency = (-days / 180.0).exp();
            score *= 0.3 + 0.7 * recency;
        }

        match repo.commits.commits_last_6mo {
            0 => score -= 20.0,
            1..=9 => score += 5.0,
            _ => score += 8.0,
        }

        if let Some(response) = repo.issues.avg_response_time_hours {
            if response < profile.issue_response_fast_hours {
                score += 10.0;
            } else if response < 7.0 * 24.0 {
                score += 5.0;
            } else if response > 30.0 * 24.0 {
                score -= 10.0;
            }
        }
        if let Some(close) = repo.issues.avg_close_time_hours {
            if close < 30.0 * 24.0 {
                score += 5.0;
            }
        }

        let total_issues = repo.issues.open_issues + repo.issues.closed_issues_6mo;
        if total_issues > 0 {
            let close_rate = repo.issues.closed_issues_6mo as f64 / total_issues as f64;
            if close_rate < 0.3 {
                score -= 15.0;
            } else if close_rate > 0.7 {
                score += 5.0;
            }
        }

        score -= (repo.prs.stale_prs as f64 * 2.0).min(15.0);

        let (lo, hi) = profile.release_sweet_spot;
        let releases = repo.releases.releases_last_year;
        if releases >= lo as u64 && releases <= hi as u64 {
            score += 10.0;
        } else if releases >= 1 && releases < lo as u64 {
            score += 5.0;
        } else if releases == 0 {
            score -= if repo.commits.commits_last_6mo > 0 { 5.0 } else { 10.0 };
        }

        if let Some(maintenance) = inputs.llm.and_then(|l| l.maintenance.as_ref()) {
            let status_score = match maintenance.status.as_str() {
                "actively-maintained" => 100.0,
                "maintained" => 80.0,
                "minimal-maintenance" => 60.0,
                "stale" => 40.0,
                "abandoned" => 20.0,
                _ => 50.0,
            };
            score = score * 0.7 + status_score * 0.3;
        }

        ScoreComponent::new(score, WEIGHT_MAINTENANCE)
    }

    fn community_score(
        &self,
        inputs: &ScoringInputs<'_>,
        profile: &EcosystemProfile,
    ) -> ScoreComponent {
        let mut score: f64 = match (inputs.repo, forge_metrics(inputs)) {
            (Some(_), _) | (None, Some(_)) => 70.0,
            (None, None) => return ScoreComponent::new(50.0, WEIGHT_COMMUNITY),
        };

        if let Some(repo) = inputs.repo {
            if repo.repo.stars > 0 {
                if let Some(created) = repo.repo.created_at {
                    let age_years =
                        ((self.now - created).num_days().max(365) as f64 / 365.0).max(1.0);
                    let stars_per_year = repo.repo.stars as f64 / age_years;
                    if stars_per_year > 1000.0 {
                        score += 15.0;
                    } else if stars_per_year > 100.0 {
                        score += 10.0;
                    } else if stars_per_year > 10.0 {
                        score += 5.0;
                    }
                }
                let fork_ratio = repo.repo.forks as f64 / repo.repo.stars as f64;
                if fork_ratio > 0.1 {
                    score += 5.0;
                }
            }

            match repo.contributors.contributor_trend {
                pkgpulse_core::ContributorTrend::Growing => score += 10.0,
                pkgpulse_core::ContributorTrend::Declining => score -= 15.0,
                pkgpulse_core::ContributorTrend::Stable => {}
            }
            if repo.contributors.first_time_contributors_6mo >= 5 {
                score += 5.0;
            } else if repo.contributors.first_time_contributors_6mo >= 1 {
                score += 2.0;
            }

            if repo.issues.good_first_issue_count >= 5 {
                score += 5.0;
            } else if repo.issues.good_first_issue_count >= 1 {
                score += 2.0;
            }

            if repo.files.has_contributing {
                score += 5.0;
            }
            if repo.files.has_issue_templates {
                score += 3.0;
            }
            if repo.files.has_pr_template {
                score += 3.0;
            }
            if repo.files.has_code_of_conduct {
                score += 3.0;
            }
            if repo.repo.has_discussions {
                score += 5.0;
            }
        } else if let Some(metrics) = forge_metrics(inputs) {
            // Forge-level popularity when only aggregator metrics exist.
            let stars = metrics.stars.unwrap_or(0);
            if stars > 10_000 {
                score += 10.0;
            } else if stars > 1_000 {
                score += 5.0;
            }
            if let (Some(forks), Some(stars)) = (metrics.forks, metrics.stars) {
                if stars > 0 && forks as f64 / stars as f64 > 0.1 {
                    score += 5.0;
                }
            }
        }

        if let Some(installs) = inputs.install_count {
            if installs > profile.install_bonus_high {
                score += 10.0;
            } else if installs > profile.install_bonus_mid {
                score += 5.0;
            }
        }

        if let Some(sentiment) = inputs.llm.and_then(|l| l.sentiment.as_ref()) {
            score += match sentiment.sentiment.as_str() {
                "positive" => 10.0,
                "mixed" => -5.0,
                "negative" => -15.0,
                _ => 0.0,
            };
            if sentiment.frustration_level >= 7 {
                score -= 10.0;
            } else if sentiment.frustration_level >= 5 {
                score -= 5.0;
            }
        }

        ScoreComponent::new(score, WEIGHT_COMMUNITY)
    }

    fn bus_factor_score(&self, inputs: &ScoringInputs<'_>) -> ScoreComponent {
        let mut score: f64 = 50.0;

        if let Some(repo) = inputs.repo {
            let contributors = &repo.contributors;

            // Entropy is the primary distribution signal; the >=5%-share
            // count is the fallback.
            match contributors.contributor_entropy {
                Some(entropy) => score += (8.0 * entropy).min(25.0),
                None => match contributors.contributors_over_5pct {
                    n if n >= 3 => score += 25.0,
                    2 => score += 15.0,
                    1 => score -= 10.0,
                    _ => {}
                },
            }

            if contributors.top_contributor_pct > 90.0 {
                score -= 20.0;
            } else if contributors.top_contributor_pct > 75.0 {
                score -= 10.0;
            } else if contributors.top_contributor_pct < 50.0 && contributors.total_contributors > 0
            {
                score += 10.0;
            }

            match contributors.active_contributors_6mo {
                n if n >= 5 => score += 10.0,
                n if n >= 2 => score += 5.0,
                1 => score -= 10.0,
                _ => {}
            }

            match contributors.contributor_trend {
                pkgpulse_core::ContributorTrend::Growing => score += 5.0,
                pkgpulse_core::ContributorTrend::Declining => score -= 10.0,
                pkgpulse_core::ContributorTrend::Stable => {}
            }

            if repo.files.has_codeowners {
                score += 5.0;
            }
            if repo.files.has_governance {
                score += 5.0;
            }
        }

        if let Some(count) = inputs.metadata.and_then(|m| m.npm_maintainer_count) {
            match count {
                n if n >= 3 => score += 10.0,
                2 => score += 5.0,
                1 => score -= 5.0,
                _ => {}
            }
        }

        if let Some(gov) = inputs.llm.and_then(|l| l.governance.as_ref()) {
            if gov.has_succession_plan {
                score += 10.0;
            }
            if gov.indicates_multiple_maintainers {
                score += 5.0;
            }
            match gov.bus_factor_risk.as_str() {
                "high" => score -= 15.0,
                "low" => score += 10.0,
                _ => {}
            }
        }

        ScoreComponent::new(score, WEIGHT_BUS_FACTOR)
    }

    fn documentation_score(&self, inputs: &ScoringInputs<'_>) -> ScoreComponent {
        let Some(repo) = inputs.repo else {
            return ScoreComponent::new(50.0, WEIGHT_DOCUMENTATION);
        };

        let files = &repo.files;
        let mut score: f64 = 0.0;

        if files.has_readme {
            score += 10.0;
            if files.readme_size_bytes > 10_000 {
                score += 15.0;
            } else if files.readme_size_bytes > 2_000 {
                score += 10.0;
            } else if files.readme_size_bytes > 500 {
                score += 5.0;
            }
        }
        if files.has_docs_dir {
            score += 10.0;
        }
        if files.has_examples_dir {
            score += 10.0;
        }
        if files.has_changelog {
            score += 5.0;
        }

        match inputs.llm.and_then(|l| l.readme.as_ref()) {
            Some(readme) => {
                score += (readme.installation as f64 * 1.5).min(15.0);
                score += (readme.quick_start as f64 * 1.5).min(15.0);
                score += (readme.examples as f64 * 1.5).min(15.0);
                if let Some(changelog) = inputs.llm.and_then(|l| l.changelog.as_ref()) {
                    score += (changelog.overall_score as f64 * 1.5).min(15.0);
                }
            }
            None if files.has_readme => score += 30.0,
            None => {}
        }

        if inputs
            .metadata
            .and_then(|m| m.has_types)
            .unwrap_or(false)
        {
            score += 5.0;
        }

        ScoreComponent::new(score, WEIGHT_DOCUMENTATION)
    }

    fn stability_score(&self, inputs: &ScoringInputs<'_>) -> ScoreComponent {
        let Some(repo) = inputs.repo else {
            return ScoreComponent::new(50.0, WEIGHT_STABILITY);
        };

        let mut score: f64 = 60.0;

        let version = repo
            .releases
            .latest_version
            .as_deref()
            .or(inputs.metadata.map(|m| m.version.as_str()));
        if let Some(version) = version {
            let major = version
                .trim_start_matches('v')
                .split('.')
                .next()
                .and_then(|m| m.parse::<u64>().ok());
            if major.map(|m| m >= 1).unwrap_or(false) {
                score += 15.0;
            }
        }

        if repo.releases.prerelease_ratio > 0.5 {
            score -= 10.0;
        } else if repo.releases.prerelease_ratio < 0.1 {
            score += 5.0;
        }

        if repo.files.has_tests_dir {
            score += 5.0;
        }

        if !repo.ci.has_ci {
            score -= 5.0;
        } else {
            score += 5.0;
            if repo.ci.has_tests_workflow {
                score += 5.0;
            }
            if repo.ci.has_lint_workflow {
                score += 3.0;
            }
            if repo.ci.has_security_workflow {
                score += 5.0;
            }
            if repo.ci.has_release_workflow {
                score += 3.0;
            }
            if repo.ci.has_multi_platform {
                score += 5.0;
            }
            if let Some(pass_rate) = repo.ci.recent_runs_pass_rate {
                if pass_rate >= 95.0 {
                    score += 5.0;
                } else if pass_rate < 70.0 {
                    score -= 10.0;
                }
            }
        }

        if repo.issues.regression_issue_count > 5 {
            score -= 10.0;
        } else if repo.issues.regression_issue_count > 0 {
            score -= 5.0;
        }

        if let Some(changelog) = inputs.llm.and_then(|l| l.changelog.as_ref()) {
            if changelog.breaking_changes_marked {
                score += 5.0;
            }
            if changelog.has_migration_guides {
                score += 5.0;
            }
        }

        ScoreComponent::new(score, WEIGHT_STABILITY)
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

fn forge_metrics<'a>(
    inputs: &ScoringInputs<'a>,
) -> Option<&'a pkgpulse_core::BasicProjectMetrics> {
    inputs.aggregator.and_then(|a| a.project_metrics.as_ref())
}

/// Supply-chain penalty/bonus sum, floored at -80 however many penalties
/// trigger.
fn supply_chain_adjustment(supply: &SupplyChainData) -> f64 {
    let scripts = &supply.lifecycle_scripts;
    let mut adjustment: f64 = 0.0;

    if scripts.installs_runtime {
        adjustment -= 50.0;
    }
    if scripts.has_credential_access {
        adjustment -= 40.0;
    }
    if scripts.has_obfuscation {
        adjustment -= 30.0;
    }
    if scripts.has_network_calls {
        adjustment -= if scripts.has_preinstall { 25.0 } else { 15.0 };
    }
    if scripts.has_process_spawn && scripts.has_preinstall {
        adjustment -= 20.0;
    }
    if scripts.has_preinstall {
        adjustment -= 10.0;
    } else if scripts.has_postinstall {
        adjustment -= 5.0;
    }
    if scripts.has_credential_access && scripts.has_network_calls {
        adjustment -= 20.0;
    }

    if let Some(tarball) = &supply.tarball {
        adjustment -= (tarball.suspicious_files.len() as f64 * 20.0).min(40.0);
        if tarball.files_not_in_repo.len() > 5 {
            adjustment -= 15.0;
        }
    }

    if let Some(diff) = &supply.version_diff {
        if diff.version_jump_suspicious {
            adjustment -= 15.0;
        }
        for script in &diff.scripts_added {
            match script.as_str() {
                "preinstall" | "install" => adjustment -= 20.0,
                "postinstall" => adjustment -= 10.0,
                _ => {}
            }
        }
    }

    if !supply.publishing.publisher_is_listed_maintainer {
        adjustment -= 15.0;
    }
    if supply.publishing.provenance_verified {
        adjustment += 10.0;
    } else if supply.publishing.has_provenance {
        adjustment += 5.0;
    }

    let no_lifecycle_scripts = !scripts.has_preinstall
        && !scripts.has_install
        && !scripts.has_postinstall
        && !scripts.has_preuninstall
        && !scripts.has_postuninstall
        && !scripts.has_prepare
        && !scripts.has_prepublish;
    if no_lifecycle_scripts {
        adjustment += 5.0;
    }

    adjustment.max(-80.0)
}

#[cfg(test)]
mod tests;
