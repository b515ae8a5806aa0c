use super::*;
use chrono::{Duration, TimeZone};
use pkgpulse_core::{
    CveDetail, CveHistory, LifecycleScriptRisk, PublishingInfo, RiskLevel, RiskTier,
    SupplyChainData, TarballAnalysis, UpdateUrgency, VersionDiff,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn cve(severity: Severity, fixed: Option<&str>, days_ago: i64) -> CveDetail {
    CveDetail {
        id: format!("CVE-TEST-{severity:?}-{days_ago}"),
        summary: String::new(),
        severity,
        cvss_score: None,
        published_at: now() - Duration::days(days_ago),
        fixed_version: fixed.map(String::from),
        patch_release_at: None,
        days_to_patch: None,
        references: vec![],
    }
}

/// A healthy, active repository resembling a popular well-run project.
fn healthy_repo() -> RepoData {
    let mut repo = RepoData::default();
    repo.repo.owner = "o".into();
    repo.repo.name = "r".into();
    repo.repo.stars = 10_000;
    repo.repo.forks = 800;
    repo.repo.created_at = Some(now() - Duration::days(4 * 365));
    repo.repo.pushed_at = Some(now() - Duration::days(2));
    repo.commits.last_commit_date = Some(now() - Duration::days(2));
    repo.commits.commits_last_6mo = 40;
    repo.commits.commits_last_year = 90;
    repo.contributors.total_contributors = 25;
    repo.contributors.active_contributors_6mo = 5;
    repo.contributors.contributors_over_5pct = 4;
    repo.contributors.top_contributor_pct = 35.0;
    repo.contributors.contributor_entropy = Some(2.3);
    repo.issues.open_issues = 10;
    repo.issues.closed_issues_6mo = 30;
    repo.releases.releases_last_year = 20;
    repo.releases.latest_version = Some("v2.1.0".into());
    repo.releases.prerelease_ratio = 0.05;
    repo.security.has_security_md = true;
    repo.security.has_dependabot = true;
    repo.security.has_codeql = true;
    repo.security.has_security_ci = true;
    repo.files.has_readme = true;
    repo.files.readme_size_bytes = 6_000;
    repo.files.has_docs_dir = true;
    repo.files.has_examples_dir = true;
    repo.files.has_tests_dir = true;
    repo.files.has_changelog = true;
    repo.ci.has_ci = true;
    repo.ci.workflow_count = 3;
    repo.ci.has_tests_workflow = true;
    repo.ci.has_lint_workflow = true;
    repo.ci.has_security_workflow = true;
    repo.ci.has_multi_platform = true;
    repo
}

fn clean_supply() -> SupplyChainData {
    SupplyChainData::default()
}

#[test]
fn component_weights_sum_to_100() {
    let scorer = Scorer::at(now());
    let scores = scorer.calculate(&ScoringInputs::default());
    assert_eq!(scores.weight_sum(), 100);
}

#[test]
fn overall_stays_in_range_and_grade_matches_band() {
    let scorer = Scorer::at(now());
    let repo = healthy_repo();
    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ecosystem: Some(Ecosystem::Npm),
        ..Default::default()
    });
    assert!((0.0..=100.0).contains(&scores.overall));
    assert_eq!(scores.grade, Grade::from_score(scores.overall));
}

#[test]
fn ten_critical_cves_cap_at_minus_60() {
    let scorer = Scorer::at(now());

    let mut repo = RepoData::default();
    repo.security.has_security_md = true;
    repo.security.has_dependabot = true; // one tool: neutral
    let baseline = scorer
        .calculate(&ScoringInputs {
            repo: Some(&repo),
            ..Default::default()
        })
        .security
        .score;

    let mut vulnerable = repo.clone();
    vulnerable.security.cve_history = Some(CveHistory::from_details(
        (0..10)
            .map(|i| cve(Severity::Critical, Some("9.9.9"), 10 + i))
            .collect(),
    ));
    let penalized = scorer
        .calculate(&ScoringInputs {
            repo: Some(&vulnerable),
            ..Default::default()
        })
        .security
        .score;

    assert_eq!(baseline - penalized, 60.0);
}

#[test]
fn supply_chain_penalty_floors_at_minus_80() {
    let supply = SupplyChainData {
        lifecycle_scripts: LifecycleScriptRisk {
            has_preinstall: true,
            has_postinstall: true,
            has_network_calls: true,
            has_credential_access: true,
            has_obfuscation: true,
            has_process_spawn: true,
            installs_runtime: true,
            ..Default::default()
        },
        tarball: Some(TarballAnalysis {
            suspicious_files: vec!["setup_bun.js".into(), "bun_environment.js".into(), "x.js".into()],
            files_not_in_repo: (0..10).map(|i| format!("f{i}.js")).collect(),
            ..Default::default()
        }),
        version_diff: Some(VersionDiff {
            version_jump_suspicious: true,
            scripts_added: vec!["preinstall".into(), "postinstall".into()],
            ..Default::default()
        }),
        publishing: PublishingInfo {
            publisher_is_listed_maintainer: false,
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(supply_chain_adjustment(&supply), -80.0);
}

#[test]
fn clean_popular_repo_is_approved() {
    // Active repo, one patched LOW CVE, security tooling, no lifecycle
    // scripts.
    let scorer = Scorer::at(now());
    let mut repo = healthy_repo();
    repo.security.cve_history = Some(CveHistory::from_details(vec![cve(
        Severity::Low,
        Some("1.2.4"),
        200,
    )]));
    let supply = clean_supply();

    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ecosystem: Some(Ecosystem::Npm),
        install_count: Some(5_000_000),
        supply_chain: Some(&supply),
        ..Default::default()
    });

    assert!(scores.overall >= 80.0, "overall was {}", scores.overall);
    assert!(matches!(scores.grade, Grade::A | Grade::B));
    assert_eq!(scores.risk_tier, RiskTier::Approved);
    // A patched CVE exists, so an update is worth taking soon.
    assert_eq!(scores.update_urgency, UpdateUrgency::High);
    assert!(scores.security.score >= 70.0);
    assert!(scores.bus_factor.score >= 65.0);
}

#[test]
fn install_time_attack_shape_is_prohibited_and_low_scoring() {
    let scorer = Scorer::at(now());
    let supply = SupplyChainData {
        lifecycle_scripts: LifecycleScriptRisk {
            has_preinstall: true,
            has_network_calls: true,
            has_process_spawn: true,
            installs_runtime: true,
            risk_score: 100,
            ..Default::default()
        },
        tarball: Some(TarballAnalysis {
            suspicious_files: vec!["setup_bun.js".into()],
            risk_score: 60,
            ..Default::default()
        }),
        publishing: PublishingInfo {
            publisher_is_listed_maintainer: false,
            ..Default::default()
        },
        overall_risk_score: 100,
        risk_level: RiskLevel::Critical,
        critical_findings: vec!["Remote script piped directly into a shell (preinstall)".into()],
        ..Default::default()
    };
    let repo = healthy_repo();

    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ecosystem: Some(Ecosystem::Npm),
        supply_chain: Some(&supply),
        ..Default::default()
    });

    assert_eq!(scores.risk_tier, RiskTier::Prohibited);
    assert_eq!(scores.update_urgency, UpdateUrgency::Critical);
    assert!(scores.overall <= 30.0, "overall was {}", scores.overall);
}

#[test]
fn archived_repo_is_prohibited_with_medium_urgency() {
    let scorer = Scorer::at(now());
    let mut repo = healthy_repo();
    repo.repo.is_archived = true;
    repo.commits.last_commit_date = Some(now() - Duration::days(400));
    repo.commits.commits_last_6mo = 0;
    repo.releases.releases_last_year = 0;
    repo.contributors.active_contributors_6mo = 0;
    repo.contributors.contributor_entropy = Some(0.5);
    // Archived projects have long since stopped running tooling.
    repo.security.has_security_md = false;
    repo.security.has_dependabot = false;
    repo.security.has_codeql = false;
    repo.security.has_security_ci = false;
    repo.ci = Default::default();

    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ecosystem: Some(Ecosystem::Npm),
        ..Default::default()
    });

    assert_eq!(scores.risk_tier, RiskTier::Prohibited);
    assert_eq!(scores.update_urgency, UpdateUrgency::Medium);
    assert!(scores.maintenance.score <= 60.0);
    assert!(scores.overall < 60.0, "overall was {}", scores.overall);
}

#[test]
fn unpatched_critical_cve_prohibits() {
    let scorer = Scorer::at(now());
    let mut repo = healthy_repo();
    repo.security.cve_history = Some(CveHistory::from_details(vec![cve(
        Severity::Critical,
        None,
        90,
    )]));
    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ecosystem: Some(Ecosystem::Npm),
        ..Default::default()
    });
    assert_eq!(scores.risk_tier, RiskTier::Prohibited);
    assert_eq!(scores.update_urgency, UpdateUrgency::Critical);
}

#[test]
fn partial_forge_data_still_scores() {
    let scorer = Scorer::at(now());
    let aggregator = AggregatorData {
        project_metrics: Some(pkgpulse_core::BasicProjectMetrics {
            stars: Some(500),
            forks: Some(30),
            ..Default::default()
        }),
        dependency_graph: Some(pkgpulse_core::DependencyGraphSummary {
            direct_count: 4,
            transitive_count: 10,
            ..Default::default()
        }),
        ..Default::default()
    };
    let scores = scorer.calculate(&ScoringInputs {
        aggregator: Some(&aggregator),
        ecosystem: Some(Ecosystem::Pypi),
        ..Default::default()
    });
    assert!(scores.overall > 0.0);
    assert_eq!(scores.community.weight, WEIGHT_COMMUNITY);
}

#[test]
fn entropy_drives_bus_factor_above_share_fallback() {
    let scorer = Scorer::at(now());
    let mut with_entropy = healthy_repo();
    with_entropy.contributors.contributor_entropy = Some(3.0);
    let mut without = healthy_repo();
    without.contributors.contributor_entropy = None;
    without.contributors.contributors_over_5pct = 1;

    let high = scorer
        .calculate(&ScoringInputs {
            repo: Some(&with_entropy),
            ..Default::default()
        })
        .bus_factor
        .score;
    let low = scorer
        .calculate(&ScoringInputs {
            repo: Some(&without),
            ..Default::default()
        })
        .bus_factor
        .score;
    assert!(high > low);
}

#[test]
fn missing_llm_lowers_confidence() {
    let scorer = Scorer::at(now());
    let repo = healthy_repo();
    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ..Default::default()
    });
    assert!(!scores.confidence_factors.is_empty());
    assert_ne!(scores.confidence, pkgpulse_core::Confidence::High);
}

#[test]
fn age_band_follows_created_at() {
    let scorer = Scorer::at(now());
    let mut repo = healthy_repo();
    repo.repo.created_at = Some(now() - Duration::days(100));
    let scores = scorer.calculate(&ScoringInputs {
        repo: Some(&repo),
        ..Default::default()
    });
    assert_eq!(scores.project_age_band, Some(pkgpulse_core::AgeBand::New));
}
