//! Pure derivations over fetched repository data: contributor entropy and
//! trend, deprecation detection, workflow scanning, and CI depth.

use pkgpulse_core::ContributorTrend;

/// Description phrases that mark a project as deprecated.
const DEPRECATION_PHRASES: &[&str] = &[
    "deprecated",
    "no longer maintained",
    "unmaintained",
    "not maintained",
    "maintenance mode",
    "abandoned",
    "end of life",
    "eol",
    "superseded by",
    "replaced by",
    "use instead",
];

/// Repository topics that mark a project as deprecated.
const DEPRECATION_TOPICS: &[&str] = &["deprecated", "unmaintained", "archived", "abandoned"];

/// Case-insensitive deprecation detection over description and topics.
pub fn detect_deprecation(description: Option<&str>, topics: &[String]) -> bool {
    if let Some(desc) = description {
        let desc = desc.to_lowercase();
        if DEPRECATION_PHRASES.iter().any(|p| desc.contains(p)) {
            return true;
        }
    }
    topics
        .iter()
        .any(|t| DEPRECATION_TOPICS.contains(&t.to_lowercase().as_str()))
}

/// Shannon entropy in bits over contribution counts.
///
/// Only contributors with at least one contribution participate; returns
/// `None` when total contributions are zero.
pub fn contribution_entropy(contributions: &[u64]) -> Option<f64> {
    let total: u64 = contributions.iter().sum();
    if total == 0 {
        return None;
    }
    let total = total as f64;
    let entropy = contributions
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum::<f64>();
    Some(entropy)
}

/// Classify the contributor trajectory: growing above 1.3x the prior
/// half-year, declining below 0.7x.
pub fn classify_trend(active_6mo: usize, prev_6mo: usize) -> ContributorTrend {
    let active = active_6mo as f64;
    let prev = prev_6mo as f64;
    if active > prev * 1.3 {
        ContributorTrend::Growing
    } else if active < prev * 0.7 {
        ContributorTrend::Declining
    } else {
        ContributorTrend::Stable
    }
}

/// Security tooling detected in one workflow (filename + decoded content).
#[derive(Debug, Clone, Default)]
pub struct WorkflowSignals {
    pub has_codeql: bool,
    pub has_snyk: bool,
    pub has_trivy: bool,
    pub has_semgrep: bool,
    pub has_security_ci: bool,
    pub has_sigstore: bool,
    pub has_sbom: bool,
    pub slsa_level: Option<u8>,
    pub has_tests: bool,
    pub has_lint: bool,
    pub has_release: bool,
    pub has_multi_platform: bool,
}

impl WorkflowSignals {
    pub fn merge(&mut self, other: &WorkflowSignals) {
        self.has_codeql |= other.has_codeql;
        self.has_snyk |= other.has_snyk;
        self.has_trivy |= other.has_trivy;
        self.has_semgrep |= other.has_semgrep;
        self.has_security_ci |= other.has_security_ci;
        self.has_sigstore |= other.has_sigstore;
        self.has_sbom |= other.has_sbom;
        self.slsa_level = match (self.slsa_level, other.slsa_level) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.has_tests |= other.has_tests;
        self.has_lint |= other.has_lint;
        self.has_release |= other.has_release;
        self.has_multi_platform |= other.has_multi_platform;
    }
}

/// Scan one workflow by filename and decoded content.
pub fn scan_workflow(filename: &str, content: &str) -> WorkflowSignals {
    let name = filename.to_lowercase();
    let content = content.to_lowercase();
    let mut s = WorkflowSignals::default();

    // Filename signals.
    if name.contains("codeql") {
        s.has_codeql = true;
    }
    if name.contains("snyk") {
        s.has_snyk = true;
    }
    if name.contains("trivy") {
        s.has_trivy = true;
    }
    if name.contains("semgrep") {
        s.has_semgrep = true;
    }
    if name.contains("security") || name.contains("slsa") {
        s.has_security_ci = true;
    }
    if name.contains("sigstore") || name.contains("cosign") {
        s.has_sigstore = true;
    }
    if name.contains("sbom") || name.contains("cyclonedx") || name.contains("spdx") {
        s.has_sbom = true;
    }
    if name.contains("test") || name.contains("ci") {
        s.has_tests = true;
    }
    if name.contains("lint") {
        s.has_lint = true;
    }
    if name.contains("release") || name.contains("publish") {
        s.has_release = true;
    }

    // Content signals.
    if content.contains("github/codeql-action") {
        s.has_codeql = true;
    }
    if content.contains("snyk/actions") || content.contains("snyk-") {
        s.has_snyk = true;
    }
    if content.contains("aquasecurity/trivy") || content.contains("trivy-action") {
        s.has_trivy = true;
    }
    if content.contains("semgrep") {
        s.has_semgrep = true;
    }
    if content.contains("sigstore/cosign") || content.contains("cosign-installer") {
        s.has_sigstore = true;
    }
    if content.contains("anchore/sbom-action")
        || content.contains("cyclonedx")
        || content.contains("spdx")
    {
        s.has_sbom = true;
    }
    if content.contains("slsa-framework") || content.contains("slsa-github-generator") {
        s.slsa_level = Some(
            if content.contains("slsa-builder-go") || content.contains("slsa-verifier") {
                3
            } else if content.contains("provenance") {
                2
            } else {
                1
            },
        );
        s.has_security_ci = true;
    }
    if content.contains("cargo test")
        || content.contains("npm test")
        || content.contains("pytest")
        || content.contains("go test")
    {
        s.has_tests = true;
    }
    if content.contains("clippy")
        || content.contains("eslint")
        || content.contains("ruff")
        || content.contains("golangci")
    {
        s.has_lint = true;
    }

    s.has_security_ci |= s.has_codeql || s.has_snyk || s.has_trivy || s.has_semgrep;
    s.has_multi_platform = detect_multi_platform(&content);

    s
}

/// Multi-platform CI: at least two of {ubuntu, windows, macos} inside a
/// matrix/strategy block.
fn detect_multi_platform(content: &str) -> bool {
    let Some(idx) = content.find("strategy:").or_else(|| content.find("matrix:")) else {
        return false;
    };
    let block = &content[idx..];
    let count = ["ubuntu", "windows", "macos"]
        .iter()
        .filter(|os| block.contains(**os))
        .count();
    count >= 2
}

/// Percentage of verified commits over the sample, rounded to 0.1.
pub fn signed_commits_pct(verified: &[bool]) -> f64 {
    if verified.is_empty() {
        return 0.0;
    }
    let signed = verified.iter().filter(|v| **v).count();
    (signed as f64 / verified.len() as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_is_none_without_contributions() {
        assert_eq!(contribution_entropy(&[]), None);
        assert_eq!(contribution_entropy(&[0, 0]), None);
    }

    #[test]
    fn entropy_zero_iff_single_contributor() {
        assert_eq!(contribution_entropy(&[42]), Some(0.0));
        let h = contribution_entropy(&[10, 10]).unwrap();
        assert!(h > 0.0);
    }

    #[test]
    fn equal_shares_give_log2_n_bits() {
        let h = contribution_entropy(&[5, 5, 5, 5]).unwrap();
        assert!((h - 2.0).abs() < 1e-9);
    }

    #[test]
    fn adding_equal_contributor_strictly_increases_entropy() {
        let h3 = contribution_entropy(&[7, 7, 7]).unwrap();
        let h4 = contribution_entropy(&[7, 7, 7, 7]).unwrap();
        assert!(h4 > h3);
    }

    #[test]
    fn trend_bands() {
        assert_eq!(classify_trend(3, 2), ContributorTrend::Growing); // 1.5x
        assert_eq!(classify_trend(2, 2), ContributorTrend::Stable);
        assert_eq!(classify_trend(1, 2), ContributorTrend::Declining); // 0.5x
        assert_eq!(classify_trend(1, 0), ContributorTrend::Growing);
        assert_eq!(classify_trend(0, 0), ContributorTrend::Stable);
    }

    #[test]
    fn deprecation_by_phrase_and_topic() {
        assert!(detect_deprecation(Some("DEPRECATED: use foo instead"), &[]));
        assert!(detect_deprecation(Some("This project is in maintenance mode"), &[]));
        assert!(detect_deprecation(None, &["unmaintained".to_string()]));
        assert!(!detect_deprecation(Some("A fast JSON parser"), &["json".to_string()]));
    }

    #[test]
    fn workflow_scan_detects_codeql_and_slsa() {
        let s = scan_workflow(
            "security.yml",
            "jobs:\n  analyze:\n    uses: github/codeql-action/analyze@v3\n",
        );
        assert!(s.has_codeql);
        assert!(s.has_security_ci);

        let s = scan_workflow(
            "release.yml",
            "uses: slsa-framework/slsa-github-generator@v2\nwith:\n  provenance: true\n",
        );
        assert_eq!(s.slsa_level, Some(2));
        assert!(s.has_release);
    }

    #[test]
    fn multi_platform_requires_matrix_block() {
        let matrixed = "jobs:\n  test:\n    strategy:\n      matrix:\n        os: [ubuntu-latest, windows-latest, macos-latest]\n";
        assert!(scan_workflow("ci.yml", matrixed).has_multi_platform);

        let single = "jobs:\n  test:\n    runs-on: ubuntu-latest\n";
        assert!(!scan_workflow("ci.yml", single).has_multi_platform);

        // OS names outside any matrix block do not count.
        let no_matrix = "# runs on ubuntu and windows\njobs:\n  test:\n    runs-on: ubuntu-latest\n";
        assert!(!scan_workflow("ci.yml", no_matrix).has_multi_platform);
    }

    #[test]
    fn signed_commit_percentage_rounds_to_tenth() {
        let sample: Vec<bool> = (0..3).map(|i| i == 0).collect();
        assert_eq!(signed_commits_pct(&sample), 33.3);
        assert_eq!(signed_commits_pct(&[]), 0.0);
    }
}
