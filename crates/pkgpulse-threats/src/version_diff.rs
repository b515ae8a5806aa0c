//! Version-to-version diffing of manifests: bump classification, suspicious
//! jumps, and script/dependency changes.

use crate::lifecycle::DANGEROUS_HOOKS;
use crate::ManifestInfo;
use pkgpulse_core::VersionDiff;
use semver::Version;

/// Compare the current manifest against the previously published version.
pub fn analyze_version_diff(current: &ManifestInfo, previous: Option<&ManifestInfo>) -> VersionDiff {
    let mut diff = VersionDiff {
        current_version: current.version.clone(),
        ..Default::default()
    };

    let Some(previous) = previous else {
        return diff;
    };
    diff.previous_version = Some(previous.version.clone());
    diff.comparison_available = true;

    if let (Ok(cur), Ok(prev)) = (
        Version::parse(current.version.trim_start_matches('v')),
        Version::parse(previous.version.trim_start_matches('v')),
    ) {
        diff.is_major_bump = cur.major > prev.major;
        diff.is_minor_bump = cur.major == prev.major && cur.minor > prev.minor;
        diff.is_patch_bump =
            cur.major == prev.major && cur.minor == prev.minor && cur.patch > prev.patch;

        // Suspicious: a jump of more than five majors, or going backward.
        let went_backward = cur < prev;
        let jumped = cur.major > prev.major + 5;
        diff.version_jump_suspicious = jumped || went_backward;
        if jumped {
            diff.risk_factors.push(format!(
                "version jumped from {} to {}",
                previous.version, current.version
            ));
        }
        if went_backward {
            diff.risk_factors.push(format!(
                "version went backward from {} to {}",
                previous.version, current.version
            ));
        }
    }

    diff.scripts_added = current
        .scripts
        .keys()
        .filter(|k| !previous.scripts.contains_key(*k))
        .cloned()
        .collect();
    diff.scripts_changed = !diff.scripts_added.is_empty()
        || current
            .scripts
            .iter()
            .any(|(k, v)| previous.scripts.get(k).map(|p| p != v).unwrap_or(false));

    diff.dependencies_added = current
        .dependencies
        .iter()
        .filter(|d| !previous.dependencies.contains(d))
        .cloned()
        .collect();
    diff.dependencies_removed = previous
        .dependencies
        .iter()
        .filter(|d| !current.dependencies.contains(d))
        .cloned()
        .collect();

    diff.risk_score = score_diff(&mut diff);
    diff
}

/// Additive diff risk, capped at 100. Newly introduced install-time hooks
/// dominate.
fn score_diff(diff: &mut VersionDiff) -> u32 {
    let mut score: u32 = 0;
    if diff.version_jump_suspicious {
        score += 25;
    }
    for script in &diff.scripts_added {
        if DANGEROUS_HOOKS.contains(&script.as_str()) {
            score += 30;
            diff.risk_factors
                .push(format!("new install-time script: {script}"));
        }
    }
    if diff.scripts_changed && diff.scripts_added.is_empty() {
        score += 10;
    }
    if diff.dependencies_added.len() > 5 {
        score += 10;
    }
    score.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manifest(version: &str, scripts: &[(&str, &str)], deps: &[&str]) -> ManifestInfo {
        ManifestInfo {
            version: version.to_string(),
            scripts: scripts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn no_previous_version_is_not_comparable() {
        let diff = analyze_version_diff(&manifest("1.0.0", &[], &[]), None);
        assert!(!diff.comparison_available);
        assert_eq!(diff.risk_score, 0);
    }

    #[test]
    fn classifies_bumps() {
        let prev = manifest("1.2.3", &[], &[]);
        let major = analyze_version_diff(&manifest("2.0.0", &[], &[]), Some(&prev));
        assert!(major.is_major_bump && !major.is_minor_bump);
        let minor = analyze_version_diff(&manifest("1.3.0", &[], &[]), Some(&prev));
        assert!(minor.is_minor_bump);
        let patch = analyze_version_diff(&manifest("1.2.4", &[], &[]), Some(&prev));
        assert!(patch.is_patch_bump);
        assert!(!patch.version_jump_suspicious);
    }

    #[test]
    fn large_jump_and_backward_are_suspicious() {
        let prev = manifest("1.0.0", &[], &[]);
        let jumped = analyze_version_diff(&manifest("10.0.0", &[], &[]), Some(&prev));
        assert!(jumped.version_jump_suspicious);
        assert!(jumped.risk_score >= 25);

        let prev9 = manifest("9.1.0", &[], &[]);
        let backward = analyze_version_diff(&manifest("9.0.0", &[], &[]), Some(&prev9));
        assert!(backward.version_jump_suspicious);

        let five = analyze_version_diff(&manifest("6.0.0", &[], &[]), Some(&prev));
        assert!(!five.version_jump_suspicious); // delta of 5 majors is still allowed
        let six = analyze_version_diff(&manifest("7.0.0", &[], &[]), Some(&prev));
        assert!(six.version_jump_suspicious);
    }

    #[test]
    fn new_preinstall_script_dominates_risk() {
        let prev = manifest("1.0.0", &[("test", "jest")], &[]);
        let cur = manifest(
            "1.0.1",
            &[("test", "jest"), ("preinstall", "node setup.js")],
            &[],
        );
        let diff = analyze_version_diff(&cur, Some(&prev));
        assert_eq!(diff.scripts_added, vec!["preinstall"]);
        assert!(diff.risk_score >= 30);
    }

    #[test]
    fn dependency_changes_are_recorded() {
        let prev = manifest("1.0.0", &[], &["a", "b"]);
        let cur = manifest("1.0.1", &[], &["a", "c"]);
        let diff = analyze_version_diff(&cur, Some(&prev));
        assert_eq!(diff.dependencies_added, vec!["c"]);
        assert_eq!(diff.dependencies_removed, vec!["b"]);
    }
}
