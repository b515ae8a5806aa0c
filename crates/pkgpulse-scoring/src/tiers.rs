//! Risk tier, update urgency, confidence, and age-band classification.

use crate::ScoringInputs;
use chrono::{DateTime, Utc};
use pkgpulse_core::{AgeBand, Confidence, RiskLevel, RiskTier, Severity, UpdateUrgency};

pub(crate) fn classify_risk_tier(
    inputs: &ScoringInputs<'_>,
    overall: f64,
    security_score: f64,
) -> RiskTier {
    let supply = inputs.supply_chain;
    let supply_level = supply.map(|s| s.risk_level).unwrap_or(RiskLevel::Low);

    let install_time_attack = supply
        .map(|s| {
            s.lifecycle_scripts.installs_runtime
                || (s.lifecycle_scripts.has_credential_access
                    && s.lifecycle_scripts.has_network_calls)
                || s.tarball
                    .as_ref()
                    .map(|t| !t.suspicious_files.is_empty())
                    .unwrap_or(false)
        })
        .unwrap_or(false);

    let archived = inputs.repo.map(|r| r.repo.is_archived).unwrap_or(false);
    let unpatched_critical = inputs
        .repo
        .and_then(|r| r.security.cve_history.as_ref())
        .map(|h| h.has_unpatched_at(Severity::Critical))
        .unwrap_or(false);

    if supply_level == RiskLevel::Critical || install_time_attack || archived || unpatched_critical
    {
        return RiskTier::Prohibited;
    }

    if security_score < 40.0 || supply_level == RiskLevel::High {
        return RiskTier::Restricted;
    }

    if overall >= 80.0 && security_score >= 70.0 {
        // Any live supply-chain concern caps the tier at conditional.
        return if supply_level == RiskLevel::Low {
            RiskTier::Approved
        } else {
            RiskTier::Conditional
        };
    }

    if overall >= 60.0 {
        RiskTier::Conditional
    } else {
        RiskTier::Restricted
    }
}

pub(crate) fn classify_update_urgency(inputs: &ScoringInputs<'_>) -> UpdateUrgency {
    if let Some(supply) = inputs.supply_chain {
        let critical_supply = supply.risk_level == RiskLevel::Critical
            || supply.lifecycle_scripts.installs_runtime
            || supply.lifecycle_scripts.has_credential_access
            || supply
                .tarball
                .as_ref()
                .map(|t| !t.suspicious_files.is_empty())
                .unwrap_or(false);
        if critical_supply {
            return UpdateUrgency::Critical;
        }
        if matches!(supply.risk_level, RiskLevel::High | RiskLevel::Medium) {
            return UpdateUrgency::High;
        }
    }

    if let Some(history) = inputs.repo.and_then(|r| r.security.cve_history.as_ref()) {
        if history.has_unpatched {
            return UpdateUrgency::Critical;
        }
        if history.cves.iter().any(|c| c.fixed_version.is_some()) {
            return UpdateUrgency::High;
        }
    }

    let maintenance_concern = inputs
        .repo
        .map(|r| {
            r.repo.is_archived || r.repo.is_deprecated || r.commits.commits_last_6mo == 0
        })
        .unwrap_or(false);
    if maintenance_concern {
        return UpdateUrgency::Medium;
    }

    UpdateUrgency::Low
}

pub(crate) fn classify_confidence(
    inputs: &ScoringInputs<'_>,
    now: DateTime<Utc>,
) -> (Confidence, Vec<String>) {
    let mut concerns = Vec::new();

    if inputs.llm.map(|l| l.is_empty()).unwrap_or(true) {
        concerns.push("no qualitative assessments available".to_string());
    }
    if let Some(repo) = inputs.repo {
        if let Some(created) = repo.repo.created_at {
            if (now - created).num_days() < 183 {
                concerns.push("package younger than six months".to_string());
            }
        }
        if repo.contributors.total_contributors < 2 {
            concerns.push("fewer than two contributors".to_string());
        }
        if repo.issues.open_issues + repo.issues.closed_issues_6mo < 5 {
            concerns.push("fewer than five issues on record".to_string());
        }
    }

    let confidence = match concerns.len() {
        0 => Confidence::High,
        1 | 2 => Confidence::Medium,
        _ => Confidence::Low,
    };
    (confidence, concerns)
}

pub(crate) fn classify_age_band(inputs: &ScoringInputs<'_>, now: DateTime<Utc>) -> Option<AgeBand> {
    inputs
        .repo
        .and_then(|r| r.repo.created_at)
        .map(|created| AgeBand::from_age_days((now - created).num_days().max(0)))
}
