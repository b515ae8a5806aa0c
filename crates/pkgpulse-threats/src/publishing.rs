//! Publisher and maintainer provenance analysis.

use pkgpulse_core::PublishingInfo;

/// Analyze who published the current version relative to the listed
/// maintainers, and whether the publish carries provenance.
pub fn analyze_publishing(
    maintainers: &[String],
    publisher: Option<&str>,
    has_provenance: bool,
    provenance_verified: bool,
) -> PublishingInfo {
    let publisher_is_listed = match publisher {
        Some(publisher) => maintainers
            .iter()
            .any(|m| m.eq_ignore_ascii_case(publisher)),
        // Without publisher attribution there is nothing to contradict.
        None => true,
    };

    let mut info = PublishingInfo {
        has_provenance,
        provenance_verified,
        publisher_username: publisher.map(String::from),
        publisher_is_listed_maintainer: publisher_is_listed,
        maintainer_count: maintainers.len(),
        maintainers: maintainers.to_vec(),
        ..Default::default()
    };

    let mut score: u32 = 0;
    if !publisher_is_listed {
        score += 40;
        info.risk_factors
            .push("publisher is not a listed maintainer".to_string());
    }
    if maintainers.len() == 1 {
        score += 15;
        info.risk_factors.push("single maintainer".to_string());
    }
    info.risk_score = score.min(100);
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listed_publisher_with_team_is_clean() {
        let info = analyze_publishing(&names(&["alice", "bob"]), Some("alice"), true, true);
        assert!(info.publisher_is_listed_maintainer);
        assert_eq!(info.risk_score, 0);
    }

    #[test]
    fn unlisted_publisher_is_penalized() {
        let info = analyze_publishing(&names(&["alice", "bob"]), Some("mallory"), false, false);
        assert!(!info.publisher_is_listed_maintainer);
        assert!(info.risk_score >= 40);
    }

    #[test]
    fn single_maintainer_adds_risk() {
        let info = analyze_publishing(&names(&["alice"]), Some("alice"), false, false);
        assert_eq!(info.risk_score, 15);
    }

    #[test]
    fn publisher_match_is_case_insensitive() {
        let info = analyze_publishing(&names(&["Alice"]), Some("alice"), false, false);
        assert!(info.publisher_is_listed_maintainer);
    }
}
