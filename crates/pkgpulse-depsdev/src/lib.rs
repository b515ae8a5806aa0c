//! deps.dev cross-forge intelligence for pkgpulse
//!
//! Three independent, failure-isolated sub-queries per package:
//! - version record, for SLSA attestation presence and level
//! - resolved dependency graph, summarized by BFS from the root node
//! - project record, for OpenSSF Scorecard (GitHub) or basic forge metrics
//!   (GitLab, Bitbucket)

pub mod client;
pub mod error;
pub mod models;

pub use client::{system_for, DepsDevClient};
pub use error::{DepsDevError, Result};
pub use models::*;

use chrono::{DateTime, Utc};
use pkgpulse_core::{
    AggregatorData, BasicProjectMetrics, DependencyGraphSummary, Ecosystem, RepoRef, ScorecardData,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Summarize a resolved dependency graph by BFS from node 0.
/// Depth-1 nodes are direct dependencies; everything deeper is transitive.
pub fn summarize_dependency_graph(graph: &DependencyGraph) -> Option<DependencyGraphSummary> {
    if graph.nodes.is_empty() {
        return None;
    }

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for edge in &graph.edges {
        children.entry(edge.from_node).or_default().push(edge.to_node);
    }

    let mut depths: HashMap<usize, usize> = HashMap::new();
    depths.insert(0, 0);
    let mut queue = VecDeque::from([0usize]);
    let mut max_depth = 0;
    while let Some(current) = queue.pop_front() {
        let depth = depths[&current];
        for &child in children.get(&current).into_iter().flatten() {
            if let std::collections::hash_map::Entry::Vacant(e) = depths.entry(child) {
                e.insert(depth + 1);
                max_depth = max_depth.max(depth + 1);
                queue.push_back(child);
            }
        }
    }

    let mut summary = DependencyGraphSummary {
        max_depth,
        ..Default::default()
    };
    for (i, node) in graph.nodes.iter().enumerate() {
        if i == 0 {
            continue;
        }
        let depth = depths.get(&i).copied().unwrap_or(0);
        let vulnerable = !node.advisory_keys.is_empty();
        if depth == 1 {
            summary.direct_count += 1;
            if vulnerable {
                summary.vulnerable_direct += 1;
            }
        } else {
            summary.transitive_count += 1;
            if vulnerable {
                summary.vulnerable_transitive += 1;
            }
        }
    }

    Some(summary)
}

/// Extract Scorecard data from a project record, if present.
pub fn parse_scorecard(project: &ProjectRecord) -> Option<ScorecardData> {
    let scorecard = project.scorecard.as_ref()?;
    let overall = scorecard.overall_score?;

    let checks: BTreeMap<String, f64> = scorecard
        .checks
        .iter()
        .filter_map(|c| c.score.map(|s| (c.name.clone(), s)))
        .collect();

    let score_date: Option<DateTime<Utc>> = scorecard
        .date
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc));

    let check = |name: &str| checks.get(name).copied();
    Some(ScorecardData {
        overall_score: overall,
        score_date,
        code_review_score: check("Code-Review"),
        maintained_score: check("Maintained"),
        branch_protection_score: check("Branch-Protection"),
        dangerous_workflow_score: check("Dangerous-Workflow"),
        token_permissions_score: check("Token-Permissions"),
        fuzzing_enabled: check("Fuzzing").unwrap_or(0.0) >= 5.0,
        sast_enabled: check("SAST").unwrap_or(0.0) >= 5.0,
        cii_badge: check("CII-Best-Practices").unwrap_or(0.0) >= 5.0,
        checks,
    })
}

/// Basic project metrics for forges without Scorecard coverage.
pub fn parse_basic_metrics(project: &ProjectRecord) -> Option<BasicProjectMetrics> {
    if project.stars_count.is_none()
        && project.forks_count.is_none()
        && project.open_issues_count.is_none()
    {
        return None;
    }
    Some(BasicProjectMetrics {
        stars: project.stars_count,
        forks: project.forks_count,
        open_issues: project.open_issues_count,
        license: project.license.clone(),
        description: project.description.clone(),
        oss_fuzz_line_count: project.oss_fuzz.as_ref().and_then(|f| f.line_count),
        oss_fuzz_line_cover_count: project.oss_fuzz.as_ref().and_then(|f| f.line_cover_count),
    })
}

/// SLSA attestation presence and level from a version record.
/// The level comes from the `LEVEL_n` suffix of the attestation type.
pub fn parse_slsa_attestation(version: &VersionRecord) -> (bool, Option<u8>) {
    for attestation in &version.attestations {
        let t = attestation.attestation_type.as_str();
        if !t.contains("SLSA") {
            continue;
        }
        for (suffix, level) in [("LEVEL_1", 1u8), ("LEVEL_2", 2), ("LEVEL_3", 3), ("LEVEL_4", 4)] {
            if t.contains(suffix) {
                return (true, Some(level));
            }
        }
        return (true, None);
    }
    (false, None)
}

/// Fetch all available intelligence for a package version. Each sub-query
/// failure degrades that slice only.
pub async fn fetch_all_intelligence(
    client: &DepsDevClient,
    package_name: &str,
    version: &str,
    ecosystem: Ecosystem,
    repo_ref: Option<&RepoRef>,
) -> AggregatorData {
    let mut data = AggregatorData {
        fetched_at: Some(Utc::now()),
        ..Default::default()
    };

    match client.get_version(ecosystem, package_name, version).await {
        Ok(Some(record)) => {
            data.sources_available.push("deps.dev:version".to_string());
            let (has_slsa, level) = parse_slsa_attestation(&record);
            data.slsa_attestation = has_slsa;
            data.slsa_level = level;
        }
        Ok(None) => {}
        Err(e) => debug!(package = package_name, "version query degraded: {e}"),
    }

    match client.get_dependencies(ecosystem, package_name, version).await {
        Ok(graph) => {
            if let Some(summary) = summarize_dependency_graph(&graph) {
                data.sources_available
                    .push("deps.dev:dependencies".to_string());
                data.dependency_graph = Some(summary);
            }
        }
        Err(e) => debug!(package = package_name, "dependency query degraded: {e}"),
    }

    if let Some(repo) = repo_ref {
        match client.get_project(repo).await {
            Ok(Some(project)) => {
                data.sources_available.push("deps.dev:project".to_string());
                data.scorecard = parse_scorecard(&project);
                data.project_metrics = parse_basic_metrics(&project);
            }
            Ok(None) => {}
            Err(e) => debug!(repo = %repo.url(), "project query degraded: {e}"),
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgpulse_core::Platform;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graph(nodes: usize, edges: &[(usize, usize)], vulnerable: &[usize]) -> DependencyGraph {
        DependencyGraph {
            nodes: (0..nodes)
                .map(|i| DependencyNode {
                    relation: None,
                    advisory_keys: if vulnerable.contains(&i) {
                        vec![serde_json::json!({"id": "GHSA"})]
                    } else {
                        vec![]
                    },
                    errors: vec![],
                })
                .collect(),
            edges: edges
                .iter()
                .map(|&(from, to)| DependencyEdge {
                    from_node: from,
                    to_node: to,
                    requirement: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn empty_graph_has_no_summary() {
        assert!(summarize_dependency_graph(&DependencyGraph::default()).is_none());
    }

    #[test]
    fn root_only_graph_has_depth_zero_and_no_dependencies() {
        let summary = summarize_dependency_graph(&graph(1, &[], &[])).unwrap();
        assert_eq!(summary.max_depth, 0);
        assert_eq!(summary.total_count(), 0);
    }

    #[test]
    fn bfs_classifies_direct_and_transitive() {
        // 0 -> 1 -> 2, 0 -> 3
        let summary =
            summarize_dependency_graph(&graph(4, &[(0, 1), (1, 2), (0, 3)], &[2])).unwrap();
        assert_eq!(summary.direct_count, 2);
        assert_eq!(summary.transitive_count, 1);
        assert_eq!(summary.vulnerable_transitive, 1);
        assert_eq!(summary.vulnerable_direct, 0);
        assert_eq!(summary.max_depth, 2);
        assert_eq!(summary.total_count(), summary.direct_count + summary.transitive_count);
    }

    #[test]
    fn slsa_level_from_type_suffix() {
        let record = VersionRecord {
            attestations: vec![Attestation {
                attestation_type: "SLSA_BUILD_LEVEL_3".into(),
                url: None,
            }],
            ..Default::default()
        };
        assert_eq!(parse_slsa_attestation(&record), (true, Some(3)));

        let generic = VersionRecord {
            attestations: vec![Attestation {
                attestation_type: "SLSA_PROVENANCE".into(),
                url: None,
            }],
            ..Default::default()
        };
        assert_eq!(parse_slsa_attestation(&generic), (true, None));
        assert_eq!(parse_slsa_attestation(&VersionRecord::default()), (false, None));
    }

    #[test]
    fn scorecard_flags_from_check_scores() {
        let project = ProjectRecord {
            scorecard: Some(ScorecardRecord {
                date: Some("2024-06-01T00:00:00Z".into()),
                overall_score: Some(7.5),
                checks: vec![
                    ScorecardCheck {
                        name: "Fuzzing".into(),
                        score: Some(10.0),
                    },
                    ScorecardCheck {
                        name: "SAST".into(),
                        score: Some(3.0),
                    },
                    ScorecardCheck {
                        name: "Maintained".into(),
                        score: Some(8.0),
                    },
                ],
            }),
            ..Default::default()
        };
        let scorecard = parse_scorecard(&project).unwrap();
        assert_eq!(scorecard.overall_score, 7.5);
        assert!(scorecard.fuzzing_enabled);
        assert!(!scorecard.sast_enabled);
        assert_eq!(scorecard.maintained_score, Some(8.0));
    }

    #[test]
    fn basic_metrics_require_at_least_one_field() {
        assert!(parse_basic_metrics(&ProjectRecord::default()).is_none());
        let project = ProjectRecord {
            stars_count: Some(500),
            forks_count: Some(30),
            ..Default::default()
        };
        let metrics = parse_basic_metrics(&project).unwrap();
        assert_eq!(metrics.stars, Some(500));
    }

    #[tokio::test]
    async fn intelligence_degrades_per_sub_query() {
        let server = MockServer::start().await;
        // Version 500s, dependencies 404s, project returns GitLab metrics.
        Mock::given(method("GET"))
            .and(path("/systems/npm/packages/left-pad/versions/1.0.0"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/systems/npm/packages/left-pad/versions/1.0.0:dependencies"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/gitlab.com%2Fo%2Fr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "starsCount": 500, "forksCount": 30
            })))
            .mount(&server)
            .await;

        let client = DepsDevClient::with_base_url(server.uri());
        let repo = RepoRef::new(Platform::Gitlab, "o", "r");
        let data =
            fetch_all_intelligence(&client, "left-pad", "1.0.0", Ecosystem::Npm, Some(&repo)).await;

        assert!(!data.slsa_attestation);
        assert!(data.dependency_graph.is_none());
        assert!(data.has_project_data());
        assert_eq!(data.project_metrics.unwrap().stars, Some(500));
    }
}
