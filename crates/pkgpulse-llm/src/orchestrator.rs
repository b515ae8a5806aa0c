//! Assessment orchestration.
//!
//! Sequential mode runs fetch-then-prompt per assessment in a fixed order.
//! Parallel mode runs two phases: phase 1 gathers all content fetches
//! concurrently, phase 2 issues all generation calls concurrently. Parallel
//! mode exists because sequential prompting leaves the GPU idle between
//! calls. In both modes every task is error-isolated: a failure empties
//! that assessment slot only.

use crate::client::LlmClient;
use pkgpulse_core::{LlmAssessments, RepoData};
use pkgpulse_github::GitHubFetcher;
use serde_json::Value;
use tracing::{debug, info};

/// Execution mode for the assessment fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmMode {
    #[default]
    Sequential,
    Parallel,
}

/// Content gathered ahead of the generation phase.
#[derive(Debug, Default)]
struct GatheredContent {
    readme: Option<String>,
    issues: Vec<Value>,
    comments: Vec<String>,
    changelog: Option<String>,
    governance: Option<String>,
    sources: Option<String>,
}

pub struct LlmOrchestrator {
    pub client: LlmClient,
    pub mode: LlmMode,
}

impl LlmOrchestrator {
    pub fn new(client: LlmClient, mode: LlmMode) -> Self {
        Self { client, mode }
    }

    /// Run all enabled assessments for one package.
    pub async fn run(
        &self,
        github: &GitHubFetcher,
        data: &RepoData,
        package: &str,
        ecosystem: &str,
    ) -> LlmAssessments {
        let owner = data.repo.owner.as_str();
        let repo = data.repo.name.as_str();

        match self.mode {
            LlmMode::Parallel => {
                let content = self.gather_parallel(github, data, owner, repo).await;
                self.generate_parallel(data, &content, package, ecosystem).await
            }
            LlmMode::Sequential => {
                self.run_sequential(github, data, package, ecosystem, owner, repo)
                    .await
            }
        }
    }

    /// Phase 1: all content fetches concurrently, each failure isolated.
    async fn gather_parallel(
        &self,
        github: &GitHubFetcher,
        data: &RepoData,
        owner: &str,
        repo: &str,
    ) -> GatheredContent {
        let (readme, issues, comments, changelog, governance, sources) = tokio::join!(
            github.fetch_readme_content(owner, repo),
            github.fetch_recent_issues(owner, repo, 15),
            github.fetch_maintainer_comments(owner, repo, 30),
            github.fetch_changelog_content(owner, repo),
            github.fetch_governance_docs(owner, repo),
            github.fetch_source_files_for_security(
                owner,
                repo,
                data.repo.language.as_deref(),
                &data.repo.default_branch,
            ),
        );

        GatheredContent {
            readme: readme.ok().flatten(),
            issues: issues.unwrap_or_default(),
            comments: comments.unwrap_or_default(),
            changelog: changelog.ok().flatten(),
            governance: governance.ok().flatten(),
            sources: sources.ok().flatten(),
        }
    }

    /// Phase 2: all generation calls concurrently over the gathered content.
    async fn generate_parallel(
        &self,
        data: &RepoData,
        content: &GatheredContent,
        package: &str,
        ecosystem: &str,
    ) -> LlmAssessments {
        let figures = GitHubFetcher::maintenance_figures(data);

        let (readme, sentiment, communication, maintenance, changelog, governance, security) = tokio::join!(
            async {
                match &content.readme {
                    Some(readme) => self
                        .client
                        .assess_readme(readme, package, ecosystem)
                        .await
                        .ok(),
                    None => None,
                }
            },
            async {
                if content.issues.is_empty() {
                    None
                } else {
                    self.client
                        .assess_sentiment(&content.issues, package, ecosystem)
                        .await
                        .ok()
                }
            },
            async {
                if content.comments.is_empty() {
                    None
                } else {
                    self.client
                        .assess_communication(&content.comments, package, ecosystem)
                        .await
                        .ok()
                }
            },
            async {
                self.client
                    .assess_maintenance(&figures, package, ecosystem)
                    .await
                    .ok()
            },
            async {
                match &content.changelog {
                    Some(changelog) => self
                        .client
                        .assess_changelog(changelog, package, ecosystem)
                        .await
                        .ok(),
                    None => None,
                }
            },
            async {
                match &content.governance {
                    Some(docs) => self
                        .client
                        .assess_governance(docs, package, ecosystem)
                        .await
                        .ok(),
                    None => None,
                }
            },
            async {
                match &content.sources {
                    Some(sources) => self
                        .client
                        .assess_security(sources, package, ecosystem)
                        .await
                        .ok(),
                    None => None,
                }
            },
        );

        let assessments = LlmAssessments {
            readme,
            security,
            sentiment,
            communication,
            maintenance,
            changelog,
            governance,
        };
        info!(package, complete = !assessments.is_empty(), "parallel assessments done");
        assessments
    }

    /// Strictly ordered fetch-then-prompt; one failure never cancels the
    /// rest.
    async fn run_sequential(
        &self,
        github: &GitHubFetcher,
        data: &RepoData,
        package: &str,
        ecosystem: &str,
        owner: &str,
        repo: &str,
    ) -> LlmAssessments {
        let mut assessments = LlmAssessments::default();

        if data.files.has_readme {
            if let Ok(Some(readme)) = github.fetch_readme_content(owner, repo).await {
                assessments.readme = self
                    .client
                    .assess_readme(&readme, package, ecosystem)
                    .await
                    .ok();
            }
        }

        if let Ok(issues) = github.fetch_recent_issues(owner, repo, 15).await {
            if !issues.is_empty() {
                assessments.sentiment = self
                    .client
                    .assess_sentiment(&issues, package, ecosystem)
                    .await
                    .ok();
            }
        }

        if let Ok(comments) = github.fetch_maintainer_comments(owner, repo, 30).await {
            if !comments.is_empty() {
                assessments.communication = self
                    .client
                    .assess_communication(&comments, package, ecosystem)
                    .await
                    .ok();
            }
        }

        let figures = GitHubFetcher::maintenance_figures(data);
        assessments.maintenance = self
            .client
            .assess_maintenance(&figures, package, ecosystem)
            .await
            .ok();

        if let Ok(Some(changelog)) = github.fetch_changelog_content(owner, repo).await {
            assessments.changelog = self
                .client
                .assess_changelog(&changelog, package, ecosystem)
                .await
                .ok();
        }

        if let Ok(Some(docs)) = github.fetch_governance_docs(owner, repo).await {
            assessments.governance = self
                .client
                .assess_governance(&docs, package, ecosystem)
                .await
                .ok();
        }

        if let Ok(Some(sources)) = github
            .fetch_source_files_for_security(
                owner,
                repo,
                data.repo.language.as_deref(),
                &data.repo.default_branch,
            )
            .await
        {
            assessments.security = self
                .client
                .assess_security(&sources, package, ecosystem)
                .await
                .ok();
        }

        debug!(package, "sequential assessments done");
        assessments
    }
}
