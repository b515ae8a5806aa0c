//! Client for the deps.dev v3 API.
//!
//! Includes built-in request pacing and maps 404s to absence; the dependency
//! graph endpoint returns an empty graph on 404 because many packages simply
//! have no resolved graph.

use crate::error::{DepsDevError, Result};
use crate::models::*;
use pkgpulse_core::{Ecosystem, Platform, RepoRef};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Minimum spacing between requests.
struct RequestPacer {
    last_request: Instant,
    min_interval: Duration,
}

impl RequestPacer {
    fn new(requests_per_second: f64) -> Self {
        Self {
            last_request: Instant::now() - Duration::from_secs(1),
            min_interval: Duration::from_secs_f64(1.0 / requests_per_second),
        }
    }

    async fn wait_if_needed(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            let wait = self.min_interval - elapsed;
            debug!("pacing deps.dev requests: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.last_request = Instant::now();
    }
}

/// deps.dev system key for an ecosystem; Homebrew has no system and is
/// covered only through the project endpoint.
pub fn system_for(ecosystem: Ecosystem) -> Option<&'static str> {
    match ecosystem {
        Ecosystem::Npm => Some("npm"),
        Ecosystem::Pypi => Some("pypi"),
        Ecosystem::Crates => Some("cargo"),
        Ecosystem::Homebrew => None,
    }
}

/// Project key domain prefix for a forge.
fn project_domain(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::Github => Some("github.com"),
        Platform::Gitlab => Some("gitlab.com"),
        Platform::Bitbucket => Some("bitbucket.org"),
        Platform::Other => None,
    }
}

pub struct DepsDevClient {
    client: Client,
    base_url: String,
    pacer: Arc<Mutex<RequestPacer>>,
}

impl DepsDevClient {
    /// Default client against the public API, paced at 10 requests/second.
    pub fn new() -> Self {
        Self::with_rate_limit("https://api.deps.dev/v3", 10.0)
    }

    /// Custom base URL (for tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_rate_limit(base_url, 100.0)
    }

    pub fn with_rate_limit(base_url: impl Into<String>, requests_per_second: f64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("pkgpulse/0.4")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            pacer: Arc::new(Mutex::new(RequestPacer::new(requests_per_second))),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        self.pacer.lock().await.wait_if_needed().await;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("deps.dev GET {url}");
        let response = self.client.get(&url).send().await?;
        match response.status().as_u16() {
            200 => Ok(Some(response.json::<T>().await?)),
            404 => Ok(None),
            429 => Err(DepsDevError::RateLimited),
            status => {
                warn!(endpoint, status, "deps.dev error");
                Err(DepsDevError::ApiError(status))
            }
        }
    }

    /// Version record, carrying SLSA attestations.
    pub async fn get_version(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: &str,
    ) -> Result<Option<VersionRecord>> {
        let Some(system) = system_for(ecosystem) else {
            return Ok(None);
        };
        let endpoint = format!(
            "/systems/{system}/packages/{}/versions/{}",
            urlencoding::encode(package),
            urlencoding::encode(version)
        );
        self.get(&endpoint).await
    }

    /// Resolved dependency graph; a 404 means the package has no graph and
    /// yields an empty one.
    pub async fn get_dependencies(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: &str,
    ) -> Result<DependencyGraph> {
        let Some(system) = system_for(ecosystem) else {
            return Ok(DependencyGraph::default());
        };
        let endpoint = format!(
            "/systems/{system}/packages/{}/versions/{}:dependencies",
            urlencoding::encode(package),
            urlencoding::encode(version)
        );
        Ok(self.get(&endpoint).await?.unwrap_or_default())
    }

    /// Project record keyed `domain/owner/repo`.
    pub async fn get_project(&self, repo: &RepoRef) -> Result<Option<ProjectRecord>> {
        let Some(domain) = project_domain(repo.platform) else {
            return Ok(None);
        };
        let key = format!("{domain}/{}/{}", repo.owner, repo.repo);
        let endpoint = format!("/projects/{}", urlencoding::encode(&key));
        self.get(&endpoint).await
    }
}

impl Default for DepsDevClient {
    fn default() -> Self {
        Self::new()
    }
}
