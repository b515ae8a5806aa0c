//! Package registry adapters
//!
//! Each adapter normalizes one package registry into the shared schema:
//! a popularity-ordered listing, per-package metadata, install statistics,
//! and a source repository reference.
//!
//! Adapters produce identical `PackageRef` identities across runs for the
//! same upstream package.

use async_trait::async_trait;
use pkgpulse_core::{Ecosystem, InstallStats, PackageMetadata, RepoRef};
use std::time::Duration;
use thiserror::Error;

pub mod homebrew;
pub mod npm;
pub mod pypi;
pub mod repo_url;

pub use homebrew::HomebrewAdapter;
pub use npm::NpmAdapter;
pub use pypi::PypiAdapter;
pub use repo_url::{normalize_repo_url, parse_repo_url};

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("package '{name}' not found in {ecosystem}")]
    PackageNotFound { ecosystem: Ecosystem, name: String },

    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected registry response: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("registry returned HTTP {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Shared HTTP client configuration for registry adapters.
pub(crate) fn registry_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("pkgpulse/0.4")
        .build()
        .unwrap_or_default()
}

/// The contract every registry adapter implements.
#[async_trait]
pub trait RegistryAdapter: Send + Sync {
    /// The ecosystem this adapter handles.
    fn ecosystem(&self) -> Ecosystem;

    /// Package names ordered by popularity proxy (downloads/installs),
    /// stable within one refresh.
    async fn list_packages(&self, limit: Option<usize>) -> Result<Vec<String>>;

    /// Normalized metadata, or `PackageNotFound`.
    async fn get_metadata(&self, name: &str) -> Result<PackageMetadata>;

    /// Install statistics, if the registry exposes any.
    async fn get_install_stats(&self, name: &str) -> Result<Option<InstallStats>>;

    /// Extract a source repository reference from metadata.
    ///
    /// The default implementation parses common URL patterns; adapters
    /// override for registry-specific shorthands.
    fn get_source_repo(&self, metadata: &PackageMetadata) -> Option<RepoRef> {
        let url = metadata
            .repository_url
            .as_deref()
            .or(metadata.homepage.as_deref())?;
        parse_repo_url(url)
    }
}

/// Build the adapter for an ecosystem, or `None` for ecosystems without a
/// registry adapter (crates is modeled but not fetched).
pub fn adapter_for(ecosystem: Ecosystem) -> Option<Box<dyn RegistryAdapter>> {
    match ecosystem {
        Ecosystem::Homebrew => Some(Box::new(HomebrewAdapter::new())),
        Ecosystem::Npm => Some(Box::new(NpmAdapter::new())),
        Ecosystem::Pypi => Some(Box::new(PypiAdapter::new())),
        Ecosystem::Crates => None,
    }
}
