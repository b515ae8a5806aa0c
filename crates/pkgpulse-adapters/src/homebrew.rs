//! Homebrew registry adapter.
//!
//! Data sources:
//! - Formula list: `https://formulae.brew.sh/api/formula.json`
//! - Per-formula: `https://formulae.brew.sh/api/formula/{name}.json`
//! - 30-day installs: `https://formulae.brew.sh/api/analytics/install/30d.json`

use crate::{registry_client, AdapterError, RegistryAdapter, Result};
use async_trait::async_trait;
use pkgpulse_core::{Ecosystem, InstallStats, PackageMetadata};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

const BASE_URL: &str = "https://formulae.brew.sh/api";

pub struct HomebrewAdapter {
    client: reqwest::Client,
    base_url: String,
    analytics_cache: Mutex<Option<HashMap<String, u64>>>,
}

impl HomebrewAdapter {
    pub fn new() -> Self {
        Self {
            client: registry_client(),
            base_url: BASE_URL.to_string(),
            analytics_cache: Mutex::new(None),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: registry_client(),
            base_url: base_url.into(),
            analytics_cache: Mutex::new(None),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        match response.status().as_u16() {
            200 => Ok(response.json::<Value>().await?),
            status => Err(AdapterError::Status(status)),
        }
    }

    /// 30-day install analytics, cached for the adapter's lifetime.
    /// Counts arrive comma-grouped ("1,234,567").
    async fn load_analytics(&self) -> Result<HashMap<String, u64>> {
        let mut cache = self.analytics_cache.lock().await;
        if let Some(ref analytics) = *cache {
            return Ok(analytics.clone());
        }

        let url = format!("{}/analytics/install/30d.json", self.base_url);
        let data = self.fetch_json(&url).await?;

        let mut analytics = HashMap::new();
        if let Some(items) = data.get("items").and_then(Value::as_array) {
            for item in items {
                let Some(name) = item.get("formula").and_then(Value::as_str) else {
                    continue;
                };
                let count = item
                    .get("count")
                    .map(|c| match c {
                        Value::String(s) => s.replace(',', "").parse::<u64>().unwrap_or(0),
                        Value::Number(n) => n.as_u64().unwrap_or(0),
                        _ => 0,
                    })
                    .unwrap_or(0);
                analytics.insert(name.to_string(), count);
            }
        }

        *cache = Some(analytics.clone());
        Ok(analytics)
    }

    /// Repository discovery: homepage, then the head (git clone) URL, then
    /// the stable tarball URL.
    fn find_repository_url(data: &Value) -> Option<String> {
        let homepage = data.get("homepage").and_then(Value::as_str).unwrap_or("");
        if homepage.contains("github.com") {
            return Some(homepage.to_string());
        }

        let head_url = data
            .pointer("/urls/head/url")
            .and_then(Value::as_str)
            .unwrap_or("");
        if head_url.contains("github.com") {
            return Some(head_url.trim_end_matches(".git").to_string());
        }

        let stable_url = data
            .pointer("/urls/stable/url")
            .and_then(Value::as_str)
            .unwrap_or("");
        if stable_url.contains("github.com") {
            // e.g. https://github.com/owner/repo/archive/refs/tags/v1.0.tar.gz
            let parts: Vec<&str> = stable_url.split('/').collect();
            if parts.len() >= 5 && parts[2] == "github.com" {
                return Some(format!("https://github.com/{}/{}", parts[3], parts[4]));
            }
        }
        None
    }
}

impl Default for HomebrewAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryAdapter for HomebrewAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Homebrew
    }

    async fn list_packages(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let analytics = self.load_analytics().await?;

        let url = format!("{}/formula.json", self.base_url);
        let formulas = self.fetch_json(&url).await?;

        let mut names: Vec<String> = formulas
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|f| f.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        // Most installed first, name for ties.
        names.sort_by(|a, b| {
            let ca = analytics.get(a).copied().unwrap_or(0);
            let cb = analytics.get(b).copied().unwrap_or(0);
            cb.cmp(&ca).then_with(|| a.cmp(b))
        });

        if let Some(limit) = limit {
            names.truncate(limit);
        }
        Ok(names)
    }

    async fn get_metadata(&self, name: &str) -> Result<PackageMetadata> {
        let url = format!("{}/formula/{}.json", self.base_url, name);
        let data = self.fetch_json(&url).await.map_err(|e| match e {
            AdapterError::Status(404) => AdapterError::PackageNotFound {
                ecosystem: Ecosystem::Homebrew,
                name: name.to_string(),
            },
            other => other,
        })?;

        let version = data
            .pointer("/versions/stable")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .or_else(|| data.pointer("/versions/head").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let dependencies: Vec<String> = data
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| match d {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(o) => {
                            o.get("name").and_then(Value::as_str).map(String::from)
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(formula = name, version = %version, "fetched homebrew metadata");

        Ok(PackageMetadata {
            ecosystem: Some(Ecosystem::Homebrew),
            name: data
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            description: data
                .get("desc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            version,
            homepage: data.get("homepage").and_then(Value::as_str).map(String::from),
            repository_url: Self::find_repository_url(&data),
            license: data.get("license").and_then(Value::as_str).map(String::from),
            keywords: vec![],
            dependencies,
            ..Default::default()
        })
    }

    async fn get_install_stats(&self, name: &str) -> Result<Option<InstallStats>> {
        let analytics = self.load_analytics().await?;
        let Some(count) = analytics.get(name).copied() else {
            return Ok(None);
        };
        Ok(Some(InstallStats {
            downloads_last_30d: Some(count),
            downloads_last_90d: None,
            downloads_last_365d: None,
            dependent_packages: None,
            estimated: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn repository_from_stable_tarball_url() {
        let data = serde_json::json!({
            "homepage": "https://www.gnu.org/software/wget/",
            "urls": {
                "stable": {"url": "https://github.com/mirror/wget/archive/refs/tags/v1.24.tar.gz"}
            }
        });
        assert_eq!(
            HomebrewAdapter::find_repository_url(&data).as_deref(),
            Some("https://github.com/mirror/wget")
        );
    }

    #[test]
    fn repository_prefers_homepage_then_head() {
        let data = serde_json::json!({
            "homepage": "https://github.com/git/git",
            "urls": {"head": {"url": "https://github.com/git/git.git"}}
        });
        assert_eq!(
            HomebrewAdapter::find_repository_url(&data).as_deref(),
            Some("https://github.com/git/git")
        );

        let head_only = serde_json::json!({
            "homepage": "https://git-scm.com",
            "urls": {"head": {"url": "https://github.com/git/git.git"}}
        });
        assert_eq!(
            HomebrewAdapter::find_repository_url(&head_only).as_deref(),
            Some("https://github.com/git/git")
        );
    }

    #[tokio::test]
    async fn listing_orders_by_install_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/analytics/install/30d.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"number": 1, "formula": "wget", "count": "1,234,567"},
                    {"number": 2, "formula": "git", "count": "900,000"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/formula.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "git"}, {"name": "wget"}, {"name": "zlib"}
            ])))
            .mount(&server)
            .await;

        let adapter = HomebrewAdapter::with_base_url(server.uri());
        let names = adapter.list_packages(None).await.unwrap();
        assert_eq!(names, vec!["wget", "git", "zlib"]);

        let stats = adapter.get_install_stats("wget").await.unwrap().unwrap();
        assert_eq!(stats.downloads_last_30d, Some(1_234_567));
        assert!(!stats.estimated);
    }
}
