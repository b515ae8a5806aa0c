//! PyPI registry adapter.
//!
//! Data sources:
//! - Package metadata: `https://pypi.org/pypi/{package}/json`
//! - Download stats: `https://pypistats.org/api/packages/{package}/recent`
//! - Ranked listing: the top-pypi-packages 30-day dataset, with a curated
//!   fallback when it is unreachable.

use crate::{registry_client, AdapterError, RegistryAdapter, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use pkgpulse_core::{Ecosystem, InstallStats, PackageMetadata};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

const PYPI_URL: &str = "https://pypi.org/pypi";
const STATS_URL: &str = "https://pypistats.org/api";
const TOP_PACKAGES_URL: &str =
    "https://hugovk.github.io/top-pypi-packages/top-pypi-packages-30-days.json";

lazy_static! {
    static ref NAME_SEPARATORS: Regex = Regex::new(r"[-_.]+").unwrap();
    static ref DEP_NAME: Regex = Regex::new(r"^([a-zA-Z0-9][-a-zA-Z0-9._]*)").unwrap();
    static ref KEYWORD_SPLIT: Regex = Regex::new(r"[,\s]+").unwrap();
}

/// Canonicalize a PyPI name: lowercase, `[-_.]+` collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(name, "-").to_lowercase()
}

pub struct PypiAdapter {
    client: reqwest::Client,
    pypi_url: String,
    stats_url: String,
    top_packages_url: String,
}

impl PypiAdapter {
    pub fn new() -> Self {
        Self {
            client: registry_client(),
            pypi_url: PYPI_URL.to_string(),
            stats_url: STATS_URL.to_string(),
            top_packages_url: TOP_PACKAGES_URL.to_string(),
        }
    }

    pub fn with_base_urls(
        pypi_url: impl Into<String>,
        stats_url: impl Into<String>,
        top_packages_url: impl Into<String>,
    ) -> Self {
        Self {
            client: registry_client(),
            pypi_url: pypi_url.into(),
            stats_url: stats_url.into(),
            top_packages_url: top_packages_url.into(),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        match response.status().as_u16() {
            200 => Ok(response.json::<Value>().await?),
            status => Err(AdapterError::Status(status)),
        }
    }

    fn extract_repo_url(info: &Value) -> Option<String> {
        let looks_like_repo = |url: &str| {
            url.contains("github.com") || url.contains("gitlab.com") || url.contains("bitbucket.org")
        };

        if let Some(project_urls) = info.get("project_urls").and_then(Value::as_object) {
            // Priority keys first, then anything that looks like a forge URL.
            for key in [
                "Source",
                "Source Code",
                "Repository",
                "GitHub",
                "Code",
                "Homepage",
                "source",
                "repository",
                "github",
            ] {
                if let Some(url) = project_urls.get(key).and_then(Value::as_str) {
                    if looks_like_repo(url) {
                        return Some(url.to_string());
                    }
                }
            }
            for url in project_urls.values().filter_map(Value::as_str) {
                if looks_like_repo(url) {
                    return Some(url.to_string());
                }
            }
        }

        let homepage = info.get("home_page").and_then(Value::as_str).unwrap_or("");
        if looks_like_repo(homepage) {
            return Some(homepage.to_string());
        }
        None
    }

    fn extract_license(info: &Value) -> Option<String> {
        if let Some(license) = info.get("license").and_then(Value::as_str) {
            let trimmed = license.trim();
            // Some packages put the whole license text in this field.
            if !trimmed.is_empty() && trimmed.to_uppercase() != "UNKNOWN" && trimmed.len() <= 100 {
                return Some(trimmed.to_string());
            }
        }
        info.get("classifiers")
            .and_then(Value::as_array)
            .and_then(|classifiers| {
                classifiers
                    .iter()
                    .filter_map(Value::as_str)
                    .find_map(|c| c.strip_prefix("License :: OSI Approved :: "))
                    .map(String::from)
            })
    }

    fn parse_keywords(info: &Value) -> Vec<String> {
        match info.get("keywords") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            Some(Value::String(s)) => KEYWORD_SPLIT
                .split(s)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect(),
            _ => vec![],
        }
    }

    /// Dependency names from `requires_dist`, with extras skipped and names
    /// canonicalized.
    fn parse_dependencies(info: &Value) -> Vec<String> {
        let Some(requires) = info.get("requires_dist").and_then(Value::as_array) else {
            return vec![];
        };
        let mut deps: Vec<String> = Vec::new();
        for req in requires.iter().filter_map(Value::as_str) {
            if req.contains("extra ==") || req.contains("extra==") {
                continue;
            }
            if let Some(m) = DEP_NAME.captures(req) {
                let name = normalize_name(&m[1]);
                if !deps.contains(&name) {
                    deps.push(name);
                }
            }
        }
        deps
    }

    fn fallback_packages() -> Vec<String> {
        [
            "numpy", "pandas", "scipy", "matplotlib", "scikit-learn",
            "tensorflow", "torch", "seaborn", "plotly", "jupyter", "ipython",
            "django", "flask", "fastapi", "starlette", "aiohttp", "httpx",
            "requests", "urllib3", "certifi", "click", "typer", "rich",
            "tqdm", "colorama", "pyyaml", "python-dotenv", "pydantic",
            "attrs", "pytest", "coverage", "hypothesis", "tox", "black",
            "ruff", "mypy", "pylint", "flake8", "isort", "setuptools",
            "wheel", "twine", "sqlalchemy", "psycopg2", "redis", "pymongo",
            "alembic", "asyncpg", "boto3", "botocore", "paramiko", "celery",
            "cryptography", "pyjwt", "bcrypt", "beautifulsoup4", "lxml",
            "jsonschema", "orjson", "msgpack", "protobuf", "grpcio",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for PypiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryAdapter for PypiAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    async fn list_packages(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let mut packages = match self.fetch_json(&self.top_packages_url).await {
            Ok(data) => data
                .get("rows")
                .and_then(Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| r.get("project").and_then(Value::as_str))
                        .map(String::from)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_else(Self::fallback_packages),
            Err(e) => {
                warn!("top-packages dataset unreachable, using fallback list: {e}");
                Self::fallback_packages()
            }
        };
        if let Some(limit) = limit {
            packages.truncate(limit);
        }
        Ok(packages)
    }

    async fn get_metadata(&self, name: &str) -> Result<PackageMetadata> {
        let normalized = normalize_name(name);
        let url = format!("{}/{}/json", self.pypi_url, normalized);
        let data = self.fetch_json(&url).await.map_err(|e| match e {
            AdapterError::Status(404) => AdapterError::PackageNotFound {
                ecosystem: Ecosystem::Pypi,
                name: name.to_string(),
            },
            other => other,
        })?;

        let empty = Value::Object(Default::default());
        let info = data.get("info").unwrap_or(&empty);

        debug!(package = %normalized, "fetched pypi metadata");

        Ok(PackageMetadata {
            ecosystem: Some(Ecosystem::Pypi),
            name: info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&normalized)
                .to_string(),
            description: info
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            version: info
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            homepage: info
                .get("home_page")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            repository_url: Self::extract_repo_url(info),
            license: Self::extract_license(info),
            keywords: Self::parse_keywords(info),
            dependencies: Self::parse_dependencies(info),
            pypi_author: info
                .get("author")
                .or_else(|| info.get("maintainer"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            pypi_author_email: info
                .get("author_email")
                .or_else(|| info.get("maintainer_email"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            pypi_requires_python: info
                .get("requires_python")
                .and_then(Value::as_str)
                .map(String::from),
            ..Default::default()
        })
    }

    async fn get_install_stats(&self, name: &str) -> Result<Option<InstallStats>> {
        let url = format!("{}/packages/{}/recent", self.stats_url, normalize_name(name));
        let data = match self.fetch_json(&url).await {
            Ok(data) => data,
            Err(_) => return Ok(None),
        };
        let month = data
            .pointer("/data/last_month")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(Some(InstallStats {
            downloads_last_30d: Some(month),
            downloads_last_90d: Some(month * 3),
            downloads_last_365d: Some(month * 12),
            dependent_packages: None,
            estimated: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn name_normalization_collapses_separators() {
        assert_eq!(normalize_name("Django"), "django");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("my__weird..name"), "my-weird-name");
    }

    #[test]
    fn dependencies_skip_extras_and_normalize() {
        let info = serde_json::json!({
            "requires_dist": [
                "requests (>=2.0)",
                "typing_extensions; python_version < '3.10'",
                "pytest; extra == 'test'",
            ]
        });
        let deps = PypiAdapter::parse_dependencies(&info);
        assert_eq!(deps, vec!["requests", "typing-extensions"]);
    }

    #[test]
    fn license_falls_back_to_classifier() {
        let info = serde_json::json!({
            "license": "",
            "classifiers": ["License :: OSI Approved :: MIT License"]
        });
        assert_eq!(
            PypiAdapter::extract_license(&info).as_deref(),
            Some("MIT License")
        );
    }

    #[test]
    fn overlong_license_text_is_dropped() {
        let info = serde_json::json!({"license": "x".repeat(500), "classifiers": []});
        assert_eq!(PypiAdapter::extract_license(&info), None);
    }

    #[tokio::test]
    async fn metadata_prefers_project_urls_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flask/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "info": {
                    "name": "Flask",
                    "summary": "A simple framework.",
                    "version": "3.0.0",
                    "home_page": "https://flask.palletsprojects.com/",
                    "project_urls": {
                        "Documentation": "https://flask.palletsprojects.com/",
                        "Source": "https://github.com/pallets/flask"
                    },
                    "license": "BSD-3-Clause",
                    "requires_python": ">=3.8"
                }
            })))
            .mount(&server)
            .await;

        let adapter = PypiAdapter::with_base_urls(server.uri(), server.uri(), server.uri());
        let meta = adapter.get_metadata("Flask").await.unwrap();
        assert_eq!(
            meta.repository_url.as_deref(),
            Some("https://github.com/pallets/flask")
        );
        assert_eq!(meta.pypi_requires_python.as_deref(), Some(">=3.8"));
    }

    #[tokio::test]
    async fn listing_falls_back_when_dataset_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = PypiAdapter::with_base_urls(server.uri(), server.uri(), server.uri());
        let packages = adapter.list_packages(Some(5)).await.unwrap();
        assert_eq!(packages.len(), 5);
        assert_eq!(packages[0], "numpy");
    }
}
