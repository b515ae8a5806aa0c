//! npm registry adapter.
//!
//! Data sources:
//! - Package metadata: `https://registry.npmjs.org/{package}`
//! - Download stats: `https://api.npmjs.org/downloads/point/{period}/{package}`
//!
//! The registry exposes no ranked listing, so `list_packages` serves a
//! curated most-depended-upon set covering the critical infrastructure of
//! the ecosystem.

use crate::{registry_client, AdapterError, RegistryAdapter, Result};
use async_trait::async_trait;
use pkgpulse_core::{Ecosystem, InstallStats, PackageMetadata, Platform, RepoRef};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

const REGISTRY_URL: &str = "https://registry.npmjs.org";
const DOWNLOADS_URL: &str = "https://api.npmjs.org/downloads";

/// One published version as consumed by the supply-chain analyzer.
#[derive(Debug, Clone, Default)]
pub struct NpmVersionManifest {
    pub version: String,
    pub scripts: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub tarball_url: Option<String>,
    pub has_provenance: bool,
    pub provenance_verified: bool,
    pub publisher: Option<String>,
}

/// Supply-chain inputs extracted from one packument.
#[derive(Debug, Clone, Default)]
pub struct NpmSupplyInfo {
    pub current: NpmVersionManifest,
    pub previous: Option<NpmVersionManifest>,
    pub maintainers: Vec<String>,
}

pub struct NpmAdapter {
    client: reqwest::Client,
    registry_url: String,
    downloads_url: String,
}

impl NpmAdapter {
    pub fn new() -> Self {
        Self {
            client: registry_client(),
            registry_url: REGISTRY_URL.to_string(),
            downloads_url: DOWNLOADS_URL.to_string(),
        }
    }

    /// Override endpoints (for tests).
    pub fn with_base_urls(registry_url: impl Into<String>, downloads_url: impl Into<String>) -> Self {
        Self {
            client: registry_client(),
            registry_url: registry_url.into(),
            downloads_url: downloads_url.into(),
        }
    }

    /// Scoped names keep the `@scope/` prefix; the path separator is
    /// percent-encoded.
    fn encode_name(name: &str) -> String {
        name.replace('/', "%2F")
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        match response.status().as_u16() {
            200 => Ok(response.json::<Value>().await?),
            404 => Err(AdapterError::Status(404)),
            status => Err(AdapterError::Status(status)),
        }
    }

    async fn fetch_packument(&self, name: &str) -> Result<Value> {
        let url = format!("{}/{}", self.registry_url, Self::encode_name(name));
        self.fetch_json(&url).await.map_err(|e| match e {
            AdapterError::Status(404) => AdapterError::PackageNotFound {
                ecosystem: Ecosystem::Npm,
                name: name.to_string(),
            },
            other => other,
        })
    }

    fn extract_repo_url(repository: &Value) -> Option<String> {
        let url = match repository {
            Value::String(s) => s.clone(),
            Value::Object(o) => o.get("url")?.as_str()?.to_string(),
            _ => return None,
        };
        if url.is_empty() {
            return None;
        }
        Some(crate::normalize_repo_url(&url))
    }

    fn extract_license(data: &Value, version_data: &Value) -> Option<String> {
        let license = data
            .get("license")
            .filter(|v| !v.is_null())
            .or_else(|| version_data.get("license"))?;
        match license {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o
                .get("type")
                .or_else(|| o.get("name"))
                .and_then(|v| v.as_str())
                .map(String::from),
            Value::Array(items) => items.first().and_then(|first| match first {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o
                    .get("type")
                    .or_else(|| o.get("name"))
                    .and_then(|v| v.as_str())
                    .map(String::from),
                _ => None,
            }),
            _ => None,
        }
    }

    fn parse_version_manifest(version_data: &Value) -> NpmVersionManifest {
        let scripts = version_data
            .get("scripts")
            .and_then(Value::as_object)
            .map(|o| {
                o.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let dependencies: Vec<String> = version_data
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();

        let dist = version_data.get("dist");
        let tarball_url = dist
            .and_then(|d| d.get("tarball"))
            .and_then(Value::as_str)
            .map(String::from);
        let attestations = dist.and_then(|d| d.get("attestations"));
        let has_provenance = attestations.is_some();
        let provenance_verified = attestations
            .and_then(|a| a.get("provenance"))
            .and_then(|p| p.get("predicateType"))
            .and_then(Value::as_str)
            .is_some();

        let publisher = version_data
            .get("_npmUser")
            .and_then(|u| u.get("name"))
            .and_then(Value::as_str)
            .map(String::from);

        NpmVersionManifest {
            version: version_data
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            scripts,
            dependencies,
            tarball_url,
            has_provenance,
            provenance_verified,
            publisher,
        }
    }

    /// Pick the version published immediately before `latest` from the
    /// packument `time` map.
    fn previous_version(data: &Value, latest: &str) -> Option<String> {
        let time = data.get("time")?.as_object()?;
        let mut dated: Vec<(&String, &str)> = time
            .iter()
            .filter(|(k, _)| k.as_str() != "created" && k.as_str() != "modified")
            .filter_map(|(k, v)| v.as_str().map(|d| (k, d)))
            .collect();
        dated.sort_by_key(|(_, d)| d.to_string());
        let idx = dated.iter().position(|(v, _)| v.as_str() == latest)?;
        if idx == 0 {
            return None;
        }
        Some(dated[idx - 1].0.clone())
    }

    /// Everything the supply-chain analyzer consumes for one package.
    pub async fn get_supply_info(&self, name: &str) -> Result<NpmSupplyInfo> {
        let data = self.fetch_packument(name).await?;
        let latest = data
            .pointer("/dist-tags/latest")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let versions = data.get("versions").cloned().unwrap_or(Value::Null);

        let current = versions
            .get(&latest)
            .map(Self::parse_version_manifest)
            .unwrap_or_default();

        let previous = Self::previous_version(&data, &latest)
            .and_then(|prev| versions.get(&prev).map(Self::parse_version_manifest));

        let maintainers = data
            .get("maintainers")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(NpmSupplyInfo {
            current,
            previous,
            maintainers,
        })
    }

    /// Curated most-depended-upon packages; the order approximates
    /// dependent count.
    fn popular_packages() -> Vec<String> {
        [
            "lodash", "chalk", "commander", "debug", "uuid", "semver", "glob",
            "yargs", "fs-extra", "axios", "moment", "async", "underscore",
            "dotenv", "minimist", "rimraf", "mkdirp", "bluebird", "cross-env",
            "inquirer", "ora", "rxjs", "ws", "cheerio", "typescript",
            "webpack", "@babel/core", "eslint", "prettier", "jest", "mocha",
            "chai", "esbuild", "rollup", "postcss", "autoprefixer", "sass",
            "terser", "react", "react-dom", "vue", "@angular/core", "svelte",
            "preact", "next", "vite", "express", "koa", "fastify",
            "socket.io", "body-parser", "cors", "helmet", "morgan",
            "cookie-parser", "compression", "mongoose", "sequelize", "redis",
            "pg", "mysql2", "mongodb", "knex", "typeorm", "prisma", "graphql",
            "node-fetch", "got", "superagent", "form-data", "sinon", "nock",
            "supertest", "cypress", "puppeteer", "playwright", "jsdom",
            "@types/node", "@types/react", "@types/lodash", "@types/jest",
            "yargs-parser", "boxen", "execa", "cosmiconfig", "tslib",
            "source-map-support", "nodemon", "ts-node", "jsonwebtoken",
            "bcrypt", "crypto-js",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for NpmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryAdapter for NpmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    async fn list_packages(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let mut packages = Self::popular_packages();
        if let Some(limit) = limit {
            packages.truncate(limit);
        }
        Ok(packages)
    }

    async fn get_metadata(&self, name: &str) -> Result<PackageMetadata> {
        let data = self.fetch_packument(name).await?;

        let latest = data
            .pointer("/dist-tags/latest")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let empty = Value::Object(Default::default());
        let version_data = data
            .pointer(&format!("/versions/{latest}"))
            .unwrap_or(&empty);

        let repository = data
            .get("repository")
            .filter(|v| !v.is_null())
            .or_else(|| version_data.get("repository"))
            .cloned()
            .unwrap_or(Value::Null);
        let repository_url = Self::extract_repo_url(&repository);

        let maintainers: Vec<String> = data
            .get("maintainers")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let has_types = version_data.get("types").is_some()
            || version_data.get("typings").is_some()
            || version_data
                .get("main")
                .and_then(Value::as_str)
                .map(|m| m.ends_with(".d.ts"))
                .unwrap_or(false);

        let keywords = data
            .get("keywords")
            .or_else(|| version_data.get("keywords"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let dependencies = version_data
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();

        debug!(package = name, version = %latest, "fetched npm metadata");

        Ok(PackageMetadata {
            ecosystem: Some(Ecosystem::Npm),
            name: data
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            description: data
                .get("description")
                .or_else(|| version_data.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            version: latest,
            homepage: data
                .get("homepage")
                .or_else(|| version_data.get("homepage"))
                .and_then(Value::as_str)
                .map(String::from),
            repository_url,
            license: Self::extract_license(&data, version_data),
            keywords,
            dependencies,
            npm_maintainer_count: Some(maintainers.len()),
            npm_maintainers: Some(maintainers),
            has_types: Some(has_types),
            is_scoped: Some(name.starts_with('@')),
            ..Default::default()
        })
    }

    async fn get_install_stats(&self, name: &str) -> Result<Option<InstallStats>> {
        let url = format!(
            "{}/point/last-month/{}",
            self.downloads_url,
            Self::encode_name(name)
        );
        let data = match self.fetch_json(&url).await {
            Ok(data) => data,
            Err(_) => return Ok(None),
        };
        let month = data.get("downloads").and_then(Value::as_u64).unwrap_or(0);

        // The registry only exposes point windows; the longer windows are
        // synthesized and tagged as estimates.
        Ok(Some(InstallStats {
            downloads_last_30d: Some(month),
            downloads_last_90d: Some(month * 3),
            downloads_last_365d: Some(month * 12),
            dependent_packages: None,
            estimated: true,
        }))
    }

    fn get_source_repo(&self, metadata: &PackageMetadata) -> Option<RepoRef> {
        let url = metadata
            .repository_url
            .as_deref()
            .or(metadata.homepage.as_deref())?;

        let normalized = crate::normalize_repo_url(url);

        // Shorthand forms resolve before the generic parser.
        if let Some(rest) = url.strip_prefix("github:") {
            let mut parts = rest.splitn(2, '/');
            if let (Some(owner), Some(repo)) = (parts.next(), parts.next()) {
                return Some(RepoRef::new(Platform::Github, owner, repo));
            }
        }
        if let Some(rest) = url.strip_prefix("gitlab:") {
            let mut parts = rest.splitn(2, '/');
            if let (Some(owner), Some(repo)) = (parts.next(), parts.next()) {
                return Some(RepoRef::new(Platform::Gitlab, owner, repo));
            }
        }

        crate::parse_repo_url(&normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn packument(name: &str) -> Value {
        serde_json::json!({
            "name": name,
            "description": "Lodash modular utilities.",
            "dist-tags": {"latest": "4.17.21"},
            "homepage": "https://lodash.com/",
            "repository": {"type": "git", "url": "git+https://github.com/lodash/lodash.git"},
            "license": "MIT",
            "keywords": ["modules", "utilities"],
            "maintainers": [{"name": "jdalton"}, {"name": "mathias"}],
            "time": {
                "created": "2012-04-23T16:37:11.912Z",
                "4.17.20": "2020-08-13T16:53:54.152Z",
                "4.17.21": "2021-02-20T15:42:16.891Z",
                "modified": "2021-02-20T15:42:16.891Z"
            },
            "versions": {
                "4.17.20": {
                    "version": "4.17.20",
                    "scripts": {"test": "echo test"},
                    "dependencies": {},
                    "dist": {"tarball": "https://registry.npmjs.org/lodash/-/lodash-4.17.20.tgz"}
                },
                "4.17.21": {
                    "version": "4.17.21",
                    "main": "lodash.js",
                    "scripts": {"test": "echo test"},
                    "dependencies": {"minimist": "^1.0.0"},
                    "dist": {"tarball": "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz"},
                    "_npmUser": {"name": "bnjmnt4n"}
                }
            }
        })
    }

    #[tokio::test]
    async fn metadata_from_packument() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lodash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(packument("lodash")))
            .mount(&server)
            .await;

        let adapter = NpmAdapter::with_base_urls(server.uri(), server.uri());
        let meta = adapter.get_metadata("lodash").await.unwrap();
        assert_eq!(meta.version, "4.17.21");
        assert_eq!(meta.license.as_deref(), Some("MIT"));
        assert_eq!(meta.npm_maintainer_count, Some(2));
        assert_eq!(meta.is_scoped, Some(false));
        assert_eq!(
            meta.repository_url.as_deref(),
            Some("https://github.com/lodash/lodash")
        );
        assert_eq!(meta.dependencies, vec!["minimist".to_string()]);
    }

    #[tokio::test]
    async fn missing_package_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = NpmAdapter::with_base_urls(server.uri(), server.uri());
        let err = adapter.get_metadata("nope").await.unwrap_err();
        assert!(matches!(err, AdapterError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn supply_info_finds_previous_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lodash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(packument("lodash")))
            .mount(&server)
            .await;

        let adapter = NpmAdapter::with_base_urls(server.uri(), server.uri());
        let info = adapter.get_supply_info("lodash").await.unwrap();
        assert_eq!(info.current.version, "4.17.21");
        assert_eq!(info.current.publisher.as_deref(), Some("bnjmnt4n"));
        assert_eq!(info.previous.unwrap().version, "4.17.20");
        assert_eq!(info.maintainers, vec!["jdalton", "mathias"]);
    }

    #[tokio::test]
    async fn install_stats_are_estimated_beyond_30d() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/point/last-month/lodash"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"downloads": 1000, "package": "lodash"})),
            )
            .mount(&server)
            .await;

        let adapter = NpmAdapter::with_base_urls(server.uri(), server.uri());
        let stats = adapter.get_install_stats("lodash").await.unwrap().unwrap();
        assert_eq!(stats.downloads_last_30d, Some(1000));
        assert_eq!(stats.downloads_last_90d, Some(3000));
        assert_eq!(stats.downloads_last_365d, Some(12000));
        assert!(stats.estimated);
    }

    #[test]
    fn scoped_names_are_percent_encoded() {
        assert_eq!(NpmAdapter::encode_name("@babel/core"), "@babel%2Fcore");
    }

    #[test]
    fn source_repo_handles_shorthand() {
        let adapter = NpmAdapter::new();
        let meta = PackageMetadata {
            repository_url: Some("github:sindresorhus/ora".into()),
            ..Default::default()
        };
        let repo = adapter.get_source_repo(&meta).unwrap();
        assert_eq!(repo.platform, Platform::Github);
        assert_eq!(repo.owner, "sindresorhus");
    }
}
