//! Package identity, registry metadata, and repository references.

use serde::{Deserialize, Serialize};

/// Package ecosystems known to the pipeline.
///
/// `Crates` is modeled for OSV/deps.dev mappings but has no registry adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Homebrew,
    Npm,
    Pypi,
    Crates,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Homebrew => "homebrew",
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Crates => "crates",
        }
    }

    /// Parse a user-supplied ecosystem name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "homebrew" | "brew" => Some(Ecosystem::Homebrew),
            "npm" => Some(Ecosystem::Npm),
            "pypi" | "pip" => Some(Ecosystem::Pypi),
            "crates" | "crates.io" | "cargo" => Some(Ecosystem::Crates),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable package identity: `(ecosystem, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub ecosystem: Ecosystem,
    pub name: String,
}

impl PackageRef {
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>) -> Self {
        Self {
            ecosystem,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ecosystem, self.name)
    }
}

/// Source code hosting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Github,
    Gitlab,
    Bitbucket,
    Other,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Github => "github",
            Platform::Gitlab => "gitlab",
            Platform::Bitbucket => "bitbucket",
            Platform::Other => "other",
        }
    }
}

/// Reference to a source repository, derived once per package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub platform: Platform,
    pub owner: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl RepoRef {
    pub fn new(platform: Platform, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            platform,
            owner: owner.into(),
            repo: repo.into(),
            subpath: None,
        }
    }

    /// Canonical browse URL; pure function of the fields.
    pub fn url(&self) -> String {
        let base = match self.platform {
            Platform::Github => "https://github.com",
            Platform::Gitlab => "https://gitlab.com",
            Platform::Bitbucket => "https://bitbucket.org",
            Platform::Other => "",
        };
        format!("{}/{}/{}", base, self.owner, self.repo)
    }
}

/// Ecosystem-normalized package metadata.
///
/// The `npm_*` / `pypi_*` extensions are populated only by their adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub ecosystem: Option<Ecosystem>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm_maintainers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm_maintainer_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_types: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_scoped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi_author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi_requires_python: Option<String>,
}

/// Download/install statistics.
///
/// When only a 30-day window is exposed upstream, the 90/365-day values are
/// synthesized (×3 / ×12) and `estimated` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_last_30d: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_last_90d: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_last_365d: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent_packages: Option<u64>,
    #[serde(default)]
    pub estimated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecosystem_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Ecosystem::Pypi).unwrap(), "\"pypi\"");
        assert_eq!(
            serde_json::to_string(&Ecosystem::Homebrew).unwrap(),
            "\"homebrew\""
        );
    }

    #[test]
    fn ecosystem_parse_aliases() {
        assert_eq!(Ecosystem::parse("PyPI"), Some(Ecosystem::Pypi));
        assert_eq!(Ecosystem::parse("brew"), Some(Ecosystem::Homebrew));
        assert_eq!(Ecosystem::parse("gems"), None);
    }

    #[test]
    fn repo_ref_url_is_pure() {
        let r = RepoRef::new(Platform::Github, "lodash", "lodash");
        assert_eq!(r.url(), "https://github.com/lodash/lodash");
        let g = RepoRef::new(Platform::Gitlab, "libeigen", "eigen");
        assert_eq!(g.url(), "https://gitlab.com/libeigen/eigen");
    }

    #[test]
    fn package_ref_display() {
        let p = PackageRef::new(Ecosystem::Npm, "@babel/core");
        assert_eq!(p.to_string(), "npm/@babel/core");
    }
}
