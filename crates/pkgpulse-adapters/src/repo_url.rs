//! Repository URL parsing shared by all adapters.

use lazy_static::lazy_static;
use pkgpulse_core::{Platform, RepoRef};
use regex::Regex;

lazy_static! {
    static ref GITHUB_HTTP: Regex = Regex::new(
        r"^(?:https?://)?(?:www\.)?github\.com/([^/]+)/([^/.\s]+?)(?:\.git)?(?:/(?:tree|blob)/[^/]+(?:/(.+))?)?/?$"
    )
    .unwrap();
    static ref GITHUB_SSH: Regex =
        Regex::new(r"^git@github\.com:([^/]+)/([^/.\s]+?)(?:\.git)?$").unwrap();
    static ref GITLAB_HTTP: Regex = Regex::new(
        r"^(?:https?://)?(?:www\.)?gitlab\.com/([^/]+)/([^/.\s]+?)(?:\.git)?(?:/(?:tree|blob)/.+)?/?$"
    )
    .unwrap();
    static ref GITLAB_SSH: Regex =
        Regex::new(r"^git@gitlab\.com:([^/]+)/([^/.\s]+?)(?:\.git)?$").unwrap();
    static ref BITBUCKET_HTTP: Regex = Regex::new(
        r"^(?:https?://)?(?:www\.)?bitbucket\.org/([^/]+)/([^/.\s]+?)(?:\.git)?/?$"
    )
    .unwrap();
}

/// Strip registry URL noise before parsing: `git+` prefixes, `git://`
/// schemes, trailing `.git`, and forge shorthand (`github:owner/repo`,
/// `gitlab:owner/repo`).
pub fn normalize_repo_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if let Some(rest) = url.strip_prefix("git+") {
        url = rest.to_string();
    }
    if let Some(rest) = url.strip_prefix("git://") {
        url = format!("https://{rest}");
    }
    if let Some(rest) = url.strip_suffix(".git") {
        url = rest.to_string();
    }
    if let Some(rest) = url.strip_prefix("github:") {
        url = format!("https://github.com/{rest}");
    } else if let Some(rest) = url.strip_prefix("gitlab:") {
        url = format!("https://gitlab.com/{rest}");
    }
    url
}

/// Parse a repository URL into a `RepoRef`.
///
/// Accepts GitHub, GitLab, and Bitbucket https/ssh forms, with `tree/` or
/// `blob/` branch suffixes folded into the subpath.
pub fn parse_repo_url(url: &str) -> Option<RepoRef> {
    let url = normalize_repo_url(url);
    if url.is_empty() {
        return None;
    }

    for re in [&*GITHUB_HTTP, &*GITHUB_SSH] {
        if let Some(caps) = re.captures(&url) {
            let mut r = RepoRef::new(
                Platform::Github,
                caps.get(1)?.as_str(),
                caps.get(2)?.as_str(),
            );
            r.subpath = caps.get(3).map(|m| m.as_str().to_string());
            return Some(r);
        }
    }

    for re in [&*GITLAB_HTTP, &*GITLAB_SSH] {
        if let Some(caps) = re.captures(&url) {
            return Some(RepoRef::new(
                Platform::Gitlab,
                caps.get(1)?.as_str(),
                caps.get(2)?.as_str(),
            ));
        }
    }

    if let Some(caps) = BITBUCKET_HTTP.captures(&url) {
        return Some(RepoRef::new(
            Platform::Bitbucket,
            caps.get(1)?.as_str(),
            caps.get(2)?.as_str(),
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_github_url() {
        let r = parse_repo_url("https://github.com/lodash/lodash").unwrap();
        assert_eq!(r.platform, Platform::Github);
        assert_eq!(r.owner, "lodash");
        assert_eq!(r.repo, "lodash");
        assert_eq!(r.subpath, None);
    }

    #[test]
    fn strips_git_plus_and_dot_git() {
        let r = parse_repo_url("git+https://github.com/expressjs/express.git").unwrap();
        assert_eq!(r.owner, "expressjs");
        assert_eq!(r.repo, "express");
    }

    #[test]
    fn rewrites_git_scheme_to_https() {
        let r = parse_repo_url("git://github.com/caolan/async.git").unwrap();
        assert_eq!(r.platform, Platform::Github);
        assert_eq!(r.owner, "caolan");
    }

    #[test]
    fn expands_forge_shorthand() {
        let gh = parse_repo_url("github:sindresorhus/ora").unwrap();
        assert_eq!(gh.platform, Platform::Github);
        assert_eq!(gh.owner, "sindresorhus");
        let gl = parse_repo_url("gitlab:gitlab-org/gitlab").unwrap();
        assert_eq!(gl.platform, Platform::Gitlab);
    }

    #[test]
    fn folds_tree_suffix_into_subpath() {
        let r = parse_repo_url("https://github.com/babel/babel/tree/main/packages/babel-core")
            .unwrap();
        assert_eq!(r.repo, "babel");
        assert_eq!(r.subpath.as_deref(), Some("packages/babel-core"));
    }

    #[test]
    fn parses_ssh_form() {
        let r = parse_repo_url("git@github.com:torvalds/linux.git").unwrap();
        assert_eq!(r.owner, "torvalds");
        assert_eq!(r.repo, "linux");
    }

    #[test]
    fn parses_gitlab_and_bitbucket() {
        let gl = parse_repo_url("https://gitlab.com/libeigen/eigen").unwrap();
        assert_eq!(gl.platform, Platform::Gitlab);
        let bb = parse_repo_url("https://bitbucket.org/atlassian/jira").unwrap();
        assert_eq!(bb.platform, Platform::Bitbucket);
    }

    #[test]
    fn rejects_non_forge_urls() {
        assert!(parse_repo_url("https://example.com/docs").is_none());
        assert!(parse_repo_url("").is_none());
    }
}
