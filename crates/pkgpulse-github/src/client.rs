//! Low-level GitHub REST client: bearer auth, pagination with per-endpoint
//! page caps, 404-as-absent, and rate-limit header capture.

use crate::error::{GitHubError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "2022-11-28";
pub(crate) const PAGE_SIZE: u32 = 100;

/// Remote rate-limit state captured from response headers.
///
/// Single writer (the fetcher), single reader (the daemon).
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub remaining: i64,
    pub limit: i64,
    pub reset: Option<DateTime<Utc>>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            remaining: 5000,
            limit: 5000,
            reset: None,
        }
    }
}

pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    rate_limit: Mutex<RateLimitState>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url("https://api.github.com", token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("pkgpulse/0.4")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token,
            rate_limit: Mutex::new(RateLimitState::default()),
        }
    }

    /// Current cached rate-limit state.
    pub fn rate_limit(&self) -> RateLimitState {
        self.rate_limit.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn capture_rate_limit(&self, response: &reqwest::Response) {
        let header_i64 = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
        };
        let remaining = header_i64("x-ratelimit-remaining");
        let limit = header_i64("x-ratelimit-limit");
        let reset = header_i64("x-ratelimit-reset").and_then(|e| Utc.timestamp_opt(e, 0).single());

        if let (Some(remaining), Ok(mut state)) = (remaining, self.rate_limit.lock()) {
            state.remaining = remaining;
            if let Some(limit) = limit {
                state.limit = limit;
            }
            if reset.is_some() {
                state.reset = reset;
            }
        }
    }

    /// GET a JSON endpoint. 404 is absence, not an error.
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .get(&url)
            .query(params)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await?;
        self.capture_rate_limit(&response);

        match response.status().as_u16() {
            200 => Ok(Some(response.json::<Value>().await?)),
            404 => {
                debug!(path, "not found");
                Ok(None)
            }
            status => {
                warn!(path, status, "unexpected status");
                Err(GitHubError::Status(status))
            }
        }
    }

    /// Read a paginated list endpoint up to `max_pages` pages of `PAGE_SIZE`.
    pub async fn get_paged(
        &self,
        path: &str,
        params: &[(&str, String)],
        max_pages: u32,
    ) -> Result<Vec<Value>> {
        let mut results = Vec::new();

        for page in 1..=max_pages {
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("per_page", PAGE_SIZE.to_string()));
            query.push(("page", page.to_string()));

            let Some(data) = self.get(path, &query).await? else {
                break;
            };
            let Some(items) = data.as_array() else {
                break;
            };
            if items.is_empty() {
                break;
            }
            let short_page = items.len() < PAGE_SIZE as usize;
            results.extend(items.iter().cloned());
            if short_page {
                break;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn not_found_is_absence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::with_base_url(server.uri(), None);
        let result = client.get("/repos/o/r", &[]).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn server_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = GitHubClient::with_base_url(server.uri(), None);
        assert!(client.get("/repos/o/r", &[]).await.is_err());
    }

    #[tokio::test]
    async fn rate_limit_headers_are_captured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .insert_header("x-ratelimit-remaining", "42")
                    .insert_header("x-ratelimit-limit", "5000")
                    .insert_header("x-ratelimit-reset", "1900000000"),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::with_base_url(server.uri(), None);
        client.get("/rate_limit", &[]).await.unwrap();
        let state = client.rate_limit();
        assert_eq!(state.remaining, 42);
        assert_eq!(state.limit, 5000);
        assert!(state.reset.is_some());
    }

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let server = MockServer::start().await;
        let page1: Vec<Value> = (0..100).map(|i| serde_json::json!({"n": i})).collect();
        let page2: Vec<Value> = (0..3).map(|i| serde_json::json!({"n": i})).collect();
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&page1))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&page2))
            .mount(&server)
            .await;

        let client = GitHubClient::with_base_url(server.uri(), None);
        let items = client.get_paged("/items", &[], 5).await.unwrap();
        assert_eq!(items.len(), 103);
    }
}
