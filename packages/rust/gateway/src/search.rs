//! Web search client (Brave Search API) for demand and grounding lookups.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use presswork_shared::{PressworkError, Result, SearchConfig, read_api_key};

const USER_AGENT: &str = concat!("Presswork/", env!("CARGO_PKG_VERSION"));

/// One web result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    /// Plain-text snippet (HTML stripped).
    pub snippet: String,
}

/// Results plus the engine's total-results estimate.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: u64,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
    #[serde(default, rename = "totalResults")]
    total_results: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

/// Thin client over the web-search endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PressworkError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env)?;
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Run one query, returning up to `count` results.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search(&self, query: &str, count: usize) -> Result<SearchResponse> {
        let count = count.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| PressworkError::Network(format!("search '{query}': {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PressworkError::Network(format!(
                "search '{query}': HTTP {status}"
            )));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| PressworkError::parse(format!("search '{query}': invalid response: {e}")))?;

        let web = body.web.unwrap_or(BraveWeb {
            results: Vec::new(),
            total_results: None,
        });
        let results: Vec<SearchResult> = web
            .results
            .into_iter()
            .map(|r| SearchResult {
                url: r.url,
                title: presswork_markdown::strip_html(&r.title),
                snippet: presswork_markdown::strip_html(&r.description),
            })
            .collect();

        debug!(results = results.len(), total = ?web.total_results, "search complete");

        Ok(SearchResponse {
            total_results: web.total_results.unwrap_or(0),
            results,
        })
    }
}
