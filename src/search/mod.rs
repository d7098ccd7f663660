//! Optional web search used to ground explanatory answers with sources.
//!
//! Backed by the Google Custom Search JSON API. Search is best effort: any
//! failure is logged and treated as "no sources", never surfaced to the user.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ApiKey, SearchConfig};

pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_RESULTS: usize = 3;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(8);

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
    engine_id: String,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> reqwest::Result<Self> {
        Self::with_endpoint(config, DEFAULT_ENDPOINT)
    }

    /// Same as [`SearchClient::new`] against a different endpoint.
    pub fn with_endpoint(config: &SearchConfig, endpoint: &str) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(SEARCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
        })
    }

    /// Returns up to `limit` results for `query`. Empty on any failure.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        // The API accepts 1..=10.
        let num = limit.min(10).to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("key", self.api_key.expose()),
                ("cx", self.engine_id.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "web search rejected");
                return Vec::new();
            }
            Err(e) => {
                // The URL carries the API key.
                warn!(error = %e.without_url(), "web search failed");
                return Vec::new();
            }
        };

        match response.json::<SearchResponse>().await {
            Ok(body) => {
                let mut items = body.items;
                items.truncate(limit);
                debug!(results = items.len(), "web search finished");
                items
            }
            Err(e) => {
                warn!(error = %e.without_url(), "web search returned an unreadable body");
                Vec::new()
            }
        }
    }
}
