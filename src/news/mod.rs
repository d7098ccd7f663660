//! Headline briefings from NewsAPI, enabled by `NEWSAPI_KEY`.
//!
//! Like web search this is best effort: failures become a short apology in
//! the reply instead of an error page.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ApiKey;

pub const DEFAULT_ENDPOINT: &str = "https://newsapi.org/v2";
pub const NOT_CONFIGURED: &str = "News API key not configured. Cannot fetch news.";
const NO_HEADLINES: &str = "No news headlines found for your request.";
const FETCH_FAILED: &str = "An error occurred while fetching news. Please try again later.";
const MAX_HEADLINES: usize = 5;
const NEWS_TIMEOUT: Duration = Duration::from_secs(8);
const HOME_COUNTRY: &str = "in";

/// NewsAPI top-headline categories the tutor asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    General,
    Technology,
    Business,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Technology => "technology",
            Self::Business => "business",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub title: String,
    pub source: String,
}

#[derive(Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Deserialize)]
struct Article {
    title: Option<String>,
    source: Option<ArticleSource>,
}

#[derive(Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

impl From<Article> for Headline {
    fn from(article: Article) -> Self {
        Self {
            title: article.title.unwrap_or_else(|| "No Title".to_owned()),
            source: article
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown Source".to_owned()),
        }
    }
}

#[derive(Clone)]
pub struct NewsClient {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
}

impl NewsClient {
    pub fn new(api_key: &ApiKey) -> reqwest::Result<Self> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    /// Same as [`NewsClient::new`] against a different API root.
    pub fn with_endpoint(api_key: &ApiKey, endpoint: &str) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(NEWS_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            api_key: api_key.clone(),
        })
    }

    /// Top headlines for `country`, `category` and `language`.
    pub async fn top_headlines(
        &self,
        country: &str,
        category: Category,
        language: &str,
    ) -> reqwest::Result<Vec<Headline>> {
        let body: HeadlinesResponse = self
            .client
            .get(format!("{}/top-headlines", self.endpoint))
            .header("X-Api-Key", self.api_key.expose())
            .query(&[
                ("country", country),
                ("category", category.as_str()),
                ("language", language),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.articles.into_iter().map(Headline::from).collect())
    }

    /// A formatted briefing in the student's language, falling back to US
    /// English headlines when there are none.
    pub async fn briefing(&self, category: Category, language: &str) -> String {
        let headlines = match self.top_headlines(HOME_COUNTRY, category, language).await {
            Ok(headlines) if headlines.is_empty() => {
                debug!(language, category = category.as_str(), "no headlines, falling back to English");
                self.top_headlines("us", Category::General, "en").await
            }
            other => other,
        };

        match headlines {
            Ok(headlines) => format_headlines(&headlines),
            Err(e) => {
                warn!(error = %e.without_url(), "news fetch failed");
                FETCH_FAILED.to_owned()
            }
        }
    }
}

/// Renders up to five headlines as a numbered markdown list.
pub fn format_headlines(headlines: &[Headline]) -> String {
    if headlines.is_empty() {
        return NO_HEADLINES.to_owned();
    }
    let lines: Vec<String> = headlines
        .iter()
        .take(MAX_HEADLINES)
        .enumerate()
        .map(|(i, h)| format!("**{}. {}** (Source: {})", i + 1, h.title, h.source))
        .collect();
    format!("Top Headlines:\n{}", lines.join("\n"))
}
