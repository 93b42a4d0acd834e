//! Search providers behind the retrieval tools.
//!
//! [`SerpApiProvider`] talks to SerpAPI (bio, images, web) and GNews (news).
//! Missing credentials and upstream failures surface as `Tool` errors; the
//! registry converts those into tagged error outcomes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use parley_core::{ParleyError, Result};

use crate::freshness::{augment_query, select_date_filter};

const SERP_SEARCH_URL: &str = "https://serpapi.com/search.json";
const GNEWS_SEARCH_URL: &str = "https://gnews.io/api/v4/search";

/// One image search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageHit {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub source: String,
}

/// One news article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    pub source: String,
    pub image: String,
}

/// One organic web search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
}

/// External retrieval capabilities used by the tool registry.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short biography text. A "not found" answer is a success string.
    async fn bio(&self, subject: &str) -> Result<String>;

    async fn images(&self, subject: &str, max_results: usize) -> Result<Vec<ImageHit>>;

    async fn news(&self, topic: &str, max_items: usize) -> Result<Vec<NewsItem>>;

    /// Web search with freshness rewriting applied before dispatch.
    async fn web(&self, query: &str, num_results: usize) -> Result<Vec<WebHit>>;
}

// =============================================================================
// SerpAPI / GNews implementation
// =============================================================================

pub struct SerpApiProvider {
    http: reqwest::Client,
    serp_api_key: Option<String>,
    gnews_api_key: Option<String>,
}

impl SerpApiProvider {
    pub fn new(
        serp_api_key: Option<String>,
        gnews_api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            serp_api_key,
            gnews_api_key,
        }
    }

    fn serp_key(&self, what: &str) -> Result<&str> {
        self.serp_api_key
            .as_deref()
            .ok_or_else(|| ParleyError::Tool(format!("SerpAPI key not configured for {}", what)))
    }

    async fn fetch_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| ParleyError::Tool(format!("request failed: {}", e)))?;

        let status = response.status();
        debug!(%url, %status, "Provider response");
        if !status.is_success() {
            return Err(ParleyError::Tool(format!("API error ({})", status.as_u16())));
        }
        response
            .json()
            .await
            .map_err(|e| ParleyError::Tool(format!("malformed provider response: {}", e)))
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
    async fn bio(&self, subject: &str) -> Result<String> {
        info!(%subject, "Biography lookup");
        let key = self.serp_key("bio lookup")?;
        let params = [
            ("q", format!("{} biography who is", subject)),
            ("api_key", key.to_string()),
            ("engine", "google".to_string()),
            ("num", "5".to_string()),
        ];
        let data = self.fetch_json(SERP_SEARCH_URL, &params).await?;

        // Knowledge panel first, then the first organic snippet.
        let graph = &data["knowledge_graph"];
        if let Some(description) = graph["description"].as_str() {
            return Ok(match graph["title"].as_str() {
                Some(title) => format!("{}: {}", title, description),
                None => format!("Biography of {}: {}", subject, description),
            });
        }
        if let Some(first) = data["organic_results"].as_array().and_then(|r| r.first()) {
            let snippet = first["snippet"].as_str().unwrap_or("No snippet available");
            return Ok(format!("Biography of {}: {}", subject, snippet));
        }
        Ok(format!("No biography found for {}", subject))
    }

    async fn images(&self, subject: &str, max_results: usize) -> Result<Vec<ImageHit>> {
        info!(%subject, max_results, "Image search");
        let key = self.serp_key("image search")?;
        let params = [
            ("engine", "google_images".to_string()),
            ("q", subject.to_string()),
            ("num", max_results.to_string()),
            ("api_key", key.to_string()),
            ("safe", "active".to_string()),
        ];
        let data = self.fetch_json(SERP_SEARCH_URL, &params).await?;

        let mut hits = Vec::new();
        if let Some(items) = data["images_results"].as_array() {
            for img in items.iter().take(max_results) {
                // Entries without a full-size URL are useless downstream.
                let Some(url) = img["original"].as_str() else {
                    continue;
                };
                hits.push(ImageHit {
                    title: img["title"].as_str().unwrap_or("Untitled").to_string(),
                    url: url.to_string(),
                    thumbnail: img["thumbnail"].as_str().map(str::to_string),
                    source: img["source"].as_str().unwrap_or("Unknown").to_string(),
                });
            }
        }
        info!(%subject, count = hits.len(), "Image search complete");
        Ok(hits)
    }

    async fn news(&self, topic: &str, max_items: usize) -> Result<Vec<NewsItem>> {
        info!(%topic, max_items, "News lookup");
        let key = self
            .gnews_api_key
            .as_deref()
            .ok_or_else(|| ParleyError::Tool("GNews API key not configured".to_string()))?;
        let params = [
            ("q", topic.to_string()),
            ("max", max_items.to_string()),
            ("apikey", key.to_string()),
            ("lang", "en".to_string()),
            ("sortby", "publishedAt".to_string()),
        ];
        let data = self.fetch_json(GNEWS_SEARCH_URL, &params).await?;

        let mut items = Vec::new();
        if let Some(articles) = data["articles"].as_array() {
            for article in articles {
                let Some(title) = article["title"].as_str() else {
                    continue;
                };
                items.push(NewsItem {
                    title: title.to_string(),
                    url: article["url"].as_str().unwrap_or_default().to_string(),
                    description: article["description"].as_str().unwrap_or_default().to_string(),
                    published_at: article["publishedAt"].as_str().unwrap_or_default().to_string(),
                    source: article["source"]["name"]
                        .as_str()
                        .unwrap_or("Unknown")
                        .to_string(),
                    image: article["image"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
        info!(%topic, count = items.len(), "News lookup complete");
        Ok(items)
    }

    async fn web(&self, query: &str, num_results: usize) -> Result<Vec<WebHit>> {
        info!(%query, num_results, "Web search");
        let key = self.serp_key("web search")?;

        let enhanced = augment_query(query, chrono::Utc::now());
        let filter = select_date_filter(query);
        debug!(%enhanced, filter = filter.as_param(), "Freshness rewrite");

        let params = [
            ("q", enhanced.clone()),
            ("num", num_results.to_string()),
            ("api_key", key.to_string()),
            ("engine", "google".to_string()),
            ("gl", "in".to_string()),
            ("hl", "en".to_string()),
            ("tbs", filter.as_param().to_string()),
        ];
        let data = self.fetch_json(SERP_SEARCH_URL, &params).await?;

        let mut hits = Vec::new();
        if let Some(results) = data["organic_results"].as_array() {
            for result in results.iter().take(num_results) {
                let Some(title) = result["title"].as_str() else {
                    continue;
                };
                hits.push(WebHit {
                    title: title.to_string(),
                    url: result["link"].as_str().unwrap_or_default().to_string(),
                    snippet: result["snippet"].as_str().unwrap_or_default().to_string(),
                    source: result["source"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
        if hits.is_empty() {
            warn!(%enhanced, "Web search returned no usable results");
        }
        Ok(hits)
    }
}

// =============================================================================
// Mock provider
// =============================================================================

/// In-memory provider for tests. Responses are keyed by subject/topic/query;
/// unknown keys return empty results, and keys registered as failing return
/// a `Tool` error.
#[derive(Default)]
pub struct MockSearchProvider {
    bios: Mutex<HashMap<String, String>>,
    images: Mutex<HashMap<String, Vec<ImageHit>>>,
    news: Mutex<HashMap<String, Vec<NewsItem>>>,
    web: Mutex<HashMap<String, Vec<WebHit>>>,
    failing: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bio(&self, subject: &str, bio: &str) {
        self.bios
            .lock()
            .unwrap()
            .insert(subject.to_string(), bio.to_string());
    }

    pub fn set_images(&self, subject: &str, hits: Vec<ImageHit>) {
        self.images.lock().unwrap().insert(subject.to_string(), hits);
    }

    pub fn set_news(&self, topic: &str, items: Vec<NewsItem>) {
        self.news.lock().unwrap().insert(topic.to_string(), items);
    }

    pub fn set_web(&self, query: &str, hits: Vec<WebHit>) {
        self.web.lock().unwrap().insert(query.to_string(), hits);
    }

    /// Make any lookup for `key` fail with the given message.
    pub fn set_failing(&self, key: &str, message: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(key.to_string(), message.to_string());
    }

    /// Provider calls seen so far, as `"op:key"` strings.
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, op: &str, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{}:{}", op, key));
        if let Some(msg) = self.failing.lock().unwrap().get(key) {
            return Err(ParleyError::Tool(msg.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn bio(&self, subject: &str) -> Result<String> {
        self.check("bio", subject)?;
        Ok(self
            .bios
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_else(|| format!("No biography found for {}", subject)))
    }

    async fn images(&self, subject: &str, max_results: usize) -> Result<Vec<ImageHit>> {
        self.check("images", subject)?;
        let mut hits = self
            .images
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_default();
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn news(&self, topic: &str, max_items: usize) -> Result<Vec<NewsItem>> {
        self.check("news", topic)?;
        let mut items = self
            .news
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or_default();
        items.truncate(max_items);
        Ok(items)
    }

    async fn web(&self, query: &str, num_results: usize) -> Result<Vec<WebHit>> {
        self.check("web", query)?;
        let mut hits = self
            .web
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        hits.truncate(num_results);
        Ok(hits)
    }
}
