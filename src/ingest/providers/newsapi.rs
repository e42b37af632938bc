use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::ingest::types::{sort_by_rank, Item, SourceAdapter};
use crate::ingest::{clean_text, parse_date};
use crate::relevance::{ScoreInput, Scorer};

pub const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";
pub const DESCRIPTION_MAX: usize = 300;
/// NewsAPI rejects larger pages.
pub const PAGE_SIZE_LIMIT: usize = 50;

pub const QUERIES: [&str; 4] = [
    r#""artificial intelligence" NOT horoscope NOT zodiac NOT football NOT sport"#,
    r#""large language model" OR "LLM""#,
    r#""AI agent" OR "agentic AI" NOT football"#,
    r#"(ChatGPT OR GPT-4 OR Claude OR Gemini) AND (AI OR "large language model" OR Google OR OpenAI OR Anthropic) NOT horoscope NOT zodiac"#,
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewsResponse {
    pub status: String,
    pub message: Option<String>,
    pub articles: Vec<NewsArticle>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewsArticle {
    pub source: NewsOutlet,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "urlToImage")]
    pub url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewsOutlet {
    pub name: Option<String>,
}

pub fn parse_response(body: &str) -> Result<NewsResponse> {
    serde_json::from_str(body).context("parsing newsapi json")
}

pub struct NewsApiSource {
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
    scorer: Arc<Scorer>,
    client: reqwest::Client,
}

impl NewsApiSource {
    pub fn new(api_key: Option<String>, max_results: usize, scorer: Arc<Scorer>, client: reqwest::Client) -> Self {
        Self {
            endpoint: NEWSAPI_URL.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_results,
            scorer,
            client,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Articles of one response; `seen` carries url identity across queries.
    pub fn articles_to_items(
        &self,
        articles: Vec<NewsArticle>,
        seen: &mut HashSet<String>,
        check_relevance: bool,
        now: DateTime<Utc>,
    ) -> Vec<Item> {
        let mut out = Vec::new();
        for a in articles {
            let url = a.url.as_deref().unwrap_or_default().trim().to_string();
            if url.is_empty() || !seen.insert(url.clone()) {
                continue;
            }
            let title = clean_text(a.title.as_deref().unwrap_or_default());
            let description = clean_text(a.description.as_deref().unwrap_or_default());
            if check_relevance && !self.scorer.is_relevant(&format!("{title} {description}")) {
                continue;
            }
            let outlet = a.source.name.as_deref().unwrap_or("NewsAPI");
            let Some(item) = Item::new(&title, &url, outlet) else {
                continue;
            };
            let item = item
                .published(a.published_at.as_deref().and_then(parse_date))
                .summary(&description, DESCRIPTION_MAX)
                .authors(a.author.into_iter().collect())
                .thumbnail(a.url_to_image);
            let score = self.scorer.score(&ScoreInput::from_item(&item), now).score;
            out.push(item.scored(score));
        }
        out
    }

    async fn query(&self, key: &str, q: &str, from: &str) -> Result<NewsResponse> {
        let page_size = self.max_results.clamp(1, PAGE_SIZE_LIMIT).to_string();
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", q),
                ("from", from),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
                ("apiKey", key),
            ])
            .send()
            .await
            .context("newsapi http get()")?
            .text()
            .await
            .context("newsapi http .text()")?;
        parse_response(&body)
    }
}

#[async_trait]
impl SourceAdapter for NewsApiSource {
    async fn fetch(&self, days_back: u32, check_relevance: bool) -> Result<Vec<Item>> {
        let Some(key) = self.api_key.as_deref() else {
            tracing::info!(target: "ingest", "NEWS_API_KEY not configured, skipping NewsAPI");
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let from = (now - Duration::days(i64::from(days_back)))
            .format("%Y-%m-%d")
            .to_string();

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for q in QUERIES {
            match self.query(key, q, &from).await {
                Ok(resp) if resp.status == "ok" => {
                    let mut v = self.articles_to_items(resp.articles, &mut seen, check_relevance, now);
                    items.append(&mut v);
                }
                Ok(resp) => {
                    tracing::warn!(
                        target: "ingest",
                        status = %resp.status,
                        message = resp.message.as_deref().unwrap_or("unknown error"),
                        "newsapi query rejected"
                    );
                }
                Err(e) => tracing::warn!(target: "ingest", error = ?e, "newsapi query failed"),
            }
        }

        sort_by_rank(&mut items);
        items.truncate(self.max_results);
        Ok(items)
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}
