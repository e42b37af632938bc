use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::ingest::providers::feeds::{parse_feed, FeedEntry};
use crate::ingest::types::{sort_by_rank, Item, SourceAdapter};
use crate::relevance::{ScoreInput, Scorer};

pub const ARXIV_API: &str = "http://export.arxiv.org/api/query";
pub const ABSTRACT_MAX: usize = 500;
pub const MAX_AUTHORS: usize = 5;
/// Topics beyond this count are left out of the query.
pub const MAX_QUERY_TOPICS: usize = 10;

/// `(cat:A OR cat:B) AND (all:"kw1" OR all:"kw2")`
pub fn build_query(categories: &[String], topics: &[String]) -> String {
    let cats = categories
        .iter()
        .map(|c| format!("cat:{c}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let kws = topics
        .iter()
        .take(MAX_QUERY_TOPICS)
        .map(|k| format!("all:\"{k}\""))
        .collect::<Vec<_>>()
        .join(" OR ");
    match (cats.is_empty(), kws.is_empty()) {
        (false, false) => format!("({cats}) AND ({kws})"),
        (false, true) => format!("({cats})"),
        (true, false) => format!("({kws})"),
        (true, true) => String::new(),
    }
}

pub struct ArxivSource {
    endpoint: String,
    categories: Vec<String>,
    topics: Vec<String>,
    max_results: usize,
    scorer: Arc<Scorer>,
    client: reqwest::Client,
}

impl ArxivSource {
    pub fn new(
        categories: Vec<String>,
        topics: Vec<String>,
        max_results: usize,
        scorer: Arc<Scorer>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: ARXIV_API.to_string(),
            categories,
            topics,
            max_results,
            scorer,
            client,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Atom entries of a query response to scored paper items.
    pub fn entries_to_items(
        &self,
        entries: Vec<FeedEntry>,
        cutoff: DateTime<Utc>,
        check_relevance: bool,
        now: DateTime<Utc>,
    ) -> Vec<Item> {
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            if e.published.is_some_and(|p| p < cutoff) {
                continue;
            }
            if check_relevance && !self.scorer.is_relevant(&format!("{} {}", e.title, e.summary)) {
                continue;
            }
            let url = if e.id.is_empty() { e.link.as_str() } else { e.id.as_str() };
            let Some(item) = Item::new(&e.title, url, "ArXiv") else {
                continue;
            };
            let item = item
                .published(e.published)
                .summary(&e.summary, ABSTRACT_MAX)
                .authors(e.authors.into_iter().take(MAX_AUTHORS).collect())
                .categories(e.categories);
            let score = self.scorer.score(&ScoreInput::from_item(&item), now).score;
            out.push(item.scored(score));
        }
        sort_by_rank(&mut out);
        out
    }
}

#[async_trait]
impl SourceAdapter for ArxivSource {
    async fn fetch(&self, days_back: u32, check_relevance: bool) -> Result<Vec<Item>> {
        let now = Utc::now();
        let cutoff = now - Duration::days(i64::from(days_back));
        let query = build_query(&self.categories, &self.topics);
        let max_results = self.max_results.to_string();

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("search_query", query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .context("arxiv http get()")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("arxiv returned {status}");
        }
        let body = resp.text().await.context("arxiv http .text()")?;
        let entries = parse_feed(&body).context("parsing arxiv atom")?;
        tracing::debug!(target: "ingest", entries = entries.len(), %query, "arxiv response");

        Ok(self.entries_to_items(entries, cutoff, check_relevance, now))
    }

    fn name(&self) -> &str {
        "arxiv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_combines_categories_and_first_topics() {
        let cats = vec!["cs.AI".to_string(), "cs.CL".to_string()];
        let topics: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
        let q = build_query(&cats, &topics);
        assert!(q.starts_with("(cat:cs.AI OR cat:cs.CL) AND (all:\"t0\" OR "));
        assert!(q.contains("all:\"t9\")"));
        assert!(!q.contains("t10"));
    }

    #[test]
    fn query_without_topics_is_categories_only() {
        assert_eq!(build_query(&["cs.LG".to_string()], &[]), "(cat:cs.LG)");
    }
}
