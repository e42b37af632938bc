use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::ingest::types::{sort_by_rank, Item, SourceAdapter};
use crate::relevance::{ScoreInput, Scorer};

pub const HN_API: &str = "https://hacker-news.firebaseio.com/v0";
pub const STORY_LIST_LIMIT: usize = 200;
pub const MAX_STORIES: usize = 300;
pub const DEFAULT_MIN_POINTS: i64 = 30;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const ITEM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Story {
    pub id: u64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: i64,
    pub descendants: i64,
    pub by: Option<String>,
    pub time: i64,
    pub dead: bool,
    pub deleted: bool,
}

/// Ids from several lists, first occurrence wins, at most `limit`.
pub fn merge_ids(lists: &[Vec<u64>], limit: usize) -> Vec<u64> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flatten()
        .copied()
        .filter(|id| seen.insert(*id))
        .take(limit)
        .collect()
}

pub struct HackerNewsSource {
    base_url: String,
    scorer: Arc<Scorer>,
    client: reqwest::Client,
    min_points: i64,
    max_results: usize,
    concurrency: usize,
}

impl HackerNewsSource {
    pub fn new(scorer: Arc<Scorer>, client: reqwest::Client, max_results: usize) -> Self {
        Self {
            base_url: HN_API.to_string(),
            scorer,
            client,
            min_points: DEFAULT_MIN_POINTS,
            max_results,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn min_points(mut self, points: i64) -> Self {
        self.min_points = points;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    async fn story_ids(&self, list: &str) -> Result<Vec<u64>> {
        let url = format!("{}/{list}.json", self.base_url);
        let ids: Vec<u64> = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("decoding {list}"))?;
        Ok(ids.into_iter().take(STORY_LIST_LIMIT).collect())
    }

    /// Fetch items through a bounded pool; failed items are dropped. Output keeps id order.
    async fn fetch_stories(&self, ids: Vec<u64>) -> Vec<Story> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (idx, id) in ids.into_iter().enumerate() {
            let sem = semaphore.clone();
            let client = self.client.clone();
            let url = format!("{}/item/{id}.json", self.base_url);
            set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok()?;
                let resp = client.get(&url).timeout(ITEM_TIMEOUT).send().await.ok()?;
                if !resp.status().is_success() {
                    return None;
                }
                // null for unknown ids
                let story: Option<Story> = resp.json().await.ok()?;
                story.map(|s| (idx, s))
            });
        }

        let mut out = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(pair)) => out.push(pair),
                Ok(None) => {}
                Err(e) => tracing::warn!(target: "ingest", error = ?e, "hn item task failed"),
            }
        }
        out.sort_by_key(|(idx, _)| *idx);
        out.into_iter().map(|(_, s)| s).collect()
    }

    /// Window, points floor, title gate and scoring; truncated to `max_results`.
    pub fn stories_to_items(
        &self,
        stories: Vec<Story>,
        cutoff: DateTime<Utc>,
        check_relevance: bool,
        now: DateTime<Utc>,
    ) -> Vec<Item> {
        let cutoff_ts = cutoff.timestamp();
        let mut out = Vec::new();
        for s in stories {
            if s.dead || s.deleted || s.time < cutoff_ts || s.score < self.min_points {
                continue;
            }
            let title = s.title.as_deref().unwrap_or_default();
            if check_relevance && !self.scorer.is_relevant(title) {
                continue;
            }
            let url = s
                .url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", s.id));
            let Some(item) = Item::new(title, &url, "Hacker News") else {
                continue;
            };
            let summary = format!("Score: {} points | {} comments", s.score, s.descendants);
            let item = item
                .published(DateTime::<Utc>::from_timestamp(s.time, 0))
                .summary(&summary, usize::MAX)
                .authors(vec![s.by.clone().unwrap_or_else(|| "Anonymous".to_string())]);

            // the summary is bookkeeping, only the title carries keywords
            let input = ScoreInput {
                summary: "",
                ..ScoreInput::from_item(&item)
            }
            .engagement(s.score as f64);
            let score = self.scorer.score(&input, now).score;
            out.push(item.scored(score));
        }
        sort_by_rank(&mut out);
        out.truncate(self.max_results);
        out
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsSource {
    async fn fetch(&self, days_back: u32, check_relevance: bool) -> Result<Vec<Item>> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::days(i64::from(days_back));

        let mut lists = Vec::new();
        let mut last_err = None;
        for list in ["topstories", "newstories"] {
            match self.story_ids(list).await {
                Ok(ids) => lists.push(ids),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, list, "hn list unavailable");
                    last_err = Some(e);
                }
            }
        }
        if lists.is_empty() {
            return Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no hn story lists")));
        }

        let ids = merge_ids(&lists, MAX_STORIES);
        let stories = self.fetch_stories(ids).await;
        tracing::debug!(target: "ingest", fetched = stories.len(), "hn stories");
        Ok(self.stories_to_items(stories, cutoff, check_relevance, now))
    }

    fn name(&self) -> &str {
        "hackernews"
    }
}
