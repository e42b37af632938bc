// src/ingest/types.rs
use std::cmp::Ordering;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One category of content, processed through its own dedup/cap pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Papers,
    News,
    Blogs,
    Forums,
    Videos,
    Tools,
    Discussions,
}

impl Family {
    /// Digest order.
    pub const ALL: [Family; 7] = [
        Family::Papers,
        Family::News,
        Family::Blogs,
        Family::Discussions,
        Family::Forums,
        Family::Videos,
        Family::Tools,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Family::Papers => "papers",
            Family::News => "news",
            Family::Blogs => "blogs",
            Family::Forums => "forums",
            Family::Videos => "videos",
            Family::Tools => "tools",
            Family::Discussions => "discussions",
        }
    }

    /// Section heading used by the renderer.
    pub fn heading(self) -> &'static str {
        match self {
            Family::Papers => "Research Papers",
            Family::News => "Industry News",
            Family::Blogs => "From the Labs",
            Family::Forums => "Community Threads",
            Family::Videos => "Videos",
            Family::Tools => "New AI Tools",
            Family::Discussions => "Trending Discussions",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Family::Papers => "📄",
            Family::News => "📰",
            Family::Blogs => "🧪",
            Family::Forums => "💬",
            Family::Videos => "🎬",
            Family::Tools => "🛠️",
            Family::Discussions => "🔥",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Family {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Family::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown content family `{s}`"))
    }
}

/// Normalized content record every source emits into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub score: f64,
}

impl Item {
    /// Returns `None` for malformed records (blank title or url); adapters skip those.
    pub fn new(title: &str, url: &str, source: &str) -> Option<Self> {
        let title = title.trim();
        let url = url.trim();
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            url: url.to_string(),
            source: source.trim().to_string(),
            published: None,
            summary: String::new(),
            authors: Vec::new(),
            categories: Vec::new(),
            thumbnail: None,
            score: 0.0,
        })
    }

    pub fn published(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.published = ts;
        self
    }

    /// Sets the summary, truncated to `max_chars` (with a trailing `...`).
    pub fn summary(mut self, text: &str, max_chars: usize) -> Self {
        self.summary = cap_chars(text, max_chars);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        self
    }

    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn scored(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Text surface the relevance scorer looks at.
    pub fn scoring_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// `(score, published)` descending; missing dates rank as oldest.
/// Equal keys compare `Equal`, so a stable sort keeps arrival order.
pub fn rank_order(a: &Item, b: &Item) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.published.cmp(&a.published))
}

/// Stable in-place ranking used by adapters and the deduplicator.
pub fn sort_by_rank(items: &mut [Item]) {
    items.sort_by(rank_order);
}

/// Truncate to `max_chars` characters, ending with `...` when cut.
pub fn cap_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out = out.trim_end().to_string();
    out.push_str("...");
    out
}

/// A source connector for one content family.
///
/// Recoverable problems (one feed down, a bad entry) are logged and yield
/// partial results; `Err` is reserved for the whole source being unusable.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, days_back: u32, check_relevance: bool) -> Result<Vec<Item>>;
    fn name(&self) -> &str;
}
