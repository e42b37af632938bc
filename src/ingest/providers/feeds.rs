//! Generic RSS 2.0 / RSS 1.0 (RDF) / Atom adapter.
//!
//! One `FeedSource` covers a list of feeds for a family: news outlets, lab
//! blogs, subreddits, YouTube channels and Product Hunt all go through here.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};

use crate::ingest::types::{sort_by_rank, Item, SourceAdapter};
use crate::ingest::{clean_text, parse_date};
use crate::relevance::{ScoreInput, Scorer};

pub const FEED_SUMMARY_MAX: usize = 400;

/// A named feed url, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

impl FeedSpec {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/* ----------------------------
XML shape (union of RSS 2.0, RDF and Atom)
---------------------------- */

// Element names are matched by local name; the aliases cover prefixed forms.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Node {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "@medium")]
    medium: Option<String>,
    #[serde(rename = "@term")]
    term: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

impl Node {
    fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn is_image(&self) -> bool {
        self.medium.as_deref() == Some("image")
            || self.kind.as_deref().is_some_and(|t| t.starts_with("image/"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaGroup {
    #[serde(alias = "media:thumbnail")]
    thumbnail: Vec<Node>,
    #[serde(alias = "media:content")]
    content: Vec<Node>,
    #[serde(alias = "media:description")]
    description: Vec<Node>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RssItem {
    title: Vec<Node>,
    link: Vec<Node>,
    guid: Vec<Node>,
    description: Vec<Node>,
    #[serde(alias = "content:encoded")]
    encoded: Vec<Node>,
    #[serde(rename = "pubDate")]
    pub_date: Vec<String>,
    #[serde(alias = "dc:date")]
    date: Vec<String>,
    author: Vec<Node>,
    #[serde(alias = "dc:creator")]
    creator: Vec<Node>,
    enclosure: Vec<Node>,
    #[serde(alias = "media:thumbnail")]
    thumbnail: Vec<Node>,
    #[serde(alias = "media:content")]
    content: Vec<Node>,
    #[serde(alias = "media:group")]
    group: Vec<MediaGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomAuthor {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomEntry {
    id: Vec<String>,
    title: Vec<Node>,
    link: Vec<Node>,
    summary: Vec<Node>,
    content: Vec<Node>,
    published: Vec<String>,
    updated: Vec<String>,
    author: Vec<AtomAuthor>,
    category: Vec<Node>,
    #[serde(alias = "media:thumbnail")]
    thumbnail: Vec<Node>,
    #[serde(alias = "media:group")]
    group: Vec<MediaGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Channel {
    item: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedDoc {
    channel: Option<Channel>,
    // RDF puts items next to the channel
    item: Vec<RssItem>,
    entry: Vec<AtomEntry>,
}

/// One feed entry, normalized across formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub thumbnail: Option<String>,
}

fn first_text(nodes: &[Node]) -> Option<String> {
    nodes.iter().find_map(|n| n.text()).map(clean_text)
}

fn first_date<'a>(candidates: impl IntoIterator<Item = &'a String>) -> Option<DateTime<Utc>> {
    candidates.into_iter().find_map(|s| parse_date(s))
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    let name = name.trim();
    if !name.is_empty() && !out.iter().any(|a| a == name) {
        out.push(name.to_string());
    }
}

fn media_thumbnail(thumbs: &[Node], contents: &[Node], groups: &[MediaGroup]) -> Option<String> {
    let thumb = |v: &[Node]| v.iter().find_map(|n| n.url.clone());
    let image = |v: &[Node]| v.iter().filter(|n| n.is_image()).find_map(|n| n.url.clone());
    thumb(thumbs)
        .or_else(|| image(contents))
        .or_else(|| groups.iter().find_map(|g| thumb(&g.thumbnail).or_else(|| image(&g.content))))
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

impl From<RssItem> for FeedEntry {
    fn from(it: RssItem) -> Self {
        let link = it
            .link
            .iter()
            .find_map(|n| n.text().map(str::to_string).or_else(|| n.href.clone()))
            .or_else(|| it.guid.iter().filter_map(|n| n.text()).find(|g| is_http(g)).map(str::to_string))
            .unwrap_or_default();
        let summary = first_text(&it.description)
            .or_else(|| first_text(&it.encoded))
            .or_else(|| it.group.iter().find_map(|g| first_text(&g.description)))
            .unwrap_or_default();

        let mut authors = Vec::new();
        for n in it.author.iter().chain(it.creator.iter()) {
            if let Some(t) = n.text() {
                push_unique(&mut authors, t);
            }
        }

        let thumbnail = media_thumbnail(&it.thumbnail, &it.content, &it.group).or_else(|| {
            it.enclosure
                .iter()
                .filter(|n| n.is_image())
                .find_map(|n| n.url.clone())
        });

        FeedEntry {
            id: it.guid.iter().find_map(|n| n.text()).unwrap_or_default().to_string(),
            title: first_text(&it.title).unwrap_or_default(),
            link: link.trim().to_string(),
            summary,
            published: first_date(it.pub_date.iter().chain(it.date.iter())),
            authors,
            categories: Vec::new(),
            thumbnail,
        }
    }
}

impl From<AtomEntry> for FeedEntry {
    fn from(e: AtomEntry) -> Self {
        let id = e.id.first().map(|s| s.trim().to_string()).unwrap_or_default();
        let alternate = e
            .link
            .iter()
            .filter(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .find_map(|l| l.href.clone());
        let link = alternate
            .or_else(|| e.link.iter().find_map(|l| l.href.clone()))
            .or_else(|| is_http(&id).then(|| id.clone()))
            .unwrap_or_default();

        // `content` also collects media:content, whose text is empty
        let summary = first_text(&e.summary)
            .or_else(|| first_text(&e.content))
            .or_else(|| e.group.iter().find_map(|g| first_text(&g.description)))
            .unwrap_or_default();

        let mut authors = Vec::new();
        for a in &e.author {
            if let Some(n) = a.name.as_deref() {
                push_unique(&mut authors, n);
            }
        }

        let enclosure = e
            .link
            .iter()
            .filter(|l| l.rel.as_deref() == Some("enclosure") && l.is_image())
            .find_map(|l| l.href.clone());

        FeedEntry {
            title: first_text(&e.title).unwrap_or_default(),
            link: link.trim().to_string(),
            summary,
            published: first_date(e.published.iter().chain(e.updated.iter())),
            authors,
            categories: e.category.iter().filter_map(|c| c.term.clone()).collect(),
            thumbnail: media_thumbnail(&e.thumbnail, &e.content, &e.group).or(enclosure),
            id,
        }
    }
}

/// HTML named entities that are not valid XML and show up in real feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
        .replace("&copy;", "&#169;")
        .replace("&reg;", "&#174;")
        .replace("&trade;", "&#8482;")
}

/// Parse an RSS 2.0, RDF or Atom document into normalized entries.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let doc: FeedDoc = from_str(&scrub_html_entities_for_xml(xml)).context("parsing feed xml")?;
    let rss_items = doc.channel.map(|c| c.item).unwrap_or_default();
    Ok(rss_items
        .into_iter()
        .chain(doc.item)
        .map(FeedEntry::from)
        .chain(doc.entry.into_iter().map(FeedEntry::from))
        .collect())
}

/* ----------------------------
Adapter
---------------------------- */

pub struct FeedSource {
    name: String,
    feeds: Vec<FeedSpec>,
    scorer: Arc<Scorer>,
    client: reqwest::Client,
}

impl FeedSource {
    pub fn new(name: &str, feeds: Vec<FeedSpec>, scorer: Arc<Scorer>, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            feeds,
            scorer,
            client,
        }
    }

    /// Window, relevance gate and scoring over already parsed entries of one feed.
    pub fn entries_to_items(
        &self,
        feed_name: &str,
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
            let Some(item) = Item::new(&e.title, &e.link, feed_name) else {
                tracing::debug!(target: "ingest", feed = feed_name, "skipping entry without title or link");
                continue;
            };
            let item = item
                .published(e.published)
                .summary(&e.summary, FEED_SUMMARY_MAX)
                .authors(e.authors)
                .thumbnail(e.thumbnail);
            let score = self.scorer.score(&ScoreInput::from_item(&item), now).score;
            out.push(item.scored(score));
        }
        out
    }

    async fn fetch_one(&self, feed: &FeedSpec) -> Result<Vec<FeedEntry>> {
        let resp = self
            .client
            .get(&feed.url)
            .send()
            .await
            .with_context(|| format!("GET {}", feed.url))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("{} returned {status}", feed.url);
        }
        let body = resp.text().await.context("feed body")?;
        parse_feed(&body)
    }
}

#[async_trait]
impl SourceAdapter for FeedSource {
    async fn fetch(&self, days_back: u32, check_relevance: bool) -> Result<Vec<Item>> {
        let now = Utc::now();
        let cutoff = now - Duration::days(i64::from(days_back));

        let mut items = Vec::new();
        let mut failed = 0usize;
        for feed in &self.feeds {
            match self.fetch_one(feed).await {
                Ok(entries) => {
                    let mut v = self.entries_to_items(&feed.name, entries, cutoff, check_relevance, now);
                    tracing::debug!(target: "ingest", feed = %feed.name, kept = v.len(), "feed parsed");
                    items.append(&mut v);
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(target: "ingest", error = ?e, feed = %feed.name, "feed skipped");
                }
            }
        }
        if failed > 0 && failed == self.feeds.len() {
            anyhow::bail!("all {failed} feeds of `{}` failed", self.name);
        }

        sort_by_rank(&mut items);
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_item_with_enclosure_and_creator() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Lab</title>
    <link>https://lab.test</link>
    <item>
      <title>New &amp; improved model</title>
      <link>https://lab.test/post</link>
      <description><![CDATA[<p>Hello&nbsp;there</p>]]></description>
      <pubDate>Tue, 04 Mar 2025 10:30:00 +0000</pubDate>
      <dc:creator>Ada</dc:creator>
      <enclosure url="https://lab.test/cover.png" type="image/png" length="1"/>
    </item>
  </channel>
</rss>"#;
        let v = parse_feed(xml).unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].title, "New & improved model");
        assert_eq!(v[0].link, "https://lab.test/post");
        assert_eq!(v[0].summary, "Hello there");
        assert_eq!(v[0].authors, vec!["Ada".to_string()]);
        assert_eq!(v[0].thumbnail.as_deref(), Some("https://lab.test/cover.png"));
        assert!(v[0].published.is_some());
    }

    #[test]
    fn html_entities_do_not_break_xml() {
        let xml = "<rss><channel><item><title>A&nbsp;B &mdash; C</title><link>https://x</link></item></channel></rss>";
        let v = parse_feed(xml).unwrap();
        assert_eq!(v[0].title, "A B \u{2014} C");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed("<rss><channel><item><title>x</link></item></channel></rss>").is_err());
    }
}
