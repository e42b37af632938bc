// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{Family, Item, SourceAdapter};

pub const USER_AGENT: &str = "rust:ai-news-digest:v0.1 (by /u/ai_news_digest_dev)";

/// One-time metrics registration (so series carry descriptions).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_items_fetched_total",
            "Items returned by source adapters, per family."
        );
        describe_counter!(
            "digest_items_kept_total",
            "Items left after dedup, history filter and cap, per family."
        );
        describe_counter!(
            "digest_dedup_removed_total",
            "Items removed as URL or near-title duplicates, per family."
        );
        describe_counter!(
            "digest_source_errors_total",
            "Source adapter fetch/parse failures."
        );
        describe_histogram!("digest_fetch_ms", "Adapter fetch time in milliseconds.");
        describe_gauge!("digest_last_run_ts", "Unix ts when the digest pipeline last ran.");
    });
}

/// Shared HTTP client for source adapters.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(timeout_secs.clamp(1, 5)))
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .context("building http client")
}

/// Clean feed/API text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode (twice: feeds often double-escape markup)
    let once = html_escape::decode_html_entities(s).to_string();
    let mut out = html_escape::decode_html_entities(&once).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom, APIs) timestamps into UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let odt = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok();
    if let Some(dt) = odt {
        return DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    // chrono is more lenient with obsolete zone names ("EST", "GMT")
    chrono::DateTime::parse_from_rfc2822(s)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Text of a caught panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Items of one family plus the names of the adapters that failed.
#[derive(Debug, Default)]
pub struct FamilyBatch {
    pub items: Vec<Item>,
    pub failed_sources: Vec<String>,
}

/// Run every adapter of a family; one adapter failing or panicking never aborts the others.
pub async fn collect_family(
    family: Family,
    adapters: &[Box<dyn SourceAdapter>],
    days_back: u32,
    check_relevance: bool,
) -> FamilyBatch {
    ensure_metrics_described();

    let mut batch = FamilyBatch::default();
    for a in adapters {
        let t0 = Instant::now();
        let fetched = AssertUnwindSafe(a.fetch(days_back, check_relevance))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!("adapter panicked: {}", panic_message(&*panic))));
        match fetched {
            Ok(mut v) => {
                tracing::info!(
                    target: "ingest",
                    family = %family,
                    source = a.name(),
                    count = v.len(),
                    days_back,
                    "fetched"
                );
                batch.items.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    error = ?e,
                    family = %family,
                    source = a.name(),
                    "source error, continuing without it"
                );
                counter!("digest_source_errors_total", "source" => a.name().to_string())
                    .increment(1);
                batch.failed_sources.push(a.name().to_string());
            }
        }
        histogram!("digest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    }
    counter!("digest_items_fetched_total", "family" => family.as_str())
        .increment(batch.items.len() as u64);
    batch
}
