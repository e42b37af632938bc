//! history.rs — record of delivered item urls, so a url goes out at most once
//! within the retention window.
//!
//! On disk: a JSON object `{ "<normalized url>": "<rfc3339 sent-at>" }`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::dedup::normalize_url;
use crate::ingest::types::Item;

#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl HistoryStore {
    /// Missing or unreadable files start an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<BTreeMap<String, String>>(&s) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(target: "history", error = %e, path = %path.display(), "corrupt history, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(target: "history", error = %e, path = %path.display(), "history unreadable, starting empty");
                BTreeMap::new()
            }
        };
        tracing::debug!(target: "history", entries = entries.len(), "history loaded");
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sent(&self, url: &str) -> bool {
        self.entries.contains_key(&normalize_url(url))
    }

    /// Items whose url was never delivered, in input order.
    pub fn filter_existing(&self, items: Vec<Item>) -> Vec<Item> {
        items.into_iter().filter(|it| !self.is_sent(&it.url)).collect()
    }

    pub fn add_articles(&mut self, items: &[Item]) -> Result<usize> {
        self.add_articles_at(items, Utc::now())
    }

    /// Returns how many urls were new; the file is written only when that is non-zero.
    pub fn add_articles_at(&mut self, items: &[Item], now: DateTime<Utc>) -> Result<usize> {
        let stamp = now.to_rfc3339();
        let mut added = 0;
        for it in items {
            let key = normalize_url(&it.url);
            if !self.entries.contains_key(&key) {
                self.entries.insert(key, stamp.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.save()?;
        }
        Ok(added)
    }

    pub fn cleanup(&mut self, days_to_keep: u32) -> Result<usize> {
        self.cleanup_at(days_to_keep, Utc::now())
    }

    /// Drops entries older than the cutoff and entries with unparsable stamps.
    pub fn cleanup_at(&mut self, days_to_keep: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(i64::from(days_to_keep));
        let before = self.entries.len();
        self.entries
            .retain(|_, stamp| parse_stamp(stamp).is_some_and(|t| t > cutoff));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.save()?;
            tracing::info!(target: "history", before, after = self.entries.len(), "history cleaned up");
        }
        Ok(removed)
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries).context("serializing history")?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }
}

/// RFC 3339, or a zone-less ISO stamp taken as UTC.
fn parse_stamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}
