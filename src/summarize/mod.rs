//! Best-effort item summaries: ranked LLM providers, then a deterministic
//! extractive fallback.

pub mod providers;

use std::time::Duration;

use anyhow::Result;

use crate::config::llm::LlmSettings;
use crate::ingest::types::{cap_chars, Item};

pub use providers::{SummaryFuture, SummaryProvider};

/// Characters of source text sent to a provider.
const PROMPT_CONTENT_MAX: usize = 1_500;

pub struct Summarizer {
    providers: Vec<Box<dyn SummaryProvider>>,
    max_len: usize,
    max_batch: usize,
    delay: Duration,
}

impl Summarizer {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let providers = providers::build_providers(settings)?;
        tracing::info!(
            target: "summarize",
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "summarizer ready"
        );
        Ok(Self::with_providers(
            providers,
            settings.max_summary_length,
            settings.max_batch,
            Duration::from_millis(settings.request_delay_ms),
        ))
    }

    pub fn with_providers(
        providers: Vec<Box<dyn SummaryProvider>>,
        max_len: usize,
        max_batch: usize,
        delay: Duration,
    ) -> Self {
        Self {
            providers,
            max_len: max_len.max(4),
            max_batch,
            delay,
        }
    }

    pub fn has_llm(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Summary within `max_len`; never fails.
    pub async fn summarize(&self, item: &Item) -> String {
        if !item.summary.is_empty() && item.summary.chars().count() <= self.max_len {
            return item.summary.clone();
        }

        if !self.providers.is_empty() {
            let prompt = build_prompt(item, self.max_len);
            for p in &self.providers {
                // free tiers rate-limit aggressively
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                match p.complete(&prompt).await.map(|s| sanitize_summary(&s, self.max_len)) {
                    Some(s) if !s.is_empty() => return s,
                    _ => tracing::warn!(
                        target: "summarize",
                        provider = p.name(),
                        title = %item.title,
                        "no usable summary, trying next"
                    ),
                }
            }
        }

        let text = if item.summary.is_empty() { &item.title } else { &item.summary };
        extractive_summary(text, self.max_len)
    }

    /// Summarize the first `max_batch` items in place.
    pub async fn summarize_batch(&self, items: &mut [Item]) {
        for item in items.iter_mut().take(self.max_batch) {
            item.summary = self.summarize(item).await;
        }
    }
}

pub fn build_prompt(item: &Item, max_len: usize) -> String {
    let content: String = item.summary.chars().take(PROMPT_CONTENT_MAX).collect();
    format!(
        "Summarize this content as a high-signal brief for a busy AI professional.\n\
         Focus on the 'why it matters' and 'key takeaways'.\n\
         Use 1-2 bullet points if there are multiple important facts.\n\
         Keep it under {max_len} characters.\n\n\
         Title: {}\n\
         Source: {}\n\
         Content: {content}\n\n\
         Summary:",
        item.title, item.source
    )
}

/// Single line, collapsed whitespace, at most `max_chars` characters.
pub fn sanitize_summary(input: &str, max_chars: usize) -> String {
    let line = input.split_whitespace().collect::<Vec<_>>().join(" ");
    line.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Leading whole sentences that fit in `max_len`; hard truncation with `...` if none does.
pub fn extractive_summary(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    let flat = text.replace(['\r', '\n'], " ");

    let mut picked: Vec<String> = Vec::new();
    let mut total = 0usize;
    for sentence in flat.split(". ").map(str::trim).filter(|s| !s.is_empty()) {
        let mut s = sentence.to_string();
        if !s.ends_with('.') {
            s.push('.');
        }
        let len = s.chars().count();
        if total + len + 1 > max_len {
            break;
        }
        total += len + 1;
        picked.push(s);
    }

    if picked.is_empty() {
        return cap_chars(&flat, max_len);
    }
    picked.join(" ")
}
