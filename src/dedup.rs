// src/dedup.rs
//! Two-pass duplicate elimination over one family's items.
//!
//! 1. URL identity: lowercase, trailing slash stripped; first occurrence wins.
//! 2. Fuzzy titles: items ranked by `(score, published)` descending, then each
//!    title is compared with every title kept so far using a character-level
//!    indel ratio and a token-sort ratio (both 0..=100). Reaching the threshold
//!    on either one marks the item as a duplicate.
//!
//! Pass 2 is greedy and compares against survivors only. With chains where
//! A~B and B~C but not A~C, C is kept once B has been dropped. That
//! under-merging is accepted; a transitive partition would change which items
//! appear in the digest.
//!
//! Similarity is the indel ratio `2·LCS / (len_a + len_b)` over chars, scaled
//! to 0..=100 and rounded half to even. The default threshold of 75 is tuned
//! on this scale.

use std::collections::HashSet;

use tracing::debug;

use crate::ingest::types::{sort_by_rank, Item};

pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 75;

/// Identity key for the URL pass and the send history.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Title surface used for fuzzy comparison.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Character-level indel similarity, 0..=100.
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = (a.len() + b.len()) as u64;
    if total == 0 {
        return 100;
    }
    let matched = 2 * lcs_len(&a, &b) as u64;
    round_half_even(matched * 100, total).min(100) as u8
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (a, b) = if a.len() < b.len() { (b, a) } else { (a, b) };
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn round_half_even(num: u64, den: u64) -> u64 {
    let q = num / den;
    let twice_rem = 2 * (num % den);
    if twice_rem > den || (twice_rem == den && q % 2 == 1) {
        q + 1
    } else {
        q
    }
}

/// Word-order-insensitive similarity: alphanumeric tokens sorted, re-joined, then `ratio`.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    threshold: u8,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Deduplicator {
    /// `threshold` is on a 0..=100 scale; values above 100 are clamped.
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// True if either similarity measure reaches the threshold (inclusive).
    pub fn is_similar(&self, a: &str, b: &str) -> bool {
        ratio(a, b) >= self.threshold || token_sort_ratio(a, b) >= self.threshold
    }

    /// Pass 1: keep the first item per normalized URL, preserving input order.
    pub fn deduplicate_by_url(&self, items: Vec<Item>) -> Vec<Item> {
        let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
        items
            .into_iter()
            .filter(|it| seen.insert(normalize_url(&it.url)))
            .collect()
    }

    /// Pass 2: greedy fuzzy-title clustering; the best ranked member of a cluster survives.
    pub fn deduplicate(&self, mut items: Vec<Item>) -> Vec<Item> {
        if items.is_empty() {
            return items;
        }
        sort_by_rank(&mut items);

        let mut kept_titles: Vec<String> = Vec::with_capacity(items.len());
        let mut unique = Vec::with_capacity(items.len());

        for it in items {
            let title = normalize_title(&it.title);
            if let Some(existing) = kept_titles.iter().find(|k| self.is_similar(&title, k)) {
                debug!(target: "dedup", dropped = %it.title, kept = %existing, "near-duplicate title");
                continue;
            }
            kept_titles.push(title);
            unique.push(it);
        }
        unique
    }

    /// URL pass followed by the fuzzy-title pass.
    pub fn deduplicate_all(&self, items: Vec<Item>) -> Vec<Item> {
        let by_url = self.deduplicate_by_url(items);
        self.deduplicate(by_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn it(title: &str, url: &str, score: f64) -> Item {
        Item::new(title, url, "Test").unwrap().scored(score)
    }

    #[test]
    fn ratios_on_known_pairs() {
        assert_eq!(ratio("abcd", "abcd"), 100);
        assert_eq!(ratio("abcd", "abcx"), 75);
        assert_eq!(ratio("", ""), 100);
        assert_eq!(token_sort_ratio("b a", "a b"), 100);
        assert_eq!(ratio("abc", ""), 0);
    }

    #[test]
    fn inserted_words_score_on_the_indel_scale() {
        // 2*35 / (35+48)
        assert_eq!(
            ratio("anthropic raises $2b in new funding", "anthropic raises $2 billion in new funding round"),
            84
        );
        // 2*21 / (21+35)
        assert_eq!(ratio("meta releases llama 4", "meta releases llama 4 model weights"), 75);
    }

    #[test]
    fn halves_round_to_even() {
        assert_eq!(round_half_even(125, 10), 12);
        assert_eq!(round_half_even(135, 10), 14);
        assert_eq!(round_half_even(134, 10), 13);
    }

    #[test]
    fn token_sort_ignores_punctuation_and_order() {
        assert_eq!(token_sort_ratio("GPT-5, OpenAI!", "openai gpt 5"), 100);
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url(" https://EX.com/a/ "), "https://ex.com/a");
        assert_eq!(normalize_url("https://ex.com/a"), "https://ex.com/a");
    }

    #[test]
    fn empty_titles_match_each_other() {
        let d = Deduplicator::default();
        assert!(d.is_similar("", ""));
    }

    #[test]
    fn threshold_is_clamped() {
        assert_eq!(Deduplicator::new(250).threshold(), 100);
    }

    #[test]
    fn survivor_only_comparison_can_under_merge_chains() {
        // A~B and B~C, A!~C. B is dropped as a duplicate of A, so C is only
        // compared against A and survives.
        let d = Deduplicator::new(75);
        let a = "abcdefgh";
        let b = "abcdefxy";
        let c = "abcdzzxy";
        assert_eq!(ratio(a, b), 75);
        assert_eq!(ratio(b, c), 75);
        assert_eq!(ratio(a, c), 50);
        assert!(!d.is_similar(a, c));

        let out = d.deduplicate(vec![
            it(a, "https://x/a", 3.0),
            it(b, "https://x/b", 2.0),
            it(c, "https://x/c", 1.0),
        ]);
        let titles: Vec<_> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec![a, c]);
    }
}
