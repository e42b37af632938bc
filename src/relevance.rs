// src/relevance.rs
//! Relevance scoring: per-family keyword tiers, source trust, low-value source
//! penalties, engagement and linear time decay, compiled once into a `Scorer`.
//!
//! All families share one algorithm; only the `ScoringProfile` differs.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ingest::types::{Family, Item};

pub const DEFAULT_DECAY_PER_DAY: f64 = 1.5;
pub const DEFAULT_PRIORITY_BONUS: f64 = 3.0;
pub const DEFAULT_PENALTY: f64 = -10.0;

fn default_decay() -> f64 {
    DEFAULT_DECAY_PER_DAY
}
fn default_priority_bonus() -> f64 {
    DEFAULT_PRIORITY_BONUS
}
fn default_penalty() -> f64 {
    DEFAULT_PENALTY
}

/* ----------------------------
Config schema (code defaults, TOML overrides)
---------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Add the tier weight once per distinct matched term.
    #[default]
    PerTerm,
    /// Add the tier weight once if any term matches.
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTier {
    pub id: String,
    pub weight: f64,
    #[serde(default)]
    pub mode: MatchMode,
    pub terms: Vec<String>,
}

/// Community signal (e.g. forum points) folded into the score as `min(value / divisor, cap)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngagementBoost {
    pub divisor: f64,
    pub cap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringProfile {
    #[serde(default)]
    pub tiers: Vec<KeywordTier>,
    /// Partial, case-insensitive match against the source label.
    #[serde(default)]
    pub priority_sources: Vec<String>,
    #[serde(default = "default_priority_bonus")]
    pub priority_bonus: f64,
    /// Partial, case-insensitive match against the source label or the url.
    #[serde(default)]
    pub penalized_sources: Vec<String>,
    #[serde(default = "default_penalty")]
    pub penalty: f64,
    #[serde(default = "default_decay")]
    pub decay_per_day: f64,
    #[serde(default)]
    pub engagement: Option<EngagementBoost>,
    /// Terms of which at least one must appear when relevance checking is on.
    #[serde(default)]
    pub gate_terms: Vec<String>,
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn tier(id: &str, weight: f64, mode: MatchMode, terms: &[&str]) -> KeywordTier {
    KeywordTier {
        id: id.to_string(),
        weight,
        mode,
        terms: strings(terms),
    }
}

const AGENT_TERMS: &[&str] = &[
    "autonomous agent",
    "reasoning model",
    "multi-agent",
    "test-time compute",
    "long-horizon planning",
    "memory-augmented",
    "retrieval-augmented",
    "rag",
    "reasoning pipeline",
    "agent framework",
    "agent architecture",
];

fn with_agent_terms(head: &[&str]) -> Vec<String> {
    let mut v = strings(head);
    v.extend(strings(AGENT_TERMS));
    v
}

/// Headline topic of the digest; outweighs three days of default decay.
const FOCUS_TERMS: &[&str] = &["agentic ai", "agentic workflows", "ai agents"];
pub const FOCUS_WEIGHT: f64 = 4.0;

fn focus_tier() -> KeywordTier {
    tier("focus", FOCUS_WEIGHT, MatchMode::Any, FOCUS_TERMS)
}

const PRIORITY_LABS: &[&str] = &[
    "OpenAI",
    "Anthropic",
    "Google",
    "DeepMind",
    "Microsoft",
    "Hugging Face",
    "NVIDIA",
    "AWS",
    "Meta",
];

impl ScoringProfile {
    /// Built-in profile for a family. `gate_terms` are the configured AI topics.
    pub fn default_for(family: Family, gate_terms: &[String]) -> Self {
        let base = Self {
            tiers: Vec::new(),
            priority_sources: Vec::new(),
            priority_bonus: DEFAULT_PRIORITY_BONUS,
            penalized_sources: Vec::new(),
            penalty: DEFAULT_PENALTY,
            decay_per_day: DEFAULT_DECAY_PER_DAY,
            engagement: None,
            gate_terms: gate_terms.to_vec(),
        };

        match family {
            Family::Papers => Self {
                tiers: vec![
                    focus_tier(),
                    KeywordTier {
                        terms: with_agent_terms(&[
                            "llm",
                            "large language model",
                            "ai agent",
                            "agentic",
                            "gpt",
                            "transformer",
                        ]),
                        ..tier("high", 2.0, MatchMode::PerTerm, &[])
                    },
                    tier(
                        "medium",
                        1.0,
                        MatchMode::PerTerm,
                        &["reasoning", "benchmark", "fine-tuning", "prompt", "chain-of-thought"],
                    ),
                ],
                ..base
            },
            Family::News => Self {
                tiers: vec![
                    focus_tier(),
                    KeywordTier {
                        terms: with_agent_terms(&["llm", "large language model", "ai agent", "agentic"]),
                        ..tier("high", 3.0, MatchMode::Any, &[])
                    },
                    tier(
                        "brands",
                        2.0,
                        MatchMode::Any,
                        &["openai", "anthropic", "google ai", "deepmind"],
                    ),
                    tier(
                        "models",
                        1.5,
                        MatchMode::Any,
                        &["chatgpt", "gpt-4", "claude", "gemini"],
                    ),
                ],
                priority_sources: strings(PRIORITY_LABS),
                penalized_sources: strings(&["pypi.org", "github.com"]),
                ..base
            },
            Family::Discussions => Self {
                tiers: vec![
                    focus_tier(),
                    KeywordTier {
                        terms: with_agent_terms(&[
                            "llm",
                            "large language model",
                            "ai agent",
                            "agentic",
                            "gpt-4",
                            "claude",
                            "o1",
                        ]),
                        ..tier("high", 3.0, MatchMode::PerTerm, &[])
                    },
                    tier(
                        "medium",
                        2.0,
                        MatchMode::PerTerm,
                        &["openai", "anthropic", "chatgpt", "gemini", "deepmind"],
                    ),
                ],
                engagement: Some(EngagementBoost {
                    divisor: 100.0,
                    cap: 5.0,
                }),
                ..base
            },
            Family::Blogs | Family::Forums | Family::Videos | Family::Tools => Self {
                tiers: vec![
                    focus_tier(),
                    KeywordTier {
                        terms: with_agent_terms(&[
                            "llm",
                            "large language model",
                            "ai agent",
                            "agentic",
                            "gpt-4",
                            "claude",
                        ]),
                        ..tier("high", 2.0, MatchMode::PerTerm, &[])
                    },
                    tier(
                        "medium",
                        1.0,
                        MatchMode::PerTerm,
                        &["chatgpt", "gemini", "openai", "anthropic", "machine learning"],
                    ),
                ],
                priority_sources: strings(PRIORITY_LABS),
                ..base
            },
        }
    }
}

/* ----------------------------
Compiled scorer
---------------------------- */

/// Regex for a term with word boundaries on the sides that start/end with a word char,
/// so "ai" never matches inside "said" while "c++" style terms still match.
pub fn term_regex(term: &str) -> anyhow::Result<Regex> {
    let t = term.trim();
    if t.is_empty() {
        anyhow::bail!("empty keyword term");
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if t.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let tail = if t.chars().last().is_some_and(is_word) { r"\b" } else { "" };
    let pattern = format!("(?i){lead}{}{tail}", regex::escape(t));
    Regex::new(&pattern).map_err(|e| anyhow::anyhow!("term `{t}` regex error: {e}"))
}

#[derive(Debug)]
struct CompiledTier {
    id: String,
    weight: f64,
    mode: MatchMode,
    terms: Vec<(String, Regex)>,
}

/// Inputs the scorer looks at; adapters build this before the `Item` exists.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub source: &'a str,
    pub url: &'a str,
    pub published: Option<DateTime<Utc>>,
    pub engagement: Option<f64>,
}

impl<'a> ScoreInput<'a> {
    pub fn from_item(item: &'a Item) -> Self {
        Self {
            title: &item.title,
            summary: &item.summary,
            source: &item.source,
            url: &item.url,
            published: item.published,
            engagement: None,
        }
    }

    pub fn engagement(mut self, value: f64) -> Self {
        self.engagement = Some(value);
        self
    }
}

/// Result of scoring with explainability markers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub matched: Vec<String>,
    pub reasons: Vec<String>,
}

#[derive(Debug)]
pub struct Scorer {
    profile: ScoringProfile,
    tiers: Vec<CompiledTier>,
    gate: Vec<Regex>,
}

impl Scorer {
    pub fn new(profile: ScoringProfile) -> anyhow::Result<Self> {
        let tiers = profile
            .tiers
            .iter()
            .map(|t| {
                let terms = t
                    .terms
                    .iter()
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| Ok((s.to_lowercase(), term_regex(s)?)))
                    .collect::<anyhow::Result<Vec<_>>>()
                    .map_err(|e| anyhow::anyhow!("tier `{}`: {e}", t.id))?;
                Ok(CompiledTier {
                    id: t.id.clone(),
                    weight: t.weight,
                    mode: t.mode,
                    terms,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let gate = profile
            .gate_terms
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| term_regex(s))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            profile,
            tiers,
            gate,
        })
    }

    pub fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    /// True if the text mentions at least one gate term. An empty gate accepts everything.
    pub fn is_relevant(&self, text: &str) -> bool {
        self.gate.is_empty() || self.gate.iter().any(|re| re.is_match(text))
    }

    pub fn score(&self, input: &ScoreInput<'_>, now: DateTime<Utc>) -> ScoreBreakdown {
        let text = format!("{} {}", input.title, input.summary);
        let mut out = ScoreBreakdown::default();

        // 1) Keyword tiers
        for t in &self.tiers {
            let hits: Vec<&str> = t
                .terms
                .iter()
                .filter(|(_, re)| re.is_match(&text))
                .map(|(term, _)| term.as_str())
                .collect();
            if hits.is_empty() {
                continue;
            }
            let gained = match t.mode {
                MatchMode::PerTerm => t.weight * hits.len() as f64,
                MatchMode::Any => t.weight,
            };
            out.score += gained;
            out.matched.extend(hits.iter().map(|h| h.to_string()));
            out.reasons.push(format!("tier:{}:{:+.1}", t.id, gained));
        }

        // 2) Source trust
        let source_lc = input.source.to_lowercase();
        if self
            .profile
            .priority_sources
            .iter()
            .any(|p| !p.is_empty() && source_lc.contains(&p.to_lowercase()))
        {
            out.score += self.profile.priority_bonus;
            out.reasons
                .push(format!("priority_source:{:+.1}", self.profile.priority_bonus));
        }

        // 3) Low-value sources sink below everything else
        let url_lc = input.url.to_lowercase();
        if self.profile.penalized_sources.iter().any(|p| {
            let p = p.to_lowercase();
            !p.is_empty() && (source_lc.contains(&p) || url_lc.contains(&p))
        }) {
            out.score += self.profile.penalty;
            out.reasons
                .push(format!("penalized_source:{:+.1}", self.profile.penalty));
        }

        // 4) Engagement
        if let (Some(boost), Some(value)) = (self.profile.engagement, input.engagement) {
            if boost.divisor > 0.0 {
                let gained = (value / boost.divisor).min(boost.cap);
                out.score += gained;
                out.reasons.push(format!("engagement:{gained:+.2}"));
            }
        }

        // 5) Linear time decay
        if let Some(published) = input.published {
            let days_old = days_between(published, now);
            let decay = days_old * self.profile.decay_per_day;
            if decay > 0.0 {
                out.score -= decay;
                out.reasons.push(format!("decay:{:.2}d", days_old));
            }
        }

        debug!(
            target: "relevance",
            title = input.title,
            score = out.score,
            matched = ?out.matched,
            "scored"
        );
        out
    }

    /// Convenience for re-scoring an already normalized item.
    pub fn score_item(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        self.score(&ScoreInput::from_item(item), now).score
    }
}

/// Non-negative age in fractional days.
pub fn days_between(published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = now.signed_duration_since(published).num_milliseconds();
    (ms.max(0) as f64) / 86_400_000.0
}

/* ----------------------------
Tests
---------------------------- */
