// src/config/mod.rs
//! Process settings: built-in defaults, then an optional TOML file, then env vars.

pub mod llm;
pub mod sources;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dedup::DEFAULT_SIMILARITY_THRESHOLD;
use crate::ingest::types::Family;
use crate::relevance::ScoringProfile;

pub use llm::{LlmProviderKind, LlmSettings};
pub use sources::{FeedOverrides, SourceFeeds};

pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";
pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_HISTORY_FILE: &str = "data/history.json";
pub const DEFAULT_HISTORY_DAYS: u32 = 30;
pub const DEFAULT_SEND_TIME: &str = "08:00";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/* ----------------------------
Per-family knobs
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilySettings {
    /// Items kept after dedup and history filtering.
    pub cap: usize,
    pub min_lookback_days: u32,
    pub max_lookback_days: Option<u32>,
    pub check_relevance: bool,
    pub summarize: bool,
}

impl FamilySettings {
    fn new(cap: usize, min: u32, max: Option<u32>, check_relevance: bool, summarize: bool) -> Self {
        Self {
            cap,
            min_lookback_days: min,
            max_lookback_days: max,
            check_relevance,
            summarize,
        }
    }

    /// Defaults per family. Papers skip the gate: the arXiv query already filters by topic.
    pub fn default_for(family: Family) -> Self {
        match family {
            Family::Papers => Self::new(10, 1, None, false, true),
            Family::News => Self::new(10, 1, None, true, true),
            Family::Blogs => Self::new(8, 7, None, true, true),
            Family::Discussions => Self::new(5, 1, Some(3), true, false),
            Family::Forums => Self::new(5, 1, Some(2), true, false),
            Family::Videos => Self::new(4, 3, None, false, false),
            Family::Tools => Self::new(5, 7, None, false, false),
        }
    }

    /// Base lookback clamped into this family's window.
    pub fn lookback(&self, base_days: u32) -> u32 {
        let d = base_days.max(self.min_lookback_days);
        match self.max_lookback_days {
            Some(max) => d.min(max.max(self.min_lookback_days)),
            None => d,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamilyOverride {
    pub cap: Option<usize>,
    pub min_lookback_days: Option<u32>,
    pub max_lookback_days: Option<u32>,
    pub check_relevance: Option<bool>,
    pub summarize: Option<bool>,
}

/* ----------------------------
SMTP
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpProvider {
    #[default]
    Gmail,
    Outlook,
    Yahoo,
}

impl SmtpProvider {
    pub fn host(self) -> &'static str {
        match self {
            SmtpProvider::Gmail => "smtp.gmail.com",
            SmtpProvider::Outlook => "smtp.office365.com",
            SmtpProvider::Yahoo => "smtp.mail.yahoo.com",
        }
    }

    pub fn port(self) -> u16 {
        587
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SmtpProvider::Gmail => "gmail",
            SmtpProvider::Outlook => "outlook",
            SmtpProvider::Yahoo => "yahoo",
        }
    }
}

impl fmt::Display for SmtpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmtpProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gmail" => Ok(SmtpProvider::Gmail),
            "outlook" | "hotmail" => Ok(SmtpProvider::Outlook),
            "yahoo" => Ok(SmtpProvider::Yahoo),
            other => anyhow::bail!("unknown SMTP provider `{other}` (expected gmail, outlook or yahoo)"),
        }
    }
}

#[derive(Clone, Default)]
pub struct SmtpSettings {
    pub provider: SmtpProvider,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("provider", &self.provider)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/* ----------------------------
TOML file schema
---------------------------- */

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmtpFile {
    pub provider: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmFile {
    pub providers: Option<Vec<String>>,
    pub max_summary_length: Option<usize>,
    pub max_batch: Option<usize>,
    pub request_delay_ms: Option<u64>,
    pub openai_model: Option<String>,
    pub gemini_model: Option<String>,
    pub anthropic_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HackerNewsFile {
    pub concurrency: Option<usize>,
    pub min_points: Option<i64>,
}

/// Everything optional; absent keys keep the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub recipient_email: Option<String>,
    pub send_time: Option<String>,
    pub dedup_threshold: Option<u8>,
    pub history_file: Option<String>,
    pub history_days: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub ai_topics: Option<Vec<String>>,
    pub arxiv_categories: Option<Vec<String>>,
    #[serde(default)]
    pub smtp: SmtpFile,
    #[serde(default)]
    pub llm: LlmFile,
    #[serde(default)]
    pub hackernews: HackerNewsFile,
    #[serde(default)]
    pub families: BTreeMap<Family, FamilyOverride>,
    #[serde(default)]
    pub feeds: FeedOverrides,
    #[serde(default)]
    pub scoring: BTreeMap<Family, ScoringProfile>,
}

impl FileConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing digest config toml")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }
}

/* ----------------------------
Settings
---------------------------- */

#[derive(Debug, Clone)]
pub struct Settings {
    pub recipient_email: Option<String>,
    pub smtp: SmtpSettings,
    pub llm: LlmSettings,
    pub news_api_key: Option<String>,
    pub send_time: String,
    pub dedup_threshold: u8,
    /// `None` disables the send history.
    pub history_file: Option<PathBuf>,
    pub history_days: u32,
    pub metrics_textfile: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub hn_concurrency: usize,
    pub hn_min_points: i64,
    pub ai_topics: Vec<String>,
    pub arxiv_categories: Vec<String>,
    pub feeds: SourceFeeds,
    families: BTreeMap<Family, FamilySettings>,
    scoring: BTreeMap<Family, ScoringProfile>,
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recipient_email: None,
            smtp: SmtpSettings::default(),
            llm: LlmSettings::default(),
            news_api_key: None,
            send_time: DEFAULT_SEND_TIME.to_string(),
            dedup_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            history_file: Some(PathBuf::from(DEFAULT_HISTORY_FILE)),
            history_days: DEFAULT_HISTORY_DAYS,
            metrics_textfile: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            hn_concurrency: crate::ingest::providers::hackernews::DEFAULT_CONCURRENCY,
            hn_min_points: crate::ingest::providers::hackernews::DEFAULT_MIN_POINTS,
            ai_topics: strings(sources::AI_TOPICS),
            arxiv_categories: strings(sources::ARXIV_CATEGORIES),
            feeds: SourceFeeds::default(),
            families: Family::ALL
                .iter()
                .map(|f| (*f, FamilySettings::default_for(*f)))
                .collect(),
            scoring: BTreeMap::new(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_env<T: FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match non_empty(env(key)) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        None => Ok(None),
    }
}

const CAP_VARS: [(&str, Family); 7] = [
    ("MAX_PAPERS", Family::Papers),
    ("MAX_NEWS", Family::News),
    ("MAX_DISCUSSIONS", Family::Discussions),
    ("MAX_BLOGS", Family::Blogs),
    ("MAX_FORUMS", Family::Forums),
    ("MAX_VIDEOS", Family::Videos),
    ("MAX_TOOLS", Family::Tools),
];

impl Settings {
    /// Defaults ← `file` ← `env`. `env` is a lookup so callers decide where variables come from.
    pub fn from_parts(file: Option<FileConfig>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env: &dyn Fn(&str) -> Option<String> = &env;
        let mut s = Settings::default();

        // 1) File
        if let Some(f) = file {
            s.recipient_email = non_empty(f.recipient_email).or(s.recipient_email);
            if let Some(t) = f.send_time {
                s.send_time = t;
            }
            if let Some(t) = f.dedup_threshold {
                s.dedup_threshold = t;
            }
            if let Some(p) = f.history_file {
                s.history_file = (!p.trim().is_empty()).then(|| PathBuf::from(p.trim()));
            }
            if let Some(d) = f.history_days {
                s.history_days = d;
            }
            if let Some(t) = f.request_timeout_secs {
                s.request_timeout_secs = t;
            }
            if let Some(v) = f.ai_topics {
                s.ai_topics = v;
            }
            if let Some(v) = f.arxiv_categories {
                s.arxiv_categories = v;
            }
            if let Some(p) = f.smtp.provider {
                s.smtp.provider = p.parse()?;
            }
            s.smtp.email = non_empty(f.smtp.email);

            let l = f.llm;
            if let Some(order) = l.providers {
                s.llm.order = llm::parse_provider_order(&order.join(","))?;
            }
            if let Some(v) = l.max_summary_length {
                s.llm.max_summary_length = v;
            }
            if let Some(v) = l.max_batch {
                s.llm.max_batch = v;
            }
            if let Some(v) = l.request_delay_ms {
                s.llm.request_delay_ms = v;
            }
            if let Some(v) = l.openai_model {
                s.llm.openai_model = v;
            }
            if let Some(v) = l.gemini_model {
                s.llm.gemini_model = v;
            }
            if let Some(v) = l.anthropic_model {
                s.llm.anthropic_model = v;
            }

            if let Some(v) = f.hackernews.concurrency {
                s.hn_concurrency = v.max(1);
            }
            if let Some(v) = f.hackernews.min_points {
                s.hn_min_points = v;
            }

            for (family, o) in f.families {
                let fs = s.families.entry(family).or_insert_with(|| FamilySettings::default_for(family));
                if let Some(v) = o.cap {
                    fs.cap = v;
                }
                if let Some(v) = o.min_lookback_days {
                    fs.min_lookback_days = v;
                }
                if o.max_lookback_days.is_some() {
                    fs.max_lookback_days = o.max_lookback_days;
                }
                if let Some(v) = o.check_relevance {
                    fs.check_relevance = v;
                }
                if let Some(v) = o.summarize {
                    fs.summarize = v;
                }
            }
            s.feeds.apply(f.feeds);
            s.scoring = f.scoring;
        }

        // 2) Environment
        if let Some(v) = non_empty(env("RECIPIENT_EMAIL")) {
            s.recipient_email = Some(v);
        }
        if let Some(v) = non_empty(env("SMTP_EMAIL")) {
            s.smtp.email = Some(v);
        }
        s.smtp.password = non_empty(env("SMTP_PASSWORD"));
        if let Some(p) = parse_env::<SmtpProvider>(env, "SMTP_PROVIDER")? {
            s.smtp.provider = p;
        }

        s.llm.openai_api_key = non_empty(env("OPENAI_API_KEY"));
        s.llm.gemini_api_key = non_empty(env("GEMINI_API_KEY"));
        s.llm.anthropic_api_key = non_empty(env("ANTHROPIC_API_KEY"));
        if let Some(order) = non_empty(env("LLM_PROVIDERS")) {
            s.llm.order = llm::parse_provider_order(&order).context("LLM_PROVIDERS")?;
        }
        s.news_api_key = non_empty(env("NEWS_API_KEY"));

        if let Some(t) = non_empty(env("SEND_TIME")) {
            s.send_time = t;
        }
        crate::scheduler::parse_send_time(&s.send_time)
            .with_context(|| format!("send time {:?}", s.send_time))?;

        for (key, family) in CAP_VARS {
            if let Some(cap) = parse_env::<usize>(env, key)? {
                if let Some(fs) = s.families.get_mut(&family) {
                    fs.cap = cap;
                }
            }
        }

        if let Some(t) = parse_env::<u8>(env, "DEDUP_THRESHOLD")? {
            s.dedup_threshold = t;
        }
        if s.dedup_threshold > 100 {
            anyhow::bail!("dedup threshold must be within 0..=100, got {}", s.dedup_threshold);
        }

        // present-but-empty disables the history
        if let Some(p) = env("HISTORY_FILE") {
            s.history_file = (!p.trim().is_empty()).then(|| PathBuf::from(p.trim()));
        }
        if let Some(d) = parse_env::<u32>(env, "HISTORY_DAYS")? {
            s.history_days = d;
        }
        s.metrics_textfile = non_empty(env("METRICS_TEXTFILE")).map(PathBuf::from);

        Ok(s)
    }

    /// `$DIGEST_CONFIG_PATH` (or `config/digest.toml` when present), then the process env.
    /// `.env` is the binary's job; it is loaded once before this runs.
    pub fn load() -> Result<Self> {
        let file = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => Some(FileConfig::from_path(Path::new(p.trim()))?),
            _ => {
                let p = Path::new(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Some(FileConfig::from_path(p)?)
                } else {
                    None
                }
            }
        };
        Self::from_parts(file, |k| std::env::var(k).ok())
    }

    pub fn family(&self, family: Family) -> FamilySettings {
        self.families
            .get(&family)
            .copied()
            .unwrap_or_else(|| FamilySettings::default_for(family))
    }

    pub fn set_family(&mut self, family: Family, fs: FamilySettings) {
        self.families.insert(family, fs);
    }

    /// Configured override or the built-in profile; gate terms default to the AI topics.
    pub fn scoring_profile(&self, family: Family) -> ScoringProfile {
        match self.scoring.get(&family) {
            Some(p) => {
                let mut p = p.clone();
                if p.gate_terms.is_empty() {
                    p.gate_terms = self.ai_topics.clone();
                }
                p
            }
            None => ScoringProfile::default_for(family, &self.ai_topics),
        }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.has_llm()
    }

    pub fn has_news_api(&self) -> bool {
        self.news_api_key.is_some()
    }

    pub fn has_smtp(&self) -> bool {
        self.smtp.email.is_some() && self.smtp.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn lookback_is_clamped_per_family() {
        let forums = FamilySettings::default_for(Family::Forums);
        assert_eq!(forums.lookback(1), 1);
        assert_eq!(forums.lookback(7), 2);
        let blogs = FamilySettings::default_for(Family::Blogs);
        assert_eq!(blogs.lookback(1), 7);
        assert_eq!(blogs.lookback(14), 14);
        let disc = FamilySettings::default_for(Family::Discussions);
        assert_eq!(disc.lookback(5), 3);
    }

    #[test]
    fn defaults_without_file_or_env() {
        let s = Settings::from_parts(None, env_of(&[])).unwrap();
        assert_eq!(s.dedup_threshold, 75);
        assert_eq!(s.family(Family::Papers).cap, 10);
        assert_eq!(s.family(Family::Discussions).cap, 5);
        assert_eq!(s.history_file, Some(PathBuf::from("data/history.json")));
        assert!(!s.has_llm() && !s.has_news_api() && !s.has_smtp());
    }

    #[test]
    fn env_overrides_file() {
        let file = FileConfig::from_toml_str(
            r#"
recipient_email = "file@example.com"
dedup_threshold = 80

[families.papers]
cap = 3
"#,
        )
        .unwrap();
        let s = Settings::from_parts(
            Some(file),
            env_of(&[("RECIPIENT_EMAIL", "env@example.com"), ("MAX_NEWS", "2")]),
        )
        .unwrap();
        assert_eq!(s.recipient_email.as_deref(), Some("env@example.com"));
        assert_eq!(s.dedup_threshold, 80);
        assert_eq!(s.family(Family::Papers).cap, 3);
        assert_eq!(s.family(Family::News).cap, 2);
    }

    #[test]
    fn empty_history_file_disables_history() {
        let s = Settings::from_parts(None, env_of(&[("HISTORY_FILE", "")])).unwrap();
        assert!(s.history_file.is_none());
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(Settings::from_parts(None, env_of(&[("MAX_PAPERS", "ten")])).is_err());
        assert!(Settings::from_parts(None, env_of(&[("DEDUP_THRESHOLD", "101")])).is_err());
        assert!(Settings::from_parts(None, env_of(&[("SMTP_PROVIDER", "aol")])).is_err());
        assert!(Settings::from_parts(None, env_of(&[("SEND_TIME", "25:00")])).is_err());
    }

    #[test]
    fn smtp_provider_table() {
        let p: SmtpProvider = "Outlook".parse().unwrap();
        assert_eq!(p.host(), "smtp.office365.com");
        assert_eq!(p.port(), 587);
    }

    #[test]
    fn scoring_override_inherits_topics_as_gate() {
        let file = FileConfig::from_toml_str(
            r#"
[scoring.news]
decay_per_day = 0.5

[[scoring.news.tiers]]
id = "brands"
weight = 2.0
mode = "any"
terms = ["openai"]
"#,
        )
        .unwrap();
        let s = Settings::from_parts(Some(file), env_of(&[])).unwrap();
        let p = s.scoring_profile(Family::News);
        assert_eq!(p.decay_per_day, 0.5);
        assert_eq!(p.tiers.len(), 1);
        assert!(p.gate_terms.iter().any(|t| t == "LLM"));
    }
}
