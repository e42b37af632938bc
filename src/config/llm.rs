// src/config/llm.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SUMMARY_LENGTH: usize = 150;
pub const DEFAULT_MAX_BATCH: usize = 15;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    OpenAi,
    Gemini,
    Anthropic,
}

impl LlmProviderKind {
    pub const DEFAULT_ORDER: [LlmProviderKind; 3] = [
        LlmProviderKind::OpenAi,
        LlmProviderKind::Gemini,
        LlmProviderKind::Anthropic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LlmProviderKind::OpenAi => "openai",
            LlmProviderKind::Gemini => "gemini",
            LlmProviderKind::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "gemini" | "google" => Ok(LlmProviderKind::Gemini),
            "anthropic" | "claude" => Ok(LlmProviderKind::Anthropic),
            other => anyhow::bail!("unsupported LLM provider `{other}`"),
        }
    }
}

/// Comma separated provider ranking, e.g. `"gemini, openai"`. Repeats are ignored.
pub fn parse_provider_order(s: &str) -> anyhow::Result<Vec<LlmProviderKind>> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind: LlmProviderKind = part.parse()?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    Ok(out)
}

#[derive(Clone)]
pub struct LlmSettings {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub order: Vec<LlmProviderKind>,
    pub openai_model: String,
    pub gemini_model: String,
    pub anthropic_model: String,
    pub max_summary_length: usize,
    pub max_batch: usize,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

// Keys stay out of logs.
impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "***"))
            .field("order", &self.order)
            .field("max_summary_length", &self.max_summary_length)
            .field("max_batch", &self.max_batch)
            .field("request_delay_ms", &self.request_delay_ms)
            .finish()
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            anthropic_api_key: None,
            order: LlmProviderKind::DEFAULT_ORDER.to_vec(),
            openai_model: "gpt-4o-mini".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            anthropic_model: "claude-3-5-haiku-latest".to_string(),
            max_summary_length: DEFAULT_MAX_SUMMARY_LENGTH,
            max_batch: DEFAULT_MAX_BATCH,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            timeout_secs: 10,
        }
    }
}

impl LlmSettings {
    /// Usable key for a provider. OpenAI keys that do not look like `sk-...` are ignored.
    pub fn key_for(&self, kind: LlmProviderKind) -> Option<&str> {
        let key = match kind {
            LlmProviderKind::OpenAi => self.openai_api_key.as_deref(),
            LlmProviderKind::Gemini => self.gemini_api_key.as_deref(),
            LlmProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
        .map(str::trim)
        .filter(|k| !k.is_empty())?;
        if kind == LlmProviderKind::OpenAi && !key.starts_with("sk-") {
            return None;
        }
        Some(key)
    }

    /// Ranked providers that have a usable key.
    pub fn configured(&self) -> Vec<(LlmProviderKind, &str)> {
        self.order
            .iter()
            .filter_map(|k| self.key_for(*k).map(|key| (*k, key)))
            .collect()
    }

    pub fn has_llm(&self) -> bool {
        !self.configured().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_order_parses_and_dedups() {
        let v = parse_provider_order("Gemini, claude,gemini ,").unwrap();
        assert_eq!(v, vec![LlmProviderKind::Gemini, LlmProviderKind::Anthropic]);
        assert!(parse_provider_order("mistral").is_err());
    }

    #[test]
    fn openai_key_must_look_like_a_secret_key() {
        let mut s = LlmSettings {
            openai_api_key: Some("not-a-key".into()),
            ..Default::default()
        };
        assert!(!s.has_llm());
        s.openai_api_key = Some("sk-abc".into());
        assert_eq!(s.configured(), vec![(LlmProviderKind::OpenAi, "sk-abc")]);
    }

    #[test]
    fn configured_follows_ranking() {
        let s = LlmSettings {
            openai_api_key: Some("sk-1".into()),
            anthropic_api_key: Some("a-2".into()),
            order: vec![LlmProviderKind::Anthropic, LlmProviderKind::OpenAi],
            ..Default::default()
        };
        let kinds: Vec<_> = s.configured().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![LlmProviderKind::Anthropic, LlmProviderKind::OpenAi]);
    }

    #[test]
    fn debug_hides_keys() {
        let s = LlmSettings {
            gemini_api_key: Some("secret-value".into()),
            ..Default::default()
        };
        assert!(!format!("{s:?}").contains("secret-value"));
    }
}
