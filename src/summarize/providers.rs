//! Remote summary backends. Each one returns `None` on any failure; the
//! summarizer moves on to the next provider or the extractive fallback.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::llm::{LlmProviderKind, LlmSettings};

pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// One remote text-generation endpoint.
pub trait SummaryProvider: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str) -> SummaryFuture<'a>;
    fn name(&self) -> &'static str;
}

const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.3;

pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("ai-news-digest/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .context("building llm http client")
}

/// Ranked providers that have a usable key.
pub fn build_providers(settings: &LlmSettings) -> Result<Vec<Box<dyn SummaryProvider>>> {
    let configured = settings.configured();
    if configured.is_empty() {
        return Ok(Vec::new());
    }
    let http = http_client(settings.timeout_secs)?;
    Ok(configured
        .into_iter()
        .map(|(kind, key)| -> Box<dyn SummaryProvider> {
            let http = http.clone();
            let key = key.to_string();
            match kind {
                LlmProviderKind::OpenAi => Box::new(OpenAiProvider {
                    http,
                    api_key: key,
                    model: settings.openai_model.clone(),
                }),
                LlmProviderKind::Gemini => Box::new(GeminiProvider {
                    http,
                    api_key: key,
                    model: settings.gemini_model.clone(),
                }),
                LlmProviderKind::Anthropic => Box::new(AnthropicProvider {
                    http,
                    api_key: key,
                    model: settings.anthropic_model.clone(),
                }),
            }
        })
        .collect())
}

async fn post_json<T: for<'de> Deserialize<'de>>(
    provider: &'static str,
    req: reqwest::RequestBuilder,
) -> Option<T> {
    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(target: "summarize", error = ?e, provider, "llm http error");
            return None;
        }
    };
    let status = resp.status();
    if !status.is_success() {
        tracing::warn!(target: "summarize", %status, provider, "llm request rejected");
        return None;
    }
    match resp.json().await {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(target: "summarize", error = ?e, provider, "llm response not understood");
            None
        }
    }
}

/* ----------------------------
OpenAI (Chat Completions)
---------------------------- */

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl SummaryProvider for OpenAiProvider {
    fn complete<'a>(&'a self, prompt: &'a str) -> SummaryFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: Option<String>,
            }

            let req = Req {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
            };
            let body: Resp = post_json(
                self.name(),
                self.http
                    .post("https://api.openai.com/v1/chat/completions")
                    .bearer_auth(&self.api_key)
                    .json(&req),
            )
            .await?;
            body.choices.into_iter().next()?.message.content
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/* ----------------------------
Gemini (generateContent)
---------------------------- */

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl SummaryProvider for GeminiProvider {
    fn complete<'a>(&'a self, prompt: &'a str) -> SummaryFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Part<'a> {
                text: &'a str,
            }
            #[derive(Serialize)]
            struct Content<'a> {
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct GenConfig {
                temperature: f32,
                max_output_tokens: u32,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Req<'a> {
                contents: Vec<Content<'a>>,
                generation_config: GenConfig,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: RespContent,
            }
            #[derive(Deserialize)]
            struct RespContent {
                #[serde(default)]
                parts: Vec<RespPart>,
            }
            #[derive(Deserialize)]
            struct RespPart {
                #[serde(default)]
                text: String,
            }

            let req = Req {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: GenConfig {
                    temperature: TEMPERATURE,
                    max_output_tokens: MAX_TOKENS,
                },
            };
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );
            let body: Resp = post_json(
                self.name(),
                self.http
                    .post(url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&req),
            )
            .await?;
            let text: String = body
                .candidates
                .into_iter()
                .next()?
                .content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect();
            Some(text)
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/* ----------------------------
Anthropic (Messages)
---------------------------- */

pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl SummaryProvider for AnthropicProvider {
    fn complete<'a>(&'a self, prompt: &'a str) -> SummaryFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                max_tokens: u32,
                temperature: f32,
                messages: Vec<Msg<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                content: Vec<Block>,
            }
            #[derive(Deserialize)]
            struct Block {
                #[serde(rename = "type")]
                kind: String,
                #[serde(default)]
                text: String,
            }

            let req = Req {
                model: &self.model,
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
            };
            let body: Resp = post_json(
                self.name(),
                self.http
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&req),
            )
            .await?;
            let text: String = body
                .content
                .into_iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text)
                .collect();
            Some(text)
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
