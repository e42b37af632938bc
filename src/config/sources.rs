// src/config/sources.rs
//! Built-in source lists. Any of them can be replaced from the `[feeds]` table.

use serde::{Deserialize, Serialize};

use crate::ingest::providers::FeedSpec;

pub const AI_TOPICS: &[&str] = &[
    "AI",
    "ML",
    "large language model",
    "LLM",
    "AI agent",
    "agentic AI",
    "artificial intelligence",
    "ChatGPT",
    "GPT-4",
    "Claude",
    "Gemini",
    "machine learning",
    "deep learning",
    "transformer",
    "neural network",
    "generative AI",
    "RAG",
    "retrieval augmented generation",
];

pub const ARXIV_CATEGORIES: &[&str] = &["cs.AI", "cs.CL", "cs.LG", "cs.NE"];

const NEWS_OUTLETS: &[(&str, &str)] = &[
    ("MIT Tech Review AI", "https://www.technologyreview.com/topic/artificial-intelligence/feed"),
    ("Wired AI", "https://www.wired.com/feed/tag/ai/latest/rss"),
    ("TechCrunch AI", "https://techcrunch.com/category/artificial-intelligence/feed/"),
    ("BBC News", "https://feeds.bbci.co.uk/news/rss.xml"),
];

const LAB_BLOGS: &[(&str, &str)] = &[
    ("OpenAI Blog", "https://openai.com/blog/rss.xml"),
    (
        "Anthropic Research",
        "https://raw.githubusercontent.com/Olshansk/rss-feeds/main/feeds/feed_anthropic_research.xml",
    ),
    ("Hugging Face Blog", "https://huggingface.co/blog/feed.xml"),
    ("Google DeepMind", "https://deepmind.com/blog/feed/basic/"),
    ("NVIDIA Developer", "https://developer.nvidia.com/blog/feed/"),
    ("AWS Machine Learning", "http://feeds.feedburner.com/amazon/AWSAI"),
    ("Berkeley AI Research", "https://bair.berkeley.edu/blog/feed.xml"),
    ("Microsoft Research", "https://www.microsoft.com/en-us/research/feed/"),
    ("GitHub Blog", "https://github.blog/feed"),
    ("HF Trending", "https://zernel.github.io/huggingface-trending-feed/feed.xml"),
];

const SUBREDDITS: &[&str] = &[
    "artificial",
    "MachineLearning",
    "LocalLLaMA",
    "ChatGPT",
    "OpenAI",
    "StableDiffusion",
    "ArtificialInteligence",
    "AItools",
    "singularity",
    "PromptEngineering",
    "ClaudeAI",
    "Midjourney",
    "LLM",
    "GenerativeAI",
    "DeepLearning",
    "learnmachinelearning",
];

const YOUTUBE_CHANNELS: &[(&str, &str)] = &[
    ("Two Minute Papers", "UCbfYPyITQ-7l4upoX8nvctg"),
    ("AI Explained", "UCcnJ8uNYChtmbCtleKrQKAL"),
];

const PRODUCT_HUNT_AI: &str = "https://www.producthunt.com/feed?category=artificial-intelligence";

fn specs(v: &[(&str, &str)]) -> Vec<FeedSpec> {
    v.iter().map(|(n, u)| FeedSpec::new(n, u)).collect()
}

/// Feed lists per feed-backed family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFeeds {
    pub news: Vec<FeedSpec>,
    pub blogs: Vec<FeedSpec>,
    pub forums: Vec<FeedSpec>,
    pub videos: Vec<FeedSpec>,
    pub tools: Vec<FeedSpec>,
}

impl Default for SourceFeeds {
    fn default() -> Self {
        Self {
            news: specs(NEWS_OUTLETS),
            blogs: specs(LAB_BLOGS),
            forums: SUBREDDITS
                .iter()
                .map(|s| FeedSpec::new(&format!("r/{s}"), &format!("https://www.reddit.com/r/{s}/.rss")))
                .collect(),
            videos: YOUTUBE_CHANNELS
                .iter()
                .map(|(n, id)| {
                    FeedSpec::new(n, &format!("https://www.youtube.com/feeds/videos.xml?channel_id={id}"))
                })
                .collect(),
            tools: vec![FeedSpec::new("Product Hunt", PRODUCT_HUNT_AI)],
        }
    }
}

/// Partial override from the config file; absent lists keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedOverrides {
    pub news: Option<Vec<FeedSpec>>,
    pub blogs: Option<Vec<FeedSpec>>,
    pub forums: Option<Vec<FeedSpec>>,
    pub videos: Option<Vec<FeedSpec>>,
    pub tools: Option<Vec<FeedSpec>>,
}

impl SourceFeeds {
    pub fn apply(&mut self, o: FeedOverrides) {
        if let Some(v) = o.news {
            self.news = v;
        }
        if let Some(v) = o.blogs {
            self.blogs = v;
        }
        if let Some(v) = o.forums {
            self.forums = v;
        }
        if let Some(v) = o.videos {
            self.videos = v;
        }
        if let Some(v) = o.tools {
            self.tools = v;
        }
    }
}
