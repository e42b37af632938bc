// src/lib.rs
// Library surface shared by the binary and the integration tests.

pub mod config;
pub mod dedup;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod scheduler;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::ingest::types::{Family, Item, SourceAdapter};
pub use crate::notify::{DeliveryError, DigestSection, DigestSender};
pub use crate::pipeline::{DigestAgent, RunOptions, RunOutcome, RunReport, RunStage};
