// src/notify/mod.rs
pub mod email;
pub mod render;

use crate::ingest::types::{Family, Item};

pub use email::SmtpSender;
pub use render::{render_digest, RenderedDigest};

/// Items of one family, already deduplicated, capped and summarized.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestSection {
    pub family: Family,
    pub items: Vec<Item>,
}

impl DigestSection {
    pub fn new(family: Family, items: Vec<Item>) -> Self {
        Self { family, items }
    }
}

/// Delivery failures the caller branches on.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery is not configured: {0}")]
    Config(String),
    #[error(
        "SMTP authentication failed for {account}: {detail}. \
         Use an app password rather than the account password \
         (Gmail: enable 2-step verification, then create one at https://myaccount.google.com/apppasswords)"
    )]
    Auth { account: String, detail: String },
    #[error("SMTP transport error: {0}")]
    Transport(String),
    #[error("could not build the message: {0}")]
    Build(String),
}

/// Final stage of a run: turn sections into a message and hand it off.
#[async_trait::async_trait]
pub trait DigestSender: Send + Sync {
    /// `dry_run` renders and prints the digest without any transport.
    async fn send_digest(
        &self,
        recipient: &str,
        sections: &[DigestSection],
        dry_run: bool,
    ) -> Result<(), DeliveryError>;

    async fn send_test(&self, recipient: &str) -> Result<(), DeliveryError>;

    /// Checked before any fetching so a misconfigured run fails fast.
    fn check_ready(&self, _dry_run: bool) -> Result<(), DeliveryError> {
        Ok(())
    }
}
