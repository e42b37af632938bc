use chrono::Local;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::render::{render_digest, render_test, RenderedDigest};
use super::{DeliveryError, DigestSection, DigestSender};
use crate::config::{SmtpProvider, SmtpSettings};

/// STARTTLS submission through one of the supported mail providers.
pub struct SmtpSender {
    provider: SmtpProvider,
    email: Option<String>,
    password: Option<String>,
}

impl SmtpSender {
    pub fn from_settings(s: &SmtpSettings) -> Self {
        Self {
            provider: s.provider,
            email: s.email.clone(),
            password: s.password.clone(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), DeliveryError> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(e), Some(p)) => Ok((e, p)),
            _ => Err(DeliveryError::Config(
                "SMTP_EMAIL and SMTP_PASSWORD must both be set".to_string(),
            )),
        }
    }

    fn build_message(&self, from: &str, to: &str, r: &RenderedDigest) -> Result<Message, DeliveryError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| DeliveryError::Config(format!("invalid sender address `{from}`: {e}")))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| DeliveryError::Config(format!("invalid recipient address `{to}`: {e}")))?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(r.subject.clone())
            .multipart(MultiPart::alternative_plain_html(r.text.clone(), r.html.clone()))
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }

    async fn deliver(&self, recipient: &str, r: &RenderedDigest) -> Result<(), DeliveryError> {
        let (user, pass) = self.credentials()?;
        let msg = self.build_message(user, recipient, r)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(self.provider.host())
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(self.provider.port())
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();

        match mailer.send(msg).await {
            Ok(_) => {
                tracing::info!(target: "notify", provider = %self.provider, recipient, "email sent");
                Ok(())
            }
            Err(e) => Err(classify(user, &e)),
        }
    }
}

fn classify(account: &str, e: &lettre::transport::smtp::Error) -> DeliveryError {
    let code = e.status().map(|c| c.to_string()).unwrap_or_default();
    let text = e.to_string();
    // 530/534/535: authentication required / rejected
    if code.starts_with("53") || text.to_lowercase().contains("authentication") {
        DeliveryError::Auth {
            account: account.to_string(),
            detail: text,
        }
    } else {
        DeliveryError::Transport(text)
    }
}

fn print_preview(recipient: &str, r: &RenderedDigest) {
    let bar = "=".repeat(60);
    println!("\n{bar}\nDRY RUN - Email Preview\n{bar}");
    println!("To: {recipient}");
    println!("Subject: {}", r.subject);
    println!("{bar}\n{}{bar}\n", r.text);
}

#[async_trait::async_trait]
impl DigestSender for SmtpSender {
    async fn send_digest(
        &self,
        recipient: &str,
        sections: &[DigestSection],
        dry_run: bool,
    ) -> Result<(), DeliveryError> {
        let rendered = render_digest(sections, Local::now().date_naive());
        if dry_run {
            print_preview(recipient, &rendered);
            return Ok(());
        }
        self.deliver(recipient, &rendered).await
    }

    async fn send_test(&self, recipient: &str) -> Result<(), DeliveryError> {
        self.deliver(recipient, &render_test()).await
    }

    fn check_ready(&self, dry_run: bool) -> Result<(), DeliveryError> {
        if dry_run {
            return Ok(());
        }
        self.credentials().map(|_| ())
    }
}
