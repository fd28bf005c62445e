//! SMTP sending via lettre.
//!
//! A draft renders to RFC 822 through lettre's message builder: a plain
//! `text/plain; charset=utf-8` message, or multipart/mixed when the draft
//! carries attachments (each read from its absolute path at send time).
//! Failures surface as errors without retry; the outbox state machine
//! decides disposition.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::draft::Draft;

/// Connection settings for one account.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub provider_message_id: String,
}

/// Renders drafts and hands them to the provider over SMTPS.
pub struct SmtpSender {
    config: SmtpConfig,
    from_email: String,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig, from_email: &str) -> Self {
        Self {
            config,
            from_email: from_email.to_string(),
        }
    }

    /// Render and transmit a draft.
    pub async fn send(&self, draft: &Draft) -> Result<SendOutcome> {
        let email = self.build_message(draft).await?;

        let message_id = email
            .headers()
            .get_raw("Message-ID")
            .unwrap_or_default()
            .trim()
            .trim_matches(|c| c == '<' || c == '>')
            .to_string();

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );

        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                .map_err(|e| Error::Smtp(format!("SMTP relay setup: {}", e)))?
                .port(self.config.port)
                .credentials(creds)
                .build();

        transport
            .send(email)
            .await
            .map_err(|e| Error::Smtp(format!("SMTP send: {}", e)))?;

        info!(
            to = ?draft.to,
            subject = %draft.subject,
            attachments = draft.attachments.len(),
            "draft sent"
        );

        Ok(SendOutcome {
            provider_message_id: message_id,
        })
    }

    async fn build_message(&self, draft: &Draft) -> Result<lettre::Message> {
        let from: Mailbox = self
            .from_email
            .parse()
            .map_err(|e| Error::Smtp(format!("invalid from address: {}", e)))?;

        let mut builder = lettre::Message::builder()
            .from(from)
            .subject(draft.subject.clone())
            .date_now();

        for addr in &draft.to {
            let mbox: Mailbox = addr
                .parse()
                .map_err(|e| Error::InvalidDraft(format!("invalid to '{}': {}", addr, e)))?;
            builder = builder.to(mbox);
        }
        for addr in &draft.cc {
            let mbox: Mailbox = addr
                .parse()
                .map_err(|e| Error::InvalidDraft(format!("invalid cc '{}': {}", addr, e)))?;
            builder = builder.cc(mbox);
        }

        let text_part = SinglePart::builder()
            .content_type(ContentType::TEXT_PLAIN)
            .body(draft.body.clone());

        let email = if draft.attachments.is_empty() {
            builder
                .singlepart(text_part)
                .map_err(|e| Error::Smtp(format!("message build: {}", e)))?
        } else {
            let mut multi = MultiPart::mixed().singlepart(text_part);

            for att in &draft.attachments {
                let bytes = tokio::fs::read(&att.path).await.map_err(|e| {
                    Error::InvalidDraft(format!("cannot read attachment '{}': {}", att.path, e))
                })?;

                let content_type = ContentType::parse(&att.mime).unwrap_or(
                    ContentType::parse("application/octet-stream")
                        .expect("static content type parses"),
                );

                multi = multi.singlepart(Attachment::new(att.filename.clone()).body(bytes, content_type));
            }

            builder
                .multipart(multi)
                .map_err(|e| Error::Smtp(format!("message build: {}", e)))?
        };

        Ok(email)
    }
}
