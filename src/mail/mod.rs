//! Outgoing mail.
//!
//! Request handlers push [`MailData`] onto an unbounded channel and never wait for
//! delivery. A single [`MailWorker`] drains the channel and hands each message to a
//! [`MailSender`]. Failures are logged and the message is dropped; queued messages
//! do not survive a restart.

pub mod messages;
mod smtp;

pub use smtp::SmtpSender;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::MailConfig;

/// Placeholder replaced by the message content inside a named template
pub const BODY_PLACEHOLDER: &str = "[%body%]";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to read mail template {path}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A message waiting to be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct MailData {
    pub to: String,
    pub from: String,
    pub subject: String,
    /// Raw body, or the text substituted into `template`
    pub content: String,
    /// File name under the configured template directory
    pub template: Option<String>,
}

pub type MailQueue = mpsc::UnboundedSender<MailData>;

pub fn channel() -> (MailQueue, mpsc::UnboundedReceiver<MailData>) {
    mpsc::unbounded_channel()
}

/// Delivers a fully rendered message
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &MailData, body: &str) -> Result<(), MailError>;
}

/// Used when no SMTP relay is configured: messages are only logged
pub struct LogSender;

#[async_trait]
impl MailSender for LogSender {
    async fn send(&self, mail: &MailData, body: &str) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            bytes = body.len(),
            "SMTP not configured, mail logged instead of sent"
        );
        Ok(())
    }
}

/// Pick the sender matching the mail configuration
pub fn sender_from_config(config: &MailConfig) -> Arc<dyn MailSender> {
    if config.smtp_enabled() {
        Arc::new(SmtpSender::new(config.clone()))
    } else {
        Arc::new(LogSender)
    }
}

/// Substitute the content into the named template, or return the raw content
pub async fn render_body(template_dir: &std::path::Path, mail: &MailData) -> Result<String, MailError> {
    match &mail.template {
        None => Ok(mail.content.clone()),
        Some(name) => {
            let path = template_dir.join(name);
            let template = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| MailError::Template { path, source })?;
            Ok(template.replacen(BODY_PLACEHOLDER, &mail.content, 1))
        }
    }
}

/// Single background consumer of the mail queue
pub struct MailWorker {
    rx: mpsc::UnboundedReceiver<MailData>,
    sender: Arc<dyn MailSender>,
    template_dir: PathBuf,
}

impl MailWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<MailData>,
        sender: Arc<dyn MailSender>,
        template_dir: PathBuf,
    ) -> Self {
        Self {
            rx,
            sender,
            template_dir,
        }
    }

    /// Runs until every queue handle has been dropped
    pub async fn run(mut self) {
        tracing::info!("Mail worker started");

        while let Some(mail) = self.rx.recv().await {
            self.deliver(&mail).await;
        }

        tracing::info!("Mail worker stopped");
    }

    async fn deliver(&self, mail: &MailData) {
        let body = match render_body(&self.template_dir, mail).await {
            Ok(body) => body,
            Err(e) => {
                // Fall back to the raw content rather than dropping the message
                tracing::error!(error = %e, to = %mail.to, "Failed to render mail template");
                mail.content.clone()
            }
        };

        match self.sender.send(mail, &body).await {
            Ok(()) => tracing::debug!(to = %mail.to, subject = %mail.subject, "Mail delivered"),
            Err(e) => tracing::error!(error = %e, to = %mail.to, subject = %mail.subject, "Failed to send mail"),
        }
    }
}
