//! Outbound email.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::NotifyResult;

/// A composed email ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailMessage {
    pub to_name: String,
    pub to_address: String,
    pub subject: String,
    /// HTML body.
    pub content: String,
}

/// Email delivery channel.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &MailMessage) -> NotifyResult<()>;
}

/// Mailer that records the message in the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &MailMessage) -> NotifyResult<()> {
        info!(
            to = %mail.to_address,
            to_name = %mail.to_name,
            subject = %mail.subject,
            "email notification"
        );
        Ok(())
    }
}
