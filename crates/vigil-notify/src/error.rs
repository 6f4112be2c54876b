//! Notification error types.

use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors raised by broadcasters and senders.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("sender not configured: {0}")]
    NotConfigured(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
