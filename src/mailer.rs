//! Outbound email collaborator.
//!
//! Delivery itself lives outside this service; the contract is that a message
//! carrying a token-bearing link is handed to a [`Mailer`].

use std::sync::{Arc, Mutex};

use crate::error::{AppError, Result};

/// Why a link is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPurpose {
    ConfirmEmail,
    ResetPassword,
}

impl LinkPurpose {
    fn path(self) -> &'static str {
        match self {
            LinkPurpose::ConfirmEmail => "/auth/confirm-email",
            LinkPurpose::ResetPassword => "/reset-password",
        }
    }

    fn subject(self) -> &'static str {
        match self {
            LinkPurpose::ConfirmEmail => "Confirm your email address",
            LinkPurpose::ResetPassword => "Reset your password",
        }
    }
}

/// A message ready to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub link: String,
}

impl OutboundEmail {
    /// Builds the message for `purpose`, embedding `token` in the link.
    pub fn token_link(app_url: &str, to: &str, purpose: LinkPurpose, token: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: purpose.subject().to_string(),
            link: format!("{}{}?token={}", app_url, purpose.path(), token),
        }
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: OutboundEmail) -> Result<()>;
}

/// Records sends through `tracing`. The link is only logged at debug level.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: OutboundEmail) -> Result<()> {
        tracing::info!("📧 Email queued for {}: {}", email.to, email.subject);
        tracing::debug!("📧 Link: {}", email.link);
        Ok(())
    }
}

/// Keeps every message in memory. Used by tests to read the links back.
#[derive(Debug, Default, Clone)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// The token of the most recent link sent to `to`.
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|email| email.to == to)
            .and_then(|email| email.link.split("token=").nth(1).map(str::to_string))
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: OutboundEmail) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| AppError::Internal("Mailer poisoned".to_string()))?
            .push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_embed_the_token() {
        let email = OutboundEmail::token_link(
            "https://books.example",
            "reader@example.com",
            LinkPurpose::ResetPassword,
            "abc_123",
        );
        assert_eq!(email.link, "https://books.example/reset-password?token=abc_123");
        assert_eq!(email.subject, "Reset your password");
    }

    #[test]
    fn memory_mailer_returns_latest_token() {
        let mailer = MemoryMailer::new();
        for token in ["first", "second"] {
            mailer
                .send(OutboundEmail::token_link(
                    "http://localhost",
                    "a@example.com",
                    LinkPurpose::ConfirmEmail,
                    token,
                ))
                .unwrap();
        }
        assert_eq!(mailer.last_token_for("a@example.com").as_deref(), Some("second"));
        assert_eq!(mailer.last_token_for("b@example.com"), None);
    }
}
