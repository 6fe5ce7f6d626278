//! Outbound email abstraction for reset and verification links.
//!
//! Delivery happens inline with the request: the token row is written first,
//! then the sender is invoked, so a delivery failure surfaces to the caller
//! while the token stays valid for a later retry of the same flow.
//! The sender decides how to deliver (SMTP, API, etc.) and returns `Ok`/`Err`.
//! The default sender for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction used by the verification flows.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to surface it as an upstream
    /// failure.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}
