//! Notification dispatch contract
//!
//! One `send` is one attempt to reach one user across every channel
//! they have. Channel successes are tracked independently: an alert
//! counts as delivered if at least one channel got through, and a
//! per-channel failure is timeline material, not a run error.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Per-channel result of one notification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub email_sent: bool,
    pub sms_sent: bool,
    pub error: Option<String>,
}

impl SendOutcome {
    /// At least one channel reached the member.
    pub fn delivered(&self) -> bool {
        self.email_sent || self.sms_sent
    }

    /// Timeline text naming per-channel success/failure.
    pub fn summary(&self) -> String {
        let email = if self.email_sent { "email ok" } else { "email failed" };
        let sms = if self.sms_sent { "sms ok" } else { "sms failed" };
        match &self.error {
            Some(err) => format!("{email}, {sms} ({err})"),
            None => format!("{email}, {sms}"),
        }
    }
}

/// Transport contract for a single notification attempt.
///
/// Implementations own template rendering and the actual email/SMS
/// transports; the core only sees per-channel booleans. Sending twice
/// for the same logical step is not safe, which is why the engine only
/// ever calls this through the journal.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        email: Option<&str>,
        phone: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<SendOutcome>;
}

/// Dispatcher that logs instead of sending; used by the CLI.
///
/// A channel counts as "sent" if the member has an address for it.
#[derive(Default)]
pub struct LogDispatcher;

impl LogDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(
        &self,
        user_id: &str,
        email: Option<&str>,
        phone: Option<&str>,
        subject: &str,
        _body: &str,
    ) -> Result<SendOutcome> {
        info!(
            user_id,
            email = email.unwrap_or("-"),
            phone = phone.unwrap_or("-"),
            subject,
            "Would send notification"
        );
        Ok(SendOutcome {
            email_sent: email.is_some(),
            sms_sent: phone.is_some(),
            error: None,
        })
    }
}
