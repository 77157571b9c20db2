//! Outbound email for Reclaim.
//!
//! Everything that leaves the platform goes through the [`Mailer`] trait:
//! one configured outbound channel, injected into the matching engine and
//! the resolution coordinator rather than reached through process-wide
//! state. Two implementations:
//!
//! - [`HttpMailer`]: posts to an HTTP mail API
//! - [`MemoryMailer`]: records messages in memory; used by tests and by
//!   deployments with outbound email disabled
//!
//! A transport is allowed to fail. It is NOT allowed to panic or to return
//! an error type that callers might be tempted to propagate: failures are
//! absorbed into [`SendOutcome`] so a lost email can never roll back a
//! decision that already mutated canonical state.

pub mod http;
pub mod templates;

pub use http::HttpMailer;

use std::sync::Mutex;

use async_trait::async_trait;

/// A single structured message handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// Lets the recipient reply straight to the other party.
    pub reply_to: Option<String>,
}

/// Delivery report for one send attempt.
///
/// At most once per invocation; no transport in this crate retries.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    /// Opaque message id from the transport, present on success.
    pub transport_id: Option<String>,
    /// Failure reason, present on failure.
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(transport_id: impl Into<String>) -> Self {
        Self {
            success: true,
            transport_id: Some(transport_id.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            transport_id: None,
            error: Some(error.into()),
        }
    }
}

/// The one configured outbound channel, reused across calls.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Attempt delivery of a single message, reporting the outcome instead
    /// of erroring.
    async fn send(&self, email: &OutboundEmail) -> SendOutcome;
}

/// In-process mailer that records every message instead of delivering it.
///
/// Used by the test suites and as the transport when no mail API key is
/// configured. Optionally fails every send with a fixed error, for
/// exercising delivery-failure paths.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_with: Option<String>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with the given error text.
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(error.into()),
        }
    }

    /// Snapshot of every message handed to this mailer, in send order.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        self.sent
            .lock()
            .expect("mailer lock poisoned")
            .push(email.clone());

        match &self.fail_with {
            Some(error) => SendOutcome::failure(error.clone()),
            None => SendOutcome::sent(format!(
                "memory-{}",
                self.sent.lock().expect("mailer lock poisoned").len()
            )),
        }
    }
}
