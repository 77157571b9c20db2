//! HTTP mail-API transport.
//!
//! Speaks the common JSON shape of transactional mail providers: a single
//! `POST /emails` with a bearer key, returning the provider's message id.
//! Transport and provider errors are absorbed into [`SendOutcome`] — the
//! caller never sees an `Err` from a send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Mailer, OutboundEmail, SendOutcome};

/// Default base URL for the mail API.
const MAIL_API_BASE: &str = "https://api.resend.com";

/// Client for a transactional HTTP mail API.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Sender identity, e.g. `"Campus Lost & Found <no-reply@example.edu>"`.
    from: String,
}

impl HttpMailer {
    /// Create a new mailer against the default API base.
    pub fn new(api_key: &str, from: &str) -> Self {
        Self::with_base_url(MAIL_API_BASE, api_key, from)
    }

    /// Create a new mailer with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        let url = format!("{}/emails", self.base_url);

        let payload = SendRequest {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html_body,
            reply_to: email.reply_to.as_deref(),
        };

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SendOutcome::failure(e.to_string()),
        };

        if !response.status().is_success() {
            return SendOutcome::failure(format!("mail API returned {}", response.status()));
        }

        match response.json::<SendResponse>().await {
            Ok(body) => SendOutcome::sent(body.id),
            Err(e) => SendOutcome::failure(format!("malformed mail API response: {e}")),
        }
    }
}

/// Request body for the mail API's send endpoint.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Response body from the mail API's send endpoint.
#[derive(Debug, Deserialize)]
struct SendResponse {
    /// Provider-assigned message id.
    #[serde(default)]
    id: String,
}
