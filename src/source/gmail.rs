//! Gmail REST implementation of [`MessageSource`].
//!
//! Listing is two calls per sender (INBOX and SPAM label queries, unioned
//! by id) plus one metadata fetch per message. Sending posts a raw MIME
//! message built with lettre; Gmail stamps the authenticated account as
//! the real From regardless of the header.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GlobalConfig;
use crate::error::{Error, SourceError};
use crate::source::auth::TokenProvider;
use crate::source::{IncomingMessage, MessageSource};

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Page cap for one list call; one cron run never needs more, the rest is
/// picked up by the next invocation.
const LIST_MAX_RESULTS: u32 = 100;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    id: String,
    #[serde(default)]
    snippet: String,
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Part {
    body: Option<PartBody>,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(rename = "emailAddress")]
    email_address: String,
}

// ── Source ──────────────────────────────────────────────────────────

/// Gmail-backed message source.
///
/// Quota note: a full bounce cycle (send + reply delete + original delete)
/// costs roughly 225 quota units against the shared 250 units/second
/// ceiling, which is why the engine caps in-flight calls at `pool_size`.
pub struct GmailSource {
    client: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
    /// Authenticated account address, used as the reply From header.
    user_address: String,
}

impl GmailSource {
    /// Build the source and verify credentials by fetching the account
    /// profile. Credential failure here is fatal to the run.
    pub async fn connect(config: &GlobalConfig) -> Result<Self, Error> {
        let tokens = TokenProvider::new(
            config.token_file.clone(),
            config.credentials_file.clone(),
        );
        let client = reqwest::Client::new();

        let access_token = tokens.access_token().await?;
        let profile: Profile = client
            .get(format!("{GMAIL_BASE}/profile"))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| SourceError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        debug!(account = %profile.email_address, "connected to gmail");
        Ok(Self {
            client,
            tokens,
            base_url: GMAIL_BASE.to_string(),
            user_address: profile.email_address,
        })
    }

    async fn list_label(
        &self,
        sender: &str,
        label: &str,
        access_token: &str,
    ) -> Result<Vec<MessageRef>, SourceError> {
        let query = unread_from_query(sender);
        let max_results = LIST_MAX_RESULTS.to_string();
        let list: MessageList = self
            .client
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(access_token)
            .query(&[
                ("q", query.as_str()),
                ("labelIds", label),
                ("includeSpamTrash", "true"),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await
            .map_err(|e| list_failed(sender, e))?
            .error_for_status()
            .map_err(|e| list_failed(sender, e))?
            .json()
            .await
            .map_err(|e| list_failed(sender, e))?;
        Ok(list.messages)
    }

    async fn fetch(&self, id: &str, access_token: &str) -> Result<IncomingMessage, SourceError> {
        let fetch_failed = |e: reqwest::Error| SourceError::FetchFailed {
            id: id.to_string(),
            reason: e.to_string(),
        };
        let detail: MessageDetail = self
            .client
            .get(format!("{}/messages/{id}", self.base_url))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(fetch_failed)?
            .error_for_status()
            .map_err(fetch_failed)?
            .json()
            .await
            .map_err(fetch_failed)?;
        Ok(detail_to_message(detail))
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    async fn list(&self, sender: &str) -> Result<Vec<IncomingMessage>, SourceError> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| list_failed_str(sender, e.to_string()))?;

        // INBOX and SPAM are separate queries; labelIds are ANDed by the
        // API, so a single call cannot cover both.
        let mut refs = self.list_label(sender, "INBOX", &access_token).await?;
        refs.extend(self.list_label(sender, "SPAM", &access_token).await?);
        refs.sort_by(|a, b| a.id.cmp(&b.id));
        refs.dedup_by(|a, b| a.id == b.id);

        debug!(sender = %sender, count = refs.len(), "listed unread messages");

        let mut messages = Vec::with_capacity(refs.len());
        for message_ref in refs {
            messages.push(self.fetch(&message_ref.id, &access_token).await?);
        }
        Ok(messages)
    }

    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, SourceError> {
        let send_failed = |reason: String| SourceError::SendFailed {
            recipient: recipient.to_string(),
            reason,
        };

        let mime = lettre::Message::builder()
            .from(
                self.user_address
                    .parse()
                    .map_err(|e| send_failed(format!("invalid from address: {e}")))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| send_failed(format!("invalid to address: {e}")))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| send_failed(format!("failed to build message: {e}")))?;

        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        let response: SendResponse = self
            .client
            .post(format!("{}/messages/send", self.base_url))
            .bearer_auth(&access_token)
            .json(&serde_json::json!({
                "raw": URL_SAFE.encode(mime.formatted())
            }))
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| send_failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        Ok(response.id)
    }

    async fn delete(&self, id: &str) -> Result<(), SourceError> {
        let delete_failed = |reason: String| SourceError::DeleteFailed {
            id: id.to_string(),
            reason,
        };

        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| delete_failed(e.to_string()))?;

        self.client
            .delete(format!("{}/messages/{id}", self.base_url))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| delete_failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| delete_failed(e.to_string()))?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn list_failed(sender: &str, e: reqwest::Error) -> SourceError {
    list_failed_str(sender, e.to_string())
}

fn list_failed_str(sender: &str, reason: String) -> SourceError {
    SourceError::ListFailed {
        sender: sender.to_string(),
        reason,
    }
}

/// Gmail search query for unread mail from one sender.
fn unread_from_query(sender: &str) -> String {
    format!("from:{sender} is:unread")
}

/// Convert a fetched message into the engine's view of it. Missing header
/// fields degrade to empty strings with a warning; the body falls back to
/// the snippet when no decodable part exists.
fn detail_to_message(detail: MessageDetail) -> IncomingMessage {
    let headers = detail
        .payload
        .as_ref()
        .map(|p| p.headers.as_slice())
        .unwrap_or_default();

    let body = detail
        .payload
        .as_ref()
        .and_then(|p| p.parts.first())
        .and_then(|part| part.body.as_ref())
        .and_then(|b| b.data.as_deref())
        .and_then(decode_body)
        .unwrap_or_else(|| detail.snippet.clone());

    IncomingMessage {
        sender: parse_address(&header_value(headers, "From", &detail.id)),
        recipient: header_value(headers, "To", &detail.id),
        subject: header_value(headers, "Subject", &detail.id),
        date: header_value(headers, "Date", &detail.id),
        body,
        id: detail.id,
    }
}

fn header_value(headers: &[Header], name: &str, id: &str) -> String {
    match headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)) {
        Some(header) => header.value.clone(),
        None => {
            warn!(message = %id, header = name, "header field missing");
            String::new()
        }
    }
}

/// Decode a base64url body part; Gmail pads inconsistently.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')))
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Extract the bare address from a From header like `Name <a@b.com>`.
fn parse_address(raw: &str) -> String {
    match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => raw[start + 1..end].to_string(),
        _ => raw.trim().to_string(),
    }
}
