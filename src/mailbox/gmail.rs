//! Gmail REST API implementation of [`Mailbox`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    Label, LabelModification, MailMessage, MailThread, Mailbox, MessageRef, NewLabel,
};
use crate::auth::Authenticator;
use crate::error::MailboxError;
use crate::mime;

/// Upper bound on references requested per list page.
const MAX_PAGE_SIZE: usize = 500;

// ── API response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    /// Milliseconds since the epoch, as a decimal string.
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<GmailPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    #[serde(default)]
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailThread {
    id: String,
    #[serde(default)]
    messages: Vec<GmailMessage>,
}

#[derive(Debug, Deserialize)]
struct ModifiedThread {
    #[serde(default)]
    messages: Vec<ModifiedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModifiedMessage {
    #[serde(default)]
    label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail API client for one mailbox user.
pub struct GmailClient {
    http: Client,
    auth: Arc<Authenticator>,
    /// `{api_base}/users/{user_id}`
    base_url: String,
}

impl GmailClient {
    pub fn new(http: Client, auth: Arc<Authenticator>, api_base: &str, user_id: &str) -> Self {
        Self {
            http,
            auth,
            base_url: format!("{}/users/{}", api_base.trim_end_matches('/'), user_id),
        }
    }

    /// Shared HTTP client with the timeout used for every mailbox call.
    pub fn http_client() -> Client {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, MailboxError> {
        let token = self.auth.access_token().await?;
        let resp = request.bearer_auth(token.expose_secret()).send().await?;
        let resp = check_status(operation, resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| MailboxError::InvalidResponse {
                operation,
                reason: e.to_string(),
            })
    }
}

async fn check_status(operation: &'static str, resp: Response) -> Result<Response, MailboxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MailboxError::Api {
        operation,
        status: status.as_u16(),
        body,
    })
}

/// Reject ids that would escape the resource path.
fn validate_id(entity: &'static str, id: &str) -> Result<(), MailboxError> {
    if id.is_empty() || id.contains(['/', '\\', '?', '#']) || id.contains("..") {
        return Err(MailboxError::NotFound {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        label_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let mut refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = max_results.clamp(1, MAX_PAGE_SIZE).to_string();

        loop {
            let mut params: Vec<(&str, &str)> = vec![("q", query), ("maxResults", page_size.as_str())];
            for label in label_ids {
                params.push(("labelIds", label.as_str()));
            }
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let request = self
                .http
                .get(format!("{}/messages", self.base_url))
                .query(&params);
            let page: ListMessagesResponse = self.execute("list_messages", request).await?;
            refs.extend(page.messages);

            match page.next_page_token {
                Some(next) if refs.len() < max_results => page_token = Some(next),
                _ => break,
            }
        }

        refs.truncate(max_results);
        debug!(query, count = refs.len(), "Listed messages");
        Ok(refs)
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        validate_id("message", id)?;
        let request = self
            .http
            .get(format!("{}/messages/{}", self.base_url, id))
            .query(&[("format", "full")]);
        let raw: GmailMessage = self.execute("get_message", request).await?;
        Ok(parse_message(raw))
    }

    async fn get_thread(&self, id: &str) -> Result<MailThread, MailboxError> {
        validate_id("thread", id)?;
        let request = self
            .http
            .get(format!("{}/threads/{}", self.base_url, id))
            .query(&[("format", "full")]);
        let raw: GmailThread = self.execute("get_thread", request).await?;
        debug!(thread_id = %raw.id, messages = raw.messages.len(), "Fetched thread");
        Ok(MailThread {
            id: raw.id,
            messages: raw.messages.into_iter().map(parse_message).collect(),
        })
    }

    async fn send_message(
        &self,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<String, MailboxError> {
        let mut body = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = thread_id {
            body["threadId"] = serde_json::Value::from(thread_id);
        }
        let request = self
            .http
            .post(format!("{}/messages/send", self.base_url))
            .json(&body);
        let sent: SentMessage = self.execute("send_message", request).await?;
        Ok(sent.id)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
        let request = self.http.get(format!("{}/labels", self.base_url));
        let resp: ListLabelsResponse = self.execute("list_labels", request).await?;
        Ok(resp.labels)
    }

    async fn create_label(&self, label: &NewLabel) -> Result<Label, MailboxError> {
        let request = self
            .http
            .post(format!("{}/labels", self.base_url))
            .json(label);
        self.execute("create_label", request).await
    }

    async fn modify_thread(
        &self,
        id: &str,
        change: &LabelModification,
    ) -> Result<Vec<String>, MailboxError> {
        validate_id("thread", id)?;
        let request = self
            .http
            .post(format!("{}/threads/{}/modify", self.base_url, id))
            .json(change);
        let thread: ModifiedThread = self.execute("modify_thread", request).await?;

        let mut labels: Vec<String> = Vec::new();
        for message in thread.messages {
            for label in message.label_ids {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        Ok(labels)
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn parse_message(raw: GmailMessage) -> MailMessage {
    let payload = raw.payload.unwrap_or_default();
    let from_header = find_header(&payload.headers, "From").unwrap_or_default();
    let subject = find_header(&payload.headers, "Subject").unwrap_or_default();

    MailMessage {
        id: raw.id,
        thread_id: raw.thread_id,
        sender: mime::parse_address(&from_header),
        from_header,
        subject,
        body_text: extract_body_text(&payload),
        label_ids: raw.label_ids,
        received_at: parse_internal_date(raw.internal_date.as_deref()),
    }
}

/// Millisecond epoch string to a timestamp.
///
/// Missing or malformed dates map to the epoch, so such a message can never
/// pass the freshness check.
fn parse_internal_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|d| d.trim().parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Header lookup, case-insensitive on the name.
fn find_header(headers: &[GmailHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.trim().eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// First `text/plain` part, searching nested multiparts; else the top-level body.
fn extract_body_text(payload: &GmailPart) -> String {
    if let Some(text) = find_text_part(std::slice::from_ref(payload)) {
        return text;
    }
    payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .and_then(mime::decode_base64url)
        .unwrap_or_default()
}

fn find_text_part(parts: &[GmailPart]) -> Option<String> {
    for part in parts {
        if part.mime_type == "text/plain"
            && let Some(text) = part
                .body
                .as_ref()
                .and_then(|b| b.data.as_deref())
                .and_then(mime::decode_base64url)
        {
            return Some(text);
        }
        if let Some(text) = find_text_part(&part.parts) {
            return Some(text);
        }
    }
    None
}
