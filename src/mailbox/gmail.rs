//! Gmail REST adapter: candidate listing and label management.
//!
//! Auth is either a static bearer token or an OAuth refresh token that is
//! exchanged for short-lived access tokens on demand. The interactive
//! consent flow is out of scope; obtain the refresh token elsewhere.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, MailboxError};
use crate::pipeline::types::{Category, LabelSink, MailboxSource, Message};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the reported expiry.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_MAX_CHARS: usize = 200;
/// Largest `maxResults` the list endpoint honours per page.
const LIST_PAGE_SIZE_MAX: usize = 500;

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug)]
pub enum GmailAuth {
    /// Pre-issued bearer token, used as-is.
    AccessToken(SecretString),
    /// OAuth client credentials plus a long-lived refresh token.
    RefreshToken {
        client_id: String,
        client_secret: SecretString,
        refresh_token: SecretString,
    },
}

#[derive(Debug)]
pub struct GmailConfig {
    pub api_base: String,
    pub token_url: String,
    pub auth: GmailAuth,
}

impl GmailConfig {
    /// Build config from environment variables.
    ///
    /// `GMAIL_ACCESS_TOKEN` wins when set; otherwise all of
    /// `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET` and `GMAIL_REFRESH_TOKEN`
    /// are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let auth = if let Some(token) = get("GMAIL_ACCESS_TOKEN") {
            GmailAuth::AccessToken(SecretString::from(token))
        } else {
            match (
                get("GMAIL_CLIENT_ID"),
                get("GMAIL_CLIENT_SECRET"),
                get("GMAIL_REFRESH_TOKEN"),
            ) {
                (Some(client_id), Some(secret), Some(refresh)) => GmailAuth::RefreshToken {
                    client_id,
                    client_secret: SecretString::from(secret),
                    refresh_token: SecretString::from(refresh),
                },
                _ => {
                    return Err(ConfigError::MissingRequired {
                        key: "GMAIL_ACCESS_TOKEN".to_string(),
                        hint: "Set GMAIL_ACCESS_TOKEN, or GMAIL_CLIENT_ID, GMAIL_CLIENT_SECRET \
                               and GMAIL_REFRESH_TOKEN"
                            .to_string(),
                    });
                }
            }
        };

        Ok(Self {
            api_base: get("GMAIL_API_BASE")
                .unwrap_or_else(|| GMAIL_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token_url: get("GMAIL_TOKEN_URL").unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            auth,
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

struct CachedToken {
    access_token: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────

pub struct GmailMailbox {
    client: Client,
    config: GmailConfig,
    html: HtmlStripper,
    token: Mutex<Option<CachedToken>>,
    /// Label name → id, for the process lifetime.
    label_ids: Mutex<HashMap<String, String>>,
}

impl GmailMailbox {
    pub fn new(config: GmailConfig) -> Result<Self, MailboxError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let html = HtmlStripper::new().map_err(|e| MailboxError::Decode(e.to_string()))?;
        Ok(Self {
            client,
            config,
            html,
            token: Mutex::new(None),
            label_ids: Mutex::new(HashMap::new()),
        })
    }

    async fn access_token(&self) -> Result<String, MailboxError> {
        let (client_id, client_secret, refresh_token) = match &self.config.auth {
            GmailAuth::AccessToken(token) => return Ok(token.expose_secret().to_string()),
            GmailAuth::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => (client_id, client_secret, refresh_token),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.access_token.expose_secret().to_string());
        }

        debug!("Refreshing Gmail access token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.expose_secret()),
                ("refresh_token", refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::Auth(format!(
                "token refresh failed: HTTP {}: {}",
                status.as_u16(),
                truncate(&body)
            )));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::Decode(e.to_string()))?;
        let lifetime = payload
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .saturating_sub(TOKEN_EXPIRY_SKEW_SECS)
            .max(0);
        let access_token = payload.access_token;
        *cached = Some(CachedToken {
            access_token: SecretString::from(access_token.clone()),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });
        Ok(access_token)
    }

    /// Authorize and send `request`, mapping non-2xx statuses to errors.
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, MailboxError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => MailboxError::RateLimited,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                MailboxError::Auth(format!("HTTP {}: {}", status.as_u16(), truncate(&body)))
            }
            _ => MailboxError::Api {
                status: status.as_u16(),
                message: truncate(&body),
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, MailboxError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| MailboxError::Decode(e.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.config.api_base)
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let raw: GmailMessage = self
            .send_json(
                self.client
                    .get(self.url(&format!("messages/{id}")))
                    .query(&[("format", "full")]),
            )
            .await?;
        Ok(self.to_message(raw))
    }

    fn to_message(&self, raw: GmailMessage) -> Message {
        let header = |name: &str| {
            raw.payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        let mut text = None;
        let mut html = None;
        collect_body_parts(&raw.payload, &mut text, &mut html);
        let body = text
            .or_else(|| html.map(|h| self.html.strip(&h)))
            .unwrap_or_default();

        Message {
            subject: header("Subject").unwrap_or_else(|| "No Subject".to_string()),
            sender: header("From").unwrap_or_else(|| "Unknown".to_string()),
            date: header("Date").unwrap_or_default(),
            snippet: decode_entities(&raw.snippet),
            body,
            id: raw.id,
        }
    }
}

#[async_trait]
impl MailboxSource for GmailMailbox {
    async fn fetch_unlabeled(
        &self,
        lookback_days: u32,
        max_count: usize,
    ) -> Result<Vec<Message>, MailboxError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let query = unlabeled_query(lookback_days, Utc::now());
        debug!(query = %query, "Listing unlabeled messages");

        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        while ids.len() < max_count {
            let page_size = (max_count - ids.len()).min(LIST_PAGE_SIZE_MAX).to_string();
            let mut request = self
                .client
                .get(self.url("messages"))
                .query(&[("q", query.as_str()), ("maxResults", page_size.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: MessageList = self.send_json(request).await?;
            if page.messages.is_empty() {
                break;
            }
            let remaining = max_count - ids.len();
            ids.extend(page.messages.into_iter().take(remaining).map(|m| m.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_message(&id).await {
                Ok(message) => messages.push(message),
                Err(e) => warn!(id = %id, error = %e, "Failed to fetch message, skipping"),
            }
        }

        info!(count = messages.len(), "Fetched unlabeled messages");
        Ok(messages)
    }
}

#[async_trait]
impl LabelSink for GmailMailbox {
    async fn resolve_label(&self, name: &str) -> Result<String, MailboxError> {
        // Held across the calls below so concurrent resolvers cannot both
        // create the same label.
        let mut cache = self.label_ids.lock().await;
        if let Some(id) = cache.get(name) {
            return Ok(id.clone());
        }

        let existing: LabelList = self.send_json(self.client.get(self.url("labels"))).await?;
        let id = match existing.labels.into_iter().find(|l| l.name == name) {
            Some(label) => label.id,
            None => {
                let created: GmailLabel = self
                    .send_json(self.client.post(self.url("labels")).json(&serde_json::json!({
                        "name": name,
                        "labelListVisibility": "labelShow",
                        "messageListVisibility": "show",
                    })))
                    .await?;
                info!(label = %created.name, id = %created.id, "Created label");
                created.id
            }
        };

        cache.insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError> {
        let request = self
            .client
            .post(self.url(&format!("messages/{message_id}/modify")))
            .json(&serde_json::json!({ "addLabelIds": [label_id] }));

        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(MailboxError::Api { status: 404, .. }) => {
                Err(MailboxError::MessageNotFound(message_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Search query for recent mail carrying none of the category labels.
pub fn unlabeled_query(lookback_days: u32, now: DateTime<Utc>) -> String {
    let after = now - chrono::Duration::days(i64::from(lookback_days));
    let mut query = format!("after:{}", after.format("%Y/%m/%d"));
    for name in Category::all_label_names() {
        query.push_str(&format!(" -label:\"{name}\""));
    }
    query
}

/// First `text/plain` and first `text/html` leaf, depth first.
fn collect_body_parts(payload: &Payload, text: &mut Option<String>, html: &mut Option<String>) {
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref())
        && !data.is_empty()
        && let Some(decoded) = decode_body_data(data)
    {
        let mime = payload.mime_type.to_ascii_lowercase();
        if mime == "text/plain" && text.is_none() {
            *text = Some(decoded);
        } else if mime == "text/html" && html.is_none() {
            *html = Some(decoded);
        }
    }

    for part in &payload.parts {
        collect_body_parts(part, text, html);
    }
}

/// Gmail bodies are base64url; padding is sometimes present.
fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_MAX_CHARS).collect()
}

/// HTML to whitespace-normalized text.
struct HtmlStripper {
    hidden: Regex,
    tags: Regex,
}

impl HtmlStripper {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hidden: Regex::new(r"(?is)<(script|style|head)\b[^>]*>.*?</(script|style|head)\s*>")?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    fn strip(&self, html: &str) -> String {
        let visible = self.hidden.replace_all(html, " ");
        let text = self.tags.replace_all(&visible, " ");
        decode_entities(&text)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn mailbox(server: &MockServer) -> GmailMailbox {
        GmailMailbox::new(GmailConfig {
            api_base: server.uri(),
            token_url: format!("{}/token", server.uri()),
            auth: GmailAuth::AccessToken(SecretString::from("tok")),
        })
        .unwrap()
    }

    fn b64(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    // ── Config ──

    #[test]
    fn config_prefers_access_token() {
        let config = GmailConfig::from_lookup(lookup_from(&[
            ("GMAIL_ACCESS_TOKEN", "abc"),
            ("GMAIL_CLIENT_ID", "id"),
        ]))
        .unwrap();
        assert!(matches!(config.auth, GmailAuth::AccessToken(ref t) if t.expose_secret() == "abc"));
        assert_eq!(config.api_base, GMAIL_API_BASE);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn config_accepts_refresh_credentials() {
        let config = GmailConfig::from_lookup(lookup_from(&[
            ("GMAIL_CLIENT_ID", "id"),
            ("GMAIL_CLIENT_SECRET", "secret"),
            ("GMAIL_REFRESH_TOKEN", "refresh"),
            ("GMAIL_API_BASE", "http://localhost:9999/gmail/v1/"),
        ]))
        .unwrap();
        assert!(matches!(config.auth, GmailAuth::RefreshToken { ref client_id, .. } if client_id == "id"));
        assert_eq!(config.api_base, "http://localhost:9999/gmail/v1");
    }

    #[test]
    fn config_requires_some_credentials() {
        let err = GmailConfig::from_lookup(lookup_from(&[("GMAIL_CLIENT_ID", "id")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    // ── Helpers ──

    #[test]
    fn query_excludes_all_category_labels() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap();
        assert_eq!(
            unlabeled_query(1, now),
            "after:2025/03/01 -label:\"🚀 Seeds Planted\" -label:\"⚡ Action Required\" \
             -label:\"📦 Inbox Clutter\""
        );
        assert!(unlabeled_query(7, now).starts_with("after:2025/02/23 "));
    }

    #[test]
    fn body_data_decodes_with_or_without_padding() {
        assert_eq!(decode_body_data("aGk").as_deref(), Some("hi"));
        assert_eq!(decode_body_data("aGk=").as_deref(), Some("hi"));
        assert_eq!(decode_body_data("!!!"), None);
    }

    #[test]
    fn html_is_stripped_to_text() {
        let stripper = HtmlStripper::new().unwrap();
        let html = "<html><head><title>x</title></head><body><style>p{}</style>\
                    <p>Thank&nbsp;you <b>Sam</b></p><script>alert(1)</script><br/>We&#39;ll be in touch</body></html>";
        assert_eq!(stripper.strip(html), "Thank you Sam We'll be in touch");
    }

    #[test]
    fn plain_text_part_is_preferred_over_html() {
        let payload: Payload = serde_json::from_value(json!({
            "mimeType": "multipart/alternative",
            "parts": [
                { "mimeType": "text/html", "body": { "data": b64("<p>html</p>") } },
                { "mimeType": "text/plain", "body": { "data": b64("plain") } }
            ]
        }))
        .unwrap();
        let mut text = None;
        let mut html = None;
        collect_body_parts(&payload, &mut text, &mut html);
        assert_eq!(text.as_deref(), Some("plain"));
        assert_eq!(html.as_deref(), Some("<p>html</p>"));
    }

    // ── HTTP ──

    #[tokio::test]
    async fn fetch_unlabeled_lists_and_maps_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("maxResults", "2"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "m1" }, { "id": "m2" }, { "id": "m3" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/m1"))
            .and(query_param("format", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m1",
                "snippet": "We&#39;ve received it",
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [
                        { "name": "Subject", "value": "Thank you for your application" },
                        { "name": "From", "value": "hr@company.com" },
                        { "name": "Date", "value": "Mon, 3 Mar 2025 10:00:00 +0000" }
                    ],
                    "body": { "data": b64("Hello there") }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/m2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m2",
                "payload": {
                    "mimeType": "text/html",
                    "body": { "data": b64("<div>Interview <i>slot</i></div>") }
                }
            })))
            .mount(&server)
            .await;

        let messages = mailbox(&server).fetch_unlabeled(1, 2).await.unwrap();
        assert_eq!(messages.len(), 2);

        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].subject, "Thank you for your application");
        assert_eq!(messages[0].sender, "hr@company.com");
        assert_eq!(messages[0].snippet, "We've received it");
        assert_eq!(messages[0].body, "Hello there");

        assert_eq!(messages[1].subject, "No Subject");
        assert_eq!(messages[1].sender, "Unknown");
        assert_eq!(messages[1].date, "");
        assert_eq!(messages[1].body, "Interview slot");

        let requests = server.received_requests().await.unwrap();
        let q = requests[0]
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(q.starts_with("after:"));
        assert!(q.contains("-label:\"📦 Inbox Clutter\""));
    }

    fn minimal_message(id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "payload": { "mimeType": "text/plain" }
        }))
    }

    #[tokio::test]
    async fn fetch_unlabeled_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("pageToken", "p2"))
            .and(query_param("maxResults", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "m3" }, { "id": "m4" }],
                "nextPageToken": "p3"
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("maxResults", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "m1" }, { "id": "m2" }],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        for id in ["m1", "m2", "m3"] {
            Mock::given(method("GET"))
                .and(path(format!("/users/me/messages/{id}")))
                .respond_with(minimal_message(id))
                .mount(&server)
                .await;
        }

        let messages = mailbox(&server).fetch_unlabeled(1, 3).await.unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn list_page_size_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("maxResults", "500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "m1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/m1"))
            .respond_with(minimal_message("m1"))
            .mount(&server)
            .await;

        let messages = mailbox(&server).fetch_unlabeled(1, 1200).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn failing_message_fetch_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "bad" }, { "id": "good" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "good" })))
            .mount(&server)
            .await;

        let messages = mailbox(&server).fetch_unlabeled(1, 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "good");
    }

    #[tokio::test]
    async fn empty_listing_yields_no_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultSizeEstimate": 0 })))
            .mount(&server)
            .await;
        assert!(mailbox(&server).fetch_unlabeled(1, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let err = mailbox(&server).fetch_unlabeled(1, 50).await.unwrap_err();
        assert!(matches!(err, MailboxError::RateLimited));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;
        let err = mailbox(&server).fetch_unlabeled(1, 50).await.unwrap_err();
        assert!(matches!(err, MailboxError::Auth(ref m) if m.contains("invalid credentials")));
    }

    #[tokio::test]
    async fn resolve_label_finds_existing_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "labels": [
                    { "id": "INBOX", "name": "INBOX" },
                    { "id": "Label_7", "name": "⚡ Action Required" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mailbox = mailbox(&server);
        assert_eq!(mailbox.resolve_label("⚡ Action Required").await.unwrap(), "Label_7");
        assert_eq!(mailbox.resolve_label("⚡ Action Required").await.unwrap(), "Label_7");
    }

    #[tokio::test]
    async fn resolve_label_creates_missing_label() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "labels": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/labels"))
            .and(body_json(json!({
                "name": "🚀 Seeds Planted",
                "labelListVisibility": "labelShow",
                "messageListVisibility": "show"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "Label_42",
                "name": "🚀 Seeds Planted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mailbox = mailbox(&server);
        assert_eq!(mailbox.resolve_label("🚀 Seeds Planted").await.unwrap(), "Label_42");
        assert_eq!(mailbox.resolve_label("🚀 Seeds Planted").await.unwrap(), "Label_42");
    }

    #[tokio::test]
    async fn apply_label_posts_modify() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/me/messages/m1/modify"))
            .and(body_json(json!({ "addLabelIds": ["Label_1"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/messages/gone/modify"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mailbox = mailbox(&server);
        mailbox.apply_label("m1", "Label_1").await.unwrap();
        let err = mailbox.apply_label("gone", "Label_1").await.unwrap_err();
        assert!(matches!(err, MailboxError::MessageNotFound(ref id) if id == "gone"));
    }

    #[tokio::test]
    async fn refresh_token_is_exchanged_once_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/labels"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "labels": [] })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "L", "name": "x"
            })))
            .mount(&server)
            .await;

        let mailbox = GmailMailbox::new(GmailConfig {
            api_base: server.uri(),
            token_url: format!("{}/token", server.uri()),
            auth: GmailAuth::RefreshToken {
                client_id: "cid".into(),
                client_secret: SecretString::from("cs"),
                refresh_token: SecretString::from("r-123"),
            },
        })
        .unwrap();

        mailbox.resolve_label("a").await.unwrap();
        mailbox.resolve_label("b").await.unwrap();
    }

    #[tokio::test]
    async fn failed_refresh_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let mailbox = GmailMailbox::new(GmailConfig {
            api_base: server.uri(),
            token_url: format!("{}/token", server.uri()),
            auth: GmailAuth::RefreshToken {
                client_id: "cid".into(),
                client_secret: SecretString::from("cs"),
                refresh_token: SecretString::from("revoked"),
            },
        })
        .unwrap();

        let err = mailbox.fetch_unlabeled(1, 10).await.unwrap_err();
        assert!(matches!(err, MailboxError::Auth(ref m) if m.contains("invalid_grant")));
    }
}
