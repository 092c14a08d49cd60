//! The Hostex HTTP client.

use crate::error::{HostexError, HostexResult};
use crate::types::{Conversation, ConversationsData, Envelope, MessagesData, RemoteMessage};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Authentication header expected by the Hostex API.
const ACCESS_TOKEN_HEADER: &str = "Hostex-Access-Token";

/// User agent sent on every request.
const USER_AGENT: &str = "hostex-matrix-bridge/0.1";

/// Request timeout for all Hostex calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stateless client for the Hostex conversations API.
///
/// Cheap to clone; the underlying `reqwest::Client` is shared.
#[derive(Clone)]
pub struct HostexClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HostexClient {
    /// Create a new client for the given API base URL and access token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// List all current conversations.
    pub async fn list_conversations(&self) -> HostexResult<Vec<Conversation>> {
        let url = format!("{}/conversations", self.base_url);
        let data: ConversationsData = self.get(&url).await?;
        debug!(count = data.conversations.len(), "Fetched Hostex conversations");
        Ok(data.conversations)
    }

    /// List messages in a conversation newer than `since`, up to `limit`.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> HostexResult<Vec<RemoteMessage>> {
        let url = format!(
            "{}?since={}&limit={}",
            self.messages_url(conversation_id),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
            limit,
        );
        let data: MessagesData = self.get(&url).await?;
        Ok(data.messages)
    }

    /// Send a text message into a conversation.
    pub async fn send_message(&self, conversation_id: &str, text: &str) -> HostexResult<()> {
        let url = self.messages_url(conversation_id);
        let response = self
            .http
            .post(&url)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&json!({ "message": text }))
            .send()
            .await?;

        // The send endpoint's envelope carries no payload worth keeping.
        let _: serde_json::Value = Self::unwrap_envelope(response).await?;
        Ok(())
    }

    /// Messages endpoint for one conversation, with the id path-encoded.
    fn messages_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/conversations/{}/messages",
            self.base_url,
            urlencoding::encode(conversation_id),
        )
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> HostexResult<T> {
        let response = self
            .http
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        Self::unwrap_envelope(response).await
    }

    /// Check HTTP status, then the in-body error code, and return the payload.
    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> HostexResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(HostexError::Status {
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if envelope.error_code != 200 {
            return Err(HostexError::Api {
                code: envelope.error_code,
                message: envelope.error_msg,
            });
        }

        envelope.data.ok_or(HostexError::Api {
            code: envelope.error_code,
            message: "missing data in response".to_string(),
        })
    }
}

impl std::fmt::Debug for HostexClient {
    /// Omits the access token from debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostexClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
