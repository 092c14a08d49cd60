//! The Matrix client-server API client.

use crate::error::{MatrixError, MatrixResult};
use crate::types::{
    EventId, InboundEvent, MessageContent, NewRoomSpec, RoomId, RoomStateSummary, SyncBatch, UserId,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout for regular calls. `/sync` long-polls get a longer one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the homeserver may hold an incremental `/sync` open, in millis.
const SYNC_LONG_POLL_MS: u64 = 30_000;

/// Headroom on top of the server-side long-poll window.
const SYNC_CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    user_id: UserId,
}

/// Client for the subset of the Matrix client-server API the bridge uses.
///
/// All methods except [`MatrixClient::login`] require a prior successful
/// login and return [`MatrixError::NotLoggedIn`] otherwise.
pub struct MatrixClient {
    base_url: String,
    http: reqwest::Client,
    sync_http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    user_id: String,
}

#[derive(Deserialize)]
struct JoinedRoomsResponse {
    joined_rooms: Vec<RoomId>,
}

#[derive(Deserialize)]
struct CreateRoomResponse {
    room_id: RoomId,
}

#[derive(Deserialize)]
struct SendResponse {
    event_id: EventId,
}

#[derive(Deserialize)]
struct StateEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errcode: String,
    #[serde(default)]
    error: String,
}

impl MatrixClient {
    /// Create a client for the given homeserver base URL (no trailing slash
    /// required). No network traffic happens until [`MatrixClient::login`].
    pub fn new(homeserver_url: impl Into<String>) -> Self {
        let homeserver_url = homeserver_url.into();
        Self {
            base_url: homeserver_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            sync_http: reqwest::Client::builder()
                .timeout(SYNC_CLIENT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            session: RwLock::new(None),
        }
    }

    /// Log in with a username and password, storing the access token for
    /// all subsequent calls. Returns the fully-qualified user id.
    pub async fn login(&self, username: &str, password: &str) -> MatrixResult<UserId> {
        let url = format!("{}/_matrix/client/v3/login", self.base_url);
        let body = json!({
            "type": "m.login.password",
            "identifier": {
                "type": "m.id.user",
                "user": username,
            },
            "password": password,
        });
        let response = self.http.post(&url).json(&body).send().await?;
        let login: LoginResponse = Self::unwrap_response(response).await?;
        let user_id = UserId::new(login.user_id);
        debug!(user_id = %user_id, "Logged in to Matrix homeserver");
        *self.session.write().expect("session lock poisoned") = Some(Session {
            access_token: login.access_token,
            user_id: user_id.clone(),
        });
        Ok(user_id)
    }

    /// The logged-in user's id, if a login has succeeded.
    pub fn user_id(&self) -> Option<UserId> {
        self.session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.user_id.clone())
    }

    /// List the rooms the logged-in user has joined.
    pub async fn joined_rooms(&self) -> MatrixResult<Vec<RoomId>> {
        let url = format!("{}/_matrix/client/v3/joined_rooms", self.base_url);
        let response: JoinedRoomsResponse = self.get(&url).await?;
        Ok(response.joined_rooms)
    }

    /// Fetch a room's full state and fold it into the fields the bridge
    /// cares about: the display name and whether the room is a space.
    pub async fn room_state(&self, room_id: &RoomId) -> MatrixResult<RoomStateSummary> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/state",
            self.base_url,
            urlencoding::encode(room_id.as_str()),
        );
        let events: Vec<StateEvent> = self.get(&url).await?;
        Ok(fold_state(&events))
    }

    /// Create a private room (or space) and return its id.
    pub async fn create_room(&self, spec: &NewRoomSpec) -> MatrixResult<RoomId> {
        let url = format!("{}/_matrix/client/v3/createRoom", self.base_url);
        let mut body = json!({
            "visibility": "private",
            "name": spec.name,
            "topic": spec.topic,
            "invite": spec.invite,
        });
        if spec.as_space {
            body["creation_content"] = json!({ "type": "m.space" });
        }
        let token = self.token()?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        let created: CreateRoomResponse = Self::unwrap_response(response).await?;
        debug!(room_id = %created.room_id, as_space = spec.as_space, "Created room");
        Ok(created.room_id)
    }

    /// Mark `child` as a child room of the space `parent`, routable via the
    /// given server names.
    pub async fn add_space_child(
        &self,
        parent: &RoomId,
        child: &RoomId,
        via: &[String],
    ) -> MatrixResult<()> {
        self.send_state_event(
            parent,
            "m.space.child",
            child.as_str(),
            &json!({ "via": via }),
        )
        .await
    }

    /// Send a state event into a room.
    pub async fn send_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> MatrixResult<()> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/state/{}/{}",
            self.base_url,
            urlencoding::encode(room_id.as_str()),
            urlencoding::encode(event_type),
            urlencoding::encode(state_key),
        );
        let token = self.token()?;
        let response = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .json(content)
            .send()
            .await?;
        let _: Value = Self::unwrap_response(response).await?;
        Ok(())
    }

    /// Send a message event. When `ts_millis` is set the server is asked to
    /// record that timestamp instead of the arrival time, which keeps
    /// backfilled history in order.
    pub async fn send_message(
        &self,
        room_id: &RoomId,
        content: &MessageContent,
        ts_millis: Option<i64>,
    ) -> MatrixResult<EventId> {
        let txn_id = uuid::Uuid::new_v4().to_string();
        let mut url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.base_url,
            urlencoding::encode(room_id.as_str()),
            txn_id,
        );
        if let Some(ts) = ts_millis {
            url.push_str(&format!("?ts={ts}"));
        }
        let token = self.token()?;
        let response = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .json(content)
            .send()
            .await?;
        let sent: SendResponse = Self::unwrap_response(response).await?;
        Ok(sent.event_id)
    }

    /// One `/sync` round trip. With a `since` token this long-polls for new
    /// events; without one it returns the current position so callers can
    /// start syncing from "now".
    pub async fn sync(&self, since: Option<&str>) -> MatrixResult<SyncBatch> {
        let mut url = format!(
            "{}/_matrix/client/v3/sync?timeout={}",
            self.base_url, SYNC_LONG_POLL_MS,
        );
        if let Some(since) = since {
            url.push_str(&format!("&since={}", urlencoding::encode(since)));
        }
        let token = self.token()?;
        let response = self.sync_http.get(&url).bearer_auth(&token).send().await?;
        let body: Value = Self::unwrap_response(response).await?;
        Ok(parse_sync_batch(&body))
    }

    fn token(&self) -> MatrixResult<String> {
        self.session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(MatrixError::NotLoggedIn)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> MatrixResult<T> {
        let token = self.token()?;
        let response = self.http.get(url).bearer_auth(&token).send().await?;
        Self::unwrap_response(response).await
    }

    /// Parse a successful response, or the standard error body on failure.
    async fn unwrap_response<T: DeserializeOwned>(response: reqwest::Response) -> MatrixResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody {
            errcode: "M_UNKNOWN".to_string(),
            error: String::new(),
        });
        Err(MatrixError::Api {
            status: status.as_u16(),
            errcode: body.errcode,
            error: body.error,
        })
    }
}

impl std::fmt::Debug for MatrixClient {
    /// Omits the access token from debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Fold a room's state events into a [`RoomStateSummary`].
fn fold_state(events: &[StateEvent]) -> RoomStateSummary {
    let mut summary = RoomStateSummary::default();
    for event in events {
        match event.event_type.as_str() {
            "m.room.name" => {
                if let Some(name) = event.content.get("name").and_then(Value::as_str) {
                    summary.name = Some(name.to_string());
                }
            }
            "m.room.create" => {
                summary.is_space =
                    event.content.get("type").and_then(Value::as_str) == Some("m.space");
            }
            _ => {}
        }
    }
    summary
}

/// Pull `m.room.message` timeline events out of a `/sync` response body.
fn parse_sync_batch(body: &Value) -> SyncBatch {
    let next_batch = body
        .get("next_batch")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if next_batch.is_empty() {
        warn!("Sync response is missing next_batch");
    }

    let mut events = Vec::new();
    let joined = body
        .pointer("/rooms/join")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (room_id, room) in joined {
        let timeline = room
            .pointer("/timeline/events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for event in timeline {
            if event.get("type").and_then(Value::as_str) != Some("m.room.message") {
                continue;
            }
            let Some(event_id) = event.get("event_id").and_then(Value::as_str) else {
                continue;
            };
            let Some(sender) = event.get("sender").and_then(Value::as_str) else {
                continue;
            };
            let content = event.get("content").cloned().unwrap_or(Value::Null);
            events.push(InboundEvent {
                room_id: RoomId::new(room_id.clone()),
                event_id: EventId::new(event_id),
                sender: UserId::new(sender),
                msgtype: content
                    .get("msgtype")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                body: content
                    .get("body")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                origin_server_ts: event
                    .get("origin_server_ts")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
            });
        }
    }

    SyncBatch { next_batch, events }
}
