// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Matrix client-server and Synapse admin APIs.
//!
//! All mutating calls accept an optional acting user id and origin timestamp
//! so reconstructed history is issued "as" the original sender "at" the
//! original time. Transient errors (429/500/503/529) are retried once.

use std::sync::RwLock;
use std::time::Duration;

use roomport_core::RoomportError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api;
use crate::types::{
    CreateMediaResponse, CreateRoomBody, CreateRoomResponse, DeleteRoomBody, DeleteRoomResponse,
    ErrorResponse, JoinRoomResponse, PingResponse, ProfileResponse, RoomMessagesResponse,
    SendEventResponse, parse_mxc,
};

/// Transient statuses worth one retry.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}

fn new_txn() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Client for one homeserver, authenticated as the appservice.
///
/// The admin token is held behind a lock so the `set-admin-token` command can
/// rotate it process-wide; the lock is never held across an await.
pub struct MatrixClient {
    http: reqwest::Client,
    base_url: String,
    admin_token: RwLock<String>,
}

impl MatrixClient {
    /// Creates a client for the given homeserver, presenting `as_token` on
    /// regular calls and `admin_token` on Synapse admin calls.
    pub fn new(hs_url: &str, as_token: &str, admin_token: &str) -> Result<Self, RoomportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {as_token}"))
                .map_err(|e| RoomportError::Config(format!("invalid as_token: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RoomportError::Http {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            base_url: api::sanitize_base(hs_url).to_string(),
            admin_token: RwLock::new(admin_token.to_string()),
        })
    }

    /// Replace the Synapse admin credential.
    pub fn rotate_admin_token(&self, token: &str) {
        match self.admin_token.write() {
            Ok(mut guard) => *guard = token.to_string(),
            Err(poisoned) => *poisoned.into_inner() = token.to_string(),
        }
    }

    fn admin_header(&self) -> String {
        let token = match self.admin_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        format!("Bearer {token}")
    }

    /// Appservice connectivity check.
    pub async fn ping(&self, as_id: &str) -> Result<PingResponse, RoomportError> {
        let url = api::ping(&self.base_url, as_id);
        self.execute("ping", || self.http.post(&url).json(&serde_json::json!({})))
            .await
    }

    pub async fn profile(&self, user_id: &str) -> Result<ProfileResponse, RoomportError> {
        let url = api::profile(&self.base_url, user_id);
        self.execute("profile", || self.http.get(&url)).await
    }

    pub async fn set_displayname(
        &self,
        user_id: &str,
        displayname: &str,
    ) -> Result<(), RoomportError> {
        let url = api::profile_displayname(&self.base_url, user_id);
        let body = serde_json::json!({ "displayname": displayname });
        let _: serde_json::Value = self
            .execute("set_displayname", || self.http.put(&url).json(&body))
            .await?;
        Ok(())
    }

    /// Ensure the bot profile carries the configured displayname. A missing
    /// profile (404) is created; a matching one is left alone.
    pub async fn setup_bot_profile(
        &self,
        user_id: &str,
        displayname: &str,
    ) -> Result<(), RoomportError> {
        match self.profile(user_id).await {
            Ok(profile) if profile.displayname.as_deref() == Some(displayname) => Ok(()),
            Ok(_) => self.set_displayname(user_id, displayname).await,
            Err(RoomportError::Matrix { status: 404, .. }) => {
                self.set_displayname(user_id, displayname).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn join_room(
        &self,
        room_id: &str,
        user_id: Option<&str>,
        ts: Option<i64>,
    ) -> Result<JoinRoomResponse, RoomportError> {
        let url = api::join_room(&self.base_url, room_id);
        let query = impersonation(user_id, ts);
        self.execute("join_room", || {
            self.http
                .post(&url)
                .query(&query)
                .json(&serde_json::json!({}))
        })
        .await
    }

    pub async fn create_room(
        &self,
        body: &CreateRoomBody,
        user_id: Option<&str>,
        ts: Option<i64>,
    ) -> Result<CreateRoomResponse, RoomportError> {
        let url = api::create_room(&self.base_url);
        let query = impersonation(user_id, ts);
        self.execute("create_room", || {
            self.http.post(&url).query(&query).json(body)
        })
        .await
    }

    /// Delete and purge a room via the Synapse admin API. Requires the
    /// privileged admin credential.
    pub async fn delete_room(
        &self,
        room_id: &str,
        body: &DeleteRoomBody,
    ) -> Result<DeleteRoomResponse, RoomportError> {
        let url = api::delete_room(&self.base_url, room_id);
        let auth = self.admin_header();
        self.execute("delete_room", || {
            self.http
                .delete(&url)
                .header(reqwest::header::AUTHORIZATION, auth.clone())
                .json(body)
        })
        .await
    }

    pub async fn send_event<C: Serialize>(
        &self,
        room_id: &str,
        event_type: &str,
        content: &C,
        user_id: Option<&str>,
        ts: Option<i64>,
    ) -> Result<SendEventResponse, RoomportError> {
        // One txn id per call: a retried attempt dedupes server-side.
        let url = api::send_event(&self.base_url, room_id, event_type, &new_txn());
        let query = impersonation(user_id, ts);
        self.execute("send_event", || {
            self.http.put(&url).query(&query).json(content)
        })
        .await
    }

    pub async fn send_state_event<C: Serialize>(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: &C,
        user_id: Option<&str>,
        ts: Option<i64>,
    ) -> Result<SendEventResponse, RoomportError> {
        let url = api::send_state_event(&self.base_url, room_id, event_type, state_key);
        let query = impersonation(user_id, ts);
        self.execute("send_state_event", || {
            self.http.put(&url).query(&query).json(content)
        })
        .await
    }

    pub async fn redact_event(
        &self,
        room_id: &str,
        event_id: &str,
        reason: Option<&str>,
    ) -> Result<(), RoomportError> {
        let url = api::redact_event(&self.base_url, room_id, event_id, &new_txn());
        let body = match reason {
            Some(reason) => serde_json::json!({ "reason": reason }),
            None => serde_json::json!({}),
        };
        let _: serde_json::Value = self
            .execute("redact_event", || self.http.put(&url).json(&body))
            .await?;
        Ok(())
    }

    pub async fn create_media(&self) -> Result<CreateMediaResponse, RoomportError> {
        let url = api::create_media(&self.base_url);
        self.execute("create_media", || self.http.post(&url)).await
    }

    pub async fn upload_media(
        &self,
        server_name: &str,
        media_id: &str,
        bytes: Vec<u8>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<(), RoomportError> {
        let url = api::upload_media(&self.base_url, server_name, media_id);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(filename) = filename {
            query.push(("filename", filename.to_string()));
        }
        let content_type = content_type.unwrap_or("application/octet-stream").to_string();
        let _: serde_json::Value = self
            .execute("upload_media", || {
                self.http
                    .put(&url)
                    .query(&query)
                    .header(reqwest::header::CONTENT_TYPE, content_type.clone())
                    .body(bytes.clone())
            })
            .await?;
        Ok(())
    }

    /// Create a media placeholder, upload `bytes` into it, and return the new
    /// `mxc://` uri.
    pub async fn create_and_upload_media(
        &self,
        bytes: Vec<u8>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<String, RoomportError> {
        let created = self.create_media().await?;
        let (server_name, media_id) = parse_mxc(&created.content_uri)?;
        self.upload_media(server_name, media_id, bytes, filename, content_type)
            .await?;
        Ok(created.content_uri)
    }

    /// Download a media blob by its `mxc://` uri.
    pub async fn download_media(&self, media_url: &str) -> Result<Vec<u8>, RoomportError> {
        let (server_name, media_id) = parse_mxc(media_url)?;
        let url = api::download_media(&self.base_url, server_name, media_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RoomportError::Http {
                message: format!("download_media request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response("download_media", status.as_u16(), &body));
        }
        let bytes = response.bytes().await.map_err(|e| RoomportError::Http {
            message: format!("download_media body read failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(bytes.to_vec())
    }

    /// One page of room history, walking backwards from `from`.
    pub async fn room_messages(
        &self,
        room_id: &str,
        from: Option<&str>,
        limit: u32,
    ) -> Result<RoomMessagesResponse, RoomportError> {
        let url = api::room_messages(&self.base_url, room_id);
        let mut query: Vec<(&str, String)> = vec![("dir", "b".to_string()), ("limit", limit.to_string())];
        if let Some(from) = from {
            query.push(("from", from.to_string()));
        }
        self.execute("room_messages", || self.http.get(&url).query(&query))
            .await
    }

    /// Send a request, retrying once on a transient status, and decode the
    /// success payload. Non-success payloads map to `RoomportError::Matrix`
    /// when they carry a Matrix error body.
    async fn execute<T: DeserializeOwned>(
        &self,
        op: &'static str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<T, RoomportError> {
        const MAX_RETRIES: u32 = 1;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                warn!(op, attempt, "retrying request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = build().send().await.map_err(|e| RoomportError::Http {
                message: format!("{op} request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

            let status = response.status();
            debug!(op, status = %status, attempt, "response received");

            if status.is_success() {
                let body = response.text().await.map_err(|e| RoomportError::Http {
                    message: format!("{op}: failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&body).map_err(|e| RoomportError::Http {
                    message: format!("{op}: failed to parse response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < MAX_RETRIES {
                warn!(op, status = %status, body = %body, "transient error, will retry");
                last_error = Some(error_from_response(op, status.as_u16(), &body));
                continue;
            }

            return Err(error_from_response(op, status.as_u16(), &body));
        }

        Err(last_error.unwrap_or_else(|| RoomportError::Http {
            message: format!("{op} failed after retries"),
            source: None,
        }))
    }
}

/// Impersonation query parameters for mutating calls.
fn impersonation(user_id: Option<&str>, ts: Option<i64>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(user_id) = user_id {
        query.push(("user_id", user_id.to_string()));
    }
    if let Some(ts) = ts {
        query.push(("ts", ts.to_string()));
    }
    query
}

fn error_from_response(op: &str, status: u16, body: &str) -> RoomportError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => RoomportError::Matrix {
            errcode: err.errcode,
            message: err.error.unwrap_or_default(),
            status,
        },
        Err(_) => RoomportError::Http {
            message: format!("{op} returned {status}: {body}"),
            source: None,
        },
    }
}
