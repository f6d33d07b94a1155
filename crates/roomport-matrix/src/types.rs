// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the Matrix client-server and Synapse admin APIs.
//!
//! Outbound bodies use `skip_serializing_if` so optional fields are omitted
//! rather than sent as null; inbound types tolerate unknown fields.

use roomport_core::RoomportError;
use serde::{Deserialize, Serialize};

/// Error payload every Matrix endpoint may answer with.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub errcode: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// One batch of events pushed by the homeserver to the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub events: Vec<ClientEvent>,
    /// Ephemeral events (MSC2409). Acknowledged but not dispatched.
    #[serde(default, rename = "de.sorunome.msc2409.ephemeral")]
    pub ephemeral: Option<Vec<serde_json::Value>>,
    /// To-device events (MSC2409). Acknowledged but not dispatched.
    #[serde(default, rename = "de.sorunome.msc2409.to_device")]
    pub to_device: Option<Vec<serde_json::Value>>,
}

/// Generic timeline event envelope as pushed by the homeserver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub sender: String,
    pub room_id: String,
    pub event_id: String,
    pub origin_server_ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<serde_json::Value>,
}

/// Membership states of an `m.room.member` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Knock,
    Leave,
    Ban,
}

/// Content of an `m.room.member` event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemberContent {
    pub membership: Membership,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MemberContent {
    pub fn leave() -> Self {
        Self {
            membership: Membership::Leave,
            displayname: None,
            avatar_url: None,
            reason: None,
        }
    }
}

/// Content of an `m.room.message` event, inbound and outbound.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MessageContent {
    pub msgtype: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// `mxc://` reference for file-bearing message types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
    #[serde(
        default,
        rename = "m.mentions",
        skip_serializing_if = "Option::is_none"
    )]
    pub mentions: Option<serde_json::Value>,
    #[serde(
        default,
        rename = "m.relates_to",
        skip_serializing_if = "Option::is_none"
    )]
    pub relates_to: Option<RelatesTo>,
}

impl MessageContent {
    /// Plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            msgtype: "m.text".into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Notice threaded under `root_event_id` (the bot's status messages).
    pub fn thread_notice(body: impl Into<String>, root_event_id: &str) -> Self {
        Self {
            msgtype: "m.notice".into(),
            body: body.into(),
            relates_to: Some(RelatesTo::thread(root_event_id)),
            ..Self::default()
        }
    }

    /// Whether this message carries a file attachment.
    pub fn is_file(&self) -> bool {
        self.url.is_some() && matches!(self.msgtype.as_str(), "m.file" | "m.image" | "m.video" | "m.audio")
    }
}

/// Relation block (`m.relates_to`), shared by messages and reactions.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelatesTo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Annotation key (the reaction emoji).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_falling_back: Option<bool>,
    #[serde(
        default,
        rename = "m.in_reply_to",
        skip_serializing_if = "Option::is_none"
    )]
    pub in_reply_to: Option<InReplyTo>,
}

impl RelatesTo {
    pub fn thread(root_event_id: &str) -> Self {
        Self {
            rel_type: Some("m.thread".into()),
            event_id: Some(root_event_id.into()),
            ..Self::default()
        }
    }

    /// The event this relation ultimately points at: the thread root when
    /// present, otherwise the rich-reply target.
    pub fn referenced_event_id(&self) -> Option<&str> {
        self.event_id
            .as_deref()
            .or_else(|| self.in_reply_to.as_ref().map(|r| r.event_id.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InReplyTo {
    pub event_id: String,
}

/// Content of a reaction event.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReactionContent {
    #[serde(
        default,
        rename = "m.relates_to",
        skip_serializing_if = "Option::is_none"
    )]
    pub relates_to: Option<RelatesTo>,
}

/// Body of `POST /createRoom`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateRoomBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub initial_state: Vec<StateEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_content: Option<CreationContent>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreationContent {
    #[serde(rename = "m.federate", skip_serializing_if = "Option::is_none")]
    pub federate: Option<bool>,
}

/// Initial state entry of a room-creation body.
#[derive(Debug, Clone, Serialize)]
pub struct StateEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoomResponse {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendEventResponse {
    pub event_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMediaResponse {
    pub content_uri: String,
    #[serde(default)]
    pub unused_expires_at: Option<i64>,
}

/// Body of the Synapse admin room deletion endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteRoomBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRoomResponse {
    #[serde(default)]
    pub delete_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

/// One page of `GET /rooms/{roomId}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomMessagesResponse {
    pub chunk: Vec<ClientEvent>,
    #[serde(default)]
    pub start: Option<String>,
    /// Absent when the server has no further history.
    #[serde(default)]
    pub end: Option<String>,
}

/// Split an `mxc://server/media_id` URI into its server and media id parts.
pub fn parse_mxc(uri: &str) -> Result<(&str, &str), RoomportError> {
    uri.strip_prefix("mxc://")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(server, media_id)| !server.is_empty() && !media_id.is_empty())
        .ok_or_else(|| RoomportError::Validation(format!("not an mxc uri: {uri}")))
}
