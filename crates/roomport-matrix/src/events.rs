// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of inbound timeline events.
//!
//! The dispatcher only acts on membership changes and chat messages; every
//! other type flows through as a generic event rather than failing decode.
//! A known type whose content does not match its required shape is a hard
//! validation error, distinguishable from "simply unknown type".

use roomport_core::RoomportError;

use crate::types::{ClientEvent, MemberContent, MessageContent};

/// A timeline event routed by the dispatcher.
#[derive(Debug, Clone)]
pub enum TimelineEvent {
    /// `m.room.member` with typed content.
    Member {
        event: ClientEvent,
        content: MemberContent,
    },
    /// `m.room.message` with typed content.
    Message {
        event: ClientEvent,
        content: MessageContent,
    },
    /// Any other type, raw payload preserved.
    Generic(ClientEvent),
}

impl TimelineEvent {
    /// Classify an event by its `type` tag.
    pub fn classify(event: ClientEvent) -> Result<Self, RoomportError> {
        match event.event_type.as_str() {
            "m.room.member" => {
                let content = decode_content(&event)?;
                Ok(TimelineEvent::Member { event, content })
            }
            "m.room.message" => {
                let content = decode_content(&event)?;
                Ok(TimelineEvent::Message { event, content })
            }
            _ => Ok(TimelineEvent::Generic(event)),
        }
    }
}

fn decode_content<T: serde::de::DeserializeOwned>(
    event: &ClientEvent,
) -> Result<T, RoomportError> {
    serde_json::from_value(event.content.clone()).map_err(|e| {
        RoomportError::Validation(format!(
            "malformed {} content in {}: {e}",
            event.event_type, event.event_id
        ))
    })
}
