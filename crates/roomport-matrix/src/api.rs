// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! URL builders for the Matrix client-server and Synapse admin APIs.
//!
//! Query parameters (acting user id, origin timestamp, pagination) are
//! attached by the client via reqwest; these functions only build paths.

/// Strip a trailing slash from the homeserver base URL.
pub fn sanitize_base(hs_url: &str) -> &str {
    hs_url.strip_suffix('/').unwrap_or(hs_url)
}

pub fn ping(base: &str, as_id: &str) -> String {
    format!("{}/_matrix/client/v1/appservice/{as_id}/ping", sanitize_base(base))
}

pub fn profile(base: &str, user_id: &str) -> String {
    format!("{}/_matrix/client/v3/profile/{user_id}", sanitize_base(base))
}

pub fn profile_displayname(base: &str, user_id: &str) -> String {
    format!(
        "{}/_matrix/client/v3/profile/{user_id}/displayname",
        sanitize_base(base)
    )
}

pub fn join_room(base: &str, room_id: &str) -> String {
    format!("{}/_matrix/client/v3/rooms/{room_id}/join", sanitize_base(base))
}

pub fn create_room(base: &str) -> String {
    format!("{}/_matrix/client/v3/createRoom", sanitize_base(base))
}

pub fn delete_room(base: &str, room_id: &str) -> String {
    format!("{}/_synapse/admin/v2/rooms/{room_id}", sanitize_base(base))
}

pub fn send_event(base: &str, room_id: &str, event_type: &str, txn_id: &str) -> String {
    format!(
        "{}/_matrix/client/v3/rooms/{room_id}/send/{event_type}/{txn_id}",
        sanitize_base(base)
    )
}

pub fn send_state_event(base: &str, room_id: &str, event_type: &str, state_key: &str) -> String {
    format!(
        "{}/_matrix/client/v3/rooms/{room_id}/state/{event_type}/{state_key}",
        sanitize_base(base)
    )
}

pub fn redact_event(base: &str, room_id: &str, event_id: &str, txn_id: &str) -> String {
    format!(
        "{}/_matrix/client/v3/rooms/{room_id}/redact/{event_id}/{txn_id}",
        sanitize_base(base)
    )
}

pub fn create_media(base: &str) -> String {
    format!("{}/_matrix/media/v1/create", sanitize_base(base))
}

pub fn upload_media(base: &str, server_name: &str, media_id: &str) -> String {
    format!(
        "{}/_matrix/media/v3/upload/{server_name}/{media_id}",
        sanitize_base(base)
    )
}

pub fn download_media(base: &str, server_name: &str, media_id: &str) -> String {
    format!(
        "{}/_matrix/client/v1/media/download/{server_name}/{media_id}",
        sanitize_base(base)
    )
}

pub fn room_messages(base: &str, room_id: &str) -> String {
    format!(
        "{}/_matrix/client/v3/rooms/{room_id}/messages",
        sanitize_base(base)
    )
}
