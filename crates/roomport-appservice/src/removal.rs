// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-phase deletion of an imported room's predecessor.
//!
//! The server may refuse to purge a room that still has joined non-bot
//! members, so every user recorded at export time is evicted first, then the
//! room is deleted through the Synapse admin API. The outcome is reported as
//! a threaded bot message; per-user eviction failures are logged only.

use roomport_matrix::types::{DeleteRoomBody, MemberContent, MessageContent};
use tracing::{info, warn};

use crate::dispatcher::AppState;

/// Run the confirmed removal of `row_id`, reporting into the thread rooted
/// at `thread_root` in `origin_room`.
pub async fn run_removal(
    state: &AppState,
    row_id: i64,
    origin_room: &str,
    thread_root: &str,
) -> Result<(), roomport_core::RoomportError> {
    let entry = state.stores.removals.pop(row_id).await?;
    info!(
        room_id = entry.room_id.as_str(),
        users = entry.users.len(),
        "removal confirmed, evicting members"
    );

    for user in &entry.users {
        let result = state
            .client
            .send_state_event(
                &entry.room_id,
                "m.room.member",
                user,
                &MemberContent::leave(),
                Some(user),
                None,
            )
            .await;
        if let Err(e) = result {
            warn!(user = user.as_str(), error = %e, "failed to evict user from old room");
        }
    }

    let delete_body = DeleteRoomBody {
        block: Some(true),
        purge: Some(true),
        message: None,
    };
    let notice = match state.client.delete_room(&entry.room_id, &delete_body).await {
        Ok(_) => format!("Old room {} has been removed.", entry.room_id),
        Err(e) => {
            warn!(room_id = entry.room_id.as_str(), error = %e, "room deletion failed");
            format!("Failed to remove old room {}: {e}", entry.room_id)
        }
    };

    state
        .client
        .send_event(
            origin_room,
            "m.room.message",
            &MessageContent::thread_notice(notice, thread_root),
            None,
            None,
        )
        .await?;
    Ok(())
}
