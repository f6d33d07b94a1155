// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction dispatcher: idempotency, classification, and routing.
//!
//! Events inside one transaction are handled strictly in array order. Each
//! handler catches its own recoverable errors so one failing event never
//! aborts the rest of the batch; the appservice protocol requires the
//! transaction to be acknowledged, or the homeserver redelivers forever.
//! The transaction id is recorded only after the whole batch was dispatched.

use std::path::PathBuf;
use std::sync::Arc;

use roomport_core::{ImportGate, RoomportError};
use roomport_matrix::types::{ClientEvent, MemberContent, Membership, MessageContent, Transaction};
use roomport_matrix::{MatrixClient, TimelineEvent};
use roomport_storage::{ProcessJob, StoreContext};
use tracing::{debug, info, warn};

use crate::commands::{Command, HELP_TEXT, is_affirmative};
use crate::removal;

/// Static settings the dispatcher needs from the configuration.
pub struct DispatcherSettings {
    /// Fully-qualified user id of the bot.
    pub bot_user_id: String,
    /// Users allowed to drive the bot. Empty rejects everyone.
    pub allow_users: Vec<String>,
    /// Token the homeserver must present on webhook pushes.
    pub hs_token: String,
    /// Directory uploaded export archives are downloaded into.
    pub import_dir: PathBuf,
}

/// Shared state for webhook handlers and the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<MatrixClient>,
    pub stores: Arc<StoreContext>,
    pub gate: Arc<ImportGate>,
    pub settings: Arc<DispatcherSettings>,
}

/// Dispatch one decoded transaction.
///
/// Returns an error only for store-level failures; those leave the
/// transaction unrecorded so the homeserver legitimately retries.
pub async fn handle_transaction(
    state: &AppState,
    txn_id: &str,
    txn: Transaction,
) -> Result<(), RoomportError> {
    if state.stores.transactions.contains(txn_id).await {
        debug!(txn_id, "transaction already handled");
        return Ok(());
    }

    if let Some(ephemeral) = &txn.ephemeral {
        debug!(txn_id, count = ephemeral.len(), "ignoring ephemeral events");
    }
    if let Some(to_device) = &txn.to_device {
        debug!(txn_id, count = to_device.len(), "ignoring to-device events");
    }

    for raw in txn.events {
        let event_id = raw.event_id.clone();
        let classified = match TimelineEvent::classify(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(txn_id, event_id, error = %e, "skipping malformed event");
                continue;
            }
        };

        let result = match classified {
            TimelineEvent::Member { event, content } => handle_member(state, event, content).await,
            TimelineEvent::Message { event, content } => {
                handle_message(state, event, content).await
            }
            TimelineEvent::Generic(event) => {
                debug!(
                    txn_id,
                    event_type = event.event_type.as_str(),
                    "ignoring event type"
                );
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(txn_id, event_id, error = %e, "event handler failed");
        }
    }

    state.stores.transactions.append(txn_id).await?;
    Ok(())
}

/// Accept invites targeting the bot: join, record the controller room, greet.
async fn handle_member(
    state: &AppState,
    event: ClientEvent,
    content: MemberContent,
) -> Result<(), RoomportError> {
    if content.membership != Membership::Invite
        || event.state_key.as_deref() != Some(state.settings.bot_user_id.as_str())
    {
        return Ok(());
    }

    info!(room_id = event.room_id.as_str(), "accepting room invite");
    state.client.join_room(&event.room_id, None, None).await?;
    state.stores.bot_rooms.append(&event.room_id).await?;
    state
        .client
        .send_event(
            &event.room_id,
            "m.room.message",
            &MessageContent::text(HELP_TEXT),
            None,
            None,
        )
        .await?;
    Ok(())
}

/// Route a chat message: removal confirmation, import submission, or command.
async fn handle_message(
    state: &AppState,
    event: ClientEvent,
    content: MessageContent,
) -> Result<(), RoomportError> {
    if !state.stores.bot_rooms.contains(&event.room_id).await {
        return Ok(());
    }
    if event.sender == state.settings.bot_user_id {
        return Ok(());
    }
    if !state.settings.allow_users.contains(&event.sender) {
        debug!(sender = event.sender.as_str(), "sender not in allow list");
        return Ok(());
    }

    // A threaded affirmative reply referencing a pending removal entry
    // triggers the deletion flow. The reply may reference the notice via its
    // thread root or its rich-reply fallback.
    if is_affirmative(&content.body) {
        for referenced in referenced_event_ids(&content) {
            if let Some((row_id, _)) = state.stores.removals.find_by_event_id(referenced).await {
                return removal::run_removal(state, row_id, &event.room_id, referenced).await;
            }
        }
    }

    if content.is_file() {
        return handle_file_submission(state, &event, &content).await;
    }

    match Command::parse(&content.body) {
        Some(Command::Help) => {
            state
                .client
                .send_event(
                    &event.room_id,
                    "m.room.message",
                    &MessageContent::text(HELP_TEXT),
                    None,
                    None,
                )
                .await?;
        }
        Some(Command::SpaceId(space_id)) => {
            state
                .stores
                .config
                .update(roomport_storage::SPACE_ID_KEY, &space_id)
                .await?;
            info!(space_id = space_id.as_str(), "destination space updated");
            state
                .client
                .send_event(
                    &event.room_id,
                    "m.room.message",
                    &MessageContent::text(format!("Imported rooms will be added to {space_id}.")),
                    None,
                    None,
                )
                .await?;
        }
        Some(Command::SetAdminToken(token)) => {
            state.client.rotate_admin_token(&token);
            info!("admin token rotated");
            // The message leaked a secret; remove it from the room.
            state
                .client
                .redact_event(&event.room_id, &event.event_id, Some("credential rotation"))
                .await?;
        }
        None => {
            debug!("message is not a command, ignoring");
        }
    }
    Ok(())
}

/// Event ids a reply refers to: thread root first, rich-reply target second.
fn referenced_event_ids(content: &MessageContent) -> Vec<&str> {
    let mut ids = Vec::new();
    if let Some(relates) = &content.relates_to {
        if let Some(root) = relates.event_id.as_deref() {
            ids.push(root);
        }
        if let Some(reply) = &relates.in_reply_to
            && !ids.contains(&reply.event_id.as_str())
        {
            ids.push(&reply.event_id);
        }
    }
    ids
}

/// Download the attached export and enqueue an import job.
async fn handle_file_submission(
    state: &AppState,
    event: &ClientEvent,
    content: &MessageContent,
) -> Result<(), RoomportError> {
    let url = content
        .url
        .as_deref()
        .ok_or_else(|| RoomportError::Validation("file message without url".into()))?;
    let filename = content
        .filename
        .as_deref()
        .unwrap_or(content.body.as_str());

    info!(
        filename,
        event_id = event.event_id.as_str(),
        "downloading export submission"
    );
    let bytes = state.client.download_media(url).await?;

    tokio::fs::create_dir_all(&state.settings.import_dir)
        .await
        .map_err(|e| RoomportError::Storage {
            source: Box::new(e),
        })?;
    let local_name = format!("{}-{}", sanitize_for_path(&event.event_id), filename);
    let path = state.settings.import_dir.join(local_name);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| RoomportError::Storage {
            source: Box::new(e),
        })?;

    state
        .stores
        .queue
        .append(ProcessJob {
            path: path.to_string_lossy().into_owned(),
            event_id: event.event_id.clone(),
            room_id: event.room_id.clone(),
        })
        .await?;
    state.gate.notify();
    info!(path = %path.display(), "import job queued");
    Ok(())
}

fn sanitize_for_path(event_id: &str) -> String {
    event_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomport_storage::{Database, RoomToRemove};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_state(server: &MockServer, dir: &std::path::Path) -> AppState {
        let db = Database::open(dir.join("as.db").to_str().unwrap())
            .await
            .unwrap();
        let stores = Arc::new(StoreContext::open(&db).await.unwrap());
        stores
            .config
            .ensure(roomport_storage::SPACE_ID_KEY, "")
            .await
            .unwrap();
        AppState {
            client: Arc::new(MatrixClient::new(&server.uri(), "as-token", "admin-token").unwrap()),
            stores,
            gate: Arc::new(ImportGate::new(0)),
            settings: Arc::new(DispatcherSettings {
                bot_user_id: "@importer:example.org".into(),
                allow_users: vec!["@ops:example.org".into()],
                hs_token: "hs-token".into(),
                import_dir: dir.join("imports"),
            }),
        }
    }

    fn invite_event() -> serde_json::Value {
        serde_json::json!({
            "type": "m.room.member",
            "sender": "@ops:example.org",
            "room_id": "!control:example.org",
            "event_id": "$invite",
            "origin_server_ts": 1_700_000_000_000i64,
            "state_key": "@importer:example.org",
            "content": {"membership": "invite"}
        })
    }

    fn message_event(event_id: &str, content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "type": "m.room.message",
            "sender": "@ops:example.org",
            "room_id": "!control:example.org",
            "event_id": event_id,
            "origin_server_ts": 1_700_000_000_001i64,
            "content": content
        })
    }

    fn txn(events: Vec<serde_json::Value>) -> Transaction {
        serde_json::from_value(serde_json::json!({ "events": events })).unwrap()
    }

    #[tokio::test]
    async fn invite_accept_joins_and_records_room() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;

        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/rooms/!control:example.org/join"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"room_id": "!control:example.org"}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/_matrix/client/v3/rooms/!control:example.org/send/m\.room\.message/.+$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$help"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        handle_transaction(&state, "txn-1", txn(vec![invite_event()]))
            .await
            .unwrap();

        assert!(state.stores.bot_rooms.contains("!control:example.org").await);
        assert!(state.stores.transactions.contains("txn-1").await);
    }

    #[tokio::test]
    async fn duplicate_transaction_has_no_side_effects() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();

        Mock::given(method("GET"))
            .and(path_regex(r"^/_matrix/client/v1/media/download/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zipbytes".to_vec()))
            .mount(&server)
            .await;

        let file_msg = message_event(
            "$upload",
            serde_json::json!({
                "msgtype": "m.file",
                "body": "export.zip",
                "url": "mxc://example.org/abc"
            }),
        );

        handle_transaction(&state, "txn-dup", txn(vec![file_msg.clone()]))
            .await
            .unwrap();
        assert_eq!(state.stores.queue.len().await, 1);

        // Second delivery of the same transaction id: no new job, no signal.
        handle_transaction(&state, "txn-dup", txn(vec![file_msg]))
            .await
            .unwrap();
        assert_eq!(state.stores.queue.len().await, 1);

        // Exactly one gate permit was released.
        state.gate.wait().await.unwrap();
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), state.gate.wait()).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn file_submission_downloads_and_enqueues() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();

        Mock::given(method("GET"))
            .and(path("/_matrix/client/v1/media/download/example.org/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zipbytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let file_msg = message_event(
            "$upload",
            serde_json::json!({
                "msgtype": "m.file",
                "body": "export.zip",
                "url": "mxc://example.org/abc"
            }),
        );
        handle_transaction(&state, "txn-file", txn(vec![file_msg]))
            .await
            .unwrap();

        let job = state.stores.queue.get_and_remove_next().await.unwrap().unwrap();
        assert_eq!(job.event_id, "$upload");
        assert_eq!(job.room_id, "!control:example.org");
        let saved = tokio::fs::read(&job.path).await.unwrap();
        assert_eq!(saved, b"zipbytes");
    }

    #[tokio::test]
    async fn space_id_command_updates_config_store() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();

        Mock::given(method("PUT"))
            .and(path_regex(r"^/_matrix/client/v3/rooms/.+/send/m\.room\.message/.+$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$ok"})),
            )
            .mount(&server)
            .await;

        let cmd = message_event(
            "$cmd",
            serde_json::json!({"msgtype": "m.text", "body": "SPACE-ID !space:example.org"}),
        );
        handle_transaction(&state, "txn-cmd", txn(vec![cmd])).await.unwrap();

        assert_eq!(
            state.stores.config.get(roomport_storage::SPACE_ID_KEY).await.as_deref(),
            Some("!space:example.org")
        );
    }

    #[tokio::test]
    async fn set_admin_token_redacts_the_command_message() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();

        Mock::given(method("PUT"))
            .and(path_regex(r"^/_matrix/client/v3/rooms/.+/redact/\$cmd/.+$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$r"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cmd = message_event(
            "$cmd",
            serde_json::json!({"msgtype": "m.text", "body": "set-admin-token syt_new"}),
        );
        handle_transaction(&state, "txn-rotate", txn(vec![cmd])).await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_sender_is_ignored() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();

        let cmd = serde_json::json!({
            "type": "m.room.message",
            "sender": "@stranger:example.org",
            "room_id": "!control:example.org",
            "event_id": "$cmd",
            "origin_server_ts": 1_700_000_000_001i64,
            "content": {"msgtype": "m.text", "body": "space-id !evil:example.org"}
        });
        handle_transaction(&state, "txn-stranger", txn(vec![cmd]))
            .await
            .unwrap();

        assert_eq!(
            state.stores.config.get(roomport_storage::SPACE_ID_KEY).await.as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn yes_reply_without_matching_entry_deletes_nothing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();

        Mock::given(method("DELETE"))
            .and(path_regex(r"^/_synapse/admin/v2/rooms/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let reply = message_event(
            "$reply",
            serde_json::json!({
                "msgtype": "m.text",
                "body": "yes",
                "m.relates_to": {"rel_type": "m.thread", "event_id": "$unknown"}
            }),
        );
        handle_transaction(&state, "txn-noentry", txn(vec![reply]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn confirmed_removal_evicts_then_deletes() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;
        state.stores.bot_rooms.append("!control:example.org").await.unwrap();
        state
            .stores
            .removals
            .append(RoomToRemove {
                event_id: "$notice".into(),
                room_id: "!old:example.org".into(),
                users: vec!["@bob:example.org".into()],
            })
            .await
            .unwrap();

        Mock::given(method("PUT"))
            .and(path(
                "/_matrix/client/v3/rooms/!old:example.org/state/m.room.member/@bob:example.org",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$l"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_synapse/admin/v2/rooms/!old:example.org"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"delete_id": "d"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/_matrix/client/v3/rooms/!control:example.org/send/m\.room\.message/.+$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$done"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = message_event(
            "$reply",
            serde_json::json!({
                "msgtype": "m.text",
                "body": "Yes please",
                "m.relates_to": {"rel_type": "m.thread", "event_id": "$notice"}
            }),
        );
        handle_transaction(&state, "txn-confirm", txn(vec![reply]))
            .await
            .unwrap();

        assert!(state.stores.removals.find_by_event_id("$notice").await.is_none());
    }

    #[tokio::test]
    async fn handler_failure_still_marks_transaction_handled() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&server, dir.path()).await;

        // join_room answers 403; the invite handler fails but the
        // transaction must still be acknowledged and recorded.
        Mock::given(method("POST"))
            .and(path_regex(r"^/_matrix/client/v3/rooms/.+/join$"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                serde_json::json!({"errcode": "M_FORBIDDEN", "error": "nope"}),
            ))
            .mount(&server)
            .await;

        handle_transaction(&state, "txn-err", txn(vec![invite_event()]))
            .await
            .unwrap();
        assert!(state.stores.transactions.contains("txn-err").await);
        assert!(!state.stores.bot_rooms.contains("!control:example.org").await);
    }
}
