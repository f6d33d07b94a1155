// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests against a mocked homeserver.
//!
//! Each test runs the real worker over a real temp database and an export
//! file on disk; only the homeserver is mocked.

use std::sync::Arc;
use std::time::Duration;

use roomport_core::ImportGate;
use roomport_import::{ImportWorker, WorkerSettings};
use roomport_matrix::MatrixClient;
use roomport_storage::{Database, ProcessJob, StoreContext};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    stores: Arc<StoreContext>,
    _dir: tempfile::TempDir,
    export_path: std::path::PathBuf,
}

async fn harness(export: serde_json::Value) -> Harness {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("pipeline.db").to_str().unwrap())
        .await
        .unwrap();
    let stores = Arc::new(StoreContext::open(&db).await.unwrap());

    let export_path = dir.path().join("export.json");
    std::fs::write(&export_path, serde_json::to_vec(&export).unwrap()).unwrap();

    Harness {
        server,
        stores,
        _dir: dir,
        export_path,
    }
}

fn worker(harness: &Harness, gate: Arc<ImportGate>) -> ImportWorker {
    ImportWorker::new(
        Arc::new(MatrixClient::new(&harness.server.uri(), "as-token", "admin-token").unwrap()),
        harness.stores.clone(),
        gate,
        WorkerSettings {
            bot_user_id: "@importer:x".into(),
            server_name: "x".into(),
        },
    )
}

fn upload_job(harness: &Harness, event_id: &str) -> ProcessJob {
    ProcessJob {
        path: harness.export_path.to_string_lossy().into_owned(),
        event_id: event_id.into(),
        room_id: "!control:x".into(),
    }
}

fn member(sender: &str, displayname: &str, membership: &str, ts: i64, event_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "m.room.member",
        "sender": sender,
        "origin_server_ts": ts,
        "event_id": event_id,
        "room_id": "!old:x",
        "state_key": sender,
        "content": {"membership": membership, "displayname": displayname}
    })
}

fn text_message(sender: &str, body: &str, ts: i64, event_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "m.room.message",
        "sender": sender,
        "origin_server_ts": ts,
        "event_id": event_id,
        "room_id": "!old:x",
        "content": {"msgtype": "m.text", "body": body}
    })
}

fn basic_export(messages: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "room_name": "Test",
        "room_creator": "Alice",
        "topic": "",
        "export_date": "2026-01-10",
        "exported_by": "Alice",
        "messages": messages
    })
}

async fn mount_empty_history(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/rooms/!old:x/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"chunk": [], "start": "s", "end": null})),
        )
        .mount(server)
        .await;
}

async fn mount_status_notices(server: &MockServer, thread_root: &str, expected: u64) {
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!control:x/send/m\.room\.message/.+$",
        ))
        .and(body_partial_json(serde_json::json!({
            "m.relates_to": {"rel_type": "m.thread", "event_id": thread_root}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$notice"})),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn import_recreates_room_with_rewritten_relations() {
    let export = basic_export(vec![
        member("@alice:x", "Alice", "join", 1000, "$alice-join"),
        text_message("@alice:x", "hi", 1001, "$a"),
        serde_json::json!({
            "type": "m.room.message",
            "sender": "@alice:x",
            "origin_server_ts": 1002i64,
            "event_id": "$b",
            "room_id": "!old:x",
            "content": {
                "msgtype": "m.text",
                "body": "re: hi",
                "m.relates_to": {"m.in_reply_to": {"event_id": "$a"}}
            }
        }),
        member("@bob:x", "Bob", "join", 1003, "$bob-join"),
        member("@bob:x", "Bob", "leave", 1004, "$bob-leave"),
    ]);
    let h = harness(export).await;

    // Room creation is attributed to the creator at the creation timestamp.
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/createRoom"))
        .and(query_param("user_id", "@alice:x"))
        .and(query_param("ts", "1000"))
        .and(body_partial_json(serde_json::json!({"name": "Test"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"room_id": "!new:x"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    mount_empty_history(&h.server).await;

    // First message replays as Alice in order.
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!new:x/send/m\.room\.message/.+$",
        ))
        .and(query_param("user_id", "@alice:x"))
        .and(query_param("ts", "1001"))
        .and(body_partial_json(serde_json::json!({"body": "hi"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-a"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    // The reply must point at the NEW id of the first message.
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!new:x/send/m\.room\.message/.+$",
        ))
        .and(query_param("ts", "1002"))
        .and(body_partial_json(serde_json::json!({
            "m.relates_to": {"m.in_reply_to": {"event_id": "$new-a"}}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-b"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    // Bob's join and leave replay as state events attributed to Bob.
    Mock::given(method("PUT"))
        .and(path("/_matrix/client/v3/rooms/!new:x/state/m.room.member/@bob:x"))
        .and(query_param("user_id", "@bob:x"))
        .and(body_partial_json(serde_json::json!({"membership": "join"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-bj"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/_matrix/client/v3/rooms/!new:x/state/m.room.member/@bob:x"))
        .and(body_partial_json(serde_json::json!({"membership": "leave"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-bl"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    // Started + finished notices, threaded under the upload message.
    mount_status_notices(&h.server, "$upload", 2).await;

    let w = worker(&h, Arc::new(ImportGate::new(0)));
    w.run_job(upload_job(&h, "$upload")).await;

    // The finished notice registers the old room; Bob left, so only Alice
    // remains in the snapshot (the bot is never recorded).
    let (_, entry) = h.stores.removals.find_by_event_id("$notice").await.unwrap();
    assert_eq!(entry.room_id, "!old:x");
    assert_eq!(entry.users, vec!["@alice:x".to_string()]);
}

#[tokio::test]
async fn orphaned_reaction_is_skipped() {
    let export = basic_export(vec![
        member("@alice:x", "Alice", "join", 1000, "$alice-join"),
        text_message("@alice:x", "hi", 1001, "$a"),
    ]);
    let h = harness(export).await;

    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/createRoom"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"room_id": "!new:x"})),
        )
        .mount(&h.server)
        .await;

    // Old-room history carries two reactions: one targets the replayed
    // message, the other targets an event that never replayed.
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/rooms/!old:x/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "chunk": [
                {
                    "type": "m.reaction",
                    "sender": "@bob:x",
                    "room_id": "!old:x",
                    "event_id": "$r1",
                    "origin_server_ts": 1005i64,
                    "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": "$a", "key": "👍"}}
                },
                {
                    "type": "m.reaction",
                    "sender": "@bob:x",
                    "room_id": "!old:x",
                    "event_id": "$r2",
                    "origin_server_ts": 1006i64,
                    "content": {"m.relates_to": {"rel_type": "m.annotation", "event_id": "$missing", "key": "👎"}}
                }
            ],
            "start": "s",
            "end": null
        })))
        .mount(&h.server)
        .await;

    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!new:x/send/m\.room\.message/.+$",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-a"})),
        )
        .mount(&h.server)
        .await;

    // Exactly one reaction replays, rewritten to the new target id.
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!new:x/send/m\.reaction/.+$",
        ))
        .and(query_param("user_id", "@bob:x"))
        .and(body_partial_json(serde_json::json!({
            "m.relates_to": {"event_id": "$new-a", "key": "👍"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-r"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    mount_status_notices(&h.server, "$upload", 2).await;

    let w = worker(&h, Arc::new(ImportGate::new(0)));
    w.run_job(upload_job(&h, "$upload")).await;
}

#[tokio::test]
async fn room_creation_failure_reports_into_thread() {
    let export = basic_export(vec![
        member("@alice:x", "Alice", "join", 1000, "$alice-join"),
        text_message("@alice:x", "hi", 1001, "$a"),
    ]);
    let h = harness(export).await;

    mount_empty_history(&h.server).await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/createRoom"))
        .respond_with(ResponseTemplate::new(403).set_body_json(
            serde_json::json!({"errcode": "M_FORBIDDEN", "error": "quota exceeded"}),
        ))
        .mount(&h.server)
        .await;

    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!control:x/send/m\.room\.message/.+$",
        ))
        .and(body_string_contains("started"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$s"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!control:x/send/m\.room\.message/.+$",
        ))
        .and(body_string_contains("M_FORBIDDEN"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$f"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let w = worker(&h, Arc::new(ImportGate::new(0)));
    w.run_job(upload_job(&h, "$upload")).await;

    // The job is discarded: nothing registered for removal.
    assert!(h.stores.removals.find_by_event_id("$notice").await.is_none());
    assert!(h.stores.removals.find_by_event_id("$f").await.is_none());
}

#[tokio::test]
async fn persisted_backlog_is_drained_without_external_signal() {
    let export = basic_export(vec![
        member("@alice:x", "Alice", "join", 1000, "$alice-join"),
        text_message("@alice:x", "hi", 1001, "$a"),
    ]);
    let h = harness(export).await;

    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/createRoom"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"room_id": "!new:x"})),
        )
        .expect(2)
        .mount(&h.server)
        .await;
    mount_empty_history(&h.server).await;
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!new:x/send/m\.room\.message/.+$",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$new-a"})),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(
            r"^/_matrix/client/v3/rooms/!control:x/send/m\.room\.message/.+$",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$notice"})),
        )
        .mount(&h.server)
        .await;

    // Two jobs persisted before the worker exists, as after a restart.
    h.stores.queue.append(upload_job(&h, "$upload-1")).await.unwrap();
    h.stores.queue.append(upload_job(&h, "$upload-2")).await.unwrap();

    // Gate seeded from the persisted queue length; nobody calls notify.
    let gate = Arc::new(ImportGate::new(h.stores.queue.len().await));
    let w = worker(&h, gate);
    tokio::spawn(w.run());

    for _ in 0..100 {
        if h.stores.queue.len().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(h.stores.queue.len().await, 0);

    // Let the second job's trailing status sends finish before the mock
    // server verifies expectations on drop.
    tokio::time::sleep(Duration::from_millis(500)).await;
}
