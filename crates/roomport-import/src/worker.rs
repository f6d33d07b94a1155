// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The import pipeline: one long-lived worker, one job in flight at a time.
//!
//! Every reconstructed action is issued "as" the original historical user
//! and "at" the original historical timestamp. The old-to-new event id mapping
//! built during timeline replay rewrites reply relations and reaction
//! targets; a reply can only reference an event replayed earlier in the same
//! chronological pass, which the export's ordering guarantees.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use roomport_core::{ImportGate, RoomportError};
use roomport_matrix::MatrixClient;
use roomport_matrix::types::{
    ClientEvent, CreateRoomBody, CreationContent, InReplyTo, Membership, MessageContent,
    RelatesTo,
};
use roomport_storage::{ProcessJob, RoomToRemove, SPACE_ID_KEY, StoreContext};
use tracing::{debug, error, info, warn};

use crate::export::{self, ExportEvent, LoadedExport};

/// Reaction pagination is bounded so a server that never signals
/// end-of-pagination cannot loop the worker forever.
const MAX_REACTION_PAGES: u32 = 64;
const REACTION_PAGE_LIMIT: u32 = 100;

/// Static settings the worker needs from the configuration.
pub struct WorkerSettings {
    pub bot_user_id: String,
    pub server_name: String,
}

/// Everything an import produces that outlives the job.
struct ImportOutcome {
    new_room_id: String,
    old_room_id: Option<String>,
    /// Users still joined in the old room at the end of the export.
    users: Vec<String>,
}

/// The single background import worker.
pub struct ImportWorker {
    client: Arc<MatrixClient>,
    stores: Arc<StoreContext>,
    gate: Arc<ImportGate>,
    settings: WorkerSettings,
}

impl ImportWorker {
    pub fn new(
        client: Arc<MatrixClient>,
        stores: Arc<StoreContext>,
        gate: Arc<ImportGate>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            client,
            stores,
            gate,
            settings,
        }
    }

    /// Run until process termination: wait on the gate, dequeue, process.
    pub async fn run(self) {
        info!("import worker started");
        loop {
            if let Err(e) = self.gate.wait().await {
                error!(error = %e, "import gate failed, worker stopping");
                return;
            }
            match self.stores.queue.get_and_remove_next().await {
                Ok(Some(job)) => self.run_job(job).await,
                Ok(None) => {
                    // Permit without a job: tolerated, wait again.
                    warn!("woken with an empty queue");
                }
                Err(e) => {
                    error!(error = %e, "queue dequeue failed");
                }
            }
        }
    }

    /// Process one dequeued job and report the outcome into the thread of
    /// the triggering upload message.
    pub async fn run_job(&self, job: ProcessJob) {
        info!(path = job.path.as_str(), "starting import job");
        match self.import(&job).await {
            Ok(outcome) => {
                info!(
                    new_room_id = outcome.new_room_id.as_str(),
                    "import finished"
                );
                let notice = format!(
                    "Import finished: the room was recreated as {}.\n\
                     Reply \"yes\" in this thread to remove the old room.",
                    outcome.new_room_id
                );
                match self.send_status(&job, notice).await {
                    Ok(notice_id) => {
                        if let Some(old_room_id) = outcome.old_room_id {
                            let entry = RoomToRemove {
                                event_id: notice_id,
                                room_id: old_room_id,
                                users: outcome.users,
                            };
                            if let Err(e) = self.stores.removals.append(entry).await {
                                error!(error = %e, "failed to register room for removal");
                            }
                        }
                    }
                    Err(e) => error!(error = %e, "failed to post finished notice"),
                }
            }
            Err(e) => {
                // The job is dropped, not retried; the operator resubmits.
                error!(error = %e, "import failed");
                let notice = match &e {
                    RoomportError::Matrix {
                        errcode, message, ..
                    } => format!("Import failed: {errcode} {message}"),
                    other => format!("Import failed: {other}"),
                };
                if let Err(send_err) = self.send_status(&job, notice).await {
                    error!(error = %send_err, "failed to post failure notice");
                }
            }
        }
    }

    async fn send_status(&self, job: &ProcessJob, body: String) -> Result<String, RoomportError> {
        let content = MessageContent::thread_notice(body, &job.event_id);
        let resp = self
            .client
            .send_event(&job.room_id, "m.room.message", &content, None, None)
            .await?;
        Ok(resp.event_id)
    }

    async fn import(&self, job: &ProcessJob) -> Result<ImportOutcome, RoomportError> {
        // LOAD
        let path = PathBuf::from(&job.path);
        let LoadedExport {
            export,
            attachments,
        } = tokio::task::spawn_blocking(move || export::load_export(&path))
            .await
            .map_err(|e| RoomportError::Internal(format!("export load task failed: {e}")))??;

        // UPLOAD_MEDIA: per-file failures drop the file, not the job.
        let mut media = HashMap::new();
        for (name, bytes) in attachments {
            let content_type = mime_guess::from_path(&name).first_raw();
            match self
                .client
                .create_and_upload_media(bytes, Some(&name), content_type)
                .await
            {
                Ok(uri) => {
                    media.insert(name, uri);
                }
                Err(e) => {
                    warn!(name = name.as_str(), error = %e, "attachment upload failed, omitting")
                }
            }
        }

        // SIGNAL_STARTED
        let started = format!("Import of \"{}\" started.", export.room_name);
        if let Err(e) = self.send_status(job, started).await {
            warn!(error = %e, "failed to post started notice");
        }

        // FETCH_OLD_REACTIONS: the old room becomes inaccessible once
        // removed, so reactions are collected up front.
        let old_room_id = export.old_room_id().map(str::to_string);
        let reactions = match &old_room_id {
            Some(room_id) => self.fetch_reactions(room_id).await,
            None => Vec::new(),
        };

        // CREATE_ROOM
        let creator = export.creator_event().ok_or_else(|| {
            RoomportError::Validation(format!(
                "no member event matches room creator \"{}\"",
                export.room_creator
            ))
        })?;
        let creator_id = creator.sender.clone();
        let creation_ts = creator.origin_server_ts;

        let body = CreateRoomBody {
            name: Some(export.room_name.clone()),
            topic: export.room_topic(),
            preset: None,
            initial_state: export.initial_state_events(),
            creation_content: Some(CreationContent {
                federate: Some(false),
            }),
        };
        let new_room_id = self
            .client
            .create_room(&body, Some(&creator_id), Some(creation_ts))
            .await?
            .room_id;
        info!(
            new_room_id = new_room_id.as_str(),
            creator = creator_id.as_str(),
            "room created"
        );

        // LINK_TO_SPACE
        if let Some(space_id) = self
            .stores
            .config
            .get(SPACE_ID_KEY)
            .await
            .filter(|s| !s.is_empty())
        {
            let content = serde_json::json!({ "via": [self.settings.server_name] });
            let result = self
                .client
                .send_state_event(
                    &space_id,
                    "m.space.child",
                    &new_room_id,
                    &content,
                    Some(&creator_id),
                    None,
                )
                .await;
            if let Err(e) = result {
                warn!(space_id = space_id.as_str(), error = %e, "space link failed");
            }
        }

        // POPULATE_TIMELINE
        let mut id_map: HashMap<String, String> = HashMap::new();
        // The creator is joined by virtue of room creation.
        let mut joined: BTreeSet<String> = BTreeSet::from([creator_id.clone()]);
        let mut creator_join_seen = false;

        for event in &export.messages {
            let envelope = event.envelope();
            let result = match event {
                ExportEvent::Member { envelope, content } => {
                    let target = envelope
                        .state_key
                        .clone()
                        .unwrap_or_else(|| envelope.sender.clone());
                    match content.membership {
                        Membership::Join => {
                            joined.insert(target.clone());
                        }
                        Membership::Leave | Membership::Ban => {
                            joined.remove(&target);
                        }
                        Membership::Invite | Membership::Knock => {}
                    }

                    // The creator's own first join is implied by room
                    // creation; replaying it would conflict.
                    if content.membership == Membership::Join
                        && !creator_join_seen
                        && target == creator_id
                    {
                        creator_join_seen = true;
                        continue;
                    }

                    self.client
                        .send_state_event(
                            &new_room_id,
                            "m.room.member",
                            &target,
                            content,
                            Some(&envelope.sender),
                            Some(envelope.origin_server_ts),
                        )
                        .await
                }
                ExportEvent::Message { envelope, content } => {
                    let mut content = content.clone();

                    if content.url.is_some() {
                        let referenced = content
                            .filename
                            .as_deref()
                            .unwrap_or(content.body.as_str());
                        let key = export::normalize_attachment_name(referenced);
                        match media.get(&key) {
                            Some(uri) => content.url = Some(uri.clone()),
                            None => {
                                debug!(
                                    event_id = envelope.event_id.as_str(),
                                    filename = referenced,
                                    "attachment missing, skipping file message"
                                );
                                continue;
                            }
                        }
                    }

                    if let Some(relates) = content.relates_to.take() {
                        content.relates_to = rewrite_relation(relates, &id_map);
                    }

                    self.client
                        .send_event(
                            &new_room_id,
                            "m.room.message",
                            &content,
                            Some(&envelope.sender),
                            Some(envelope.origin_server_ts),
                        )
                        .await
                }
                // Reactions replay from the live fetch, never from the
                // export, so an export that contains them does not
                // double-post.
                ExportEvent::Reaction { .. } => continue,
                // Already applied via room creation.
                ExportEvent::JoinRules { .. }
                | ExportEvent::HistoryVisibility { .. }
                | ExportEvent::GuestAccess { .. }
                | ExportEvent::RoomName { .. }
                | ExportEvent::Topic { .. }
                | ExportEvent::SpaceChild { .. } => continue,
                ExportEvent::Skipped { event_type, .. } => {
                    debug!(event_type = event_type.as_str(), "skipping event");
                    continue;
                }
                ExportEvent::Generic {
                    envelope,
                    event_type,
                    content,
                } => match &envelope.state_key {
                    Some(state_key) => {
                        self.client
                            .send_state_event(
                                &new_room_id,
                                event_type,
                                state_key,
                                content,
                                Some(&envelope.sender),
                                Some(envelope.origin_server_ts),
                            )
                            .await
                    }
                    None => {
                        self.client
                            .send_event(
                                &new_room_id,
                                event_type,
                                content,
                                Some(&envelope.sender),
                                Some(envelope.origin_server_ts),
                            )
                            .await
                    }
                },
            };

            match result {
                Ok(resp) => {
                    id_map.insert(envelope.event_id.clone(), resp.event_id);
                }
                Err(e) => {
                    warn!(
                        event_id = envelope.event_id.as_str(),
                        error = %e,
                        "event replay failed, skipping"
                    );
                }
            }
        }

        // POPULATE_REACTIONS
        for reaction in reactions {
            self.replay_reaction(&new_room_id, &reaction, &id_map).await;
        }

        let users = joined
            .into_iter()
            .filter(|user| user != &self.settings.bot_user_id)
            .collect();

        Ok(ImportOutcome {
            new_room_id,
            old_room_id,
            users,
        })
    }

    /// Page backwards through the old room collecting reaction events,
    /// oldest first. Errors end the walk with whatever was collected.
    async fn fetch_reactions(&self, room_id: &str) -> Vec<ClientEvent> {
        let mut reactions = Vec::new();
        let mut from: Option<String> = None;

        for page in 0..MAX_REACTION_PAGES {
            let response = match self
                .client
                .room_messages(room_id, from.as_deref(), REACTION_PAGE_LIMIT)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(room_id, page, error = %e, "reaction fetch failed");
                    break;
                }
            };

            let empty = response.chunk.is_empty();
            reactions.extend(
                response
                    .chunk
                    .into_iter()
                    .filter(|event| {
                        matches!(event.event_type.as_str(), "m.reaction" | "m.room.reaction")
                    }),
            );

            match response.end {
                Some(end) if !empty => from = Some(end),
                _ => break,
            }
        }

        // Backwards pagination yields newest first.
        reactions.reverse();
        reactions
    }

    /// Replay one fetched reaction, translating its target through the id
    /// mapping. Unmapped targets are skipped, never replayed dangling.
    async fn replay_reaction(
        &self,
        new_room_id: &str,
        reaction: &ClientEvent,
        id_map: &HashMap<String, String>,
    ) {
        let relates = reaction
            .content
            .get("m.relates_to")
            .cloned()
            .and_then(|v| serde_json::from_value::<RelatesTo>(v).ok());
        let Some(mut relates) = relates else {
            debug!(event_id = reaction.event_id.as_str(), "reaction without relation");
            return;
        };
        let Some(new_target) = relates
            .event_id
            .as_deref()
            .and_then(|old| id_map.get(old))
        else {
            debug!(
                event_id = reaction.event_id.as_str(),
                "reaction target was not replayed, skipping"
            );
            return;
        };
        relates.event_id = Some(new_target.clone());

        let content = serde_json::json!({ "m.relates_to": relates });
        let result = self
            .client
            .send_event(
                new_room_id,
                "m.reaction",
                &content,
                Some(&reaction.sender),
                Some(reaction.origin_server_ts),
            )
            .await;
        if let Err(e) = result {
            warn!(event_id = reaction.event_id.as_str(), error = %e, "reaction replay failed");
        }
    }
}

/// Translate a relation's references from old ids to new ones.
///
/// A thread/annotation target that never replayed drops the whole relation;
/// a missing rich-reply target drops only the reply reference. The message
/// itself is still worth importing either way.
fn rewrite_relation(
    mut relates: RelatesTo,
    id_map: &HashMap<String, String>,
) -> Option<RelatesTo> {
    if let Some(old) = relates.event_id.take() {
        match id_map.get(&old) {
            Some(new) => relates.event_id = Some(new.clone()),
            None => return None,
        }
    }
    if let Some(reply) = relates.in_reply_to.take() {
        match id_map.get(&reply.event_id) {
            Some(new) => {
                relates.in_reply_to = Some(InReplyTo {
                    event_id: new.clone(),
                })
            }
            None => {
                if relates.event_id.is_none() {
                    return None;
                }
            }
        }
    }
    Some(relates)
}
