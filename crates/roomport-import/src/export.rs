// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Export-file model and archive loading.
//!
//! An export is either a plain JSON file or a zip archive holding
//! `export.json` plus attachment blobs. Events are discriminated by their
//! `type` tag: unknown types decode into a generic fallback variant rather
//! than failing, end-to-end-encrypted placeholders decode into an explicit
//! skip variant, and a known type with malformed content is a hard decode
//! error. Events are in chronological origin-timestamp order; the pipeline
//! depends on this.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use roomport_core::RoomportError;
use roomport_matrix::types::{
    MemberContent, MessageContent, ReactionContent, StateEvent,
};
use serde::Deserialize;

/// A parsed room export.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportFile {
    pub room_name: String,
    /// Displayname of the room creator, as declared by the exporting client.
    pub room_creator: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub export_date: String,
    #[serde(default)]
    pub exported_by: String,
    pub messages: Vec<ExportEvent>,
}

/// Fields shared by every export event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub sender: String,
    pub origin_server_ts: i64,
    pub event_id: String,
    pub room_id: String,
    #[serde(default)]
    pub state_key: Option<String>,
}

/// One export event, discriminated by its `type` tag.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Member {
        envelope: EventEnvelope,
        content: MemberContent,
    },
    Message {
        envelope: EventEnvelope,
        content: MessageContent,
    },
    Reaction {
        envelope: EventEnvelope,
        content: ReactionContent,
    },
    JoinRules {
        envelope: EventEnvelope,
        content: serde_json::Value,
    },
    HistoryVisibility {
        envelope: EventEnvelope,
        content: serde_json::Value,
    },
    GuestAccess {
        envelope: EventEnvelope,
        content: serde_json::Value,
    },
    RoomName {
        envelope: EventEnvelope,
        content: serde_json::Value,
    },
    Topic {
        envelope: EventEnvelope,
        content: TopicContent,
    },
    SpaceChild {
        envelope: EventEnvelope,
        content: serde_json::Value,
    },
    /// Types that cannot be replayed (encrypted payloads).
    Skipped {
        envelope: EventEnvelope,
        event_type: String,
    },
    /// Unknown but well-formed types, raw payload preserved.
    Generic {
        envelope: EventEnvelope,
        event_type: String,
        content: serde_json::Value,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicContent {
    pub topic: String,
}

/// Event types that exist in exports but can never be replayed.
const SKIPPED_EVENT_TYPES: &[&str] = &["m.room.encrypted"];

#[derive(Deserialize)]
struct RawExportEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(flatten)]
    envelope: EventEnvelope,
    content: serde_json::Value,
}

impl<'de> Deserialize<'de> for ExportEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawExportEvent::deserialize(deserializer)?;
        ExportEvent::from_raw(raw).map_err(serde::de::Error::custom)
    }
}

impl ExportEvent {
    fn from_raw(raw: RawExportEvent) -> Result<Self, String> {
        let RawExportEvent {
            event_type,
            envelope,
            content,
        } = raw;

        fn typed<T: serde::de::DeserializeOwned>(
            event_type: &str,
            event_id: &str,
            content: serde_json::Value,
        ) -> Result<T, String> {
            serde_json::from_value(content)
                .map_err(|e| format!("malformed {event_type} content in {event_id}: {e}"))
        }

        if SKIPPED_EVENT_TYPES.contains(&event_type.as_str()) {
            return Ok(ExportEvent::Skipped {
                envelope,
                event_type,
            });
        }

        Ok(match event_type.as_str() {
            "m.room.member" => ExportEvent::Member {
                content: typed(&event_type, &envelope.event_id, content)?,
                envelope,
            },
            "m.room.message" => ExportEvent::Message {
                content: typed(&event_type, &envelope.event_id, content)?,
                envelope,
            },
            // Exports written by older clients carry the legacy tag.
            "m.reaction" | "m.room.reaction" => ExportEvent::Reaction {
                content: typed(&event_type, &envelope.event_id, content)?,
                envelope,
            },
            "m.room.join_rules" => ExportEvent::JoinRules { envelope, content },
            "m.room.history_visibility" => {
                ExportEvent::HistoryVisibility { envelope, content }
            }
            "m.room.guest_access" => ExportEvent::GuestAccess { envelope, content },
            "m.room.name" => ExportEvent::RoomName { envelope, content },
            "m.room.topic" => ExportEvent::Topic {
                content: typed(&event_type, &envelope.event_id, content)?,
                envelope,
            },
            "m.space.child" => ExportEvent::SpaceChild { envelope, content },
            _ => ExportEvent::Generic {
                envelope,
                event_type,
                content,
            },
        })
    }

    pub fn envelope(&self) -> &EventEnvelope {
        match self {
            ExportEvent::Member { envelope, .. }
            | ExportEvent::Message { envelope, .. }
            | ExportEvent::Reaction { envelope, .. }
            | ExportEvent::JoinRules { envelope, .. }
            | ExportEvent::HistoryVisibility { envelope, .. }
            | ExportEvent::GuestAccess { envelope, .. }
            | ExportEvent::RoomName { envelope, .. }
            | ExportEvent::Topic { envelope, .. }
            | ExportEvent::SpaceChild { envelope, .. }
            | ExportEvent::Skipped { envelope, .. }
            | ExportEvent::Generic { envelope, .. } => envelope,
        }
    }
}

impl ExportFile {
    /// The old room id, taken from the first event carrying one.
    pub fn old_room_id(&self) -> Option<&str> {
        self.messages
            .first()
            .map(|event| event.envelope().room_id.as_str())
    }

    /// The member event of the declared room creator: the first membership
    /// event whose displayname matches `room_creator`. Its sender is the
    /// acting identity for room creation and its timestamp the creation
    /// timestamp.
    pub fn creator_event(&self) -> Option<&EventEnvelope> {
        self.messages.iter().find_map(|event| match event {
            ExportEvent::Member { envelope, content }
                if content.displayname.as_deref() == Some(self.room_creator.as_str()) =>
            {
                Some(envelope)
            }
            _ => None,
        })
    }

    /// Initial state for room creation: join rules, history visibility, and
    /// guest access, in export order.
    pub fn initial_state_events(&self) -> Vec<StateEvent> {
        self.messages
            .iter()
            .filter_map(|event| {
                let (event_type, envelope, content) = match event {
                    ExportEvent::JoinRules { envelope, content } => {
                        ("m.room.join_rules", envelope, content)
                    }
                    ExportEvent::HistoryVisibility { envelope, content } => {
                        ("m.room.history_visibility", envelope, content)
                    }
                    ExportEvent::GuestAccess { envelope, content } => {
                        ("m.room.guest_access", envelope, content)
                    }
                    _ => return None,
                };
                Some(StateEvent {
                    event_type: event_type.into(),
                    state_key: envelope.state_key.clone(),
                    content: content.clone(),
                })
            })
            .collect()
    }

    /// Room topic: the export metadata field, falling back to the last topic
    /// event.
    pub fn room_topic(&self) -> Option<String> {
        if !self.topic.is_empty() {
            return Some(self.topic.clone());
        }
        self.messages.iter().rev().find_map(|event| match event {
            ExportEvent::Topic { content, .. } => Some(content.topic.clone()),
            _ => None,
        })
    }
}

/// A loaded export: the parsed file plus attachment blobs keyed by
/// normalized filename.
pub struct LoadedExport {
    pub export: ExportFile,
    pub attachments: HashMap<String, Vec<u8>>,
}

/// Load an export from a zip archive or a plain JSON file.
///
/// Synchronous; run under `spawn_blocking`.
pub fn load_export(path: &Path) -> Result<LoadedExport, RoomportError> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let bytes = std::fs::read(path).map_err(|e| RoomportError::Storage {
            source: Box::new(e),
        })?;
        let export = parse_export(&bytes)?;
        return Ok(LoadedExport {
            export,
            attachments: HashMap::new(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| RoomportError::Storage {
        source: Box::new(e),
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| RoomportError::Validation(format!("not a zip archive: {e}")))?;

    let mut export = None;
    let mut attachments = HashMap::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| RoomportError::Validation(format!("unreadable archive entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| RoomportError::Storage {
                source: Box::new(e),
            })?;

        if name == "export.json" || name.ends_with("/export.json") {
            export = Some(parse_export(&bytes)?);
        } else {
            let base = name.rsplit('/').next().unwrap_or(name.as_str());
            attachments.insert(normalize_attachment_name(base), bytes);
        }
    }

    let export = export
        .ok_or_else(|| RoomportError::Validation("archive contains no export.json".into()))?;
    Ok(LoadedExport {
        export,
        attachments,
    })
}

fn parse_export(bytes: &[u8]) -> Result<ExportFile, RoomportError> {
    serde_json::from_slice(bytes)
        .map_err(|e| RoomportError::Validation(format!("invalid export file: {e}")))
}

static COUNTER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+\)$").expect("static regex"));
static TIMESTAMP_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ _-]\d{1,2}-\d{1,2}-\d{4}(?:[ _]at[ _]|[ _])\d{1,2}-\d{2}-\d{2}$")
        .expect("static regex")
});

/// Strip client-added dedup counters and export timestamps from an
/// attachment filename, so messages referencing the original name find
/// their blob.
pub fn normalize_attachment_name(name: &str) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let stem = COUNTER_SUFFIX.replace(stem, "");
    let stem = TIMESTAMP_SUFFIX.replace(&stem, "");
    format!("{stem}{ext}")
}
