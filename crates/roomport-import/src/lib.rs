// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Export-file model and import pipeline worker for the Roomport bridge.
//!
//! The worker replays an exported room against the homeserver: room
//! creation, state, timeline, media, and reactions, each action issued as
//! its original sender at its original timestamp.

pub mod export;
pub mod worker;

pub use export::{ExportEvent, ExportFile, LoadedExport, load_export, normalize_attachment_name};
pub use worker::{ImportWorker, WorkerSettings};
