// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counting wait/signal primitive between the webhook dispatcher and the
//! import worker.
//!
//! The durable queue store is the actual job transport; the gate only carries
//! "work is available". Its permit count always equals the number of queued
//! jobs the worker has not yet started: seeded from the persisted queue
//! length at startup, incremented by the producer on enqueue, decremented by
//! the consumer before it dequeues.

use tokio::sync::Semaphore;

use crate::error::RoomportError;

/// Semaphore-backed gate for the single import worker.
pub struct ImportGate {
    permits: Semaphore,
}

impl ImportGate {
    /// Creates a gate holding `backlog` permits, one per job already
    /// persisted in the queue store. Jobs queued before a crash therefore
    /// wake the worker without any external signal.
    pub fn new(backlog: usize) -> Self {
        Self {
            permits: Semaphore::new(backlog),
        }
    }

    /// Signals that one job has been enqueued.
    pub fn notify(&self) {
        self.permits.add_permits(1);
    }

    /// Blocks until a job is available, consuming one permit.
    pub async fn wait(&self) -> Result<(), RoomportError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RoomportError::Internal("import gate closed".into()))?;
        permit.forget();
        Ok(())
    }
}
