// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO queue of pending import jobs.
//!
//! Insertion order is processing order. Consumption is at-most-once: a row is
//! deleted when dequeued, so a crash between dequeue and job completion loses
//! that job. Operators resubmit the export manually in that case.

use std::collections::BTreeMap;

use roomport_core::RoomportError;
use rusqlite::params;
use tokio::sync::Mutex;

use crate::database::{Database, map_tr_err};

/// A queued import job: the downloaded export archive plus the message event
/// that submitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessJob {
    /// Filesystem path of the downloaded export archive or JSON file.
    pub path: String,
    /// Event id of the triggering file message (thread root for status
    /// messages).
    pub event_id: String,
    /// Room the submission came from.
    pub room_id: String,
}

/// Write-through cache over the `import_queue` table.
pub struct QueueStore {
    db: Database,
    cache: Mutex<BTreeMap<i64, ProcessJob>>,
}

impl QueueStore {
    /// Load all rows into memory.
    pub async fn open(db: Database) -> Result<Self, RoomportError> {
        let rows = db
            .connection()
            .call(|conn| -> Result<Vec<(i64, ProcessJob)>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT id, path, event_id, room_id FROM import_queue")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get(0)?,
                            ProcessJob {
                                path: row.get(1)?,
                                event_id: row.get(2)?,
                                room_id: row.get(3)?,
                            },
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(Self {
            db,
            cache: Mutex::new(rows.into_iter().collect()),
        })
    }

    /// Enqueue a job. Returns the store-assigned row id.
    pub async fn append(&self, job: ProcessJob) -> Result<i64, RoomportError> {
        let mut cache = self.cache.lock().await;
        let insert = job.clone();
        let id = self
            .db
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO import_queue (path, event_id, room_id) VALUES (?1, ?2, ?3)",
                    params![insert.path, insert.event_id, insert.room_id],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)?;
        cache.insert(id, job);
        Ok(id)
    }

    /// Remove a specific job by row id. A missing row is a hard error.
    pub async fn pop(&self, id: i64) -> Result<ProcessJob, RoomportError> {
        let mut cache = self.cache.lock().await;
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM import_queue WHERE id = ?1", params![id])
            })
            .await
            .map_err(map_tr_err)?;
        if removed == 0 {
            return Err(RoomportError::NotFound {
                what: "queue row",
                key: id.to_string(),
            });
        }
        cache.remove(&id).ok_or(RoomportError::NotFound {
            what: "queue row",
            key: id.to_string(),
        })
    }

    /// Dequeue the oldest job, or `None` when the queue is empty.
    ///
    /// The row with the smallest insertion id is deleted and returned inside
    /// one transaction, and the cache lock is held across the whole
    /// operation, so concurrent poppers of the same store instance can never
    /// observe or consume the same row.
    pub async fn get_and_remove_next(&self) -> Result<Option<ProcessJob>, RoomportError> {
        let mut cache = self.cache.lock().await;
        let Some((&id, _)) = cache.iter().next() else {
            return Ok(None);
        };

        let job = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<ProcessJob>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let job = {
                    let mut stmt = tx.prepare(
                        "SELECT path, event_id, room_id FROM import_queue WHERE id = ?1",
                    )?;
                    match stmt.query_row(params![id], |row| {
                        Ok(ProcessJob {
                            path: row.get(0)?,
                            event_id: row.get(1)?,
                            room_id: row.get(2)?,
                        })
                    }) {
                        Ok(job) => Some(job),
                        Err(rusqlite::Error::QueryReturnedNoRows) => None,
                        Err(e) => return Err(e),
                    }
                };
                if job.is_some() {
                    tx.execute("DELETE FROM import_queue WHERE id = ?1", params![id])?;
                }
                tx.commit()?;
                Ok(job)
            })
            .await
            .map_err(map_tr_err)?;

        let job = job.ok_or(RoomportError::NotFound {
            what: "queue row",
            key: id.to_string(),
        })?;
        cache.remove(&id);
        Ok(Some(job))
    }

    /// Number of queued jobs. Used to seed the import gate at startup.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Whether the queue holds no jobs.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn job(n: u32) -> ProcessJob {
        ProcessJob {
            path: format!("/imports/export-{n}.zip"),
            event_id: format!("$evt{n}"),
            room_id: "!control:example.org".into(),
        }
    }

    async fn open_store(path: &std::path::Path) -> QueueStore {
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        QueueStore::open(db).await.unwrap()
    }

    #[tokio::test]
    async fn dequeue_is_fifo() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("q.db")).await;

        store.append(job(1)).await.unwrap();
        store.append(job(2)).await.unwrap();
        store.append(job(3)).await.unwrap();

        assert_eq!(store.get_and_remove_next().await.unwrap(), Some(job(1)));
        assert_eq!(store.get_and_remove_next().await.unwrap(), Some(job(2)));
        assert_eq!(store.get_and_remove_next().await.unwrap(), Some(job(3)));
        assert_eq!(store.get_and_remove_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn backlog_survives_reopen_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.db");

        let store = open_store(&path).await;
        store.append(job(1)).await.unwrap();
        store.append(job(2)).await.unwrap();
        drop(store);

        let store = open_store(&path).await;
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get_and_remove_next().await.unwrap(), Some(job(1)));
        assert_eq!(store.get_and_remove_next().await.unwrap(), Some(job(2)));
    }

    #[tokio::test]
    async fn dequeued_job_is_gone_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.db");

        let store = open_store(&path).await;
        store.append(job(1)).await.unwrap();
        store.append(job(2)).await.unwrap();
        store.get_and_remove_next().await.unwrap();
        drop(store);

        let store = open_store(&path).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get_and_remove_next().await.unwrap(), Some(job(2)));
    }

    #[tokio::test]
    async fn pop_missing_row_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("q.db")).await;
        let err = store.pop(99).await.unwrap_err();
        assert!(matches!(err, RoomportError::NotFound { .. }));
    }
}
