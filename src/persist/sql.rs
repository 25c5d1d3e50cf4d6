//! Relational backend over SQLite.
//!
//! One row per actor keyed by identity, written with an upsert. Every call
//! goes through `spawn_blocking` so the event path never blocks on the
//! connection mutex.

use super::backend::StorageBackend;
use super::codec::RecordCodec;
use crate::core::{ActorId, JobsError, Result};
use crate::store::record::ProgressionRecord;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    codec: RecordCodec,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>, codec: RecordCodec) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| JobsError::IoError(format!("create sqlite dir: {}", e)))?;
        }
        let conn = Connection::open(path.as_ref())?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
            codec,
        };
        backend.init_schema()?;
        Ok(backend)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory(codec: RecordCodec) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
            codec,
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS progression (
                actor_id   TEXT PRIMARY KEY,
                payload    BLOB NOT NULL,
                compressed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }

    fn upsert_one(conn: &Connection, codec: &RecordCodec, record: &ProgressionRecord) -> Result<()> {
        let payload = codec.encode(record)?;
        let compressed = RecordCodec::is_compressed(&payload) as i64;
        conn.execute(
            r#"
            INSERT INTO progression (actor_id, payload, compressed, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(actor_id) DO UPDATE SET
                payload = excluded.payload,
                compressed = excluded.compressed,
                updated_at = excluded.updated_at
            "#,
            params![
                record.actor.to_string(),
                payload,
                compressed,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &RecordCodec) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let codec = self.codec;
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock()?;
            op(&guard, &codec)
        })
        .await
        .map_err(|e| JobsError::BackendError(format!("sqlite task join: {}", e)))?
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self, actor: ActorId) -> Result<Option<ProgressionRecord>> {
        self.run_blocking(move |conn, codec| {
            let payload: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT payload FROM progression WHERE actor_id = ?1",
                    params![actor.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            match payload {
                Some(bytes) => Ok(Some(codec.decode(&bytes)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn store(&self, record: &ProgressionRecord) -> Result<()> {
        let record = record.clone();
        self.run_blocking(move |conn, codec| Self::upsert_one(conn, codec, &record))
            .await
    }

    async fn store_batch(&self, records: &HashMap<ActorId, ProgressionRecord>) -> Result<()> {
        let records: Vec<ProgressionRecord> = records.values().cloned().collect();
        self.run_blocking(move |conn, codec| {
            // One transaction per chunk keeps the whole batch atomic.
            conn.execute_batch("BEGIN")?;
            for record in &records {
                if let Err(e) = Self::upsert_one(conn, codec, record) {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e);
                }
            }
            conn.execute_batch("COMMIT")?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, actor: ActorId) -> Result<()> {
        self.run_blocking(move |conn, _| {
            conn.execute(
                "DELETE FROM progression WHERE actor_id = ?1",
                params![actor.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn health(&self) -> Result<()> {
        self.run_blocking(|conn, _| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobId;

    fn sample(actor: ActorId, xp: f64) -> ProgressionRecord {
        let mut rec = ProgressionRecord::new(actor);
        let job = JobId::new("builder");
        rec.join(job.clone());
        rec.add_xp(job, xp).unwrap();
        rec
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let backend = SqliteBackend::open_in_memory(RecordCodec::new(false)).unwrap();
        let actor = ActorId::new();

        backend.store(&sample(actor, 10.0)).await.unwrap();
        backend.store(&sample(actor, 55.0)).await.unwrap();

        let loaded = backend.load(actor).await.unwrap().unwrap();
        assert_eq!(loaded.xp(&JobId::new("builder")), 55.0);
    }

    #[tokio::test]
    async fn batch_store_is_atomic() {
        let backend = SqliteBackend::open_in_memory(RecordCodec::new(true)).unwrap();
        let mut batch = HashMap::new();
        let actors: Vec<ActorId> = (0..5).map(|_| ActorId::new()).collect();
        for (i, actor) in actors.iter().enumerate() {
            batch.insert(*actor, sample(*actor, i as f64 + 1.0));
        }

        backend.store_batch(&batch).await.unwrap();
        for actor in &actors {
            assert!(backend.load(*actor).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn health_probe_succeeds() {
        let backend = SqliteBackend::open_in_memory(RecordCodec::new(false)).unwrap();
        backend.health().await.unwrap();
    }

    #[tokio::test]
    async fn compressed_flag_is_stored() {
        let backend = SqliteBackend::open_in_memory(RecordCodec::new(true)).unwrap();
        let actor = ActorId::new();
        backend.store(&sample(actor, 1.0)).await.unwrap();

        let conn = backend.conn.lock().unwrap();
        let compressed: i64 = conn
            .query_row(
                "SELECT compressed FROM progression WHERE actor_id = ?1",
                params![actor.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(compressed, 1);
    }
}
