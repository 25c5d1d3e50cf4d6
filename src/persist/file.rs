//! Flat-file backend: one encoded record per actor under the data directory.
//!
//! Writes go through a temp file followed by an atomic rename so a crash
//! mid-write never leaves a truncated record behind.

use super::backend::StorageBackend;
use super::codec::RecordCodec;
use crate::core::{ActorId, JobsError, Result};
use crate::store::record::ProgressionRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const RECORD_EXT: &str = "jfr";

pub struct FileBackend {
    dir: PathBuf,
    codec: RecordCodec,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>, codec: RecordCodec) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| JobsError::IoError(format!("create data dir: {}", e)))?;
        Ok(Self { dir, codec })
    }

    fn path_for(&self, actor: ActorId) -> PathBuf {
        self.dir.join(format!("{}.{}", actor, RECORD_EXT))
    }

    fn write_record(&self, record: &ProgressionRecord) -> Result<()> {
        let bytes = self.codec.encode(record)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| JobsError::IoError(format!("create temp record file: {}", e)))?;
        tmp.write_all(&bytes)
            .map_err(|e| JobsError::IoError(format!("write record: {}", e)))?;
        tmp.flush()
            .map_err(|e| JobsError::IoError(format!("flush record: {}", e)))?;
        tmp.persist(self.path_for(record.actor))
            .map_err(|e| JobsError::IoError(format!("persist record: {}", e)))?;
        Ok(())
    }

    fn read_record(&self, actor: ActorId) -> Result<Option<ProgressionRecord>> {
        let path = self.path_for(actor);
        if !path.exists() {
            return Ok(None);
        }
        let bytes =
            fs::read(&path).map_err(|e| JobsError::IoError(format!("read record: {}", e)))?;
        Ok(Some(self.codec.decode(&bytes)?))
    }

    /// List every actor with a stored record (admin cleanup / migration).
    pub fn stored_actors(&self) -> Result<Vec<ActorId>> {
        let mut actors = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .map_err(|e| JobsError::IoError(format!("list data dir: {}", e)))?
        {
            let entry = entry.map_err(|e| JobsError::IoError(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Some(actor) = ActorId::parse(stem)
            {
                actors.push(actor);
            }
        }
        Ok(actors)
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, actor: ActorId) -> Result<Option<ProgressionRecord>> {
        self.read_record(actor)
    }

    async fn store(&self, record: &ProgressionRecord) -> Result<()> {
        self.write_record(record)
    }

    async fn store_batch(&self, records: &HashMap<ActorId, ProgressionRecord>) -> Result<()> {
        // No transactional unit for flat files; write each and report the
        // first failure after attempting the rest.
        let mut first_err = None;
        for record in records.values() {
            if let Err(e) = self.write_record(record)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn delete(&self, actor: ActorId) -> Result<()> {
        let path = self.path_for(actor);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| JobsError::IoError(format!("delete record: {}", e)))?;
        }
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(JobsError::IoError(format!(
                "data dir {} is missing",
                self.dir.display()
            )))
        }
    }
}
