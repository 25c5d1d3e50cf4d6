//! Durable storage backend abstraction.

use crate::core::{ActorId, Result};
use crate::store::record::ProgressionRecord;
use async_trait::async_trait;
use std::collections::HashMap;

/// One durable home for progression records. Two implementations exist: the
/// flat-file backend (always available) and the relational backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means "no record stored", which is a normal case.
    async fn load(&self, actor: ActorId) -> Result<Option<ProgressionRecord>>;

    async fn store(&self, record: &ProgressionRecord) -> Result<()>;

    /// Store a batch in one execution unit where the backend supports it.
    async fn store_batch(&self, records: &HashMap<ActorId, ProgressionRecord>) -> Result<()>;

    async fn delete(&self, actor: ActorId) -> Result<()>;

    /// Cheap reachability probe for the health check.
    async fn health(&self) -> Result<()>;
}
