//! Actor-sharded record cache with dirty tracking.
//!
//! The cache is the single shared mutable resource between the progression
//! store and the persistence service. Entries are `Arc<Mutex<_>>` so mutation
//! of one actor's record is linearized on that entry alone; the shard locks
//! are held only for map lookups, never across record work.

use crate::core::ActorId;
use crate::store::record::ProgressionRecord;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

const SHARD_COUNT: usize = 16;

#[derive(Debug)]
pub struct CacheEntry {
    pub record: ProgressionRecord,
    /// Mutated since the last durable write.
    pub dirty: bool,
    pub last_access: Instant,
}

impl CacheEntry {
    fn new(record: ProgressionRecord) -> Self {
        Self {
            record,
            dirty: false,
            last_access: Instant::now(),
        }
    }
}

pub struct RecordCache {
    shards: Vec<RwLock<HashMap<ActorId, Arc<Mutex<CacheEntry>>>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards }
    }

    fn shard(&self, actor: ActorId) -> &RwLock<HashMap<ActorId, Arc<Mutex<CacheEntry>>>> {
        let mut hasher = DefaultHasher::new();
        actor.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    pub fn get(&self, actor: ActorId) -> Option<Arc<Mutex<CacheEntry>>> {
        let shard = self.shard(actor).read().unwrap_or_else(|e| e.into_inner());
        shard.get(&actor).cloned()
    }

    /// Fetch the entry, installing one built by `init` on a miss. The bool is
    /// true on a hit.
    pub fn get_or_insert_with<F>(&self, actor: ActorId, init: F) -> (Arc<Mutex<CacheEntry>>, bool)
    where
        F: FnOnce() -> ProgressionRecord,
    {
        {
            let shard = self.shard(actor).read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = shard.get(&actor) {
                return (Arc::clone(entry), true);
            }
        }
        let mut shard = self.shard(actor).write().unwrap_or_else(|e| e.into_inner());
        // Re-check: another thread may have inserted between the locks.
        if let Some(entry) = shard.get(&actor) {
            return (Arc::clone(entry), true);
        }
        let entry = Arc::new(Mutex::new(CacheEntry::new(init())));
        shard.insert(actor, Arc::clone(&entry));
        (entry, false)
    }

    /// Insert or replace an actor's record (load path). Not marked dirty.
    pub fn put(&self, record: ProgressionRecord) -> Arc<Mutex<CacheEntry>> {
        let actor = record.actor;
        let entry = Arc::new(Mutex::new(CacheEntry::new(record)));
        let mut shard = self.shard(actor).write().unwrap_or_else(|e| e.into_inner());
        shard.insert(actor, Arc::clone(&entry));
        entry
    }

    /// Run `f` against the actor's record under its entry lock, marking the
    /// entry dirty. Returns `None` when the actor is not cached.
    pub fn mutate<T, F>(&self, actor: ActorId, f: F) -> Option<T>
    where
        F: FnOnce(&mut ProgressionRecord) -> T,
    {
        let entry = self.get(actor)?;
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.last_access = Instant::now();
        guard.dirty = true;
        Some(f(&mut guard.record))
    }

    /// Read-only view of the actor's record.
    pub fn read<T, F>(&self, actor: ActorId, f: F) -> Option<T>
    where
        F: FnOnce(&ProgressionRecord) -> T,
    {
        let entry = self.get(actor)?;
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.last_access = Instant::now();
        Some(f(&guard.record))
    }

    /// Snapshot all dirty records and clear their dirty flags. The caller
    /// owns getting the snapshots to durable storage (entries mutated again
    /// in the meantime simply become dirty again).
    pub fn take_dirty(&self) -> HashMap<ActorId, ProgressionRecord> {
        let mut out = HashMap::new();
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(|e| e.into_inner());
            for (actor, entry) in shard.iter() {
                let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
                if guard.dirty {
                    guard.dirty = false;
                    out.insert(*actor, guard.record.clone());
                }
            }
        }
        out
    }

    /// Remove the actor's entry, returning its record and whether it was
    /// still dirty.
    pub fn evict(&self, actor: ActorId) -> Option<(ProgressionRecord, bool)> {
        let entry = {
            let mut shard = self.shard(actor).write().unwrap_or_else(|e| e.into_inner());
            shard.remove(&actor)?
        };
        let guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        Some((guard.record.clone(), guard.dirty))
    }

    /// Remove the actor's entry only if it is clean. A dirty entry (mutated
    /// after the caller's durable write, or one whose write failed) stays
    /// cached for the next sweep. Returns whether the entry was removed.
    pub fn evict_clean(&self, actor: ActorId) -> bool {
        let mut shard = self.shard(actor).write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = shard.get(&actor) else {
            return false;
        };
        let dirty = entry.lock().unwrap_or_else(|e| e.into_inner()).dirty;
        if dirty {
            return false;
        }
        shard.remove(&actor);
        true
    }

    /// Re-flag a cached entry as needing a durable write (failed-write path).
    /// No-op when the actor is not cached.
    pub fn mark_dirty(&self, actor: ActorId) -> bool {
        let Some(entry) = self.get(actor) else {
            return false;
        };
        entry.lock().unwrap_or_else(|e| e.into_inner()).dirty = true;
        true
    }

    /// Actors whose entries are clean and idle beyond `ttl`.
    pub fn idle_actors(&self, ttl: Duration) -> Vec<ActorId> {
        let now = Instant::now();
        let mut idle = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(|e| e.into_inner());
            for (actor, entry) in shard.iter() {
                let guard = entry.lock().unwrap_or_else(|e| e.into_inner());
                if !guard.dirty && now.duration_since(guard.last_access) >= ttl {
                    idle.push(*actor);
                }
            }
        }
        idle
    }

    pub fn cached_actors(&self) -> Vec<ActorId> {
        let mut actors = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(|e| e.into_inner());
            actors.extend(shard.keys().copied());
        }
        actors
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
