//! Multi-tier asynchronous persistence.
//!
//! A read-through/write-back cache of progression records in front of two
//! interchangeable durable backends: SQLite (when configured) and flat files.
//! Relational failures fall back to the file backend per record, so data is
//! never silently dropped. Background sweeps flush dirty records and evict
//! idle ones; all I/O runs off the event path.

pub mod backend;
pub mod cache;
pub mod codec;
pub mod file;
pub mod metrics;
pub mod sql;

pub use backend::StorageBackend;
pub use cache::{CacheEntry, RecordCache};
pub use codec::RecordCodec;
pub use file::FileBackend;
pub use metrics::{MetricsSnapshot, PersistenceMetrics};
pub use sql::SqliteBackend;

use crate::config::ServiceConfig;
use crate::core::{ActorId, JobsError, Result};
use crate::store::record::ProgressionRecord;
use log::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;

pub struct PersistenceService {
    cache: Arc<RecordCache>,
    file: Arc<FileBackend>,
    sqlite: Option<Arc<SqliteBackend>>,
    metrics: Arc<PersistenceMetrics>,
    batch_size: usize,
    load_timeout: Duration,
    cache_ttl: Duration,
    autosave_interval: Duration,
    shutdown_grace: Duration,
    /// Runtime handle for spawning background work from synchronous paths.
    runtime: Option<Handle>,
    in_flight: Arc<AtomicU64>,
    shutting_down: Arc<AtomicBool>,
    /// Level-triggered stop flag; sweeps subscribe before their first tick so
    /// a shutdown signaled mid-tick is still observed.
    stop: watch::Sender<bool>,
}

impl PersistenceService {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let codec = RecordCodec::new(config.compression);
        let file = Arc::new(FileBackend::new(&config.data_dir, codec)?);

        let sqlite = if config.use_sqlite {
            match SqliteBackend::open(config.sqlite_path(), codec) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    // Degraded but functional: the file backend carries all
                    // traffic until the next restart.
                    error!("sqlite backend unavailable, using file backend only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            cache: Arc::new(RecordCache::new()),
            file,
            sqlite,
            metrics: Arc::new(PersistenceMetrics::new()),
            batch_size: config.batch_size.max(1),
            load_timeout: config.load_timeout,
            cache_ttl: config.cache_ttl,
            autosave_interval: config.autosave_interval,
            shutdown_grace: config.shutdown_grace,
            runtime: Handle::try_current().ok(),
            in_flight: Arc::new(AtomicU64::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            stop: watch::channel(false).0,
        })
    }

    /// The shared actor -> record cache. All record mutation goes through
    /// this map; no component keeps a private copy.
    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn sqlite_enabled(&self) -> bool {
        self.sqlite.is_some()
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Load an actor's record into the cache, bounded by the configured
    /// timeout. On timeout or backend failure a fresh empty record is
    /// installed and the real load continues in the background; a placeholder
    /// that took writes in the meantime has the durable copy merged in
    /// underneath them.
    pub async fn load(&self, actor: ActorId) -> Arc<Mutex<CacheEntry>> {
        if let Some(entry) = self.cache.get(actor) {
            self.metrics.record_cache_hit();
            return entry;
        }
        self.metrics.record_cache_miss();

        let started = Instant::now();
        match tokio::time::timeout(self.load_timeout, self.load_from_backend(actor)).await {
            Ok(Ok(Some(record))) => {
                self.metrics.record_read(started.elapsed());
                self.cache.put(record)
            }
            Ok(Ok(None)) => {
                self.metrics.record_read(started.elapsed());
                self.cache.put(ProgressionRecord::new(actor))
            }
            Ok(Err(e)) => {
                // Progression continuity over hard failure: the actor gets a
                // fresh record and the error is only logged.
                warn!("load for {} failed, using empty record: {}", actor, e);
                self.metrics.record_failure();
                self.cache.put(ProgressionRecord::new(actor))
            }
            Err(_) => {
                warn!("load for {} timed out, using placeholder", actor);
                let entry = self.cache.put(ProgressionRecord::new(actor));
                self.spawn_background_load(actor);
                entry
            }
        }
    }

    /// Synchronous hot-path variant: cache hit, or an immediately usable
    /// placeholder plus a background load. Never blocks on I/O.
    pub fn ensure_cached(&self, actor: ActorId) -> Arc<Mutex<CacheEntry>> {
        let (entry, hit) = self
            .cache
            .get_or_insert_with(actor, || ProgressionRecord::new(actor));
        if hit {
            self.metrics.record_cache_hit();
        } else {
            self.metrics.record_cache_miss();
            self.spawn_background_load(actor);
        }
        entry
    }

    /// Preload a set of actors concurrently (mass-connect path).
    pub async fn load_batch(&self, actors: &HashSet<ActorId>) -> usize {
        let loads = actors.iter().map(|actor| self.load(*actor));
        futures::future::join_all(loads).await.len()
    }

    async fn load_from_backend(&self, actor: ActorId) -> Result<Option<ProgressionRecord>> {
        if let Some(sqlite) = &self.sqlite {
            match sqlite.load(actor).await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    warn!("sqlite load for {} failed, trying file backend: {}", actor, e);
                    self.metrics.record_fallback();
                }
            }
        }
        self.file.load(actor).await
    }

    fn spawn_background_load(&self, actor: ActorId) {
        let Some(handle) = self.runtime.clone() else {
            debug!("no runtime handle; skipping background load for {}", actor);
            return;
        };
        let cache = Arc::clone(&self.cache);
        let file = Arc::clone(&self.file);
        let sqlite = self.sqlite.clone();
        let metrics = Arc::clone(&self.metrics);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        handle.spawn(async move {
            let loaded = match &sqlite {
                Some(backend) => match backend.load(actor).await {
                    Ok(found) => Ok(found),
                    Err(e) => {
                        warn!("background sqlite load for {} failed: {}", actor, e);
                        metrics.record_fallback();
                        file.load(actor).await
                    }
                },
                None => file.load(actor).await,
            };

            match loaded {
                Ok(Some(record)) => {
                    if let Some(entry) = cache.get(actor) {
                        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
                        if guard.dirty {
                            // The placeholder already took writes; fold the
                            // durable history in underneath them so neither
                            // side is lost.
                            debug!("merging durable record for {} under placeholder writes", actor);
                            guard.record.merge_durable(record);
                        } else {
                            guard.record.replace_with(record);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("background load for {} failed: {}", actor, e);
                    metrics.record_failure();
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Write one record durably, falling back to the file backend when the
    /// relational write fails.
    async fn store_record(&self, record: &ProgressionRecord) -> Result<()> {
        let started = Instant::now();
        let result = match &self.sqlite {
            Some(sqlite) => match sqlite.store(record).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!(
                        "sqlite store for {} failed, falling back to file: {}",
                        record.actor, e
                    );
                    self.metrics.record_fallback();
                    self.file.store(record).await
                }
            },
            None => self.file.store(record).await,
        };
        match result {
            Ok(()) => {
                self.metrics.record_write(started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    /// Flush one actor's cached record to durable storage. A failed write
    /// re-marks the entry dirty so the next sweep picks it up again.
    pub async fn save(&self, actor: ActorId) -> Result<()> {
        let Some(entry) = self.cache.get(actor) else {
            return Ok(());
        };
        let record = {
            let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
            guard.dirty = false;
            guard.record.clone()
        };
        if let Err(e) = self.store_record(&record).await {
            entry.lock().unwrap_or_else(|e| e.into_inner()).dirty = true;
            return Err(e);
        }
        Ok(())
    }

    /// Write a batch of records, chunked to bound transaction size. A failed
    /// relational chunk falls back to per-record file writes for the whole
    /// chunk.
    pub async fn save_batch(&self, records: HashMap<ActorId, ProgressionRecord>) -> Result<usize> {
        let mut saved = 0;
        let all: Vec<ProgressionRecord> = records.into_values().collect();

        for chunk in all.chunks(self.batch_size) {
            self.metrics.record_batch();
            let chunk_map: HashMap<ActorId, ProgressionRecord> =
                chunk.iter().map(|r| (r.actor, r.clone())).collect();

            let sqlite_ok = match &self.sqlite {
                Some(sqlite) => match sqlite.store_batch(&chunk_map).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("sqlite batch failed, writing chunk to files: {}", e);
                        self.metrics.record_fallback();
                        false
                    }
                },
                None => false,
            };

            if sqlite_ok {
                saved += chunk_map.len();
                continue;
            }

            for record in chunk_map.values() {
                match self.file.store(record).await {
                    Ok(()) => saved += 1,
                    Err(e) => {
                        error!("file store for {} failed: {}", record.actor, e);
                        self.metrics.record_failure();
                        // Hand the record back to the next dirty sweep.
                        self.cache.mark_dirty(record.actor);
                    }
                }
            }
        }
        Ok(saved)
    }

    /// Flush everything the cache has marked dirty.
    pub async fn save_all_dirty(&self) -> Result<usize> {
        let dirty = self.cache.take_dirty();
        if dirty.is_empty() {
            return Ok(0);
        }
        debug!("auto-save sweep flushing {} dirty records", dirty.len());
        self.save_batch(dirty).await
    }

    /// Save-if-dirty then drop the actor's cache entry (disconnect path).
    /// The durable write happens first; on failure the entry stays cached and
    /// dirty, and an entry mutated again during the write survives too.
    pub async fn evict(&self, actor: ActorId) -> Result<()> {
        let Some(entry) = self.cache.get(actor) else {
            return Ok(());
        };
        let (record, dirty) = {
            let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
            let dirty = guard.dirty;
            guard.dirty = false;
            (guard.record.clone(), dirty)
        };
        if dirty && let Err(e) = self.store_record(&record).await {
            entry.lock().unwrap_or_else(|e| e.into_inner()).dirty = true;
            return Err(e);
        }
        if self.cache.evict_clean(actor) {
            self.metrics.record_eviction();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Background maintenance
    // -----------------------------------------------------------------------

    /// Spawn the auto-save and cache-expiry sweeps. Call once, from within a
    /// runtime.
    pub fn start_maintenance(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let mut stop = self.stop.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(service.autosave_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = service.save_all_dirty().await {
                            error!("auto-save sweep failed: {}", e);
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        });

        let service = Arc::clone(self);
        let mut stop = self.stop.subscribe();
        tokio::spawn(async move {
            // Expiry sweeps run at a quarter of the TTL, bounded below.
            let period = (service.cache_ttl / 4).max(Duration::from_secs(5));
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => service.expire_idle().await,
                    _ = stop.changed() => break,
                }
            }
        });
    }

    async fn expire_idle(&self) {
        for actor in self.cache.idle_actors(self.cache_ttl) {
            if let Err(e) = self.evict(actor).await {
                // Entry stays cached; the next sweep retries.
                warn!("expiry eviction for {} failed: {}", actor, e);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Health & shutdown
    // -----------------------------------------------------------------------

    pub async fn health(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(JobsError::ShuttingDown);
        }
        if let Some(sqlite) = &self.sqlite {
            sqlite.health().await?;
        }
        self.file.health().await
    }

    /// Stop maintenance, flush dirty records, and wait (bounded) for
    /// background work to drain. File-backend errors here are logged and
    /// counted but never abort the shutdown sequence.
    pub async fn shutdown(&self) -> Result<usize> {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.stop.send_replace(true);

        let flushed = match self.save_all_dirty().await {
            Ok(n) => n,
            Err(e) => {
                error!("final flush failed: {}", e);
                self.metrics.record_failure();
                0
            }
        };

        let deadline = Instant::now() + self.shutdown_grace;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    "abandoning {} in-flight persistence tasks after grace period",
                    self.in_flight.load(Ordering::SeqCst)
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        Ok(flushed)
    }
}
