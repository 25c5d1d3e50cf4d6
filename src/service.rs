//! High-level service facade.
//!
//! [`JobsService`] is the recommended entry point: it wires configuration,
//! providers, the store, limiter, router and persistence together, runs the
//! background maintenance tasks, and exposes the event-ingestion and admin
//! control surfaces.

use crate::config::{JobConfig, ServiceConfig};
use crate::core::{ActionCategory, ActorId, ContextValue, EventContext, JobId, Result};
use crate::limiter::{LimitStatus, RateLimiter};
use crate::persist::PersistenceService;
use crate::providers::ProviderRegistry;
use crate::router::{ActionRouter, RouterPolicy};
use crate::store::{LevelChange, ProgressionStore};
use log::info;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct JobsService {
    persistence: Arc<PersistenceService>,
    store: Arc<ProgressionStore>,
    limiter: Arc<RateLimiter>,
    router: ActionRouter,
    /// Level-triggered stop flag for the schedule ticker.
    stop: watch::Sender<bool>,
}

impl JobsService {
    /// Build and start the service. Must be called from within a tokio
    /// runtime; background maintenance starts immediately.
    pub fn start(
        config: ServiceConfig,
        jobs: Vec<JobConfig>,
        providers: ProviderRegistry,
    ) -> Result<Arc<Self>> {
        let persistence = Arc::new(PersistenceService::new(&config)?);
        let store = Arc::new(ProgressionStore::new(Arc::clone(&persistence), jobs));

        let limiter = Arc::new(RateLimiter::new());
        limiter.configure(&store.job_index().all_configs());

        let router = ActionRouter::new(
            Arc::clone(&store),
            Arc::clone(&limiter),
            providers,
            RouterPolicy {
                tier_node_prefix: config.tier_node_prefix.clone(),
                elevated_node: config.elevated_permission_node.clone(),
                exclude_elevated: config.exclude_elevated_from_tiers,
            },
        );

        let service = Arc::new(Self {
            persistence,
            store,
            limiter,
            router,
            stop: watch::channel(false).0,
        });

        service.persistence.start_maintenance();
        service.start_schedule_ticker();
        info!(
            "jobforge started: {} active jobs, sqlite={}",
            service.store.job_index().active_jobs().len(),
            service.persistence.sqlite_enabled()
        );
        Ok(service)
    }

    /// Once-per-minute auto-restore schedule evaluation.
    fn start_schedule_ticker(self: &Arc<Self>) {
        let limiter = Arc::clone(&self.limiter);
        let mut stop = self.stop.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        limiter.tick_schedules();
                    }
                    _ = stop.changed() => break,
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Event ingestion
    // -----------------------------------------------------------------------

    /// Entry point for the game-event source. Returns true when the
    /// originating event should be cancelled.
    pub fn notify(
        &self,
        actor: ActorId,
        category: ActionCategory,
        target: &str,
        attributes: HashMap<String, ContextValue>,
    ) -> bool {
        let ctx = EventContext {
            target: target.to_string(),
            attributes,
        };
        self.router.process(actor, category, &ctx)
    }

    /// Same as [`notify`](Self::notify) with a pre-built context.
    pub fn process(&self, actor: ActorId, category: ActionCategory, ctx: &EventContext) -> bool {
        self.router.process(actor, category, ctx)
    }

    // -----------------------------------------------------------------------
    // Actor lifecycle
    // -----------------------------------------------------------------------

    /// Preload an actor's record (connect path). Bounded by the configured
    /// load timeout; a placeholder is used past it.
    pub async fn load_actor(&self, actor: ActorId) {
        self.persistence.load(actor).await;
    }

    pub async fn load_actors(&self, actors: &HashSet<ActorId>) -> usize {
        self.persistence.load_batch(actors).await
    }

    /// Save-if-dirty then drop the actor from the cache (disconnect path).
    pub async fn evict_actor(&self, actor: ActorId) -> Result<()> {
        self.persistence.evict(actor).await
    }

    pub async fn save_actor(&self, actor: ActorId) -> Result<()> {
        self.persistence.save(actor).await
    }

    // -----------------------------------------------------------------------
    // Admin control surface
    // -----------------------------------------------------------------------

    pub fn store(&self) -> &Arc<ProgressionStore> {
        &self.store
    }

    pub fn join_job(&self, actor: ActorId, job: &JobId) -> Result<bool> {
        self.store.join_job(actor, job)
    }

    pub fn leave_job(&self, actor: ActorId, job: &JobId) -> Result<bool> {
        self.store.leave_job(actor, job)
    }

    pub fn give_xp(&self, actor: ActorId, job: &JobId, amount: f64) -> Result<Option<LevelChange>> {
        self.store.add_xp(actor, job, amount)
    }

    pub fn take_xp(&self, actor: ActorId, job: &JobId, amount: f64) -> Result<f64> {
        self.store.take_xp(actor, job, amount)
    }

    pub fn set_xp(&self, actor: ActorId, job: &JobId, amount: f64) -> Result<Option<LevelChange>> {
        self.store.set_xp(actor, job, amount)
    }

    pub fn set_level(&self, actor: ActorId, job: &JobId, level: u32) -> Result<()> {
        self.store.set_level(actor, job, level)
    }

    /// Restore rate limits; `None` selectors are wildcards fanning out over
    /// all tracked entries. Returns the number of entries reset.
    pub fn restore_limits(
        &self,
        actor: Option<ActorId>,
        job: Option<&JobId>,
        target: Option<&str>,
    ) -> usize {
        self.limiter.restore(actor, job, target)
    }

    pub fn limit_status(&self, actor: ActorId, job: &JobId, target: &str) -> Option<LimitStatus> {
        self.limiter.status(actor, job, target)
    }

    /// Wholesale job reload: the old job set and its limiter patterns are
    /// discarded; tracked limit state survives so budgets are not refreshed
    /// for free.
    pub fn reload(&self, jobs: Vec<JobConfig>) {
        self.store.reload(jobs);
        self.limiter.configure(&self.store.job_index().all_configs());
        info!(
            "job reload complete: {} active jobs",
            self.store.job_index().active_jobs().len()
        );
    }

    /// Flush every dirty cached record. Returns the number written.
    pub async fn save_all(&self) -> Result<usize> {
        self.persistence.save_all_dirty().await
    }

    /// Structured key/value metrics for the admin surface.
    pub fn metrics(&self) -> BTreeMap<String, String> {
        let mut map = self.persistence.metrics().as_map();
        map.insert(
            "cache_entries".into(),
            self.persistence.cache().len().to_string(),
        );
        map.insert(
            "limiter_entries".into(),
            self.limiter.tracked_entries().to_string(),
        );
        let index = self.store.job_index();
        map.insert("jobs_active".into(), index.active_jobs().len().to_string());
        map.insert(
            "jobs_disabled".into(),
            index.disabled_jobs().len().to_string(),
        );
        map
    }

    pub fn metrics_json(&self) -> String {
        serde_json::to_string(&self.persistence.metrics()).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn health(&self) -> Result<()> {
        self.persistence.health().await
    }

    /// Stop background tasks and drain pending writes, bounded by the
    /// configured grace period. Returns the number of records flushed.
    pub async fn shutdown(&self) -> Result<usize> {
        self.stop.send_replace(true);
        let flushed = self.persistence.shutdown().await?;
        info!("jobforge shut down, {} records flushed", flushed);
        Ok(flushed)
    }
}
