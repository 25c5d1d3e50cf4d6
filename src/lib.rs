// ============================================================================
// jobforge — action-to-reward progression engine
// ============================================================================
//
// Grants actors experience and currency for tracked actions, subject to
// per-action rate limits, multipliers and level progression, and persists
// that progression durably under high write pressure.
//
// The high-level entry point is [`JobsService`]:
//
// ```no_run
// use jobforge::{JobsService, JobConfig, ServiceConfig, ProviderRegistry};
// use jobforge::{ActorId, ActionCategory};
// use std::collections::HashMap;
//
// # #[tokio::main]
// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
// let jobs = vec![JobConfig::new("miner", "Miner", 50)];
// let service = JobsService::start(
//     ServiceConfig::new("./data"),
//     jobs,
//     ProviderRegistry::new(),
// )?;
//
// let actor = ActorId::new();
// service.join_job(actor, &"miner".into())?;
// service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
// service.shutdown().await?;
// # Ok(())
// # }
// ```

pub mod config;
pub mod core;
pub mod limiter;
pub mod persist;
pub mod providers;
pub mod router;
pub mod store;

mod service;

// Re-export main types for convenience
pub use config::{
    ActionRule, JobConfig, LimitPolicy, PermissionTier, ProgressionCurve, RestoreScheduleConfig,
    ServiceConfig, TargetPattern,
};
pub use core::{ActionCategory, ActorId, ContextValue, EventContext, JobId, JobsError, Result};
pub use limiter::{LimitStatus, RateLimiter};
pub use persist::{MetricsSnapshot, PersistenceService, RecordCodec, StorageBackend};
pub use providers::{
    BonusProvider, EconomyProvider, LevelUpListener, PermissionProvider, ProviderRegistry,
    RequirementEvaluator, RequirementOutcome, SideEffectSink,
};
pub use router::{ActionRouter, RouterPolicy};
pub use service::JobsService;
pub use store::{LevelChange, ProgressionRecord, ProgressionStore};
