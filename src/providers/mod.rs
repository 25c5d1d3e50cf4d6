//! External collaborator interfaces.
//!
//! Economy, permissions, requirement evaluation, bonus multipliers, level-up
//! notification and side-effect dispatch all live outside the core. Each is a
//! capability trait resolved once at startup into a [`ProviderRegistry`];
//! an absent provider is a normal case served by a no-op default, never a
//! runtime-detection fallback.

use crate::core::{ActorId, EventContext, JobId, JobsError, Result};
use std::sync::Arc;

/// Credits currency to an actor. Called synchronously from the router; errors
/// are caught and logged there, never propagated.
pub trait EconomyProvider: Send + Sync {
    fn deposit(&self, actor: ActorId, amount: f64) -> Result<()>;
}

/// Answers permission-node queries for an actor.
pub trait PermissionProvider: Send + Sync {
    fn has_permission(&self, actor: ActorId, node: &str) -> bool;
}

/// Outcome of evaluating a rule's requirement descriptor.
#[derive(Debug, Clone, Default)]
pub struct RequirementOutcome {
    /// The originating event should be cancelled.
    pub cancel: bool,
    /// Requirement-triggered side effects, dispatched via [`SideEffectSink`].
    pub side_effects: Vec<String>,
}

/// Evaluates opaque requirement descriptors attached to action rules.
pub trait RequirementEvaluator: Send + Sync {
    fn evaluate(
        &self,
        actor: ActorId,
        descriptor: &str,
        ctx: &EventContext,
    ) -> Result<RequirementOutcome>;
}

/// Supplies active bonus multipliers (events, boosts) per actor and job.
pub trait BonusProvider: Send + Sync {
    fn xp_multiplier(&self, actor: ActorId, job: &JobId) -> f64;
    fn income_multiplier(&self, actor: ActorId, job: &JobId) -> f64;
}

/// Receives level-up transitions for downstream presentation.
pub trait LevelUpListener: Send + Sync {
    fn on_level_up(&self, actor: ActorId, job: &JobId, old_level: u32, new_level: u32);
}

/// Dispatches opaque side-effect descriptors (messages, commands).
pub trait SideEffectSink: Send + Sync {
    fn dispatch(&self, actor: ActorId, descriptor: &str);
}

// ---------------------------------------------------------------------------
// No-op defaults
// ---------------------------------------------------------------------------

struct NoEconomy;

impl EconomyProvider for NoEconomy {
    fn deposit(&self, _actor: ActorId, _amount: f64) -> Result<()> {
        Err(JobsError::BackendError("no economy provider registered".into()))
    }
}

struct NoPermissions;

impl PermissionProvider for NoPermissions {
    fn has_permission(&self, _actor: ActorId, _node: &str) -> bool {
        false
    }
}

struct NoRequirements;

impl RequirementEvaluator for NoRequirements {
    fn evaluate(
        &self,
        _actor: ActorId,
        _descriptor: &str,
        _ctx: &EventContext,
    ) -> Result<RequirementOutcome> {
        Ok(RequirementOutcome::default())
    }
}

struct NoBonus;

impl BonusProvider for NoBonus {
    fn xp_multiplier(&self, _actor: ActorId, _job: &JobId) -> f64 {
        1.0
    }

    fn income_multiplier(&self, _actor: ActorId, _job: &JobId) -> f64 {
        1.0
    }
}

struct NoListener;

impl LevelUpListener for NoListener {
    fn on_level_up(&self, _actor: ActorId, _job: &JobId, _old: u32, _new: u32) {}
}

struct NoSink;

impl SideEffectSink for NoSink {
    fn dispatch(&self, _actor: ActorId, _descriptor: &str) {}
}

/// Registry of optional external providers, resolved once at startup.
#[derive(Clone)]
pub struct ProviderRegistry {
    pub economy: Arc<dyn EconomyProvider>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub requirements: Arc<dyn RequirementEvaluator>,
    pub bonus: Arc<dyn BonusProvider>,
    pub level_up: Arc<dyn LevelUpListener>,
    pub side_effects: Arc<dyn SideEffectSink>,
    has_economy: bool,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            economy: Arc::new(NoEconomy),
            permissions: Arc::new(NoPermissions),
            requirements: Arc::new(NoRequirements),
            bonus: Arc::new(NoBonus),
            level_up: Arc::new(NoListener),
            side_effects: Arc::new(NoSink),
            has_economy: false,
        }
    }

    pub fn with_economy(mut self, provider: Arc<dyn EconomyProvider>) -> Self {
        self.economy = provider;
        self.has_economy = true;
        self
    }

    pub fn with_permissions(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = provider;
        self
    }

    pub fn with_requirements(mut self, provider: Arc<dyn RequirementEvaluator>) -> Self {
        self.requirements = provider;
        self
    }

    pub fn with_bonus(mut self, provider: Arc<dyn BonusProvider>) -> Self {
        self.bonus = provider;
        self
    }

    pub fn with_level_up(mut self, listener: Arc<dyn LevelUpListener>) -> Self {
        self.level_up = listener;
        self
    }

    pub fn with_side_effects(mut self, sink: Arc<dyn SideEffectSink>) -> Self {
        self.side_effects = sink;
        self
    }

    /// Whether an economy provider was registered; without one, income
    /// rewards are skipped quietly instead of logged as errors.
    pub fn has_economy(&self) -> bool {
        self.has_economy
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
