//! Action-to-reward routing.
//!
//! The router runs synchronously on the event thread, once per qualifying
//! game event: it walks the actor's joined jobs, matches configured rules,
//! consults the rate limiter, applies the multiplier chain and commits
//! rewards. Every rule is independently fault-isolated — a provider or
//! persistence error never aborts the remaining rules or jobs.

use crate::config::{ActionRule, JobConfig};
use crate::core::{ActionCategory, ActorId, EventContext, JobId, context_keys};
use crate::limiter::RateLimiter;
use crate::providers::ProviderRegistry;
use crate::store::{JobEntry, ProgressionStore};
use log::{debug, warn};
use std::sync::Arc;

pub struct RouterPolicy {
    /// Prefix for permission-tier nodes (`<prefix>.<suffix>`).
    pub tier_node_prefix: String,
    /// Actors holding this node are excluded from tier boosts, closing the
    /// wildcard-grant stacking exploit.
    pub elevated_node: String,
    pub exclude_elevated: bool,
}

pub struct ActionRouter {
    store: Arc<ProgressionStore>,
    limiter: Arc<RateLimiter>,
    providers: ProviderRegistry,
    policy: RouterPolicy,
}

impl ActionRouter {
    pub fn new(
        store: Arc<ProgressionStore>,
        limiter: Arc<RateLimiter>,
        providers: ProviderRegistry,
        policy: RouterPolicy,
    ) -> Self {
        Self {
            store,
            limiter,
            providers,
            policy,
        }
    }

    /// Process one game event. Returns true when any matched rule's
    /// requirement asked for cancellation of the originating event.
    pub fn process(&self, actor: ActorId, category: ActionCategory, ctx: &EventContext) -> bool {
        let index = self.store.job_index();
        let mut cancel = false;

        for job in self.store.joined_jobs(actor) {
            let Some(entry) = index.get(&job) else {
                continue;
            };
            if !entry.is_enabled() {
                continue;
            }
            for rule in entry.config.rules_for(category) {
                if !rule_matches(rule, category, ctx) {
                    continue;
                }
                cancel |= self.apply_rule(actor, &job, entry, rule, ctx);
            }
        }
        cancel
    }

    /// Apply one matched rule. Returns the rule's cancellation request.
    fn apply_rule(
        &self,
        actor: ActorId,
        job: &JobId,
        entry: &JobEntry,
        rule: &ActionRule,
        ctx: &EventContext,
    ) -> bool {
        let mut cancel = false;

        if let Some(descriptor) = &rule.requirement {
            match self.providers.requirements.evaluate(actor, descriptor, ctx) {
                Ok(outcome) => {
                    cancel = outcome.cancel;
                    for effect in &outcome.side_effects {
                        self.providers.side_effects.dispatch(actor, effect);
                    }
                }
                Err(e) => {
                    // Fault-isolated: the rule proceeds as if unconstrained.
                    warn!("requirement evaluation failed for {}: {}", actor, e);
                }
            }
        }

        let count = ctx.count_multiplier();
        let mut xp = rule.base_xp * count;
        let mut income = rule.base_income * count;

        if rule.limit.is_some() && (xp > 0.0 || income > 0.0) {
            let limit_target = limit_target_for(rule, ctx);
            (xp, income) = self
                .limiter
                .check_and_consume(actor, job, &limit_target, xp, income);
        }

        if xp > 0.0 && self.store.get_level(actor, job) < entry.config.max_level {
            let boosted = xp
                * self.tier_multiplier(actor, &entry.config)
                * self.providers.bonus.xp_multiplier(actor, job);
            match self.store.add_xp(actor, job, boosted) {
                Ok(Some(change)) => {
                    debug!(
                        "{} leveled {} {} -> {}",
                        actor, job, change.old, change.new
                    );
                    self.providers
                        .level_up
                        .on_level_up(actor, job, change.old, change.new);
                }
                Ok(None) => {}
                Err(e) => warn!("xp commit failed for {} in {}: {}", actor, job, e),
            }
        }

        if income > 0.0 {
            let boosted = income
                * self.tier_multiplier(actor, &entry.config)
                * self.providers.bonus.income_multiplier(actor, job);
            if self.providers.has_economy()
                && let Err(e) = self.providers.economy.deposit(actor, boosted)
            {
                // Only the currency component of this rule is lost.
                warn!("economy credit failed for {}: {}", actor, e);
            }
        }

        if let Some(effect) = &rule.side_effect {
            // Configured side effects fire regardless of reward outcome.
            self.providers.side_effects.dispatch(actor, effect);
        }

        cancel
    }

    /// Highest matching permission-tier multiplier for this job, with the
    /// elevated-grant exclusion applied. Policy, not contract: see the tier
    /// table on the job config.
    fn tier_multiplier(&self, actor: ActorId, job: &JobConfig) -> f64 {
        if job.permission_tiers.is_empty() {
            return 1.0;
        }
        if self.policy.exclude_elevated
            && self
                .providers
                .permissions
                .has_permission(actor, &self.policy.elevated_node)
        {
            return 1.0;
        }
        job.permission_tiers
            .iter()
            .filter(|tier| {
                let node = format!("{}.{}", self.policy.tier_node_prefix, tier.node_suffix);
                self.providers.permissions.has_permission(actor, &node)
            })
            .map(|tier| tier.multiplier)
            .fold(1.0, f64::max)
    }
}

/// Whether a rule matches the event: target pattern plus the optional
/// subtype/profession constraints. An absent constraint matches everything.
fn rule_matches(rule: &ActionRule, category: ActionCategory, ctx: &EventContext) -> bool {
    if !rule.target.matches(ctx) {
        return false;
    }
    if category.uses_interaction_subtype()
        && let Some(required) = &rule.subtype
    {
        let Some(subtype) = ctx.attr_str(context_keys::SUBTYPE) else {
            return false;
        };
        if !subtype.eq_ignore_ascii_case(required) {
            return false;
        }
    }
    if category.uses_profession()
        && let Some(professions) = &rule.professions
    {
        let Some(profession) = ctx.attr_str(context_keys::PROFESSION) else {
            return false;
        };
        if !professions.iter().any(|p| p.eq_ignore_ascii_case(profession)) {
            return false;
        }
    }
    true
}

/// Rate-limit bucket target: structured patterns have no meaningful target
/// string, so their canonical key is used instead.
fn limit_target_for(rule: &ActionRule, ctx: &EventContext) -> String {
    use crate::config::TargetPattern;
    match &rule.target {
        TargetPattern::Structured(_) => rule.target.key(),
        _ => ctx.target.clone(),
    }
}
