//! Action routing integration tests
//!
//! End-to-end event processing against mock providers: rule matching,
//! multiplier chains, cancellation and fault isolation.

use jobforge::{
    ActionCategory, ActionRule, ActorId, ContextValue, EconomyProvider, EventContext, JobConfig,
    JobId, JobsError, JobsService, LimitPolicy, PermissionProvider, PermissionTier,
    ProgressionCurve, ProviderRegistry, RequirementEvaluator, RequirementOutcome, ServiceConfig,
    TargetPattern,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingEconomy {
    deposits: Mutex<Vec<(ActorId, f64)>>,
}

impl EconomyProvider for RecordingEconomy {
    fn deposit(&self, actor: ActorId, amount: f64) -> jobforge::Result<()> {
        self.deposits.lock().unwrap().push((actor, amount));
        Ok(())
    }
}

struct FailingEconomy;

impl EconomyProvider for FailingEconomy {
    fn deposit(&self, _actor: ActorId, _amount: f64) -> jobforge::Result<()> {
        Err(JobsError::BackendError("economy offline".into()))
    }
}

struct NodeSet(Vec<String>);

impl PermissionProvider for NodeSet {
    fn has_permission(&self, _actor: ActorId, node: &str) -> bool {
        self.0.iter().any(|n| n == node)
    }
}

struct CancelOn(&'static str);

impl RequirementEvaluator for CancelOn {
    fn evaluate(
        &self,
        _actor: ActorId,
        descriptor: &str,
        _ctx: &EventContext,
    ) -> jobforge::Result<RequirementOutcome> {
        Ok(RequirementOutcome {
            cancel: descriptor == self.0,
            side_effects: vec![],
        })
    }
}

fn miner_job() -> JobConfig {
    JobConfig::new("miner", "Miner", 50)
        .with_curve(ProgressionCurve::Linear { per_level: 100.0 })
        .with_rules(
            ActionCategory::Break,
            vec![
                ActionRule::new(TargetPattern::parse("ORE_*")).with_rewards(10.0, 2.0),
                ActionRule::new(TargetPattern::parse("STONE")).with_rewards(1.0, 0.0),
            ],
        )
}

fn service_with(
    jobs: Vec<JobConfig>,
    providers: ProviderRegistry,
) -> (Arc<JobsService>, TempDir) {
    let dir = TempDir::new().unwrap();
    let service = JobsService::start(ServiceConfig::new(dir.path()), jobs, providers).unwrap();
    (service, dir)
}

#[tokio::test]
async fn matched_rule_grants_xp_and_income() {
    let economy = Arc::new(RecordingEconomy::default());
    let providers = ProviderRegistry::new().with_economy(economy.clone());
    let (service, _dir) = service_with(vec![miner_job()], providers);

    let actor = ActorId::new();
    let job = JobId::new("miner");
    service.join_job(actor, &job).unwrap();

    let cancel = service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert!(!cancel);
    assert_eq!(service.store().get_xp(actor, &job), 10.0);
    assert_eq!(economy.deposits.lock().unwrap().as_slice(), &[(actor, 2.0)]);
}

#[tokio::test]
async fn unmatched_event_is_a_noop() {
    let (service, _dir) = service_with(vec![miner_job()], ProviderRegistry::new());
    let actor = ActorId::new();
    service.join_job(actor, &JobId::new("miner")).unwrap();

    let cancel = service.notify(actor, ActionCategory::Break, "DIRT", HashMap::new());
    assert!(!cancel);
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 0.0);

    // Right target, wrong category.
    service.notify(actor, ActionCategory::Place, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 0.0);
}

#[tokio::test]
async fn non_member_earns_nothing() {
    let (service, _dir) = service_with(vec![miner_job()], ProviderRegistry::new());
    let actor = ActorId::new();

    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 0.0);
}

#[tokio::test]
async fn context_count_multiplier_scales_rewards() {
    let (service, _dir) = service_with(vec![miner_job()], ProviderRegistry::new());
    let actor = ActorId::new();
    let job = JobId::new("miner");
    service.join_job(actor, &job).unwrap();

    let mut attrs = HashMap::new();
    attrs.insert("count_multiplier".to_string(), ContextValue::Number(4.0));
    service.notify(actor, ActionCategory::Break, "ORE_GOLD", attrs);
    assert_eq!(service.store().get_xp(actor, &job), 40.0);
}

#[tokio::test]
async fn cancellation_combines_across_rules() {
    let mut job = miner_job();
    let mut rule = ActionRule::new(TargetPattern::parse("ORE_*")).with_rewards(5.0, 0.0);
    rule.requirement = Some("deny".to_string());
    job.rules.get_mut(&ActionCategory::Break).unwrap().push(rule);

    let providers = ProviderRegistry::new().with_requirements(Arc::new(CancelOn("deny")));
    let (service, _dir) = service_with(vec![job], providers);
    let actor = ActorId::new();
    service.join_job(actor, &JobId::new("miner")).unwrap();

    let cancel = service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert!(cancel);
    // Both the unconstrained rule and the cancelling rule still paid out.
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 15.0);
}

#[tokio::test]
async fn permission_tier_boosts_and_elevated_exclusion() {
    let mut job = miner_job();
    job.permission_tiers = vec![
        PermissionTier {
            node_suffix: "vip".into(),
            multiplier: 1.5,
        },
        PermissionTier {
            node_suffix: "mvp".into(),
            multiplier: 2.0,
        },
    ];

    // Actor holds both tier nodes: highest wins.
    let providers = ProviderRegistry::new().with_permissions(Arc::new(NodeSet(vec![
        "jobforge.boost.vip".into(),
        "jobforge.boost.mvp".into(),
    ])));
    let (service, _dir) = service_with(vec![job.clone()], providers);
    let actor = ActorId::new();
    service.join_job(actor, &JobId::new("miner")).unwrap();
    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 20.0);

    // Elevated grant: excluded from boosting entirely.
    let providers = ProviderRegistry::new().with_permissions(Arc::new(NodeSet(vec![
        "jobforge.boost.mvp".into(),
        "jobforge.*".into(),
    ])));
    let (service, _dir) = service_with(vec![job], providers);
    let actor = ActorId::new();
    service.join_job(actor, &JobId::new("miner")).unwrap();
    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 10.0);
}

#[tokio::test]
async fn economy_failure_is_isolated_from_xp() {
    let providers = ProviderRegistry::new().with_economy(Arc::new(FailingEconomy));
    let (service, _dir) = service_with(vec![miner_job()], providers);
    let actor = ActorId::new();
    let job = JobId::new("miner");
    service.join_job(actor, &job).unwrap();

    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    // Currency was lost to the failing provider; XP still landed.
    assert_eq!(service.store().get_xp(actor, &job), 10.0);
}

#[tokio::test]
async fn xp_stops_at_max_level_but_income_continues() {
    let economy = Arc::new(RecordingEconomy::default());
    let mut job = miner_job();
    job.max_level = 2;
    let providers = ProviderRegistry::new().with_economy(economy.clone());
    let (service, _dir) = service_with(vec![job], providers);

    let actor = ActorId::new();
    let job = JobId::new("miner");
    service.join_job(actor, &job).unwrap();
    service.set_xp(actor, &job, 100.0).unwrap();
    assert_eq!(service.store().get_level(actor, &job), 2);

    let xp_before = service.store().get_xp(actor, &job);
    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &job), xp_before);
    assert_eq!(economy.deposits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn subtype_constraint_gates_interaction_rules() {
    let mut rule = ActionRule::new(TargetPattern::parse("SHEEP")).with_rewards(3.0, 0.0);
    rule.subtype = Some("SHEARS".to_string());
    let job = JobConfig::new("shepherd", "Shepherd", 20)
        .with_curve(ProgressionCurve::Linear { per_level: 50.0 })
        .with_rules(ActionCategory::Shear, vec![rule]);

    let (service, _dir) = service_with(vec![job], ProviderRegistry::new());
    let actor = ActorId::new();
    let job = JobId::new("shepherd");
    service.join_job(actor, &job).unwrap();

    // Wrong subtype: no reward.
    let mut attrs = HashMap::new();
    attrs.insert("subtype".to_string(), ContextValue::from("SWORD"));
    service.notify(actor, ActionCategory::Shear, "SHEEP", attrs);
    assert_eq!(service.store().get_xp(actor, &job), 0.0);

    // Matching subtype.
    let mut attrs = HashMap::new();
    attrs.insert("subtype".to_string(), ContextValue::from("shears"));
    service.notify(actor, ActionCategory::Shear, "SHEEP", attrs);
    assert_eq!(service.store().get_xp(actor, &job), 3.0);
}

#[tokio::test]
async fn profession_list_gates_trade_rules() {
    let mut rule = ActionRule::new(TargetPattern::parse("*")).with_rewards(6.0, 0.0);
    rule.professions = Some(vec!["FARMER".to_string(), "LIBRARIAN".to_string()]);
    let job = JobConfig::new("merchant", "Merchant", 20)
        .with_curve(ProgressionCurve::Linear { per_level: 50.0 })
        .with_rules(ActionCategory::Trade, vec![rule]);

    let (service, _dir) = service_with(vec![job], ProviderRegistry::new());
    let actor = ActorId::new();
    let job = JobId::new("merchant");
    service.join_job(actor, &job).unwrap();

    let mut attrs = HashMap::new();
    attrs.insert("profession".to_string(), ContextValue::from("farmer"));
    service.notify(actor, ActionCategory::Trade, "EMERALD", attrs);
    assert_eq!(service.store().get_xp(actor, &job), 6.0);

    let mut attrs = HashMap::new();
    attrs.insert("profession".to_string(), ContextValue::from("CLERIC"));
    service.notify(actor, ActionCategory::Trade, "EMERALD", attrs);
    assert_eq!(service.store().get_xp(actor, &job), 6.0);
}

#[tokio::test]
async fn rate_limited_rule_suppresses_after_budget() {
    let mut job = miner_job();
    job.rules.insert(
        ActionCategory::Break,
        vec![
            ActionRule::new(TargetPattern::parse("ORE_*"))
                .with_rewards(10.0, 0.0)
                .with_limit(LimitPolicy {
                    max_uses: 3,
                    cooldown: Duration::from_secs(60),
                    block_xp: true,
                    block_income: true,
                }),
        ],
    );
    let (service, _dir) = service_with(vec![job], ProviderRegistry::new());
    let actor = ActorId::new();
    let job = JobId::new("miner");
    service.join_job(actor, &job).unwrap();

    for _ in 0..5 {
        service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    }
    assert_eq!(service.store().get_xp(actor, &job), 30.0);

    let status = service.limit_status(actor, &job, "ORE_IRON").unwrap();
    assert!(status.on_cooldown);

    // Manual restore resumes rewards.
    assert!(service.restore_limits(Some(actor), Some(&job), None) >= 1);
    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &job), 40.0);
}

#[tokio::test]
async fn multiple_jobs_reward_independently() {
    let digger = JobConfig::new("digger", "Digger", 50)
        .with_curve(ProgressionCurve::Linear { per_level: 100.0 })
        .with_rules(
            ActionCategory::Break,
            vec![ActionRule::new(TargetPattern::parse("*")).with_rewards(2.0, 0.0)],
        );
    let (service, _dir) = service_with(vec![miner_job(), digger], ProviderRegistry::new());

    let actor = ActorId::new();
    service.join_job(actor, &JobId::new("miner")).unwrap();
    service.join_job(actor, &JobId::new("digger")).unwrap();

    service.notify(actor, ActionCategory::Break, "ORE_IRON", HashMap::new());
    assert_eq!(service.store().get_xp(actor, &JobId::new("miner")), 10.0);
    assert_eq!(service.store().get_xp(actor, &JobId::new("digger")), 2.0);
}
