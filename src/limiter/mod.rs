//! Per-actor, per-job, per-target rate limiting with scheduled resets.
//!
//! Limiter state is process-lifetime only; it is never persisted. Each
//! (actor, job, target-pattern) tuple moves between Available and
//! Cooling-down per its policy. Lookups memoize target -> pattern resolution
//! in an LRU cache owned by the limiter.

pub mod schedule;

pub use schedule::RestoreSchedule;

use crate::config::{JobConfig, LimitPolicy, RestoreScheduleConfig, TargetPattern};
use crate::core::{ActorId, JobId};
use chrono::{Local, NaiveTime, Timelike};
use log::warn;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

const RESOLUTION_CACHE_SIZE: usize = 512;
const STATE_SHARDS: usize = 16;

/// One configured, rate-limited pattern within a job.
#[derive(Debug, Clone)]
struct LimitedPattern {
    pattern: TargetPattern,
    key: String,
    policy: LimitPolicy,
}

/// Mutable counter for one (actor, job, pattern) tuple.
#[derive(Debug, Clone, Default)]
struct LimitState {
    used: u32,
    cooldown_until: Option<Instant>,
}

impl LimitState {
    fn on_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// Admin-facing view of one tuple's state.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitStatus {
    pub on_cooldown: bool,
    pub remaining_uses: u32,
    pub cooldown_remaining: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
    actor: ActorId,
    job: JobId,
    pattern: String,
}

pub struct RateLimiter {
    /// Per-job limited patterns, declaration order preserved.
    patterns: RwLock<HashMap<JobId, Vec<LimitedPattern>>>,
    /// Per-job restore schedules, re-parsed each tick so a config fix takes
    /// effect without a reload.
    schedules: RwLock<HashMap<JobId, RestoreScheduleConfig>>,
    /// Tuple states, sharded by actor.
    states: Vec<Mutex<HashMap<StateKey, LimitState>>>,
    /// Memoized (job, TARGET) -> pattern index resolutions.
    resolutions: Mutex<LruCache<(JobId, String), Option<usize>>>,
    /// Last minute-of-day each job's schedule fired, to avoid double firing
    /// within the same minute.
    last_fired: Mutex<HashMap<JobId, u32>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        let states = (0..STATE_SHARDS).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            patterns: RwLock::new(HashMap::new()),
            schedules: RwLock::new(HashMap::new()),
            states,
            resolutions: Mutex::new(LruCache::new(
                NonZeroUsize::new(RESOLUTION_CACHE_SIZE).unwrap(),
            )),
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Install the limited patterns and schedules for a job set. Called at
    /// startup and on admin reload; existing tuple state is kept so a reload
    /// does not grant everyone a fresh budget.
    pub fn configure(&self, jobs: &[JobConfig]) {
        let mut patterns = HashMap::new();
        let mut schedules = HashMap::new();
        for job in jobs {
            let mut limited = Vec::new();
            for rules in job.rules.values() {
                for rule in rules {
                    if let Some(policy) = &rule.limit {
                        limited.push(LimitedPattern {
                            pattern: rule.target.clone(),
                            key: rule.target.key(),
                            policy: policy.clone(),
                        });
                    }
                }
            }
            if !limited.is_empty() {
                patterns.insert(job.id.clone(), limited);
            }
            if let Some(schedule) = &job.restore_schedule {
                schedules.insert(job.id.clone(), schedule.clone());
            }
        }
        *self.patterns.write().unwrap_or_else(|e| e.into_inner()) = patterns;
        *self.schedules.write().unwrap_or_else(|e| e.into_inner()) = schedules;
        self.resolutions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn shard(&self, actor: ActorId) -> &Mutex<HashMap<StateKey, LimitState>> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        actor.hash(&mut hasher);
        &self.states[(hasher.finish() as usize) % STATE_SHARDS]
    }

    /// Resolve a target to the job's configured pattern: exact key first,
    /// then the first declared wildcard that matches, case-insensitively.
    fn resolve(&self, job: &JobId, target: &str) -> Option<(String, LimitPolicy)> {
        let upper = target.to_ascii_uppercase();
        let cache_key = (job.clone(), upper.clone());

        // Memoized index, taken without holding the pattern lock.
        let cached: Option<Option<usize>> = {
            let mut cache = self.resolutions.lock().unwrap_or_else(|e| e.into_inner());
            cache.get(&cache_key).copied()
        };

        let patterns = self.patterns.read().unwrap_or_else(|e| e.into_inner());
        let entries = patterns.get(job);

        let found = match cached {
            Some(idx) => idx,
            None => {
                let idx = entries.and_then(|entries| {
                    entries
                        .iter()
                        .position(|e| e.key == upper)
                        .or_else(|| entries.iter().position(|e| e.pattern.matches_target(target)))
                });
                let mut cache = self.resolutions.lock().unwrap_or_else(|e| e.into_inner());
                cache.put(cache_key, idx);
                idx
            }
        };

        let entry = entries?.get(found?)?;
        Some((entry.key.clone(), entry.policy.clone()))
    }

    /// The limiter state machine. Returns the (possibly reduced) reward
    /// amounts; `(0, 0)` while the tuple is cooling down.
    pub fn check_and_consume(
        &self,
        actor: ActorId,
        job: &JobId,
        target: &str,
        xp: f64,
        income: f64,
    ) -> (f64, f64) {
        let Some((pattern_key, policy)) = self.resolve(job, target) else {
            // No policy for this target: pass through, create no state.
            return (xp, income);
        };

        let key = StateKey {
            actor,
            job: job.clone(),
            pattern: pattern_key,
        };
        let now = Instant::now();
        let mut shard = self.shard(actor).lock().unwrap_or_else(|e| e.into_inner());
        let state = shard.entry(key).or_default();

        // The block flags choose which reward components a spent budget
        // suppresses; an unblocked component keeps flowing on cooldown.
        let suppressed = (
            if policy.block_xp { 0.0 } else { xp },
            if policy.block_income { 0.0 } else { income },
        );

        if state.on_cooldown(now) {
            return suppressed;
        }

        if state.used >= policy.max_uses {
            state.cooldown_until = Some(now + policy.cooldown);
            return suppressed;
        }

        state.used += 1;
        if state.used >= policy.max_uses {
            state.cooldown_until = Some(now + policy.cooldown);
        }
        (xp, income)
    }

    /// Manual restore: wildcard selectors (`None`) fan out over all tracked
    /// entries. Returns the number of tuples reset.
    pub fn restore(
        &self,
        actor: Option<ActorId>,
        job: Option<&JobId>,
        target: Option<&str>,
    ) -> usize {
        let target_key = target.map(|t| t.to_ascii_uppercase());
        let mut reset = 0;
        for shard in &self.states {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            shard.retain(|key, _| {
                let matches = actor.is_none_or(|a| key.actor == a)
                    && job.is_none_or(|j| &key.job == j)
                    && target_key
                        .as_deref()
                        .is_none_or(|t| key.pattern == t || pattern_covers(&key.pattern, t));
                if matches {
                    reset += 1;
                }
                !matches
            });
        }
        reset
    }

    /// Reset every actor's state for one job (scheduled restore).
    pub fn restore_job(&self, job: &JobId) -> usize {
        self.restore(None, Some(job), None)
    }

    /// Admin query for one tuple's current standing.
    pub fn status(&self, actor: ActorId, job: &JobId, target: &str) -> Option<LimitStatus> {
        let (pattern_key, policy) = self.resolve(job, target)?;
        let key = StateKey {
            actor,
            job: job.clone(),
            pattern: pattern_key,
        };
        let now = Instant::now();
        let shard = self.shard(actor).lock().unwrap_or_else(|e| e.into_inner());
        let state = shard.get(&key).cloned().unwrap_or_default();

        let on_cooldown = state.on_cooldown(now);
        Some(LimitStatus {
            on_cooldown,
            remaining_uses: policy.max_uses.saturating_sub(state.used),
            cooldown_remaining: if on_cooldown {
                state
                    .cooldown_until
                    .map(|until| until.duration_since(now))
                    .unwrap_or_default()
            } else {
                Duration::ZERO
            },
        })
    }

    /// Whether a policy exists for this job/target at all.
    pub fn has_policy(&self, job: &JobId, target: &str) -> bool {
        self.resolve(job, target).is_some()
    }

    /// Once-per-minute tick: fire every enabled schedule whose time of day
    /// matches the current hour/minute. A malformed schedule is logged and
    /// skipped without affecting other jobs, and retried next cycle.
    pub fn tick_schedules(&self) -> usize {
        self.tick_schedules_at(Local::now().time())
    }

    pub fn tick_schedules_at(&self, now: NaiveTime) -> usize {
        let minute_of_day = now.hour() * 60 + now.minute();
        let schedules = self
            .schedules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut fired = 0;
        for (job, config) in schedules {
            if !config.enabled {
                continue;
            }
            let schedule = match RestoreSchedule::parse(&config.time_of_day) {
                Ok(s) => s,
                Err(e) => {
                    warn!("restore schedule for job '{}' skipped: {}", job, e);
                    continue;
                }
            };
            if !schedule.matches_minute(now) {
                // Outside the firing minute the dedupe entry is cleared, so
                // the same wall-clock minute fires again on later days.
                self.last_fired
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&job);
                continue;
            }
            {
                let mut last = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
                if last.get(&job) == Some(&minute_of_day) {
                    continue;
                }
                last.insert(job.clone(), minute_of_day);
            }
            let reset = self.restore_job(&job);
            log::info!(
                "scheduled restore for job '{}' reset {} limit entries",
                job,
                reset
            );
            fired += 1;
        }
        fired
    }

    /// Number of tracked tuples (diagnostics).
    pub fn tracked_entries(&self) -> usize {
        self.states
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a stored pattern key is covered by a textual selector (used by
/// manual restore with concrete targets against wildcard-keyed state).
fn pattern_covers(stored_key: &str, selector: &str) -> bool {
    TargetPattern::parse(stored_key).matches_target(selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionCategory;

    fn limited_job(max_uses: u32, cooldown_secs: u64) -> JobConfig {
        use crate::config::ActionRule;
        JobConfig::new("miner", "Miner", 50).with_rules(
            ActionCategory::Break,
            vec![
                ActionRule::new(TargetPattern::parse("ORE_*"))
                    .with_rewards(10.0, 5.0)
                    .with_limit(LimitPolicy {
                        max_uses,
                        cooldown: Duration::from_secs(cooldown_secs),
                        block_xp: true,
                        block_income: true,
                    }),
            ],
        )
    }

    #[test]
    fn exhaustion_enters_cooldown() {
        let limiter = RateLimiter::new();
        limiter.configure(&[limited_job(3, 60)]);
        let actor = ActorId::new();
        let job = JobId::new("miner");

        for _ in 0..3 {
            assert_eq!(
                limiter.check_and_consume(actor, &job, "ORE_IRON", 10.0, 5.0),
                (10.0, 5.0)
            );
        }
        // Fourth attempt within the period is suppressed.
        assert_eq!(
            limiter.check_and_consume(actor, &job, "ORE_IRON", 10.0, 5.0),
            (0.0, 0.0)
        );
        let status = limiter.status(actor, &job, "ORE_IRON").unwrap();
        assert!(status.on_cooldown);
        assert_eq!(status.remaining_uses, 0);
    }

    #[test]
    fn restore_resumes_consumption() {
        let limiter = RateLimiter::new();
        limiter.configure(&[limited_job(1, 3600)]);
        let actor = ActorId::new();
        let job = JobId::new("miner");

        limiter.check_and_consume(actor, &job, "ORE_GOLD", 10.0, 0.0);
        assert_eq!(
            limiter.check_and_consume(actor, &job, "ORE_GOLD", 10.0, 0.0),
            (0.0, 0.0)
        );

        assert_eq!(limiter.restore(Some(actor), Some(&job), None), 1);
        assert_eq!(
            limiter.check_and_consume(actor, &job, "ORE_GOLD", 10.0, 0.0),
            (10.0, 0.0)
        );
    }

    #[test]
    fn unconfigured_target_passes_through_without_state() {
        let limiter = RateLimiter::new();
        limiter.configure(&[limited_job(1, 60)]);
        let actor = ActorId::new();
        let job = JobId::new("miner");

        assert_eq!(
            limiter.check_and_consume(actor, &job, "STONE", 7.0, 3.0),
            (7.0, 3.0)
        );
        assert_eq!(limiter.tracked_entries(), 0);
    }

    #[test]
    fn wildcard_restore_fans_out() {
        let limiter = RateLimiter::new();
        limiter.configure(&[limited_job(1, 60)]);
        let job = JobId::new("miner");
        let a = ActorId::new();
        let b = ActorId::new();
        limiter.check_and_consume(a, &job, "ORE_IRON", 1.0, 0.0);
        limiter.check_and_consume(b, &job, "ORE_IRON", 1.0, 0.0);

        assert_eq!(limiter.restore(None, None, None), 2);
        assert_eq!(limiter.tracked_entries(), 0);
    }

    #[test]
    fn scheduled_restore_fires_once_per_minute() {
        let mut job = limited_job(1, 3600);
        job.restore_schedule = Some(RestoreScheduleConfig {
            enabled: true,
            time_of_day: "6:30".to_string(),
        });
        let limiter = RateLimiter::new();
        limiter.configure(&[job]);
        let actor = ActorId::new();
        let job_id = JobId::new("miner");
        limiter.check_and_consume(actor, &job_id, "ORE_IRON", 1.0, 0.0);

        let t = NaiveTime::from_hms_opt(6, 30, 10).unwrap();
        assert_eq!(limiter.tick_schedules_at(t), 1);
        assert_eq!(limiter.tracked_entries(), 0);

        // Same minute: no second firing.
        limiter.check_and_consume(actor, &job_id, "ORE_IRON", 1.0, 0.0);
        let t = NaiveTime::from_hms_opt(6, 30, 55).unwrap();
        assert_eq!(limiter.tick_schedules_at(t), 0);
        assert_eq!(limiter.tracked_entries(), 1);
    }

    #[test]
    fn scheduled_restore_fires_again_next_day() {
        let mut job = limited_job(1, 3600);
        job.restore_schedule = Some(RestoreScheduleConfig {
            enabled: true,
            time_of_day: "6:30".to_string(),
        });
        let limiter = RateLimiter::new();
        limiter.configure(&[job]);
        let actor = ActorId::new();
        let job_id = JobId::new("miner");

        limiter.check_and_consume(actor, &job_id, "ORE_IRON", 1.0, 0.0);
        let t = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(limiter.tick_schedules_at(t), 1);

        // The rest of the day passes without firing.
        assert_eq!(
            limiter.tick_schedules_at(NaiveTime::from_hms_opt(6, 31, 0).unwrap()),
            0
        );
        assert_eq!(
            limiter.tick_schedules_at(NaiveTime::from_hms_opt(23, 59, 0).unwrap()),
            0
        );

        // Same wall-clock minute the next day fires again.
        limiter.check_and_consume(actor, &job_id, "ORE_IRON", 1.0, 0.0);
        assert_eq!(limiter.tick_schedules_at(t), 1);
        assert_eq!(limiter.tracked_entries(), 0);
    }

    #[test]
    fn malformed_schedule_is_skipped_not_fatal() {
        let mut bad = limited_job(1, 60);
        bad.restore_schedule = Some(RestoreScheduleConfig {
            enabled: true,
            time_of_day: "sometime".to_string(),
        });
        let mut good = limited_job(1, 60);
        good.id = JobId::new("farmer");
        good.restore_schedule = Some(RestoreScheduleConfig {
            enabled: true,
            time_of_day: "9:00".to_string(),
        });
        let limiter = RateLimiter::new();
        limiter.configure(&[bad, good]);

        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(limiter.tick_schedules_at(t), 1);
    }
}
