//! The authoritative in-memory progression state.
//!
//! All record access goes through the persistence layer's shared cache; the
//! store adds job membership rules, XP validation and level computation on
//! top. Mutations on one actor are linearized by that actor's cache entry
//! lock; different actors proceed independently.

pub mod jobs;
pub mod record;

pub use jobs::{JobEntry, JobIndex};
pub use record::{MAX_SAFE_XP, ProgressionRecord};

use crate::config::JobConfig;
use crate::core::{ActorId, JobId, JobsError, Result};
use crate::persist::PersistenceService;
use std::sync::{Arc, RwLock};

/// A level transition reported by an XP mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub old: u32,
    pub new: u32,
}

pub struct ProgressionStore {
    persistence: Arc<PersistenceService>,
    jobs: RwLock<Arc<JobIndex>>,
}

impl ProgressionStore {
    pub fn new(persistence: Arc<PersistenceService>, configs: Vec<JobConfig>) -> Self {
        Self {
            persistence,
            jobs: RwLock::new(Arc::new(JobIndex::build(configs))),
        }
    }

    /// Swap in a freshly built job index (admin reload). The old instance is
    /// discarded wholesale.
    pub fn reload(&self, configs: Vec<JobConfig>) {
        let index = Arc::new(JobIndex::build(configs));
        *self.jobs.write().unwrap_or_else(|e| e.into_inner()) = index;
    }

    pub fn job_index(&self) -> Arc<JobIndex> {
        Arc::clone(&self.jobs.read().unwrap_or_else(|e| e.into_inner()))
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Idempotent join. First-ever join initializes XP/level; returns false
    /// when the actor already holds the job.
    pub fn join_job(&self, actor: ActorId, job: &JobId) -> Result<bool> {
        let index = self.job_index();
        index.require_enabled(job)?;

        let entry = self.persistence.ensure_cached(actor);
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        let joined = guard.record.join(job.clone());
        if joined {
            guard.dirty = true;
        }
        Ok(joined)
    }

    /// Remove membership but retain XP/level history.
    pub fn leave_job(&self, actor: ActorId, job: &JobId) -> Result<bool> {
        let index = self.job_index();
        if index.get(job).is_none() {
            return Err(JobsError::JobNotFound(job.to_string()));
        }

        let entry = self.persistence.ensure_cached(actor);
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        let left = guard.record.leave(job);
        if left {
            guard.dirty = true;
        }
        Ok(left)
    }

    pub fn joined_jobs(&self, actor: ActorId) -> Vec<JobId> {
        let entry = self.persistence.ensure_cached(actor);
        let guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.record.joined_jobs().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // XP and levels
    // -----------------------------------------------------------------------

    /// Add XP and recompute the level. NaN, infinite and negative amounts are
    /// rejected silently with no state change, per the validation contract.
    /// Returns the level transition when the recomputed level increased.
    pub fn add_xp(&self, actor: ActorId, job: &JobId, amount: f64) -> Result<Option<LevelChange>> {
        let index = self.job_index();
        let job_entry = index.require_enabled(job)?;
        let curve = &job_entry.config.curve;
        let max_level = job_entry.config.max_level;

        let entry = self.persistence.ensure_cached(actor);
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());

        let Some(total) = guard.record.add_xp(job.clone(), amount) else {
            return Ok(None);
        };
        guard.dirty = true;

        let old_level = guard.record.level(job);
        let new_level = curve.level_for_xp(total, max_level);
        if new_level > old_level {
            guard.record.set_level(job.clone(), new_level);
            return Ok(Some(LevelChange {
                old: old_level,
                new: new_level,
            }));
        }
        Ok(None)
    }

    /// Admin set: overwrite XP and recompute the level. The level only moves
    /// upward; setting XP to the current value is a no-op for level-up
    /// reporting.
    pub fn set_xp(&self, actor: ActorId, job: &JobId, amount: f64) -> Result<Option<LevelChange>> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(JobsError::InvalidInput(format!(
                "XP must be a finite non-negative number, got {}",
                amount
            )));
        }
        let index = self.job_index();
        let job_entry = index.require_enabled(job)?;
        let curve = &job_entry.config.curve;
        let max_level = job_entry.config.max_level;

        let entry = self.persistence.ensure_cached(actor);
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.record.set_xp(job.clone(), amount);
        guard.dirty = true;

        let old_level = guard.record.level(job);
        let new_level = curve.level_for_xp(amount, max_level);
        if new_level > old_level {
            guard.record.set_level(job.clone(), new_level);
            return Ok(Some(LevelChange {
                old: old_level,
                new: new_level,
            }));
        }
        Ok(None)
    }

    /// Admin take: subtract XP, flooring at zero. Returns the new total.
    /// The cached level is left as-is (levels never regress automatically).
    pub fn take_xp(&self, actor: ActorId, job: &JobId, amount: f64) -> Result<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(JobsError::InvalidInput(format!(
                "XP must be a finite non-negative number, got {}",
                amount
            )));
        }
        let index = self.job_index();
        index.require_enabled(job)?;

        let entry = self.persistence.ensure_cached(actor);
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        let total = (guard.record.xp(job) - amount).max(0.0);
        guard.record.set_xp(job.clone(), total);
        guard.dirty = true;
        Ok(total)
    }

    pub fn set_level(&self, actor: ActorId, job: &JobId, level: u32) -> Result<()> {
        let index = self.job_index();
        let job_entry = index.require_enabled(job)?;
        if level == 0 || level > job_entry.config.max_level {
            return Err(JobsError::InvalidInput(format!(
                "level must be in 1..={}, got {}",
                job_entry.config.max_level, level
            )));
        }

        let entry = self.persistence.ensure_cached(actor);
        let mut guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.record.set_level(job.clone(), level);
        guard.dirty = true;
        Ok(())
    }

    pub fn get_xp(&self, actor: ActorId, job: &JobId) -> f64 {
        let entry = self.persistence.ensure_cached(actor);
        let guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.record.xp(job)
    }

    pub fn get_level(&self, actor: ActorId, job: &JobId) -> u32 {
        let entry = self.persistence.ensure_cached(actor);
        let guard = entry.lock().unwrap_or_else(|e| e.into_inner());
        guard.record.level(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProgressionCurve, ServiceConfig};
    use tempfile::TempDir;

    fn store_with(configs: Vec<JobConfig>) -> (ProgressionStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let persistence =
            Arc::new(PersistenceService::new(&ServiceConfig::new(dir.path())).unwrap());
        (ProgressionStore::new(persistence, configs), dir)
    }

    fn miner() -> JobConfig {
        JobConfig::new("miner", "Miner", 50)
            .with_curve(ProgressionCurve::Linear { per_level: 100.0 })
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let (store, _dir) = store_with(vec![miner()]);
        let actor = ActorId::new();
        let job = JobId::new("miner");

        assert!(store.join_job(actor, &job).unwrap());
        assert!(!store.join_job(actor, &job).unwrap());
        assert_eq!(store.get_xp(actor, &job), 0.0);
    }

    #[tokio::test]
    async fn xp_is_monotonic_under_valid_adds() {
        let (store, _dir) = store_with(vec![miner()]);
        let actor = ActorId::new();
        let job = JobId::new("miner");
        store.join_job(actor, &job).unwrap();

        let mut last = 0.0;
        for amount in [5.0, 0.0, 12.5, f64::NAN, -3.0, 7.0] {
            store.add_xp(actor, &job, amount).unwrap();
            let now = store.get_xp(actor, &job);
            assert!(now >= last);
            assert!(now.is_finite());
            last = now;
        }
        assert_eq!(last, 24.5);
    }

    #[tokio::test]
    async fn level_up_fires_exactly_once_at_boundary() {
        let (store, _dir) = store_with(vec![miner()]);
        let actor = ActorId::new();
        let job = JobId::new("miner");
        store.join_job(actor, &job).unwrap();

        store.add_xp(actor, &job, 99.0).unwrap();
        assert_eq!(store.get_level(actor, &job), 1);

        let change = store.add_xp(actor, &job, 1.0).unwrap().unwrap();
        assert_eq!((change.old, change.new), (1, 2));

        // A no-op set to the same value must not report another level-up.
        assert!(store.set_xp(actor, &job, 100.0).unwrap().is_none());
        assert_eq!(store.get_level(actor, &job), 2);
    }

    #[tokio::test]
    async fn disabled_job_is_unjoinable() {
        let cursed = JobConfig::new("cursed", "Cursed", 10).with_curve(
            ProgressionCurve::Formula {
                base: f64::NAN,
                multiplier: 1.0,
                exponent: 2.0,
            },
        );
        let (store, _dir) = store_with(vec![miner(), cursed]);
        let actor = ActorId::new();

        assert!(matches!(
            store.join_job(actor, &JobId::new("cursed")),
            Err(JobsError::JobDisabled(_, _))
        ));
        assert_eq!(store.job_index().active_jobs(), vec![JobId::new("miner")]);
    }

    #[tokio::test]
    async fn take_xp_floors_at_zero_and_keeps_level() {
        let (store, _dir) = store_with(vec![miner()]);
        let actor = ActorId::new();
        let job = JobId::new("miner");
        store.join_job(actor, &job).unwrap();
        store.add_xp(actor, &job, 150.0).unwrap();
        assert_eq!(store.get_level(actor, &job), 2);

        assert_eq!(store.take_xp(actor, &job, 500.0).unwrap(), 0.0);
        assert_eq!(store.get_level(actor, &job), 2);
    }

    #[tokio::test]
    async fn admin_validation_is_explicit() {
        let (store, _dir) = store_with(vec![miner()]);
        let actor = ActorId::new();
        let job = JobId::new("miner");

        assert!(matches!(
            store.set_xp(actor, &job, f64::NAN),
            Err(JobsError::InvalidInput(_))
        ));
        assert!(matches!(
            store.set_level(actor, &job, 0),
            Err(JobsError::InvalidInput(_))
        ));
        assert!(matches!(
            store.set_level(actor, &job, 51),
            Err(JobsError::InvalidInput(_))
        ));
        assert!(matches!(
            store.add_xp(actor, &JobId::new("ghost"), 1.0),
            Err(JobsError::JobNotFound(_))
        ));
    }
}
