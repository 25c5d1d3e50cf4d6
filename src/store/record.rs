//! The per-actor progression record.

use crate::core::{ActorId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Safety ceiling for stored XP; additions clamp here instead of overflowing
/// toward infinity.
pub const MAX_SAFE_XP: f64 = 1.0e15;

/// Mutable progression state for one actor: job membership plus per-job XP
/// and cached level. Leaving a job keeps its XP/level history so a re-join
/// resumes from prior standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub actor: ActorId,
    joined: BTreeSet<JobId>,
    xp: BTreeMap<JobId, f64>,
    levels: BTreeMap<JobId, u32>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressionRecord {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            joined: BTreeSet::new(),
            xp: BTreeMap::new(),
            levels: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_joined(&self, job: &JobId) -> bool {
        self.joined.contains(job)
    }

    pub fn joined_jobs(&self) -> impl Iterator<Item = &JobId> {
        self.joined.iter()
    }

    pub fn joined_count(&self) -> usize {
        self.joined.len()
    }

    pub fn xp(&self, job: &JobId) -> f64 {
        self.xp.get(job).copied().unwrap_or(0.0)
    }

    pub fn level(&self, job: &JobId) -> u32 {
        self.levels.get(job).copied().unwrap_or(1)
    }

    /// Record membership. The first-ever join initializes XP/level; re-joins
    /// leave history untouched. Returns false when already joined.
    pub fn join(&mut self, job: JobId) -> bool {
        if !self.joined.insert(job.clone()) {
            return false;
        }
        self.xp.entry(job.clone()).or_insert(0.0);
        self.levels.entry(job).or_insert(1);
        self.touch();
        true
    }

    /// Drop membership but retain XP/level history. Returns false when the
    /// job was not joined.
    pub fn leave(&mut self, job: &JobId) -> bool {
        let removed = self.joined.remove(job);
        if removed {
            self.touch();
        }
        removed
    }

    /// Set XP directly, rejecting non-finite or negative values. Returns
    /// whether the value was accepted.
    pub fn set_xp(&mut self, job: JobId, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        self.xp.insert(job, amount.min(MAX_SAFE_XP));
        self.touch();
        true
    }

    /// Add XP, rejecting NaN/infinite/negative amounts and clamping the
    /// total below the safety ceiling. Returns the new total, or `None` when
    /// the amount was rejected.
    pub fn add_xp(&mut self, job: JobId, amount: f64) -> Option<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let total = (self.xp(&job) + amount).min(MAX_SAFE_XP);
        self.xp.insert(job, total);
        self.touch();
        Some(total)
    }

    pub fn set_level(&mut self, job: JobId, level: u32) {
        self.levels.insert(job, level.max(1));
        self.touch();
    }

    /// Merge a freshly loaded durable record over this one. Used when a
    /// placeholder was installed on the hot path while the real load was
    /// still in flight.
    pub fn replace_with(&mut self, other: ProgressionRecord) {
        self.joined = other.joined;
        self.xp = other.xp;
        self.levels = other.levels;
        self.updated_at = other.updated_at;
    }

    /// Fold a durable record underneath interim mutations: memberships are
    /// unioned and XP/levels take the higher value per job, so neither the
    /// prior history nor progress made on a placeholder is lost.
    pub fn merge_durable(&mut self, durable: ProgressionRecord) {
        self.joined.extend(durable.joined);
        for (job, xp) in durable.xp {
            let slot = self.xp.entry(job).or_insert(0.0);
            if xp > *slot {
                *slot = xp;
            }
        }
        for (job, level) in durable.levels {
            let slot = self.levels.entry(job).or_insert(1);
            if level > *slot {
                *slot = level;
            }
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_idempotent_and_keeps_xp() {
        let mut rec = ProgressionRecord::new(ActorId::new());
        let job = JobId::new("miner");
        assert!(rec.join(job.clone()));
        rec.add_xp(job.clone(), 50.0).unwrap();
        assert!(!rec.join(job.clone()));
        assert_eq!(rec.xp(&job), 50.0);
    }

    #[test]
    fn leave_retains_history() {
        let mut rec = ProgressionRecord::new(ActorId::new());
        let job = JobId::new("miner");
        rec.join(job.clone());
        rec.add_xp(job.clone(), 120.0).unwrap();
        rec.set_level(job.clone(), 2);

        assert!(rec.leave(&job));
        assert!(!rec.is_joined(&job));
        assert_eq!(rec.xp(&job), 120.0);
        assert_eq!(rec.level(&job), 2);

        // Re-join resumes from prior standing.
        assert!(rec.join(job.clone()));
        assert_eq!(rec.xp(&job), 120.0);
        assert_eq!(rec.level(&job), 2);
    }

    #[test]
    fn add_xp_rejects_invalid_amounts() {
        let mut rec = ProgressionRecord::new(ActorId::new());
        let job = JobId::new("miner");
        rec.join(job.clone());

        assert!(rec.add_xp(job.clone(), f64::NAN).is_none());
        assert!(rec.add_xp(job.clone(), f64::INFINITY).is_none());
        assert!(rec.add_xp(job.clone(), -1.0).is_none());
        assert_eq!(rec.xp(&job), 0.0);
    }

    #[test]
    fn add_xp_clamps_at_ceiling() {
        let mut rec = ProgressionRecord::new(ActorId::new());
        let job = JobId::new("miner");
        rec.join(job.clone());
        rec.set_xp(job.clone(), MAX_SAFE_XP - 1.0);
        rec.add_xp(job.clone(), 1.0e9).unwrap();
        assert_eq!(rec.xp(&job), MAX_SAFE_XP);
    }

    #[test]
    fn merge_durable_keeps_both_histories() {
        let actor = ActorId::new();
        let mut durable = ProgressionRecord::new(actor);
        durable.join(JobId::new("miner"));
        durable.set_xp(JobId::new("miner"), 500.0);
        durable.set_level(JobId::new("miner"), 3);

        let mut placeholder = ProgressionRecord::new(actor);
        placeholder.join(JobId::new("farmer"));
        placeholder.add_xp(JobId::new("farmer"), 5.0).unwrap();

        placeholder.merge_durable(durable);
        assert!(placeholder.is_joined(&JobId::new("miner")));
        assert!(placeholder.is_joined(&JobId::new("farmer")));
        assert_eq!(placeholder.xp(&JobId::new("miner")), 500.0);
        assert_eq!(placeholder.level(&JobId::new("miner")), 3);
        assert_eq!(placeholder.xp(&JobId::new("farmer")), 5.0);
    }

    #[test]
    fn roundtrips_through_msgpack() {
        let mut rec = ProgressionRecord::new(ActorId::new());
        let job = JobId::new("farmer");
        rec.join(job.clone());
        rec.add_xp(job.clone(), 42.5).unwrap();
        rec.set_level(job.clone(), 3);

        let bytes = rmp_serde::to_vec(&rec).unwrap();
        let back: ProgressionRecord = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(rec, back);
    }
}
