//! Static configuration: jobs, action rules, limit policies and service
//! tuning. Everything here is immutable after load; an admin reload swaps the
//! whole job set wholesale.

pub mod curve;
pub mod pattern;

pub use curve::ProgressionCurve;
pub use pattern::TargetPattern;

use crate::core::{ActionCategory, JobId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Cap on reward-bearing uses of one target within a period, plus cooldown
/// behavior once exhausted. Shared read-only across all actors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Reward-bearing uses allowed before the cooldown starts.
    pub max_uses: u32,
    /// How long the tuple stays on cooldown once exhausted.
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Suppress XP once exhausted.
    #[serde(default = "default_true")]
    pub block_xp: bool,
    /// Suppress currency once exhausted.
    #[serde(default = "default_true")]
    pub block_income: bool,
}

fn default_true() -> bool {
    true
}

/// Serialize durations as whole seconds, the form used in job files.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// One configured reward within a job/category: a target pattern, base
/// amounts, and optional constraints. Requirement and side-effect payloads are
/// opaque descriptors forwarded to external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    pub target: TargetPattern,
    #[serde(default)]
    pub base_xp: f64,
    #[serde(default)]
    pub base_income: f64,
    /// Required interaction subtype; `None` matches every subtype.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Accepted professions for trade-like categories; `None` matches all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitPolicy>,
    /// Opaque requirement descriptor, evaluated externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    /// Opaque side-effect descriptor (messages/commands), dispatched
    /// externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effect: Option<String>,
}

impl ActionRule {
    pub fn new(target: TargetPattern) -> Self {
        Self {
            target,
            base_xp: 0.0,
            base_income: 0.0,
            subtype: None,
            professions: None,
            limit: None,
            requirement: None,
            side_effect: None,
        }
    }

    pub fn with_rewards(mut self, xp: f64, income: f64) -> Self {
        self.base_xp = xp;
        self.base_income = income;
        self
    }

    pub fn with_limit(mut self, limit: LimitPolicy) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Permission-node suffix with its reward multiplier. The full node checked
/// is `<prefix>.<suffix>`; the highest matching tier wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionTier {
    pub node_suffix: String,
    pub multiplier: f64,
}

/// Time-of-day trigger that resets a job's rate-limit state for all actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreScheduleConfig {
    pub enabled: bool,
    /// Wall-clock time of day: `H:mm` (24h) or `h:mm a` (12h).
    pub time_of_day: String,
}

/// Immutable definition of one job, loaded at startup and replaced wholesale
/// on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: JobId,
    pub display_name: String,
    pub max_level: u32,
    #[serde(default)]
    pub curve: ProgressionCurve,
    #[serde(default)]
    pub rules: HashMap<ActionCategory, Vec<ActionRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_schedule: Option<RestoreScheduleConfig>,
    /// Reward multiplier tiers keyed off permission nodes.
    #[serde(default)]
    pub permission_tiers: Vec<PermissionTier>,
}

impl JobConfig {
    pub fn new(id: impl Into<JobId>, display_name: impl Into<String>, max_level: u32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            max_level,
            curve: ProgressionCurve::default(),
            rules: HashMap::new(),
            restore_schedule: None,
            permission_tiers: Vec::new(),
        }
    }

    pub fn with_curve(mut self, curve: ProgressionCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_rules(mut self, category: ActionCategory, rules: Vec<ActionRule>) -> Self {
        self.rules.insert(category, rules);
        self
    }

    pub fn with_restore_schedule(mut self, time_of_day: impl Into<String>) -> Self {
        self.restore_schedule = Some(RestoreScheduleConfig {
            enabled: true,
            time_of_day: time_of_day.into(),
        });
        self
    }

    pub fn rules_for(&self, category: ActionCategory) -> &[ActionRule] {
        self.rules.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Service-level tuning for persistence, caching and background maintenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory for the flat-file backend (and the sqlite file by default).
    pub data_dir: PathBuf,
    /// Use the relational backend when true; the file backend remains the
    /// fallback either way.
    #[serde(default)]
    pub use_sqlite: bool,
    /// Override for the sqlite database path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
    /// Gzip record payloads before durable writes.
    #[serde(default)]
    pub compression: bool,
    /// Interval between dirty-record flush sweeps.
    #[serde(with = "duration_secs", default = "default_autosave")]
    pub autosave_interval: Duration,
    /// Idle time after which a clean cache entry is evicted.
    #[serde(with = "duration_secs", default = "default_cache_ttl")]
    pub cache_ttl: Duration,
    /// Records per batch execution unit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bound on the synchronous on-demand load before a placeholder is used.
    #[serde(with = "duration_secs", default = "default_load_timeout")]
    pub load_timeout: Duration,
    /// Grace period for draining in-flight writes at shutdown.
    #[serde(with = "duration_secs", default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,
    /// Actors holding this permission node are excluded from tier boosts.
    #[serde(default = "default_elevated_node")]
    pub elevated_permission_node: String,
    /// Whether the elevated-node exclusion is applied at all.
    #[serde(default = "default_true")]
    pub exclude_elevated_from_tiers: bool,
    /// Prefix for permission-tier nodes (`<prefix>.<suffix>`).
    #[serde(default = "default_tier_prefix")]
    pub tier_node_prefix: String,
}

fn default_autosave() -> Duration {
    Duration::from_secs(60)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_batch_size() -> usize {
    100
}

fn default_load_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_elevated_node() -> String {
    "jobforge.*".to_string()
}

fn default_tier_prefix() -> String {
    "jobforge.boost".to_string()
}

impl ServiceConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            use_sqlite: false,
            sqlite_path: None,
            compression: false,
            autosave_interval: default_autosave(),
            cache_ttl: default_cache_ttl(),
            batch_size: default_batch_size(),
            load_timeout: default_load_timeout(),
            shutdown_grace: default_shutdown_grace(),
            elevated_permission_node: default_elevated_node(),
            exclude_elevated_from_tiers: true,
            tier_node_prefix: default_tier_prefix(),
        }
    }

    pub fn with_sqlite(mut self) -> Self {
        self.use_sqlite = true;
        self
    }

    pub fn with_compression(mut self) -> Self {
        self.compression = true;
        self
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("progression.db"))
    }
}
