//! Progression curves: level <-> cumulative XP conversion.
//!
//! A job references either one of the named built-in curve families or an
//! inline formula. Curves are validated once at load; a curve that produces
//! non-finite or non-monotonic values disables its job instead of crashing
//! the store.

use crate::core::{JobsError, Result};
use serde::{Deserialize, Serialize};

/// Cumulative-XP function for a job, selected in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressionCurve {
    /// `xp(L) = per_level * (L - 1)` — a flat grind.
    Linear { per_level: f64 },
    /// `xp(L) = base * (L - 1)^exponent` — the classic accelerating curve.
    Polynomial { base: f64, exponent: f64 },
    /// `xp(L) = base * (growth^(L-1) - 1) / (growth - 1)` — compounding cost.
    Exponential { base: f64, growth: f64 },
    /// Inline formula: `xp(L) = base * multiplier * (L - 1)^exponent`.
    Formula {
        base: f64,
        multiplier: f64,
        exponent: f64,
    },
}

impl ProgressionCurve {
    /// Resolve a named reusable curve with default parameters.
    pub fn named(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linear" => Some(Self::Linear { per_level: 100.0 }),
            "steady" => Some(Self::Polynomial {
                base: 100.0,
                exponent: 1.5,
            }),
            "exponential" => Some(Self::Exponential {
                base: 100.0,
                growth: 1.1,
            }),
            _ => None,
        }
    }

    /// Cumulative XP required to hold `level`. Level 1 always costs zero.
    pub fn xp_for_level(&self, level: u32) -> f64 {
        if level <= 1 {
            return 0.0;
        }
        let steps = (level - 1) as f64;
        match self {
            Self::Linear { per_level } => per_level * steps,
            Self::Polynomial { base, exponent } => base * steps.powf(*exponent),
            Self::Exponential { base, growth } => {
                if (*growth - 1.0).abs() < f64::EPSILON {
                    base * steps
                } else {
                    base * (growth.powf(steps) - 1.0) / (growth - 1.0)
                }
            }
            Self::Formula {
                base,
                multiplier,
                exponent,
            } => base * multiplier * steps.powf(*exponent),
        }
    }

    /// Highest level whose cumulative requirement fits in `xp`, capped at
    /// `max_level`.
    pub fn level_for_xp(&self, xp: f64, max_level: u32) -> u32 {
        if !xp.is_finite() || xp <= 0.0 {
            return 1;
        }
        // Curves are monotonic (enforced by validate), so binary search.
        let mut lo = 1u32;
        let mut hi = max_level.max(1);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.xp_for_level(mid) <= xp {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }

    /// Probe the curve across the whole level range. Any non-finite or
    /// decreasing value is a configuration error.
    pub fn validate(&self, max_level: u32) -> Result<()> {
        let mut prev = 0.0f64;
        for level in 1..=max_level.max(1) {
            let xp = self.xp_for_level(level);
            if !xp.is_finite() {
                return Err(JobsError::CurveError(format!(
                    "curve yields non-finite XP at level {}",
                    level
                )));
            }
            if xp < prev {
                return Err(JobsError::CurveError(format!(
                    "curve is not monotonic: level {} requires {} < {}",
                    level, xp, prev
                )));
            }
            prev = xp;
        }
        Ok(())
    }
}

impl Default for ProgressionCurve {
    fn default() -> Self {
        Self::Polynomial {
            base: 100.0,
            exponent: 1.5,
        }
    }
}
