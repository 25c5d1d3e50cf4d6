use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identity of a progressing actor (player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a job. Normalized to lowercase so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The closed set of tracked action kinds.
///
/// Every qualifying game event arrives tagged with exactly one category; job
/// configurations attach an ordered rule list per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCategory {
    Break,
    Place,
    Kill,
    Fish,
    Craft,
    Smelt,
    Brew,
    Enchant,
    Repair,
    Breed,
    Tame,
    Dye,
    Shear,
    Milk,
    Explore,
    Eat,
    Collect,
    Bake,
    StripLogs,
    Trade,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 20] = [
        Self::Break,
        Self::Place,
        Self::Kill,
        Self::Fish,
        Self::Craft,
        Self::Smelt,
        Self::Brew,
        Self::Enchant,
        Self::Repair,
        Self::Breed,
        Self::Tame,
        Self::Dye,
        Self::Shear,
        Self::Milk,
        Self::Explore,
        Self::Eat,
        Self::Collect,
        Self::Bake,
        Self::StripLogs,
        Self::Trade,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Break => "BREAK",
            Self::Place => "PLACE",
            Self::Kill => "KILL",
            Self::Fish => "FISH",
            Self::Craft => "CRAFT",
            Self::Smelt => "SMELT",
            Self::Brew => "BREW",
            Self::Enchant => "ENCHANT",
            Self::Repair => "REPAIR",
            Self::Breed => "BREED",
            Self::Tame => "TAME",
            Self::Dye => "DYE",
            Self::Shear => "SHEAR",
            Self::Milk => "MILK",
            Self::Explore => "EXPLORE",
            Self::Eat => "EAT",
            Self::Collect => "COLLECT",
            Self::Bake => "BAKE",
            Self::StripLogs => "STRIP_LOGS",
            Self::Trade => "TRADE",
        }
    }

    /// Categories whose rules may constrain an interaction subtype
    /// (e.g. which tool or hand was used).
    pub fn uses_interaction_subtype(&self) -> bool {
        matches!(self, Self::Repair | Self::Dye | Self::Shear | Self::Milk)
    }

    /// Trade-like categories match against a villager profession list.
    pub fn uses_profession(&self) -> bool {
        matches!(self, Self::Trade)
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single attribute carried by an event context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl ContextValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

/// Well-known context attribute keys consumed by rule matching.
pub mod context_keys {
    /// Interaction subtype for interaction-style categories.
    pub const SUBTYPE: &str = "subtype";
    /// Reward multiplier carried by the event (e.g. shift-craft count).
    pub const COUNT_MULTIPLIER: &str = "count_multiplier";
    /// Villager profession for trade-like categories.
    pub const PROFESSION: &str = "profession";
    /// Enchantment level for enchant events.
    pub const ENCHANT_LEVEL: &str = "enchant_level";
    /// Applied color for dye events.
    pub const COLOR: &str = "color";
}

/// The target and attribute bag describing one qualifying game event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub target: String,
    pub attributes: HashMap<String, ContextValue>,
}

impl EventContext {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<ContextValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(ContextValue::as_str)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(ContextValue::as_f64)
    }

    /// Reward multiplier carried in the context, defaulting to 1.
    pub fn count_multiplier(&self) -> f64 {
        let m = self.attr_f64(context_keys::COUNT_MULTIPLIER).unwrap_or(1.0);
        if m.is_finite() && m > 0.0 { m } else { 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(ActionCategory::parse("break"), Some(ActionCategory::Break));
        assert_eq!(
            ActionCategory::parse("strip_logs"),
            Some(ActionCategory::StripLogs)
        );
        assert_eq!(ActionCategory::parse("nope"), None);
    }

    #[test]
    fn job_id_normalizes_case() {
        assert_eq!(JobId::new("Miner"), JobId::new("miner"));
        assert_eq!(JobId::new("MINER").as_str(), "miner");
    }

    #[test]
    fn context_multiplier_rejects_bad_values() {
        let ctx = EventContext::new("IRON_INGOT")
            .with_attribute(context_keys::COUNT_MULTIPLIER, f64::NAN);
        assert_eq!(ctx.count_multiplier(), 1.0);

        let ctx = EventContext::new("IRON_INGOT")
            .with_attribute(context_keys::COUNT_MULTIPLIER, 4.0);
        assert_eq!(ctx.count_multiplier(), 4.0);
    }
}
