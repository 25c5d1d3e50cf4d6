//! Target pattern matching for action rules.
//!
//! Patterns are deliberately simple: exact names, a single leading or trailing
//! wildcard, the bare `*`, or a structured attribute match. All comparisons
//! are case-insensitive ASCII, so no regex machinery is needed.

use crate::core::EventContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetPattern {
    /// Matches the target name exactly.
    Exact(String),
    /// `ORE_*` — matches any target starting with the prefix.
    Prefix(String),
    /// `*_LOG` — matches any target ending with the suffix.
    Suffix(String),
    /// `*` — matches every target.
    Any,
    /// Attribute key/value pairs that must all be present in the event
    /// context (enchantment, profession, color and similar matches). An
    /// empty value matches any value for that key.
    Structured(BTreeMap<String, String>),
}

impl TargetPattern {
    /// Parse the textual pattern form used in job configurations.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" || raw.is_empty() {
            return Self::Any;
        }
        if let Some(prefix) = raw.strip_suffix('*') {
            if !prefix.contains('*') {
                return Self::Prefix(prefix.to_string());
            }
        }
        if let Some(suffix) = raw.strip_prefix('*') {
            if !suffix.contains('*') {
                return Self::Suffix(suffix.to_string());
            }
        }
        Self::Exact(raw.to_string())
    }

    /// Match against a bare target name.
    pub fn matches_target(&self, target: &str) -> bool {
        match self {
            Self::Exact(name) => target.eq_ignore_ascii_case(name),
            Self::Prefix(prefix) => starts_with_ignore_case(target, prefix),
            Self::Suffix(suffix) => ends_with_ignore_case(target, suffix),
            Self::Any => true,
            Self::Structured(_) => false,
        }
    }

    /// Match against a full event context. Plain patterns look only at the
    /// target; structured patterns check the attribute bag.
    pub fn matches(&self, ctx: &EventContext) -> bool {
        match self {
            Self::Structured(pairs) => pairs.iter().all(|(key, want)| {
                match ctx.attr_str(key) {
                    Some(have) => want.is_empty() || have.eq_ignore_ascii_case(want),
                    None => match ctx.attr_f64(key) {
                        // Numeric attributes compare against the decimal form.
                        Some(n) => want.is_empty() || format!("{}", n) == *want,
                        None => false,
                    },
                }
            }),
            _ => self.matches_target(&ctx.target),
        }
    }

    /// Canonical key used for rate-limit state bucketing.
    pub fn key(&self) -> String {
        match self {
            Self::Exact(name) => name.to_ascii_uppercase(),
            Self::Prefix(prefix) => format!("{}*", prefix.to_ascii_uppercase()),
            Self::Suffix(suffix) => format!("*{}", suffix.to_ascii_uppercase()),
            Self::Any => "*".to_string(),
            Self::Structured(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}={}", k.to_ascii_uppercase(), v.to_ascii_uppercase()))
                    .collect();
                parts.join(";")
            }
        }
    }
}

impl fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// Fast-path comparisons that avoid allocating lowercase copies.
fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    text.len() >= suffix.len() && text[text.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(TargetPattern::parse("*"), TargetPattern::Any);
        assert_eq!(
            TargetPattern::parse("ORE_*"),
            TargetPattern::Prefix("ORE_".to_string())
        );
        assert_eq!(
            TargetPattern::parse("*_LOG"),
            TargetPattern::Suffix("_LOG".to_string())
        );
        assert_eq!(
            TargetPattern::parse("STONE"),
            TargetPattern::Exact("STONE".to_string())
        );
    }

    #[test]
    fn wildcard_matching_is_case_insensitive() {
        let p = TargetPattern::parse("ORE_*");
        assert!(p.matches_target("ORE_IRON"));
        assert!(p.matches_target("ore_gold"));
        assert!(!p.matches_target("STONE"));

        let any = TargetPattern::parse("*");
        assert!(any.matches_target("ANYTHING"));

        let s = TargetPattern::parse("*_LOG");
        assert!(s.matches_target("OAK_LOG"));
        assert!(!s.matches_target("LOG_OAK"));
    }

    #[test]
    fn structured_matches_attribute_bag() {
        use crate::core::EventContext;
        let mut pairs = BTreeMap::new();
        pairs.insert("profession".to_string(), "FARMER".to_string());
        let p = TargetPattern::Structured(pairs);

        let ctx = EventContext::new("VILLAGER").with_attribute("profession", "farmer");
        assert!(p.matches(&ctx));

        let ctx = EventContext::new("VILLAGER").with_attribute("profession", "cleric");
        assert!(!p.matches(&ctx));

        let ctx = EventContext::new("VILLAGER");
        assert!(!p.matches(&ctx));
    }

    #[test]
    fn empty_structured_value_matches_any() {
        use crate::core::EventContext;
        let mut pairs = BTreeMap::new();
        pairs.insert("color".to_string(), String::new());
        let p = TargetPattern::Structured(pairs);

        let ctx = EventContext::new("SHEEP").with_attribute("color", "RED");
        assert!(p.matches(&ctx));
    }
}
