//! Property matching contract - exact defaults, richer matchers plug in

use crate::error::Result;
use crate::query::{MatchCriteria, MatchMode};
use std::collections::HashMap;

/// Evaluates property bags against match requests
///
/// Fallible so matchers backed by compiled expressions can reject malformed
/// patterns as invalid parameters.
pub trait PropertyMatcher: Send + Sync {
    /// Evaluate a property bag against match criteria
    fn matches(
        &self,
        properties: &HashMap<String, serde_json::Value>,
        criteria: &MatchCriteria,
    ) -> Result<bool>;

    /// Search a property bag for a string across string-valued properties
    fn matches_search_string(
        &self,
        properties: &HashMap<String, serde_json::Value>,
        search: &str,
    ) -> Result<bool>;
}

/// Equality and substring matcher
///
/// Regular-expression semantics belong to the matcher the outer layer
/// supplies; this default compares values for equality and searches
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ExactMatcher;

impl PropertyMatcher for ExactMatcher {
    fn matches(
        &self,
        properties: &HashMap<String, serde_json::Value>,
        criteria: &MatchCriteria,
    ) -> Result<bool> {
        if criteria.properties.is_empty() {
            return Ok(true);
        }
        let matched = criteria
            .properties
            .iter()
            .filter(|(name, expected)| properties.get(name.as_str()) == Some(*expected))
            .count();

        Ok(match criteria.mode {
            MatchMode::All => matched == criteria.properties.len(),
            MatchMode::Any => matched > 0,
            MatchMode::None => matched == 0,
        })
    }

    fn matches_search_string(
        &self,
        properties: &HashMap<String, serde_json::Value>,
        search: &str,
    ) -> Result<bool> {
        let needle = search.to_lowercase();
        Ok(properties.values().any(|value| match value {
            serde_json::Value::String(s) => s.to_lowercase().contains(&needle),
            _ => false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> HashMap<String, serde_json::Value> {
        let mut props = HashMap::new();
        props.insert("displayName".to_string(), serde_json::json!("Order Ledger"));
        props.insert("rowCount".to_string(), serde_json::json!(120));
        props
    }

    #[test]
    fn test_match_all() {
        let matcher = ExactMatcher;
        let criteria = MatchCriteria::new(MatchMode::All)
            .with_property("displayName", serde_json::json!("Order Ledger"))
            .with_property("rowCount", serde_json::json!(120));
        assert!(matcher.matches(&properties(), &criteria).unwrap());

        let criteria = criteria.with_property("owner", serde_json::json!("finance"));
        assert!(!matcher.matches(&properties(), &criteria).unwrap());
    }

    #[test]
    fn test_match_any_and_none() {
        let matcher = ExactMatcher;
        let criteria = MatchCriteria::new(MatchMode::Any)
            .with_property("rowCount", serde_json::json!(120))
            .with_property("owner", serde_json::json!("finance"));
        assert!(matcher.matches(&properties(), &criteria).unwrap());

        let criteria = MatchCriteria::new(MatchMode::None)
            .with_property("rowCount", serde_json::json!(120));
        assert!(!matcher.matches(&properties(), &criteria).unwrap());
    }

    #[test]
    fn test_search_string_is_case_insensitive() {
        let matcher = ExactMatcher;
        assert!(matcher
            .matches_search_string(&properties(), "ledger")
            .unwrap());
        assert!(!matcher
            .matches_search_string(&properties(), "inventory")
            .unwrap());
    }
}
