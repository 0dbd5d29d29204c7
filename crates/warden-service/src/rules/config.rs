//! Rule-set definition format.
//!
//! A rule set is a YAML (or JSON) sequence of rule configurations:
//!
//! ```yaml
//! - id: public-api
//!   url: https://api.example.com/public/**
//!   methods: [GET]
//!   authenticators: [{ id: anonymous }]
//!   authorizer: { id: allow_all }
//! ```
//!
//! Unknown fields are rejected.

use crate::errors::RuleSetError;
use crate::pipeline::factory::HandlerRef;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub id: String,

    /// URL pattern, see [`UrlPattern`](crate::rules::UrlPattern).
    pub url: String,

    /// Allowed HTTP methods. Empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub authenticators: Vec<HandlerRef>,

    #[serde(default)]
    pub authorizer: Option<HandlerRef>,

    #[serde(default)]
    pub hydrators: Vec<HandlerRef>,

    #[serde(default)]
    pub mutators: Vec<HandlerRef>,

    #[serde(default)]
    pub error_handlers: Vec<HandlerRef>,
}

/// Parse a rule-set definition.
///
/// # Errors
///
/// Returns `RuleSetError::Parse` for malformed documents, unknown fields,
/// empty rule ids and duplicate rule ids.
pub fn parse_rule_set(definition: &[u8]) -> Result<Vec<RuleConfig>, RuleSetError> {
    let rules: Vec<RuleConfig> =
        serde_yaml::from_slice(definition).map_err(|e| RuleSetError::Parse(e.to_string()))?;

    let mut seen = HashSet::with_capacity(rules.len());
    for rule in &rules {
        if rule.id.is_empty() {
            return Err(RuleSetError::Parse("rule id must not be empty".to_string()));
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(RuleSetError::Parse(format!(
                "duplicate rule id '{}'",
                rule.id
            )));
        }
    }

    Ok(rules)
}
