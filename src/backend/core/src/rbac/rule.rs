//! Rules: a resource pattern, an action pattern, an effect and an optional
//! condition over the caller's auth context.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::AuthContext;
use super::pattern::Pattern;
use crate::error::Result;

/// What a matching rule does to the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Condition tree evaluated against the user's auth context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Context value at `key` equals `value`. A JSON array at `key` matches
    /// when any element equals `value`.
    Equals {
        key: String,
        value: serde_json::Value,
    },
    /// Context contains `key`, whatever its value.
    Exists { key: String },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn equals(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn holds(&self, context: &AuthContext) -> bool {
        match self {
            Self::Equals { key, value } => match context.get(key) {
                Some(serde_json::Value::Array(items)) if !value.is_array() => {
                    items.iter().any(|item| item == value)
                }
                Some(found) => found == value,
                None => false,
            },
            Self::Exists { key } => context.contains_key(key),
            Self::All(conditions) => conditions.iter().all(|c| c.holds(context)),
            Self::Any(conditions) => conditions.iter().any(|c| c.holds(context)),
            Self::Not(inner) => !inner.holds(context),
        }
    }
}

/// A single permission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub resource: Pattern,
    pub action: Pattern,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Rule {
    /// Parse the patterns and build a rule.
    pub fn new(resource: &str, action: &str, effect: Effect) -> Result<Self> {
        Ok(Self {
            resource: Pattern::parse(resource)?,
            action: Pattern::parse(action)?,
            effect,
            condition: None,
        })
    }

    pub fn allow(resource: &str, action: &str) -> Result<Self> {
        Self::new(resource, action, Effect::Allow)
    }

    pub fn deny(resource: &str, action: &str) -> Result<Self> {
        Self::new(resource, action, Effect::Deny)
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Combined specificity of the resource and action patterns.
    pub fn specificity(&self) -> u32 {
        self.resource.specificity() + self.action.specificity()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.effect, self.action, self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: serde_json::Value) -> AuthContext {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rule_deserializes_from_records() {
        let rule: Rule = serde_json::from_value(json!({
            "resource": "logs/*",
            "action": "read",
            "effect": "allow"
        }))
        .unwrap();
        assert_eq!(rule.effect, Effect::Allow);
        assert_eq!(rule.resource.as_str(), "logs/*");
        assert!(rule.condition.is_none());
    }

    #[test]
    fn malformed_rule_pattern_fails_to_deserialize() {
        let result = serde_json::from_value::<Rule>(json!({
            "resource": "logs//x",
            "action": "read",
            "effect": "allow"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn condition_tree() {
        let ctx = context(json!({"department": "ops", "groups": ["admins", "dev"]}));

        assert!(Condition::equals("department", "ops").holds(&ctx));
        assert!(Condition::equals("groups", "admins").holds(&ctx));
        assert!(!Condition::equals("groups", "finance").holds(&ctx));
        assert!(Condition::Exists { key: "groups".into() }.holds(&ctx));
        assert!(Condition::All(vec![
            Condition::equals("department", "ops"),
            Condition::Not(Box::new(Condition::equals("groups", "finance"))),
        ])
        .holds(&ctx));
        assert!(!Condition::Any(vec![Condition::equals("department", "hr")]).holds(&ctx));
    }

    #[test]
    fn condition_serde_shape() {
        let condition: Condition = serde_json::from_value(json!({
            "any": [
                {"equals": {"key": "team", "value": "blue"}},
                {"exists": {"key": "run_as"}}
            ]
        }))
        .unwrap();
        let ctx = context(json!({"run_as": true}));
        assert!(condition.holds(&ctx));
    }
}
