//! RBAC data models: User, Role, Policy and their identifiers.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::rule::Rule;
use crate::error::{Result, WardenError};

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Strongly-typed user identifier.
    UserId
);
entity_id!(
    /// Strongly-typed role identifier.
    RoleId
);
entity_id!(
    /// Strongly-typed policy identifier.
    PolicyId
);

/// Opaque key/value payload describing how a user authenticated.
///
/// Rule conditions are evaluated against it.
pub type AuthContext = serde_json::Map<String, serde_json::Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// Names
// ═══════════════════════════════════════════════════════════════════════════════

/// Usernames, role names and policy names.
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.@\-]{1,64}$").expect("Invalid name regex")
});

/// Validate a username, role name or policy name.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(WardenError::validation(format!("Invalid {} name: {:?}", kind, name))
            .with_context("name", name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// User
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique username.
    pub username: String,
    /// Request context made available to rule conditions.
    #[serde(default)]
    pub auth_context: AuthContext,
    /// Created from the default seed; cannot be deleted.
    #[serde(default)]
    pub system: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when provisioning a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub auth_context: AuthContext,
    #[serde(default)]
    pub system: bool,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth_context: AuthContext::new(),
            system: false,
        }
    }

    pub fn with_auth_context(mut self, auth_context: AuthContext) -> Self {
        self.auth_context = auth_context;
        self
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("user", &self.username)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named, ordered bundle of rules assignable to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    /// Unique role name.
    pub name: String,
    /// Rules contributed directly by this role, in evaluation order.
    pub rules: Vec<Rule>,
    /// Created from the default seed; cannot be deleted or rewritten.
    #[serde(default)]
    pub system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub system: bool,
}

impl NewRole {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
            system: false,
        }
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("role", &self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// A named, reusable rule that can be attached to many roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    /// Unique policy name.
    pub name: String,
    pub rule: Rule,
    #[serde(default)]
    pub system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicy {
    pub name: String,
    pub rule: Rule,
    #[serde(default)]
    pub system: bool,
}

impl NewPolicy {
    pub fn new(name: impl Into<String>, rule: Rule) -> Self {
        Self {
            name: name.into(),
            rule,
            system: false,
        }
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("policy", &self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("role", "readonly").is_ok());
        assert!(validate_name("user", "wazuh-wui").is_ok());
        assert!(validate_name("user", "ops@example.com").is_ok());
        assert!(validate_name("policy", "agents_read.v2").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        let too_long = "x".repeat(65);
        for bad in ["", "has space", "semi;colon", too_long.as_str()] {
            let err = validate_name("role", bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError, "name {:?}", bad);
        }
    }

    #[test]
    fn test_id_serializes_transparently() {
        let json = serde_json::to_string(&RoleId::new(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(RoleId::new(7).to_string(), "7");
    }
}
