//! Default roles, policies and users applied at first initialization.
//!
//! The records are produced by an external loader (for example from YAML
//! files) and deserialize into [`DefaultSeed`]. Warden ships a small built-in
//! seed:
//!
//! | Role             | Grants                                          |
//! |------------------|-------------------------------------------------|
//! | administrator    | every action on every resource                  |
//! | readonly         | every `*:read` action                           |
//! | agents_admin     | policy `agents_all`                             |
//! | security_admin   | policy `security_all`                           |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::models::{AuthContext, NewPolicy, NewRole, NewUser};
use super::rule::Rule;
use crate::error::{Result, WardenError};
use crate::store::WriteTx;

/// Who holds what in the seed, by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedRelationships {
    /// Username → role names.
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
    /// Role name → policy names.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
}

/// Structured default configuration records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultSeed {
    /// Role name → rules.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<Rule>>,
    /// Policy name → rule.
    #[serde(default)]
    pub policies: BTreeMap<String, Rule>,
    /// Username → auth context.
    #[serde(default)]
    pub users: BTreeMap<String, AuthContext>,
    #[serde(default)]
    pub relationships: SeedRelationships,
}

/// Counts of what a seed created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub roles: usize,
    pub policies: usize,
    pub users: usize,
    pub links: usize,
}

impl DefaultSeed {
    /// The seed Warden uses when no external records are supplied.
    pub fn builtin() -> Result<Self> {
        let mut seed = Self::default();

        seed.roles.insert("administrator".into(), vec![Rule::allow("**", "**")?]);
        seed.roles.insert("readonly".into(), vec![Rule::allow("**", "*:read")?]);
        seed.roles.insert("agents_admin".into(), Vec::new());
        seed.roles.insert("security_admin".into(), Vec::new());

        seed.policies
            .insert("agents_all".into(), Rule::allow("agent:**", "agent:*")?);
        seed.policies
            .insert("security_all".into(), Rule::allow("security:**", "security:*")?);

        seed.users.insert("wazuh".into(), AuthContext::new());
        seed.users.insert("wazuh-wui".into(), AuthContext::new());

        seed.relationships
            .users
            .insert("wazuh".into(), vec!["administrator".into()]);
        seed.relationships
            .users
            .insert("wazuh-wui".into(), vec!["administrator".into()]);
        seed.relationships
            .roles
            .insert("agents_admin".into(), vec!["agents_all".into()]);
        seed.relationships
            .roles
            .insert("security_admin".into(), vec!["security_all".into()]);

        Ok(seed)
    }

    /// Create every record inside `tx`, marking them as system entities.
    ///
    /// Relationships naming an entity absent from both the seed and the store
    /// fail with `NotFound`; the caller's unit-of-work then rolls back.
    pub async fn apply<T: WriteTx + ?Sized>(&self, tx: &mut T) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        for (name, rules) in &self.roles {
            tx.create_role(NewRole::new(name.clone(), rules.clone()).system())
                .await?;
            report.roles += 1;
        }
        for (name, rule) in &self.policies {
            tx.create_policy(NewPolicy::new(name.clone(), rule.clone()).system())
                .await?;
            report.policies += 1;
        }
        for (username, auth_context) in &self.users {
            tx.create_user(
                NewUser::new(username.clone())
                    .with_auth_context(auth_context.clone())
                    .system(),
            )
            .await?;
            report.users += 1;
        }

        for (username, role_names) in &self.relationships.users {
            let user = tx.get_user_by_name(username).await?;
            for role_name in role_names {
                let role = tx.get_role_by_name(role_name).await?;
                if tx.link_user_role(user.id, role.id).await? {
                    report.links += 1;
                }
            }
        }
        for (role_name, policy_names) in &self.relationships.roles {
            let role = tx.get_role_by_name(role_name).await?;
            for policy_name in policy_names {
                let policy = tx.get_policy_by_name(policy_name).await?;
                if tx.link_role_policy(role.id, policy.id).await? {
                    report.links += 1;
                }
            }
        }

        info!(
            roles = report.roles,
            policies = report.policies,
            users = report.users,
            links = report.links,
            "Default security seed applied"
        );
        Ok(report)
    }

    /// Check that every relationship refers to a record in this seed.
    pub fn validate(&self) -> Result<()> {
        for (username, role_names) in &self.relationships.users {
            if !self.users.contains_key(username) {
                return Err(WardenError::not_found("user", username));
            }
            if let Some(missing) = role_names.iter().find(|r| !self.roles.contains_key(*r)) {
                return Err(WardenError::not_found("role", missing));
            }
        }
        for (role_name, policy_names) in &self.relationships.roles {
            if !self.roles.contains_key(role_name) {
                return Err(WardenError::not_found("role", role_name));
            }
            if let Some(missing) = policy_names.iter().find(|p| !self.policies.contains_key(*p)) {
                return Err(WardenError::not_found("policy", missing));
            }
        }
        Ok(())
    }
}
