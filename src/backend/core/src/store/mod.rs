//! Relationship store contracts.
//!
//! Every store operation runs inside an explicit unit-of-work:
//!
//! - [`RbacStore::read`] opens a [`ReadTx`] for lookups and relation queries.
//! - [`RbacStore::write`] opens a [`WriteTx`]; writes become visible only on
//!   [`WriteTx::commit`]. Calling [`WriteTx::rollback`] or simply dropping
//!   the object discards them, so errors and cancelled futures never leave
//!   partial state behind.
//!
//! Write units-of-work are serialized by the backend. Two implementations
//! ship with the crate: [`memory::MemoryStore`] and [`postgres::PgStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Result, WardenError};
use crate::rbac::{
    AuthContext, NewPolicy, NewRole, NewUser, Policy, PolicyId, Role, RoleId, Rule, User, UserId,
};
use crate::revocation::RevocationRecord;
use crate::security::SecurityConfig;

pub mod memory;
pub mod postgres;

pub use memory::{Fault, MemoryStore};
pub use postgres::PgStore;

/// Read side of a unit-of-work.
///
/// Lookups of absent entities fail with `NotFound`.
#[async_trait]
pub trait ReadTx: Send {
    async fn get_user(&mut self, id: UserId) -> Result<User>;
    async fn get_user_by_name(&mut self, username: &str) -> Result<User>;
    async fn list_users(&mut self) -> Result<Vec<User>>;

    async fn get_role(&mut self, id: RoleId) -> Result<Role>;
    async fn get_role_by_name(&mut self, name: &str) -> Result<Role>;
    async fn list_roles(&mut self) -> Result<Vec<Role>>;

    async fn get_policy(&mut self, id: PolicyId) -> Result<Policy>;
    async fn get_policy_by_name(&mut self, name: &str) -> Result<Policy>;
    async fn list_policies(&mut self) -> Result<Vec<Policy>>;

    /// Roles held by a user, in link order.
    async fn roles_of_user(&mut self, user_id: UserId) -> Result<Vec<Role>>;
    /// Policies attached to a role, in link order.
    async fn policies_of_role(&mut self, role_id: RoleId) -> Result<Vec<Policy>>;
    /// Users holding a role.
    async fn users_of_role(&mut self, role_id: RoleId) -> Result<Vec<UserId>>;
    /// Roles a policy is attached to.
    async fn roles_of_policy(&mut self, policy_id: PolicyId) -> Result<Vec<RoleId>>;

    async fn revocation(&mut self, user_id: UserId) -> Result<Option<RevocationRecord>>;
    async fn global_revocation(&mut self) -> Result<Option<DateTime<Utc>>>;

    async fn security_config(&mut self) -> Result<Option<SecurityConfig>>;
}

/// Write side of a unit-of-work.
///
/// Creating a duplicate username, role name or policy name fails with
/// `Conflict`. Deletes detach every link of the entity before removing it.
#[async_trait]
pub trait WriteTx: ReadTx {
    async fn create_user(&mut self, user: NewUser) -> Result<User>;
    async fn create_role(&mut self, role: NewRole) -> Result<Role>;
    async fn create_policy(&mut self, policy: NewPolicy) -> Result<Policy>;

    async fn update_user_auth_context(&mut self, id: UserId, auth_context: AuthContext)
        -> Result<User>;
    async fn update_role_rules(&mut self, id: RoleId, rules: Vec<Rule>) -> Result<Role>;
    async fn update_policy_rule(&mut self, id: PolicyId, rule: Rule) -> Result<Policy>;

    /// Removes the user, its role links and its revocation record.
    async fn delete_user(&mut self, id: UserId) -> Result<User>;
    /// Removes the role and every user and policy link to it.
    async fn delete_role(&mut self, id: RoleId) -> Result<Role>;
    /// Removes the policy and every role link to it.
    async fn delete_policy(&mut self, id: PolicyId) -> Result<Policy>;

    /// Returns `false` when the pair was already linked.
    async fn link_user_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<bool>;
    async fn unlink_user_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<()>;
    /// Returns `false` when the pair was already linked.
    async fn link_role_policy(&mut self, role_id: RoleId, policy_id: PolicyId) -> Result<bool>;
    async fn unlink_role_policy(&mut self, role_id: RoleId, policy_id: PolicyId) -> Result<()>;

    /// Set the user's cutoff to `max(current, at)` and return the stored record.
    async fn raise_revocation(&mut self, user_id: UserId, at: DateTime<Utc>)
        -> Result<RevocationRecord>;
    /// Set the global cutoff to `max(current, at)` and return the stored value.
    async fn raise_global_revocation(&mut self, at: DateTime<Utc>) -> Result<DateTime<Utc>>;
    /// Delete per-user records whose cutoff is strictly before `before`.
    async fn prune_revocations(&mut self, before: DateTime<Utc>) -> Result<u64>;

    async fn save_security_config(&mut self, config: &SecurityConfig) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A transactional RBAC store.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn read(&self) -> Result<Box<dyn ReadTx>>;
    async fn write(&self) -> Result<Box<dyn WriteTx>>;
    fn backend_name(&self) -> &'static str;
}

/// Commit `tx` when `outcome` is `Ok`, roll it back otherwise.
///
/// The returned error is logged at its severity. A failed commit is returned
/// as the error; a failed rollback is logged and the original error is
/// returned.
pub async fn finish<T>(tx: Box<dyn WriteTx>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await.inspect_err(WardenError::log)?;
            Ok(value)
        }
        Err(error) => {
            error.log();
            if let Err(rollback_error) = tx.rollback().await {
                warn!(
                    error = %rollback_error,
                    original = %error,
                    "Rollback failed after error"
                );
            }
            Err(error)
        }
    }
}
