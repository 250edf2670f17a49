//! Change Orchestrator.
//!
//! Every mutation that can alter what a user is allowed to do runs through
//! here, inside a single write unit-of-work:
//!
//! ```text
//! RECEIVE ──► RESOLVE BLAST RADIUS ──► REVOKE ──► PERSIST
//! ```
//!
//! 1. **Receive**: the mutation itself is applied to the unit-of-work.
//! 2. **Resolve**: the set of users whose effective rules may have changed is
//!    computed from the store (for deletes, before the links are detached).
//! 3. **Revoke**: each affected user's revocation cutoff is raised to now.
//! 4. **Persist**: the unit-of-work commits.
//!
//! A failure at any step rolls the whole unit back, so a mutation is never
//! committed without its revocations or the other way round.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, WardenError};
use crate::rbac::{
    AuthContext, NewPolicy, NewRole, NewUser, Policy, PolicyId, Role, RoleId, Rule, User, UserId,
};
use crate::revocation::{RevocationRecord, TokenInvalidationTracker};
use crate::security::{ConfigUpdate, SecurityConfigStore};
use crate::store::{finish, RbacStore, ReadTx, WriteTx};
use crate::telemetry::metrics::CHANGES_TOTAL;

// ═══════════════════════════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════════════════════════

/// What a committed change revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    /// Correlates the log lines of one change.
    pub change_id: Uuid,
    pub blast_radius: BTreeSet<UserId>,
    pub revoked: Vec<RevocationRecord>,
    /// Set when every token was invalidated.
    pub global_cutoff: Option<DateTime<Utc>>,
}

impl ChangeReport {
    fn empty(change_id: Uuid) -> Self {
        Self {
            change_id,
            blast_radius: BTreeSet::new(),
            revoked: Vec::new(),
            global_cutoff: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.revoked.is_empty() && self.global_cutoff.is_none()
    }
}

/// A mutation's result together with its revocation report.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    pub value: T,
    pub report: ChangeReport,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Blast radius
// ═══════════════════════════════════════════════════════════════════════════════

/// Users holding any of `roles`, plus `users`.
///
/// Unknown roles fail with `NotFound`.
pub async fn resolve_blast_radius<T: ReadTx + ?Sized>(
    tx: &mut T,
    roles: &[RoleId],
    users: &[UserId],
) -> Result<BTreeSet<UserId>> {
    let mut radius: BTreeSet<UserId> = users.iter().copied().collect();
    for role_id in roles {
        radius.extend(tx.users_of_role(*role_id).await?);
    }
    Ok(radius)
}

fn ensure_mutable(kind: &str, name: &str, system: bool) -> Result<()> {
    if system {
        return Err(WardenError::protected(kind, name));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies RBAC mutations together with the token revocations they imply.
#[derive(Clone)]
pub struct ChangeOrchestrator {
    store: Arc<dyn RbacStore>,
    tracker: TokenInvalidationTracker,
    security: SecurityConfigStore,
}

impl ChangeOrchestrator {
    pub fn new(store: Arc<dyn RbacStore>, security: SecurityConfigStore) -> Self {
        Self {
            store,
            tracker: TokenInvalidationTracker::new(),
            security,
        }
    }

    /// Revoke the tokens of every user affected by changes to `changed_roles`
    /// and of `changed_users`.
    ///
    /// The mutation itself is assumed to be already persisted; an empty blast
    /// radius writes nothing.
    pub async fn apply_role_or_policy_change(
        &self,
        changed_roles: &[RoleId],
        changed_users: &[UserId],
    ) -> Result<ChangeReport> {
        let mut tx = self.store.write().await?;
        let outcome: Result<ChangeReport> = async {
            let change_id = Uuid::new_v4();
            debug!(
                %change_id,
                roles = changed_roles.len(),
                users = changed_users.len(),
                "Change received"
            );
            let radius = resolve_blast_radius(tx.as_mut(), changed_roles, changed_users).await?;
            self.revoke(tx.as_mut(), change_id, "external", radius).await
        }
        .await;
        finish(tx, outcome).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation (no revocation needed)
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tx = self.store.write().await?;
        let outcome = tx.create_user(user).await;
        let user = finish(tx, outcome).await?;
        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    pub async fn create_role(&self, role: NewRole) -> Result<Role> {
        let mut tx = self.store.write().await?;
        let outcome = tx.create_role(role).await;
        let role = finish(tx, outcome).await?;
        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn create_policy(&self, policy: NewPolicy) -> Result<Policy> {
        let mut tx = self.store.write().await?;
        let outcome = tx.create_policy(policy).await;
        let policy = finish(tx, outcome).await?;
        info!(policy_id = %policy.id, name = %policy.name, "Policy created");
        Ok(policy)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles and policies
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace a role's rules and revoke its holders.
    pub async fn update_role_rules(&self, role_id: RoleId, rules: Vec<Rule>) -> Result<Change<Role>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<Role>> = async {
            let change_id = Uuid::new_v4();
            let current = tx.get_role(role_id).await?;
            ensure_mutable("role", &current.name, current.system)?;

            let role = tx.update_role_rules(role_id, rules).await?;
            let radius = resolve_blast_radius(tx.as_mut(), &[role_id], &[]).await?;
            let report = self.revoke(tx.as_mut(), change_id, "role_updated", radius).await?;
            Ok(Change { value: role, report })
        }
        .await;
        finish(tx, outcome).await
    }

    /// Replace a policy's rule and revoke the holders of every role it is
    /// attached to.
    pub async fn update_policy_rule(&self, policy_id: PolicyId, rule: Rule) -> Result<Change<Policy>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<Policy>> = async {
            let change_id = Uuid::new_v4();
            let current = tx.get_policy(policy_id).await?;
            ensure_mutable("policy", &current.name, current.system)?;

            let policy = tx.update_policy_rule(policy_id, rule).await?;
            let roles = tx.roles_of_policy(policy_id).await?;
            let radius = resolve_blast_radius(tx.as_mut(), &roles, &[]).await?;
            let report = self.revoke(tx.as_mut(), change_id, "policy_updated", radius).await?;
            Ok(Change {
                value: policy,
                report,
            })
        }
        .await;
        finish(tx, outcome).await
    }

    /// Delete a role, revoking whoever held it.
    pub async fn delete_role(&self, role_id: RoleId) -> Result<Change<Role>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<Role>> = async {
            let change_id = Uuid::new_v4();
            let current = tx.get_role(role_id).await?;
            ensure_mutable("role", &current.name, current.system)?;

            // Holders must be read before the links disappear.
            let radius = resolve_blast_radius(tx.as_mut(), &[role_id], &[]).await?;
            let role = tx.delete_role(role_id).await?;
            let report = self.revoke(tx.as_mut(), change_id, "role_deleted", radius).await?;
            Ok(Change { value: role, report })
        }
        .await;
        finish(tx, outcome).await
    }

    /// Delete a policy, detaching it from every role and revoking those
    /// roles' holders.
    pub async fn delete_policy(&self, policy_id: PolicyId) -> Result<Change<Policy>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<Policy>> = async {
            let change_id = Uuid::new_v4();
            let current = tx.get_policy(policy_id).await?;
            ensure_mutable("policy", &current.name, current.system)?;

            let roles = tx.roles_of_policy(policy_id).await?;
            let radius = resolve_blast_radius(tx.as_mut(), &roles, &[]).await?;
            let policy = tx.delete_policy(policy_id).await?;
            let report = self.revoke(tx.as_mut(), change_id, "policy_deleted", radius).await?;
            Ok(Change {
                value: policy,
                report,
            })
        }
        .await;
        finish(tx, outcome).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Links
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a policy to a role. Re-linking an attached pair changes nothing
    /// and revokes nobody.
    pub async fn link_role_policy(&self, role_id: RoleId, policy_id: PolicyId) -> Result<Change<bool>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<bool>> = async {
            let change_id = Uuid::new_v4();
            let linked = tx.link_role_policy(role_id, policy_id).await?;
            let report = if linked {
                let radius = resolve_blast_radius(tx.as_mut(), &[role_id], &[]).await?;
                self.revoke(tx.as_mut(), change_id, "role_policy_linked", radius).await?
            } else {
                ChangeReport::empty(change_id)
            };
            Ok(Change {
                value: linked,
                report,
            })
        }
        .await;
        finish(tx, outcome).await
    }

    pub async fn unlink_role_policy(&self, role_id: RoleId, policy_id: PolicyId) -> Result<Change<()>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<()>> = async {
            let change_id = Uuid::new_v4();
            tx.unlink_role_policy(role_id, policy_id).await?;
            let radius = resolve_blast_radius(tx.as_mut(), &[role_id], &[]).await?;
            let report = self.revoke(tx.as_mut(), change_id, "role_policy_unlinked", radius).await?;
            Ok(Change { value: (), report })
        }
        .await;
        finish(tx, outcome).await
    }

    /// Grant a role to a user. Re-granting a held role revokes nobody.
    pub async fn link_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<Change<bool>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<bool>> = async {
            let change_id = Uuid::new_v4();
            let linked = tx.link_user_role(user_id, role_id).await?;
            let report = if linked {
                let radius = resolve_blast_radius(tx.as_mut(), &[], &[user_id]).await?;
                self.revoke(tx.as_mut(), change_id, "user_role_linked", radius).await?
            } else {
                ChangeReport::empty(change_id)
            };
            Ok(Change {
                value: linked,
                report,
            })
        }
        .await;
        finish(tx, outcome).await
    }

    pub async fn unlink_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<Change<()>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<()>> = async {
            let change_id = Uuid::new_v4();
            tx.unlink_user_role(user_id, role_id).await?;
            let radius = resolve_blast_radius(tx.as_mut(), &[], &[user_id]).await?;
            let report = self.revoke(tx.as_mut(), change_id, "user_role_unlinked", radius).await?;
            Ok(Change { value: (), report })
        }
        .await;
        finish(tx, outcome).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace a user's auth context; conditions may now evaluate differently.
    pub async fn update_user_auth_context(
        &self,
        user_id: UserId,
        auth_context: AuthContext,
    ) -> Result<Change<User>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<User>> = async {
            let change_id = Uuid::new_v4();
            let user = tx.update_user_auth_context(user_id, auth_context).await?;
            let radius = resolve_blast_radius(tx.as_mut(), &[], &[user_id]).await?;
            let report = self.revoke(tx.as_mut(), change_id, "auth_context_updated", radius).await?;
            Ok(Change { value: user, report })
        }
        .await;
        finish(tx, outcome).await
    }

    /// Delete a user. Its revocation record goes with it.
    pub async fn delete_user(&self, user_id: UserId) -> Result<User> {
        let mut tx = self.store.write().await?;
        let outcome: Result<User> = async {
            let current = tx.get_user(user_id).await?;
            ensure_mutable("user", &current.username, current.system)?;
            tx.delete_user(user_id).await
        }
        .await;
        let user = finish(tx, outcome).await?;
        counter!(CHANGES_TOTAL, "kind" => "user_deleted").increment(1);
        info!(user_id = %user.id, username = %user.username, "User deleted");
        Ok(user)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Security configuration
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a configuration patch; when required, invalidate every token in
    /// the same unit-of-work.
    pub async fn update_security_config(
        &self,
        patch: &serde_json::Value,
    ) -> Result<Change<ConfigUpdate>> {
        let mut tx = self.store.write().await?;
        let outcome: Result<Change<ConfigUpdate>> = async {
            let change_id = Uuid::new_v4();
            let update = self.security.update_config(tx.as_mut(), patch).await?;
            let mut report = ChangeReport::empty(change_id);
            if update.requires_revocation {
                let cutoff = self.tracker.mark_all_invalid(tx.as_mut(), Utc::now()).await?;
                report.global_cutoff = Some(cutoff);
            }
            Ok(Change {
                value: update,
                report,
            })
        }
        .await;
        let change = finish(tx, outcome).await?;
        if !change.report.is_noop() {
            counter!(CHANGES_TOTAL, "kind" => "security_config").increment(1);
        }
        Ok(change)
    }

    /// Drop revocation records that can only reject already-expired tokens.
    pub async fn prune_revocations(&self) -> Result<u64> {
        let mut tx = self.store.write().await?;
        let outcome: Result<u64> = async {
            let config = self.security.get_config(tx.as_mut()).await?;
            self.tracker
                .prune(tx.as_mut(), Utc::now(), config.token_lifetime())
                .await
        }
        .await;
        finish(tx, outcome).await
    }

    // ─────────────────────────────────────────────────────────────────────────

    async fn revoke<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        change_id: Uuid,
        kind: &'static str,
        radius: BTreeSet<UserId>,
    ) -> Result<ChangeReport> {
        if radius.is_empty() {
            debug!(%change_id, kind, "Empty blast radius, nothing to revoke");
            return Ok(ChangeReport::empty(change_id));
        }

        let revoked = self.tracker.mark_invalid(tx, &radius, Utc::now()).await?;
        counter!(CHANGES_TOTAL, "kind" => kind).increment(1);
        info!(
            %change_id,
            kind,
            users = radius.len(),
            "Change revoked affected tokens"
        );
        Ok(ChangeReport {
            change_id,
            blast_radius: radius,
            revoked,
            global_cutoff: None,
        })
    }
}
