//! Access-control facade used by the API layer.
//!
//! `AccessControl` wires the store, the security configuration, the token
//! tracker and the change orchestrator together. Authorization checks open
//! one read unit-of-work each, so they run concurrently with each other and
//! with writers.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{SecurityDefaults, WardenConfig};
use crate::error::{Result, WardenError};
use crate::orchestrator::{Change, ChangeOrchestrator, ChangeReport};
use crate::rbac::{explain, AccessRequest, DefaultSeed, Decision, RoleId, Rule, SeedReport, UserId, Verdict};
use crate::revocation::TokenInvalidationTracker;
use crate::security::{ConfigUpdate, SecurityConfig, SecurityConfigStore};
use crate::store::{finish, MemoryStore, PgStore, RbacStore, ReadTx};
use crate::telemetry::metrics::DECISIONS_TOTAL;

/// Entry point for authorization checks and RBAC administration.
#[derive(Clone)]
pub struct AccessControl {
    store: Arc<dyn RbacStore>,
    security: SecurityConfigStore,
    tracker: TokenInvalidationTracker,
    orchestrator: ChangeOrchestrator,
}

impl AccessControl {
    pub fn new(store: Arc<dyn RbacStore>, defaults: SecurityDefaults) -> Self {
        let security = SecurityConfigStore::new(defaults);
        Self {
            orchestrator: ChangeOrchestrator::new(Arc::clone(&store), security.clone()),
            store,
            security,
            tracker: TokenInvalidationTracker::new(),
        }
    }

    /// An engine over a fresh [`MemoryStore`].
    pub fn in_memory(defaults: SecurityDefaults) -> Self {
        Self::new(Arc::new(MemoryStore::new()), defaults)
    }

    /// Build the engine described by `config`: PostgreSQL when a database is
    /// configured, memory otherwise.
    pub async fn from_config(config: &WardenConfig) -> Result<Self> {
        let store: Arc<dyn RbacStore> = match &config.database {
            Some(database) => Arc::new(PgStore::connect(database).await?),
            None => Arc::new(MemoryStore::new()),
        };
        info!(backend = store.backend_name(), "Access control engine ready");
        Ok(Self::new(store, config.security.clone()))
    }

    pub fn store(&self) -> &Arc<dyn RbacStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &ChangeOrchestrator {
        &self.orchestrator
    }

    /// Apply `seed` unless the store already holds roles.
    ///
    /// Returns `None` when the store was already initialized. A seed whose
    /// relationships name unknown records is rejected before any write.
    pub async fn initialize(&self, seed: &DefaultSeed) -> Result<Option<SeedReport>> {
        seed.validate().inspect_err(WardenError::log)?;
        let mut tx = self.store.write().await?;
        let outcome: Result<Option<SeedReport>> = async {
            if !tx.list_roles().await?.is_empty() {
                debug!("Store already initialized, skipping default seed");
                return Ok(None);
            }
            seed.apply(tx.as_mut()).await.map(Some)
        }
        .await;
        finish(tx, outcome).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read path
    // ─────────────────────────────────────────────────────────────────────────

    /// Decide whether `user_id` may perform `request`.
    pub async fn evaluate(&self, user_id: UserId, request: &AccessRequest) -> Result<Decision> {
        Ok(self.explain(user_id, request).await?.decision)
    }

    /// Like [`evaluate`](Self::evaluate), also reporting the deciding rule.
    #[instrument(skip(self, request), fields(request = %request))]
    pub async fn explain(&self, user_id: UserId, request: &AccessRequest) -> Result<Verdict> {
        self.decide(user_id, request)
            .await
            .inspect_err(WardenError::log)
    }

    async fn decide(&self, user_id: UserId, request: &AccessRequest) -> Result<Verdict> {
        let mut tx = self.store.read().await?;
        let user = tx.get_user(user_id).await?;
        let rules = effective_rules(tx.as_mut(), user_id).await?;
        let config = self.security.get_config(tx.as_mut()).await?;
        drop(tx);

        let verdict = explain(&rules, request, config.mode, &user.auth_context);
        counter!(
            DECISIONS_TOTAL,
            "mode" => config.mode.as_str(),
            "decision" => verdict.decision.as_str()
        )
        .increment(1);
        debug!(
            decision = verdict.decision.as_str(),
            mode = %config.mode,
            rules = rules.len(),
            reason = %verdict.reason,
            "Authorization decided"
        );
        Ok(verdict)
    }

    /// The user's rules in evaluation order: each held role's own rules
    /// followed by the rules of its policies.
    pub async fn effective_rules(&self, user_id: UserId) -> Result<Vec<Rule>> {
        let outcome: Result<Vec<Rule>> = async {
            let mut tx = self.store.read().await?;
            effective_rules(tx.as_mut(), user_id).await
        }
        .await;
        outcome.inspect_err(WardenError::log)
    }

    pub async fn is_token_valid(&self, user_id: UserId, issued_at: DateTime<Utc>) -> Result<bool> {
        let outcome: Result<bool> = async {
            let mut tx = self.store.read().await?;
            self.tracker.is_token_valid(tx.as_mut(), user_id, issued_at).await
        }
        .await;
        outcome.inspect_err(WardenError::log)
    }

    pub async fn get_config(&self) -> Result<SecurityConfig> {
        let outcome: Result<SecurityConfig> = async {
            let mut tx = self.store.read().await?;
            self.security.get_config(tx.as_mut()).await
        }
        .await;
        outcome.inspect_err(WardenError::log)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write path
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn apply_role_or_policy_change(
        &self,
        changed_roles: &[RoleId],
        changed_users: &[UserId],
    ) -> Result<ChangeReport> {
        self.orchestrator
            .apply_role_or_policy_change(changed_roles, changed_users)
            .await
    }

    /// Apply a security configuration patch, revoking all tokens when the
    /// patch touches a security-relevant key.
    pub async fn update_config(&self, patch: &serde_json::Value) -> Result<ConfigUpdate> {
        let Change { value, .. } = self.orchestrator.update_security_config(patch).await?;
        Ok(value)
    }
}

async fn effective_rules<T: ReadTx + ?Sized>(tx: &mut T, user_id: UserId) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for role in tx.roles_of_user(user_id).await? {
        rules.extend(role.rules);
        for policy in tx.policies_of_role(role.id).await? {
            rules.push(policy.rule);
        }
    }
    Ok(rules)
}
