//! In-memory implementation of the RBAC store.
//!
//! # Purpose
//! Holds all state in process memory. It exists for tests, embedding and
//! deployments where durability is not required. State is lost on restart.
//!
//! # Consistency
//! The committed state is an immutable snapshot behind an `Arc`:
//! - a read unit-of-work clones the `Arc` once and then works lock-free, so
//!   evaluations never block each other or a writer;
//! - a write unit-of-work takes the writer mutex, copies the snapshot, mutates
//!   the copy and publishes it on commit. Dropping it discards the copy.
//!
//! # Fault injection
//! [`MemoryStore::inject_fault`] makes chosen operations fail with
//! `StorageError`, which lets callers exercise their rollback paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::{RbacStore, ReadTx, WriteTx};
use crate::error::{Result, WardenError};
use crate::rbac::{
    AuthContext, NewPolicy, NewRole, NewUser, Policy, PolicyId, Role, RoleId, Rule, User, UserId,
};
use crate::revocation::RevocationRecord;
use crate::security::SecurityConfig;

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    RaiseRevocation,
    RaiseGlobalRevocation,
    SaveSecurityConfig,
    Commit,
}

type Faults = Arc<Mutex<HashSet<Fault>>>;

fn check_fault(faults: &Faults, fault: Fault) -> Result<()> {
    if faults.lock().contains(&fault) {
        return Err(WardenError::storage(format!("Injected fault: {:?}", fault)));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    roles: BTreeMap<RoleId, Role>,
    policies: BTreeMap<PolicyId, Policy>,
    /// Link pairs in insertion order.
    user_roles: Vec<(UserId, RoleId)>,
    role_policies: Vec<(RoleId, PolicyId)>,
    revocations: HashMap<UserId, DateTime<Utc>>,
    global_revocation: Option<DateTime<Utc>>,
    security_config: Option<SecurityConfig>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: UserId) -> Result<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| WardenError::not_found("user", id))
    }

    fn role(&self, id: RoleId) -> Result<&Role> {
        self.roles
            .get(&id)
            .ok_or_else(|| WardenError::not_found("role", id))
    }

    fn policy(&self, id: PolicyId) -> Result<&Policy> {
        self.policies
            .get(&id)
            .ok_or_else(|| WardenError::not_found("policy", id))
    }

    fn user_by_name(&self, username: &str) -> Result<&User> {
        self.users
            .values()
            .find(|u| u.username == username)
            .ok_or_else(|| WardenError::not_found("user", username))
    }

    fn role_by_name(&self, name: &str) -> Result<&Role> {
        self.roles
            .values()
            .find(|r| r.name == name)
            .ok_or_else(|| WardenError::not_found("role", name))
    }

    fn policy_by_name(&self, name: &str) -> Result<&Policy> {
        self.policies
            .values()
            .find(|p| p.name == name)
            .ok_or_else(|| WardenError::not_found("policy", name))
    }

    fn roles_of_user(&self, user_id: UserId) -> Result<Vec<Role>> {
        self.user(user_id)?;
        self.user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| self.role(*r).cloned())
            .collect()
    }

    fn policies_of_role(&self, role_id: RoleId) -> Result<Vec<Policy>> {
        self.role(role_id)?;
        self.role_policies
            .iter()
            .filter(|(r, _)| *r == role_id)
            .map(|(_, p)| self.policy(*p).cloned())
            .collect()
    }

    fn users_of_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        self.role(role_id)?;
        Ok(self
            .user_roles
            .iter()
            .filter(|(_, r)| *r == role_id)
            .map(|(u, _)| *u)
            .collect())
    }

    fn roles_of_policy(&self, policy_id: PolicyId) -> Result<Vec<RoleId>> {
        self.policy(policy_id)?;
        Ok(self
            .role_policies
            .iter()
            .filter(|(_, p)| *p == policy_id)
            .map(|(r, _)| *r)
            .collect())
    }

    fn revocation(&self, user_id: UserId) -> Option<RevocationRecord> {
        self.revocations
            .get(&user_id)
            .map(|not_before| RevocationRecord {
                user_id,
                not_before: *not_before,
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot-isolated in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<Arc<MemoryState>>>,
    writer: Arc<tokio::sync::Mutex<()>>,
    faults: Faults,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `fault` operation fail until [`clear_faults`](Self::clear_faults).
    pub fn inject_fault(&self, fault: Fault) {
        self.faults.lock().insert(fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn snapshot(&self) -> Arc<MemoryState> {
        self.committed.read().clone()
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn read(&self) -> Result<Box<dyn ReadTx>> {
        Ok(Box::new(MemoryReadTx {
            state: self.snapshot(),
        }))
    }

    async fn write(&self) -> Result<Box<dyn WriteTx>> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let working = (*self.snapshot()).clone();
        Ok(Box::new(MemoryWriteTx {
            _guard: guard,
            committed: Arc::clone(&self.committed),
            working,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Units of work
// ═══════════════════════════════════════════════════════════════════════════════

/// Read unit-of-work over a committed snapshot.
pub struct MemoryReadTx {
    state: Arc<MemoryState>,
}

/// Write unit-of-work; holds the writer lock until committed or dropped.
pub struct MemoryWriteTx {
    _guard: OwnedMutexGuard<()>,
    committed: Arc<RwLock<Arc<MemoryState>>>,
    working: MemoryState,
    faults: Faults,
}

macro_rules! impl_read_tx {
    ($ty:ty, $state:ident) => {
        #[async_trait]
        impl ReadTx for $ty {
            async fn get_user(&mut self, id: UserId) -> Result<User> {
                self.$state.user(id).cloned()
            }

            async fn get_user_by_name(&mut self, username: &str) -> Result<User> {
                self.$state.user_by_name(username).cloned()
            }

            async fn list_users(&mut self) -> Result<Vec<User>> {
                Ok(self.$state.users.values().cloned().collect())
            }

            async fn get_role(&mut self, id: RoleId) -> Result<Role> {
                self.$state.role(id).cloned()
            }

            async fn get_role_by_name(&mut self, name: &str) -> Result<Role> {
                self.$state.role_by_name(name).cloned()
            }

            async fn list_roles(&mut self) -> Result<Vec<Role>> {
                Ok(self.$state.roles.values().cloned().collect())
            }

            async fn get_policy(&mut self, id: PolicyId) -> Result<Policy> {
                self.$state.policy(id).cloned()
            }

            async fn get_policy_by_name(&mut self, name: &str) -> Result<Policy> {
                self.$state.policy_by_name(name).cloned()
            }

            async fn list_policies(&mut self) -> Result<Vec<Policy>> {
                Ok(self.$state.policies.values().cloned().collect())
            }

            async fn roles_of_user(&mut self, user_id: UserId) -> Result<Vec<Role>> {
                self.$state.roles_of_user(user_id)
            }

            async fn policies_of_role(&mut self, role_id: RoleId) -> Result<Vec<Policy>> {
                self.$state.policies_of_role(role_id)
            }

            async fn users_of_role(&mut self, role_id: RoleId) -> Result<Vec<UserId>> {
                self.$state.users_of_role(role_id)
            }

            async fn roles_of_policy(&mut self, policy_id: PolicyId) -> Result<Vec<RoleId>> {
                self.$state.roles_of_policy(policy_id)
            }

            async fn revocation(&mut self, user_id: UserId) -> Result<Option<RevocationRecord>> {
                Ok(self.$state.revocation(user_id))
            }

            async fn global_revocation(&mut self) -> Result<Option<DateTime<Utc>>> {
                Ok(self.$state.global_revocation)
            }

            async fn security_config(&mut self) -> Result<Option<SecurityConfig>> {
                Ok(self.$state.security_config.clone())
            }
        }
    };
}

impl_read_tx!(MemoryReadTx, state);
impl_read_tx!(MemoryWriteTx, working);

#[async_trait]
impl WriteTx for MemoryWriteTx {
    async fn create_user(&mut self, user: NewUser) -> Result<User> {
        user.validate()?;
        let state = &mut self.working;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(WardenError::conflict("user", &user.username));
        }
        let created = User {
            id: UserId::new(state.next_id()),
            username: user.username,
            auth_context: user.auth_context,
            system: user.system,
            created_at: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_role(&mut self, role: NewRole) -> Result<Role> {
        role.validate()?;
        let state = &mut self.working;
        if state.roles.values().any(|r| r.name == role.name) {
            return Err(WardenError::conflict("role", &role.name));
        }
        let now = Utc::now();
        let created = Role {
            id: RoleId::new(state.next_id()),
            name: role.name,
            rules: role.rules,
            system: role.system,
            created_at: now,
            updated_at: now,
        };
        state.roles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_policy(&mut self, policy: NewPolicy) -> Result<Policy> {
        policy.validate()?;
        let state = &mut self.working;
        if state.policies.values().any(|p| p.name == policy.name) {
            return Err(WardenError::conflict("policy", &policy.name));
        }
        let now = Utc::now();
        let created = Policy {
            id: PolicyId::new(state.next_id()),
            name: policy.name,
            rule: policy.rule,
            system: policy.system,
            created_at: now,
            updated_at: now,
        };
        state.policies.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user_auth_context(
        &mut self,
        id: UserId,
        auth_context: AuthContext,
    ) -> Result<User> {
        let user = self
            .working
            .users
            .get_mut(&id)
            .ok_or_else(|| WardenError::not_found("user", id))?;
        user.auth_context = auth_context;
        Ok(user.clone())
    }

    async fn update_role_rules(&mut self, id: RoleId, rules: Vec<Rule>) -> Result<Role> {
        let role = self
            .working
            .roles
            .get_mut(&id)
            .ok_or_else(|| WardenError::not_found("role", id))?;
        role.rules = rules;
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn update_policy_rule(&mut self, id: PolicyId, rule: Rule) -> Result<Policy> {
        let policy = self
            .working
            .policies
            .get_mut(&id)
            .ok_or_else(|| WardenError::not_found("policy", id))?;
        policy.rule = rule;
        policy.updated_at = Utc::now();
        Ok(policy.clone())
    }

    async fn delete_user(&mut self, id: UserId) -> Result<User> {
        let state = &mut self.working;
        let user = state
            .users
            .remove(&id)
            .ok_or_else(|| WardenError::not_found("user", id))?;
        state.user_roles.retain(|(u, _)| *u != id);
        state.revocations.remove(&id);
        Ok(user)
    }

    async fn delete_role(&mut self, id: RoleId) -> Result<Role> {
        let state = &mut self.working;
        let role = state
            .roles
            .remove(&id)
            .ok_or_else(|| WardenError::not_found("role", id))?;
        state.user_roles.retain(|(_, r)| *r != id);
        state.role_policies.retain(|(r, _)| *r != id);
        Ok(role)
    }

    async fn delete_policy(&mut self, id: PolicyId) -> Result<Policy> {
        let state = &mut self.working;
        let policy = state
            .policies
            .remove(&id)
            .ok_or_else(|| WardenError::not_found("policy", id))?;
        state.role_policies.retain(|(_, p)| *p != id);
        Ok(policy)
    }

    async fn link_user_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        let state = &mut self.working;
        state.user(user_id)?;
        state.role(role_id)?;
        if state.user_roles.contains(&(user_id, role_id)) {
            return Ok(false);
        }
        state.user_roles.push((user_id, role_id));
        Ok(true)
    }

    async fn unlink_user_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let state = &mut self.working;
        let position = state
            .user_roles
            .iter()
            .position(|pair| *pair == (user_id, role_id))
            .ok_or_else(|| {
                WardenError::not_found("user_role", format!("{}:{}", user_id, role_id))
            })?;
        state.user_roles.remove(position);
        Ok(())
    }

    async fn link_role_policy(&mut self, role_id: RoleId, policy_id: PolicyId) -> Result<bool> {
        let state = &mut self.working;
        state.role(role_id)?;
        state.policy(policy_id)?;
        if state.role_policies.contains(&(role_id, policy_id)) {
            return Ok(false);
        }
        state.role_policies.push((role_id, policy_id));
        Ok(true)
    }

    async fn unlink_role_policy(&mut self, role_id: RoleId, policy_id: PolicyId) -> Result<()> {
        let state = &mut self.working;
        let position = state
            .role_policies
            .iter()
            .position(|pair| *pair == (role_id, policy_id))
            .ok_or_else(|| {
                WardenError::not_found("role_policy", format!("{}:{}", role_id, policy_id))
            })?;
        state.role_policies.remove(position);
        Ok(())
    }

    async fn raise_revocation(
        &mut self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<RevocationRecord> {
        check_fault(&self.faults, Fault::RaiseRevocation)?;
        self.working.user(user_id)?;
        let not_before = self
            .working
            .revocations
            .entry(user_id)
            .and_modify(|current| *current = (*current).max(at))
            .or_insert(at);
        Ok(RevocationRecord {
            user_id,
            not_before: *not_before,
        })
    }

    async fn raise_global_revocation(&mut self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        check_fault(&self.faults, Fault::RaiseGlobalRevocation)?;
        let cutoff = match self.working.global_revocation {
            Some(current) => current.max(at),
            None => at,
        };
        self.working.global_revocation = Some(cutoff);
        Ok(cutoff)
    }

    async fn prune_revocations(&mut self, before: DateTime<Utc>) -> Result<u64> {
        let revocations = &mut self.working.revocations;
        let len = revocations.len();
        revocations.retain(|_, not_before| *not_before >= before);
        Ok((len - revocations.len()) as u64)
    }

    async fn save_security_config(&mut self, config: &SecurityConfig) -> Result<()> {
        check_fault(&self.faults, Fault::SaveSecurityConfig)?;
        self.working.security_config = Some(config.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        check_fault(&self.faults, Fault::Commit)?;
        let this = *self;
        *this.committed.write() = Arc::new(this.working);
        debug!("Memory store transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("Memory store transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;

    async fn seed(store: &MemoryStore) -> (UserId, RoleId, PolicyId) {
        let mut tx = store.write().await.unwrap();
        let user = tx.create_user(NewUser::new("alice")).await.unwrap();
        let role = tx
            .create_role(NewRole::new("readers", vec![Rule::allow("logs/*", "read").unwrap()]))
            .await
            .unwrap();
        let policy = tx
            .create_policy(NewPolicy::new("p1", Rule::deny("logs/secret", "read").unwrap()))
            .await
            .unwrap();
        tx.link_user_role(user.id, role.id).await.unwrap();
        tx.link_role_policy(role.id, policy.id).await.unwrap();
        tx.commit().await.unwrap();
        (user.id, role.id, policy.id)
    }

    #[tokio::test]
    async fn test_linking_is_idempotent() {
        let store = MemoryStore::new();
        let (_, role, policy) = seed(&store).await;

        let mut tx = store.write().await.unwrap();
        assert!(!tx.link_role_policy(role, policy).await.unwrap());
        assert_eq!(tx.policies_of_role(role).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let store = MemoryStore::new();
        seed(&store).await;

        let mut tx = store.write().await.unwrap();
        let err = tx.create_role(NewRole::new("readers", Vec::new())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.write().await.unwrap();
            tx.create_user(NewUser::new("ghost")).await.unwrap();
        }
        let mut read = store.read().await.unwrap();
        assert_eq!(
            read.get_user_by_name("ghost").await.unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn test_reader_keeps_its_snapshot() {
        let store = MemoryStore::new();
        let (user, _, _) = seed(&store).await;
        let mut before = store.read().await.unwrap();

        let mut tx = store.write().await.unwrap();
        tx.delete_user(user).await.unwrap();
        tx.commit().await.unwrap();

        assert!(before.get_user(user).await.is_ok());
        let mut after = store.read().await.unwrap();
        assert!(after.get_user(user).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_policy_detaches_links() {
        let store = MemoryStore::new();
        let (_, role, policy) = seed(&store).await;

        let mut tx = store.write().await.unwrap();
        tx.delete_policy(policy).await.unwrap();
        assert!(tx.policies_of_role(role).await.unwrap().is_empty());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_revocation_is_monotonic() {
        let store = MemoryStore::new();
        let (user, _, _) = seed(&store).await;
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(10);

        let mut tx = store.write().await.unwrap();
        tx.raise_revocation(user, t2).await.unwrap();
        let record = tx.raise_revocation(user, t1).await.unwrap();
        assert_eq!(record.not_before, t2);
    }

    #[tokio::test]
    async fn test_unlink_missing_link_is_not_found() {
        let store = MemoryStore::new();
        let (user, role, _) = seed(&store).await;

        let mut tx = store.write().await.unwrap();
        tx.unlink_user_role(user, role).await.unwrap();
        let err = tx.unlink_user_role(user, role).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_injected_commit_fault_discards_writes() {
        let store = MemoryStore::new();
        store.inject_fault(Fault::Commit);

        let mut tx = store.write().await.unwrap();
        tx.create_user(NewUser::new("bob")).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StorageError);

        store.clear_faults();
        let mut read = store.read().await.unwrap();
        assert!(read.list_users().await.unwrap().is_empty());
    }
}
