//! End-to-end tests for the access-control engine over the memory store.
//!
//! Tests cover:
//! - Authorization scenarios through stored roles and policies
//! - Blast-radius revocation on role and policy changes
//! - Policy deletion detaching every link
//! - Security configuration updates and the global cutoff
//! - Pruning of expired revocation records
//! - Rollback when revocation fails
//! - Default seed application
//! - Concurrent evaluation

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use warden_core::config::SecurityDefaults;
use warden_core::error::ErrorCode;
use warden_core::rbac::{
    AccessRequest, Decision, DefaultSeed, Mode, NewPolicy, NewRole, NewUser, Rule, UserId,
};
use warden_core::store::{Fault, MemoryStore, RbacStore, ReadTx, WriteTx};
use warden_core::AccessControl;

fn engine_over(store: &MemoryStore) -> AccessControl {
    AccessControl::new(Arc::new(store.clone()), SecurityDefaults::default())
}

async fn user(engine: &AccessControl, name: &str) -> UserId {
    engine
        .orchestrator()
        .create_user(NewUser::new(name))
        .await
        .unwrap()
        .id
}

// ============================================================================
// Authorization Scenarios
// ============================================================================

#[tokio::test]
async fn test_readonly_logs_scenario() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let orch = engine.orchestrator();
    let u = user(&engine, "u").await;
    let readonly = orch
        .create_role(NewRole::new("readonly", vec![Rule::allow("logs/*", "read").unwrap()]))
        .await
        .unwrap();
    orch.link_user_role(u, readonly.id).await.unwrap();

    let read = AccessRequest::new("logs/a", "read");
    let write = AccessRequest::new("logs/a", "write");
    assert_eq!(engine.evaluate(u, &read).await.unwrap(), Decision::Allow);
    assert_eq!(engine.evaluate(u, &write).await.unwrap(), Decision::Deny);
}

#[tokio::test]
async fn test_user_without_roles_follows_mode_default() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let u = user(&engine, "nobody").await;
    let request = AccessRequest::new("agent:1", "agent:read");

    assert_eq!(engine.evaluate(u, &request).await.unwrap(), Decision::Deny);

    let black = AccessControl::in_memory(SecurityDefaults {
        mode: Mode::Black,
        ..SecurityDefaults::default()
    });
    let u = user(&black, "nobody").await;
    assert_eq!(black.evaluate(u, &request).await.unwrap(), Decision::Allow);
}

#[tokio::test]
async fn test_policy_deny_overrides_role_allow_in_white_mode() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let orch = engine.orchestrator();
    let u = user(&engine, "ops").await;
    let role = orch
        .create_role(NewRole::new("ops", vec![Rule::allow("logs/**", "read").unwrap()]))
        .await
        .unwrap();
    let policy = orch
        .create_policy(NewPolicy::new("no_audit", Rule::deny("logs/audit/*", "read").unwrap()))
        .await
        .unwrap();
    orch.link_role_policy(role.id, policy.id).await.unwrap();
    orch.link_user_role(u, role.id).await.unwrap();

    let audit = AccessRequest::new("logs/audit/2024", "read");
    let app = AccessRequest::new("logs/app/2024", "read");
    assert!(engine.evaluate(u, &audit).await.unwrap().is_denied());
    assert!(engine.evaluate(u, &app).await.unwrap().is_allowed());
}

// ============================================================================
// Blast Radius
// ============================================================================

#[tokio::test]
async fn test_policy_change_revokes_role_holders_only() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let orch = engine.orchestrator();

    let a = user(&engine, "a").await;
    let b = user(&engine, "b").await;
    let c = user(&engine, "c").await;
    let admin = orch.create_role(NewRole::new("admin", Vec::new())).await.unwrap();
    let other = orch.create_role(NewRole::new("other", Vec::new())).await.unwrap();
    let p1 = orch
        .create_policy(NewPolicy::new("p1", Rule::allow("agent:*", "agent:read").unwrap()))
        .await
        .unwrap();
    orch.link_role_policy(admin.id, p1.id).await.unwrap();
    orch.link_user_role(a, admin.id).await.unwrap();
    orch.link_user_role(b, admin.id).await.unwrap();
    orch.link_user_role(c, other.id).await.unwrap();

    let mut tx = store.read().await.unwrap();
    let c_before = tx.revocation(c).await.unwrap();
    drop(tx);

    let issued = Utc::now() - Duration::seconds(1);
    let change = orch
        .update_policy_rule(p1.id, Rule::allow("agent:*", "agent:*").unwrap())
        .await
        .unwrap();
    assert_eq!(change.report.blast_radius.iter().copied().collect::<Vec<_>>(), vec![a, b]);

    let mut tx = store.read().await.unwrap();
    for holder in [a, b] {
        let record = tx.revocation(holder).await.unwrap().unwrap();
        assert!(record.not_before > issued);
    }
    assert_eq!(tx.revocation(c).await.unwrap(), c_before);
    drop(tx);

    assert!(!engine.is_token_valid(a, issued).await.unwrap());
    assert!(engine.is_token_valid(a, Utc::now() + Duration::seconds(1)).await.unwrap());
}

#[tokio::test]
async fn test_explicit_change_resolves_union_of_roles_and_users() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let orch = engine.orchestrator();
    let a = user(&engine, "a").await;
    let b = user(&engine, "b").await;
    let role = orch.create_role(NewRole::new("admin", Vec::new())).await.unwrap();
    orch.link_user_role(a, role.id).await.unwrap();

    let report = engine
        .apply_role_or_policy_change(&[role.id], &[a, b])
        .await
        .unwrap();
    assert_eq!(report.blast_radius.len(), 2);
    assert_eq!(report.revoked.len(), 2);
}

#[tokio::test]
async fn test_delete_role_revokes_former_holders() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let orch = engine.orchestrator();
    let a = user(&engine, "a").await;
    let role = orch
        .create_role(NewRole::new("temp", vec![Rule::allow("**", "*").unwrap()]))
        .await
        .unwrap();
    orch.link_user_role(a, role.id).await.unwrap();

    let change = orch.delete_role(role.id).await.unwrap();
    assert!(change.report.blast_radius.contains(&a));
    assert!(engine.effective_rules(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_revocation_is_monotonic() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let a = user(&engine, "a").await;
    let t1 = Utc::now();
    let t2 = t1 + Duration::seconds(30);

    for at in [t2, t1] {
        let mut tx = store.write().await.unwrap();
        tx.raise_revocation(a, at).await.unwrap();
        tx.commit().await.unwrap();
    }

    let mut tx = store.read().await.unwrap();
    assert_eq!(tx.revocation(a).await.unwrap().unwrap().not_before, t2);
}

// ============================================================================
// Links
// ============================================================================

#[tokio::test]
async fn test_relinking_leaves_one_link() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let orch = engine.orchestrator();
    let role = orch.create_role(NewRole::new("r", Vec::new())).await.unwrap();
    let policy = orch
        .create_policy(NewPolicy::new("p", Rule::allow("x", "y").unwrap()))
        .await
        .unwrap();

    assert!(orch.link_role_policy(role.id, policy.id).await.unwrap().value);
    assert!(!orch.link_role_policy(role.id, policy.id).await.unwrap().value);

    let mut tx = store.read().await.unwrap();
    assert_eq!(tx.policies_of_role(role.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deleting_policy_detaches_both_roles() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let orch = engine.orchestrator();
    let u = user(&engine, "u").await;
    let r1 = orch
        .create_role(NewRole::new("r1", vec![Rule::allow("logs/*", "read").unwrap()]))
        .await
        .unwrap();
    let r2 = orch.create_role(NewRole::new("r2", Vec::new())).await.unwrap();
    let policy = orch
        .create_policy(NewPolicy::new("shared", Rule::allow("agent:*", "agent:read").unwrap()))
        .await
        .unwrap();
    orch.link_role_policy(r1.id, policy.id).await.unwrap();
    orch.link_role_policy(r2.id, policy.id).await.unwrap();
    orch.link_user_role(u, r1.id).await.unwrap();
    orch.link_user_role(u, r2.id).await.unwrap();

    let change = orch.delete_policy(policy.id).await.unwrap();
    assert!(change.report.blast_radius.contains(&u));

    let mut tx = store.read().await.unwrap();
    assert!(tx.policies_of_role(r1.id).await.unwrap().is_empty());
    assert!(tx.policies_of_role(r2.id).await.unwrap().is_empty());
    assert_eq!(tx.get_role(r1.id).await.unwrap().rules.len(), 1);
    assert!(tx.get_role(r2.id).await.unwrap().rules.is_empty());
    drop(tx);

    let rules = engine.effective_rules(u).await.unwrap();
    assert_eq!(rules, vec![Rule::allow("logs/*", "read").unwrap()]);
}

// ============================================================================
// Security Configuration
// ============================================================================

#[tokio::test]
async fn test_update_config_revocation_flag() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());

    let update = engine.update_config(&json!({"mode": "black"})).await.unwrap();
    assert!(update.requires_revocation);
    assert_eq!(update.config.version, 1);

    let update = engine.update_config(&json!({"banner_text": "x"})).await.unwrap();
    assert!(!update.requires_revocation);
    assert_eq!(update.config.version, 2);
    assert_eq!(update.config.mode, Mode::Black);
}

#[tokio::test]
async fn test_mode_flip_invalidates_every_token() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let a = user(&engine, "a").await;
    let issued = Utc::now() - Duration::seconds(1);
    assert!(engine.is_token_valid(a, issued).await.unwrap());

    let change = engine
        .orchestrator()
        .update_security_config(&json!({"rbac_mode": "black"}))
        .await
        .unwrap();
    assert!(change.report.global_cutoff.is_some());
    assert!(!engine.is_token_valid(a, issued).await.unwrap());
}

#[tokio::test]
async fn test_rejected_patch_changes_nothing() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());

    let err = engine.update_config(&json!({"mode": "grey"})).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMode);
    let err = engine.update_config(&json!({"unknown": 1})).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let config = engine.get_config().await.unwrap();
    assert_eq!(config.version, 0);
    assert_eq!(config.mode, Mode::White);
}

#[tokio::test]
async fn test_oversized_timeout_leaves_pruning_working() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let err = engine
        .update_config(&json!({"auth_token_exp_timeout": 10_000_000_000_000u64}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert_eq!(engine.get_config().await.unwrap().version, 0);

    assert_eq!(engine.orchestrator().prune_revocations().await.unwrap(), 0);
}

// ============================================================================
// Revocation Pruning
// ============================================================================

#[tokio::test]
async fn test_prune_removes_only_expired_records() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let stale = user(&engine, "stale").await;
    let recent = user(&engine, "recent").await;
    let now = Utc::now();

    let mut tx = store.write().await.unwrap();
    tx.raise_revocation(stale, now - Duration::hours(2)).await.unwrap();
    tx.raise_revocation(recent, now - Duration::minutes(1)).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(engine.orchestrator().prune_revocations().await.unwrap(), 1);

    let mut tx = store.read().await.unwrap();
    assert!(tx.revocation(stale).await.unwrap().is_none());
    assert!(tx.revocation(recent).await.unwrap().is_some());
    drop(tx);

    // A pruned cutoff only rejected tokens that have already expired.
    assert!(engine.is_token_valid(stale, now - Duration::minutes(1)).await.unwrap());
    assert!(!engine.is_token_valid(recent, now - Duration::minutes(2)).await.unwrap());
}

// ============================================================================
// Failure Atomicity
// ============================================================================

#[tokio::test]
async fn test_failed_revocation_leaves_store_untouched() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let orch = engine.orchestrator();
    let a = user(&engine, "a").await;
    let role = orch.create_role(NewRole::new("r", Vec::new())).await.unwrap();
    let policy = orch
        .create_policy(NewPolicy::new("p", Rule::allow("logs/*", "read").unwrap()))
        .await
        .unwrap();
    orch.link_user_role(a, role.id).await.unwrap();

    let mut tx = store.read().await.unwrap();
    let before = tx.revocation(a).await.unwrap();
    drop(tx);

    store.inject_fault(Fault::RaiseRevocation);
    let err = orch.link_role_policy(role.id, policy.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StorageError);
    store.clear_faults();

    let mut tx = store.read().await.unwrap();
    assert!(tx.policies_of_role(role.id).await.unwrap().is_empty());
    assert_eq!(tx.revocation(a).await.unwrap(), before);
}

#[tokio::test]
async fn test_failed_global_revocation_keeps_old_config() {
    let store = MemoryStore::new();
    let engine = engine_over(&store);

    store.inject_fault(Fault::RaiseGlobalRevocation);
    assert!(engine.update_config(&json!({"mode": "black"})).await.is_err());
    store.clear_faults();

    assert_eq!(engine.get_config().await.unwrap().mode, Mode::White);
}

// ============================================================================
// Default Seed
// ============================================================================

#[tokio::test]
async fn test_seed_applies_once() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let seed = DefaultSeed::builtin().unwrap();

    let report = engine.initialize(&seed).await.unwrap().unwrap();
    assert_eq!(report.roles, 4);
    assert!(engine.initialize(&seed).await.unwrap().is_none());

    let mut tx = engine.store().read().await.unwrap();
    let wazuh = tx.get_user_by_name("wazuh").await.unwrap();
    assert!(wazuh.system);
    drop(tx);

    let request = AccessRequest::new("agent:id:1", "agent:delete");
    assert!(engine.evaluate(wazuh.id, &request).await.unwrap().is_allowed());

    let err = engine.orchestrator().delete_user(wazuh.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ProtectedResource);
}

#[tokio::test]
async fn test_dangling_seed_is_rejected_before_writing() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let mut seed = DefaultSeed::builtin().unwrap();
    seed.relationships
        .users
        .insert("nobody".into(), vec!["administrator".into()]);

    let err = engine.initialize(&seed).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.details().entity_type.as_deref(), Some("user"));

    let mut tx = engine.store().read().await.unwrap();
    assert!(tx.list_roles().await.unwrap().is_empty());
    assert!(tx.list_users().await.unwrap().is_empty());
    drop(tx);

    let report = engine.initialize(&DefaultSeed::builtin().unwrap()).await.unwrap();
    assert!(report.is_some());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_evaluations() {
    let engine = AccessControl::in_memory(SecurityDefaults::default());
    let orch = engine.orchestrator();
    let u = user(&engine, "u").await;
    let role = orch
        .create_role(NewRole::new("reader", vec![Rule::allow("logs/*", "read").unwrap()]))
        .await
        .unwrap();
    orch.link_user_role(u, role.id).await.unwrap();

    let requests: Vec<AccessRequest> = (0..64)
        .map(|i| AccessRequest::new(format!("logs/{}", i), "read"))
        .collect();
    let decisions =
        futures::future::join_all(requests.iter().map(|r| engine.evaluate(u, r))).await;

    assert!(decisions
        .into_iter()
        .all(|d| d.unwrap() == Decision::Allow));
}
