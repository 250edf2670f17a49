#![allow(clippy::result_large_err)]
//! # Warden Core
//!
//! Role-based access control with cascading token revocation.
//!
//! ## Architecture
//!
//! - **RBAC**: users, roles, policies and typed rule patterns
//! - **Evaluator**: white (default deny) and black (default allow) modes
//! - **Store**: transactional units-of-work over memory or PostgreSQL
//! - **Revocation**: per-user and global token cutoffs
//! - **Security**: versioned security configuration with partial updates
//! - **Orchestrator**: mutation, blast-radius resolution and revocation in one
//!   unit-of-work
//! - **Engine**: the `AccessControl` facade consumed by the API layer
//! - **Telemetry**: structured logging and metrics

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod rbac;
pub mod revocation;
pub mod security;
pub mod store;
pub mod telemetry;

pub use engine::AccessControl;
pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, WardenError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{DatabaseConfig, SecurityDefaults, WardenConfig};
    pub use crate::engine::AccessControl;
    pub use crate::error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, WardenError};
    pub use crate::orchestrator::{resolve_blast_radius, Change, ChangeOrchestrator, ChangeReport};
    pub use crate::rbac::{
        evaluate, explain, AccessRequest, AuthContext, Condition, Decision, DefaultSeed, Effect,
        Mode, NewPolicy, NewRole, NewUser, Pattern, Policy, PolicyId, Role, RoleId, Rule,
        SeedReport, User, UserId, Verdict,
    };
    pub use crate::revocation::{RevocationRecord, TokenInvalidationTracker};
    pub use crate::security::{ConfigPatch, ConfigUpdate, SecurityConfig, SecurityConfigStore};
    pub use crate::store::{finish, Fault, MemoryStore, PgStore, RbacStore, ReadTx, WriteTx};
    pub use crate::telemetry::{describe_metrics, init_logging, LogFormat, LoggingConfig};
}
