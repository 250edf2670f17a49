//! Role-Based Access Control (RBAC) model and rule evaluation.
//!
//! This module provides:
//! - **Models**: User, Role, Policy and their identifiers
//! - **Patterns**: typed resource/action matchers (exact, wildcard, range)
//! - **Rules**: pattern + effect + optional auth-context condition
//! - **Evaluator**: white (default deny) and black (default allow) modes
//! - **Defaults**: seed records applied at first initialization
//!
//! # Usage
//!
//! ```rust
//! use warden_core::rbac::{evaluate, AccessRequest, AuthContext, Decision, Mode, Rule};
//!
//! let rules = vec![Rule::allow("logs/*", "read").unwrap()];
//! let request = AccessRequest::new("logs/a", "read");
//! assert_eq!(
//!     evaluate(&rules, &request, Mode::White, &AuthContext::new()),
//!     Decision::Allow,
//! );
//! ```

pub mod defaults;
pub mod evaluator;
pub mod models;
pub mod pattern;
pub mod rule;

pub use defaults::{DefaultSeed, SeedRelationships, SeedReport};
pub use evaluator::{evaluate, explain, AccessRequest, Decision, Mode, Verdict};
pub use models::{
    validate_name, AuthContext, NewPolicy, NewRole, NewUser, Policy, PolicyId, Role, RoleId,
    User, UserId,
};
pub use pattern::{Pattern, Segment, SegmentPath};
pub use rule::{Condition, Effect, Rule};
