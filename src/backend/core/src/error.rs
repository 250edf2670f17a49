//! Error handling for Warden Core.
//!
//! This module provides:
//! - A single error type carrying a machine-readable code and chained sources
//! - User-friendly messages vs detailed internal messages
//! - Severity classification and retryability hints
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,no_run
//! use warden_core::error::{ErrorCode, Result};
//! use warden_core::store::{MemoryStore, RbacStore, ReadTx};
//!
//! # async fn run() -> Result<()> {
//! let store = MemoryStore::new();
//! let mut tx = store.read().await?;
//! match tx.get_role_by_name("readonly").await {
//!     Ok(role) => println!("{} has {} rules", role.name, role.rules.len()),
//!     Err(e) if e.code() == ErrorCode::NotFound => println!("not seeded yet"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::telemetry::metrics::ERRORS_TOTAL;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by the API layer for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Entity Errors
    NotFound,
    Conflict,
    ProtectedResource,

    // Input Errors
    ValidationError,
    InvalidMode,

    // Storage Errors
    StorageError,
    StorageUnavailable,

    // Serialization Errors
    SerializationError,

    // Configuration Errors
    ConfigurationError,

    // Internal Errors
    InternalError,
}

impl ErrorCode {
    /// Check if this error is potentially retryable.
    ///
    /// A failed change must be retried in full; nothing is left half-applied.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageError | Self::StorageUnavailable)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::NotFound | Self::Conflict | Self::ProtectedResource => "entity",
            Self::ValidationError | Self::InvalidMode => "input",
            Self::StorageError | Self::StorageUnavailable => "storage",
            Self::SerializationError => "serialization",
            Self::ConfigurationError => "configuration",
            Self::InternalError => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Error severity levels for logging and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected outcome of bad input; logged at debug level
    Low,
    /// Unexpected but recoverable
    Medium,
    /// Requires attention
    High,
    /// The engine cannot serve requests
    Critical,
}

impl ErrorSeverity {
    /// Determine severity from error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::NotFound
            | ErrorCode::Conflict
            | ErrorCode::ProtectedResource
            | ErrorCode::ValidationError
            | ErrorCode::InvalidMode => Self::Low,

            ErrorCode::SerializationError => Self::Medium,

            ErrorCode::StorageError | ErrorCode::ConfigurationError => Self::High,

            ErrorCode::StorageUnavailable | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured details attached to an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Arbitrary key/value context
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Kind of entity involved (user, role, policy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Identifier of the entity involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the entity the error refers to.
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Attach arbitrary context.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Warden Core.
#[derive(Error, Debug)]
pub struct WardenError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for WardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl WardenError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl fmt::Display) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.to_string();
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, entity_id))
    }

    /// Create a uniqueness conflict error.
    pub fn conflict(entity_type: impl Into<String>, key: impl fmt::Display) -> Self {
        let entity_type = entity_type.into();
        let key = key.to_string();
        Self::new(
            ErrorCode::Conflict,
            format!("{} already exists: {}", entity_type, key),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, key))
    }

    /// Create an error for a mutation on a seeded system entity.
    pub fn protected(entity_type: impl Into<String>, entity_id: impl fmt::Display) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.to_string();
        Self::new(
            ErrorCode::ProtectedResource,
            format!("{} {} is a system entity and cannot be modified", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, entity_id))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create an unrecognized evaluation mode error.
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        Self::new(
            ErrorCode::InvalidMode,
            format!("Unrecognized evaluation mode: {}", mode),
        )
        .with_context("mode", &mode)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::StorageError, "A storage error occurred", message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            ERRORS_TOTAL,
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL SQLSTATE for unique_violation.
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Whether `error` is a PostgreSQL unique constraint violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION))
}

impl From<sqlx::Error> for WardenError {
    fn from(error: sqlx::Error) -> Self {
        if is_unique_violation(&error) {
            let constraint = match &error {
                sqlx::Error::Database(db_err) => db_err.constraint().unwrap_or("unique").to_string(),
                _ => "unique".to_string(),
            };
            return Self::with_internal(
                ErrorCode::Conflict,
                "A record with this name already exists",
                format!("Constraint violation: {}", constraint),
            )
            .with_source(error);
        }

        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::NotFound,
                "The requested record was not found",
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorCode::StorageUnavailable,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::StorageError, "A storage error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for WardenError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::StorageUnavailable,
            "Database schema could not be applied",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_data() || error.is_syntax() {
            ErrorCode::ValidationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            error.to_string(),
        )
    }
}

impl From<anyhow::Error> for WardenError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<WardenError>() {
            Ok(warden_error) => warden_error,
            Err(error) => Self::internal(error.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
