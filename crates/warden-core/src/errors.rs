//! Error types for authorization operations
//!
//! This module defines the three error classes the engine distinguishes:
//! configuration mistakes caught synchronously at registration time,
//! lookup failures raised asynchronously during resolution, and the
//! unauthorized outcome of a clean denial. They are deliberately separate
//! types so a lookup failure can never be mistaken for a denial.

use thiserror::Error;

/// Configuration error raised at registration or factory time.
///
/// A `ConfigError` indicates a programming mistake in application setup
/// code. It is never retried and never surfaces during request handling:
/// the registration API validates the whole action/role/entity
/// dependency graph up front, so a manager that built successfully can
/// always resolve what it was asked to resolve.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Role was constructed without a relation
    #[error("role must have a relation")]
    MissingRelation,

    /// Role identifier had more than two dotted segments or an empty segment
    #[error("malformed role identifier: {0:?}")]
    MalformedRole(String),

    /// Entity type was empty or not a plain identifier
    #[error("entity type must be a non-empty identifier: {0:?}")]
    InvalidEntityType(String),

    /// Action was never registered
    #[error("action not found: {0}")]
    UnknownAction(String),

    /// Action was registered with an empty role set
    #[error("action '{action}' requires at least one role")]
    EmptyRoleSet {
        /// Action being registered
        action: String,
    },

    /// Action references a role with no registered getter
    #[error("action '{action}' references role '{role}' with no registered getter")]
    UnregisteredRole {
        /// Action being registered
        action: String,
        /// Role name with no getter
        role: String,
    },

    /// Entity-scoped role references an entity type with no registered getter
    #[error("role '{role}' references entity '{entity}' with no registered getter")]
    UnregisteredEntity {
        /// Role naming the entity
        role: String,
        /// Entity type with no getter
        entity: String,
    },

    /// Getter kind does not match the role's entity scope
    #[error("getter for role '{role}' does not match the role's entity scope")]
    GetterScopeMismatch {
        /// Role being registered
        role: String,
    },

    /// Middleware factory was given nothing to evaluate
    #[error("no actions selected for authorization")]
    NoActionsSelected,
}

/// Lookup error raised asynchronously while resolving a check.
///
/// Lookup failures surface unmodified to the caller: the caller decides
/// whether to retry. Failed resolutions are never cached, so a retry
/// within the same request re-invokes the getter.
#[derive(Debug, Error)]
pub enum LookupError {
    /// No getter registered for the requested role
    #[error("no getter registered for role: {0}")]
    UnknownRole(String),

    /// No role set registered for the requested action
    #[error("no roles registered for action: {0}")]
    UnknownAction(String),

    /// No getter registered for the requested entity type
    #[error("no getter registered for entity: {0}")]
    UnknownEntity(String),

    /// An entity or role getter reported a failure
    #[error("lookup failed: {0}")]
    Getter(String),
}

impl LookupError {
    /// Build a getter failure from any displayable message.
    ///
    /// Intended for getter implementations reporting their own errors:
    ///
    /// ```
    /// use warden_core::LookupError;
    ///
    /// let err = LookupError::getter("organization store unavailable");
    /// assert_eq!(err.to_string(), "lookup failed: organization store unavailable");
    /// ```
    pub fn getter(message: impl Into<String>) -> Self {
        LookupError::Getter(message.into())
    }
}

/// Result type for lookup operations.
pub type LookupResult<T> = Result<T, LookupError>;

/// Every requested action resolved cleanly to "not allowed".
///
/// This is the only expected negative outcome of a check. It carries the
/// names of all evaluated-and-disallowed actions so the hosting pipeline
/// can produce a meaningful rejection.
#[derive(Debug, Error)]
#[error("action not allowed: {}", .actions.join(", "))]
pub struct UnauthorizedError {
    /// Actions that were evaluated and disallowed
    pub actions: Vec<String>,
}

impl UnauthorizedError {
    /// Create an unauthorized error naming the disallowed actions.
    pub fn new(actions: Vec<String>) -> Self {
        Self { actions }
    }
}

/// Outcome of a middleware authorization check.
///
/// Wraps the two failure classes a check can produce at request time.
/// Lookup errors are infrastructure failures and are never coerced into
/// a denial.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A getter failed or a resolution target was missing
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Every requested action resolved cleanly to "not allowed"
    #[error(transparent)]
    Unauthorized(#[from] UnauthorizedError),
}

impl AuthzError {
    /// Check if this is a clean denial rather than a failure.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthzError::Unauthorized(_))
    }

    /// Check if this error should be logged at error level.
    ///
    /// A denial is an expected outcome and should not be logged as an
    /// error; a lookup failure should.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthzError::Lookup(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthzError::Unauthorized(_) => 403,
            AuthzError::Lookup(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthzError::Unauthorized(_) => "FORBIDDEN",
            AuthzError::Lookup(_) => "LOOKUP_FAILED",
        }
    }
}
