//! Error types for permission resolution
//!
//! Two families of failure exist. Contributor failures are recovered by the
//! collector (the contributor abstains) and only recorded for audit.
//! Resolution failures are surfaced to the caller as errors, distinct from a
//! deny decision, so "not permitted" can be told apart from "could not decide".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use platform_permissions::{Rule, RuleError};

/// Errors surfaced to callers of the resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The outer deadline elapsed before every contributor answered
    #[error("Resolution timed out after {deadline_ms}ms")]
    ResolutionTimeout {
        /// Deadline in milliseconds.
        deadline_ms: u64,
    },

    /// The resource catalog could not be queried
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Listing was requested for an action the registry does not know
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The target resource reference is malformed
    #[error("Invalid resource: {0}")]
    InvalidResource(String),
}

/// Result type for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

impl ResolveError {
    /// Whether this error means the system could not decide, as opposed to
    /// a caller mistake.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ResolveError::ResolutionTimeout { .. } | ResolveError::CatalogUnavailable(_)
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ResolveError::ResolutionTimeout { .. } => "RESOLUTION_TIMEOUT",
            ResolveError::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            ResolveError::UnknownAction(_) => "UNKNOWN_ACTION",
            ResolveError::InvalidResource(_) => "INVALID_RESOURCE",
        }
    }
}

impl From<RuleError> for ResolveError {
    fn from(err: RuleError) -> Self {
        ResolveError::InvalidResource(err.to_string())
    }
}

impl From<CatalogError> for ResolveError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Unavailable(message) => ResolveError::CatalogUnavailable(message),
        }
    }
}

/// Errors raised by the resource catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Backing store unreachable or failed
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors a contributor can report for its own invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContributorError {
    /// The contributor returned an error
    #[error("Contributor failed: {0}")]
    Failed(String),

    /// The contributor did not answer within its timeout
    #[error("Contributor timed out after {timeout_ms}ms")]
    TimedOut {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The contributor panicked
    #[error("Contributor panicked: {0}")]
    Panicked(String),
}

/// Result type for contributor invocations.
pub type ContributorResult<T> = Result<T, ContributorError>;

impl ContributorError {
    /// Wrap any displayable error as a contributor failure.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        ContributorError::Failed(err.to_string())
    }

    /// Get error code for audit output.
    pub fn error_code(&self) -> &'static str {
        match self {
            ContributorError::Failed(_) => "CONTRIBUTOR_FAILED",
            ContributorError::TimedOut { .. } => "CONTRIBUTOR_TIMEOUT",
            ContributorError::Panicked(_) => "CONTRIBUTOR_PANICKED",
        }
    }
}

impl From<tokio::task::JoinError> for ContributorError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ContributorError::Panicked(panic_message(err.into_panic().as_ref()))
        } else {
            ContributorError::failed("contributor task cancelled")
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Audit record of a contributor that abstained because it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorFailure {
    /// Contributor name.
    pub source: String,
    /// Stable error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl ContributorFailure {
    /// Record a failure for `source`.
    pub fn new(source: impl Into<String>, error: &ContributorError) -> Self {
        Self {
            source: source.into(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Audit record of a rule discarded for violating the rule invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRule {
    /// The offending rule as submitted.
    pub rule: Rule,
    /// Stable error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl RejectedRule {
    /// Record a rejection.
    pub fn new(rule: Rule, error: &RuleError) -> Self {
        Self {
            rule,
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}
