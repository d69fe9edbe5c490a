//! Error types for rule construction and validation
//!
//! A rule that violates the addressing invariants is a programming error in
//! the contributor that produced it. These errors are reported and the rule
//! is discarded; they never abort a resolution.

use thiserror::Error;

/// Rule validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    /// Rule was produced without an originating contributor
    #[error("Rule has no source")]
    MissingSource,

    /// Rule names a child without naming its parent
    #[error("Rule scoped to child '{child}' without a parent")]
    ChildWithoutParent {
        /// The orphaned child identifier.
        child: String,
    },

    /// Rule uses an empty string as parent or child identifier
    #[error("Rule has an empty resource identifier")]
    EmptyIdentifier,
}

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

impl RuleError {
    /// Get error code for audit output.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuleError::MissingSource => "MISSING_SOURCE",
            RuleError::ChildWithoutParent { .. } => "CHILD_WITHOUT_PARENT",
            RuleError::EmptyIdentifier => "EMPTY_IDENTIFIER",
        }
    }
}
