//! # Platform Permissions
//!
//! This crate provides the vocabulary of action-based permission resolution
//! for the Relay platform: who is asking, what they want to do, and to what.
//!
//! ## Overview
//!
//! The platform-permissions crate handles:
//! - **Actors**: Opaque claim maps identifying the requester
//! - **Actions**: Named capabilities (`view-table`, `execute-sql`, ...)
//! - **Resources**: Two-level `(parent, child)` addresses
//! - **Rules**: Allow/deny statements contributed by extension modules
//! - **Decisions**: The allow/deny outcome with its justification
//!
//! ## Architecture
//!
//! ```text
//! Rule = source + (parent, child) pattern + allow/deny + reason
//!
//! Specificity:
//!   (db, table)  child    most specific
//!   (db, None)   parent
//!   (None, None) global   least specific
//! ```
//!
//! Rules are merged and evaluated by `platform-resolver`; this crate is
//! synchronous and performs no I/O.
//!
//! ## Usage
//!
//! ```rust
//! use platform_permissions::{ResourceRef, Rule, Specificity};
//!
//! let rule = Rule::allow("reports", Some("reports"), None, "reports are public");
//! assert_eq!(rule.specificity(), Specificity::Parent);
//! assert!(rule.matches(&ResourceRef::table("reports", "daily_metrics")));
//! assert!(!rule.matches(&ResourceRef::table("finance", "ledger")));
//! ```

pub mod actions;
pub mod actor;
pub mod allow;
pub mod error;
pub mod resources;
pub mod restrictions;
pub mod rules;

// Re-export main types for convenience
pub use actions::{ActionDef, ActionRegistry};
pub use actor::Actor;
pub use allow::{actor_matches_allow, AllowBlock};
pub use error::{RuleError, RuleResult};
pub use resources::{ResourceRef, ResourceScope};
pub use restrictions::ActorRestrictions;
pub use rules::{Decision, Rule, Specificity, DEFAULT_DENY_REASON};
