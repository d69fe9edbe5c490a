//! # Platform Resolver
//!
//! Decides whether an actor may perform an action on a resource by merging
//! allow/deny rules contributed by independent extension modules.
//!
//! ## Overview
//!
//! The platform-resolver crate handles:
//! - **Contribution**: Extension modules implement [`RuleContributor`]
//! - **Collection**: Concurrent fan-out with a timeout per contributor
//! - **Combination**: Validation and indexing of the submitted rules
//! - **Evaluation**: Specificity resolution with deny-wins tie-break
//! - **Listing**: Every resource an actor may act upon, filtered coarse-to-fine
//! - **Explain**: The full intermediate state, for operators
//!
//! ## Architecture
//!
//! ```text
//! (actor, action)
//!       │
//!       ▼
//! RuleCollector ── contributor A ─┐
//!       │       ── contributor B ─┼─► rules (registration order)
//!       │       ── contributor C ─┘
//!       ▼
//! RuleCombiner ──► CombinedRules (cached per scope)
//!       │
//!       ▼
//! Evaluator(target) ──► Decision
//!   child > parent > global, deny wins within a tier, default deny
//! ```
//!
//! ## Failure model
//!
//! - A contributor that errors, panics or times out abstains. Its failure
//!   is logged and reported by `explain`; it never counts as an allow.
//! - Malformed rules are discarded individually.
//! - An elapsed scope deadline or an unreachable catalog is an error, never
//!   a deny.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use platform_permissions::{Actor, ResourceRef, Rule};
//! use platform_resolver::{
//!     ListOptions, MemoryCatalog, PermissionResolver, ResolverConfig, StaticContributor,
//! };
//!
//! # async fn example() -> Result<(), platform_resolver::ResolveError> {
//! let catalog = Arc::new(
//!     MemoryCatalog::new()
//!         .with_table("reports", "daily_metrics")
//!         .with_table("reports", "weekly_metrics"),
//! );
//!
//! let resolver = PermissionResolver::new(catalog, ResolverConfig::default())
//!     .with_contributor(Arc::new(StaticContributor::new(
//!         "deny-root",
//!         vec![Rule::deny_all("deny-root", "locked down")],
//!     )))
//!     .with_contributor(Arc::new(StaticContributor::new(
//!         "allow-reports-daily",
//!         vec![Rule::allow("allow-reports-daily", Some("reports"), Some("daily_metrics"), "shared")],
//!     )));
//!
//! let actor = Actor::with_id("alice");
//! let scope = resolver.scope();
//!
//! let daily = ResourceRef::table("reports", "daily_metrics");
//! assert!(scope.resolve(&actor, "view-table", Some(&daily)).await?.allow);
//!
//! let visible = scope.resolve_many(&actor, "view-table", ListOptions::new()).await?;
//! assert_eq!(visible.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod collector;
pub mod combiner;
pub mod config;
pub mod contributor;
pub mod defaults;
pub mod error;
pub mod evaluator;
pub mod resolver;

// Re-export main types for convenience
pub use cache::{CacheStats, DecisionCache};
pub use catalog::{Catalog, MemoryCatalog};
pub use collector::{CollectedRules, RuleCollector};
pub use combiner::{CombinedRules, RuleCombiner};
pub use config::{ConfigError, ResolverConfig};
pub use contributor::{Contribution, FnContributor, RuleContributor, StaticContributor};
pub use defaults::{
    ConfigContributor, DatabaseConfig, DefaultsContributor, PermissionsConfig, QueryConfig,
    RootContributor, TableConfig,
};
pub use error::{
    CatalogError, CatalogResult, ContributorError, ContributorFailure, ContributorResult,
    RejectedRule, ResolveError, ResolveResult,
};
pub use evaluator::{evaluate, evaluate_detailed, Evaluation, Evaluator, RuleMatch};
pub use resolver::{AllowedResource, Explanation, ListOptions, PermissionResolver, ResolutionScope};
