//! Resolver facade.
//!
//! [`PermissionResolver`] owns the contributor registry, the action
//! registry and the catalog handle. Each upstream request opens a
//! [`ResolutionScope`], which carries the request deadline and a fresh
//! [`DecisionCache`]; dropping the scope discards the cache.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument};
use uuid::Uuid;

use platform_permissions::{ActionRegistry, Actor, Decision, ResourceRef, ResourceScope, Rule};

use crate::cache::DecisionCache;
use crate::catalog::Catalog;
use crate::collector::RuleCollector;
use crate::combiner::{CombinedRules, RuleCombiner};
use crate::config::{ConfigError, ResolverConfig};
use crate::contributor::RuleContributor;
use crate::defaults::{ConfigContributor, DefaultsContributor, PermissionsConfig, RootContributor};
use crate::error::{CatalogResult, ContributorFailure, RejectedRule, ResolveError, ResolveResult};
use crate::evaluator::{evaluate, Evaluator, RuleMatch};

/// Options for [`ResolutionScope::resolve_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only enumerate resources inside this database.
    pub parent: Option<String>,
    /// Also resolve for the anonymous actor and mark private resources.
    pub include_is_private: bool,
}

impl ListOptions {
    /// List everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// List only inside `database`.
    pub fn in_database(database: impl Into<String>) -> Self {
        Self {
            parent: Some(database.into()),
            ..Default::default()
        }
    }

    /// Mark resources hidden from the anonymous actor.
    pub fn with_is_private(mut self) -> Self {
        self.include_is_private = true;
        self
    }
}

/// A resource the actor may act upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedResource {
    pub resource: ResourceRef,
    pub decision: Decision,
    /// `Some(true)` when the anonymous actor would be denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

/// Intermediate state of one resolution, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    /// Scope the resolution ran in.
    pub scope_id: Uuid,
    /// Canonical action name.
    pub action: String,
    /// Resource evaluated.
    pub target: ResourceRef,
    /// When the explanation was produced.
    pub evaluated_at: DateTime<Utc>,
    /// Every accepted rule in submission order.
    pub rules: Vec<Rule>,
    /// Rules matching the target, most specific tier first.
    pub matches: Vec<RuleMatch>,
    /// Representative rule of the winning tier.
    pub winner: Option<Rule>,
    /// Final decision, restrictions and prerequisites applied.
    pub decision: Decision,
    /// Contributors that abstained because they failed.
    pub failures: Vec<ContributorFailure>,
    /// Rules discarded as malformed.
    pub malformed: Vec<RejectedRule>,
}

/// Entry point for permission checks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use platform_permissions::{Actor, ResourceRef, Rule};
/// use platform_resolver::{MemoryCatalog, PermissionResolver, ResolverConfig, StaticContributor};
///
/// # async fn example() {
/// let catalog = Arc::new(MemoryCatalog::new().with_table("reports", "daily_metrics"));
/// let resolver = PermissionResolver::new(catalog, ResolverConfig::default())
///     .with_contributor(Arc::new(StaticContributor::new(
///         "reports",
///         vec![Rule::allow("reports", Some("reports"), None, "reports are public")],
///     )));
///
/// let decision = resolver
///     .resolve(&Actor::anonymous(), "view-table", Some(&ResourceRef::table("reports", "daily_metrics")))
///     .await
///     .unwrap();
/// assert!(decision.allow);
/// # }
/// ```
pub struct PermissionResolver {
    catalog: Arc<dyn Catalog>,
    collector: RuleCollector,
    combiner: RuleCombiner,
    registry: ActionRegistry,
    config: ResolverConfig,
}

impl fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("collector", &self.collector)
            .field("actions", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PermissionResolver {
    /// Create a resolver with the built-in actions and no contributors.
    pub fn new(catalog: Arc<dyn Catalog>, config: ResolverConfig) -> Self {
        Self {
            collector: RuleCollector::new(config.contributor_timeout()),
            catalog,
            combiner: RuleCombiner::new(),
            registry: ActionRegistry::builtin(),
            config,
        }
    }

    /// Create a resolver after checking that `config` is usable.
    pub fn try_new(catalog: Arc<dyn Catalog>, config: ResolverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(catalog, config))
    }

    /// Register a contributor (builder style).
    pub fn with_contributor(mut self, contributor: Arc<dyn RuleContributor>) -> Self {
        self.register(contributor);
        self
    }

    /// Register a contributor.
    pub fn register(&mut self, contributor: Arc<dyn RuleContributor>) {
        self.collector.register(contributor);
    }

    /// Replace the action registry.
    pub fn with_actions(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register the root, defaults and configuration contributors.
    pub fn with_builtin_contributors(self, permissions: PermissionsConfig) -> Self {
        let root = RootContributor::new(self.config.root_enabled);
        let defaults = DefaultsContributor::from_config(&self.config);
        let config = ConfigContributor::with_registry(permissions, self.registry.clone());
        self.with_contributor(Arc::new(root))
            .with_contributor(Arc::new(defaults))
            .with_contributor(Arc::new(config))
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Names of the registered contributors, in order.
    pub fn contributors(&self) -> Vec<&str> {
        self.collector.names()
    }

    /// Open a scope whose deadline starts now.
    pub fn scope(&self) -> ResolutionScope<'_> {
        self.scope_with_deadline(Instant::now() + self.config.resolution_deadline())
    }

    /// Open a scope with a deadline inherited from the upstream request.
    pub fn scope_with_deadline(&self, deadline: Instant) -> ResolutionScope<'_> {
        let id = Uuid::now_v7();
        debug!(scope_id = %id, "Opened resolution scope");
        ResolutionScope {
            id,
            resolver: self,
            cache: DecisionCache::with_ttl(self.config.cache_ttl()),
            deadline,
            deadline_ms: deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
        }
    }

    /// Resolve a single resource in a one-off scope.
    pub async fn resolve(
        &self,
        actor: &Actor,
        action: &str,
        target: Option<&ResourceRef>,
    ) -> ResolveResult<Decision> {
        self.scope().resolve(actor, action, target).await
    }

    /// List permitted resources in a one-off scope.
    pub async fn resolve_many(
        &self,
        actor: &Actor,
        action: &str,
        options: ListOptions,
    ) -> ResolveResult<Vec<AllowedResource>> {
        self.scope().resolve_many(actor, action, options).await
    }

    /// Explain a resolution in a one-off scope.
    pub async fn explain(
        &self,
        actor: &Actor,
        action: &str,
        target: Option<&ResourceRef>,
    ) -> ResolveResult<Explanation> {
        self.scope().explain(actor, action, target).await
    }
}

/// Resolutions belonging to one upstream request.
///
/// Rule sets are collected at most once per `(actor, action)` within the
/// scope. Every collection and catalog query must finish before the scope
/// deadline or the resolution fails with
/// [`ResolveError::ResolutionTimeout`].
pub struct ResolutionScope<'r> {
    id: Uuid,
    resolver: &'r PermissionResolver,
    cache: DecisionCache,
    deadline: Instant,
    deadline_ms: u64,
}

impl fmt::Debug for ResolutionScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionScope")
            .field("id", &self.id)
            .field("deadline_ms", &self.deadline_ms)
            .finish()
    }
}

impl<'r> ResolutionScope<'r> {
    /// Scope identifier, for correlating log events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The rule set cache of this scope.
    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Decide whether `actor` may perform `action` on `target`.
    ///
    /// A missing target means the instance. Actions are opaque; when the
    /// action is registered with a prerequisite, the prerequisite must also
    /// be allowed on the enclosing resource.
    #[instrument(skip(self, actor), fields(scope_id = %self.id))]
    pub async fn resolve(
        &self,
        actor: &Actor,
        action: &str,
        target: Option<&ResourceRef>,
    ) -> ResolveResult<Decision> {
        let target = target.cloned().unwrap_or_default();
        target.validate()?;
        let action = self.canonical_action(action);

        let decision = self.decide(actor, action, &target).await?;
        let decision = self.check_prerequisite(actor, action, &target, decision).await?;

        debug!(
            action = %action,
            target = %target,
            allow = decision.allow,
            reason = %decision.reason,
            "Resolved permission"
        );
        Ok(decision)
    }

    /// Every resource `actor` may perform `action` on, ordered by
    /// `(parent, child)`.
    ///
    /// Databases are filtered before their tables are enumerated: a
    /// database whose tables can only be denied is never listed.
    #[instrument(skip(self, actor, options), fields(scope_id = %self.id, parent = ?options.parent))]
    pub async fn resolve_many(
        &self,
        actor: &Actor,
        action: &str,
        options: ListOptions,
    ) -> ResolveResult<Vec<AllowedResource>> {
        let registry = &self.resolver.registry;
        let def = registry
            .get(action)
            .ok_or_else(|| ResolveError::UnknownAction(action.to_string()))?;
        let action = def.name.as_str();

        let rules = self.rules_for(actor, action).await?;
        let restrictions = actor.restrictions();
        let evaluator = Evaluator::new(&rules, registry).with_restrictions(restrictions.as_ref());

        let candidates = self
            .enumerate(def.scope, &evaluator, options.parent.as_deref())
            .await?;

        let mut allowed: Vec<AllowedResource> = candidates
            .into_iter()
            .filter_map(|resource| {
                let decision = evaluator.decide(&resource);
                decision.allow.then_some(AllowedResource {
                    resource,
                    decision,
                    is_private: None,
                })
            })
            .collect();

        if let Some(required) = def.also_requires.as_deref() {
            let required = self.canonical_action(required);
            let required_rules = self.rules_for(actor, required).await?;
            let prerequisite =
                Evaluator::new(&required_rules, registry).with_restrictions(restrictions.as_ref());
            allowed.retain(|entry| {
                prerequisite
                    .decide(&self.scoped_target(required, &entry.resource))
                    .allow
            });
        }

        if options.include_is_private {
            let anonymous = Actor::anonymous();
            let public_rules = self.rules_for(&anonymous, action).await?;
            let public = Evaluator::new(&public_rules, registry);
            let public_required = match def.also_requires.as_deref() {
                Some(required) => {
                    let required = self.canonical_action(required);
                    Some((required, self.rules_for(&anonymous, required).await?))
                }
                None => None,
            };
            for entry in &mut allowed {
                let visible = public.decide(&entry.resource).allow
                    && public_required.as_ref().map_or(true, |(required, rules)| {
                        Evaluator::new(rules, registry)
                            .decide(&self.scoped_target(required, &entry.resource))
                            .allow
                    });
                entry.is_private = Some(!visible);
            }
        }

        allowed.sort_by(|a, b| a.resource.cmp(&b.resource));
        debug!(action = %action, allowed = allowed.len(), "Listed permitted resources");
        Ok(allowed)
    }

    /// Resolve and keep every intermediate result.
    #[instrument(skip(self, actor), fields(scope_id = %self.id))]
    pub async fn explain(
        &self,
        actor: &Actor,
        action: &str,
        target: Option<&ResourceRef>,
    ) -> ResolveResult<Explanation> {
        let target = target.cloned().unwrap_or_default();
        target.validate()?;
        let action = self.canonical_action(action);

        let rules = self.rules_for(actor, action).await?;
        let restrictions = actor.restrictions();
        let evaluation = Evaluator::new(&rules, &self.resolver.registry)
            .with_restrictions(restrictions.as_ref())
            .explain(&target);
        let decision = self
            .check_prerequisite(actor, action, &target, evaluation.decision)
            .await?;

        Ok(Explanation {
            scope_id: self.id,
            action: action.to_string(),
            winner: evaluate(&rules, &target).matched_rule,
            target,
            evaluated_at: Utc::now(),
            rules: rules.rules().to_vec(),
            matches: evaluation.matches,
            decision,
            failures: rules.failures().to_vec(),
            malformed: rules.rejected().to_vec(),
        })
    }

    /// Combined rules for `(actor, action)`, collected at most once per scope.
    pub async fn rules_for(&self, actor: &Actor, action: &str) -> ResolveResult<Arc<CombinedRules>> {
        let fingerprint = actor.fingerprint();
        if let Some(rules) = self.cache.get(&fingerprint, action).await {
            return Ok(rules);
        }

        let collected = self
            .within_deadline(self.resolver.collector.collect(actor, action))
            .await?;
        let rules = Arc::new(self.resolver.combiner.combine(collected));
        self.cache.insert(&fingerprint, action, rules.clone()).await;
        Ok(rules)
    }

    async fn decide(&self, actor: &Actor, action: &str, target: &ResourceRef) -> ResolveResult<Decision> {
        let rules = self.rules_for(actor, action).await?;
        let restrictions = actor.restrictions();
        Ok(Evaluator::new(&rules, &self.resolver.registry)
            .with_restrictions(restrictions.as_ref())
            .decide(target))
    }

    async fn check_prerequisite(
        &self,
        actor: &Actor,
        action: &str,
        target: &ResourceRef,
        decision: Decision,
    ) -> ResolveResult<Decision> {
        if !decision.allow {
            return Ok(decision);
        }
        let Some(required) = self
            .resolver
            .registry
            .get(action)
            .and_then(|def| def.also_requires.as_deref())
        else {
            return Ok(decision);
        };

        let required = self.canonical_action(required);
        let prerequisite = self
            .decide(actor, required, &self.scoped_target(required, target))
            .await?;
        if prerequisite.allow {
            return Ok(decision);
        }
        Ok(Decision::denied(
            format!("{} requires {}: {}", action, required, prerequisite.reason),
            prerequisite.matched_rule,
        ))
    }

    /// Enumerate the catalog for an action of `scope`.
    async fn enumerate(
        &self,
        scope: ResourceScope,
        evaluator: &Evaluator<'_>,
        parent: Option<&str>,
    ) -> ResolveResult<Vec<ResourceRef>> {
        if scope == ResourceScope::Instance {
            return Ok(vec![ResourceRef::instance()]);
        }

        let catalog = &self.resolver.catalog;
        let databases = match parent {
            Some(name) => {
                let database = ResourceRef::database(name);
                if self.query(catalog.resource_exists(&database)).await? {
                    vec![database]
                } else {
                    Vec::new()
                }
            }
            None => self.query(catalog.list_resources(None)).await?,
        };

        let candidates = evaluator.candidate_parents();
        let databases: Vec<ResourceRef> = databases
            .into_iter()
            .filter(|db| match (&candidates, db.parent.as_deref()) {
                (None, Some(_)) => true,
                (Some(names), Some(name)) => names.contains(name),
                (_, None) => false,
            })
            .collect();

        if scope == ResourceScope::Database {
            return Ok(databases);
        }

        let listings = databases
            .iter()
            .filter_map(|db| db.parent.as_deref())
            .filter(|name| evaluator.may_allow_within(name))
            .map(|name| self.query(catalog.list_resources(Some(name))));
        let tables = try_join_all(listings).await?;
        Ok(tables.into_iter().flatten().collect())
    }

    fn canonical_action<'a>(&'a self, action: &'a str) -> &'a str {
        self.resolver
            .registry
            .get(action)
            .map_or(action, |def| def.name.as_str())
    }

    /// Truncate `target` to the resource level `action` operates on.
    fn scoped_target(&self, action: &str, target: &ResourceRef) -> ResourceRef {
        match self.resolver.registry.get(action).map(|def| def.scope) {
            Some(ResourceScope::Instance) => ResourceRef::instance(),
            Some(ResourceScope::Database) => target.parent_ref(),
            _ => target.clone(),
        }
    }

    async fn within_deadline<T>(&self, fut: impl Future<Output = T>) -> ResolveResult<T> {
        timeout_at(self.deadline, fut)
            .await
            .map_err(|_| ResolveError::ResolutionTimeout {
                deadline_ms: self.deadline_ms,
            })
    }

    async fn query<T>(&self, call: impl Future<Output = CatalogResult<T>>) -> ResolveResult<T> {
        Ok(self.within_deadline(call).await??)
    }
}
