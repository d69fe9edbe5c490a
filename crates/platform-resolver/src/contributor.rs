//! Rule contribution protocol.
//!
//! Extension modules implement [`RuleContributor`] to supply permission
//! rules for an `(actor, action)` pair. A contributor may answer with no
//! opinion, one rule or many rules, and may suspend while doing so (for
//! example to consult a remote store). Synchronous logic can be plugged in
//! through [`FnContributor::from_sync`], which runs it on the blocking
//! thread pool.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;

use platform_permissions::{Actor, Rule};

use crate::error::ContributorResult;

/// What a contributor returned for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Contribution {
    /// No opinion on this action.
    #[default]
    Abstain,
    /// Zero or more rules.
    Rules(Vec<Rule>),
}

impl Contribution {
    /// Flatten into the submitted rules.
    pub fn into_rules(self) -> Vec<Rule> {
        match self {
            Contribution::Abstain => Vec::new(),
            Contribution::Rules(rules) => rules,
        }
    }

    /// Whether the contribution carries no rules.
    pub fn is_empty(&self) -> bool {
        match self {
            Contribution::Abstain => true,
            Contribution::Rules(rules) => rules.is_empty(),
        }
    }
}

impl From<Rule> for Contribution {
    fn from(rule: Rule) -> Self {
        Contribution::Rules(vec![rule])
    }
}

impl From<Vec<Rule>> for Contribution {
    fn from(rules: Vec<Rule>) -> Self {
        Contribution::Rules(rules)
    }
}

impl<T: Into<Contribution>> From<Option<T>> for Contribution {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// An extension module that contributes permission rules.
///
/// Implementations must be read-only with respect to the catalog. Errors
/// and panics only forfeit this contributor's own rules.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use platform_permissions::{Actor, Rule};
/// use platform_resolver::contributor::{Contribution, RuleContributor};
/// use platform_resolver::error::ContributorResult;
///
/// struct PublicReports;
///
/// #[async_trait]
/// impl RuleContributor for PublicReports {
///     fn name(&self) -> &str {
///         "public-reports"
///     }
///
///     async fn contribute(&self, _actor: &Actor, action: &str) -> ContributorResult<Contribution> {
///         if action != "view-table" {
///             return Ok(Contribution::Abstain);
///         }
///         Ok(Rule::allow(self.name(), Some("reports"), None, "reports are public").into())
///     }
/// }
/// ```
#[async_trait]
pub trait RuleContributor: Send + Sync {
    /// Identifier used as the source of this contributor's rules.
    fn name(&self) -> &str;

    /// Produce rules for `actor` performing `action`.
    async fn contribute(&self, actor: &Actor, action: &str) -> ContributorResult<Contribution>;
}

/// A contributor that returns the same rules for matching actions.
#[derive(Debug, Clone)]
pub struct StaticContributor {
    name: String,
    actions: Option<Vec<String>>,
    rules: Vec<Rule>,
}

impl StaticContributor {
    /// Contribute `rules` for every action.
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            actions: None,
            rules,
        }
    }

    /// Restrict the contribution to the listed actions.
    pub fn for_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = Some(actions.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl RuleContributor for StaticContributor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn contribute(&self, _actor: &Actor, action: &str) -> ContributorResult<Contribution> {
        let applies = self
            .actions
            .as_ref()
            .map_or(true, |actions| actions.iter().any(|a| a == action));
        if !applies {
            return Ok(Contribution::Abstain);
        }
        Ok(Contribution::Rules(self.rules.clone()))
    }
}

type ContributeFn =
    dyn for<'a> Fn(&'a Actor, &'a str) -> BoxFuture<'a, ContributorResult<Contribution>> + Send + Sync;

/// A contributor backed by a closure.
pub struct FnContributor {
    name: String,
    func: Arc<ContributeFn>,
}

impl fmt::Debug for FnContributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnContributor").field("name", &self.name).finish()
    }
}

impl FnContributor {
    /// Wrap an asynchronous closure returning a boxed future.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: for<'a> Fn(&'a Actor, &'a str) -> BoxFuture<'a, ContributorResult<Contribution>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Wrap a synchronous closure.
    ///
    /// The closure runs on the blocking thread pool and may block.
    pub fn from_sync<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Actor, &str) -> ContributorResult<Contribution> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, move |actor, action| {
            let func = Arc::clone(&func);
            let actor = actor.clone();
            let action = action.to_string();
            async move { tokio::task::spawn_blocking(move || func(&actor, &action)).await? }.boxed()
        })
    }
}

#[async_trait]
impl RuleContributor for FnContributor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn contribute(&self, actor: &Actor, action: &str) -> ContributorResult<Contribution> {
        (self.func)(actor, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContributorError;

    #[test]
    fn test_contribution_conversions() {
        let rule = Rule::allow_all("s", "ok");
        assert_eq!(Contribution::from(rule.clone()), Contribution::Rules(vec![rule.clone()]));
        assert_eq!(Contribution::from(None::<Rule>), Contribution::Abstain);
        assert_eq!(Contribution::from(Some(vec![rule.clone()])).into_rules(), vec![rule]);
        assert!(Contribution::Rules(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_static_contributor_filters_actions() {
        let contributor = StaticContributor::new("static", vec![Rule::allow_all("static", "ok")])
            .for_actions(["view-table"]);
        let actor = Actor::anonymous();

        let hit = contributor.contribute(&actor, "view-table").await.unwrap();
        assert_eq!(hit.into_rules().len(), 1);

        let miss = contributor.contribute(&actor, "drop-table").await.unwrap();
        assert_eq!(miss, Contribution::Abstain);
    }

    #[tokio::test]
    async fn test_sync_fn_contributor() {
        let contributor = FnContributor::from_sync("ids", |actor, _action| {
            match actor.id() {
                Some("alice") => Ok(Rule::allow_all("ids", "alice is trusted").into()),
                Some(_) => Ok(Contribution::Abstain),
                None => Err(ContributorError::failed("anonymous not supported")),
            }
        });

        let alice = contributor.contribute(&Actor::with_id("alice"), "x").await.unwrap();
        assert_eq!(alice.into_rules()[0].reason, "alice is trusted");
        assert!(contributor.contribute(&Actor::anonymous(), "x").await.is_err());
    }

    #[tokio::test]
    async fn test_async_fn_contributor() {
        let contributor = FnContributor::new("remote", |_actor, action| {
            let action = action.to_string();
            async move {
                tokio::task::yield_now().await;
                Ok(Rule::deny_all("remote", format!("no {}", action)).into())
            }
            .boxed()
        });

        let rules = contributor
            .contribute(&Actor::anonymous(), "drop-table")
            .await
            .unwrap()
            .into_rules();
        assert_eq!(rules[0].reason, "no drop-table");
        assert_eq!(contributor.name(), "remote");
    }
}
