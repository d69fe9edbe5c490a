//! Rule collection.
//!
//! Invokes every registered contributor exactly once per resolution, each
//! on its own task and under its own timeout. A contributor that errors,
//! panics or times out abstains: it contributes zero rules and a failure
//! record, and never counts as an allow. The collector only returns once
//! every contributor has answered or timed out.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use platform_permissions::{Actor, Rule};

use crate::contributor::RuleContributor;
use crate::error::{ContributorError, ContributorFailure};

/// Everything gathered for one `(actor, action)` pair.
#[derive(Debug, Clone, Default)]
pub struct CollectedRules {
    /// Action the rules were gathered for.
    pub action: String,
    /// Submitted rules in contributor registration order.
    pub rules: Vec<Rule>,
    /// Contributors that abstained because they failed.
    pub failures: Vec<ContributorFailure>,
}

/// Concurrent fan-out over the contributor registry.
#[derive(Clone)]
pub struct RuleCollector {
    contributors: Vec<Arc<dyn RuleContributor>>,
    contributor_timeout: Duration,
}

impl std::fmt::Debug for RuleCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCollector")
            .field("contributors", &self.names())
            .field("contributor_timeout", &self.contributor_timeout)
            .finish()
    }
}

impl RuleCollector {
    /// Create a collector with no contributors.
    pub fn new(contributor_timeout: Duration) -> Self {
        Self {
            contributors: Vec::new(),
            contributor_timeout,
        }
    }

    /// Register a contributor. Registration order is the audit order.
    pub fn register(&mut self, contributor: Arc<dyn RuleContributor>) {
        self.contributors.push(contributor);
    }

    /// Names of the registered contributors, in order.
    pub fn names(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.name()).collect()
    }

    /// Number of registered contributors.
    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Gather rules from every contributor.
    ///
    /// The returned rules are ordered by contributor registration, not by
    /// completion, so the result is independent of scheduling.
    pub async fn collect(&self, actor: &Actor, action: &str) -> CollectedRules {
        let calls = self
            .contributors
            .iter()
            .map(|contributor| self.invoke(Arc::clone(contributor), actor.clone(), action.to_string()));
        let outcomes = join_all(calls).await;

        let mut collected = CollectedRules {
            action: action.to_string(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(rules) => collected.rules.extend(rules),
                Err(failure) => collected.failures.push(failure),
            }
        }

        debug!(
            action = %action,
            rules = collected.rules.len(),
            failures = collected.failures.len(),
            "Collected permission rules"
        );

        collected
    }

    async fn invoke(
        &self,
        contributor: Arc<dyn RuleContributor>,
        actor: Actor,
        action: String,
    ) -> Result<Vec<Rule>, ContributorFailure> {
        let name = contributor.name().to_string();
        let started = Instant::now();
        let mut task = tokio::spawn({
            let action = action.clone();
            async move { contributor.contribute(&actor, &action).await }
        });

        let error = match timeout(self.contributor_timeout, &mut task).await {
            Ok(Ok(Ok(contribution))) => return Ok(contribution.into_rules()),
            Ok(Ok(Err(err))) => err,
            Ok(Err(join_error)) => ContributorError::from(join_error),
            Err(_) => {
                task.abort();
                ContributorError::TimedOut {
                    timeout_ms: self.contributor_timeout.as_millis() as u64,
                }
            }
        };

        warn!(
            contributor = %name,
            action = %action,
            code = error.error_code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %error,
            "Contributor abstained after failure"
        );

        Err(ContributorFailure::new(name, &error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contributor::{Contribution, FnContributor, StaticContributor};
    use futures::FutureExt;
    use std::time::Instant as WallClock;

    fn static_rules(name: &str, rules: Vec<Rule>) -> Arc<dyn RuleContributor> {
        Arc::new(StaticContributor::new(name, rules))
    }

    fn slow(name: &'static str, delay: Duration, rule: Rule) -> Arc<dyn RuleContributor> {
        Arc::new(FnContributor::new(name, move |_actor, _action| {
            let rule = rule.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok(Contribution::from(rule))
            }
            .boxed()
        }))
    }

    #[tokio::test]
    async fn test_collects_in_registration_order() {
        let mut collector = RuleCollector::new(Duration::from_secs(1));
        collector.register(slow("first", Duration::from_millis(30), Rule::allow_all("first", "a")));
        collector.register(static_rules("second", vec![Rule::deny_all("second", "b")]));

        let collected = collector.collect(&Actor::anonymous(), "view-table").await;
        let sources: Vec<_> = collected.rules.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["first", "second"]);
        assert!(collected.failures.is_empty());
        assert_eq!(collected.action, "view-table");
    }

    #[tokio::test]
    async fn test_failing_contributor_abstains() {
        let mut collector = RuleCollector::new(Duration::from_secs(1));
        collector.register(Arc::new(FnContributor::from_sync("broken", |_, _| {
            Err(ContributorError::failed("backend exploded"))
        })));
        collector.register(static_rules("ok", vec![Rule::allow_all("ok", "fine")]));

        let collected = collector.collect(&Actor::anonymous(), "view-table").await;
        assert_eq!(collected.rules.len(), 1);
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].source, "broken");
        assert_eq!(collected.failures[0].code, "CONTRIBUTOR_FAILED");
    }

    #[tokio::test]
    async fn test_panicking_contributor_abstains() {
        let mut collector = RuleCollector::new(Duration::from_secs(1));
        collector.register(Arc::new(FnContributor::from_sync("panics", |_, _| {
            panic!("contributor bug")
        })));

        let collected = collector.collect(&Actor::anonymous(), "view-table").await;
        assert!(collected.rules.is_empty());
        assert_eq!(collected.failures[0].code, "CONTRIBUTOR_PANICKED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_contributor_times_out_without_stalling_others() {
        let mut collector = RuleCollector::new(Duration::from_millis(100));
        collector.register(slow("glacial", Duration::from_secs(60), Rule::allow_all("glacial", "late")));
        collector.register(slow("quick", Duration::from_millis(10), Rule::deny_all("quick", "no")));

        let started = Instant::now();
        let collected = collector.collect(&Actor::anonymous(), "view-table").await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(collected.rules.len(), 1);
        assert_eq!(collected.rules[0].source, "quick");
        assert_eq!(collected.failures[0].code, "CONTRIBUTOR_TIMEOUT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_contributors_run_concurrently() {
        let mut collector = RuleCollector::new(Duration::from_secs(1));
        for name in ["a", "b", "c"] {
            collector.register(slow(name, Duration::from_millis(200), Rule::allow_all(name, "x")));
        }

        let started = Instant::now();
        let collected = collector.collect(&Actor::anonymous(), "view-table").await;
        assert_eq!(collected.rules.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_contributor_times_out() {
        let mut collector = RuleCollector::new(Duration::from_millis(100));
        collector.register(Arc::new(FnContributor::from_sync("blocking", |_, _| {
            std::thread::sleep(std::time::Duration::from_millis(500));
            Ok(Rule::allow_all("blocking", "late allow").into())
        })));
        collector.register(slow("quick", Duration::from_millis(10), Rule::deny_all("quick", "no")));

        let started = WallClock::now();
        let collected = collector.collect(&Actor::anonymous(), "view-table").await;

        assert!(started.elapsed() < std::time::Duration::from_millis(400));
        let sources: Vec<_> = collected.rules.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["quick"]);
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].source, "blocking");
        assert_eq!(collected.failures[0].code, "CONTRIBUTOR_TIMEOUT");
    }

    #[test]
    fn test_names() {
        let mut collector = RuleCollector::new(Duration::from_secs(1));
        assert!(collector.is_empty());
        collector.register(static_rules("one", Vec::new()));
        assert_eq!(collector.names(), vec!["one"]);
        assert_eq!(collector.len(), 1);
    }
}
