//! Rule combination.
//!
//! Turns the flat list of collected rules into one indexed rule set scoped
//! to a single action. The index answers "which rules match `(parent,
//! child)`" per specificity tier without scanning every rule, while the
//! original submission order is kept for audit output.

use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

use platform_permissions::{ResourceRef, Rule, Specificity};

use crate::collector::CollectedRules;
use crate::error::{ContributorFailure, RejectedRule};

/// Validated, indexed rules for one `(actor, action)` resolution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CombinedRules {
    action: String,
    rules: Vec<Rule>,
    #[serde(skip)]
    global: Vec<usize>,
    #[serde(skip)]
    by_parent: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    by_child: HashMap<String, HashMap<String, Vec<usize>>>,
    failures: Vec<ContributorFailure>,
    rejected: Vec<RejectedRule>,
}

impl CombinedRules {
    /// Action these rules apply to.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// All accepted rules, in submission order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Contributors that failed during collection.
    pub fn failures(&self) -> &[ContributorFailure] {
        &self.failures
    }

    /// Rules discarded as malformed.
    pub fn rejected(&self) -> &[RejectedRule] {
        &self.rejected
    }

    /// Number of accepted rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rule was accepted.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules of one tier matching `target`, in submission order.
    pub fn tier_matches<'a>(
        &'a self,
        tier: Specificity,
        target: &ResourceRef,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        let indices: &[usize] = match tier {
            Specificity::Global => &self.global,
            Specificity::Parent => target
                .parent
                .as_deref()
                .and_then(|parent| self.by_parent.get(parent))
                .map(Vec::as_slice)
                .unwrap_or_default(),
            Specificity::Child => match (target.parent.as_deref(), target.child.as_deref()) {
                (Some(parent), Some(child)) => self
                    .by_child
                    .get(parent)
                    .and_then(|children| children.get(child))
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
                _ => &[],
            },
        };
        indices.iter().map(move |&i| &self.rules[i])
    }

    /// Every rule matching `target` with its tier, most specific tier first.
    pub fn matching(&self, target: &ResourceRef) -> Vec<(Specificity, &Rule)> {
        Specificity::descending()
            .into_iter()
            .flat_map(|tier| self.tier_matches(tier, target).map(move |rule| (tier, rule)))
            .collect()
    }

    /// Whether any global rule grants access.
    pub fn has_global_allow(&self) -> bool {
        self.global.iter().any(|&i| self.rules[i].allow)
    }

    /// Parents named by any allow rule at parent or child level.
    pub fn parents_with_allow(&self) -> impl Iterator<Item = &str> {
        let parents = self
            .by_parent
            .iter()
            .filter(|(_, indices)| indices.iter().any(|&i| self.rules[i].allow))
            .map(|(parent, _)| parent.as_str());
        let children = self
            .by_child
            .iter()
            .filter(|(_, children)| children.values().flatten().any(|&i| self.rules[i].allow))
            .map(|(parent, _)| parent.as_str());
        parents.chain(children)
    }

    /// Whether any child-level allow rule exists below `parent`.
    pub fn has_child_allow_under(&self, parent: &str) -> bool {
        self.by_child
            .get(parent)
            .is_some_and(|children| children.values().flatten().any(|&i| self.rules[i].allow))
    }
}

/// Builds [`CombinedRules`] from collected contributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCombiner;

impl RuleCombiner {
    /// Create a combiner.
    pub fn new() -> Self {
        Self
    }

    /// Validate and index collected rules.
    ///
    /// Malformed rules are discarded individually and reported; the rest of
    /// the same contributor's rules are kept.
    pub fn combine(&self, collected: CollectedRules) -> CombinedRules {
        let mut combined = CombinedRules {
            action: collected.action,
            failures: collected.failures,
            ..Default::default()
        };

        for rule in collected.rules {
            if let Err(err) = rule.validate() {
                error!(
                    source = %rule.source,
                    action = %combined.action,
                    code = err.error_code(),
                    error = %err,
                    "Discarding malformed permission rule"
                );
                combined.rejected.push(RejectedRule::new(rule, &err));
                continue;
            }

            let index = combined.rules.len();
            match (&rule.parent, &rule.child) {
                (None, _) => combined.global.push(index),
                (Some(parent), None) => combined.by_parent.entry(parent.clone()).or_default().push(index),
                (Some(parent), Some(child)) => combined
                    .by_child
                    .entry(parent.clone())
                    .or_default()
                    .entry(child.clone())
                    .or_default()
                    .push(index),
            }
            combined.rules.push(rule);
        }

        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected(rules: Vec<Rule>) -> CollectedRules {
        CollectedRules {
            action: "view-table".to_string(),
            rules,
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_indexes_by_tier() {
        let combined = RuleCombiner::new().combine(collected(vec![
            Rule::deny_all("root", "nobody"),
            Rule::allow("db", Some("reports"), None, "reports"),
            Rule::allow("tbl", Some("reports"), Some("daily"), "daily"),
        ]));
        let target = ResourceRef::table("reports", "daily");

        assert_eq!(combined.tier_matches(Specificity::Global, &target).count(), 1);
        assert_eq!(combined.tier_matches(Specificity::Parent, &target).count(), 1);
        assert_eq!(combined.tier_matches(Specificity::Child, &target).count(), 1);

        let other = ResourceRef::table("reports", "weekly");
        assert_eq!(combined.tier_matches(Specificity::Child, &other).count(), 0);
        assert_eq!(combined.matching(&other).len(), 2);
    }

    #[test]
    fn test_matching_orders_by_tier_then_submission() {
        let combined = RuleCombiner::new().combine(collected(vec![
            Rule::allow_all("a", "global"),
            Rule::deny("b", Some("db"), Some("t"), "child-1"),
            Rule::allow("c", Some("db"), Some("t"), "child-2"),
        ]));
        let matches = combined.matching(&ResourceRef::table("db", "t"));
        let reasons: Vec<_> = matches.iter().map(|(_, r)| r.reason.as_str()).collect();
        assert_eq!(reasons, vec!["child-1", "child-2", "global"]);
        assert_eq!(matches[0].0, Specificity::Child);
    }

    #[test]
    fn test_rejects_malformed_rules_individually() {
        let combined = RuleCombiner::new().combine(collected(vec![
            Rule::allow("plugin", None, Some("orphan"), "bad"),
            Rule::allow("", Some("db"), None, "unsourced"),
            Rule::allow("plugin", Some("db"), None, "good"),
        ]));

        assert_eq!(combined.len(), 1);
        assert_eq!(combined.rules()[0].reason, "good");
        assert_eq!(combined.rejected().len(), 2);
        assert_eq!(combined.rejected()[0].code, "CHILD_WITHOUT_PARENT");
        assert_eq!(combined.rejected()[1].code, "MISSING_SOURCE");
    }

    #[test]
    fn test_database_target_ignores_child_rules() {
        let combined = RuleCombiner::new().combine(collected(vec![Rule::allow(
            "p",
            Some("db"),
            Some("t"),
            "table only",
        )]));
        assert!(combined.matching(&ResourceRef::database("db")).is_empty());
        assert!(combined.has_child_allow_under("db"));
        assert!(!combined.has_child_allow_under("other"));
    }

    #[test]
    fn test_allow_summaries() {
        let combined = RuleCombiner::new().combine(collected(vec![
            Rule::deny_all("g", "nope"),
            Rule::allow("p", Some("a"), None, "a"),
            Rule::deny("p", Some("b"), None, "b"),
            Rule::allow("p", Some("c"), Some("t"), "c"),
        ]));
        assert!(!combined.has_global_allow());
        let mut parents: Vec<_> = combined.parents_with_allow().collect();
        parents.sort();
        assert_eq!(parents, vec!["a", "c"]);
    }
}
