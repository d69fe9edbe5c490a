//! Specificity resolution.
//!
//! For a target resource:
//!
//! 1. select every rule whose `(parent, child)` pattern matches the target
//! 2. group the matches by tier (child > parent > global)
//! 3. take the most specific populated tier; inside it **deny wins** over
//!    allow, so conflicting rules of equal specificity never grant access
//! 4. with no matching rule at all, deny by default
//!
//! The representative rule is the first deny of the winning tier in
//! contributor registration order, or its first allow when no deny is
//! present. Evaluation is pure and synchronous.

use serde::Serialize;
use std::collections::BTreeSet;

use platform_permissions::{ActionRegistry, ActorRestrictions, Decision, ResourceRef, Rule, Specificity};

use crate::combiner::CombinedRules;

/// A rule that matched the target, with its tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    /// Tier of the matched rule.
    pub tier: Specificity,
    /// The matched rule.
    pub rule: Rule,
}

/// Full account of how a decision was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Resource evaluated.
    pub target: ResourceRef,
    /// Every matching rule, most specific tier first.
    pub matches: Vec<RuleMatch>,
    /// Tier that decided the outcome, if any rule matched.
    pub winning_tier: Option<Specificity>,
    /// The decision.
    pub decision: Decision,
}

/// Pick the winner among the rules of one tier.
fn winner<'a>(tier_rules: impl Iterator<Item = &'a Rule>) -> Option<&'a Rule> {
    let mut first_allow = None;
    for rule in tier_rules {
        if !rule.allow {
            return Some(rule);
        }
        first_allow.get_or_insert(rule);
    }
    first_allow
}

/// Decide `target` against the combined rules.
pub fn evaluate(rules: &CombinedRules, target: &ResourceRef) -> Decision {
    Specificity::descending()
        .into_iter()
        .find_map(|tier| winner(rules.tier_matches(tier, target)))
        .map(Decision::from_rule)
        .unwrap_or_else(Decision::default_deny)
}

/// Decide `target` and keep every matching rule for inspection.
pub fn evaluate_detailed(rules: &CombinedRules, target: &ResourceRef) -> Evaluation {
    let matches: Vec<RuleMatch> = rules
        .matching(target)
        .into_iter()
        .map(|(tier, rule)| RuleMatch {
            tier,
            rule: rule.clone(),
        })
        .collect();
    let decision = evaluate(rules, target);

    Evaluation {
        target: target.clone(),
        winning_tier: decision.tier(),
        matches,
        decision,
    }
}

/// Evaluates one action's rules for one actor, applying the actor's
/// restriction allowlist on top of the specificity outcome.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    rules: &'a CombinedRules,
    registry: &'a ActionRegistry,
    restrictions: Option<&'a ActorRestrictions>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator without restrictions.
    pub fn new(rules: &'a CombinedRules, registry: &'a ActionRegistry) -> Self {
        Self {
            rules,
            registry,
            restrictions: None,
        }
    }

    /// Apply an actor's restriction allowlist.
    pub fn with_restrictions(mut self, restrictions: Option<&'a ActorRestrictions>) -> Self {
        self.restrictions = restrictions;
        self
    }

    /// The rules being evaluated.
    pub fn rules(&self) -> &'a CombinedRules {
        self.rules
    }

    /// Decide a single resource.
    pub fn decide(&self, target: &ResourceRef) -> Decision {
        self.restrict(target, evaluate(self.rules, target))
    }

    /// Decide a single resource with the full match list.
    pub fn explain(&self, target: &ResourceRef) -> Evaluation {
        let mut evaluation = evaluate_detailed(self.rules, target);
        evaluation.decision = self.restrict(target, evaluation.decision);
        evaluation
    }

    fn restrict(&self, target: &ResourceRef, decision: Decision) -> Decision {
        let Some(restrictions) = self.restrictions else {
            return decision;
        };
        if decision.allow && !restrictions.allows(self.registry, self.rules.action(), target) {
            return Decision::denied(
                format!("actor restrictions: {} not in allowlist", self.rules.action()),
                None,
            );
        }
        decision
    }

    /// Coarse filter over databases.
    ///
    /// Returns `None` when any database may contain allowed resources,
    /// otherwise the set of databases that are named by an allow rule.
    pub fn candidate_parents(&self) -> Option<BTreeSet<String>> {
        if !evaluate(self.rules, &ResourceRef::instance()).allow {
            return Some(self.rules.parents_with_allow().map(str::to_string).collect());
        }
        // Global allow: only an allowlist can narrow the databases.
        match self.restrictions {
            Some(restrictions) if !restrictions.allows_globally(self.registry, self.rules.action()) => {
                let mut parents: BTreeSet<String> = restrictions.database_actions.keys().cloned().collect();
                parents.extend(restrictions.table_actions.keys().cloned());
                Some(parents)
            }
            _ => None,
        }
    }

    /// Whether any table below `parent` can possibly be allowed.
    ///
    /// When this is `false` the tables of `parent` need not be enumerated:
    /// without a child-level allow, every table inherits the database or
    /// global outcome, or is denied outright.
    pub fn may_allow_within(&self, parent: &str) -> bool {
        let database = ResourceRef::database(parent);
        if let Some(restrictions) = self.restrictions {
            if !restrictions.allows(self.registry, self.rules.action(), &database) {
                return false;
            }
        }
        self.rules.has_child_allow_under(parent) || evaluate(self.rules, &database).allow
    }
}
