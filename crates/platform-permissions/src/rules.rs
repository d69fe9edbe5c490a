//! # Rules
//!
//! The atomic unit contributed by extension modules, the specificity tiers
//! that order rules, and the decisions produced by evaluating them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RuleError, RuleResult};
use crate::resources::{pattern_matches, ResourceRef};

/// Reason reported when no rule matches a resource.
pub const DEFAULT_DENY_REASON: &str = "no matching rule - default deny";

/// Precedence tier of a rule, derived from its resource pattern.
///
/// Ordered so that `Child > Parent > Global`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Specificity {
    /// `(None, None)` - applies to everything.
    Global,
    /// `(parent, None)` - applies to a database and everything in it.
    Parent,
    /// `(parent, child)` - applies to one table.
    Child,
}

impl Specificity {
    /// Derive the tier of a resource pattern.
    pub fn of(pattern: &ResourceRef) -> Self {
        match (&pattern.parent, &pattern.child) {
            (_, Some(_)) => Specificity::Child,
            (Some(_), None) => Specificity::Parent,
            (None, None) => Specificity::Global,
        }
    }

    /// Numeric depth (0 global, 1 parent, 2 child).
    pub fn depth(&self) -> u8 {
        match self {
            Specificity::Global => 0,
            Specificity::Parent => 1,
            Specificity::Child => 2,
        }
    }

    /// All tiers, most specific first.
    pub fn descending() -> [Specificity; 3] {
        [Specificity::Child, Specificity::Parent, Specificity::Global]
    }
}

/// A single allow or deny statement about a resource pattern.
///
/// # Example
///
/// ```
/// use platform_permissions::rules::{Rule, Specificity};
///
/// let rule = Rule::allow("reports-plugin", Some("reports"), Some("daily"), "analysts");
/// assert_eq!(rule.specificity(), Specificity::Child);
/// assert!(rule.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rule {
    /// Contributor that produced the rule.
    pub source: String,
    /// Parent pattern; `None` matches any parent.
    pub parent: Option<String>,
    /// Child pattern; `None` matches any child.
    pub child: Option<String>,
    /// `true` to grant, `false` to refuse.
    pub allow: bool,
    /// Human readable justification.
    pub reason: String,
}

impl Rule {
    /// Create a rule.
    pub fn new(
        source: impl Into<String>,
        parent: Option<&str>,
        child: Option<&str>,
        allow: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            parent: parent.map(str::to_string),
            child: child.map(str::to_string),
            allow,
            reason: reason.into(),
        }
    }

    /// Create an allow rule.
    pub fn allow(
        source: impl Into<String>,
        parent: Option<&str>,
        child: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(source, parent, child, true, reason)
    }

    /// Create a deny rule.
    pub fn deny(
        source: impl Into<String>,
        parent: Option<&str>,
        child: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(source, parent, child, false, reason)
    }

    /// Instance-wide allow.
    pub fn allow_all(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::allow(source, None, None, reason)
    }

    /// Instance-wide deny.
    pub fn deny_all(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::deny(source, None, None, reason)
    }

    /// The resource pattern of this rule.
    pub fn pattern(&self) -> ResourceRef {
        ResourceRef::new(self.parent.clone(), self.child.clone())
    }

    /// Precedence tier of this rule.
    pub fn specificity(&self) -> Specificity {
        match (&self.parent, &self.child) {
            (_, Some(_)) => Specificity::Child,
            (Some(_), None) => Specificity::Parent,
            (None, None) => Specificity::Global,
        }
    }

    /// Whether this rule's pattern matches `target` under wildcard semantics.
    pub fn matches(&self, target: &ResourceRef) -> bool {
        pattern_matches(self.parent.as_deref(), self.child.as_deref(), target)
    }

    /// Check the rule invariants.
    pub fn validate(&self) -> RuleResult<()> {
        if self.source.trim().is_empty() {
            return Err(RuleError::MissingSource);
        }
        self.pattern().validate()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] ({})",
            if self.allow { "allow" } else { "deny" },
            self.pattern(),
            self.source,
            self.reason
        )
    }
}

/// The outcome of evaluating a rule set against one resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    /// Whether the action is permitted.
    pub allow: bool,
    /// Representative rule of the winning tier; `None` on default deny.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<Rule>,
    /// Justification for the outcome.
    pub reason: String,
}

impl Decision {
    /// The fail-closed decision used when nothing matches.
    pub fn default_deny() -> Self {
        Self {
            allow: false,
            matched_rule: None,
            reason: DEFAULT_DENY_REASON.to_string(),
        }
    }

    /// A decision taken from a winning rule.
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            allow: rule.allow,
            matched_rule: Some(rule.clone()),
            reason: rule.reason.clone(),
        }
    }

    /// A deny that overrides an earlier outcome with a new reason.
    pub fn denied(reason: impl Into<String>, matched_rule: Option<Rule>) -> Self {
        Self {
            allow: false,
            matched_rule,
            reason: reason.into(),
        }
    }

    /// Whether the decision came from the default-deny fallback.
    pub fn is_default(&self) -> bool {
        self.matched_rule.is_none() && self.reason == DEFAULT_DENY_REASON
    }

    /// Tier of the matched rule, if any.
    pub fn tier(&self) -> Option<Specificity> {
        self.matched_rule.as_ref().map(Rule::specificity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specificity_order() {
        assert!(Specificity::Child > Specificity::Parent);
        assert!(Specificity::Parent > Specificity::Global);
        assert_eq!(Specificity::descending()[0], Specificity::Child);
        assert_eq!(Specificity::Child.depth(), 2);
    }

    #[test]
    fn test_rule_specificity() {
        assert_eq!(Rule::allow_all("s", "r").specificity(), Specificity::Global);
        assert_eq!(Rule::allow("s", Some("db"), None, "r").specificity(), Specificity::Parent);
        assert_eq!(Rule::deny("s", Some("db"), Some("t"), "r").specificity(), Specificity::Child);
    }

    #[test]
    fn test_rule_matching() {
        let target = ResourceRef::table("db", "t");

        assert!(Rule::allow_all("s", "r").matches(&target));
        assert!(Rule::allow("s", Some("db"), None, "r").matches(&target));
        assert!(Rule::allow("s", Some("db"), Some("t"), "r").matches(&target));
        assert!(!Rule::allow("s", Some("db"), Some("u"), "r").matches(&target));
        assert!(!Rule::allow("s", Some("other"), None, "r").matches(&target));

        // A table rule does not speak for the database as a whole.
        assert!(!Rule::allow("s", Some("db"), Some("t"), "r").matches(&ResourceRef::database("db")));
    }

    #[test]
    fn test_rule_validation() {
        assert_eq!(Rule::allow_all("", "r").validate(), Err(RuleError::MissingSource));
        assert!(matches!(
            Rule::allow("s", None, Some("t"), "r").validate(),
            Err(RuleError::ChildWithoutParent { .. })
        ));
        assert!(Rule::allow("s", Some("db"), Some("t"), "r").validate().is_ok());
    }

    #[test]
    fn test_default_deny_decision() {
        let decision = Decision::default_deny();
        assert!(!decision.allow);
        assert!(decision.is_default());
        assert_eq!(decision.tier(), None);
        assert!(decision.reason.contains("default deny"));
    }

    #[test]
    fn test_decision_from_rule() {
        let rule = Rule::deny("s", Some("db"), None, "blocked");
        let decision = Decision::from_rule(&rule);
        assert!(!decision.allow);
        assert_eq!(decision.reason, "blocked");
        assert_eq!(decision.tier(), Some(Specificity::Parent));
        assert!(!decision.is_default());
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule::allow("plugin", Some("db"), Some("t"), "ok");
        assert_eq!(rule.to_string(), "allow /db/t [plugin] (ok)");
    }
}
