//! # Resources
//!
//! Defines the two-level resource addressing used by permission rules
//! and the catalog. A resource is located by a `(parent, child)` pair:
//!
//! - `(None, None)` - the entire instance
//! - `(Some("db"), None)` - an entire database
//! - `(Some("db"), Some("table"))` - a single table (or query) in a database

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RuleError, RuleResult};

/// The level of the resource hierarchy an action operates on.
///
/// Determines which resources the catalog enumerates when listing
/// everything an actor may act upon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
    /// The whole instance. Takes neither parent nor child.
    Instance,

    /// A database. Takes a parent only.
    Database,

    /// A table, view or query inside a database. Takes parent and child.
    Table,
}

impl ResourceScope {
    /// Get the string representation of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceScope::Instance => "instance",
            ResourceScope::Database => "database",
            ResourceScope::Table => "table",
        }
    }

    /// Whether actions in this scope are addressed with a parent.
    pub fn takes_parent(&self) -> bool {
        !matches!(self, ResourceScope::Instance)
    }

    /// Whether actions in this scope are addressed with a child.
    pub fn takes_child(&self) -> bool {
        matches!(self, ResourceScope::Table)
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hierarchical resource address.
///
/// `None` at either level is the wildcard marker when the reference is
/// used as a rule pattern, and "the whole thing" when used as a target.
///
/// # Example
///
/// ```
/// use platform_permissions::resources::ResourceRef;
///
/// let table = ResourceRef::table("reports", "daily_metrics");
/// assert_eq!(table.to_string(), "/reports/daily_metrics");
///
/// let db = ResourceRef::database("reports");
/// assert!(db.contains(&table));
/// assert!(!table.contains(&db));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    /// Parent identifier (database name), or `None` for the instance.
    pub parent: Option<String>,
    /// Child identifier (table or query name), or `None`.
    pub child: Option<String>,
}

impl ResourceRef {
    /// Create a resource reference from optional parts.
    pub fn new(parent: Option<String>, child: Option<String>) -> Self {
        Self { parent, child }
    }

    /// The instance-level resource.
    pub fn instance() -> Self {
        Self::default()
    }

    /// A database-level resource.
    pub fn database(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            child: None,
        }
    }

    /// A table-level resource.
    pub fn table(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            child: Some(child.into()),
        }
    }

    /// Check the structural invariants of the address.
    ///
    /// A child without a parent is rejected, as are empty identifiers.
    pub fn validate(&self) -> RuleResult<()> {
        if self.child.is_some() && self.parent.is_none() {
            return Err(RuleError::ChildWithoutParent {
                child: self.child.clone().unwrap_or_default(),
            });
        }
        if matches!(self.parent.as_deref(), Some("")) || matches!(self.child.as_deref(), Some("")) {
            return Err(RuleError::EmptyIdentifier);
        }
        Ok(())
    }

    /// The scope this reference addresses when used as a target.
    pub fn scope(&self) -> ResourceScope {
        match (&self.parent, &self.child) {
            (None, _) => ResourceScope::Instance,
            (Some(_), None) => ResourceScope::Database,
            (Some(_), Some(_)) => ResourceScope::Table,
        }
    }

    /// Treat `self` as a wildcard pattern and test it against `target`.
    ///
    /// `None` on the pattern side matches any value, including `None`.
    /// A concrete pattern value only matches the identical target value.
    pub fn contains(&self, target: &ResourceRef) -> bool {
        pattern_matches(self.parent.as_deref(), self.child.as_deref(), target)
    }

    /// The database-level reference enclosing this resource.
    pub fn parent_ref(&self) -> ResourceRef {
        ResourceRef {
            parent: self.parent.clone(),
            child: None,
        }
    }
}

/// Wildcard match of a `(parent, child)` pattern against a target.
pub fn pattern_matches(parent: Option<&str>, child: Option<&str>, target: &ResourceRef) -> bool {
    let parent_ok = parent.map_or(true, |p| target.parent.as_deref() == Some(p));
    let child_ok = child.map_or(true, |c| target.child.as_deref() == Some(c));
    parent_ok && child_ok
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.parent, &self.child) {
            (None, _) => f.write_str("/"),
            (Some(p), None) => write!(f, "/{}", p),
            (Some(p), Some(c)) => write!(f, "/{}/{}", p, c),
        }
    }
}

impl From<(&str, &str)> for ResourceRef {
    fn from((parent, child): (&str, &str)) -> Self {
        ResourceRef::table(parent, child)
    }
}

impl From<&str> for ResourceRef {
    fn from(parent: &str) -> Self {
        ResourceRef::database(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_of_reference() {
        assert_eq!(ResourceRef::instance().scope(), ResourceScope::Instance);
        assert_eq!(ResourceRef::database("db").scope(), ResourceScope::Database);
        assert_eq!(ResourceRef::table("db", "t").scope(), ResourceScope::Table);
    }

    #[test]
    fn test_validate_rejects_orphan_child() {
        let orphan = ResourceRef::new(None, Some("t".to_string()));
        assert!(matches!(orphan.validate(), Err(RuleError::ChildWithoutParent { .. })));

        let empty = ResourceRef::new(Some(String::new()), None);
        assert!(matches!(empty.validate(), Err(RuleError::EmptyIdentifier)));

        assert!(ResourceRef::table("db", "t").validate().is_ok());
    }

    #[test]
    fn test_wildcard_containment() {
        let global = ResourceRef::instance();
        let db = ResourceRef::database("db");
        let table = ResourceRef::table("db", "t");
        let other = ResourceRef::table("other", "t");

        assert!(global.contains(&table));
        assert!(global.contains(&db));
        assert!(db.contains(&table));
        assert!(!db.contains(&other));
        assert!(table.contains(&table));

        // A table pattern never covers the database as a whole.
        assert!(!table.contains(&db));
    }

    #[test]
    fn test_display_paths() {
        assert_eq!(ResourceRef::instance().to_string(), "/");
        assert_eq!(ResourceRef::database("db").to_string(), "/db");
        assert_eq!(ResourceRef::table("db", "t").to_string(), "/db/t");
    }

    #[test]
    fn test_ordering_groups_by_parent() {
        let mut refs = vec![
            ResourceRef::table("b", "x"),
            ResourceRef::table("a", "z"),
            ResourceRef::table("a", "y"),
        ];
        refs.sort();
        assert_eq!(refs[0], ResourceRef::table("a", "y"));
        assert_eq!(refs[2], ResourceRef::table("b", "x"));
    }
}
