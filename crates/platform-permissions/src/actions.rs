//! # Actions
//!
//! Actions are stable string names for capabilities being checked, such as
//! `view-table` or `execute-sql`. The resolver treats them as opaque keys;
//! the registry adds the metadata needed to enumerate resources for an
//! action and to honour short aliases in allowlists.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::resources::ResourceScope;

/// Metadata describing a registered action.
///
/// # Example
///
/// ```
/// use platform_permissions::actions::ActionDef;
/// use platform_permissions::resources::ResourceScope;
///
/// let action = ActionDef::new("view-table", ResourceScope::Table)
///     .with_abbr("vt")
///     .with_description("View table");
/// assert_eq!(action.abbr.as_deref(), Some("vt"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionDef {
    /// Canonical name (e.g. `view-table`).
    pub name: String,
    /// Short alias accepted in allowlists (e.g. `vt`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbr: Option<String>,
    /// Human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Level of the resource hierarchy the action applies to.
    pub scope: ResourceScope,
    /// Another action that must also be permitted on the same resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub also_requires: Option<String>,
}

impl ActionDef {
    /// Create an action definition.
    pub fn new(name: impl Into<String>, scope: ResourceScope) -> Self {
        Self {
            name: name.into(),
            abbr: None,
            description: None,
            scope,
            also_requires: None,
        }
    }

    /// Set the abbreviation.
    pub fn with_abbr(mut self, abbr: impl Into<String>) -> Self {
        self.abbr = Some(abbr.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a prerequisite action.
    pub fn with_also_requires(mut self, action: impl Into<String>) -> Self {
        self.also_requires = Some(action.into());
        self
    }

    /// Whether `name` refers to this action by full name or abbreviation.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.abbr.as_deref() == Some(name)
    }
}

/// Registry of known actions, keyed by canonical name.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionDef>,
    aliases: BTreeMap<String, String>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the core actions.
    pub fn builtin() -> Self {
        use ResourceScope::*;

        let mut registry = Self::new();
        let defs = [
            ActionDef::new("view-instance", Instance)
                .with_abbr("vi")
                .with_description("View instance"),
            ActionDef::new("permissions-debug", Instance)
                .with_abbr("pd")
                .with_description("Access permission debug tool"),
            ActionDef::new("debug-menu", Instance)
                .with_abbr("dm")
                .with_description("View debug menu items"),
            ActionDef::new("view-database", Database)
                .with_abbr("vd")
                .with_description("View database"),
            ActionDef::new("view-database-download", Database)
                .with_abbr("vdd")
                .with_description("Download database file")
                .with_also_requires("view-database"),
            ActionDef::new("execute-sql", Database)
                .with_abbr("es")
                .with_description("Execute read-only SQL queries")
                .with_also_requires("view-database"),
            ActionDef::new("create-table", Database)
                .with_abbr("ct")
                .with_description("Create tables"),
            ActionDef::new("view-table", Table)
                .with_abbr("vt")
                .with_description("View table"),
            ActionDef::new("insert-row", Table)
                .with_abbr("ir")
                .with_description("Insert rows"),
            ActionDef::new("delete-row", Table)
                .with_abbr("dr")
                .with_description("Delete rows"),
            ActionDef::new("update-row", Table)
                .with_abbr("ur")
                .with_description("Update rows"),
            ActionDef::new("alter-table", Table)
                .with_abbr("at")
                .with_description("Alter tables"),
            ActionDef::new("drop-table", Table)
                .with_abbr("dt")
                .with_description("Drop tables"),
            ActionDef::new("view-query", Table)
                .with_abbr("vq")
                .with_description("View named query results"),
        ];
        for def in defs {
            registry.register(def);
        }
        registry
    }

    /// Register an action, replacing any previous definition of the same name.
    pub fn register(&mut self, action: ActionDef) {
        if let Some(abbr) = &action.abbr {
            self.aliases.insert(abbr.clone(), action.name.clone());
        }
        self.actions.insert(action.name.clone(), action);
    }

    /// Look up an action by canonical name or abbreviation.
    pub fn get(&self, name: &str) -> Option<&ActionDef> {
        self.actions
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|full| self.actions.get(full)))
    }

    /// Whether an action is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All names an action answers to (full name plus abbreviation).
    ///
    /// Unregistered actions answer only to themselves.
    pub fn name_variants(&self, name: &str) -> HashSet<String> {
        let mut variants = HashSet::new();
        variants.insert(name.to_string());
        if let Some(def) = self.get(name) {
            variants.insert(def.name.clone());
            if let Some(abbr) = &def.abbr {
                variants.insert(abbr.clone());
            }
        }
        variants
    }

    /// Whether any entry of `list` names `action`.
    pub fn action_in_list<S: AsRef<str>>(&self, action: &str, list: &[S]) -> bool {
        let variants = self.name_variants(action);
        list.iter().any(|entry| variants.contains(entry.as_ref()))
    }

    /// Iterate over all registered actions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionDef> {
        self.actions.values()
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
