//! Actor restriction allowlists
//!
//! Tokens and delegated actors may carry an `_r` key that narrows what they
//! can do regardless of the rules contributed for them:
//!
//! ```text
//! {
//!   "a": ["vi", "pd"],                 global actions
//!   "d": {"mydb": ["vt", "es"]},       database-level actions
//!   "r": {"mydb": {"users": ["vt"]}}   table-level actions
//! }
//! ```
//!
//! Entries may use full action names or abbreviations.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::actions::ActionRegistry;
use crate::resources::ResourceRef;

/// Parsed `_r` allowlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorRestrictions {
    /// Actions allowed on every resource.
    pub global_actions: Vec<String>,
    /// Actions allowed per database.
    pub database_actions: BTreeMap<String, Vec<String>>,
    /// Actions allowed per table, grouped by database.
    pub table_actions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

impl ActorRestrictions {
    /// Parse the `_r` value. Malformed sections are treated as empty,
    /// which narrows rather than widens access.
    pub fn from_value(value: &Value) -> Self {
        let global_actions = value.get("a").map(string_list).unwrap_or_default();

        let database_actions = value
            .get("d")
            .and_then(Value::as_object)
            .map(|dbs| dbs.iter().map(|(db, actions)| (db.clone(), string_list(actions))).collect())
            .unwrap_or_default();

        let table_actions = value
            .get("r")
            .and_then(Value::as_object)
            .map(|dbs| {
                dbs.iter()
                    .map(|(db, tables)| {
                        let tables = tables
                            .as_object()
                            .map(|tables| {
                                tables
                                    .iter()
                                    .map(|(table, actions)| (table.clone(), string_list(actions)))
                                    .collect()
                            })
                            .unwrap_or_default();
                        (db.clone(), tables)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            global_actions,
            database_actions,
            table_actions,
        }
    }

    /// Whether the action is allowlisted for every resource.
    pub fn allows_globally(&self, registry: &ActionRegistry, action: &str) -> bool {
        registry.action_in_list(action, &self.global_actions)
    }

    /// Whether the allowlist covers `action` on `resource`.
    ///
    /// A database-level resource is covered when the database itself is
    /// listed or when any of its tables is listed for the action, so that
    /// callers can still reach the allowlisted tables. The instance is
    /// covered whenever anything at all is listed for the action.
    pub fn allows(&self, registry: &ActionRegistry, action: &str, resource: &ResourceRef) -> bool {
        if self.allows_globally(registry, action) {
            return true;
        }

        let Some(parent) = resource.parent.as_deref() else {
            return self
                .database_actions
                .values()
                .any(|actions| registry.action_in_list(action, actions))
                || self.any_table_listed(registry, action, None);
        };

        if self
            .database_actions
            .get(parent)
            .is_some_and(|actions| registry.action_in_list(action, actions))
        {
            return true;
        }

        match resource.child.as_deref() {
            Some(child) => self
                .table_actions
                .get(parent)
                .and_then(|tables| tables.get(child))
                .is_some_and(|actions| registry.action_in_list(action, actions)),
            None => self.any_table_listed(registry, action, Some(parent)),
        }
    }

    fn any_table_listed(&self, registry: &ActionRegistry, action: &str, parent: Option<&str>) -> bool {
        self.table_actions
            .iter()
            .filter(|(db, _)| parent.map_or(true, |p| p == db.as_str()))
            .flat_map(|(_, tables)| tables.values())
            .any(|actions| registry.action_in_list(action, actions))
    }
}
