//! Built-in contributors.
//!
//! - [`RootContributor`]: instance-wide allow for the `root` actor
//! - [`DefaultsContributor`]: default allows for the read-only view actions
//! - [`ConfigContributor`]: rules from a JSON permissions document
//!
//! All three are registered by
//! [`crate::PermissionResolver::with_builtin_contributors`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use platform_permissions::{actor_matches_allow, ActionRegistry, Actor, AllowBlock, Rule};

use crate::config::{ConfigError, ResolverConfig};
use crate::contributor::{Contribution, RuleContributor};
use crate::error::ContributorResult;

/// Actions allowed for everyone unless `default_deny` is set.
pub const DEFAULT_ALLOW_ACTIONS: &[&str] = &[
    "view-instance",
    "view-database",
    "view-database-download",
    "view-table",
    "view-query",
    "execute-sql",
];

/// Grants the `root` actor a global allow when enabled.
#[derive(Debug, Clone)]
pub struct RootContributor {
    enabled: bool,
}

impl RootContributor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl RuleContributor for RootContributor {
    fn name(&self) -> &str {
        "root"
    }

    async fn contribute(&self, actor: &Actor, _action: &str) -> ContributorResult<Contribution> {
        if !self.enabled || actor.id() != Some("root") {
            return Ok(Contribution::Abstain);
        }
        // Global tier only, so database and table denies still apply.
        Ok(Rule::allow_all(self.name(), "root user").into())
    }
}

/// Default allow rules for the view actions.
#[derive(Debug, Clone)]
pub struct DefaultsContributor {
    default_deny: bool,
    default_allow_sql: bool,
}

impl DefaultsContributor {
    pub fn new(default_deny: bool, default_allow_sql: bool) -> Self {
        Self {
            default_deny,
            default_allow_sql,
        }
    }

    /// Build from resolver configuration.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.default_deny, config.default_allow_sql)
    }
}

#[async_trait]
impl RuleContributor for DefaultsContributor {
    fn name(&self) -> &str {
        "default_permissions"
    }

    async fn contribute(&self, _actor: &Actor, action: &str) -> ContributorResult<Contribution> {
        if action == "execute-sql" && !self.default_allow_sql {
            return Ok(Rule::deny_all(self.name(), "default_allow_sql is false").into());
        }
        if self.default_deny || !DEFAULT_ALLOW_ACTIONS.contains(&action) {
            return Ok(Contribution::Abstain);
        }
        Ok(Rule::allow_all(self.name(), format!("default allow for {}", action)).into())
    }
}

/// Table-level permissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Who may view the table.
    pub allow: Option<AllowBlock>,
    /// Per-action allow blocks keyed by action name or abbreviation.
    pub permissions: BTreeMap<String, AllowBlock>,
}

/// A named query: either bare SQL or SQL with permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryConfig {
    /// Just the SQL text.
    Sql(String),
    /// SQL with access control.
    Options {
        #[serde(default)]
        sql: Option<String>,
        #[serde(default)]
        allow: Option<AllowBlock>,
        #[serde(default)]
        permissions: BTreeMap<String, AllowBlock>,
    },
}

/// Database-level permissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Who may view the database and its contents.
    pub allow: Option<AllowBlock>,
    /// Who may run arbitrary SQL against the database.
    pub allow_sql: Option<AllowBlock>,
    /// Per-action allow blocks.
    pub permissions: BTreeMap<String, AllowBlock>,
    /// Tables by name.
    pub tables: BTreeMap<String, TableConfig>,
    /// Named queries by name.
    pub queries: BTreeMap<String, QueryConfig>,
}

/// Instance permissions document.
///
/// # Example
///
/// ```
/// use platform_resolver::defaults::PermissionsConfig;
///
/// let config = PermissionsConfig::from_json(r#"{
///     "permissions": {"vi": {"id": "*"}},
///     "databases": {
///         "reports": {
///             "allow": {"groups": ["staff"]},
///             "tables": {"daily_metrics": {"allow": true}}
///         }
///     }
/// }"#).unwrap();
/// assert!(config.databases.contains_key("reports"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Who may view anything on the instance.
    pub allow: Option<AllowBlock>,
    /// Who may run arbitrary SQL anywhere.
    pub allow_sql: Option<AllowBlock>,
    /// Per-action allow blocks for the whole instance.
    pub permissions: BTreeMap<String, AllowBlock>,
    /// Databases by name.
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl PermissionsConfig {
    /// Parse a JSON permissions document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Collects rules for one evaluation of the permissions document.
struct ConfigRules<'a> {
    source: &'a str,
    actor: &'a Actor,
    rules: Vec<Rule>,
}

impl ConfigRules<'_> {
    fn push(&mut self, parent: Option<&str>, child: Option<&str>, block: Option<&AllowBlock>, scope: String) {
        let Some(block) = block else {
            return;
        };
        let allow = actor_matches_allow(self.actor, Some(block));
        let reason = format!("config {} {}", if allow { "allow" } else { "deny" }, scope);
        self.rules.push(Rule::new(self.source, parent, child, allow, reason));
    }
}

/// Contributes rules from a [`PermissionsConfig`].
///
/// Every block that applies to the action yields a rule at its level:
/// allow when the actor matches the block, deny otherwise.
#[derive(Debug, Clone)]
pub struct ConfigContributor {
    config: PermissionsConfig,
    registry: ActionRegistry,
}

impl ConfigContributor {
    /// Create a contributor using the built-in action registry.
    pub fn new(config: PermissionsConfig) -> Self {
        Self::with_registry(config, ActionRegistry::builtin())
    }

    /// Create a contributor resolving action aliases through `registry`.
    pub fn with_registry(config: PermissionsConfig, registry: ActionRegistry) -> Self {
        Self { config, registry }
    }

    fn lookup<'c>(&self, permissions: &'c BTreeMap<String, AllowBlock>, action: &str) -> Option<&'c AllowBlock> {
        self.registry
            .name_variants(action)
            .iter()
            .find_map(|variant| permissions.get(variant))
    }

    /// Rules the document implies for `actor` and `action`.
    pub fn rules_for(&self, actor: &Actor, action: &str) -> Vec<Rule> {
        let mut out = ConfigRules {
            source: self.name(),
            actor,
            rules: Vec::new(),
        };
        let config = &self.config;

        out.push(
            None,
            None,
            self.lookup(&config.permissions, action),
            format!("permissions for {}", action),
        );

        for (db, db_config) in &config.databases {
            out.push(
                Some(db.as_str()),
                None,
                self.lookup(&db_config.permissions, action),
                format!("permissions for {} on {}", action, db),
            );

            for (table, table_config) in &db_config.tables {
                out.push(
                    Some(db.as_str()),
                    Some(table.as_str()),
                    self.lookup(&table_config.permissions, action),
                    format!("permissions for {} on {}/{}", action, db, table),
                );
                if action == "view-table" {
                    out.push(
                        Some(db.as_str()),
                        Some(table.as_str()),
                        table_config.allow.as_ref(),
                        format!("allow for {} on {}/{}", action, db, table),
                    );
                }
            }

            for (query, query_config) in &db_config.queries {
                let QueryConfig::Options { allow, permissions, .. } = query_config else {
                    continue;
                };
                out.push(
                    Some(db.as_str()),
                    Some(query.as_str()),
                    self.lookup(permissions, action),
                    format!("permissions for {} on {}/{}", action, db, query),
                );
                if action == "view-query" {
                    out.push(
                        Some(db.as_str()),
                        Some(query.as_str()),
                        allow.as_ref(),
                        format!("allow for {} on {}/{}", action, db, query),
                    );
                }
            }

            match action {
                "view-database" | "view-table" | "view-query" => out.push(
                    Some(db.as_str()),
                    None,
                    db_config.allow.as_ref(),
                    format!("allow for {} on {}", action, db),
                ),
                "execute-sql" => out.push(
                    Some(db.as_str()),
                    None,
                    db_config.allow_sql.as_ref(),
                    format!("allow_sql for {}", db),
                ),
                _ => {}
            }
        }

        match action {
            "view-instance" | "view-database" | "view-table" | "view-query" => out.push(
                None,
                None,
                config.allow.as_ref(),
                format!("allow for {}", action),
            ),
            "execute-sql" => out.push(None, None, config.allow_sql.as_ref(), "allow_sql".to_string()),
            _ => {}
        }

        out.rules
    }
}

#[async_trait]
impl RuleContributor for ConfigContributor {
    fn name(&self) -> &str {
        "config"
    }

    async fn contribute(&self, actor: &Actor, action: &str) -> ContributorResult<Contribution> {
        let rules = self.rules_for(actor, action);
        if rules.is_empty() {
            return Ok(Contribution::Abstain);
        }
        Ok(rules.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor(value: serde_json::Value) -> Actor {
        Actor::from_value(value)
    }

    #[tokio::test]
    async fn test_root_contributor() {
        let enabled = RootContributor::new(true);
        let rules = enabled
            .contribute(&Actor::with_id("root"), "drop-table")
            .await
            .unwrap()
            .into_rules();
        assert_eq!(rules, vec![Rule::allow_all("root", "root user")]);

        let other = enabled.contribute(&Actor::with_id("alice"), "drop-table").await.unwrap();
        assert!(other.is_empty());

        let disabled = RootContributor::new(false);
        assert!(disabled
            .contribute(&Actor::with_id("root"), "view-table")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_defaults_allow_view_actions() {
        let defaults = DefaultsContributor::new(false, false);
        let anonymous = Actor::anonymous();

        let view = defaults.contribute(&anonymous, "view-table").await.unwrap().into_rules();
        assert_eq!(view[0].reason, "default allow for view-table");
        assert!(view[0].allow);

        assert!(defaults.contribute(&anonymous, "drop-table").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_execute_sql_setting() {
        let anonymous = Actor::anonymous();

        let off = DefaultsContributor::new(false, false)
            .contribute(&anonymous, "execute-sql")
            .await
            .unwrap()
            .into_rules();
        assert_eq!(off.len(), 1);
        assert!(!off[0].allow);
        assert_eq!(off[0].reason, "default_allow_sql is false");

        let on = DefaultsContributor::new(false, true)
            .contribute(&anonymous, "execute-sql")
            .await
            .unwrap()
            .into_rules();
        assert!(on[0].allow);
    }

    #[tokio::test]
    async fn test_default_deny_disables_allows() {
        let defaults = DefaultsContributor::from_config(&ResolverConfig {
            default_deny: true,
            default_allow_sql: true,
            ..Default::default()
        });
        assert!(defaults
            .contribute(&Actor::anonymous(), "view-instance")
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_permissions_config() {
        let config = PermissionsConfig::from_json(
            r#"{
                "allow": {"id": "*"},
                "databases": {
                    "reports": {
                        "allow_sql": false,
                        "tables": {"daily": {"permissions": {"ir": true}}},
                        "queries": {
                            "bare": "select 1",
                            "guarded": {"sql": "select 2", "allow": {"id": "alice"}}
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let reports = &config.databases["reports"];
        assert_eq!(reports.allow_sql, Some(AllowBlock::Flag(false)));
        assert_eq!(reports.queries["bare"], QueryConfig::Sql("select 1".to_string()));
        assert!(matches!(reports.queries["guarded"], QueryConfig::Options { .. }));
        assert!(PermissionsConfig::from_json("[").is_err());
    }

    #[test]
    fn test_config_rules_match_actor() {
        let config = PermissionsConfig::from_json(
            r#"{"databases": {"reports": {"allow": {"groups": ["staff"]}}}}"#,
        )
        .unwrap();
        let contributor = ConfigContributor::new(config);

        let staff = contributor.rules_for(&actor(json!({"id": "a", "groups": ["staff"]})), "view-table");
        assert_eq!(staff.len(), 1);
        assert!(staff[0].allow);
        assert_eq!(staff[0].parent.as_deref(), Some("reports"));
        assert_eq!(staff[0].reason, "config allow allow for view-table on reports");

        let outsider = contributor.rules_for(&actor(json!({"id": "b"})), "view-table");
        assert!(!outsider[0].allow);

        assert!(contributor.rules_for(&actor(json!({"id": "a"})), "insert-row").is_empty());
    }

    #[test]
    fn test_config_permissions_by_abbreviation() {
        let config = PermissionsConfig::from_json(
            r#"{"databases": {"db": {"tables": {"t": {"permissions": {"ir": {"id": "alice"}}}}}}}"#,
        )
        .unwrap();
        let rules = ConfigContributor::new(config).rules_for(&Actor::with_id("alice"), "insert-row");

        assert_eq!(rules.len(), 1);
        assert!(rules[0].allow);
        assert_eq!(rules[0].child.as_deref(), Some("t"));
        assert_eq!(rules[0].reason, "config allow permissions for insert-row on db/t");
    }

    #[test]
    fn test_config_unauthenticated_allow() {
        let config = PermissionsConfig::from_json(r#"{"allow": {"unauthenticated": true}}"#).unwrap();
        let contributor = ConfigContributor::new(config);

        let anonymous = contributor.rules_for(&Actor::anonymous(), "view-instance");
        assert!(anonymous[0].allow);

        let signed_in = contributor.rules_for(&Actor::with_id("alice"), "view-instance");
        assert!(!signed_in[0].allow);
    }
}
