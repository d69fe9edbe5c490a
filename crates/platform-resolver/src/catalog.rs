//! Resource catalog interface.
//!
//! The catalog is owned by the surrounding system and enumerates the
//! databases and tables that exist. The resolver only reads it and may do so
//! from many concurrent resolutions.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use platform_permissions::ResourceRef;

use crate::error::CatalogResult;

/// Read access to the hierarchy of resources.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// List resources one level below `parent`.
    ///
    /// - `None` lists every database as `(db, None)`
    /// - `Some(db)` lists every table of `db` as `(db, table)`
    async fn list_resources(&self, parent: Option<&str>) -> CatalogResult<Vec<ResourceRef>>;

    /// Whether a resource exists. The instance always exists.
    async fn resource_exists(&self, resource: &ResourceRef) -> CatalogResult<bool>;
}

/// In-memory catalog.
///
/// Suitable for tests and for embedding where the resource list is known
/// up front. Resources may be added or removed while resolutions are in
/// flight.
///
/// # Example
///
/// ```
/// use platform_resolver::catalog::{Catalog, MemoryCatalog};
///
/// # async fn example() {
/// let catalog = MemoryCatalog::new()
///     .with_table("reports", "daily_metrics")
///     .with_database("empty");
///
/// let dbs = catalog.list_resources(None).await.unwrap();
/// assert_eq!(dbs.len(), 2);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    databases: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a database (builder style).
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.databases.get_mut().entry(database.into()).or_default();
        self
    }

    /// Add a table, creating its database if needed (builder style).
    pub fn with_table(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        self.databases
            .get_mut()
            .entry(database.into())
            .or_default()
            .insert(table.into());
        self
    }

    /// Add a table to a live catalog.
    pub async fn insert_table(&self, database: impl Into<String>, table: impl Into<String>) {
        self.databases
            .write()
            .await
            .entry(database.into())
            .or_default()
            .insert(table.into());
    }

    /// Remove a database and all of its tables.
    pub async fn remove_database(&self, database: &str) -> bool {
        self.databases.write().await.remove(database).is_some()
    }

    /// Total number of tables across all databases.
    pub async fn table_count(&self) -> usize {
        self.databases.read().await.values().map(BTreeSet::len).sum()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_resources(&self, parent: Option<&str>) -> CatalogResult<Vec<ResourceRef>> {
        let databases = self.databases.read().await;
        let resources = match parent {
            None => databases.keys().map(ResourceRef::database).collect(),
            Some(db) => databases
                .get(db)
                .map(|tables| tables.iter().map(|t| ResourceRef::table(db, t.as_str())).collect())
                .unwrap_or_default(),
        };
        Ok(resources)
    }

    async fn resource_exists(&self, resource: &ResourceRef) -> CatalogResult<bool> {
        let databases = self.databases.read().await;
        let exists = match (resource.parent.as_deref(), resource.child.as_deref()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(db), None) => databases.contains_key(db),
            (Some(db), Some(table)) => databases.get(db).is_some_and(|tables| tables.contains(table)),
        };
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new()
            .with_table("reports", "daily_metrics")
            .with_table("reports", "weekly_metrics")
            .with_table("finance", "ledger")
            .with_database("scratch")
    }

    #[tokio::test]
    async fn test_list_databases() {
        let dbs = catalog().list_resources(None).await.unwrap();
        assert_eq!(
            dbs,
            vec![
                ResourceRef::database("finance"),
                ResourceRef::database("reports"),
                ResourceRef::database("scratch"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_tables() {
        let catalog = catalog();
        let tables = catalog.list_resources(Some("reports")).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert!(tables.contains(&ResourceRef::table("reports", "weekly_metrics")));

        assert!(catalog.list_resources(Some("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resource_exists() {
        let catalog = catalog();
        assert!(catalog.resource_exists(&ResourceRef::instance()).await.unwrap());
        assert!(catalog.resource_exists(&ResourceRef::database("scratch")).await.unwrap());
        assert!(catalog.resource_exists(&ResourceRef::table("finance", "ledger")).await.unwrap());
        assert!(!catalog.resource_exists(&ResourceRef::table("finance", "payroll")).await.unwrap());
    }

    #[tokio::test]
    async fn test_live_updates() {
        let catalog = catalog();
        catalog.insert_table("scratch", "tmp").await;
        assert_eq!(catalog.table_count().await, 4);

        assert!(catalog.remove_database("finance").await);
        assert!(!catalog.resource_exists(&ResourceRef::database("finance")).await.unwrap());
    }
}
