//! Storage collaborators
//!
//! The resolver layer talks to storage only through the [`Storage`] trait and the
//! [`QueryHandle`] builder returned by `begin_query`. Two implementations ship with the
//! crate: [`MemoryStorage`] for tests and embedding, and `SqliteStorage` on top of sqlx.

pub mod graph;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod values;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::graphql::orm::FetchPlan;

pub use graph::{LevelQuery, RowSource, fetch_graph};
pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

/// Rows a read is restricted to, by primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyScope {
    All,
    One(Value),
    Many(Vec<Value>),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Execute `plan` against `entity`, returning one JSON object per root row with nested
    /// relations already stitched in.
    async fn select(&self, entity: &str, scope: KeyScope, plan: &FetchPlan) -> Result<Vec<Value>>;

    /// Insert a row and return it with every scalar column.
    async fn insert(&self, entity: &str, row: Map<String, Value>) -> Result<Value>;

    /// Patch the row under `key` and return it, or `None` if no such row exists.
    async fn patch(&self, entity: &str, key: &Value, patch: Map<String, Value>)
    -> Result<Option<Value>>;

    /// Delete the row under `key`, returning how many rows were removed.
    async fn delete(&self, entity: &str, key: &Value) -> Result<u64>;
}

impl<'s> dyn Storage + 's {
    pub fn begin_query(&self, entity: &str) -> QueryHandle<'_> {
        QueryHandle {
            storage: self,
            entity: entity.to_string(),
            plan: FetchPlan::default(),
        }
    }
}

/// Fluent handle for one storage operation on an entity.
///
/// ```ignore
/// let course = storage
///     .begin_query("Course")
///     .with_fetch_plan(plan)
///     .find_by_key(json!(1))
///     .await?;
/// ```
pub struct QueryHandle<'a> {
    storage: &'a dyn Storage,
    entity: String,
    plan: FetchPlan,
}

impl<'a> QueryHandle<'a> {
    pub fn with_fetch_plan(mut self, plan: FetchPlan) -> Self {
        self.plan = plan;
        self
    }

    pub async fn find_by_key(self, key: Value) -> Result<Option<Value>> {
        let rows = self
            .storage
            .select(&self.entity, KeyScope::One(key), &self.plan)
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_by_keys(self, keys: Vec<Value>) -> Result<Vec<Value>> {
        self.storage
            .select(&self.entity, KeyScope::Many(keys), &self.plan)
            .await
    }

    pub async fn find_all(self) -> Result<Vec<Value>> {
        self.storage
            .select(&self.entity, KeyScope::All, &self.plan)
            .await
    }

    pub async fn insert(self, row: Map<String, Value>) -> Result<Value> {
        self.storage.insert(&self.entity, row).await
    }

    pub async fn patch_by_key(self, key: Value, patch: Map<String, Value>) -> Result<Option<Value>> {
        self.storage.patch(&self.entity, &key, patch).await
    }

    pub async fn delete_by_key(self, key: Value) -> Result<u64> {
        self.storage.delete(&self.entity, &key).await
    }
}
