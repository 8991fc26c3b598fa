//! In-process storage
//!
//! Rows live in per-entity vectors behind a lock. Primary keys are auto-incremented
//! integers unless the caller supplies one. Reads go through the shared graph fetcher, so
//! nested plans behave the same as on SQLite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::graph::{LevelQuery, Row, RowSource, fetch_graph};
use super::values::{matches, sort_order, values_equal};
use super::{KeyScope, Storage};
use crate::error::{Error, Result};
use crate::graphql::entities::{EntityDescriptor, EntityRegistry};
use crate::graphql::orm::FetchPlan;

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_key: i64,
}

pub struct MemoryStorage {
    registry: Arc<EntityRegistry>,
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStorage {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            registry,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Number of rows currently stored for `entity`.
    pub fn count(&self, entity: &str) -> usize {
        self.tables
            .read()
            .get(entity)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    fn descriptor(&self, entity: &str) -> Result<&EntityDescriptor> {
        self.registry
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }
}

/// Keep only declared scalar columns.
fn scalar_values(entity: &EntityDescriptor, values: Map<String, Value>) -> Row {
    values
        .into_iter()
        .filter(|(name, _)| entity.has_scalar(name))
        .collect()
}

/// Every scalar column of `row`, in declaration order.
fn full_row(entity: &EntityDescriptor, row: &Row) -> Value {
    Value::Object(
        entity
            .scalar_fields()
            .map(|(name, _)| {
                (
                    name.to_string(),
                    row.get(name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect(),
    )
}

fn primary_field(entity: &EntityDescriptor) -> Result<&str> {
    entity
        .primary_field()
        .ok_or_else(|| Error::Storage(format!("{} has no primary field", entity.name)))
}

#[async_trait]
impl RowSource for MemoryStorage {
    fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    async fn fetch_rows(&self, query: &LevelQuery<'_>) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(&query.entity.name) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&Row> = table
            .rows
            .iter()
            .filter(|row| {
                let keyed = query.key.as_ref().is_none_or(|(column, values)| {
                    let value = row.get(column).unwrap_or(&Value::Null);
                    values.iter().any(|v| values_equal(value, v))
                });
                keyed
                    && query.predicates.iter().all(|p| {
                        matches(p.op, row.get(&p.field).unwrap_or(&Value::Null), &p.value)
                    })
            })
            .collect();

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order
                    .iter()
                    .map(|(field, descending)| {
                        let ordering = sort_order(
                            a.get(*field).unwrap_or(&Value::Null),
                            b.get(*field).unwrap_or(&Value::Null),
                        );
                        if *descending { ordering.reverse() } else { ordering }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                query
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn select(&self, entity: &str, scope: KeyScope, plan: &FetchPlan) -> Result<Vec<Value>> {
        fetch_graph(self, entity, scope, plan).await
    }

    async fn insert(&self, entity: &str, row: Map<String, Value>) -> Result<Value> {
        let descriptor = self.descriptor(entity)?;
        let mut row = scalar_values(descriptor, row);

        let mut tables = self.tables.write();
        let table = tables.entry(entity.to_string()).or_default();

        if let Some(primary) = descriptor.primary_field() {
            match row.get(primary).filter(|key| !key.is_null()) {
                Some(key) => {
                    let taken = table
                        .rows
                        .iter()
                        .any(|other| other.get(primary).is_some_and(|v| values_equal(v, key)));
                    if taken {
                        return Err(Error::Storage(format!(
                            "duplicate primary key {key} for {entity}"
                        )));
                    }
                    if let Some(key) = key.as_i64() {
                        table.next_key = table.next_key.max(key);
                    }
                }
                None => {
                    table.next_key += 1;
                    row.insert(primary.to_string(), Value::from(table.next_key));
                }
            }
        }

        tracing::debug!(entity, "Inserted row into memory storage");
        let inserted = full_row(descriptor, &row);
        table.rows.push(row);
        Ok(inserted)
    }

    async fn patch(
        &self,
        entity: &str,
        key: &Value,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let descriptor = self.descriptor(entity)?;
        let primary = primary_field(descriptor)?;
        let patch = scalar_values(descriptor, patch);

        let mut tables = self.tables.write();
        let Some(row) = tables.get_mut(entity).and_then(|table| {
            table
                .rows
                .iter_mut()
                .find(|row| row.get(primary).is_some_and(|v| values_equal(v, key)))
        }) else {
            return Ok(None);
        };

        for (name, value) in patch {
            row.insert(name, value);
        }
        Ok(Some(full_row(descriptor, row)))
    }

    async fn delete(&self, entity: &str, key: &Value) -> Result<u64> {
        let descriptor = self.descriptor(entity)?;
        let primary = primary_field(descriptor)?;

        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(entity) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !row.get(primary).is_some_and(|v| values_equal(v, key)));
        Ok((before - table.rows.len()) as u64)
    }
}
