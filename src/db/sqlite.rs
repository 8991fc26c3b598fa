//! SQLite storage on sqlx
//!
//! Every statement is parameterized with numbered `?N` placeholders; identifiers come
//! from the descriptors and are always quoted. Column values are decoded according to the
//! descriptor type of the column.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use super::graph::{LevelQuery, Row as JsonRow, RowSource, fetch_graph};
use super::values::sort_order;
use super::{KeyScope, Storage};
use crate::error::{Error, Result};
use crate::graphql::entities::{EntityDescriptor, EntityRegistry, ScalarType};
use crate::graphql::filters::FilterOp;
use crate::graphql::orm::{FetchPlan, Predicate};

type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Stays below SQLite's bound-parameter limit (32766) with room for filter values.
const KEY_BATCH_SIZE: usize = 30_000;

/// A SQL value that can be bound to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::String(s.clone()),
            other => SqlValue::String(other.to_string()),
        }
    }

    /// Bind this value to a sqlx query at the next parameter position.
    pub fn bind_to_query<'q>(&'q self, query: Query<'q>) -> Query<'q> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

/// Column definition for table creation.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    /// SQLite column type (TEXT, INTEGER, REAL)
    pub sql_type: &'static str,
    pub is_primary_key: bool,
}

impl ColumnDef {
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote(&self.name), self.sql_type);
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }
}

fn sql_type(ty: &ScalarType) -> &'static str {
    match ty.name() {
        "integer" | "boolean" => "INTEGER",
        "number" | "float" => "REAL",
        _ => "TEXT",
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for an entity.
pub fn create_table_sql(entity: &EntityDescriptor) -> String {
    let primary = entity.primary_field();
    let columns: Vec<String> = entity
        .scalar_fields()
        .map(|(name, ty)| {
            ColumnDef {
                name: name.to_string(),
                sql_type: sql_type(ty),
                is_primary_key: primary == Some(name),
            }
            .to_sql()
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(entity.table_name()),
        columns.join(",\n  ")
    )
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Statement text plus the values bound to its numbered placeholders.
#[derive(Default)]
struct Statement {
    values: Vec<SqlValue>,
}

impl Statement {
    fn param(&mut self, value: &Value) -> String {
        self.values.push(SqlValue::from_json(value));
        format!("?{}", self.values.len())
    }

    fn params<'v>(&mut self, values: impl IntoIterator<Item = &'v Value>) -> String {
        values
            .into_iter()
            .map(|v| self.param(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bind<'q>(&'q self, sql: &'q str) -> Query<'q> {
        let mut query = sqlx::query(sql);
        for value in &self.values {
            query = value.bind_to_query(query);
        }
        query
    }

    /// SQL condition for one predicate. `None` when the predicate matches every row.
    fn condition(&mut self, predicate: &Predicate) -> Option<String> {
        let column = quote(&predicate.field);
        let value = &predicate.value;
        let list = match value {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };

        let condition = match predicate.op {
            FilterOp::In if list.is_empty() => "0 = 1".to_string(),
            FilterOp::In => format!("{column} IN ({})", self.params(list)),
            FilterOp::NotIn if list.is_empty() => return None,
            FilterOp::NotIn => format!("{column} NOT IN ({})", self.params(list)),
            FilterOp::Eq => format!("{column} = {}", self.param(value)),
            FilterOp::NotEq => format!("{column} <> {}", self.param(value)),
            FilterOp::Gt => format!("{column} > {}", self.param(value)),
            FilterOp::Gte => format!("{column} >= {}", self.param(value)),
            FilterOp::Lt => format!("{column} < {}", self.param(value)),
            FilterOp::Lte => format!("{column} <= {}", self.param(value)),
            FilterOp::Like => format!("instr({column}, {}) > 0", self.param(value)),
            FilterOp::LikeNoCase => {
                format!("instr(lower({column}), lower({})) > 0", self.param(value))
            }
            FilterOp::IsNull if value.as_bool() == Some(false) => format!("{column} IS NOT NULL"),
            FilterOp::IsNull => format!("{column} IS NULL"),
        };
        Some(condition)
    }
}

fn decode_column(row: &SqliteRow, index: usize, ty: Option<&ScalarType>) -> Result<Value> {
    let value = match ty.map(ScalarType::name) {
        Some("integer") => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        Some("number" | "float") => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        Some("boolean") => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        Some(_) => row.try_get::<Option<String>, _>(index)?.map(Value::from),
        None => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
                v.map(Value::from)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
                v.map(Value::from)
            } else {
                row.try_get::<Option<String>, _>(index)?.map(Value::from)
            }
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_row(entity: &EntityDescriptor, columns: &[String], row: &SqliteRow) -> Result<JsonRow> {
    columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let value = decode_column(row, index, entity.scalar_type(name))?;
            Ok((name.clone(), value))
        })
        .collect()
}

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    registry: Arc<EntityRegistry>,
    key_batch_size: usize,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool, registry: Arc<EntityRegistry>) -> Self {
        Self {
            pool,
            registry,
            key_batch_size: KEY_BATCH_SIZE,
        }
    }

    /// Maximum number of keys bound in a single `IN (...)` clause.
    pub fn with_key_batch_size(mut self, size: usize) -> Self {
        self.key_batch_size = size.max(1);
        self
    }

    /// Open a pool for `url`, creating the database file when missing.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        registry: Arc<EntityRegistry>,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        tracing::info!(url, "Connected to SQLite");
        Ok(Self::new(pool, registry))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a table for every registered entity that does not have one yet.
    pub async fn create_tables(&self) -> Result<()> {
        for entity in self.registry.iter() {
            if entity.scalar_fields().next().is_none() {
                continue;
            }
            let sql = create_table_sql(entity);
            tracing::debug!(sql = %sql, "Creating table");
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn descriptor(&self, entity: &str) -> Result<&EntityDescriptor> {
        self.registry
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    fn all_columns(entity: &EntityDescriptor) -> Vec<String> {
        entity
            .scalar_fields()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn returning(columns: &[String]) -> String {
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
    }

    async fn fetch_optional(
        &self,
        entity: &EntityDescriptor,
        sql: &str,
        statement: &Statement,
        columns: &[String],
    ) -> Result<Option<Value>> {
        tracing::debug!(sql = %sql, "Executing entity query");
        let row = statement.bind(sql).fetch_optional(&self.pool).await?;
        row.map(|row| decode_row(entity, columns, &row).map(Value::Object))
            .transpose()
    }

    async fn run_select(
        &self,
        query: &LevelQuery<'_>,
        key: Option<(&str, &[Value])>,
        columns: &[String],
        paged: bool,
    ) -> Result<Vec<JsonRow>> {
        let entity = query.entity;
        let mut statement = Statement::default();
        let mut conditions = Vec::new();

        if let Some((column, keys)) = key {
            conditions.push(format!("{} IN ({})", quote(column), statement.params(keys)));
        }
        for predicate in &query.predicates {
            if !entity.has_scalar(&predicate.field) {
                tracing::warn!(entity = %entity.name, field = %predicate.field, "Skipping filter on unknown column");
                continue;
            }
            conditions.extend(statement.condition(predicate));
        }

        let select = if columns.is_empty() {
            "1".to_string()
        } else {
            Self::returning(columns)
        };
        let mut sql = format!("SELECT {select} FROM {}", quote(entity.table_name()));

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let order: Vec<String> = query
            .order
            .iter()
            .filter(|(field, _)| entity.has_scalar(field))
            .map(|(field, descending)| {
                format!("{} {}", quote(field), if *descending { "DESC" } else { "ASC" })
            })
            .collect();
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        let (limit, offset) = if paged {
            (query.limit, query.offset)
        } else {
            (None, None)
        };
        match (limit, offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset.filter(|o| *o > 0) {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) if offset > 0 => {
                sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
            }
            _ => {}
        }

        tracing::debug!(sql = %sql, "Executing entity query");
        let rows = statement.bind(&sql).fetch_all(&self.pool).await?;

        if columns.is_empty() {
            return Ok(rows.iter().map(|_| JsonRow::new()).collect());
        }
        rows.iter()
            .map(|row| decode_row(entity, columns, row))
            .collect()
    }

    /// Key lists longer than the batch size are split across several statements. Ordering
    /// and paging then apply to the merged rows.
    async fn fetch_batched(
        &self,
        query: &LevelQuery<'_>,
        column: &str,
        keys: &[Value],
    ) -> Result<Vec<JsonRow>> {
        let order: Vec<(&str, bool)> = query
            .order
            .iter()
            .filter(|(field, _)| query.entity.has_scalar(field))
            .copied()
            .collect();
        let mut columns = query.columns.clone();
        for (field, _) in &order {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.to_string());
            }
        }

        let mut rows = Vec::new();
        for batch in keys.chunks(self.key_batch_size) {
            tracing::debug!(entity = %query.entity.name, keys = batch.len(), "Fetching key batch");
            rows.extend(self.run_select(query, Some((column, batch)), &columns, false).await?);
        }

        if !order.is_empty() {
            rows.sort_by(|a, b| {
                order
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
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|mut row| {
                query
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.remove(c).unwrap_or(Value::Null)))
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl RowSource for SqliteStorage {
    fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    async fn fetch_rows(&self, query: &LevelQuery<'_>) -> Result<Vec<JsonRow>> {
        match &query.key {
            Some((_, keys)) if keys.is_empty() => Ok(Vec::new()),
            Some((column, keys)) if keys.len() > self.key_batch_size => {
                self.fetch_batched(query, column, keys).await
            }
            key => {
                let key = key.as_ref().map(|(column, keys)| (column.as_str(), keys.as_slice()));
                self.run_select(query, key, &query.columns, true).await
            }
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn select(&self, entity: &str, scope: KeyScope, plan: &FetchPlan) -> Result<Vec<Value>> {
        fetch_graph(self, entity, scope, plan).await
    }

    async fn insert(&self, entity: &str, row: Map<String, Value>) -> Result<Value> {
        let descriptor = self.descriptor(entity)?;
        let columns = Self::all_columns(descriptor);
        let values: Vec<(String, Value)> = row
            .into_iter()
            .filter(|(name, _)| descriptor.has_scalar(name))
            .collect();

        let mut statement = Statement::default();
        let table = quote(descriptor.table_name());
        let sql = if values.is_empty() {
            format!(
                "INSERT INTO {table} DEFAULT VALUES RETURNING {}",
                Self::returning(&columns)
            )
        } else {
            let names: Vec<String> = values.iter().map(|(name, _)| quote(name)).collect();
            let params = statement.params(values.iter().map(|(_, v)| v));
            format!(
                "INSERT INTO {table} ({}) VALUES ({params}) RETURNING {}",
                names.join(", "),
                Self::returning(&columns)
            )
        };

        self.fetch_optional(descriptor, &sql, &statement, &columns)
            .await?
            .ok_or_else(|| Error::Storage(format!("insert into {entity} returned no row")))
    }

    async fn patch(
        &self,
        entity: &str,
        key: &Value,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let descriptor = self.descriptor(entity)?;
        let primary = descriptor
            .primary_field()
            .ok_or_else(|| Error::Storage(format!("{entity} has no primary field")))?;
        let columns = Self::all_columns(descriptor);
        let table = quote(descriptor.table_name());

        let mut statement = Statement::default();
        let assignments: Vec<String> = patch
            .iter()
            .filter(|(name, _)| descriptor.has_scalar(name))
            .map(|(name, value)| format!("{} = {}", quote(name), statement.param(value)))
            .collect();
        let key_param = statement.param(key);

        let sql = if assignments.is_empty() {
            format!(
                "SELECT {} FROM {table} WHERE {} = {key_param}",
                Self::returning(&columns),
                quote(primary)
            )
        } else {
            format!(
                "UPDATE {table} SET {} WHERE {} = {key_param} RETURNING {}",
                assignments.join(", "),
                quote(primary),
                Self::returning(&columns)
            )
        };

        self.fetch_optional(descriptor, &sql, &statement, &columns)
            .await
    }

    async fn delete(&self, entity: &str, key: &Value) -> Result<u64> {
        let descriptor = self.descriptor(entity)?;
        let primary = descriptor
            .primary_field()
            .ok_or_else(|| Error::Storage(format!("{entity} has no primary field")))?;

        let mut statement = Statement::default();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            quote(descriptor.table_name()),
            quote(primary),
            statement.param(key)
        );
        tracing::debug!(sql = %sql, "Executing entity delete");
        let result = statement.bind(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
