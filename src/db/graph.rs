//! Level-by-level execution of fetch plans
//!
//! Storage backends only need to answer flat [`LevelQuery`]s. [`fetch_graph`] walks a
//! [`FetchPlan`], issues one batched query per plan level (`join column IN (parent keys)`)
//! and stitches the children into their parents. Join columns that the plan did not ask
//! for are fetched for stitching and stripped from the output afterwards.
//!
//! Ordering applies to a whole level. Limit and offset apply to the root query, and per
//! parent for nested levels.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use super::KeyScope;
use super::values::join_key;
use crate::error::{Error, Result};
use crate::graphql::entities::{Cardinality, EntityDescriptor, EntityRegistry, RelationDescriptor};
use crate::graphql::orm::{FetchPlan, Predicate};

pub type Row = Map<String, Value>;

/// One flat query against a single entity.
#[derive(Debug)]
pub struct LevelQuery<'a> {
    pub entity: &'a EntityDescriptor,
    pub columns: Vec<String>,
    pub predicates: Vec<&'a Predicate>,
    /// Restrict to rows whose column is one of the values.
    pub key: Option<(String, Vec<Value>)>,
    /// `(column, descending)` pairs.
    pub order: Vec<(&'a str, bool)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl<'a> LevelQuery<'a> {
    pub fn new(entity: &'a EntityDescriptor, columns: Vec<String>) -> Self {
        Self {
            entity,
            columns,
            predicates: Vec::new(),
            key: None,
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// Backend able to answer flat level queries.
#[async_trait]
pub trait RowSource: Send + Sync {
    fn registry(&self) -> &EntityRegistry;

    /// Rows with exactly the requested columns (missing values as null).
    async fn fetch_rows(&self, query: &LevelQuery<'_>) -> Result<Vec<Row>>;
}

/// Execute `plan` against `entity` and return the stitched rows.
pub async fn fetch_graph<S>(
    source: &S,
    entity: &str,
    scope: KeyScope,
    plan: &FetchPlan,
) -> Result<Vec<Value>>
where
    S: RowSource + ?Sized,
{
    let descriptor = source
        .registry()
        .get(entity)
        .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;

    let keys = match scope {
        KeyScope::All => None,
        KeyScope::One(key) => Some(vec![key]),
        KeyScope::Many(keys) => Some(keys),
    };
    let key = match keys {
        None => None,
        Some(values) => {
            let primary = descriptor.primary_field().ok_or_else(|| {
                Error::Storage(format!("{entity} has no primary field to look up by"))
            })?;
            Some((primary.to_string(), values))
        }
    };

    let level = load_level(source, descriptor, plan, key, true).await?;
    Ok(level.into_values())
}

struct Level {
    rows: Vec<Row>,
    /// Columns fetched only for stitching.
    strip: Vec<String>,
}

impl Level {
    fn into_values(self) -> Vec<Value> {
        self.rows
            .into_iter()
            .map(|row| Value::Object(project(row, &self.strip)))
            .collect()
    }
}

struct Expansion<'a> {
    output: &'a str,
    relation: &'a RelationDescriptor,
    target: &'a EntityDescriptor,
    plan: &'a FetchPlan,
    owner_column: String,
}

fn load_level<'a, S>(
    source: &'a S,
    entity: &'a EntityDescriptor,
    plan: &'a FetchPlan,
    key: Option<(String, Vec<Value>)>,
    root: bool,
) -> BoxFuture<'a, Result<Level>>
where
    S: RowSource + ?Sized,
{
    async move {
        let registry = source.registry();

        let selected: Vec<String> = match plan.selected() {
            Some(fields) => fields
                .iter()
                .filter(|f| entity.has_scalar(f))
                .cloned()
                .collect(),
            None => entity
                .scalar_fields()
                .map(|(name, _)| name.to_string())
                .collect(),
        };
        let mut columns = selected.clone();

        let mut expansions = Vec::new();
        for (name, child) in &plan.relations {
            let Some(relation) = entity.relations.get(name) else {
                tracing::warn!(entity = %entity.name, relation = %name, "Unknown relation in fetch plan");
                continue;
            };
            let Some(target) = registry.get(&relation.target) else {
                continue;
            };
            let owner_column = match &relation.cardinality {
                Cardinality::ManyThrough { via } => match entity.relations.get(via) {
                    Some(via) => via.join.from.clone(),
                    None => continue,
                },
                _ => relation.join.from.clone(),
            };
            push_column(&mut columns, &owner_column);
            expansions.push(Expansion {
                output: child.output_name(name),
                relation,
                target,
                plan: child,
                owner_column,
            });
        }

        if let Some((column, values)) = &key {
            push_column(&mut columns, column);
            if values.is_empty() {
                return Ok(Level {
                    rows: Vec::new(),
                    strip: Vec::new(),
                });
            }
        }

        let strip = columns
            .iter()
            .filter(|c| !selected.contains(c))
            .cloned()
            .collect();

        let query = LevelQuery {
            entity,
            columns,
            predicates: plan.predicates().collect(),
            key,
            order: plan.ordering(),
            limit: if root { plan.limit() } else { None },
            offset: if root { plan.offset() } else { None },
        };
        let mut rows = source.fetch_rows(&query).await?;

        for expansion in expansions {
            match &expansion.relation.cardinality {
                Cardinality::ManyThrough { via } => {
                    attach_through(source, entity, via, &expansion, &mut rows).await?;
                }
                _ => attach_direct(source, &expansion, &mut rows).await?,
            }
        }

        Ok(Level { rows, strip })
    }
    .boxed()
}

async fn attach_direct<S>(source: &S, expansion: &Expansion<'_>, rows: &mut [Row]) -> Result<()>
where
    S: RowSource + ?Sized,
{
    let child_column = &expansion.relation.join.to;
    let parent_keys = distinct(rows.iter().map(|row| column(row, &expansion.owner_column)));
    let children = load_level(
        source,
        expansion.target,
        expansion.plan,
        Some((child_column.clone(), parent_keys)),
        false,
    )
    .await?;

    let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
    for child in children.rows {
        if let Some(key) = join_key(column(&child, child_column)) {
            groups
                .entry(key)
                .or_default()
                .push(project(child, &children.strip));
        }
    }

    for row in rows.iter_mut() {
        let matched = join_key(column(row, &expansion.owner_column))
            .and_then(|key| groups.get(&key))
            .cloned()
            .unwrap_or_default();
        let value = shape(expansion, matched);
        row.insert(expansion.output.to_string(), value);
    }
    Ok(())
}

async fn attach_through<S>(
    source: &S,
    entity: &EntityDescriptor,
    via: &str,
    expansion: &Expansion<'_>,
    rows: &mut [Row],
) -> Result<()>
where
    S: RowSource + ?Sized,
{
    let Some(via) = entity.relations.get(via) else {
        return Ok(());
    };
    let Some(middle) = source.registry().get(&via.target) else {
        return Ok(());
    };

    let middle_columns = {
        let mut columns = vec![via.join.to.clone()];
        push_column(&mut columns, &expansion.relation.join.from);
        columns
    };
    let parent_keys = distinct(rows.iter().map(|row| column(row, &expansion.owner_column)));
    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    let mut target_keys = Vec::new();

    if !parent_keys.is_empty() {
        let mut query = LevelQuery::new(middle, middle_columns);
        query.key = Some((via.join.to.clone(), parent_keys));
        for link in source.fetch_rows(&query).await? {
            let owner = join_key(column(&link, &via.join.to));
            let target = column(&link, &expansion.relation.join.from);
            if let (Some(owner), Some(target_key)) = (owner, join_key(target)) {
                links.entry(owner).or_default().push(target_key);
                target_keys.push(target.clone());
            }
        }
    }

    let target_column = &expansion.relation.join.to;
    let children = load_level(
        source,
        expansion.target,
        expansion.plan,
        Some((target_column.clone(), distinct(target_keys.iter()))),
        false,
    )
    .await?;

    for row in rows.iter_mut() {
        let wanted: HashSet<&String> = join_key(column(row, &expansion.owner_column))
            .and_then(|key| links.get(&key))
            .map(|keys| keys.iter().collect())
            .unwrap_or_default();
        let mut seen = HashSet::new();
        let matched: Vec<Row> = children
            .rows
            .iter()
            .filter(|child| {
                join_key(column(child, target_column))
                    .is_some_and(|key| wanted.contains(&key) && seen.insert(key))
            })
            .map(|child| project(child.clone(), &children.strip))
            .collect();
        let value = shape(expansion, matched);
        row.insert(expansion.output.to_string(), value);
    }
    Ok(())
}

/// Apply per-parent paging and turn the matched rows into the relation's output value.
fn shape(expansion: &Expansion<'_>, matched: Vec<Row>) -> Value {
    let offset = expansion.plan.offset().unwrap_or(0) as usize;
    let paged = matched.into_iter().skip(offset);
    let paged: Vec<Row> = match expansion.plan.limit() {
        Some(limit) => paged.take(limit as usize).collect(),
        None => paged.collect(),
    };

    if expansion.relation.cardinality.is_list() {
        Value::Array(paged.into_iter().map(Value::Object).collect())
    } else {
        paged
            .into_iter()
            .next()
            .map(Value::Object)
            .unwrap_or(Value::Null)
    }
}

fn column<'r>(row: &'r Row, name: &str) -> &'r Value {
    row.get(name).unwrap_or(&Value::Null)
}

fn distinct<'v>(values: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .filter(|v| join_key(v).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

fn push_column(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c == name) {
        columns.push(name.to_string());
    }
}

fn project(mut row: Row, strip: &[String]) -> Row {
    for column in strip {
        row.shift_remove(column);
    }
    row
}
