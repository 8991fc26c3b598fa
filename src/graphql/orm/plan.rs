//! Fetch plans
//!
//! A [`FetchPlan`] describes one level of a nested read: which scalar columns to select,
//! which predicates, ordering and paging apply at that level, and which relations to
//! expand, each with its own nested plan.

use indexmap::IndexMap;
use serde_json::Value;

use crate::graphql::entities::EntityDescriptor;
use crate::graphql::filters::FilterOp;

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Scalar fields to select, in request order. Always the first modifier.
    Select(Vec<String>),
    Filter(Predicate),
    OrderBy { field: String, descending: bool },
    Limit(u64),
    Offset(u64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPlan {
    /// Output name of this level when it differs from the relation name.
    pub alias: Option<String>,
    /// Nested plans keyed by relation name.
    pub relations: IndexMap<String, FetchPlan>,
    pub modifiers: Vec<Modifier>,
}

impl FetchPlan {
    /// Plan selecting every scalar field of `entity` with no filters.
    pub fn select_all(entity: &EntityDescriptor) -> Self {
        Self {
            modifiers: vec![Modifier::Select(
                entity.scalar_fields().map(|(name, _)| name.to_string()).collect(),
            )],
            ..Self::default()
        }
    }

    /// Fields named by the selection modifier. `None` means the plan was built without one
    /// and every scalar field is wanted.
    pub fn selected(&self) -> Option<&[String]> {
        self.modifiers.iter().find_map(|m| match m {
            Modifier::Select(fields) => Some(fields.as_slice()),
            _ => None,
        })
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.modifiers.iter().filter_map(|m| match m {
            Modifier::Filter(predicate) => Some(predicate),
            _ => None,
        })
    }

    /// Ordering as `(field, descending)` pairs in the order they were requested.
    pub fn ordering(&self) -> Vec<(&str, bool)> {
        self.modifiers
            .iter()
            .filter_map(|m| match m {
                Modifier::OrderBy { field, descending } => Some((field.as_str(), *descending)),
                _ => None,
            })
            .collect()
    }

    pub fn limit(&self) -> Option<u64> {
        self.modifiers.iter().rev().find_map(|m| match m {
            Modifier::Limit(limit) => Some(*limit),
            _ => None,
        })
    }

    pub fn offset(&self) -> Option<u64> {
        self.modifiers.iter().rev().find_map(|m| match m {
            Modifier::Offset(offset) => Some(*offset),
            _ => None,
        })
    }

    /// Name this level appears under in its parent's output.
    pub fn output_name<'a>(&'a self, relation: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(relation)
    }

    pub fn with_relation(mut self, name: impl Into<String>, plan: FetchPlan) -> Self {
        self.relations.insert(name.into(), plan);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::entities::tests::fixtures;
    use serde_json::json;

    #[test]
    fn test_select_all_lists_scalars_only() {
        let course = &fixtures()[1];
        let plan = FetchPlan::select_all(course);
        assert_eq!(
            plan.selected().unwrap(),
            &["id", "name", "description", "categoryId"]
        );
        assert!(plan.relations.is_empty());
    }

    #[test]
    fn test_accessors() {
        let plan = FetchPlan::default()
            .with_modifier(Modifier::Select(vec!["name".to_string()]))
            .with_modifier(Modifier::Filter(Predicate::new(
                "name",
                FilterOp::Like,
                json!("Intro"),
            )))
            .with_modifier(Modifier::OrderBy {
                field: "name".to_string(),
                descending: true,
            })
            .with_modifier(Modifier::Limit(2))
            .with_modifier(Modifier::Limit(5));

        assert_eq!(plan.selected().unwrap(), &["name"]);
        assert_eq!(plan.predicates().count(), 1);
        assert_eq!(plan.ordering(), vec![("name", true)]);
        assert_eq!(plan.limit(), Some(5));
        assert_eq!(plan.offset(), None);
        assert!(FetchPlan::default().selected().is_none());
    }
}
