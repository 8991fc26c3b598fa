//! Requested-field trees
//!
//! The compiler works on a plain tree of requested fields rather than on the execution
//! engine's selection types, so plans can be compiled (and tested) without a running
//! schema. [`FieldTree::from_selection`] builds one from async-graphql's look-ahead.

use async_graphql::SelectionField;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTree {
    pub fields: Vec<FieldNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub children: Vec<FieldNode>,
}

impl FieldNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<FieldNode>) -> Self {
        Self {
            children,
            ..Self::leaf(name)
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

impl FieldTree {
    pub fn new(fields: Vec<FieldNode>) -> Self {
        Self { fields }
    }

    /// Tree of scalar leaves only.
    pub fn leaves<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(FieldNode::leaf).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build the tree below `field`, skipping introspection fields such as `__typename`.
    pub fn from_selection(field: &SelectionField<'_>) -> Result<Self> {
        Ok(Self::new(collect_children(field)?))
    }
}

fn collect_children(field: &SelectionField<'_>) -> Result<Vec<FieldNode>> {
    let mut nodes = Vec::new();
    for child in field.selection_set() {
        if child.name().starts_with("__") {
            continue;
        }

        let mut arguments = Map::new();
        let raw = child
            .arguments()
            .map_err(|e| Error::invalid_argument(child.name(), e.message))?;
        for (name, value) in raw {
            let value = value
                .into_json()
                .map_err(|e| Error::invalid_argument(name.as_str(), e.to_string()))?;
            arguments.insert(name.to_string(), value);
        }

        nodes.push(FieldNode {
            name: child.name().to_string(),
            arguments,
            children: collect_children(&child)?,
        });
    }
    Ok(nodes)
}
