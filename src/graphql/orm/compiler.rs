//! Nested fetch-graph compiler
//!
//! Turns a requested-field tree plus the root arguments into a [`FetchPlan`]. Each level
//! gets its own selection, predicates, ordering and paging, decoded from that level's
//! arguments only. The compiler is pure: it never touches storage and keeps no state
//! between calls.

use serde_json::{Map, Value};

use super::plan::{FetchPlan, Modifier, Predicate};
use crate::graphql::entities::{ApiField, EntityDescriptor, EntityRegistry};
use crate::graphql::filters::{ArgumentProtocol, Decoded, PagingArg, normalize_value};
use crate::graphql::selection::{FieldNode, FieldTree};

pub struct FetchGraphCompiler<'a> {
    registry: Option<&'a EntityRegistry>,
    protocol: &'a ArgumentProtocol,
}

impl<'a> FetchGraphCompiler<'a> {
    pub fn new(registry: &'a EntityRegistry, protocol: &'a ArgumentProtocol) -> Self {
        Self {
            registry: Some(registry),
            protocol,
        }
    }

    /// Compiler without entity metadata. Any field with a sub-selection is a relation
    /// and every argument that decodes becomes a modifier.
    pub fn structural(protocol: &'a ArgumentProtocol) -> Self {
        Self {
            registry: None,
            protocol,
        }
    }

    pub fn compile(&self, entity: &str, tree: &FieldTree, arguments: &Map<String, Value>) -> FetchPlan {
        let descriptor = self.registry.and_then(|r| r.get(entity));
        let plan = self.compile_level(descriptor, &tree.fields, arguments, None);
        tracing::trace!(entity, plan = ?plan, "Compiled fetch plan");
        plan
    }

    fn compile_level(
        &self,
        entity: Option<&EntityDescriptor>,
        nodes: &[FieldNode],
        arguments: &Map<String, Value>,
        alias: Option<String>,
    ) -> FetchPlan {
        let mut plan = FetchPlan {
            alias,
            ..FetchPlan::default()
        };
        let mut selected: Vec<String> = Vec::new();

        for node in nodes {
            let Some(entity) = entity else {
                if node.is_leaf() {
                    push_unique(&mut selected, &node.name);
                } else {
                    let child = self.compile_level(None, &node.children, &node.arguments, None);
                    plan.relations.insert(node.name.clone(), child);
                }
                continue;
            };

            match entity.resolve_api_field(&node.name) {
                Some(ApiField::Scalar(_)) => push_unique(&mut selected, &node.name),
                Some(ApiField::Relation { name, relation }) => {
                    let target = self.registry.and_then(|r| r.get(&relation.target));
                    let alias = (node.name != name).then(|| node.name.clone());
                    let child = self.compile_level(target, &node.children, &node.arguments, alias);
                    plan.relations.insert(name.to_string(), child);
                }
                None => {
                    tracing::trace!(
                        entity = %entity.name,
                        field = %node.name,
                        "Field is not stored on the entity, skipping"
                    );
                }
            }
        }

        plan.modifiers.push(Modifier::Select(selected));
        self.decode_arguments(entity, arguments, &mut plan.modifiers);
        plan
    }

    fn decode_arguments(
        &self,
        entity: Option<&EntityDescriptor>,
        arguments: &Map<String, Value>,
        modifiers: &mut Vec<Modifier>,
    ) {
        let known = |field: &str| entity.is_none_or(|e| e.has_scalar(field));

        for (key, value) in arguments {
            match self.protocol.decode(key) {
                Decoded::Filter { field, op } if known(field) => match normalize_value(op, value) {
                    Some(value) => modifiers.push(Modifier::Filter(Predicate::new(field, op, value))),
                    None => tracing::trace!(key = %key, "Filter argument has no usable value"),
                },
                Decoded::Paging(arg @ (PagingArg::OrderBy | PagingArg::OrderByDesc)) => {
                    match value.as_str() {
                        Some(field) if known(field) => modifiers.push(Modifier::OrderBy {
                            field: field.to_string(),
                            descending: arg == PagingArg::OrderByDesc,
                        }),
                        _ => tracing::trace!(key = %key, value = %value, "Ignoring ordering argument"),
                    }
                }
                Decoded::Paging(arg @ (PagingArg::Limit | PagingArg::Offset)) => {
                    match value.as_u64() {
                        Some(n) if arg == PagingArg::Limit => modifiers.push(Modifier::Limit(n)),
                        Some(n) => modifiers.push(Modifier::Offset(n)),
                        None => tracing::trace!(key = %key, value = %value, "Ignoring paging argument"),
                    }
                }
                Decoded::Filter { .. } | Decoded::Ignored => {
                    tracing::trace!(key = %key, "Ignoring unrecognized argument");
                }
            }
        }
    }
}

fn push_unique(selected: &mut Vec<String>, name: &str) {
    if !selected.iter().any(|s| s == name) {
        selected.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::entities::tests::fixtures;
    use crate::graphql::filters::FilterOp;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> EntityRegistry {
        EntityRegistry::new(fixtures()).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn select(fields: &[&str]) -> Modifier {
        Modifier::Select(fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn test_root_filter_and_nested_selection() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::new(vec![
            FieldNode::leaf("name"),
            FieldNode::branch("category", vec![FieldNode::leaf("name")]),
        ]);

        let plan = compiler.compile("Course", &tree, &args(json!({"nameLike": "Intro"})));

        assert_eq!(
            plan.modifiers,
            vec![
                select(&["name"]),
                Modifier::Filter(Predicate::new("name", FilterOp::Like, json!("Intro"))),
            ]
        );
        let category = &plan.relations["category"];
        assert_eq!(category.modifiers, vec![select(&["name"])]);
        assert!(category.relations.is_empty());
    }

    #[test]
    fn test_malformed_keys_are_ignored() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::leaves(["id"]);

        let plan = compiler.compile(
            "Course",
            &tree,
            &args(json!({"ageGtX": 3, "id": 1, "idArray": [1, 2], "unknownEq": 4})),
        );
        assert_eq!(plan.modifiers, vec![select(&["id"])]);
    }

    #[test]
    fn test_nested_levels_are_isolated() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::new(vec![FieldNode::branch(
            "children",
            vec![
                FieldNode::leaf("id"),
                FieldNode::branch("courses", vec![FieldNode::leaf("name")])
                    .with_argument("nameLikeNoCase", json!("rust"))
                    .with_argument("limit", json!(2)),
            ],
        )
        .with_argument("idIn", json!([1, 2]))
        .with_argument("orderByDesc", json!("name"))]);

        let plan = compiler.compile("Category", &tree, &Map::new());

        assert_eq!(plan.modifiers, vec![select(&[])]);
        let children = &plan.relations["childCategories"];
        assert_eq!(children.alias.as_deref(), Some("children"));
        assert_eq!(
            children.modifiers,
            vec![
                select(&["id"]),
                Modifier::Filter(Predicate::new("id", FilterOp::In, json!([1, 2]))),
                Modifier::OrderBy {
                    field: "name".to_string(),
                    descending: true
                },
            ]
        );
        let courses = &children.relations["courses"];
        assert_eq!(courses.alias, None);
        assert_eq!(
            courses.modifiers,
            vec![
                select(&["name"]),
                Modifier::Filter(Predicate::new("name", FilterOp::LikeNoCase, json!("rust"))),
                Modifier::Limit(2),
            ]
        );
    }

    #[test]
    fn test_selection_completeness_and_order() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::leaves(["description", "id", "name", "id", "categoryId"]);

        let plan = compiler.compile("Course", &tree, &Map::new());
        assert_eq!(
            plan.selected().unwrap(),
            &["description", "id", "name", "categoryId"]
        );
    }

    #[test]
    fn test_relation_without_sub_fields_is_expanded() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::new(vec![FieldNode::leaf("id"), FieldNode::leaf("category")]);

        let plan = compiler.compile("Course", &tree, &Map::new());
        assert_eq!(plan.selected().unwrap(), &["id"]);
        assert_eq!(plan.relations["category"].modifiers, vec![select(&[])]);
    }

    #[test]
    fn test_leaf_and_filter_target_are_independent() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::leaves(["id"]);

        let plan = compiler.compile(
            "Course",
            &tree,
            &args(json!({"nameEq": "Rust", "idGt": 1, "descriptionIsNull": false})),
        );
        assert_eq!(plan.selected().unwrap(), &["id"]);
        assert_eq!(
            plan.predicates().cloned().collect::<Vec<_>>(),
            vec![
                Predicate::new("name", FilterOp::Eq, json!("Rust")),
                Predicate::new("id", FilterOp::Gt, json!(1)),
                Predicate::new("description", FilterOp::IsNull, json!(false)),
            ]
        );
    }

    #[test]
    fn test_null_values_and_bad_paging_are_skipped() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);

        let plan = compiler.compile(
            "Course",
            &FieldTree::leaves(["id"]),
            &args(json!({"nameEq": null, "limit": -1, "offset": 3, "orderBy": "missing", "idIn": 4})),
        );
        assert_eq!(
            plan.modifiers,
            vec![
                select(&["id"]),
                Modifier::Offset(3),
                Modifier::Filter(Predicate::new("id", FilterOp::In, json!([4]))),
            ]
        );
    }

    #[test]
    fn test_structural_compile_uses_sub_selections() {
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::structural(&protocol);
        let tree = FieldTree::new(vec![
            FieldNode::leaf("title"),
            FieldNode::branch("author", vec![FieldNode::leaf("name")])
                .with_argument("nameEq", json!("Ada")),
        ]);

        let plan = compiler.compile("Book", &tree, &Map::new());
        assert_eq!(plan.selected().unwrap(), &["title"]);
        assert_eq!(
            plan.relations["author"].modifiers,
            vec![
                select(&["name"]),
                Modifier::Filter(Predicate::new("name", FilterOp::Eq, json!("Ada"))),
            ]
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let registry = registry();
        let protocol = ArgumentProtocol::default();
        let compiler = FetchGraphCompiler::new(&registry, &protocol);
        let tree = FieldTree::new(vec![
            FieldNode::leaf("name"),
            FieldNode::branch("category", vec![FieldNode::leaf("id")])
                .with_argument("nameLike", json!("a")),
        ]);
        let arguments = args(json!({"idIn": [1, 2, 3]}));

        assert_eq!(
            compiler.compile("Course", &tree, &arguments),
            compiler.compile("Course", &tree, &arguments)
        );
    }
}
