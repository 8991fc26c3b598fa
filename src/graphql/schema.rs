//! Executable schema
//!
//! Turns the generated schema document into an `async_graphql::dynamic::Schema`. Root
//! fields dispatch through the executor's resolver map. Fields of other object types use
//! a registered resolver when one exists and otherwise read the matching property of the
//! parent value.

use std::collections::HashSet;
use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, Field, FieldFuture, InputObject, InputValue, Object, ResolverContext, Scalar, Schema,
    TypeRef,
};
use async_graphql::parser::{Positioned, parse_schema};
use async_graphql::parser::types::{
    BaseType, FieldDefinition, InputValueDefinition, Type, TypeKind, TypeSystemDefinition,
};
use async_graphql::{ErrorExtensions, Value as GqlValue};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::resolvers::{Executor, Operation, RequestContext, ResolveRequest};
use super::selection::FieldTree;
use crate::error::SchemaError;

pub type EntitySchema = Schema;

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Build an executable schema serving `executor`'s document and resolvers.
pub fn build_executable(executor: Arc<Executor>) -> Result<EntitySchema, SchemaError> {
    let document = parse_schema(executor.type_defs())
        .map_err(|e| SchemaError::InvalidDocument(e.to_string()))?;

    let mut objects: IndexMap<String, Vec<FieldDefinition>> = IndexMap::new();
    let mut inputs: IndexMap<String, Vec<InputValueDefinition>> = IndexMap::new();
    let mut enums: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut scalars: Vec<String> = Vec::new();

    for definition in document.definitions {
        let TypeSystemDefinition::Type(definition) = definition else {
            continue;
        };
        let definition = definition.node;
        let name = definition.name.node.to_string();

        // `extend type X` merges into X.
        match definition.kind {
            TypeKind::Object(object) => objects
                .entry(name)
                .or_default()
                .extend(object.fields.into_iter().map(|f| f.node)),
            TypeKind::InputObject(input) => inputs
                .entry(name)
                .or_default()
                .extend(input.fields.into_iter().map(|f| f.node)),
            TypeKind::Enum(values) => enums
                .entry(name)
                .or_default()
                .extend(values.values.into_iter().map(|v| v.node.value.node.to_string())),
            TypeKind::Scalar => scalars.push(name),
            TypeKind::Interface(_) | TypeKind::Union(_) => {
                tracing::warn!(type_name = %name, "Interfaces and unions are not supported, skipping");
            }
        }
    }

    if !objects.contains_key("Query") {
        return Err(SchemaError::InvalidDocument(
            "schema document declares no Query type".to_string(),
        ));
    }
    let mutation = objects.contains_key("Mutation").then_some("Mutation");

    let mut declared: HashSet<String> = objects
        .keys()
        .chain(inputs.keys())
        .chain(enums.keys())
        .chain(scalars.iter())
        .cloned()
        .collect();
    declared.extend(BUILTIN_SCALARS.iter().map(|s| s.to_string()));

    // Descriptor types such as `date` surface as named types nobody declared.
    let mut referenced = Vec::new();
    for fields in objects.values() {
        for field in fields {
            collect_named(&field.ty.node, &mut referenced);
            for argument in &field.arguments {
                collect_named(&argument.node.ty.node, &mut referenced);
            }
        }
    }
    for fields in inputs.values() {
        for field in fields {
            collect_named(&field.ty.node, &mut referenced);
        }
    }
    for name in referenced {
        if declared.insert(name.clone()) {
            scalars.push(name);
        }
    }

    let mut builder = Schema::build("Query", mutation, None).data(Arc::clone(&executor));

    for (type_name, fields) in &objects {
        let root = type_name == "Query" || type_name == "Mutation";
        let mut object = Object::new(type_name.as_str());
        for definition in fields {
            let field = if root {
                root_field(type_name, definition)
            } else if let Some(operation) = executor.resolvers().get(type_name, &definition.name.node)
            {
                resolved_field(type_name, definition, operation.clone())
            } else {
                property_field(definition)
            };
            object = object.field(with_arguments(field, &definition.arguments));
        }
        builder = builder.register(object);
    }

    for (type_name, fields) in &inputs {
        let mut input = InputObject::new(type_name.as_str());
        for field in fields {
            input = input.field(input_value(field));
        }
        builder = builder.register(input);
    }

    for (type_name, values) in &enums {
        let mut item = Enum::new(type_name.as_str());
        for value in values {
            item = item.item(value.as_str());
        }
        builder = builder.register(item);
    }

    for name in &scalars {
        builder = builder.register(Scalar::new(name.as_str()));
    }

    tracing::info!(
        objects = objects.len(),
        inputs = inputs.len(),
        scalars = scalars.len(),
        "Executable schema assembled"
    );

    builder
        .finish()
        .map_err(|e| SchemaError::InvalidDocument(e.to_string()))
}

fn type_ref(ty: &Type) -> TypeRef {
    let base = match &ty.base {
        BaseType::Named(name) => TypeRef::named(name.to_string()),
        BaseType::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
    };
    if ty.nullable {
        base
    } else {
        TypeRef::NonNull(Box::new(base))
    }
}

fn collect_named(ty: &Type, names: &mut Vec<String>) {
    match &ty.base {
        BaseType::Named(name) => names.push(name.to_string()),
        BaseType::List(inner) => collect_named(inner, names),
    }
}

fn input_value(definition: &InputValueDefinition) -> InputValue {
    let input = InputValue::new(definition.name.node.to_string(), type_ref(&definition.ty.node));
    match &definition.default_value {
        Some(default) => input.default_value(default.node.clone()),
        None => input,
    }
}

fn with_arguments(
    mut field: Field,
    arguments: &[Positioned<InputValueDefinition>],
) -> Field {
    for argument in arguments {
        field = field.argument(input_value(&argument.node));
    }
    field
}

fn executor(ctx: &ResolverContext<'_>) -> async_graphql::Result<Arc<Executor>> {
    ctx.data::<Arc<Executor>>().cloned()
}

fn arguments(ctx: &ResolverContext<'_>) -> async_graphql::Result<Map<String, Value>> {
    let mut args = Map::new();
    for (name, value) in ctx.args.as_index_map() {
        args.insert(name.to_string(), value.clone().into_json()?);
    }
    Ok(args)
}

fn resolve_request(
    ctx: &ResolverContext<'_>,
    type_name: &str,
    field: &str,
) -> async_graphql::Result<ResolveRequest> {
    let selection = FieldTree::from_selection(&ctx.field()).map_err(|e| e.extend())?;
    let mut request = ResolveRequest::new(type_name, field)
        .with_args(arguments(ctx)?)
        .with_selection(selection);
    if let Some(context) = ctx.data_opt::<RequestContext>() {
        request = request.with_context(context.clone());
    }
    Ok(request)
}

fn to_graphql(value: Value) -> async_graphql::Result<Option<GqlValue>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(GqlValue::from_json(value)?))
}

/// `Query` and `Mutation` fields, dispatched by name.
fn root_field(type_name: &str, definition: &FieldDefinition) -> Field {
    let type_name = type_name.to_string();
    let name = definition.name.node.to_string();
    Field::new(name.clone(), type_ref(&definition.ty.node), move |ctx| {
        let type_name = type_name.clone();
        let name = name.clone();
        FieldFuture::new(async move {
            let request = resolve_request(&ctx, &type_name, &name)?;
            let value = executor(&ctx)?
                .resolve(request)
                .await
                .map_err(|e| e.extend())?;
            to_graphql(value)
        })
    })
}

/// Object type field backed by a registered resolver, which sees the parent value.
fn resolved_field(type_name: &str, definition: &FieldDefinition, operation: Operation) -> Field {
    let type_name = type_name.to_string();
    let name = definition.name.node.to_string();
    Field::new(name.clone(), type_ref(&definition.ty.node), move |ctx| {
        let type_name = type_name.clone();
        let name = name.clone();
        let operation = operation.clone();
        FieldFuture::new(async move {
            let mut request = resolve_request(&ctx, &type_name, &name)?;
            if let Some(parent) = ctx.parent_value.as_value() {
                request = request.with_parent(parent.clone().into_json()?);
            }
            let value = executor(&ctx)?
                .dispatch(&operation, Arc::new(request))
                .await
                .map_err(|e| e.extend())?;
            to_graphql(value)
        })
    })
}

/// Plain property of the parent object.
fn property_field(definition: &FieldDefinition) -> Field {
    let name = definition.name.node.to_string();
    Field::new(name.clone(), type_ref(&definition.ty.node), move |ctx| {
        let name = name.clone();
        FieldFuture::new(async move {
            let value = match ctx.parent_value.as_value() {
                Some(GqlValue::Object(object)) => object
                    .get(name.as_str())
                    .filter(|v| !matches!(v, GqlValue::Null))
                    .cloned(),
                _ => None,
            };
            Ok(value)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::graphql::builder::SchemaBuilder;
    use crate::graphql::entities::tests::fixtures;
    use crate::graphql::options::Options;
    use crate::graphql::resolvers::Operation;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn schema(options: Options) -> EntitySchema {
        let build = SchemaBuilder::new(fixtures(), options).unwrap().build();
        let storage = Arc::new(crate::db::memory::tests::seeded().await);
        build_executable(Arc::new(build.into_executor(storage))).unwrap()
    }

    async fn execute(schema: &EntitySchema, query: &str) -> async_graphql::Response {
        schema.execute(query).await
    }

    #[tokio::test]
    async fn test_nested_query() {
        let schema = schema(Options::default()).await;
        let response = execute(
            &schema,
            r#"{ course(id: 1) { name category { name parent { name } } } }"#,
        )
        .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({"course": {"name": "Intro to Rust", "category": {"name": "Rust", "parent": {"name": "Programming"}}}})
        );
    }

    #[tokio::test]
    async fn test_not_found_extension() {
        let schema = schema(Options::default()).await;
        let response = execute(&schema, "{ course(id: 77) { name } }").await;
        assert_eq!(response.errors.len(), 1);
        let code = response.errors[0]
            .extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .cloned();
        assert_eq!(code, Some(GqlValue::from("NOT_FOUND")));
    }

    #[tokio::test]
    async fn test_custom_scalars_and_type_resolvers() {
        let mut entities = fixtures();
        entities[1] = entities[1]
            .clone()
            .scalar("publishedOn", crate::graphql::entities::ScalarType::new("date"));
        let options = Options {
            extend_types: "type Stats {\n  total: Int\n  label: String\n}".to_string(),
            extend_queries: "  stats: Stats".to_string(),
            ..Options::default()
        }
        .with_query_resolver(
            "stats",
            Operation::custom(|_| async { Ok(json!({"total": 3})) }),
        )
        .with_type_resolvers(
            "Stats",
            IndexMap::from([(
                "label".to_string(),
                Operation::custom(|request: Arc<ResolveRequest>| async move {
                    let total = request.parent.as_ref().map(|p| p["total"].clone());
                    Ok(json!(format!("{} courses", total.unwrap_or_default())))
                }),
            )]),
        );

        let build = SchemaBuilder::new(entities, options).unwrap().build();
        assert!(build.type_defs.contains("publishedOn: Date"));
        let storage = Arc::new(crate::db::memory::tests::seeded().await);
        let schema = build_executable(Arc::new(build.into_executor(storage))).unwrap();

        let response = execute(&schema, "{ stats { total label } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({"stats": {"total": 3, "label": "3 courses"}})
        );
    }

    #[test]
    fn test_document_without_query_is_rejected() {
        let build = SchemaBuilder::new(
            fixtures(),
            Options {
                query_options: crate::graphql::options::QueryOptions::Toggle(false),
                ..Options::default()
            },
        )
        .unwrap()
        .build();
        let registry = Arc::clone(&build.registry);
        let executor = build.into_executor(Arc::new(MemoryStorage::new(registry)));
        assert!(matches!(
            build_executable(Arc::new(executor)),
            Err(SchemaError::InvalidDocument(_))
        ));
    }
}
