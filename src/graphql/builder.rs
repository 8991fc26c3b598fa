//! Schema builder
//!
//! Entry point tying descriptors and [`Options`] together. Produces the schema document
//! and the resolver map, and hands both to an [`Executor`] once storage is known.

use std::sync::Arc;

use indexmap::IndexMap;

use super::entities::{EntityDescriptor, EntityRegistry};
use super::filters::ArgumentProtocol;
use super::options::{MutationKind, Options};
use super::resolvers::{DefaultOperation, Executor, Operation, ResolverMap};
use super::sdl::{Synthesizer, plural_name};
use crate::db::Storage;
use crate::error::SchemaError;

#[derive(Debug)]
pub struct SchemaBuilder {
    registry: Arc<EntityRegistry>,
    protocol: Arc<ArgumentProtocol>,
    options: Options,
}

impl SchemaBuilder {
    pub fn new(
        entities: impl IntoIterator<Item = EntityDescriptor>,
        options: Options,
    ) -> Result<Self, SchemaError> {
        let entities: Vec<EntityDescriptor> = entities.into_iter().collect();

        // Extra props must not hide an entity that declares nothing itself.
        if let Some(empty) = entities.iter().find(|e| e.fields.is_empty()) {
            return Err(SchemaError::MissingFields {
                entity: empty.name.clone(),
            });
        }

        let merged = entities
            .iter()
            .map(|entity| entity.merged_with(&options.extend_props));
        let registry = EntityRegistry::new(merged)?;
        let protocol = ArgumentProtocol::from_options(&options.query_options)?;

        tracing::info!(
            entities = registry.len(),
            extra_props = options.extend_props.len(),
            "Entity registry built"
        );

        Ok(Self {
            registry: Arc::new(registry),
            protocol: Arc::new(protocol),
            options,
        })
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn protocol(&self) -> &Arc<ArgumentProtocol> {
        &self.protocol
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn build_type_defs(&self) -> String {
        Synthesizer::new(&self.registry, &self.protocol, &self.options).synthesize()
    }

    pub fn build_query_resolvers(&self) -> IndexMap<String, Operation> {
        let mut resolvers = IndexMap::new();
        let hooks = &self.options.hooks;

        if self.options.query_options.enabled() {
            for entity in self.registry.iter() {
                if !entity.api.generate_default_queries {
                    continue;
                }
                if entity.primary_field().is_some() {
                    resolvers.insert(
                        entity.camel_name(),
                        Operation::ReadOne(DefaultOperation::new(
                            &entity.name,
                            hooks.read_one.clone(),
                        )),
                    );
                }
                resolvers.insert(
                    plural_name(entity),
                    Operation::ReadMany(DefaultOperation::new(
                        &entity.name,
                        hooks.read_many.clone(),
                    )),
                );
            }
        }

        for entity in self.registry.iter() {
            if let Some(overrides) = self.options.entity_resolvers.get(&entity.name) {
                extend(&mut resolvers, &overrides.query);
            }
        }
        extend(&mut resolvers, &self.options.extend_query_resolvers);
        resolvers
    }

    pub fn build_mutation_resolvers(&self) -> IndexMap<String, Operation> {
        let mut resolvers = IndexMap::new();
        let hooks = &self.options.hooks;
        let allowed = &self.options.mutation_options;

        for entity in self.registry.iter() {
            if !entity.api.generate_default_mutations || entity.primary_field().is_none() {
                continue;
            }
            let name = &entity.name;
            let has_inputs = entity.scalar_fields().next().is_some();

            if has_inputs && allowed.allows(MutationKind::Create) {
                resolvers.insert(
                    format!("create{name}"),
                    Operation::Create(DefaultOperation::new(name, hooks.create.clone())),
                );
            }
            if has_inputs && allowed.allows(MutationKind::Update) {
                resolvers.insert(
                    format!("update{name}"),
                    Operation::Update(DefaultOperation::new(name, hooks.update.clone())),
                );
            }
            if allowed.allows(MutationKind::Delete) {
                resolvers.insert(
                    format!("delete{name}"),
                    Operation::Delete(DefaultOperation::new(name, hooks.delete.clone())),
                );
            }
        }

        for entity in self.registry.iter() {
            if let Some(overrides) = self.options.entity_resolvers.get(&entity.name) {
                extend(&mut resolvers, &overrides.mutation);
            }
        }
        extend(&mut resolvers, &self.options.extend_mutation_resolvers);
        resolvers
    }

    /// `Query` and `Mutation` maps, then any whole-type replacements.
    pub fn build_resolvers(&self) -> ResolverMap {
        let mut map = ResolverMap::default();
        map.insert_type("Query", self.build_query_resolvers());
        map.insert_type("Mutation", self.build_mutation_resolvers());
        for (type_name, fields) in &self.options.extend_resolvers {
            map.insert_type(type_name.clone(), fields.clone());
        }
        map
    }

    pub fn build(&self) -> SchemaBuild {
        let type_defs = self.build_type_defs();
        let resolvers = self.build_resolvers();
        tracing::info!(
            bytes = type_defs.len(),
            queries = resolvers.fields("Query").map_or(0, |f| f.len()),
            mutations = resolvers.fields("Mutation").map_or(0, |f| f.len()),
            "Schema built"
        );
        SchemaBuild {
            type_defs,
            resolvers,
            registry: Arc::clone(&self.registry),
            protocol: Arc::clone(&self.protocol),
        }
    }
}

fn extend(resolvers: &mut IndexMap<String, Operation>, overrides: &IndexMap<String, Operation>) {
    for (name, operation) in overrides {
        resolvers.insert(name.clone(), operation.clone());
    }
}

/// Output of [`SchemaBuilder::build`].
#[derive(Debug)]
pub struct SchemaBuild {
    pub type_defs: String,
    pub resolvers: ResolverMap,
    pub registry: Arc<EntityRegistry>,
    pub protocol: Arc<ArgumentProtocol>,
}

impl SchemaBuild {
    pub fn into_executor(self, storage: Arc<dyn Storage>) -> Executor {
        Executor::new(
            self.registry,
            self.protocol,
            storage,
            self.resolvers,
            self.type_defs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::entities::tests::fixtures;
    use crate::graphql::entities::{ApiOptions, Field, ScalarType};
    use crate::graphql::options::{EntityResolvers, MutationOptions, QueryOptions};
    use crate::graphql::resolvers::OperationKind;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn kinds(map: &IndexMap<String, Operation>) -> Vec<(&str, OperationKind)> {
        map.iter().map(|(name, op)| (name.as_str(), op.kind())).collect()
    }

    #[test]
    fn test_default_resolvers_follow_entity_order() {
        let builder = SchemaBuilder::new(fixtures(), Options::default()).unwrap();
        assert_eq!(
            kinds(&builder.build_query_resolvers()),
            vec![
                ("course", OperationKind::ReadOne),
                ("courses", OperationKind::ReadMany),
            ]
        );
        assert_eq!(
            kinds(&builder.build_mutation_resolvers()),
            vec![
                ("createCourse", OperationKind::Create),
                ("updateCourse", OperationKind::Update),
                ("deleteCourse", OperationKind::Delete),
            ]
        );
    }

    #[test]
    fn test_document_matches_resolvers() {
        let build = SchemaBuilder::new(fixtures(), Options::default())
            .unwrap()
            .build();
        assert!(build.type_defs.contains("  course(id: Int!): Course\n"));
        assert!(build.type_defs.contains("  courses(idArray: [Int]): [Course]\n"));
        assert!(!build.type_defs.contains("  category(id: Int!)"));
        for name in build.resolvers.fields("Query").unwrap().keys() {
            assert!(build.type_defs.contains(&format!("  {name}(")));
        }
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let constant = |value: &'static str| {
            Operation::custom(move |_| async move { Ok(json!(value)) })
        };
        let options = Options::default()
            .with_entity_resolvers(
                "Course",
                EntityResolvers {
                    query: IndexMap::from([("courses".to_string(), constant("entity"))]),
                    mutation: IndexMap::new(),
                },
            )
            .with_query_resolver("courses", constant("global"))
            .with_mutation_resolver("archiveCourse", constant("archived"));
        let builder = SchemaBuilder::new(fixtures(), options).unwrap();

        let queries = builder.build_query_resolvers();
        assert_eq!(queries["course"].kind(), OperationKind::ReadOne);
        assert_eq!(queries["courses"].kind(), OperationKind::Custom);
        let mutations = builder.build_mutation_resolvers();
        assert_eq!(mutations.len(), 4);
        assert_eq!(mutations["archiveCourse"].kind(), OperationKind::Custom);
    }

    #[test]
    fn test_extend_resolvers_replace_whole_types() {
        let options = Options::default().with_type_resolvers(
            "Query",
            IndexMap::from([(
                "version".to_string(),
                Operation::custom(|_| async { Ok(json!("1")) }),
            )]),
        );
        let resolvers = SchemaBuilder::new(fixtures(), options)
            .unwrap()
            .build_resolvers();
        let query = resolvers.fields("Query").unwrap();
        assert_eq!(query.len(), 1);
        assert!(resolvers.get("Query", "course").is_none());
        assert!(resolvers.get("Mutation", "deleteCourse").is_some());
    }

    #[test]
    fn test_disabled_defaults() {
        let options = Options {
            query_options: QueryOptions::Toggle(false),
            mutation_options: MutationOptions::Toggle(false),
            ..Options::default()
        };
        let builder = SchemaBuilder::new(fixtures(), options).unwrap();
        assert!(builder.build_query_resolvers().is_empty());
        assert!(builder.build_mutation_resolvers().is_empty());

        let sdl = builder.build_type_defs();
        assert!(!sdl.contains("type Query"));
        assert!(!sdl.contains("type Mutation"));
        assert!(sdl.contains("type Course {"));
    }

    #[test]
    fn test_read_only_entity() {
        let mut entities = fixtures();
        entities[1] = entities[1].clone().api(ApiOptions::read_only());
        let builder = SchemaBuilder::new(entities, Options::default()).unwrap();
        assert_eq!(builder.build_query_resolvers().len(), 2);
        assert!(builder.build_mutation_resolvers().is_empty());
    }

    #[test]
    fn test_missing_fields_checked_before_extra_props() {
        let mut options = Options::default();
        options
            .extend_props
            .insert("createdAt".to_string(), Field::scalar(ScalarType::string()));
        assert_matches!(
            SchemaBuilder::new(vec![EntityDescriptor::new("Empty")], options),
            Err(SchemaError::MissingFields { entity }) if entity == "Empty"
        );
    }

    #[test]
    fn test_extend_props_merge() {
        let mut options = Options::default();
        options
            .extend_props
            .insert("createdAt".to_string(), Field::scalar(ScalarType::string()));
        options
            .extend_props
            .insert("name".to_string(), Field::scalar(ScalarType::integer()));

        let mut entities = fixtures();
        entities.push(
            EntityDescriptor::new("Setting")
                .scalar("id", ScalarType::integer())
                .api(ApiOptions {
                    extra_props: false,
                    ..ApiOptions::default()
                }),
        );
        let builder = SchemaBuilder::new(entities, options).unwrap();
        let registry = builder.registry();

        let course = registry.get("Course").unwrap();
        assert!(course.has_scalar("createdAt"));
        assert_eq!(course.scalar_type("name"), Some(&ScalarType::string()));
        assert!(!registry.get("Setting").unwrap().has_scalar("createdAt"));
        assert!(builder.build_type_defs().contains("  createdAt: String\n"));
    }

    #[test]
    fn test_extra_relation_prop_must_resolve_everywhere() {
        let mut options = Options::default();
        options
            .extend_props
            .insert("courses".to_string(), Field::relation());
        assert_matches!(
            SchemaBuilder::new(fixtures(), options),
            Err(SchemaError::UnresolvedRelation { entity, field, .. })
                if entity == "Course" && field == "courses"
        );
    }

    #[test]
    fn test_invalid_suffix_configuration() {
        let options: Options = serde_json::from_value(json!({
            "queryOptions": {"like": "Eq"}
        }))
        .unwrap();
        assert_matches!(
            SchemaBuilder::new(fixtures(), options),
            Err(SchemaError::InvalidSuffix { .. })
        );
    }
}
