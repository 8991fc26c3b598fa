//! Schema document synthesis
//!
//! Produces the SDL text for a registry: one object type plus create/update input types
//! per entity, then the `Query` and `Mutation` types. Output depends only on the
//! registry, the argument protocol and the options, and preserves declaration order.

use std::fmt::Write as _;

use super::entities::{EntityDescriptor, EntityRegistry};
use super::filters::ArgumentProtocol;
use super::options::{MutationKind, Options};

const INDENT: &str = "  ";

/// Name of the list query for an entity (`course` → `courses`).
pub fn plural_name(entity: &EntityDescriptor) -> String {
    format!("{}s", entity.camel_name())
}

pub fn create_input_name(entity: &EntityDescriptor) -> String {
    format!("{}CreateInput", entity.name)
}

pub fn update_input_name(entity: &EntityDescriptor) -> String {
    format!("{}UpdateInput", entity.name)
}

pub struct Synthesizer<'a> {
    registry: &'a EntityRegistry,
    protocol: &'a ArgumentProtocol,
    options: &'a Options,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        registry: &'a EntityRegistry,
        protocol: &'a ArgumentProtocol,
        options: &'a Options,
    ) -> Self {
        Self {
            registry,
            protocol,
            options,
        }
    }

    pub fn synthesize(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();

        for entity in self.registry.iter() {
            blocks.push(self.object_type(entity));
            if entity.scalar_fields().next().is_some() {
                blocks.push(input_type(entity, &create_input_name(entity)));
                blocks.push(input_type(entity, &update_input_name(entity)));
            }
        }

        push_extension(&mut blocks, &self.options.extend_types);

        let queries = self.query_fields();
        if let Some(block) = root_type("Query", &queries, &self.options.extend_queries) {
            blocks.push(block);
        }

        let mutations = self.mutation_fields();
        if let Some(block) = root_type("Mutation", &mutations, &self.options.extend_mutations) {
            blocks.push(block);
        }

        let mut sdl = blocks.join("\n\n");
        sdl.push('\n');
        sdl
    }

    fn object_type(&self, entity: &EntityDescriptor) -> String {
        let mut out = format!("type {} {{\n", entity.name);

        for (name, ty) in entity.scalar_fields() {
            let _ = writeln!(out, "{INDENT}{name}: {}", ty.graphql_name());
        }

        for (api_name, _, relation) in entity.api_relations() {
            let Some(target) = self.registry.get(&relation.target) else {
                continue;
            };
            let ty = if relation.cardinality.is_list() {
                format!("[{}]", target.name)
            } else {
                target.name.clone()
            };
            let args = self.relation_arguments(target);
            if args.is_empty() {
                let _ = writeln!(out, "{INDENT}{api_name}: {ty}");
            } else {
                let _ = writeln!(out, "{INDENT}{api_name}({}): {ty}", args.join(", "));
            }
        }

        out.push('}');
        out
    }

    /// Filter arguments for every scalar field of `target`, then the paging arguments.
    fn relation_arguments(&self, target: &EntityDescriptor) -> Vec<String> {
        let mut args: Vec<String> = target
            .scalar_fields()
            .flat_map(|(field, ty)| self.protocol.filter_arguments(field, ty))
            .map(|(name, ty)| format!("{name}: {ty}"))
            .collect();
        args.extend(
            self.protocol
                .paging_arguments()
                .map(|(name, ty)| format!("{name}: {ty}")),
        );
        args
    }

    fn query_fields(&self) -> Vec<String> {
        if !self.options.query_options.enabled() {
            return Vec::new();
        }

        let mut fields = Vec::new();
        for entity in self.registry.iter() {
            if !entity.api.generate_default_queries {
                continue;
            }
            let camel = entity.camel_name();
            let name = &entity.name;
            match entity.primary_field() {
                Some(key) => {
                    fields.push(format!("{camel}({key}: Int!): {name}"));
                    fields.push(format!("{}({key}Array: [Int]): [{name}]", plural_name(entity)));
                }
                None => fields.push(format!("{}: [{name}]", plural_name(entity))),
            }
        }
        fields
    }

    fn mutation_fields(&self) -> Vec<String> {
        let allowed = &self.options.mutation_options;
        let mut fields = Vec::new();

        for entity in self.registry.iter() {
            if !entity.api.generate_default_mutations {
                continue;
            }
            let Some(key) = entity.primary_field() else {
                continue;
            };
            let has_inputs = entity.scalar_fields().next().is_some();
            let camel = entity.camel_name();
            let name = &entity.name;

            if has_inputs && allowed.allows(MutationKind::Create) {
                fields.push(format!(
                    "create{name}({camel}: {}!): {name}!",
                    create_input_name(entity)
                ));
            }
            if has_inputs && allowed.allows(MutationKind::Update) {
                fields.push(format!(
                    "update{name}({key}: Int!, {camel}: {}!): {name}!",
                    update_input_name(entity)
                ));
            }
            if allowed.allows(MutationKind::Delete) {
                fields.push(format!("delete{name}({key}: Int!): Boolean"));
            }
        }
        fields
    }
}

fn input_type(entity: &EntityDescriptor, type_name: &str) -> String {
    let mut out = format!("input {type_name} {{\n");
    for (name, ty) in entity.scalar_fields() {
        let _ = writeln!(out, "{INDENT}{name}: {}", ty.graphql_name());
    }
    out.push('}');
    out
}

fn root_type(name: &str, fields: &[String], extension: &str) -> Option<String> {
    let extension = extension.trim_matches('\n');
    if fields.is_empty() && extension.trim().is_empty() {
        return None;
    }

    let mut out = format!("type {name} {{\n");
    for field in fields {
        let _ = writeln!(out, "{INDENT}{field}");
    }
    if !extension.trim().is_empty() {
        out.push_str(extension);
        out.push('\n');
    }
    out.push('}');
    Some(out)
}

fn push_extension(blocks: &mut Vec<String>, extension: &str) {
    let extension = extension.trim_matches('\n');
    if !extension.trim().is_empty() {
        blocks.push(extension.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::entities::tests::fixtures;
    use crate::graphql::entities::{ApiOptions, EntityDescriptor, ScalarType};
    use crate::graphql::options::{MutationOptions, QueryOptions};
    use pretty_assertions::assert_eq;

    fn synthesize(entities: Vec<EntityDescriptor>, options: &Options) -> String {
        let registry = EntityRegistry::new(entities).unwrap();
        let protocol = ArgumentProtocol::from_options(&options.query_options).unwrap();
        Synthesizer::new(&registry, &protocol, options).synthesize()
    }

    fn block<'a>(sdl: &'a str, header: &str) -> &'a str {
        let start = sdl
            .find(header)
            .unwrap_or_else(|| panic!("missing {header}"));
        let end = sdl[start..].find('}').unwrap() + start + 1;
        &sdl[start..end]
    }

    #[test]
    fn test_course_type_and_queries() {
        let sdl = synthesize(fixtures(), &Options::default());

        let course = block(&sdl, "type Course {");
        let lines: Vec<_> = course.lines().map(str::trim).collect();
        assert_eq!(lines[1], "id: Int");
        assert_eq!(lines[2], "name: String");
        let category = lines
            .iter()
            .find(|l| l.starts_with("category("))
            .unwrap();
        assert!(category.ends_with("): Category"));
        assert!(category.contains("idIn: [Int], idNotIn: [Int], idEq: Int"));
        assert!(category.contains("parentCategoryIdIsNull: Boolean"));
        assert!(category.contains("orderBy: String, orderByDesc: String, limit: Int, offset: Int"));

        let query = block(&sdl, "type Query {");
        assert_eq!(
            query,
            "type Query {\n  course(id: Int!): Course\n  courses(idArray: [Int]): [Course]\n}"
        );
        assert!(!sdl.contains("category(id: Int!)"));
        assert!(!sdl.contains("categorys"));
    }

    #[test]
    fn test_category_relations_and_inputs() {
        let sdl = synthesize(fixtures(), &Options::default());

        let category = block(&sdl, "type Category {");
        assert!(category.contains("\n  parent(idIn: [Int]"));
        assert!(category.contains("): Category\n"));
        assert!(category.contains("\n  children(idIn: [Int]"));
        assert!(category.contains("): [Category]\n"));
        assert!(category.contains("\n  courses(idIn: [Int]"));
        assert!(category.contains("): [Course]\n"));

        assert_eq!(
            block(&sdl, "input CourseCreateInput {"),
            "input CourseCreateInput {\n  id: Int\n  name: String\n  description: String\n  categoryId: Int\n}"
        );
        assert!(sdl.contains("input CourseUpdateInput {"));
    }

    #[test]
    fn test_mutations() {
        let sdl = synthesize(fixtures(), &Options::default());
        assert_eq!(
            block(&sdl, "type Mutation {"),
            "type Mutation {\n  createCourse(course: CourseCreateInput!): Course!\n  updateCourse(id: Int!, course: CourseUpdateInput!): Course!\n  deleteCourse(id: Int!): Boolean\n}"
        );
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let options = Options::default();
        assert_eq!(synthesize(fixtures(), &options), synthesize(fixtures(), &options));
    }

    #[test]
    fn test_extensions_are_appended_in_place() {
        let options = Options {
            extend_types: "type Stats {\n  total: Int\n}".to_string(),
            extend_queries: "  stats: Stats".to_string(),
            extend_mutations: "  resetStats: Boolean".to_string(),
            ..Options::default()
        };
        let sdl = synthesize(fixtures(), &options);

        let stats = sdl.find("type Stats {").unwrap();
        assert!(stats > sdl.find("input CourseUpdateInput").unwrap());
        assert!(stats < sdl.find("type Query {").unwrap());
        assert!(block(&sdl, "type Query {").ends_with("[Course]\n  stats: Stats\n}"));
        assert!(block(&sdl, "type Mutation {").ends_with("Boolean\n  resetStats: Boolean\n}"));
    }

    #[test]
    fn test_disabled_operations_are_omitted() {
        let options = Options {
            query_options: QueryOptions::Toggle(false),
            mutation_options: MutationOptions::Operations {
                create: true,
                update: false,
                delete: false,
            },
            ..Options::default()
        };
        let sdl = synthesize(fixtures(), &options);
        assert!(!sdl.contains("type Query"));
        assert_eq!(
            block(&sdl, "type Mutation {"),
            "type Mutation {\n  createCourse(course: CourseCreateInput!): Course!\n}"
        );
    }

    #[test]
    fn test_entity_without_primary_field() {
        let log = EntityDescriptor::new("AuditLog")
            .scalar("message", ScalarType::string())
            .api(ApiOptions {
                primary_field: None,
                ..ApiOptions::default()
            });
        let sdl = synthesize(vec![log], &Options::default());

        assert_eq!(
            block(&sdl, "type Query {"),
            "type Query {\n  auditLogs: [AuditLog]\n}"
        );
        assert!(!sdl.contains("type Mutation"));
    }
}
