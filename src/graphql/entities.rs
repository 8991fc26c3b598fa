//! Entity descriptors and the registry built from them
//!
//! A descriptor is static metadata for one entity: its ordered fields, the relations those
//! fields resolve through, and per-entity API toggles. Descriptors are either built in code
//! or deserialized from a YAML/JSON file:
//!
//! ```yaml
//! name: Course
//! table: course
//! fields:
//!   id: integer
//!   name: string
//!   categoryId: integer
//!   category: object
//! relations:
//!   category: { kind: one, target: Category, join: { from: categoryId, to: id } }
//! ```
//!
//! The [`EntityRegistry`] validates a set of descriptors once and is then shared read-only.

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::SchemaError;

/// Semantic type of a scalar field, as written in the descriptor (`string`, `integer`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ScalarType(String);

impl ScalarType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn string() -> Self {
        Self::new("string")
    }

    pub fn integer() -> Self {
        Self::new("integer")
    }

    pub fn boolean() -> Self {
        Self::new("boolean")
    }

    pub fn number() -> Self {
        Self::new("number")
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// GraphQL type name: `string` → `String`, `integer` → `Int`, anything else capitalized.
    pub fn graphql_name(&self) -> String {
        match self.0.as_str() {
            "string" => "String".to_string(),
            "integer" => "Int".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

/// One entry of an entity's field list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "FieldSpec")]
pub enum Field {
    Scalar(ScalarType),
    /// Resolves through `relation_name`, or through the relation named like the field.
    Relation { relation_name: Option<String> },
}

impl Field {
    pub fn scalar(ty: ScalarType) -> Self {
        Self::Scalar(ty)
    }

    pub fn relation() -> Self {
        Self::Relation {
            relation_name: None,
        }
    }

    pub fn relation_through(relation_name: impl Into<String>) -> Self {
        Self::Relation {
            relation_name: Some(relation_name.into()),
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation { .. })
    }
}

/// Accepted spellings of a field in descriptor files.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldSpec {
    Type(String),
    Relation {
        relation: String,
    },
    Typed {
        #[serde(rename = "type")]
        ty: String,
        #[serde(rename = "relationName")]
        relation_name: Option<String>,
    },
}

impl From<FieldSpec> for Field {
    fn from(spec: FieldSpec) -> Self {
        let (ty, relation_name) = match spec {
            FieldSpec::Type(ty) => (ty, None),
            FieldSpec::Relation { relation } => return Field::relation_through(relation),
            FieldSpec::Typed { ty, relation_name } => (ty, relation_name),
        };
        match ty.as_str() {
            "object" | "relation" => Field::Relation { relation_name },
            _ => Field::Scalar(ScalarType(ty)),
        }
    }
}

/// How many target rows a relation yields per owner row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
    /// Many-to-many through another relation of the same entity.
    ManyThrough { via: String },
}

impl Cardinality {
    pub fn is_list(&self) -> bool {
        !matches!(self, Self::One)
    }
}

/// Column pairing between the owning entity (`from`) and the target entity (`to`).
///
/// For many-through relations the owner side is the intermediate entity reached via the
/// `via` relation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Join {
    pub from: String,
    pub to: String,
}

impl Join {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RelationSpec")]
pub struct RelationDescriptor {
    pub cardinality: Cardinality,
    pub target: String,
    pub join: Join,
    pub expose_in_api: bool,
    pub exposed_as: Option<String>,
}

impl RelationDescriptor {
    pub fn one(target: impl Into<String>, join: Join) -> Self {
        Self::new(Cardinality::One, target, join)
    }

    pub fn many(target: impl Into<String>, join: Join) -> Self {
        Self::new(Cardinality::Many, target, join)
    }

    pub fn many_through(target: impl Into<String>, via: impl Into<String>, join: Join) -> Self {
        Self::new(Cardinality::ManyThrough { via: via.into() }, target, join)
    }

    fn new(cardinality: Cardinality, target: impl Into<String>, join: Join) -> Self {
        Self {
            cardinality,
            target: target.into(),
            join,
            expose_in_api: true,
            exposed_as: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.expose_in_api = false;
        self
    }

    pub fn exposed_as(mut self, name: impl Into<String>) -> Self {
        self.exposed_as = Some(name.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum RelationKind {
    One,
    Many,
    #[serde(alias = "manyThrough")]
    ManyThrough,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationSpec {
    kind: RelationKind,
    target: String,
    join: Join,
    #[serde(default, alias = "throughRelation")]
    via: Option<String>,
    #[serde(default = "default_true")]
    expose_in_api: bool,
    #[serde(default)]
    exposed_as: Option<String>,
}

impl TryFrom<RelationSpec> for RelationDescriptor {
    type Error = String;

    fn try_from(spec: RelationSpec) -> Result<Self, Self::Error> {
        let cardinality = match (spec.kind, spec.via) {
            (RelationKind::One, _) => Cardinality::One,
            (RelationKind::Many, _) => Cardinality::Many,
            (RelationKind::ManyThrough, Some(via)) => Cardinality::ManyThrough { via },
            (RelationKind::ManyThrough, None) => {
                return Err(format!(
                    "many_through relation to {} needs a `via` relation",
                    spec.target
                ));
            }
        };
        Ok(Self {
            cardinality,
            target: spec.target,
            join: spec.join,
            expose_in_api: spec.expose_in_api,
            exposed_as: spec.exposed_as,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Per-entity API toggles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiOptions {
    pub generate_default_queries: bool,
    pub generate_default_mutations: bool,
    /// Key field used by keyed reads and writes. `None` disables the keyed operations.
    pub primary_field: Option<String>,
    /// Merge the builder's `extendProps` into this entity.
    pub extra_props: bool,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            generate_default_queries: true,
            generate_default_mutations: true,
            primary_field: Some("id".to_string()),
            extra_props: true,
        }
    }
}

impl ApiOptions {
    pub fn read_only() -> Self {
        Self {
            generate_default_mutations: false,
            ..Self::default()
        }
    }

    pub fn internal() -> Self {
        Self {
            generate_default_queries: false,
            generate_default_mutations: false,
            ..Self::default()
        }
    }
}

/// What a name requested through the API refers to on an entity.
#[derive(Debug, Clone, Copy)]
pub enum ApiField<'a> {
    Scalar(&'a ScalarType),
    Relation {
        name: &'a str,
        relation: &'a RelationDescriptor,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
    #[serde(default)]
    pub relations: IndexMap<String, RelationDescriptor>,
    #[serde(default, alias = "apiOptions", alias = "graphqlOptions")]
    pub api: ApiOptions,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: IndexMap::new(),
            relations: IndexMap::new(),
            api: ApiOptions::default(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn scalar(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.field(name, Field::Scalar(ty))
    }

    /// Add a relation-typed field resolving through the relation of the same name.
    pub fn relation_field(self, name: impl Into<String>) -> Self {
        self.field(name, Field::relation())
    }

    pub fn relation(mut self, name: impl Into<String>, relation: RelationDescriptor) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn api(mut self, api: ApiOptions) -> Self {
        self.api = api;
        self
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    /// Lower camel case name used for operation names (`CourseCategory` → `courseCategory`).
    pub fn camel_name(&self) -> String {
        self.name.to_case(Case::Camel)
    }

    pub fn primary_field(&self) -> Option<&str> {
        self.api.primary_field.as_deref()
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = (&str, &ScalarType)> {
        self.fields.iter().filter_map(|(name, field)| match field {
            Field::Scalar(ty) => Some((name.as_str(), ty)),
            Field::Relation { .. } => None,
        })
    }

    pub fn scalar_type(&self, name: &str) -> Option<&ScalarType> {
        match self.fields.get(name) {
            Some(Field::Scalar(ty)) => Some(ty),
            _ => None,
        }
    }

    pub fn has_scalar(&self, name: &str) -> bool {
        self.scalar_type(name).is_some()
    }

    /// Relation entry a relation-typed field resolves through.
    pub fn relation_for_field(&self, field: &str) -> Option<(&str, &RelationDescriptor)> {
        let relation_name = match self.fields.get(field)? {
            Field::Relation { relation_name } => relation_name.as_deref().unwrap_or(field),
            Field::Scalar(_) => return None,
        };
        self.relations
            .get_key_value(relation_name)
            .map(|(name, relation)| (name.as_str(), relation))
    }

    /// Relation fields exposed through the API, as `(api name, relation name, relation)`.
    pub fn api_relations(&self) -> impl Iterator<Item = (&str, &str, &RelationDescriptor)> {
        self.fields.keys().filter_map(move |field| {
            let (name, relation) = self.relation_for_field(field)?;
            if !relation.expose_in_api {
                return None;
            }
            let api_name = relation.exposed_as.as_deref().unwrap_or(field);
            Some((api_name, name, relation))
        })
    }

    /// Resolve a field name as requested through the API.
    pub fn resolve_api_field(&self, name: &str) -> Option<ApiField<'_>> {
        if let Some(ty) = self.scalar_type(name) {
            return Some(ApiField::Scalar(ty));
        }
        self.api_relations()
            .find(|(api_name, _, _)| *api_name == name)
            .map(|(_, name, relation)| ApiField::Relation { name, relation })
    }

    /// Copy of this descriptor with `extra` fields appended, unless it opted out.
    ///
    /// Fields the entity already declares keep their own definition.
    pub fn merged_with(&self, extra: &IndexMap<String, Field>) -> Self {
        let mut merged = self.clone();
        if !self.api.extra_props {
            return merged;
        }
        for (name, field) in extra {
            if !merged.fields.contains_key(name) {
                merged.fields.insert(name.clone(), field.clone());
            }
        }
        merged
    }

    fn validate(&self, registry: &IndexMap<String, EntityDescriptor>) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::MissingFields {
                entity: self.name.clone(),
            });
        }

        for (field, spec) in &self.fields {
            if let Field::Relation { relation_name } = spec {
                let relation = relation_name.as_deref().unwrap_or(field);
                if !self.relations.contains_key(relation) {
                    return Err(SchemaError::UnresolvedRelation {
                        entity: self.name.clone(),
                        field: field.clone(),
                        relation: relation.to_string(),
                    });
                }
            }
        }

        for (name, relation) in &self.relations {
            if !registry.contains_key(&relation.target) {
                return Err(SchemaError::UnknownTarget {
                    entity: self.name.clone(),
                    relation: name.clone(),
                    target: relation.target.clone(),
                });
            }
            if let Cardinality::ManyThrough { via } = &relation.cardinality {
                let direct = self
                    .relations
                    .get(via)
                    .is_some_and(|r| !matches!(r.cardinality, Cardinality::ManyThrough { .. }));
                if !direct {
                    return Err(SchemaError::InvalidThrough {
                        entity: self.name.clone(),
                        relation: name.clone(),
                        via: via.clone(),
                    });
                }
            }
        }

        if self.api.generate_default_mutations && self.primary_field() == Some("") {
            return Err(SchemaError::EmptyPrimaryField {
                entity: self.name.clone(),
            });
        }

        Ok(())
    }
}

/// Validated, immutable set of entity descriptors in declaration order.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: IndexMap<String, EntityDescriptor>,
}

impl EntityRegistry {
    pub fn new(
        entities: impl IntoIterator<Item = EntityDescriptor>,
    ) -> Result<Self, SchemaError> {
        let mut map = IndexMap::new();
        for entity in entities {
            if map.contains_key(&entity.name) {
                return Err(SchemaError::DuplicateEntity {
                    entity: entity.name,
                });
            }
            map.insert(entity.name.clone(), entity);
        }

        for entity in map.values() {
            entity.validate(&map)?;
        }

        Ok(Self { entities: map })
    }

    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Category/Course pair used across the crate's tests.
    pub(crate) fn fixtures() -> Vec<EntityDescriptor> {
        let category = EntityDescriptor::new("Category")
            .table("category")
            .scalar("id", ScalarType::integer())
            .scalar("name", ScalarType::string())
            .scalar("parentCategoryId", ScalarType::integer())
            .field("parent", Field::relation_through("parentCategory"))
            .field("children", Field::relation_through("childCategories"))
            .field("courses", Field::relation())
            .relation(
                "parentCategory",
                RelationDescriptor::one("Category", Join::new("parentCategoryId", "id")),
            )
            .relation(
                "childCategories",
                RelationDescriptor::many("Category", Join::new("id", "parentCategoryId")),
            )
            .relation(
                "courses",
                RelationDescriptor::many("Course", Join::new("id", "categoryId")),
            )
            .api(ApiOptions::internal());

        let course = EntityDescriptor::new("Course")
            .table("course")
            .scalar("id", ScalarType::integer())
            .scalar("name", ScalarType::string())
            .scalar("description", ScalarType::string())
            .scalar("categoryId", ScalarType::integer())
            .relation_field("category")
            .relation(
                "category",
                RelationDescriptor::one("Category", Join::new("categoryId", "id")),
            );

        vec![category, course]
    }

    #[test]
    fn test_graphql_type_names() {
        assert_eq!(ScalarType::string().graphql_name(), "String");
        assert_eq!(ScalarType::integer().graphql_name(), "Int");
        assert_eq!(ScalarType::boolean().graphql_name(), "Boolean");
        assert_eq!(ScalarType::new("float").graphql_name(), "Float");
        assert_eq!(ScalarType::new("dateTime").graphql_name(), "DateTime");
    }

    #[test]
    fn test_registry_preserves_declaration_order() {
        let registry = EntityRegistry::new(fixtures()).unwrap();
        let names: Vec<_> = registry.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Category", "Course"]);

        let course = registry.get("Course").unwrap();
        let fields: Vec<_> = course.fields.keys().map(String::as_str).collect();
        assert_eq!(
            fields,
            vec!["id", "name", "description", "categoryId", "category"]
        );
    }

    #[test]
    fn test_relation_field_resolution() {
        let registry = EntityRegistry::new(fixtures()).unwrap();
        let category = registry.get("Category").unwrap();

        let (name, relation) = category.relation_for_field("parent").unwrap();
        assert_eq!(name, "parentCategory");
        assert_eq!(relation.cardinality, Cardinality::One);

        let (name, _) = category.relation_for_field("courses").unwrap();
        assert_eq!(name, "courses");

        assert!(category.relation_for_field("name").is_none());
        assert_matches!(
            category.resolve_api_field("children"),
            Some(ApiField::Relation { name: "childCategories", .. })
        );
        assert_matches!(category.resolve_api_field("name"), Some(ApiField::Scalar(_)));
        assert!(category.resolve_api_field("parentCategory").is_none());
    }

    #[test]
    fn test_exposed_as_renames_api_field() {
        let tag = EntityDescriptor::new("Tag").scalar("id", ScalarType::integer());
        let post = EntityDescriptor::new("Post")
            .scalar("id", ScalarType::integer())
            .relation_field("tags")
            .relation(
                "tags",
                RelationDescriptor::many("Tag", Join::new("id", "postId")).exposed_as("labels"),
            );
        let registry = EntityRegistry::new(vec![tag, post]).unwrap();
        let post = registry.get("Post").unwrap();

        assert!(post.resolve_api_field("tags").is_none());
        assert_matches!(
            post.resolve_api_field("labels"),
            Some(ApiField::Relation { name: "tags", .. })
        );
    }

    #[test]
    fn test_duplicate_entity_is_rejected() {
        let mut entities = fixtures();
        entities.push(EntityDescriptor::new("Course").scalar("id", ScalarType::integer()));
        assert_matches!(
            EntityRegistry::new(entities),
            Err(SchemaError::DuplicateEntity { entity }) if entity == "Course"
        );
    }

    #[test]
    fn test_camel_name_splits_acronyms() {
        assert_eq!(EntityDescriptor::new("CourseCategory").camel_name(), "courseCategory");
        assert_eq!(EntityDescriptor::new("HTTPLog").camel_name(), "httpLog");
    }

    #[test]
    fn test_entity_without_fields_is_rejected() {
        let err = EntityRegistry::new(vec![EntityDescriptor::new("Empty")]).unwrap_err();
        assert_matches!(err, SchemaError::MissingFields { entity } if entity == "Empty");
    }

    #[test]
    fn test_unresolved_relation_field_is_rejected() {
        let broken = EntityDescriptor::new("Course")
            .scalar("id", ScalarType::integer())
            .field("category", Field::relation_through("missing"));
        let err = EntityRegistry::new(vec![broken]).unwrap_err();
        assert_matches!(
            err,
            SchemaError::UnresolvedRelation { field, relation, .. }
                if field == "category" && relation == "missing"
        );
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let broken = EntityDescriptor::new("Course")
            .scalar("id", ScalarType::integer())
            .relation(
                "category",
                RelationDescriptor::one("Category", Join::new("categoryId", "id")),
            );
        let err = EntityRegistry::new(vec![broken]).unwrap_err();
        assert_matches!(err, SchemaError::UnknownTarget { target, .. } if target == "Category");
    }

    #[test]
    fn test_through_relation_must_be_direct() {
        let tag = EntityDescriptor::new("Tag").scalar("id", ScalarType::integer());
        let post = EntityDescriptor::new("Post")
            .scalar("id", ScalarType::integer())
            .relation(
                "tags",
                RelationDescriptor::many_through("Tag", "postTags", Join::new("tagId", "id")),
            );
        let err = EntityRegistry::new(vec![tag, post]).unwrap_err();
        assert_matches!(err, SchemaError::InvalidThrough { via, .. } if via == "postTags");
    }

    #[test]
    fn test_empty_primary_field_with_mutations_is_rejected() {
        let entity = EntityDescriptor::new("Thing")
            .scalar("id", ScalarType::integer())
            .api(ApiOptions {
                primary_field: Some(String::new()),
                ..ApiOptions::default()
            });
        let err = EntityRegistry::new(vec![entity]).unwrap_err();
        assert_matches!(err, SchemaError::EmptyPrimaryField { .. });
    }

    #[test]
    fn test_merged_with_respects_opt_out() {
        let mut extra = IndexMap::new();
        extra.insert("createdAt".to_string(), Field::scalar(ScalarType::string()));
        extra.insert("name".to_string(), Field::scalar(ScalarType::integer()));

        let course = &fixtures()[1];
        let merged = course.merged_with(&extra);
        assert_eq!(merged.fields.len(), course.fields.len() + 1);
        assert_eq!(merged.scalar_type("name"), Some(&ScalarType::string()));
        assert!(merged.has_scalar("createdAt"));

        let opted_out = course.clone().api(ApiOptions {
            extra_props: false,
            ..ApiOptions::default()
        });
        assert!(!opted_out.merged_with(&extra).has_scalar("createdAt"));
    }

    #[test]
    fn test_deserialize_descriptor() {
        let yaml = r#"
name: Category
table: category
fields:
  id: integer
  name: string
  parentCategoryId: integer
  parent: { relation: parentCategory }
  children: { type: object, relationName: childCategories }
relations:
  parentCategory: { kind: one, target: Category, join: { from: parentCategoryId, to: id } }
  childCategories: { kind: many, target: Category, join: { from: id, to: parentCategoryId } }
apiOptions:
  generateDefaultMutations: false
"#;
        let entity: EntityDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entity.table_name(), "category");
        assert_eq!(entity.scalar_type("id"), Some(&ScalarType::integer()));
        assert_eq!(
            entity.fields["parent"],
            Field::relation_through("parentCategory")
        );
        assert_eq!(
            entity.fields["children"],
            Field::relation_through("childCategories")
        );
        assert!(entity.api.generate_default_queries);
        assert!(!entity.api.generate_default_mutations);
        assert_eq!(entity.primary_field(), Some("id"));

        EntityRegistry::new(vec![entity]).unwrap();
    }

    #[test]
    fn test_deserialize_many_through_requires_via() {
        let yaml = "{ kind: many_through, target: Tag, join: { from: tagId, to: id } }";
        assert!(serde_yaml::from_str::<RelationDescriptor>(yaml).is_err());

        let yaml = "{ kind: many_through, target: Tag, via: postTags, join: { from: tagId, to: id } }";
        let relation: RelationDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            relation.cardinality,
            Cardinality::ManyThrough {
                via: "postTags".to_string()
            }
        );
    }
}
