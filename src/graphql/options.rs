//! Builder configuration
//!
//! [`Options`] is the full configuration surface of the schema builder. Everything that
//! is plain data (operator toggles, extension SDL, extra props) deserializes from the
//! `options` section of a descriptor file. Hooks and resolver overrides are code and
//! are attached with the `with_*` methods.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

use super::entities::Field;
use super::resolvers::{Hook, Operation};

/// Per-operator setting inside `queryOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OperatorSetting {
    Enabled(bool),
    /// Enabled under a different suffix or argument name.
    Renamed(String),
}

/// `queryOptions`: `false` turns off default queries, a map tunes individual operators.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueryOptions {
    Toggle(bool),
    Operators(IndexMap<String, OperatorSetting>),
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::Toggle(true)
    }
}

impl QueryOptions {
    pub fn enabled(&self) -> bool {
        !matches!(self, Self::Toggle(false))
    }

    /// Setting for an operator or paging key, enabled when not mentioned.
    pub fn setting(&self, key: &str) -> OperatorSetting {
        match self {
            Self::Operators(map) => map
                .get(key)
                .cloned()
                .unwrap_or(OperatorSetting::Enabled(true)),
            Self::Toggle(_) => OperatorSetting::Enabled(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// `mutationOptions`: a global switch or one switch per default mutation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MutationOptions {
    Toggle(bool),
    Operations {
        #[serde(default = "enabled")]
        create: bool,
        #[serde(default = "enabled")]
        update: bool,
        #[serde(default = "enabled")]
        delete: bool,
    },
}

fn enabled() -> bool {
    true
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self::Toggle(true)
    }
}

impl MutationOptions {
    pub fn allows(&self, kind: MutationKind) -> bool {
        match self {
            Self::Toggle(on) => *on,
            Self::Operations {
                create,
                update,
                delete,
            } => match kind {
                MutationKind::Create => *create,
                MutationKind::Update => *update,
                MutationKind::Delete => *delete,
            },
        }
    }
}

/// Hook(s) consulted before the default read operations.
#[derive(Clone)]
pub enum QueryFunction {
    All(Hook),
    Split {
        single: Option<Hook>,
        multi: Option<Hook>,
    },
}

/// Hook(s) consulted before the default write operations.
#[derive(Clone)]
pub enum MutationFunction {
    All(Hook),
    Split {
        create: Option<Hook>,
        update: Option<Hook>,
        delete: Option<Hook>,
    },
}

/// Hooks currently in effect for each default operation.
#[derive(Clone, Default)]
pub struct Hooks {
    pub read_one: Option<Hook>,
    pub read_many: Option<Hook>,
    pub create: Option<Hook>,
    pub update: Option<Hook>,
    pub delete: Option<Hook>,
}

impl Hooks {
    /// A split setting only replaces the hooks it names.
    pub fn apply_query_function(&mut self, function: QueryFunction) {
        match function {
            QueryFunction::All(hook) => {
                self.read_one = Some(hook.clone());
                self.read_many = Some(hook);
            }
            QueryFunction::Split { single, multi } => {
                if single.is_some() {
                    self.read_one = single;
                }
                if multi.is_some() {
                    self.read_many = multi;
                }
            }
        }
    }

    pub fn apply_mutation_function(&mut self, function: MutationFunction) {
        match function {
            MutationFunction::All(hook) => {
                self.create = Some(hook.clone());
                self.update = Some(hook.clone());
                self.delete = Some(hook);
            }
            MutationFunction::Split {
                create,
                update,
                delete,
            } => {
                if create.is_some() {
                    self.create = create;
                }
                if update.is_some() {
                    self.update = update;
                }
                if delete.is_some() {
                    self.delete = delete;
                }
            }
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("read_one", &self.read_one.is_some())
            .field("read_many", &self.read_many.is_some())
            .field("create", &self.create.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

/// Resolver overrides declared for a single entity.
#[derive(Debug, Clone, Default)]
pub struct EntityResolvers {
    pub query: IndexMap<String, Operation>,
    pub mutation: IndexMap<String, Operation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub query_options: QueryOptions,
    pub mutation_options: MutationOptions,
    /// Raw SDL appended after the generated entity types.
    pub extend_types: String,
    /// Raw SDL appended inside `type Query`.
    pub extend_queries: String,
    /// Raw SDL appended inside `type Mutation`.
    pub extend_mutations: String,
    /// Fields merged into every entity that accepts extra props.
    pub extend_props: IndexMap<String, Field>,

    /// Whole resolver maps keyed by type name, replacing generated ones.
    #[serde(skip)]
    pub extend_resolvers: IndexMap<String, IndexMap<String, Operation>>,
    #[serde(skip)]
    pub extend_query_resolvers: IndexMap<String, Operation>,
    #[serde(skip)]
    pub extend_mutation_resolvers: IndexMap<String, Operation>,
    /// Per-entity overrides keyed by entity name, applied in entity order.
    #[serde(skip)]
    pub entity_resolvers: IndexMap<String, EntityResolvers>,
    #[serde(skip)]
    pub hooks: Hooks,
}

impl Options {
    pub fn with_query_function(mut self, function: QueryFunction) -> Self {
        self.hooks.apply_query_function(function);
        self
    }

    pub fn with_mutation_function(mut self, function: MutationFunction) -> Self {
        self.hooks.apply_mutation_function(function);
        self
    }

    pub fn with_query_resolver(mut self, name: impl Into<String>, operation: Operation) -> Self {
        self.extend_query_resolvers.insert(name.into(), operation);
        self
    }

    pub fn with_mutation_resolver(mut self, name: impl Into<String>, operation: Operation) -> Self {
        self.extend_mutation_resolvers.insert(name.into(), operation);
        self
    }

    pub fn with_type_resolvers(
        mut self,
        type_name: impl Into<String>,
        resolvers: IndexMap<String, Operation>,
    ) -> Self {
        self.extend_resolvers.insert(type_name.into(), resolvers);
        self
    }

    pub fn with_entity_resolvers(
        mut self,
        entity: impl Into<String>,
        resolvers: EntityResolvers,
    ) -> Self {
        self.entity_resolvers.insert(entity.into(), resolvers);
        self
    }
}
