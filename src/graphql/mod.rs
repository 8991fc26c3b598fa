//! GraphQL synthesis from entity descriptors
//!
//! [`SchemaBuilder`] validates descriptors into an [`EntityRegistry`], emits the schema
//! document and the resolver map, and [`build_executable`] turns both into an
//! async-graphql dynamic schema backed by a [`Storage`](crate::db::Storage).
//!
//! ```rust,ignore
//! let build = SchemaBuilder::new(entities, Options::default())?.build();
//! let executor = Arc::new(build.into_executor(storage));
//! let schema = build_executable(executor)?;
//! ```

pub mod builder;
pub mod entities;
pub mod filters;
pub mod options;
pub mod orm;
pub mod resolvers;
mod schema;
pub mod sdl;
pub mod selection;

pub use builder::{SchemaBuild, SchemaBuilder};
pub use entities::{
    ApiOptions, Cardinality, EntityDescriptor, EntityRegistry, Field, Join, RelationDescriptor,
    ScalarType,
};
pub use filters::{ArgumentProtocol, FilterOp, PagingArg};
pub use options::{
    EntityResolvers, MutationFunction, MutationOptions, Options, QueryFunction, QueryOptions,
};
pub use resolvers::{
    Executor, Hook, Operation, RequestContext, ResolveRequest, Resolver, ResolverMap, hook,
    resolver,
};
pub use schema::{EntitySchema, build_executable};
pub use selection::{FieldNode, FieldTree};
