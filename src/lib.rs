//! Entity GraphQL
//!
//! Generates a GraphQL schema document and matching resolvers from declarative entity
//! descriptors. Requested fields compile into nested fetch plans that a storage backend
//! executes, with filters, ordering and paging encoded as suffixed arguments
//! (`nameLike`, `idIn`, `orderByDesc`, ...).

pub mod config;
pub mod db;
pub mod error;
pub mod graphql;
pub mod server;

pub use error::{Error, Result, SchemaError};
