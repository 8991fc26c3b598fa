//! Error types
//!
//! Build-time problems with entity descriptors surface as [`SchemaError`] before any
//! schema document exists. Everything that can fail while serving a request is an
//! [`Error`]; storage and hook failures pass through it unchanged.

use async_graphql::ErrorExtensions;
use serde_json::Value;
use thiserror::Error;

/// Fatal descriptor problems found while building the registry or the schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{entity} has no fields declared")]
    MissingFields { entity: String },

    #[error("entity {entity} is declared more than once")]
    DuplicateEntity { entity: String },

    #[error("{entity}.{field} is a relation field but no relation named {relation} exists")]
    UnresolvedRelation {
        entity: String,
        field: String,
        relation: String,
    },

    #[error("relation {entity}.{relation} targets unknown entity {target}")]
    UnknownTarget {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("relation {entity}.{relation} goes through {via}, which is not a one/many relation of {entity}")]
    InvalidThrough {
        entity: String,
        relation: String,
        via: String,
    },

    #[error("{entity} generates default mutations but its primary field name is empty")]
    EmptyPrimaryField { entity: String },

    #[error("argument suffix {suffix:?} is empty or used by more than one operator")]
    InvalidSuffix { suffix: String },

    #[error("invalid schema document: {0}")]
    InvalidDocument(String),
}

/// Request-time failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A keyed read or update found nothing under the key.
    #[error("{entity} with key {key} not found")]
    NotFound { entity: String, key: Value },

    #[error("unknown entity {0}")]
    UnknownEntity(String),

    #[error("no resolver registered for {type_name}.{field}")]
    UnknownOperation { type_name: String, field: String },

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(String),

    /// Failures raised by caller-supplied hooks and custom resolvers.
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(entity: impl Into<String>, key: Value) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key,
        }
    }

    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        let code = match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidArgument { .. } => "BAD_USER_INPUT",
            Error::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            _ => "INTERNAL_SERVER_ERROR",
        };
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", code))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
