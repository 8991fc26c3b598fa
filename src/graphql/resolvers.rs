//! Resolver composition
//!
//! Every resolvable field is an [`Operation`]: one of the default CRUD operations on an
//! entity, or a caller-supplied resolver. All operations run through
//! [`Executor::dispatch`], which gives hooks the first word and otherwise compiles a fetch
//! plan and hands it to storage.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::entities::{EntityDescriptor, EntityRegistry};
use super::filters::ArgumentProtocol;
use super::orm::FetchGraphCompiler;
use super::selection::FieldTree;
use crate::db::Storage;
use crate::error::{Error, Result};

/// Hook consulted before a default operation. A result that is present and not null is
/// returned as-is and the default path never runs.
pub type Hook = Arc<dyn Fn(Arc<ResolveRequest>) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>;

/// Caller-supplied resolver for a field.
pub type Resolver = Arc<dyn Fn(Arc<ResolveRequest>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(Arc<ResolveRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

pub fn resolver<F, Fut>(f: F) -> Resolver
where
    F: Fn(Arc<ResolveRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

/// Opaque per-request data handed through to hooks and resolvers.
#[derive(Clone)]
pub struct RequestContext(Arc<dyn Any + Send + Sync>);

impl RequestContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestContext(..)")
    }
}

/// Everything a resolver gets to see about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub type_name: String,
    pub field: String,
    pub parent: Option<Value>,
    pub args: Map<String, Value>,
    pub selection: FieldTree,
    pub context: Option<RequestContext>,
}

impl ResolveRequest {
    pub fn new(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field: field.into(),
            parent: None,
            args: Map::new(),
            selection: FieldTree::default(),
            context: None,
        }
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_parent(mut self, parent: Value) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_selection(mut self, selection: FieldTree) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.as_ref()?.downcast_ref()
    }
}

/// A default operation bound to an entity.
#[derive(Clone)]
pub struct DefaultOperation {
    pub entity: String,
    pub hook: Option<Hook>,
}

impl DefaultOperation {
    pub fn new(entity: impl Into<String>, hook: Option<Hook>) -> Self {
        Self {
            entity: entity.into(),
            hook,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ReadOne,
    ReadMany,
    Create,
    Update,
    Delete,
    Custom,
}

#[derive(Clone)]
pub enum Operation {
    ReadOne(DefaultOperation),
    ReadMany(DefaultOperation),
    Create(DefaultOperation),
    Update(DefaultOperation),
    Delete(DefaultOperation),
    Custom(Resolver),
}

impl Operation {
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<ResolveRequest>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::Custom(resolver(f))
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ReadOne(_) => OperationKind::ReadOne,
            Operation::ReadMany(_) => OperationKind::ReadMany,
            Operation::Create(_) => OperationKind::Create,
            Operation::Update(_) => OperationKind::Update,
            Operation::Delete(_) => OperationKind::Delete,
            Operation::Custom(_) => OperationKind::Custom,
        }
    }

    /// Entity a default operation works on.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Operation::ReadOne(op)
            | Operation::ReadMany(op)
            | Operation::Create(op)
            | Operation::Update(op)
            | Operation::Delete(op) => Some(&op.entity),
            Operation::Custom(_) => None,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity() {
            Some(entity) => write!(f, "{:?}({entity})", self.kind()),
            None => f.write_str("Custom(..)"),
        }
    }
}

/// Operations keyed by GraphQL type name, then field name.
#[derive(Debug, Clone, Default)]
pub struct ResolverMap {
    types: IndexMap<String, IndexMap<String, Operation>>,
}

impl ResolverMap {
    pub fn get(&self, type_name: &str, field: &str) -> Option<&Operation> {
        self.types.get(type_name)?.get(field)
    }

    pub fn fields(&self, type_name: &str) -> Option<&IndexMap<String, Operation>> {
        self.types.get(type_name)
    }

    /// Replace the whole map for `type_name`.
    pub fn insert_type(&mut self, type_name: impl Into<String>, fields: IndexMap<String, Operation>) {
        self.types.insert(type_name.into(), fields);
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

pub struct Executor {
    registry: Arc<EntityRegistry>,
    protocol: Arc<ArgumentProtocol>,
    storage: Arc<dyn Storage>,
    resolvers: ResolverMap,
    type_defs: String,
}

impl Executor {
    pub fn new(
        registry: Arc<EntityRegistry>,
        protocol: Arc<ArgumentProtocol>,
        storage: Arc<dyn Storage>,
        resolvers: ResolverMap,
        type_defs: String,
    ) -> Self {
        Self {
            registry,
            protocol,
            storage,
            resolvers,
            type_defs,
        }
    }

    pub fn type_defs(&self) -> &str {
        &self.type_defs
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Resolve `request.type_name.request.field` through the resolver map.
    pub async fn resolve(&self, request: ResolveRequest) -> Result<Value> {
        let operation = self
            .resolvers
            .get(&request.type_name, &request.field)
            .cloned()
            .ok_or_else(|| Error::UnknownOperation {
                type_name: request.type_name.clone(),
                field: request.field.clone(),
            })?;
        self.dispatch(&operation, Arc::new(request)).await
    }

    pub async fn dispatch(&self, operation: &Operation, request: Arc<ResolveRequest>) -> Result<Value> {
        tracing::debug!(
            type_name = %request.type_name,
            field = %request.field,
            operation = ?operation,
            "Dispatching operation"
        );

        match operation {
            Operation::Custom(resolver) => resolver(request).await,
            Operation::ReadOne(op) => self.read_one(op, request).await,
            Operation::ReadMany(op) => self.read_many(op, request).await,
            Operation::Create(op) => self.create(op, request).await,
            Operation::Update(op) => self.update(op, request).await,
            Operation::Delete(op) => self.delete(op, request).await,
        }
    }

    fn entity(&self, name: &str) -> Result<&EntityDescriptor> {
        self.registry
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    fn primary_field<'e>(&self, entity: &'e EntityDescriptor) -> Result<&'e str> {
        entity.primary_field().ok_or_else(|| {
            Error::invalid_argument(&entity.name, "entity has no primary field")
        })
    }

    async fn read_one(&self, op: &DefaultOperation, request: Arc<ResolveRequest>) -> Result<Value> {
        let entity = self.entity(&op.entity)?;
        let primary = self.primary_field(entity)?;
        let key = required_arg(&request.args, primary)?;

        if let Some(value) = run_hook(op, &request).await? {
            return Ok(value);
        }

        let plan = FetchGraphCompiler::new(&self.registry, &self.protocol).compile(
            &entity.name,
            &request.selection,
            &request.args,
        );
        self.storage
            .begin_query(&entity.name)
            .with_fetch_plan(plan)
            .find_by_key(key.clone())
            .await?
            .ok_or_else(|| Error::not_found(&entity.name, key))
    }

    async fn read_many(&self, op: &DefaultOperation, request: Arc<ResolveRequest>) -> Result<Value> {
        let entity = self.entity(&op.entity)?;
        let keys = entity
            .primary_field()
            .and_then(|primary| request.args.get(&format!("{primary}Array")))
            .and_then(Value::as_array)
            .cloned();

        if let Some(value) = run_hook(op, &request).await? {
            return Ok(value);
        }

        let plan = FetchGraphCompiler::new(&self.registry, &self.protocol).compile(
            &entity.name,
            &request.selection,
            &request.args,
        );
        let query = self.storage.begin_query(&entity.name).with_fetch_plan(plan);
        let rows = match keys {
            Some(keys) => query.find_by_keys(keys).await?,
            None => query.find_all().await?,
        };
        Ok(Value::Array(rows))
    }

    async fn create(&self, op: &DefaultOperation, request: Arc<ResolveRequest>) -> Result<Value> {
        if let Some(value) = run_hook(op, &request).await? {
            return Ok(value);
        }

        let entity = self.entity(&op.entity)?;
        let input = input_arg(&request.args, &entity.camel_name())?;
        self.storage.begin_query(&entity.name).insert(input).await
    }

    async fn update(&self, op: &DefaultOperation, request: Arc<ResolveRequest>) -> Result<Value> {
        if let Some(value) = run_hook(op, &request).await? {
            return Ok(value);
        }

        let entity = self.entity(&op.entity)?;
        let key = required_arg(&request.args, self.primary_field(entity)?)?;
        let patch = input_arg(&request.args, &entity.camel_name())?;
        self.storage
            .begin_query(&entity.name)
            .patch_by_key(key.clone(), patch)
            .await?
            .ok_or_else(|| Error::not_found(&entity.name, key))
    }

    async fn delete(&self, op: &DefaultOperation, request: Arc<ResolveRequest>) -> Result<Value> {
        if let Some(value) = run_hook(op, &request).await? {
            return Ok(value);
        }

        let entity = self.entity(&op.entity)?;
        let key = required_arg(&request.args, self.primary_field(entity)?)?;
        let removed = self
            .storage
            .begin_query(&entity.name)
            .delete_by_key(key)
            .await?;
        Ok(Value::Bool(removed > 0))
    }
}

async fn run_hook(op: &DefaultOperation, request: &Arc<ResolveRequest>) -> Result<Option<Value>> {
    let Some(hook) = &op.hook else {
        return Ok(None);
    };
    match hook(Arc::clone(request)).await? {
        Some(value) if !value.is_null() => {
            tracing::debug!(entity = %op.entity, field = %request.field, "Hook short-circuited operation");
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

fn required_arg(args: &Map<String, Value>, name: &str) -> Result<Value> {
    args.get(name)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| Error::invalid_argument(name, "required"))
}

fn input_arg(args: &Map<String, Value>, name: &str) -> Result<Map<String, Value>> {
    match args.get(name) {
        Some(Value::Object(input)) => Ok(input.clone()),
        _ => Err(Error::invalid_argument(name, "expected an input object")),
    }
}
