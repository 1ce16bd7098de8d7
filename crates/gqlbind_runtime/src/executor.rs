//! Selection execution for gqlbind.
//!
//! Resolves an already-parsed selection set against a bound schema. Every
//! field goes through the middleware chain before reaching its resolver.

use crate::middleware::MiddlewareManager;
use crate::resolver::{FieldResolver, ResolverArgs, ResolverInfo};
use crate::schema::{FieldDef, Schema};
use crate::extensions::ExtensionData;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum selection depth.
    pub max_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

impl ExecutorConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets maximum selection depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// A field selection, as produced by an operation parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, Value)>,
    pub selections: Vec<Selection>,
}

impl Selection {
    /// Creates a leaf selection.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the response alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument.
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    /// Adds a sub-selection.
    pub fn select(mut self, selection: Selection) -> Self {
        self.selections.push(selection);
        self
    }

    /// Returns the key used in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The selection executor.
#[derive(Debug, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    /// Creates a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Executes `selections` against the object type `root_type`.
    ///
    /// Returns the data and every field error collected along the way.
    pub async fn execute(
        &self,
        schema: &Schema,
        root_type: &str,
        selections: &[Selection],
        root_value: Value,
        ctx: &Context,
        middleware: &MiddlewareManager,
    ) -> (Value, Vec<FieldError>) {
        let exec_ctx = ExecutionContext {
            schema,
            ctx,
            middleware,
            config: &self.config,
            default_resolver: FieldResolver::default(),
            errors: Mutex::new(Vec::new()),
        };

        let data =
            execute_selection_set(root_type, selections, root_value, Vec::new(), 1, &exec_ctx)
                .await;
        (data, exec_ctx.errors.into_inner())
    }
}

struct ExecutionContext<'a> {
    schema: &'a Schema,
    ctx: &'a Context,
    middleware: &'a MiddlewareManager,
    config: &'a ExecutorConfig,
    default_resolver: FieldResolver,
    errors: Mutex<Vec<FieldError>>,
}

impl ExecutionContext<'_> {
    async fn push_error(&self, error: FieldError) {
        self.errors.lock().await.push(error);
    }
}

type ValueFuture<'a> = Pin<Box<dyn Future<Output = Value> + Send + 'a>>;

/// Executes a selection set against an object type.
fn execute_selection_set<'a>(
    type_name: &'a str,
    selections: &'a [Selection],
    parent: Value,
    path: Vec<PathSegment>,
    depth: usize,
    ctx: &'a ExecutionContext<'a>,
) -> ValueFuture<'a> {
    Box::pin(async move {
        if depth > ctx.config.max_depth {
            ctx.push_error(
                FieldError::new(format!(
                    "Query exceeds maximum depth of {}",
                    ctx.config.max_depth
                ))
                .with_path(path),
            )
            .await;
            return Value::Null;
        }

        // Abstract parents may tell us their concrete type.
        let type_name = parent
            .get("__typename")
            .and_then(Value::as_str)
            .filter(|name| ctx.schema.object_type(name).is_some())
            .unwrap_or(type_name)
            .to_string();

        let mut result = serde_json::Map::new();
        for selection in selections {
            let mut field_path = path.clone();
            field_path.push(PathSegment::Field(selection.response_key().to_string()));

            let value = if selection.name == "__typename" {
                Value::String(type_name.clone())
            } else {
                execute_field(&type_name, selection, &parent, field_path, depth, ctx).await
            };
            result.insert(selection.response_key().to_string(), value);
        }

        Value::Object(result)
    })
}

/// Resolves one field and completes its value.
async fn execute_field(
    type_name: &str,
    selection: &Selection,
    parent: &Value,
    path: Vec<PathSegment>,
    depth: usize,
    ctx: &ExecutionContext<'_>,
) -> Value {
    let Some(field) = ctx
        .schema
        .object_type(type_name)
        .and_then(|object| object.field(&selection.name))
    else {
        ctx.push_error(
            FieldError::new(format!(
                "Cannot query field \"{}\" on type \"{}\"",
                selection.name, type_name
            ))
            .with_path(path),
        )
        .await;
        return Value::Null;
    };

    let args = ResolverArgs::from_pairs(selection.arguments.clone());
    let info = ResolverInfo::new(&field.name, type_name)
        .with_return_type(field.ty.named_type())
        .with_path(path.clone());
    let resolver = field.resolver.as_ref().unwrap_or(&ctx.default_resolver);

    match ctx
        .middleware
        .resolve(resolver, parent, &args, ctx.ctx, &info)
        .await
    {
        Ok(value) => complete_value(field, &selection.selections, value, path, depth, ctx).await,
        Err(e) => {
            ctx.push_error(FieldError::from(e).with_path(path)).await;
            Value::Null
        }
    }
}

/// Recurses into object and list values that have sub-selections.
fn complete_value<'a>(
    field: &'a FieldDef,
    selections: &'a [Selection],
    value: Value,
    path: Vec<PathSegment>,
    depth: usize,
    ctx: &'a ExecutionContext<'a>,
) -> ValueFuture<'a> {
    Box::pin(async move {
        if selections.is_empty() {
            return value;
        }

        match value {
            Value::Null => Value::Null,
            Value::Array(items) => {
                let mut results = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let mut item_path = path.clone();
                    item_path.push(PathSegment::Index(i));
                    results.push(complete_value(field, selections, item, item_path, depth, ctx).await);
                }
                Value::Array(results)
            }
            other => {
                execute_selection_set(field.ty.named_type(), selections, other, path, depth + 1, ctx)
                    .await
            }
        }
    })
}

/// Per-request state handed to resolvers and to extension hooks.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Values stored by the caller for resolvers to read back.
    pub data: HashMap<String, Value>,
    /// Operation variables. `graphql` merges request variables in here.
    pub variables: HashMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `variables`, replacing entries that already exist.
    pub fn with_variables<I>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.variables.extend(variables);
        self
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if `value` cannot become JSON.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> serde_json::Result<()> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Reads back a stored value. Returns `None` if it is missing or has another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        T::deserialize(self.data.get(key)?).ok()
    }

    /// Returns an operation variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

/// Outcome of one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// Unset when the operation failed before producing any data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Field errors in the order they were raised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    /// Merged `format` output of the request's extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, Value>>,
}

impl Response {
    /// Builds a response from executor output. `null` data next to errors becomes unset.
    pub fn from_execution(data: Value, errors: Vec<FieldError>) -> Self {
        let failed = !errors.is_empty();
        Self {
            data: (!(failed && data.is_null())).then_some(data),
            errors: failed.then_some(errors),
            extensions: None,
        }
    }

    /// Attaches extension output. An empty map leaves `extensions` unset.
    pub fn with_extensions(mut self, extensions: ExtensionData) -> Self {
        if !extensions.is_empty() {
            self.extensions = Some(extensions.into_iter().collect());
        }
        self
    }

    /// Returns true if any field error was raised.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }
}

/// Step of a response path: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Error raised while resolving one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    /// Response path of the failing field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, Value>>,
}

impl FieldError {
    /// Creates an error without path or extensions.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Sets the response path.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds one error extension entry.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the `code` extension entry.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", Value::String(code.into()))
    }
}
