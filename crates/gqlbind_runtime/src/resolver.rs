//! Field resolvers.
//!
//! Bound fields carry a [`FieldResolver`], a shared handle that directive
//! handlers can capture and wrap. Fields without one fall back to
//! [`DefaultResolver`].

use crate::executor::{Context, FieldError, PathSegment};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Result type for resolvers.
pub type ResolverResult = Result<Value, ResolverError>;

/// Boxed future returned by [`Resolver::resolve`].
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Field arguments of one selection.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    values: FxHashMap<String, Value>,
}

impl ResolverArgs {
    /// Creates empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the `(name, value)` pairs of a selection.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    /// Returns the raw argument value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserializes an optional argument. Malformed values read as absent.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.require(name).ok()
    }

    /// Deserializes a required argument.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))?;
        T::deserialize(value)
            .map_err(|e| ResolverError::ArgumentParseError(name.to_string(), e.to_string()))
    }

    /// Sets an argument value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Where in the response a field is being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    pub field_name: String,
    pub parent_type: String,
    /// Named type of the field, without list or nullability wrappers.
    pub return_type: String,
    pub path: Vec<PathSegment>,
}

impl ResolverInfo {
    /// Creates info for `parent_type.field_name`.
    pub fn new(field_name: impl Into<String>, parent_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            parent_type: parent_type.into(),
            return_type: String::new(),
            path: Vec::new(),
        }
    }

    /// Sets the declared return type.
    pub fn with_return_type(mut self, ty: impl Into<String>) -> Self {
        self.return_type = ty.into();
        self
    }

    /// Sets the response path.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Returns `Parent.field`.
    pub fn coordinate(&self) -> String {
        format!("{}.{}", self.parent_type, self.field_name)
    }
}

/// Error from a resolver.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParseError(String, String),

    #[error("{0}")]
    Custom(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    /// Error code reported in the field error's extensions.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::MissingArgument(_) | Self::ArgumentParseError(..) => Some("BAD_USER_INPUT"),
            Self::Internal(_) => Some("INTERNAL_SERVER_ERROR"),
            Self::FieldNotFound(_) | Self::Custom(_) => None,
        }
    }
}

impl From<ResolverError> for FieldError {
    fn from(error: ResolverError) -> Self {
        let field_error = FieldError::new(error.to_string());
        match error.code() {
            Some(code) => field_error.with_code(code),
            None => field_error,
        }
    }
}

/// Produces the value of one field.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

struct SyncFn<F>(F);

impl<F> Resolver for SyncFn<F>
where
    F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult + Send + Sync,
{
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.0)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// Async closures get owned inputs so the returned future can be `'static`.
struct AsyncFn<F>(F);

impl<F, Fut> Resolver for AsyncFn<F>
where
    F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync,
    Fut: Future<Output = ResolverResult> + Send + 'static,
{
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin((self.0)(
            parent.clone(),
            args.clone(),
            ctx.clone(),
            info.clone(),
        ))
    }
}

/// Reads the field from an object parent.
///
/// A camelCase field name also matches its snake_case key. Missing keys and
/// null parents resolve to null.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin(async move { read_property(parent, &info.field_name) })
    }
}

fn read_property(parent: &Value, field_name: &str) -> ResolverResult {
    match parent {
        Value::Object(map) => {
            let value = match map.get(field_name) {
                Some(value) => Some(value),
                None => map.get(&to_snake_case(field_name)),
            };
            Ok(value.cloned().unwrap_or(Value::Null))
        }
        Value::Null => Ok(Value::Null),
        _ => Err(ResolverError::FieldNotFound(field_name.to_string())),
    }
}

fn to_snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    for (i, c) in name.char_indices() {
        if c.is_uppercase() && i > 0 {
            snake.push('_');
        }
        snake.extend(c.to_lowercase());
    }
    snake
}

/// Shared resolver handle stored on a bound field.
///
/// Cloning shares the underlying resolver, so a directive handler can
/// capture the current one and wrap it.
#[derive(Clone)]
pub struct FieldResolver(Arc<dyn Resolver>);

impl FieldResolver {
    /// Wraps a resolver implementation.
    pub fn new<R: Resolver + 'static>(resolver: R) -> Self {
        Self(Arc::new(resolver))
    }

    /// Wraps a sync closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self::new(SyncFn(f))
    }

    /// Wraps an async closure.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self::new(AsyncFn(f))
    }

    /// Returns true if both handles share one resolver.
    pub fn ptr_eq(&self, other: &FieldResolver) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new(DefaultResolver)
    }
}

impl Resolver for FieldResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        self.0.resolve(parent, args, ctx, info)
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldResolver")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}
