//! Request entry point.
//!
//! [`graphql`] executes one already-parsed operation against an
//! [`ExecutableSchema`], with a fresh set of extensions for the request.

use crate::bindable::ExecutableSchema;
use crate::error::ExtensionError;
use crate::executor::{Context, Executor, ExecutorConfig, FieldError, Response, Selection};
use crate::extensions::{ExtensionFactory, ExtensionManager};
use crate::middleware::MiddlewareManager;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Root operation kind of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    #[default]
    Query,
    Mutation,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Mutation => f.write_str("mutation"),
        }
    }
}

/// An already-parsed operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQLRequest {
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub operation_type: OperationType,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

impl GraphQLRequest {
    /// Creates a query request.
    pub fn query(selections: Vec<Selection>) -> Self {
        Self {
            selections,
            ..Self::default()
        }
    }

    /// Creates a mutation request.
    pub fn mutation(selections: Vec<Selection>) -> Self {
        Self {
            selections,
            operation_type: OperationType::Mutation,
            variables: HashMap::new(),
        }
    }

    /// Sets a variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Per-request options for [`graphql`].
#[derive(Debug, Clone, Default)]
pub struct GraphQLOptions {
    context: Context,
    root_value: Value,
    extensions: Vec<ExtensionFactory>,
    middleware: Option<MiddlewareManager>,
    executor: ExecutorConfig,
}

impl GraphQLOptions {
    /// Creates options with an empty context and no extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request context. Request variables are merged into it.
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Sets the value passed as parent to root fields.
    pub fn root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    /// Registers an extension factory.
    pub fn extension(mut self, factory: ExtensionFactory) -> Self {
        self.extensions.push(factory);
        self
    }

    /// Replaces the registered extension factories.
    pub fn extensions(mut self, factories: Vec<ExtensionFactory>) -> Self {
        self.extensions = factories;
        self
    }

    /// Sets the middleware chain. Extensions run inside it.
    pub fn middleware(mut self, middleware: MiddlewareManager) -> Self {
        self.middleware = Some(middleware);
        self
    }

    /// Sets executor configuration.
    pub fn executor(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }
}

/// Executes `request` against `schema`.
///
/// Field errors end up in the response. An error is returned only when an
/// extension's request hook fails.
pub async fn graphql(
    schema: &ExecutableSchema,
    request: GraphQLRequest,
    options: GraphQLOptions,
) -> Result<Response, ExtensionError> {
    let GraphQLOptions {
        context,
        root_value,
        extensions,
        middleware,
        executor,
    } = options;
    let GraphQLRequest {
        selections,
        operation_type: operation,
        variables,
    } = request;
    let context = context.with_variables(variables);

    let manager = ExtensionManager::new(&extensions);
    let chain = manager.as_middleware_manager(middleware.as_ref());
    let executor = Executor::with_config(executor);
    let root_type = match operation {
        OperationType::Query => schema.query_type.as_deref(),
        OperationType::Mutation => schema.mutation_type.as_deref(),
    };

    debug!(%operation, extensions = manager.extensions().len(), "executing request");

    let ctx = &context;
    manager
        .request(ctx, async {
            let (data, errors) = match root_type {
                Some(root_type) => {
                    executor
                        .execute(schema, root_type, &selections, root_value, ctx, &chain)
                        .await
                }
                None => (
                    Value::Null,
                    vec![FieldError::new(format!(
                        "Schema is not configured for {operation} operations"
                    ))],
                ),
            };

            if !errors.is_empty() {
                manager.has_errors(&errors);
            }

            Ok(Response::from_execution(data, errors).with_extensions(manager.format()))
        })
        .await
}
