//! Binding behavior to a schema.
//!
//! A [`SchemaBindable`] mutates a schema during the binding phase.
//! [`make_executable_schema`] runs a list of them and freezes the result.

use crate::directives::DirectiveType;
use crate::error::{BindError, BindResult};
use crate::executor::Context;
use crate::resolver::{FieldResolver, ResolverArgs, ResolverInfo, ResolverResult};
use crate::schema::{Schema, TypeDef};
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// Something that attaches behavior to a schema.
pub trait SchemaBindable: Send + Sync {
    fn bind_to_schema(&self, schema: &mut Schema) -> BindResult;
}

impl SchemaBindable for DirectiveType {
    fn bind_to_schema(&self, schema: &mut Schema) -> BindResult {
        DirectiveType::bind_to_schema(self, schema)
    }
}

/// Registers resolvers for fields of one object type.
#[derive(Debug, Clone)]
pub struct ObjectType {
    name: String,
    resolvers: IndexMap<String, FieldResolver>,
}

impl ObjectType {
    /// Creates a bindable for the object type `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolvers: IndexMap::new(),
        }
    }

    /// Returns the object type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the resolver for `field`, replacing any earlier registration.
    pub fn field(mut self, field: impl Into<String>, resolver: FieldResolver) -> Self {
        self.resolvers.insert(field.into(), resolver);
        self
    }

    /// Sets a sync resolver function for `field`.
    pub fn field_fn<F>(self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.field(field, FieldResolver::from_fn(f))
    }

    /// Sets an async resolver function for `field`.
    pub fn field_async<F, Fut>(self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.field(field, FieldResolver::from_async(f))
    }
}

impl SchemaBindable for ObjectType {
    /// Fails without touching the schema if the type or any field is missing.
    fn bind_to_schema(&self, schema: &mut Schema) -> BindResult {
        let object = match schema.types.get_mut(&self.name) {
            Some(TypeDef::Object(object)) => object,
            Some(_) => return Err(BindError::NotAnObjectType(self.name.clone())),
            None => return Err(BindError::TypeNotFound(self.name.clone())),
        };

        if let Some(missing) = self
            .resolvers
            .keys()
            .find(|field| !object.fields.contains_key(*field))
        {
            return Err(BindError::FieldNotFound {
                type_name: self.name.clone(),
                field_name: missing.clone(),
            });
        }

        for (field_name, resolver) in &self.resolvers {
            if let Some(field) = object.field_mut(field_name) {
                debug!(object = %self.name, field = %field_name, "binding resolver");
                field.set_resolver(resolver.clone());
            }
        }
        Ok(())
    }
}

/// A bound, read-only schema shared across requests.
#[derive(Debug, Clone)]
pub struct ExecutableSchema(Arc<Schema>);

impl ExecutableSchema {
    /// Returns the bound schema.
    pub fn schema(&self) -> &Schema {
        &self.0
    }
}

impl Deref for ExecutableSchema {
    type Target = Schema;

    fn deref(&self) -> &Schema {
        &self.0
    }
}

impl AsRef<Schema> for ExecutableSchema {
    fn as_ref(&self) -> &Schema {
        &self.0
    }
}

/// Runs every bindable against `schema` in order and freezes the result.
///
/// The first failing bindable aborts construction and the partly bound
/// schema is dropped.
pub fn make_executable_schema(
    mut schema: Schema,
    bindables: &[&dyn SchemaBindable],
) -> Result<ExecutableSchema, BindError> {
    for bindable in bindables {
        bindable.bind_to_schema(&mut schema)?;
    }
    debug!(
        bindables = bindables.len(),
        types = schema.types.len(),
        "schema bound"
    );
    Ok(ExecutableSchema(Arc::new(schema)))
}
