//! Custom schema directives.
//!
//! A [`DirectiveType`] finds every usage of one directive on the schema's
//! object types and fields and hands each usage to a registered handler.
//! Handlers change runtime behavior by mutating their target, typically by
//! wrapping the field resolver:
//!
//! ```
//! use gqlbind_runtime::directives::{DirectiveTarget, DirectiveType};
//! use gqlbind_runtime::resolver::{FieldResolver, Resolver, ResolverError};
//!
//! let mut upper = DirectiveType::new("upper");
//! upper.set_handler(|target, _args| {
//!     if let DirectiveTarget::Field { field, .. } = target {
//!         field.wrap_resolver(|inner| {
//!             FieldResolver::from_async(move |parent, args, ctx, info| {
//!                 let inner = inner.clone();
//!                 async move {
//!                     let value = inner.resolve(&parent, &args, &ctx, &info).await?;
//!                     Ok::<_, ResolverError>(match value.as_str() {
//!                         Some(s) => serde_json::Value::String(s.to_uppercase()),
//!                         None => value,
//!                     })
//!                 }
//!             })
//!         });
//!     }
//!     Ok(())
//! });
//! assert!(upper.has_handler());
//! ```

use crate::error::{BindError, BindResult, BoxError};
use crate::schema::{FieldDef, ObjectDef, Schema};
use gqlbind_syntax::Directive;
use indexmap::IndexMap;
use std::fmt;
use tracing::{debug, trace};

/// Literal string arguments of one directive usage, in declaration order.
pub type DirectiveArguments = IndexMap<String, String>;

/// Handler invoked once per directive usage.
pub type DirectiveHandler =
    Box<dyn Fn(DirectiveTarget<'_>, &DirectiveArguments) -> Result<(), BoxError> + Send + Sync>;

/// The schema element a directive usage is attached to.
pub enum DirectiveTarget<'a> {
    Object(&'a mut ObjectDef),
    Field {
        parent_type: &'a str,
        field: &'a mut FieldDef,
    },
}

impl DirectiveTarget<'_> {
    /// Returns `Type` for objects and `Type.field` for fields.
    pub fn name(&self) -> String {
        match self {
            Self::Object(object) => object.name.clone(),
            Self::Field { parent_type, field } => format!("{parent_type}.{}", field.name),
        }
    }

    /// Returns the object type when the usage sits on one.
    pub fn as_object_mut(&mut self) -> Option<&mut ObjectDef> {
        match self {
            Self::Object(object) => Some(object),
            Self::Field { .. } => None,
        }
    }

    /// Returns the field when the usage sits on one.
    pub fn as_field_mut(&mut self) -> Option<&mut FieldDef> {
        match self {
            Self::Field { field, .. } => Some(field),
            Self::Object(_) => None,
        }
    }
}

impl fmt::Debug for DirectiveTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) => f.debug_tuple("Object").field(&self.name()).finish(),
            Self::Field { .. } => f.debug_tuple("Field").field(&self.name()).finish(),
        }
    }
}

/// A custom directive and the handler that implements it.
pub struct DirectiveType {
    name: String,
    handler: Option<DirectiveHandler>,
}

impl DirectiveType {
    /// Creates a directive type for `name`, without a handler.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
        }
    }

    /// Returns the directive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the handler, replacing any previous one.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: Fn(DirectiveTarget<'_>, &DirectiveArguments) -> Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Registers the handler and returns self.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(DirectiveTarget<'_>, &DirectiveArguments) -> Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.set_handler(handler);
        self
    }

    /// Returns true once a handler is set.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Dispatches every usage of this directive on object types and their fields.
    ///
    /// Types are visited in type-map order and fields in declaration order.
    /// Only object types are scanned. The first handler error aborts the pass;
    /// targets handled before it keep their changes.
    pub fn bind_to_schema(&self, schema: &mut Schema) -> BindResult {
        let Some(handler) = &self.handler else {
            return Err(BindError::Configuration {
                directive: self.name.clone(),
            });
        };

        if schema.get_directive(&self.name).is_none() {
            return Err(BindError::SchemaMismatch {
                directive: self.name.clone(),
            });
        }

        for object in schema.object_types_mut() {
            let usages = object
                .ast_node
                .as_ref()
                .map(|node| self.matching_usages(&node.directives))
                .unwrap_or_default();
            for arguments in usages {
                self.dispatch(handler, DirectiveTarget::Object(&mut *object), &arguments)?;
            }

            let parent_type = object.name.clone();
            for field in object.fields.values_mut() {
                let Some(usages) = field
                    .ast_node
                    .as_ref()
                    .map(|node| self.matching_usages(&node.directives))
                else {
                    continue;
                };
                for arguments in usages {
                    let target = DirectiveTarget::Field {
                        parent_type: &parent_type,
                        field: &mut *field,
                    };
                    self.dispatch(handler, target, &arguments)?;
                }
            }
        }

        Ok(())
    }

    /// Extracts the arguments of every usage named like this directive.
    fn matching_usages(&self, directives: &[Directive]) -> Vec<DirectiveArguments> {
        directives
            .iter()
            .filter(|directive| directive.name == self.name)
            .map(string_arguments)
            .collect()
    }

    fn dispatch(
        &self,
        handler: &DirectiveHandler,
        target: DirectiveTarget<'_>,
        arguments: &DirectiveArguments,
    ) -> BindResult {
        let target_name = target.name();
        debug!(
            directive = %self.name,
            target = %target_name,
            ?arguments,
            "dispatching directive handler"
        );

        handler(target, arguments).map_err(|source| BindError::Handler {
            directive: self.name.clone(),
            target: target_name,
            source,
        })
    }
}

impl fmt::Debug for DirectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveType")
            .field("name", &self.name)
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Keeps string literal arguments; every other literal kind is dropped.
fn string_arguments(directive: &Directive) -> DirectiveArguments {
    directive
        .arguments
        .iter()
        .filter_map(|arg| match arg.value.as_str() {
            Some(value) => Some((arg.name.clone(), value.to_string())),
            None => {
                trace!(
                    directive = %directive.name,
                    argument = %arg.name,
                    kind = ?arg.value.kind(),
                    "skipping non-string directive argument"
                );
                None
            }
        })
        .collect()
}
