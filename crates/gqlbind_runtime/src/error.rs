//! Error types for schema binding and request extensions.

use thiserror::Error;

/// Boxed error returned by user-supplied directive handlers and extension hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for schema binding.
pub type BindResult<T = ()> = Result<T, BindError>;

/// Errors raised while binding behavior to a schema.
///
/// All of these are fatal: a schema that failed to bind must not serve requests.
#[derive(Debug, Error)]
pub enum BindError {
    /// The directive type was bound before a handler was registered.
    #[error("Directive @{directive} does not have any handler registered")]
    Configuration { directive: String },

    /// The schema has no declaration for the directive being bound.
    #[error("Directive @{directive} is not defined in the schema")]
    SchemaMismatch { directive: String },

    /// A directive handler failed. Dispatches made before it stay applied.
    #[error("Handler for directive @{directive} failed on {target}: {source}")]
    Handler {
        directive: String,
        target: String,
        #[source]
        source: BoxError,
    },

    /// A bindable refers to a type the schema does not define.
    #[error("Type {0} is not defined in the schema")]
    TypeNotFound(String),

    /// A bindable expected an object type.
    #[error("Type {0} is not an object type")]
    NotAnObjectType(String),

    /// A bindable refers to a field the type does not define.
    #[error("Field {type_name}.{field_name} is not defined in the schema")]
    FieldNotFound {
        type_name: String,
        field_name: String,
    },
}

/// Errors raised by request lifecycle hooks.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension {extension} failed to start the request: {source}")]
    RequestStarted {
        extension: String,
        #[source]
        source: BoxError,
    },

    #[error("Extension {extension} failed to finish the request: {source}")]
    RequestFinished {
        extension: String,
        #[source]
        source: BoxError,
    },
}

impl ExtensionError {
    /// Returns the name of the extension whose hook failed.
    pub fn extension(&self) -> &str {
        match self {
            Self::RequestStarted { extension, .. } | Self::RequestFinished { extension, .. } => {
                extension
            }
        }
    }
}
