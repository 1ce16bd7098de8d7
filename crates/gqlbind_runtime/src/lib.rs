//! Schema binding runtime for gqlbind.
//!
//! This crate attaches behavior to an already-built schema and runs
//! requests against it:
//! - `schema`: Schema definition and building
//! - `resolver`: Field resolvers
//! - `directives`: Binding handlers to schema directives
//! - `bindable`: Bindables and executable schema construction
//! - `middleware`: Field middleware chains
//! - `extensions`: Request lifecycle extensions
//! - `executor`: Selection execution
//! - `graphql`: Request entry point

pub mod bindable;
pub mod directives;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod graphql;
pub mod middleware;
pub mod resolver;
pub mod schema;

pub use bindable::{make_executable_schema, ExecutableSchema, ObjectType, SchemaBindable};
pub use directives::{DirectiveArguments, DirectiveHandler, DirectiveTarget, DirectiveType};
pub use error::{BindError, BindResult, BoxError, ExtensionError};
pub use executor::{
    Context, Executor, ExecutorConfig, FieldError, PathSegment, Response, Selection,
};
pub use extensions::{
    BaseExtension, Extension, ExtensionData, ExtensionFactory, ExtensionManager, RequestScope,
};
pub use graphql::{graphql, GraphQLOptions, GraphQLRequest, OperationType};
pub use middleware::{Middleware, MiddlewareManager, Next};
pub use resolver::{
    DefaultResolver, FieldResolver, Resolver, ResolverArgs, ResolverError, ResolverFuture,
    ResolverInfo, ResolverResult,
};
pub use schema::{
    ArgumentDef, DirectiveDefinition, DirectiveLocation, EnumDef, FieldDef, InputObjectDef,
    InterfaceDef, ObjectDef, ScalarDef, Schema, SchemaBuilder, TypeDef, TypeRef, UnionDef,
};
