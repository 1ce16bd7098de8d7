//! Schema model.
//!
//! A [`Schema`] is the already-built type graph that bindables attach
//! behavior to. Object types and fields keep the syntax node they were
//! declared with so directive usages can be found after the fact.

use crate::resolver::{DefaultResolver, FieldResolver};
use gqlbind_syntax::{Directive, FieldDefinitionNode, TypeDefinitionNode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A GraphQL schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub description: Option<String>,
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    /// Named types in declaration order.
    pub types: IndexMap<String, TypeDef>,
    /// Declared directives by name.
    pub directives: IndexMap<String, DirectiveDefinition>,
}

impl Schema {
    /// Creates an empty schema without built-in scalars.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named type of any kind.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Returns the named type if it is an object type.
    pub fn object_type(&self, name: &str) -> Option<&ObjectDef> {
        self.types.get(name).and_then(TypeDef::as_object)
    }

    /// Returns the named object type for mutation.
    pub fn object_type_mut(&mut self, name: &str) -> Option<&mut ObjectDef> {
        self.types.get_mut(name).and_then(TypeDef::as_object_mut)
    }

    /// Object types in declaration order. Other kinds are skipped.
    pub fn object_types_mut(&mut self) -> impl Iterator<Item = &mut ObjectDef> {
        self.types.values_mut().filter_map(TypeDef::as_object_mut)
    }

    /// Returns the directive declaration named `name`.
    pub fn get_directive(&self, name: &str) -> Option<&DirectiveDefinition> {
        self.directives.get(name)
    }

    /// Returns all named types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDef)> {
        self.types.iter()
    }
}

/// A named type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    /// Returns the type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => &def.name,
            Self::Object(def) => &def.name,
            Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    /// Returns the object definition, or `None` for other kinds.
    pub fn as_object(&self) -> Option<&ObjectDef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the object definition for mutation.
    pub fn as_object_mut(&mut self) -> Option<&mut ObjectDef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Scalars and enums have no selectable fields.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<String>,
}

/// An object type. The only kind whose usages directives are bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    /// Syntax node the type was declared with.
    pub ast_node: Option<TypeDefinitionNode>,
}

impl ObjectDef {
    /// Creates an object type without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
            ast_node: None,
        }
    }

    /// Adds a field, replacing one with the same name in place.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Records an implemented interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Attaches a directive usage to the type's syntax node.
    pub fn with_directive(mut self, directive: Directive) -> Self {
        let node = self.ast_node.take().unwrap_or_else(|| TypeDefinitionNode::new(&self.name));
        self.ast_node = Some(node.with_directive(directive));
        self
    }

    /// Returns the named field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Returns the named field for mutation.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        self.fields.get_mut(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub fields: IndexMap<String, FieldDef>,
}

impl InterfaceDef {
    /// Creates an interface without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// A union of object types. Directive usages on it are kept but never bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub members: Vec<String>,
    pub ast_node: Option<TypeDefinitionNode>,
}

impl UnionDef {
    /// Creates a union over `members`.
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members,
            ast_node: None,
        }
    }

    /// Attaches the syntax node the union was declared with.
    pub fn with_ast_node(mut self, node: TypeDefinitionNode) -> Self {
        self.ast_node = Some(node);
        self
    }
}

/// An input object type. Directive usages on it are kept but never bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputObjectDef {
    pub name: String,
    pub fields: IndexMap<String, ArgumentDef>,
    pub ast_node: Option<TypeDefinitionNode>,
}

impl InputObjectDef {
    /// Creates an input object without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            ast_node: None,
        }
    }

    /// Adds an input field.
    pub fn with_field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        let field = ArgumentDef::new(name, ty);
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Attaches the syntax node the input object was declared with.
    pub fn with_ast_node(mut self, node: TypeDefinitionNode) -> Self {
        self.ast_node = Some(node);
        self
    }
}

/// A field of an object or interface type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, ArgumentDef>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
    /// Syntax node the field was declared with.
    pub ast_node: Option<FieldDefinitionNode>,
    /// Bound resolver. `None` falls back to [`DefaultResolver`].
    #[serde(skip)]
    pub resolver: Option<FieldResolver>,
}

impl FieldDef {
    /// Creates a field without arguments or resolver.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            deprecated: false,
            deprecation_reason: None,
            ast_node: None,
            resolver: None,
        }
    }

    /// Marks the field deprecated, with an optional reason.
    pub fn deprecate(mut self, reason: Option<&str>) -> Self {
        self.deprecated = true;
        self.deprecation_reason = reason.map(str::to_string);
        self
    }

    /// Declares an argument.
    pub fn with_argument(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        let argument = ArgumentDef::new(name, ty);
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Attaches a directive usage to the field's syntax node.
    pub fn with_directive(mut self, directive: Directive) -> Self {
        let node = self.ast_node.take().unwrap_or_else(|| FieldDefinitionNode::new(&self.name));
        self.ast_node = Some(node.with_directive(directive));
        self
    }

    /// Replaces the bound resolver.
    pub fn set_resolver(&mut self, resolver: FieldResolver) {
        self.resolver = Some(resolver);
    }

    /// Composes a new resolver around the current one.
    ///
    /// `wrap` receives the bound resolver, or the default property resolver
    /// when nothing is bound yet.
    pub fn wrap_resolver<F>(&mut self, wrap: F)
    where
        F: FnOnce(FieldResolver) -> FieldResolver,
    {
        let current = self
            .resolver
            .take()
            .unwrap_or_else(|| FieldResolver::new(DefaultResolver));
        self.resolver = Some(wrap(current));
    }
}

/// An argument of a field or directive declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
}

impl ArgumentDef {
    /// Creates an argument without a default value.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default_value: None,
        }
    }
}

/// A possibly wrapped type reference. `Named` alone is non-null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    Option(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    /// Returns a non-null reference to a named type.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Wraps `inner` as nullable.
    pub fn option(inner: TypeRef) -> Self {
        Self::Option(Box::new(inner))
    }

    /// Wraps `inner` as a list.
    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Returns the innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Option(inner) | Self::List(inner) => inner.named_type(),
        }
    }
}

/// A directive declared by the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveDefinition {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, ArgumentDef>,
    pub locations: Vec<DirectiveLocation>,
    pub repeatable: bool,
}

impl DirectiveDefinition {
    /// Creates a directive allowed on `locations`.
    pub fn new(name: impl Into<String>, locations: Vec<DirectiveLocation>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: IndexMap::new(),
            locations,
            repeatable: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares an argument.
    pub fn with_argument(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        let argument = ArgumentDef::new(name, ty);
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Allows repeated usage on one element.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Returns true if the directive may be used at `location`.
    pub fn is_valid_on(&self, location: DirectiveLocation) -> bool {
        self.locations.contains(&location)
    }
}

/// Type system locations a schema directive can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectiveLocation {
    Schema,
    Scalar,
    Object,
    FieldDefinition,
    ArgumentDefinition,
    Interface,
    Union,
    Enum,
    EnumValue,
    InputObject,
    InputFieldDefinition,
}

/// Schema builder.
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Starts a schema that already declares the built-in scalars.
    pub fn new() -> Self {
        let mut schema = Schema::new();
        for name in BUILTIN_SCALARS {
            schema.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: None,
                }),
            );
        }
        Self { schema }
    }

    /// Sets the schema description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.schema.description = Some(desc.into());
        self
    }

    /// Names the query root type.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.schema.query_type = Some(name.into());
        self
    }

    /// Names the mutation root type.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.schema.mutation_type = Some(name.into());
        self
    }

    /// Adds a type, replacing an earlier one with the same name in place.
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    /// Adds an object type.
    pub fn add_object(self, object: ObjectDef) -> Self {
        self.add_type(TypeDef::Object(object))
    }

    /// Declares a directive.
    pub fn add_directive(mut self, directive: DirectiveDefinition) -> Self {
        self.schema
            .directives
            .insert(directive.name.clone(), directive);
        self
    }

    /// Returns the built schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlbind_syntax::Value;

    #[test]
    fn test_schema_builder() {
        let schema = SchemaBuilder::new()
            .description("Blog API")
            .query_type("Query")
            .add_object(
                ObjectDef::new("Query")
                    .with_field(FieldDef::new("hello", TypeRef::named("String"))),
            )
            .add_type(TypeDef::Enum(EnumDef {
                name: "Role".to_string(),
                values: vec!["ADMIN".to_string(), "READER".to_string()],
            }))
            .add_directive(DirectiveDefinition::new(
                "upper",
                vec![DirectiveLocation::FieldDefinition],
            ))
            .build();

        assert_eq!(schema.query_type.as_deref(), Some("Query"));
        assert!(schema.get_type("String").is_some_and(TypeDef::is_leaf));
        assert!(schema.get_type("Role").is_some_and(TypeDef::is_leaf));
        assert!(schema.object_type("Query").is_some());
        assert!(schema.object_type("String").is_none());
        assert!(schema
            .get_directive("upper")
            .is_some_and(|d| d.is_valid_on(DirectiveLocation::FieldDefinition)));
        assert!(schema.get_directive("lower").is_none());
    }

    #[test]
    fn test_object_types_in_declaration_order() {
        let mut schema = SchemaBuilder::new()
            .add_object(ObjectDef::new("B"))
            .add_type(TypeDef::Interface(InterfaceDef::new("Node")))
            .add_object(ObjectDef::new("A"))
            .build();

        let names: Vec<_> = schema.types().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Int", "Float", "String", "Boolean", "ID", "B", "Node", "A"]);

        let objects: Vec<_> = schema.object_types_mut().map(|o| o.name.clone()).collect();
        assert_eq!(objects, vec!["B", "A"]);
    }

    #[test]
    fn test_with_directive_creates_ast_node() {
        let field = FieldDef::new("name", TypeRef::named("String"))
            .with_directive(Directive::new("upper"))
            .with_directive(
                Directive::new("format").with_argument("pattern", Value::string("x")),
            );

        let node = field.ast_node.unwrap();
        assert_eq!(node.name, "name");
        assert_eq!(node.directives.len(), 2);
        assert_eq!(node.directives[1].name, "format");
    }

    #[test]
    fn test_union_and_input_object_kinds() {
        let schema = SchemaBuilder::new()
            .add_type(TypeDef::Union(UnionDef::new(
                "SearchResult",
                vec!["User".to_string(), "Post".to_string()],
            )))
            .add_type(TypeDef::InputObject(
                InputObjectDef::new("PostInput").with_field("title", TypeRef::named("String")),
            ))
            .build();

        let union = schema.get_type("SearchResult").unwrap();
        assert_eq!(union.name(), "SearchResult");
        assert!(union.as_object().is_none());
        assert!(!union.is_leaf());
        let Some(TypeDef::InputObject(input)) = schema.get_type("PostInput") else {
            panic!("expected an input object");
        };
        assert!(input.fields.contains_key("title"));
    }

    #[test]
    fn test_deprecated_field_and_directive_description() {
        let field = FieldDef::new("oldName", TypeRef::named("String"))
            .deprecate(Some("Use `name`."));
        assert!(field.deprecated);
        assert_eq!(field.deprecation_reason.as_deref(), Some("Use `name`."));
        assert!(!FieldDef::new("name", TypeRef::named("String")).deprecated);

        let directive = DirectiveDefinition::new("upper", vec![DirectiveLocation::FieldDefinition])
            .with_description("Uppercases string results.");
        assert_eq!(directive.description.as_deref(), Some("Uppercases string results."));
    }

    #[test]
    fn test_named_type() {
        let ty = TypeRef::option(TypeRef::list(TypeRef::named("User")));
        assert_eq!(ty.named_type(), "User");
    }

    #[test]
    fn test_wrap_resolver_composes_around_bound_resolver() {
        let mut field = FieldDef::new("name", TypeRef::named("String"));
        let mut seen = None;
        field.wrap_resolver(|inner| {
            seen = Some(inner.clone());
            inner
        });
        let first = field.resolver.clone().unwrap();
        assert!(seen.is_some_and(|inner| inner.ptr_eq(&first)));

        field.wrap_resolver(|inner| {
            assert!(inner.ptr_eq(&first));
            FieldResolver::default()
        });
        assert!(!field.resolver.unwrap().ptr_eq(&first));
    }
}
