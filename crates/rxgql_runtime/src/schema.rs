//! Schema definition.
//!
//! Schemas are built programmatically: named types in declaration order,
//! object fields with declared output types and optional resolvers, scalar
//! serializers, and runtime-type capabilities for abstract types.

use crate::resolver::{Eventual, Resolver};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A reference to an output or input type, with wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    #[must_use]
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Strips a single non-null wrapper, if present.
    #[must_use]
    pub fn nullable(&self) -> &TypeRef {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }

    /// The innermost named type.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A scalar serializer: runtime value to wire value. `None` marks the value
/// as invalid for this scalar.
#[derive(Clone)]
pub struct Serializer(Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>);

impl Serializer {
    pub fn new(f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Option<Value> {
        (self.0)(value)
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Serializer(..)")
    }
}

/// An object type's runtime predicate: does this value belong to this type?
/// May answer asynchronously.
#[derive(Clone)]
pub struct IsTypeOf(Arc<dyn Fn(&Value) -> Eventual<bool> + Send + Sync>);

impl IsTypeOf {
    pub fn new(f: impl Fn(&Value) -> Eventual<bool> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Eventual<bool> {
        (self.0)(value)
    }
}

impl fmt::Debug for IsTypeOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IsTypeOf(..)")
    }
}

/// An abstract type's runtime-type resolver: names the concrete object type
/// for a value. May answer asynchronously.
#[derive(Clone)]
pub struct ResolveType(Arc<dyn Fn(&Value) -> Eventual<Option<String>> + Send + Sync>);

impl ResolveType {
    pub fn new(f: impl Fn(&Value) -> Eventual<Option<String>> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Eventual<Option<String>> {
        (self.0)(value)
    }
}

impl fmt::Debug for ResolveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResolveType(..)")
    }
}

/// A type definition.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    #[must_use]
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

    /// Scalar or enum.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Interface or union.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }
}

/// Scalar type definition.
#[derive(Debug, Clone)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    pub serialize: Option<Serializer>,
}

impl ScalarDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            serialize: None,
        }
    }

    #[must_use]
    pub fn serializer(mut self, f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.serialize = Some(Serializer::new(f));
        self
    }
}

/// Object type definition.
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    pub is_type_of: Option<IsTypeOf>,
}

impl ObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
            is_type_of: None,
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    #[must_use]
    pub fn is_type_of(mut self, f: impl Fn(&Value) -> Eventual<bool> + Send + Sync + 'static) -> Self {
        self.is_type_of = Some(IsTypeOf::new(f));
        self
    }
}

/// Interface type definition.
#[derive(Debug, Clone)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub resolve_type: Option<ResolveType>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            resolve_type: None,
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    #[must_use]
    pub fn resolve_type(
        mut self,
        f: impl Fn(&Value) -> Eventual<Option<String>> + Send + Sync + 'static,
    ) -> Self {
        self.resolve_type = Some(ResolveType::new(f));
        self
    }
}

/// Union type definition.
#[derive(Debug, Clone)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
    pub resolve_type: Option<ResolveType>,
}

impl UnionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            members: Vec::new(),
            resolve_type: None,
        }
    }

    #[must_use]
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.members.push(name.into());
        self
    }

    #[must_use]
    pub fn resolve_type(
        mut self,
        f: impl Fn(&Value) -> Eventual<Option<String>> + Send + Sync + 'static,
    ) -> Self {
        self.resolve_type = Some(ResolveType::new(f));
        self
    }
}

/// Enum type definition.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }
}

/// Input object type definition.
#[derive(Debug, Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDef>,
}

impl InputObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: InputValueDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// Field definition.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDef>,
    pub resolver: Option<Arc<dyn Resolver>>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            resolver: None,
        }
    }

    #[must_use]
    pub fn argument(mut self, argument: InputValueDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("arguments", &self.arguments)
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Input value definition (field arguments, input object fields).
#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl InputValueDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// A GraphQL schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    query_type: Option<String>,
    mutation_type: Option<String>,
    types: IndexMap<String, TypeDef>,
}

impl Schema {
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// The object type serving read operations.
    pub fn query_root(&self) -> Option<&ObjectDef> {
        self.object_def(self.query_type.as_deref()?)
    }

    /// The object type serving write operations.
    pub fn mutation_root(&self) -> Option<&ObjectDef> {
        self.object_def(self.mutation_type.as_deref()?)
    }

    pub fn object_def(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name)? {
            TypeDef::Object(def) => Some(def),
            _ => None,
        }
    }

    /// Field definitions of an object or interface type.
    pub fn fields_of(&self, type_name: &str) -> Option<&IndexMap<String, FieldDef>> {
        match self.types.get(type_name)? {
            TypeDef::Object(def) => Some(&def.fields),
            TypeDef::Interface(def) => Some(&def.fields),
            _ => None,
        }
    }

    pub fn field_def(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.fields_of(type_name)?.get(field_name)
    }

    /// Concrete object types of an abstract type, in declaration order.
    pub fn possible_types(&self, abstract_name: &str) -> Vec<&ObjectDef> {
        match self.types.get(abstract_name) {
            Some(TypeDef::Union(def)) => def
                .members
                .iter()
                .filter_map(|member| self.object_def(member))
                .collect(),
            Some(TypeDef::Interface(_)) => self
                .types
                .values()
                .filter_map(|ty| match ty {
                    TypeDef::Object(def)
                        if def.implements.iter().any(|i| i == abstract_name) =>
                    {
                        Some(def)
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_possible_type(&self, abstract_name: &str, object_name: &str) -> bool {
        self.possible_types(abstract_name)
            .iter()
            .any(|def| def.name == object_name)
    }
}

/// Fluent schema builder. Registers the built-in scalars up front.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self::default();
        for scalar in built_in_scalars() {
            builder
                .schema
                .types
                .insert(scalar.name.clone(), TypeDef::Scalar(scalar));
        }
        builder
    }

    #[must_use]
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.schema.query_type = Some(name.into());
        self
    }

    #[must_use]
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.schema.mutation_type = Some(name.into());
        self
    }

    #[must_use]
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    #[must_use]
    pub fn object(self, def: ObjectDef) -> Self {
        self.add_type(TypeDef::Object(def))
    }

    #[must_use]
    pub fn interface(self, def: InterfaceDef) -> Self {
        self.add_type(TypeDef::Interface(def))
    }

    #[must_use]
    pub fn union(self, def: UnionDef) -> Self {
        self.add_type(TypeDef::Union(def))
    }

    #[must_use]
    pub fn scalar(self, def: ScalarDef) -> Self {
        self.add_type(TypeDef::Scalar(def))
    }

    #[must_use]
    pub fn enumeration(self, def: EnumDef) -> Self {
        self.add_type(TypeDef::Enum(def))
    }

    #[must_use]
    pub fn input_object(self, def: InputObjectDef) -> Self {
        self.add_type(TypeDef::InputObject(def))
    }

    #[must_use]
    pub fn build(self) -> Schema {
        self.schema
    }
}

fn built_in_scalars() -> Vec<ScalarDef> {
    vec![
        ScalarDef::new("Int").serializer(|value| match value {
            Value::Number(n) => n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(|i| Value::from(i64::from(i))),
            _ => None,
        }),
        ScalarDef::new("Float").serializer(|value| match value {
            Value::Number(n) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            _ => None,
        }),
        ScalarDef::new("String").serializer(|value| match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        }),
        ScalarDef::new("Boolean").serializer(|value| match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
            _ => None,
        }),
        ScalarDef::new("ID").serializer(|value| match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        }),
    ]
}
