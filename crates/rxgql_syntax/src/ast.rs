//! Abstract syntax tree for executable GraphQL documents.
//!
//! Only the executable half of the language is modeled: operations,
//! selections, arguments, variables, and values. Fragment spreads, inline
//! fragments, and fragment definitions are parsed into the tree so that the
//! runtime can reject them with a located error rather than a parse failure.

use rxgql_core::Span;

/// A complete document.
#[derive(Debug, Clone)]
pub struct Document {
    pub definitions: Vec<Definition>,
    pub span: Span,
}

impl Document {
    /// Iterates the operation definitions in the document.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
    }

    /// Iterates the fragment definitions in the document.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Fragment(frag) => Some(frag),
            Definition::Operation(_) => None,
        })
    }
}

/// A top-level definition.
#[derive(Debug, Clone)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// An operation definition, named or shorthand.
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// A variable definition: `$name: Type = default`.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: Type,
    pub default_value: Option<Value>,
    pub span: Span,
}

/// A type reference in variable-definition position.
#[derive(Debug, Clone)]
pub enum Type {
    Named(Name),
    NonNull(Box<Type>, Span),
    List(Box<Type>, Span),
}

impl Type {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Named(name) => name.span,
            Self::NonNull(_, span) | Self::List(_, span) => *span,
        }
    }
}

/// A selection set.
#[derive(Debug, Clone)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
    pub span: Span,
}

/// A single selection.
#[derive(Debug, Clone)]
pub enum Selection {
    Field(FieldNode),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

/// A field selection: `alias: name(args) { sub }`.
#[derive(Debug, Clone)]
pub struct FieldNode {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub selection_set: Option<SelectionSet>,
    pub span: Span,
}

impl FieldNode {
    /// The key this field occupies in the response object.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias
            .as_ref()
            .map_or(self.name.value.as_str(), |alias| alias.value.as_str())
    }
}

/// A field or directive argument.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Name,
    pub value: Value,
    pub span: Span,
}

/// A fragment spread: `...name`.
#[derive(Debug, Clone)]
pub struct FragmentSpread {
    pub name: Name,
    pub span: Span,
}

/// An inline fragment: `... on Type { sub }`.
#[derive(Debug, Clone)]
pub struct InlineFragment {
    pub type_condition: Option<Name>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// A fragment definition: `fragment name on Type { sub }`.
#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub name: Name,
    pub type_condition: Name,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// An input value literal.
#[derive(Debug, Clone)]
pub enum Value {
    Variable(Name),
    Int(i64, Span),
    Float(f64, Span),
    String(String, Span),
    Boolean(bool, Span),
    Null(Span),
    Enum(Name),
    List(Vec<Value>, Span),
    Object(Vec<(Name, Value)>, Span),
}

impl Value {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Variable(name) | Self::Enum(name) => name.span,
            Self::Int(_, span)
            | Self::Float(_, span)
            | Self::String(_, span)
            | Self::Boolean(_, span)
            | Self::Null(span)
            | Self::List(_, span)
            | Self::Object(_, span) => *span,
        }
    }
}

/// A name with its source span.
#[derive(Debug, Clone)]
pub struct Name {
    pub value: String,
    pub span: Span,
}

impl Name {
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }
}
