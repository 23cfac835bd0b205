//! Argument coercion.
//!
//! Turns the argument literals on a field node, together with the execution's
//! variable bindings, into the runtime argument map handed to resolvers.
//! Argument defaults fill absent values; absent non-null arguments error.

use crate::resolver::ResolverArgs;
use crate::schema::FieldDef;
use rxgql_core::Span;
use rxgql_syntax::ast;
use serde_json::{Map as JsonMap, Value};

/// A coercion failure, positioned for the engine to locate.
#[derive(Debug, Clone)]
pub struct ArgumentError {
    pub message: String,
    pub span: Span,
}

/// Coerces the arguments of `node` against `field_def`'s argument
/// definitions.
pub fn coerce_arguments(
    field_def: &FieldDef,
    node: &ast::FieldNode,
    variables: &JsonMap<String, Value>,
) -> Result<ResolverArgs, ArgumentError> {
    let mut args = ResolverArgs::new();

    for (name, def) in &field_def.arguments {
        let provided = node.arguments.iter().find(|arg| &arg.name.value == name);

        let coerced = match provided {
            Some(arg) => value_from_ast(&arg.value, variables),
            None => None,
        };

        match coerced {
            Some(value) => {
                if value.is_null() && def.ty.is_non_null() {
                    return Err(ArgumentError {
                        message: format!(
                            "Argument '{name}' of required type '{}' must not be null.",
                            def.ty
                        ),
                        span: provided.map_or(node.span, |arg| arg.span),
                    });
                }
                args.set(name.clone(), value);
            }
            None => {
                if let Some(default) = &def.default_value {
                    args.set(name.clone(), default.clone());
                } else if def.ty.is_non_null() {
                    return Err(ArgumentError {
                        message: format!(
                            "Argument '{name}' of required type '{}' was not provided.",
                            def.ty
                        ),
                        span: node.span,
                    });
                }
                // Nullable and unprovided: omitted from the argument map.
            }
        }
    }

    Ok(args)
}

/// Converts an AST value into a runtime value. `None` means the value is
/// unbound (an unprovided variable), which is distinct from `Null`.
pub fn value_from_ast(
    value: &ast::Value,
    variables: &JsonMap<String, Value>,
) -> Option<Value> {
    match value {
        ast::Value::Variable(name) => variables.get(&name.value).cloned(),
        ast::Value::Int(i, _) => Some(Value::from(*i)),
        ast::Value::Float(f, _) => serde_json::Number::from_f64(*f).map(Value::Number),
        ast::Value::String(s, _) => Some(Value::String(s.clone())),
        ast::Value::Boolean(b, _) => Some(Value::Bool(*b)),
        ast::Value::Null(_) => Some(Value::Null),
        ast::Value::Enum(name) => Some(Value::String(name.value.clone())),
        ast::Value::List(items, _) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                // Unbound variables inside lists collapse to null.
                out.push(value_from_ast(item, variables).unwrap_or(Value::Null));
            }
            Some(Value::Array(out))
        }
        ast::Value::Object(fields, _) => {
            let mut out = JsonMap::new();
            for (name, field_value) in fields {
                if let Some(v) = value_from_ast(field_value, variables) {
                    out.insert(name.value.clone(), v);
                }
            }
            Some(Value::Object(out))
        }
    }
}
