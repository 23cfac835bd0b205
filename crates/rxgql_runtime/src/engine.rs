//! The reactive execution engine.
//!
//! Recursive, type-directed evaluation of a selection tree: every field
//! position becomes a stream, object nodes combine their children, and a
//! resolver stream of parent values re-completes its sub-selection through a
//! switch-map that cancels the previous subtree first.

use crate::arguments::coerce_arguments;
use crate::collect::FieldsMap;
use crate::error::GraphQLError;
use crate::executor::ExecutionContext;
use crate::path::ResponsePath;
use crate::resolver::{Eventual, Resolved, ResolverInfo};
use crate::schema::{ResolveType, TypeDef, TypeRef};
use crate::streams::{self, EvalMode, RawStream, Slot, SlotStream};
use futures::{Future, StreamExt};
use rxgql_syntax::ast::FieldNode;
use serde_json::Value;
use std::sync::Arc;

/// Evaluates a fields mapping against a parent value, producing a stream of
/// response objects keyed in selection order.
pub(crate) fn execute_selection_set(
    ctx: Arc<ExecutionContext>,
    type_name: String,
    parent: Value,
    fields: Arc<FieldsMap>,
    path: ResponsePath,
    mode: EvalMode,
) -> SlotStream {
    let mut children = Vec::with_capacity(fields.len());
    for (key, nodes) in fields.iter() {
        let child = field_stream(
            ctx.clone(),
            type_name.clone(),
            parent.clone(),
            nodes.clone(),
            path.push(key.as_str()),
        );
        children.push((key.clone(), child));
    }
    streams::combine_object(children, mode)
}

/// The stream for a single field position. Lazy: the resolver runs at first
/// poll, which lets the serial barrier sequence side effects.
fn field_stream(
    ctx: Arc<ExecutionContext>,
    parent_type: String,
    parent: Value,
    nodes: Vec<Arc<FieldNode>>,
    path: ResponsePath,
) -> SlotStream {
    streams::defer(move || build_field_stream(ctx, parent_type, parent, nodes, path))
}

fn build_field_stream(
    ctx: Arc<ExecutionContext>,
    parent_type: String,
    parent: Value,
    nodes: Vec<Arc<FieldNode>>,
    path: ResponsePath,
) -> SlotStream {
    let Some(node) = nodes.first().cloned() else {
        return streams::once_absent();
    };
    let field_name = node.name.value.clone();

    // Pull everything needed out of the schema before streams take
    // ownership of the context.
    let (ty, resolver, args) = {
        let Some(field_def) = ctx.schema.field_def(&parent_type, &field_name) else {
            return streams::once_error(field_not_found(&ctx, &parent_type, &field_name, &nodes, &path));
        };
        let ty = field_def.ty.clone();
        let resolver = field_def
            .resolver
            .clone()
            .unwrap_or_else(|| ctx.default_resolver.clone());
        let args = match coerce_arguments(field_def, &node, &ctx.variable_values) {
            Ok(args) => args,
            Err(err) => {
                let error = ctx.error_at_span(err.message, err.span, &path);
                return guard_nullability(&ctx, &ty, streams::once_error(error));
            }
        };
        (ty, resolver, args)
    };

    let info = ResolverInfo {
        field_name: field_name.clone(),
        parent_type: parent_type.clone(),
        return_type: ty.clone(),
        path: path.clone(),
    };

    tracing::trace!(field = %field_name, parent = %parent_type, "resolving field");

    let resolved = match resolver.resolve(&parent, &args, &ctx.context_value, &info) {
        Ok(resolved) => resolved,
        Err(error) => {
            let located = ctx.locate(error.to_string(), &nodes, &path);
            return guard_nullability(&ctx, &ty, streams::once_error(located));
        }
    };

    // Normalize the three-way return to a raw value stream.
    let raw: RawStream = {
        let ctx = ctx.clone();
        let nodes = nodes.clone();
        let path = path.clone();
        let locate = move |error: crate::resolver::ResolverError| {
            ctx.locate(error.to_string(), &nodes, &path)
        };
        match resolved {
            Resolved::Absent => return streams::once_absent(),
            Resolved::Value(value) => futures::stream::once(async move { Ok(value) }).boxed(),
            Resolved::Deferred(future) => futures::stream::once(future)
                .map(move |result| result.map_err(&locate))
                .boxed(),
            Resolved::Stream(stream) => stream.map(move |result| result.map_err(&locate)).boxed(),
        }
    };

    // Each raw emission is a new parent value: complete it, cancelling the
    // completion of the previous one.
    let coord = format!("{parent_type}.{field_name}");
    let field_ty = ty.clone();
    let completed = {
        let ctx = ctx.clone();
        streams::switch_map(raw, move |value| {
            complete_value(
                ctx.clone(),
                ty.clone(),
                coord.clone(),
                nodes.clone(),
                path.clone(),
                value,
            )
        })
    };

    guard_nullability(&ctx, &field_ty, completed)
}

/// The error handler's absorb-or-propagate decision for a field position.
///
/// Non-null positions let errors escape to the parent; nullable positions
/// record the located error and substitute null.
fn guard_nullability(ctx: &Arc<ExecutionContext>, ty: &TypeRef, stream: SlotStream) -> SlotStream {
    if ty.is_non_null() {
        return stream;
    }
    let ctx = ctx.clone();
    streams::recover_with(stream, move |error| {
        ctx.add_error(error);
        Slot::Value(Value::Null)
    })
}

/// Type-directed completion of one raw value.
fn complete_value(
    ctx: Arc<ExecutionContext>,
    ty: TypeRef,
    coord: String,
    nodes: Vec<Arc<FieldNode>>,
    path: ResponsePath,
    value: Value,
) -> SlotStream {
    match ty {
        TypeRef::NonNull(inner) => {
            let inner_stream =
                complete_value(ctx.clone(), *inner, coord.clone(), nodes.clone(), path.clone(), value);
            inner_stream
                .map(move |item| match item {
                    Ok(Slot::Value(Value::Null)) => Err(ctx.locate(
                        format!("Cannot return null for non-nullable field {coord}."),
                        &nodes,
                        &path,
                    )),
                    other => other,
                })
                .boxed()
        }

        _ if value.is_null() => streams::once_value(Value::Null),

        TypeRef::List(inner) => {
            let Value::Array(items) = value else {
                return streams::once_error(ctx.locate(
                    format!("Expected a list for field {coord}."),
                    &nodes,
                    &path,
                ));
            };
            if items.is_empty() {
                return streams::once_value(Value::Array(Vec::new()));
            }

            let element_nullable = !inner.is_non_null();
            let children = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    let element = complete_value(
                        ctx.clone(),
                        (*inner).clone(),
                        coord.clone(),
                        nodes.clone(),
                        path.push(index),
                        item,
                    );
                    if element_nullable {
                        guard_nullability(&ctx, &inner, element)
                    } else {
                        element
                    }
                })
                .collect();
            streams::combine_list(children)
        }

        TypeRef::Named(name) => match ctx.schema.get_type(&name) {
            Some(TypeDef::Scalar(def)) => {
                let serialized = match &def.serialize {
                    Some(serializer) => serializer.call(&value),
                    None => Some(value.clone()),
                };
                complete_leaf(&ctx, &name, serialized, &value, &nodes, &path)
            }
            Some(TypeDef::Enum(def)) => {
                let serialized = value
                    .as_str()
                    .filter(|s| def.values.iter().any(|v| v.as_str() == *s))
                    .map(|s| Value::String(s.to_string()));
                complete_leaf(&ctx, &name, serialized, &value, &nodes, &path)
            }
            Some(TypeDef::Object(_)) => complete_object(ctx.clone(), name, nodes, path, value),
            Some(TypeDef::Interface(def)) => {
                let resolve_type = def.resolve_type.clone();
                complete_abstract(ctx.clone(), name, resolve_type, nodes, path, value)
            }
            Some(TypeDef::Union(def)) => {
                let resolve_type = def.resolve_type.clone();
                complete_abstract(ctx.clone(), name, resolve_type, nodes, path, value)
            }
            Some(TypeDef::InputObject(_)) => streams::once_error(ctx.locate(
                format!("Type '{name}' is not an output type."),
                &nodes,
                &path,
            )),
            None => streams::once_error(ctx.locate(
                format!("Unknown type '{name}'."),
                &nodes,
                &path,
            )),
        },
    }
}

fn complete_leaf(
    ctx: &Arc<ExecutionContext>,
    type_name: &str,
    serialized: Option<Value>,
    raw: &Value,
    nodes: &[Arc<FieldNode>],
    path: &ResponsePath,
) -> SlotStream {
    match serialized {
        Some(value) => streams::once_value(value),
        None => streams::once_error(ctx.locate(
            format!("Expected a value of type '{type_name}' but received: {raw}"),
            nodes,
            path,
        )),
    }
}

/// Completes a value as a concrete object type: optional `is_type_of`
/// check, then the memoized sub-selection.
fn complete_object(
    ctx: Arc<ExecutionContext>,
    type_name: String,
    nodes: Vec<Arc<FieldNode>>,
    path: ResponsePath,
    value: Value,
) -> SlotStream {
    let Some(TypeDef::Object(def)) = ctx.schema.get_type(&type_name) else {
        return streams::once_error(ctx.locate(
            format!("Unknown type '{type_name}'."),
            &nodes,
            &path,
        ));
    };
    let is_type_of = def.is_type_of.clone();

    let fields = match ctx.subfields.collect_subfields(&type_name, &nodes) {
        Ok(fields) => fields,
        Err(err) => return streams::once_error(ctx.error_at_span(err.message, err.span, &path)),
    };
    if fields.is_empty() {
        return streams::once_error(ctx.locate(
            format!("Field of type '{type_name}' must have a selection of subfields."),
            &nodes,
            &path,
        ));
    }

    match is_type_of {
        None => execute_selection_set(ctx, type_name, value, fields, path, EvalMode::Concurrent),
        Some(predicate) => {
            let check = predicate.call(&value);
            flatten_async(async move {
                if check.resolve().await {
                    Ok(execute_selection_set(
                        ctx.clone(),
                        type_name,
                        value,
                        fields,
                        path,
                        EvalMode::Concurrent,
                    ))
                } else {
                    Err(ctx.locate(
                        format!("Expected value of type '{type_name}' but received: {value}"),
                        &nodes,
                        &path,
                    ))
                }
            })
        }
    }
}

/// Resolves the runtime object type of an abstract value, then completes it
/// as that type.
fn complete_abstract(
    ctx: Arc<ExecutionContext>,
    abstract_name: String,
    resolve_type: Option<ResolveType>,
    nodes: Vec<Arc<FieldNode>>,
    path: ResponsePath,
    value: Value,
) -> SlotStream {
    flatten_async(async move {
        let resolved = match resolve_type {
            Some(resolver) => resolver.call(&value).resolve().await,
            None => default_resolve_type(&ctx, &abstract_name, &value).await,
        };

        let Some(concrete) = resolved else {
            return Err(ctx.locate(
                format!(
                    "Could not determine runtime type of value for abstract type '{abstract_name}'."
                ),
                &nodes,
                &path,
            ));
        };

        match ctx.schema.get_type(&concrete) {
            Some(TypeDef::Object(_)) if ctx.schema.is_possible_type(&abstract_name, &concrete) => {
                Ok(complete_object(ctx.clone(), concrete, nodes.clone(), path.clone(), value))
            }
            Some(TypeDef::Object(_)) => Err(ctx.locate(
                format!("Runtime type '{concrete}' is not a possible type for '{abstract_name}'."),
                &nodes,
                &path,
            )),
            _ => Err(ctx.locate(
                format!(
                    "Abstract type '{abstract_name}' must resolve to an object type, but resolved to '{concrete}'."
                ),
                &nodes,
                &path,
            )),
        }
    })
}

/// Default runtime-type resolution: a `__typename` marker on the value, else
/// the first possible type whose `is_type_of` matches, in declaration
/// order. Deferred predicates are awaited together.
async fn default_resolve_type(
    ctx: &Arc<ExecutionContext>,
    abstract_name: &str,
    value: &Value,
) -> Option<String> {
    if let Some(marked) = value.get("__typename").and_then(|v| v.as_str()) {
        return Some(marked.to_string());
    }

    let candidates: Vec<(String, Eventual<bool>)> = ctx
        .schema
        .possible_types(abstract_name)
        .into_iter()
        .filter_map(|def| {
            def.is_type_of
                .as_ref()
                .map(|predicate| (def.name.clone(), predicate.call(value)))
        })
        .collect();

    let answers = futures::future::join_all(
        candidates
            .into_iter()
            .map(|(name, check)| async move { (name, check.resolve().await) }),
    )
    .await;

    answers
        .into_iter()
        .find_map(|(name, matched)| matched.then_some(name))
}

/// Builds a stream from an async computation that itself yields a stream.
fn flatten_async(
    future: impl Future<Output = Result<SlotStream, GraphQLError>> + Send + 'static,
) -> SlotStream {
    futures::stream::once(future)
        .map(|result| match result {
            Ok(stream) => stream,
            Err(error) => streams::once_error(error),
        })
        .flatten()
        .boxed()
}

/// The hard error for an unresolvable field, with a hint describing the
/// parent type's category.
fn field_not_found(
    ctx: &Arc<ExecutionContext>,
    parent_type: &str,
    field_name: &str,
    nodes: &[Arc<FieldNode>],
    path: &ResponsePath,
) -> GraphQLError {
    let hint = match ctx.schema.get_type(parent_type) {
        Some(TypeDef::Scalar(_)) => {
            "The field has a scalar type, which means it supports no nesting.".to_string()
        }
        Some(TypeDef::Enum(_)) => {
            "The field has an enum type, which means it supports no nesting.".to_string()
        }
        Some(TypeDef::Object(def)) => format!(
            "The only fields found in this Object are: `{}`.",
            def.fields.keys().cloned().collect::<Vec<_>>().join(", ")
        ),
        None => "The type should not be null.".to_string(),
        Some(_) => String::new(),
    };

    let mut message = format!("field '{field_name}' was not found on type '{parent_type}'.");
    if !hint.is_empty() {
        message.push(' ');
        message.push_str(&hint);
    }
    ctx.locate(message, nodes, path)
}
