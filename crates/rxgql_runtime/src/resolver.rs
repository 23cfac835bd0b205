//! Resolver system.
//!
//! A resolver produces a field's value given the parent value, coerced
//! arguments, the caller's context value, and resolution info. The return is
//! a tagged [`Resolved`] variant: a plain value, a deferred value, a stream
//! of values over time, or the explicit absence of the field.

use crate::path::ResponsePath;
use crate::schema::TypeRef;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Future, FutureExt, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Arguments passed to a resolver, coerced from the query AST and variable
/// bindings.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: HashMap<String, Value>,
}

impl ResolverArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument deserialized into a concrete type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, erroring if absent or malformed.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    ResolverError::ArgumentParse(name.to_string(), e.to_string())
                })
            })
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Info about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    /// The field name as declared in the schema.
    pub field_name: String,
    /// The name of the parent object type.
    pub parent_type: String,
    /// The field's declared output type.
    pub return_type: TypeRef,
    /// Path from the response root to this field.
    pub path: ResponsePath,
}

/// An error produced by a resolver.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// A plain message.
    #[error("{0}")]
    Message(String),

    /// A non-error payload surfaced as an error.
    #[error("Unexpected error value: {0}")]
    Value(Value),

    /// Missing required argument.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Argument could not be deserialized.
    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParse(String, String),
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

/// Result of a resolver invocation.
pub type ResolverResult = Result<Value, ResolverError>;

/// A value that is either already available or still being produced.
///
/// Schema capabilities (`is_type_of`, `resolve_type`) return this so that a
/// predicate may consult asynchronous state without forcing every schema to
/// be async.
pub enum Eventual<T> {
    Ready(T),
    Deferred(BoxFuture<'static, T>),
}

impl<T> Eventual<T> {
    pub fn ready(value: T) -> Self {
        Self::Ready(value)
    }

    pub fn deferred(future: impl Future<Output = T> + Send + 'static) -> Self {
        Self::Deferred(future.boxed())
    }

    /// Waits the deferred case out.
    pub async fn resolve(self) -> T {
        match self {
            Self::Ready(value) => value,
            Self::Deferred(future) => future.await,
        }
    }
}

impl<T: Debug> Debug for Eventual<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The normalized return of a resolver.
pub enum Resolved {
    /// The field is absent; its key is omitted from the response object.
    Absent,
    /// A plain value, available now.
    Value(Value),
    /// A one-shot deferred value.
    Deferred(BoxFuture<'static, ResolverResult>),
    /// A stream of values over time; each emission replaces the previous
    /// value at this position.
    Stream(BoxStream<'static, ResolverResult>),
}

impl Resolved {
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    pub fn deferred(future: impl Future<Output = ResolverResult> + Send + 'static) -> Self {
        Self::Deferred(future.boxed())
    }

    pub fn stream(stream: impl Stream<Item = ResolverResult> + Send + 'static) -> Self {
        Self::Stream(stream.boxed())
    }

    /// Wraps a stream of plain values.
    pub fn values(stream: impl Stream<Item = Value> + Send + 'static) -> Self {
        Self::Stream(stream.map(Ok).boxed())
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A field resolver.
pub trait Resolver: Send + Sync {
    /// Resolves a field value.
    ///
    /// `ctx` is the caller-provided context value for the whole execution.
    fn resolve(
        &self,
        parent: &Value,
        args: &ResolverArgs,
        ctx: &Value,
        info: &ResolverInfo,
    ) -> Result<Resolved, ResolverError>;
}

/// A resolver built from a closure.
pub struct FnResolver<F> {
    func: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&Value, &ResolverArgs, &Value, &ResolverInfo) -> Result<Resolved, ResolverError>
        + Send
        + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&Value, &ResolverArgs, &Value, &ResolverInfo) -> Result<Resolved, ResolverError>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        parent: &Value,
        args: &ResolverArgs,
        ctx: &Value,
        info: &ResolverInfo,
    ) -> Result<Resolved, ResolverError> {
        (self.func)(parent, args, ctx, info)
    }
}

/// Convenience constructor for an `Arc`'d closure resolver.
pub fn resolver_fn<F>(func: F) -> Arc<dyn Resolver>
where
    F: Fn(&Value, &ResolverArgs, &Value, &ResolverInfo) -> Result<Resolved, ResolverError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnResolver::new(func))
}

/// Default resolver: reads the attribute of the same name from the parent
/// value. Missing attributes and non-object parents resolve to null so the
/// response keeps the shape of the selection.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve(
        &self,
        parent: &Value,
        _args: &ResolverArgs,
        _ctx: &Value,
        info: &ResolverInfo,
    ) -> Result<Resolved, ResolverError> {
        let value = match parent {
            Value::Object(map) => map.get(&info.field_name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        Ok(Resolved::Value(value))
    }
}
