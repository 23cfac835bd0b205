//! Reactive GraphQL execution.
//!
//! This crate is the runtime half of rxgql:
//! - `schema`: programmatic schema model with resolvers and capabilities
//! - `resolver`: the resolver trait and its three-way return
//! - `arguments`: AST-to-runtime argument coercion
//! - `collect`: selection collection with memoized sub-selections
//! - `streams`: the combinators carrying the execution semantics
//! - `engine`: the recursive, type-directed evaluator
//! - `executor`: execution context, dispatch, and the entry point
//! - `error` / `path`: located errors and response paths
//! - `pubsub`: broadcast-backed hot sources for resolvers
//!
//! An execution returns a stream of [`Response`] snapshots: one fresh
//! snapshot whenever any value anywhere in the query tree changes.
//!
//! ```no_run
//! use rxgql_runtime::{
//!     execute, ExecutionRequest, FieldDef, ObjectDef, Resolved, SchemaBuilder, TypeRef,
//! };
//!
//! let schema = SchemaBuilder::new()
//!     .query_type("Query")
//!     .object(ObjectDef::new("Query").field(
//!         FieldDef::new("hello", TypeRef::named("String"))
//!             .resolver(rxgql_runtime::FnResolver::new(|_, _, _, _| {
//!                 Ok(Resolved::from(serde_json::json!("world")))
//!             })),
//!     ))
//!     .build();
//!
//! let _snapshots = execute(ExecutionRequest::new(schema, "{ hello }"));
//! ```

pub mod arguments;
pub mod collect;
mod engine;
pub mod error;
pub mod executor;
pub mod path;
pub mod pubsub;
pub mod resolver;
pub mod schema;
pub mod streams;

pub use error::GraphQLError;
pub use executor::{
    execute, DocumentInput, ExecutionContext, ExecutionRequest, Response, ResponseStream,
};
pub use path::{PathSegment, ResponsePath};
pub use pubsub::PubSub;
pub use resolver::{
    resolver_fn, DefaultResolver, Eventual, FnResolver, Resolved, Resolver, ResolverArgs,
    ResolverError, ResolverInfo, ResolverResult,
};
pub use schema::{
    EnumDef, FieldDef, InputObjectDef, InputValueDef, InterfaceDef, IsTypeOf, ObjectDef,
    ResolveType, ScalarDef, Schema, SchemaBuilder, Serializer, TypeDef, TypeRef, UnionDef,
};
pub use streams::{EvalMode, Slot, SlotStream};
