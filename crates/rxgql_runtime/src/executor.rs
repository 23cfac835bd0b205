//! Execution entry point.
//!
//! Builds the per-execution context, dispatches the operation to the engine,
//! and shapes the engine's object stream into response snapshots.

use crate::collect::{collect_fields, SubfieldCache};
use crate::engine::execute_selection_set;
use crate::error::GraphQLError;
use crate::path::ResponsePath;
use crate::resolver::{DefaultResolver, Resolver};
use crate::schema::Schema;
use crate::streams::{EvalMode, Slot, SlotStream};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use rxgql_core::{LineIndex, Span};
use rxgql_syntax::ast::{Document, FieldNode, FragmentDefinition, OperationDefinition, OperationKind};
use rxgql_syntax::ParsedDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// A response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data tree, or `null` at the root when a non-null violation
    /// bubbled all the way up. Absent for request-level failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Every located error observed so far, in observation order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

/// The stream of response snapshots an execution produces.
pub type ResponseStream = BoxStream<'static, Response>;

/// The document to execute: a raw source string or an already-parsed
/// document.
pub enum DocumentInput {
    Source(String),
    Parsed(ParsedDocument),
    Document(Document),
}

impl From<&str> for DocumentInput {
    fn from(source: &str) -> Self {
        Self::Source(source.to_string())
    }
}

impl From<String> for DocumentInput {
    fn from(source: String) -> Self {
        Self::Source(source)
    }
}

impl From<ParsedDocument> for DocumentInput {
    fn from(parsed: ParsedDocument) -> Self {
        Self::Parsed(parsed)
    }
}

impl From<Document> for DocumentInput {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

/// Everything an execution needs, assembled fluently.
pub struct ExecutionRequest {
    schema: Arc<Schema>,
    document: DocumentInput,
    root_value: Value,
    context_value: Value,
    variables: JsonMap<String, Value>,
    operation_name: Option<String>,
    default_resolver: Option<Arc<dyn Resolver>>,
}

impl ExecutionRequest {
    pub fn new(schema: impl Into<Arc<Schema>>, document: impl Into<DocumentInput>) -> Self {
        Self {
            schema: schema.into(),
            document: document.into(),
            root_value: Value::Null,
            context_value: Value::Null,
            variables: JsonMap::new(),
            operation_name: None,
            default_resolver: None,
        }
    }

    #[must_use]
    pub fn root_value(mut self, value: Value) -> Self {
        self.root_value = value;
        self
    }

    #[must_use]
    pub fn context_value(mut self, value: Value) -> Self {
        self.context_value = value;
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: JsonMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn default_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.default_resolver = Some(Arc::new(resolver));
        self
    }

    /// Runs the request. Equivalent to [`execute`].
    pub fn execute(self) -> ResponseStream {
        execute(self)
    }
}

/// Per-execution state shared by every field stream.
pub struct ExecutionContext {
    pub schema: Arc<Schema>,
    /// Fragment definitions from the document. Carried for completeness;
    /// fragment execution is unsupported.
    pub fragments: HashMap<String, FragmentDefinition>,
    pub root_value: Value,
    pub context_value: Value,
    pub variable_values: JsonMap<String, Value>,
    pub operation: OperationDefinition,
    pub default_resolver: Arc<dyn Resolver>,
    pub(crate) subfields: SubfieldCache,
    errors: Mutex<Vec<GraphQLError>>,
    line_index: Option<Arc<LineIndex>>,
}

impl ExecutionContext {
    /// Appends a located error to the execution's accumulator.
    pub fn add_error(&self, error: GraphQLError) {
        tracing::debug!(message = %error.message, "field error recorded");
        self.errors
            .lock()
            .expect("error accumulator poisoned")
            .push(error);
    }

    /// The cumulative error list, or `None` when no error has occurred.
    pub fn errors_snapshot(&self) -> Option<Vec<GraphQLError>> {
        let errors = self.errors.lock().expect("error accumulator poisoned");
        if errors.is_empty() {
            None
        } else {
            Some(errors.clone())
        }
    }

    /// Builds a located error from the field nodes it occurred at.
    pub(crate) fn locate(
        &self,
        message: impl Into<String>,
        nodes: &[Arc<FieldNode>],
        path: &ResponsePath,
    ) -> GraphQLError {
        let locations = match &self.line_index {
            Some(index) => nodes
                .iter()
                .map(|node| index.location(node.span.start))
                .collect(),
            None => Vec::new(),
        };
        GraphQLError::new(message)
            .with_locations(locations)
            .with_path(path.to_vec())
    }

    /// Builds a located error from a single source span.
    pub(crate) fn error_at_span(
        &self,
        message: impl Into<String>,
        span: Span,
        path: &ResponsePath,
    ) -> GraphQLError {
        let locations = match &self.line_index {
            Some(index) => vec![index.location(span.start)],
            None => Vec::new(),
        };
        GraphQLError::new(message)
            .with_locations(locations)
            .with_path(path.to_vec())
    }
}

/// Executes a request, returning the snapshot stream.
///
/// Request-level failures (parse errors, unresolvable operations, missing
/// root types) produce a single-snapshot stream and complete.
pub fn execute(request: ExecutionRequest) -> ResponseStream {
    let (document, line_index) = match request.document {
        DocumentInput::Source(source) => match rxgql_syntax::parse(&source) {
            Ok(parsed) => (parsed.document, Some(parsed.line_index)),
            Err(error) => {
                return request_failure(
                    GraphQLError::new(error.message)
                        .with_locations(vec![error.location.0]),
                );
            }
        },
        DocumentInput::Parsed(parsed) => (parsed.document, Some(parsed.line_index)),
        DocumentInput::Document(document) => (document, None),
    };

    let operation = match select_operation(&document, request.operation_name.as_deref()) {
        Ok(operation) => operation.clone(),
        Err(message) => return request_failure(GraphQLError::new(message)),
    };

    let fragments = document
        .fragments()
        .map(|fragment| (fragment.name.value.clone(), fragment.clone()))
        .collect();

    let ctx = Arc::new(ExecutionContext {
        schema: request.schema,
        fragments,
        root_value: request.root_value,
        context_value: request.context_value,
        variable_values: request.variables,
        operation,
        default_resolver: request
            .default_resolver
            .unwrap_or_else(|| Arc::new(DefaultResolver)),
        subfields: SubfieldCache::new(),
        errors: Mutex::new(Vec::new()),
        line_index,
    });

    dispatch(ctx)
}

fn select_operation<'a>(
    document: &'a Document,
    name: Option<&str>,
) -> Result<&'a OperationDefinition, String> {
    match name {
        Some(name) => document
            .operations()
            .find(|op| op.name.as_ref().is_some_and(|n| n.value == name))
            .ok_or_else(|| format!("Unknown operation named '{name}'.")),
        None => {
            let mut operations = document.operations();
            let first = operations
                .next()
                .ok_or_else(|| "Must provide an operation.".to_string())?;
            if operations.next().is_some() {
                return Err(
                    "Must provide operation name if query contains multiple operations."
                        .to_string(),
                );
            }
            Ok(first)
        }
    }
}

/// Picks the root type from the operation kind and hands the root selection
/// to the engine. Synchronous failures here become a single null-data
/// snapshot.
fn dispatch(ctx: Arc<ExecutionContext>) -> ResponseStream {
    tracing::debug!(
        kind = ctx.operation.kind.as_str(),
        name = ctx
            .operation
            .name
            .as_ref()
            .map(|n| n.value.as_str())
            .unwrap_or("<anonymous>"),
        "executing operation"
    );

    let (root, mode) = match ctx.operation.kind {
        OperationKind::Query => (ctx.schema.query_root(), EvalMode::Concurrent),
        OperationKind::Mutation => (ctx.schema.mutation_root(), EvalMode::Serial),
    };

    let Some(root) = root else {
        ctx.add_error(GraphQLError::new(format!(
            "Schema is not configured for {} operations.",
            ctx.operation.kind.as_str()
        )));
        return fatal_snapshot(&ctx);
    };
    let root_name = root.name.clone();

    let fields = match collect_fields(&ctx.operation.selection_set) {
        Ok(fields) => Arc::new(fields),
        Err(err) => {
            let error = ctx.error_at_span(err.message, err.span, &ResponsePath::root());
            ctx.add_error(error);
            return fatal_snapshot(&ctx);
        }
    };

    let objects = execute_selection_set(
        ctx.clone(),
        root_name,
        ctx.root_value.clone(),
        fields,
        ResponsePath::root(),
        mode,
    );

    Box::pin(SnapshotStream {
        ctx,
        inner: Some(objects),
    })
}

fn request_failure(error: GraphQLError) -> ResponseStream {
    let response = Response {
        data: None,
        errors: Some(vec![error]),
    };
    futures::stream::once(async move { response }).boxed()
}

fn fatal_snapshot(ctx: &Arc<ExecutionContext>) -> ResponseStream {
    let response = Response {
        data: Some(Value::Null),
        errors: ctx.errors_snapshot(),
    };
    futures::stream::once(async move { response }).boxed()
}

/// Maps the engine's object stream to snapshots. An unabsorbed error is
/// terminal: the upstream subscription tree is dropped, one final
/// `{data: null}` snapshot carries the cumulative errors, and the stream
/// completes.
struct SnapshotStream {
    ctx: Arc<ExecutionContext>,
    inner: Option<SlotStream>,
}

impl Stream for SnapshotStream {
    type Item = Response;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Response>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(slot))) => {
                let data = match slot {
                    Slot::Value(value) => value,
                    Slot::Absent => Value::Null,
                };
                Poll::Ready(Some(Response {
                    data: Some(data),
                    errors: this.ctx.errors_snapshot(),
                }))
            }
            Poll::Ready(Some(Err(error))) => {
                this.inner = None;
                this.ctx.add_error(error);
                Poll::Ready(Some(Response {
                    data: Some(Value::Null),
                    errors: this.ctx.errors_snapshot(),
                }))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
