//! Stream combinators for the execution engine.
//!
//! Field values flow as [`SlotStream`]s: each emission is the latest value
//! at one response position, errors are terminal, and dropping a stream is
//! unsubscription. A drop synchronously releases every upstream
//! subscription the stream holds.
//!
//! Three combinators carry the engine's semantics:
//! - [`combine_object`]: keyed combine-latest assembling response objects,
//!   with a serial mode whose first-emit barrier sequences mutation fields
//! - [`combine_list`]: indexed combine-latest assembling list values
//! - [`switch_map`]: re-completion on every emission of a resolver stream,
//!   tearing the previous sub-selection down before building the next

use crate::error::GraphQLError;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{Map as JsonMap, Value};
use std::pin::Pin;
use std::task::{Context, Poll};

/// The value at a response position.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// A completed value.
    Value(Value),
    /// The field is absent; its key is omitted from the parent object.
    Absent,
}

/// One emission of a field-position stream.
pub type StreamItem = Result<Slot, GraphQLError>;

/// A stream of values at one response position.
pub type SlotStream = BoxStream<'static, StreamItem>;

/// A stream of raw (uncompleted) resolver values.
pub type RawStream = BoxStream<'static, Result<Value, GraphQLError>>;

/// How sibling fields of a selection set are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// All fields live at once; any may emit first.
    Concurrent,
    /// Field `k` starts only after field `k-1` produced its first value.
    Serial,
}

/// Emits a single value, then completes.
pub fn once_value(value: Value) -> SlotStream {
    futures::stream::once(async move { Ok(Slot::Value(value)) }).boxed()
}

/// Emits a single absent marker, then completes.
pub fn once_absent() -> SlotStream {
    futures::stream::once(async { Ok(Slot::Absent) }).boxed()
}

/// Terminates immediately with an error.
pub fn once_error(error: GraphQLError) -> SlotStream {
    futures::stream::once(async move { Err(error) }).boxed()
}

/// Defers building a stream until it is first polled.
///
/// Resolver invocation happens inside the builder, so an unpolled field
/// stream has no side effects. The serial barrier of [`combine_object`]
/// relies on this to sequence mutation fields.
pub fn defer(build: impl FnOnce() -> SlotStream + Send + 'static) -> SlotStream {
    Box::pin(Defer {
        build: Some(Box::new(build)),
        inner: None,
    })
}

struct Defer {
    build: Option<Box<dyn FnOnce() -> SlotStream + Send>>,
    inner: Option<SlotStream>,
}

impl Stream for Defer {
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
        let this = self.get_mut();
        if this.inner.is_none() {
            match this.build.take() {
                Some(build) => this.inner = Some(build()),
                None => return Poll::Ready(None),
            }
        }
        match this.inner.as_mut() {
            Some(inner) => inner.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

/// Replaces a terminal error with a final value.
///
/// The erroring upstream is dropped before the handler runs, then the
/// stream completes. This is the absorb half of the nullability rules.
pub fn recover_with<F>(inner: SlotStream, handler: F) -> SlotStream
where
    F: FnOnce(GraphQLError) -> Slot + Send + Unpin + 'static,
{
    Box::pin(Recover {
        inner: Some(inner),
        handler: Some(handler),
    })
}

struct Recover<F> {
    inner: Option<SlotStream>,
    handler: Option<F>,
}

impl<F> Stream for Recover<F>
where
    F: FnOnce(GraphQLError) -> Slot + Send + Unpin + 'static,
{
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(slot))) => Poll::Ready(Some(Ok(slot))),
            Poll::Ready(Some(Err(error))) => {
                this.inner = None;
                match this.handler.take() {
                    Some(handler) => Poll::Ready(Some(Ok(handler(error)))),
                    None => Poll::Ready(None),
                }
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Combine-latest over an ordered response-key → stream mapping.
///
/// Emits an object once every child has produced a value, then re-emits on
/// any child change, always carrying the latest value at every key in
/// selection order. Children emitting [`Slot::Absent`] stay live but their
/// key is omitted. A child error tears every child down and terminates the
/// stream. Completion of all children completes the object stream; a child
/// that completes without ever producing makes the object unassemblable,
/// which also completes the stream.
pub fn combine_object(children: Vec<(String, SlotStream)>, mode: EvalMode) -> SlotStream {
    Box::pin(CombineObject {
        children: children
            .into_iter()
            .map(|(key, stream)| KeyedSlot {
                key,
                stream: Some(stream),
                latest: None,
            })
            .collect(),
        mode,
        admitted: 1,
        done: false,
    })
}

struct KeyedSlot {
    key: String,
    stream: Option<SlotStream>,
    latest: Option<Slot>,
}

struct CombineObject {
    children: Vec<KeyedSlot>,
    mode: EvalMode,
    /// Serial mode: how many children may be polled so far.
    admitted: usize,
    done: bool,
}

impl Stream for CombineObject {
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.children.is_empty() {
            this.done = true;
            return Poll::Ready(Some(Ok(Slot::Value(Value::Object(JsonMap::new())))));
        }

        let mut changed = false;
        let mut terminal = None;
        let mut i = 0;
        'children: loop {
            let limit = match this.mode {
                EvalMode::Concurrent => this.children.len(),
                EvalMode::Serial => this.admitted,
            };
            if i >= limit {
                break;
            }

            let child = &mut this.children[i];
            if let Some(stream) = child.stream.as_mut() {
                loop {
                    match stream.poll_next_unpin(cx) {
                        Poll::Ready(Some(Ok(slot))) => {
                            child.latest = Some(slot);
                            changed = true;
                        }
                        Poll::Ready(Some(Err(error))) => {
                            terminal = Some(error);
                            break 'children;
                        }
                        Poll::Ready(None) => {
                            child.stream = None;
                            break;
                        }
                        Poll::Pending => break,
                    }
                }
            }

            // First value produced (or the child ended): admit the next
            // field in the serial sequence within this same poll.
            if this.mode == EvalMode::Serial
                && i + 1 == this.admitted
                && this.admitted < this.children.len()
                && (this.children[i].latest.is_some() || this.children[i].stream.is_none())
            {
                this.admitted += 1;
            }

            i += 1;
        }

        if let Some(error) = terminal {
            this.done = true;
            this.children.clear();
            return Poll::Ready(Some(Err(error)));
        }

        if this
            .children
            .iter()
            .any(|child| child.stream.is_none() && child.latest.is_none())
        {
            this.done = true;
            this.children.clear();
            return Poll::Ready(None);
        }

        let all_latest = this.children.iter().all(|child| child.latest.is_some());
        let all_done = this.children.iter().all(|child| child.stream.is_none());

        if changed && all_latest {
            let mut object = JsonMap::new();
            for child in &this.children {
                if let Some(Slot::Value(value)) = &child.latest {
                    object.insert(child.key.clone(), value.clone());
                }
            }
            if all_done {
                this.done = true;
            }
            return Poll::Ready(Some(Ok(Slot::Value(Value::Object(object)))));
        }

        if all_done {
            this.done = true;
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

/// Combine-latest over list element streams, preserving element order.
///
/// An empty input emits `[]` immediately. Element errors terminate the list
/// (elements isolate their own errors upstream when their type is nullable).
pub fn combine_list(children: Vec<SlotStream>) -> SlotStream {
    Box::pin(CombineList {
        children: children
            .into_iter()
            .map(|stream| IndexedSlot {
                stream: Some(stream),
                latest: None,
            })
            .collect(),
        done: false,
    })
}

struct IndexedSlot {
    stream: Option<SlotStream>,
    latest: Option<Value>,
}

struct CombineList {
    children: Vec<IndexedSlot>,
    done: bool,
}

impl Stream for CombineList {
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.children.is_empty() {
            this.done = true;
            return Poll::Ready(Some(Ok(Slot::Value(Value::Array(Vec::new())))));
        }

        let mut changed = false;
        let mut terminal = None;
        'children: for child in &mut this.children {
            let Some(stream) = child.stream.as_mut() else {
                continue;
            };
            loop {
                match stream.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(slot))) => {
                        child.latest = Some(match slot {
                            Slot::Value(value) => value,
                            Slot::Absent => Value::Null,
                        });
                        changed = true;
                    }
                    Poll::Ready(Some(Err(error))) => {
                        terminal = Some(error);
                        break 'children;
                    }
                    Poll::Ready(None) => {
                        child.stream = None;
                        break;
                    }
                    Poll::Pending => break,
                }
            }
        }

        if let Some(error) = terminal {
            this.done = true;
            this.children.clear();
            return Poll::Ready(Some(Err(error)));
        }

        if this
            .children
            .iter()
            .any(|child| child.stream.is_none() && child.latest.is_none())
        {
            this.done = true;
            this.children.clear();
            return Poll::Ready(None);
        }

        let all_latest = this.children.iter().all(|child| child.latest.is_some());
        let all_done = this.children.iter().all(|child| child.stream.is_none());

        if changed && all_latest {
            let items: Vec<Value> = this
                .children
                .iter()
                .filter_map(|child| child.latest.clone())
                .collect();
            if all_done {
                this.done = true;
            }
            return Poll::Ready(Some(Ok(Slot::Value(Value::Array(items)))));
        }

        if all_done {
            this.done = true;
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

/// Switch-map over a resolver stream.
///
/// Every outer emission is a new parent value: the previous inner stream is
/// dropped, tearing down its whole subscription subtree, before the
/// replacement is built from the new value. The output completes when both
/// the outer stream and the live inner stream have completed; an error on
/// either side is terminal.
pub fn switch_map<F>(outer: RawStream, map: F) -> SlotStream
where
    F: FnMut(Value) -> SlotStream + Send + Unpin + 'static,
{
    Box::pin(SwitchMap {
        outer: Some(outer),
        map,
        inner: None,
        done: false,
    })
}

struct SwitchMap<F> {
    outer: Option<RawStream>,
    map: F,
    inner: Option<SlotStream>,
    done: bool,
}

impl<F> Stream for SwitchMap<F>
where
    F: FnMut(Value) -> SlotStream + Send + Unpin + 'static,
{
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if let Some(outer) = this.outer.as_mut() {
            loop {
                match outer.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(value))) => {
                        // Unsubscribe the previous subtree first.
                        drop(this.inner.take());
                        this.inner = Some((this.map)(value));
                    }
                    Poll::Ready(Some(Err(error))) => {
                        this.done = true;
                        this.inner = None;
                        this.outer = None;
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Ready(None) => {
                        this.outer = None;
                        break;
                    }
                    Poll::Pending => break,
                }
            }
        }

        if let Some(inner) = this.inner.as_mut() {
            match inner.poll_next_unpin(cx) {
                Poll::Ready(Some(item)) => {
                    if item.is_err() {
                        this.done = true;
                        this.inner = None;
                        this.outer = None;
                    }
                    return Poll::Ready(Some(item));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        if this.outer.is_none() && this.inner.is_none() {
            this.done = true;
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio_stream::wrappers::UnboundedReceiverStream;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    /// Wraps a stream, recording when it is dropped (unsubscribed).
    struct DropTracker {
        inner: SlotStream,
        label: String,
        log: Log,
    }

    impl DropTracker {
        fn new(inner: SlotStream, label: &str, log: &Log) -> SlotStream {
            Box::pin(Self {
                inner,
                label: label.to_string(),
                log: log.clone(),
            })
        }
    }

    impl Stream for DropTracker {
        type Item = StreamItem;

        fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
            self.get_mut().inner.poll_next_unpin(cx)
        }
    }

    impl Drop for DropTracker {
        fn drop(&mut self) {
            push(&self.log, format!("drop:{}", self.label));
        }
    }

    fn channel_stream() -> (tokio::sync::mpsc::UnboundedSender<StreamItem>, SlotStream) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (tx, UnboundedReceiverStream::new(rx).boxed())
    }

    fn value_of(item: Option<StreamItem>) -> Value {
        match item {
            Some(Ok(Slot::Value(value))) => value,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_defer_runs_builder_on_first_poll() {
        let invocations = log();
        let invocations_in = invocations.clone();
        let mut stream = defer(move || {
            push(&invocations_in, "built");
            once_value(json!(1))
        });

        assert!(invocations.lock().unwrap().is_empty());
        assert_eq!(value_of(stream.next().await), json!(1));
        assert_eq!(*invocations.lock().unwrap(), vec!["built"]);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_combine_object_waits_for_all_children() {
        let (tx, slow) = channel_stream();
        let mut combined = combine_object(
            vec![
                ("fast".to_string(), once_value(json!("a"))),
                ("slow".to_string(), slow),
            ],
            EvalMode::Concurrent,
        );

        assert!(combined.next().now_or_never().is_none());

        tx.send(Ok(Slot::Value(json!("b")))).unwrap();
        assert_eq!(
            value_of(combined.next().await),
            json!({"fast": "a", "slow": "b"})
        );
    }

    #[tokio::test]
    async fn test_combine_object_reemits_on_change() {
        let (tx, live) = channel_stream();
        let mut combined = combine_object(
            vec![
                ("fixed".to_string(), once_value(json!(1))),
                ("live".to_string(), live),
            ],
            EvalMode::Concurrent,
        );

        tx.send(Ok(Slot::Value(json!("x")))).unwrap();
        assert_eq!(value_of(combined.next().await), json!({"fixed": 1, "live": "x"}));

        tx.send(Ok(Slot::Value(json!("y")))).unwrap();
        assert_eq!(value_of(combined.next().await), json!({"fixed": 1, "live": "y"}));

        drop(tx);
        assert!(combined.next().await.is_none());
    }

    #[tokio::test]
    async fn test_combine_object_empty_emits_empty_object() {
        let mut combined = combine_object(Vec::new(), EvalMode::Concurrent);
        assert_eq!(value_of(combined.next().await), json!({}));
        assert!(combined.next().await.is_none());
    }

    #[tokio::test]
    async fn test_combine_object_omits_absent_keys() {
        let mut combined = combine_object(
            vec![
                ("present".to_string(), once_value(json!(1))),
                ("missing".to_string(), once_absent()),
            ],
            EvalMode::Concurrent,
        );
        assert_eq!(value_of(combined.next().await), json!({"present": 1}));
    }

    #[tokio::test]
    async fn test_combine_object_preserves_key_order() {
        let mut combined = combine_object(
            vec![
                ("c".to_string(), once_value(json!(3))),
                ("a".to_string(), once_value(json!(1))),
                ("b".to_string(), once_value(json!(2))),
            ],
            EvalMode::Concurrent,
        );
        let Value::Object(object) = value_of(combined.next().await) else {
            panic!("expected object");
        };
        let keys: Vec<_> = object.keys().cloned().collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_combine_object_error_unsubscribes_all_children() {
        let tracker_log = log();
        let (tx, live) = channel_stream();
        let mut combined = combine_object(
            vec![
                (
                    "live".to_string(),
                    DropTracker::new(live, "live", &tracker_log),
                ),
                (
                    "bad".to_string(),
                    DropTracker::new(once_error(GraphQLError::new("boom")), "bad", &tracker_log),
                ),
            ],
            EvalMode::Concurrent,
        );

        let item = combined.next().await;
        assert!(matches!(item, Some(Err(_))));
        let entries = tracker_log.lock().unwrap().clone();
        assert!(entries.contains(&"drop:live".to_string()));
        assert!(entries.contains(&"drop:bad".to_string()));
        drop(tx);
    }

    #[tokio::test]
    async fn test_combine_object_serial_barrier() {
        let order = log();
        let order_first = order.clone();
        let order_second = order.clone();
        let (tx, gated) = channel_stream();

        let first = defer(move || {
            push(&order_first, "start:first");
            gated
        });
        let second = defer(move || {
            push(&order_second, "start:second");
            once_value(json!(2))
        });

        let mut combined = combine_object(
            vec![("first".to_string(), first), ("second".to_string(), second)],
            EvalMode::Serial,
        );

        // Polling starts the first field but must not start the second
        // until the first has produced a value.
        assert!(combined.next().now_or_never().is_none());
        assert_eq!(*order.lock().unwrap(), vec!["start:first"]);

        tx.send(Ok(Slot::Value(json!(1)))).unwrap();
        assert_eq!(
            value_of(combined.next().await),
            json!({"first": 1, "second": 2})
        );
        assert_eq!(
            *order.lock().unwrap(),
            vec!["start:first", "start:second"]
        );
    }

    #[tokio::test]
    async fn test_combine_list_preserves_indices() {
        let (tx, live) = channel_stream();
        let mut combined = combine_list(vec![once_value(json!("a")), live, once_value(json!("c"))]);

        tx.send(Ok(Slot::Value(json!("b")))).unwrap();
        assert_eq!(value_of(combined.next().await), json!(["a", "b", "c"]));

        tx.send(Ok(Slot::Value(json!("B")))).unwrap();
        assert_eq!(value_of(combined.next().await), json!(["a", "B", "c"]));
    }

    #[tokio::test]
    async fn test_combine_list_empty() {
        let mut combined = combine_list(Vec::new());
        assert_eq!(value_of(combined.next().await), json!([]));
        assert!(combined.next().await.is_none());
    }

    #[tokio::test]
    async fn test_switch_map_switches_and_cancels() {
        let tracker_log = log();
        let (outer_tx, outer_rx) = tokio::sync::mpsc::unbounded_channel();
        let outer: RawStream = UnboundedReceiverStream::new(outer_rx).boxed();

        let (inner_a_tx, inner_a) = channel_stream();
        let inner_a = std::cell::Cell::new(Some(DropTracker::new(inner_a, "a", &tracker_log)));
        let (inner_b_tx, inner_b) = channel_stream();
        let inner_b = std::cell::Cell::new(Some(DropTracker::new(inner_b, "b", &tracker_log)));

        let mut switched = switch_map(outer, move |value| match value.as_str() {
            Some("a") => inner_a.take().unwrap(),
            _ => inner_b.take().unwrap(),
        });

        outer_tx.send(Ok(json!("a"))).unwrap();
        inner_a_tx.send(Ok(Slot::Value(json!("a1")))).unwrap();
        assert_eq!(value_of(switched.next().await), json!("a1"));
        assert!(tracker_log.lock().unwrap().is_empty());

        // Switching to `b` drops the subscription to `a` first.
        outer_tx.send(Ok(json!("b"))).unwrap();
        inner_b_tx.send(Ok(Slot::Value(json!("b1")))).unwrap();
        assert_eq!(value_of(switched.next().await), json!("b1"));
        assert_eq!(*tracker_log.lock().unwrap(), vec!["drop:a"]);

        // Late emissions from the abandoned inner are not observed.
        assert!(inner_a_tx.send(Ok(Slot::Value(json!("a2")))).is_err());

        drop(outer_tx);
        drop(inner_b_tx);
        assert!(switched.next().await.is_none());
    }

    #[tokio::test]
    async fn test_switch_map_completes_with_last_inner() {
        let outer: RawStream = futures::stream::iter(vec![Ok(json!(1))]).boxed();
        let mut switched = switch_map(outer, |value| once_value(value));
        assert_eq!(value_of(switched.next().await), json!(1));
        assert!(switched.next().await.is_none());
    }

    #[tokio::test]
    async fn test_switch_map_outer_error_is_terminal() {
        let outer: RawStream =
            futures::stream::iter(vec![Ok(json!(1)), Err(GraphQLError::new("bad"))]).boxed();
        let mut switched = switch_map(outer, |value| once_value(value));
        assert!(matches!(switched.next().await, Some(Err(_))));
        assert!(switched.next().await.is_none());
    }

    #[tokio::test]
    async fn test_recover_with_absorbs_error() {
        let tracker_log = log();
        let inner = DropTracker::new(once_error(GraphQLError::new("boom")), "inner", &tracker_log);
        let absorbed = log();
        let absorbed_in = absorbed.clone();
        let mut recovered = recover_with(inner, move |error| {
            push(&absorbed_in, error.message);
            Slot::Value(Value::Null)
        });

        assert_eq!(value_of(recovered.next().await), Value::Null);
        assert!(recovered.next().await.is_none());
        assert_eq!(*absorbed.lock().unwrap(), vec!["boom"]);
        assert_eq!(*tracker_log.lock().unwrap(), vec!["drop:inner"]);
    }

    #[tokio::test]
    async fn test_recover_with_passes_values_through() {
        let mut recovered = recover_with(once_value(json!(5)), |_| Slot::Value(Value::Null));
        assert_eq!(value_of(recovered.next().await), json!(5));
        assert!(recovered.next().await.is_none());
    }
}
