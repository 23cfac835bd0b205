//! Reactive behavior: live sources, hot subscriptions, switch cancellation,
//! and mutation sequencing, all on the paused tokio clock.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use rxgql_runtime::{
    execute, ExecutionRequest, FieldDef, FnResolver, ObjectDef, PubSub, Resolved, ResolverResult,
    SchemaBuilder, TypeRef,
};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::time::{sleep, Duration, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A resolver stream that records its own drop, i.e. the engine
/// unsubscribing from it.
struct Tracked {
    inner: BoxStream<'static, ResolverResult>,
    label: String,
    log: Log,
}

fn tracked(
    inner: impl Stream<Item = ResolverResult> + Send + 'static,
    label: &str,
    log: &Log,
) -> BoxStream<'static, ResolverResult> {
    Box::pin(Tracked {
        inner: inner.boxed(),
        label: label.to_string(),
        log: log.clone(),
    })
}

impl Stream for Tracked {
    type Item = ResolverResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ResolverResult>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        push(&self.log, format!("drop:{}", self.label));
    }
}

/// Emits the value once and then stays open, so teardown is only ever
/// caused by unsubscription.
fn once_then_open(value: Value) -> impl Stream<Item = ResolverResult> + Send + 'static {
    futures::stream::once(async move { Ok(value) }).chain(futures::stream::pending())
}

#[tokio::test(start_paused = true)]
async fn test_hot_source_late_subscription() {
    let pubsub = PubSub::new();

    let resolver_hub = pubsub.clone();
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query").field(
                FieldDef::new("value", TypeRef::named("Int")).resolver(FnResolver::new(
                    move |_, _, _, _| Ok(Resolved::Stream(resolver_hub.stream("values"))),
                )),
            ),
        )
        .build();

    // Marble -a--b--c: a at t=10ms, b at t=40ms, c at t=70ms.
    let producer = pubsub.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        producer.publish("values", json!(1));
        sleep(Duration::from_millis(30)).await;
        producer.publish("values", json!(2));
        sleep(Duration::from_millis(30)).await;
        producer.publish("values", json!(3));
    });

    let mut stream = execute(ExecutionRequest::new(schema, "{ value }"));

    // Subscribe at t=20ms, after `a` has already been dropped on the floor.
    sleep(Duration::from_millis(20)).await;
    assert!(!pubsub.has_subscribers("values"));

    let first = stream.next().await.expect("snapshot for b");
    assert_eq!(first.data, Some(json!({"value": 2})));
    assert!(pubsub.has_subscribers("values"));

    let second = stream.next().await.expect("snapshot for c");
    assert_eq!(second.data, Some(json!({"value": 3})));

    // Unsubscribing releases the hold on the source.
    drop(stream);
    assert!(!pubsub.has_subscribers("values"));
}

#[tokio::test(start_paused = true)]
async fn test_switch_cancels_inner_subscriptions() {
    let log = new_log();

    let (emitter_tx, emitter_rx) = tokio::sync::mpsc::unbounded_channel::<ResolverResult>();
    let emitter_source: Mutex<Option<BoxStream<'static, ResolverResult>>> =
        Mutex::new(Some(UnboundedReceiverStream::new(emitter_rx).boxed()));

    let value_log = log.clone();
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query").field(
                FieldDef::new("currentEmitter", TypeRef::named("Emitter")).resolver(
                    FnResolver::new(move |_, _, _, _| {
                        let source = emitter_source
                            .lock()
                            .unwrap()
                            .take()
                            .ok_or("emitter source already consumed")?;
                        Ok(Resolved::Stream(source))
                    }),
                ),
            ),
        )
        .object(
            ObjectDef::new("Emitter").field(
                FieldDef::new("value", TypeRef::named("String")).resolver(FnResolver::new(
                    move |parent, _, _, _| {
                        let label = parent["id"].as_str().unwrap_or("?").to_string();
                        push(&value_log, format!("resolve:{label}"));
                        Ok(Resolved::Stream(tracked(
                            once_then_open(json!(format!("value-{label}"))),
                            &label,
                            &value_log,
                        )))
                    },
                )),
            ),
        )
        .build();

    // Emitter A at t=10ms, emitter B at t=70ms.
    let producer_log = log.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        let _ = emitter_tx.send(Ok(json!({"id": "A"})));
        sleep(Duration::from_millis(60)).await;
        push(&producer_log, "send:B");
        let _ = emitter_tx.send(Ok(json!({"id": "B"})));
    });

    let mut stream = execute(ExecutionRequest::new(
        schema,
        "{ currentEmitter { value } }",
    ));

    let first = stream.next().await.expect("snapshot for A");
    assert_eq!(first.data, Some(json!({"currentEmitter": {"value": "value-A"}})));

    let second = stream.next().await.expect("snapshot for B");
    assert_eq!(second.data, Some(json!({"currentEmitter": {"value": "value-B"}})));

    // A's whole subtree was torn down before B's was built.
    assert_eq!(
        entries(&log),
        vec!["resolve:A", "send:B", "drop:A", "resolve:B"]
    );

    drop(stream);
    assert!(entries(&log).contains(&"drop:B".to_string()));
}

#[tokio::test]
async fn test_unsubscribe_releases_all_resolver_streams() {
    let log = new_log();

    let launched_log = log.clone();
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query").field(
                FieldDef::new(
                    "launched",
                    TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("Shuttle")))),
                )
                .resolver(FnResolver::new(move |_, _, _, _| {
                    Ok(Resolved::Stream(tracked(
                        once_then_open(json!([{"name": "discovery"}])),
                        "launched",
                        &launched_log,
                    )))
                })),
            ),
        )
        .object(ObjectDef::new("Shuttle").field(FieldDef::new(
            "name",
            TypeRef::non_null(TypeRef::named("String")),
        )))
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "{ launched { name } }"));
    let first = stream.next().await.expect("snapshot");
    assert_eq!(first.data, Some(json!({"launched": [{"name": "discovery"}]})));
    assert!(entries(&log).is_empty());

    drop(stream);
    assert_eq!(entries(&log), vec!["drop:launched"]);
}

#[tokio::test]
async fn test_snapshots_track_latest_of_every_field() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ResolverResult>();
    let live_source: Mutex<Option<BoxStream<'static, ResolverResult>>> =
        Mutex::new(Some(UnboundedReceiverStream::new(rx).boxed()));

    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query")
                .field(
                    FieldDef::new("fixed", TypeRef::named("Int"))
                        .resolver(FnResolver::new(|_, _, _, _| Ok(Resolved::from(json!(1))))),
                )
                .field(
                    FieldDef::new("live", TypeRef::named("Int")).resolver(FnResolver::new(
                        move |_, _, _, _| {
                            let source = live_source
                                .lock()
                                .unwrap()
                                .take()
                                .ok_or("live source already consumed")?;
                            Ok(Resolved::Stream(source))
                        },
                    )),
                ),
        )
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "{ fixed live }"));

    tx.send(Ok(json!(10))).unwrap();
    let first = stream.next().await.expect("first snapshot");
    assert_eq!(first.data, Some(json!({"fixed": 1, "live": 10})));

    tx.send(Ok(json!(20))).unwrap();
    let second = stream.next().await.expect("second snapshot");
    assert_eq!(second.data, Some(json!({"fixed": 1, "live": 20})));

    drop(tx);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_error_mid_life_is_absorbed_and_accumulates() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ResolverResult>();
    let ticker_source: Mutex<Option<BoxStream<'static, ResolverResult>>> =
        Mutex::new(Some(UnboundedReceiverStream::new(rx).boxed()));

    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query").field(
                FieldDef::new("ticker", TypeRef::named("Int")).resolver(FnResolver::new(
                    move |_, _, _, _| {
                        let source = ticker_source
                            .lock()
                            .unwrap()
                            .take()
                            .ok_or("ticker source already consumed")?;
                        Ok(Resolved::Stream(source))
                    },
                )),
            ),
        )
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "{ ticker }"));

    tx.send(Ok(json!(1))).unwrap();
    let first = stream.next().await.expect("healthy snapshot");
    assert_eq!(first.data, Some(json!({"ticker": 1})));
    assert!(first.errors.is_none());

    tx.send(Err("ticker failed".into())).unwrap();
    let second = stream.next().await.expect("absorbed snapshot");
    assert_eq!(second.data, Some(json!({"ticker": null})));
    let errors = second.errors.expect("errors recorded");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "ticker failed");

    // The errored field is settled; the execution completes.
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_mutation_fields_wait_for_first_emission() {
    let log = new_log();
    let start = Instant::now();

    let first_log = log.clone();
    let second_log = log.clone();
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .object(ObjectDef::new("Query").field(FieldDef::new("noop", TypeRef::named("Int"))))
        .object(
            ObjectDef::new("Mutation")
                .field(
                    FieldDef::new("first", TypeRef::named("String")).resolver(FnResolver::new(
                        move |_, _, _, _| {
                            push(&first_log, format!("resolve:first@{}", start.elapsed().as_millis()));
                            Ok(Resolved::deferred(async {
                                sleep(Duration::from_millis(50)).await;
                                Ok(json!("one"))
                            }))
                        },
                    )),
                )
                .field(
                    FieldDef::new("second", TypeRef::named("String")).resolver(FnResolver::new(
                        move |_, _, _, _| {
                            push(
                                &second_log,
                                format!("resolve:second@{}", start.elapsed().as_millis()),
                            );
                            Ok(Resolved::from(json!("two")))
                        },
                    )),
                ),
        )
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "mutation { first second }"));
    let snapshot = stream.next().await.expect("combined snapshot");
    assert_eq!(snapshot.data, Some(json!({"first": "one", "second": "two"})));

    // The second resolver only ran once the first had produced its value.
    assert_eq!(
        entries(&log),
        vec!["resolve:first@0", "resolve:second@50"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_query_fields_start_concurrently() {
    let log = new_log();
    let start = Instant::now();

    let first_log = log.clone();
    let second_log = log.clone();
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query")
                .field(
                    FieldDef::new("first", TypeRef::named("String")).resolver(FnResolver::new(
                        move |_, _, _, _| {
                            push(&first_log, format!("resolve:first@{}", start.elapsed().as_millis()));
                            Ok(Resolved::deferred(async {
                                sleep(Duration::from_millis(50)).await;
                                Ok(json!("one"))
                            }))
                        },
                    )),
                )
                .field(
                    FieldDef::new("second", TypeRef::named("String")).resolver(FnResolver::new(
                        move |_, _, _, _| {
                            push(
                                &second_log,
                                format!("resolve:second@{}", start.elapsed().as_millis()),
                            );
                            Ok(Resolved::from(json!("two")))
                        },
                    )),
                ),
        )
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "{ first second }"));
    let snapshot = stream.next().await.expect("combined snapshot");
    assert_eq!(snapshot.data, Some(json!({"first": "one", "second": "two"})));
    assert_eq!(
        entries(&log),
        vec!["resolve:first@0", "resolve:second@0"]
    );
}

#[tokio::test]
async fn test_mutation_fields_stay_live_after_barrier() {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ResolverResult>();
    let counter_source: Mutex<Option<BoxStream<'static, ResolverResult>>> =
        Mutex::new(Some(UnboundedReceiverStream::new(rx).boxed()));

    let schema = SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .object(ObjectDef::new("Query").field(FieldDef::new("noop", TypeRef::named("Int"))))
        .object(
            ObjectDef::new("Mutation")
                .field(
                    FieldDef::new("counter", TypeRef::named("Int")).resolver(FnResolver::new(
                        move |_, _, _, _| {
                            let source = counter_source
                                .lock()
                                .unwrap()
                                .take()
                                .ok_or("counter source already consumed")?;
                            Ok(Resolved::Stream(source))
                        },
                    )),
                )
                .field(
                    FieldDef::new("done", TypeRef::named("Boolean"))
                        .resolver(FnResolver::new(|_, _, _, _| {
                            Ok(Resolved::from(json!(true)))
                        })),
                ),
        )
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "mutation { counter done }"));

    tx.send(Ok(json!(1))).unwrap();
    let first = stream.next().await.expect("first snapshot");
    assert_eq!(first.data, Some(json!({"counter": 1, "done": true})));

    // The barrier is only about the first value; later emissions still flow.
    tx.send(Ok(json!(2))).unwrap();
    let second = stream.next().await.expect("second snapshot");
    assert_eq!(second.data, Some(json!({"counter": 2, "done": true})));

    drop(tx);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_nested_stream_resolvers_compose() {
    // A stream under a stream: the outer switches parents, the inner keeps
    // each parent's field live.
    let (outer_tx, outer_rx) = tokio::sync::mpsc::unbounded_channel::<ResolverResult>();
    let outer_source: Mutex<Option<BoxStream<'static, ResolverResult>>> =
        Mutex::new(Some(UnboundedReceiverStream::new(outer_rx).boxed()));

    let schema = SchemaBuilder::new()
        .query_type("Query")
        .object(
            ObjectDef::new("Query").field(
                FieldDef::new("mission", TypeRef::named("Mission")).resolver(FnResolver::new(
                    move |_, _, _, _| {
                        let source = outer_source
                            .lock()
                            .unwrap()
                            .take()
                            .ok_or("outer source already consumed")?;
                        Ok(Resolved::Stream(source))
                    },
                )),
            ),
        )
        .object(
            ObjectDef::new("Mission").field(
                FieldDef::new("countdown", TypeRef::named("Int")).resolver(FnResolver::new(
                    |parent, _, _, _| {
                        let from = parent["from"].as_i64().unwrap_or(0);
                        Ok(Resolved::values(futures::stream::iter(vec![
                            json!(from),
                        ])))
                    },
                )),
            ),
        )
        .build();

    let mut stream = execute(ExecutionRequest::new(schema, "{ mission { countdown } }"));

    outer_tx.send(Ok(json!({"from": 10}))).unwrap();
    let first = stream.next().await.expect("first mission");
    assert_eq!(first.data, Some(json!({"mission": {"countdown": 10}})));

    outer_tx.send(Ok(json!({"from": 3}))).unwrap();
    let second = stream.next().await.expect("second mission");
    assert_eq!(second.data, Some(json!({"mission": {"countdown": 3}})));

    drop(outer_tx);
    assert!(stream.next().await.is_none());
}
