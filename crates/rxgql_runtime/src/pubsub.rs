//! Publish/subscribe hub for hot resolver streams.
//!
//! The engine is source-agnostic: a resolver can hand back any stream. This
//! hub covers the common case of broadcast-backed topics, where subscribers
//! share one live sequence and late subscribers only see events from their
//! subscription point on.

use crate::resolver::ResolverResult;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const DEFAULT_CAPACITY: usize = 256;

/// A topic-keyed broadcast hub.
#[derive(Clone)]
pub struct PubSub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Value>>>>,
    capacity: usize,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Publishes an event, returning the number of live subscribers it
    /// reached. A topic nobody has subscribed to drops the event.
    pub fn publish(&self, topic: &str, event: Value) -> usize {
        let channels = self.channels.lock().expect("pubsub channels poisoned");
        match channels.get(topic) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribes to a topic, creating its channel on first use.
    pub fn subscribe(&self, topic: impl Into<String>) -> broadcast::Receiver<Value> {
        let topic = topic.into();
        let mut channels = self.channels.lock().expect("pubsub channels poisoned");
        match channels.get(&topic) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(self.capacity);
                channels.insert(topic, sender);
                receiver
            }
        }
    }

    /// Subscribes and wraps the receiver as a resolver-ready stream.
    /// Lagged gaps are skipped.
    pub fn stream(&self, topic: impl Into<String>) -> BoxStream<'static, ResolverResult> {
        BroadcastStream::new(self.subscribe(topic))
            .filter_map(|event| async move { event.ok().map(Ok) })
            .boxed()
    }

    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.channels
            .lock()
            .expect("pubsub channels poisoned")
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() > 0)
    }

    pub fn topic_count(&self) -> usize {
        self.channels.lock().expect("pubsub channels poisoned").len()
    }

    /// Drops channels that have no remaining subscribers.
    pub fn cleanup(&self) {
        self.channels
            .lock()
            .expect("pubsub channels poisoned")
            .retain(|_, sender| sender.receiver_count() > 0);
    }
}
