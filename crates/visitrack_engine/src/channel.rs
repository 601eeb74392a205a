//! Push channel.
//!
//! The channel is best-effort broadcast: every subscriber of a topic
//! receives each published payload once, in publish order, with no
//! acknowledgement. `PushHub` is the in-process implementation used by the
//! reference server, the CLI and the tests.

use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;
use visitrack_protocol::Topic;

/// Identifies one subscriber, typically one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Creates a fresh subscriber ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback invoked for every payload published on a topic.
pub type PushHandler = Arc<dyn Fn(Topic, &Value) + Send + Sync>;

/// A topic-based broadcast transport.
pub trait PushChannel: Send + Sync {
    /// Subscribes `handler` to `topic` on behalf of `subscriber`.
    ///
    /// Fails with `AlreadySubscribed` if the subscriber already holds an
    /// active subscription to the topic.
    fn subscribe(
        &self,
        topic: Topic,
        subscriber: SubscriberId,
        handler: PushHandler,
    ) -> EngineResult<Subscription>;

    /// Publishes a payload. Returns the number of handlers invoked.
    fn publish(&self, topic: Topic, payload: &Value) -> usize;
}

type Cancel = Box<dyn FnOnce() + Send + Sync>;

/// Handle to an active subscription.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    topic: Topic,
    subscriber: SubscriberId,
    cancel: Option<Cancel>,
}

impl Subscription {
    /// Creates a handle that runs `cancel` on unsubscribe.
    pub fn new(topic: Topic, subscriber: SubscriberId, cancel: Cancel) -> Self {
        Self {
            topic,
            subscriber,
            cancel: Some(cancel),
        }
    }

    /// Subscribed topic.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Owner of the subscription.
    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Returns true until the subscription is cancelled.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Cancels the subscription. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("subscriber", &self.subscriber)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Route {
    id: u64,
    subscriber: SubscriberId,
    handler: PushHandler,
}

#[derive(Default)]
struct HubInner {
    routes: RwLock<BTreeMap<Topic, Vec<Route>>>,
    next_route: AtomicU64,
}

impl HubInner {
    fn remove(&self, topic: Topic, route_id: u64) {
        let mut routes = self.routes.write();
        if let Some(list) = routes.get_mut(&topic) {
            list.retain(|route| route.id != route_id);
            if list.is_empty() {
                routes.remove(&topic);
            }
        }
    }
}

/// In-process push channel.
///
/// Clones share the same routing table.
#[derive(Clone, Default)]
pub struct PushHub {
    inner: Arc<HubInner>,
}

impl PushHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscriptions on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .routes
            .read()
            .get(&topic)
            .map_or(0, |list| list.len())
    }
}

impl PushChannel for PushHub {
    fn subscribe(
        &self,
        topic: Topic,
        subscriber: SubscriberId,
        handler: PushHandler,
    ) -> EngineResult<Subscription> {
        let route_id = {
            let mut routes = self.inner.routes.write();
            let list = routes.entry(topic).or_default();
            if list.iter().any(|route| route.subscriber == subscriber) {
                return Err(EngineError::AlreadySubscribed { topic });
            }
            let id = self.inner.next_route.fetch_add(1, Ordering::Relaxed);
            list.push(Route {
                id,
                subscriber,
                handler,
            });
            id
        };

        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(
            topic,
            subscriber,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove(topic, route_id);
                }
            }),
        ))
    }

    fn publish(&self, topic: Topic, payload: &Value) -> usize {
        // Handlers may publish again, so never call them under the lock.
        let handlers: Vec<PushHandler> = self
            .inner
            .routes
            .read()
            .get(&topic)
            .map(|list| list.iter().map(|route| Arc::clone(&route.handler)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(topic, payload);
        }
        handlers.len()
    }
}

impl fmt::Debug for PushHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.inner.routes.read();
        let counts: BTreeMap<&str, usize> = routes
            .iter()
            .map(|(topic, list)| (topic.as_str(), list.len()))
            .collect();
        f.debug_struct("PushHub").field("routes", &counts).finish()
    }
}
