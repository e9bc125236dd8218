/*!
 * Event channel between the session controller and the streaming backend.
 *
 * Publishers push [`Event`]s onto an [`EventBus`]; every live subscription for
 * the event's topic has its handler invoked once per event. Handlers run in
 * the publisher's context, so the controller's handlers only forward into its
 * own inbox and never touch session state directly.
 */

use log::trace;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Named event topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Streamed translation fragment
    Chunk,
    /// Request finished, successfully or not
    Done,
    /// Request failed
    Error,
    /// Text pushed in from outside the session
    Input,
    /// Backend diagnostics
    Log,
}

impl Topic {
    // @returns: Wire name of the topic
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chunk => "ollama://chunk",
            Self::Done => "ollama://done",
            Self::Error => "ollama://error",
            Self::Input => "ollama://input",
            Self::Log => "ollama://log",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Payload of the terminal `done` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonePayload {
    /// Whether the request ran to natural completion
    pub ok: bool,
    /// Exit code, if one is known
    pub code: Option<i32>,
}

/// Payload of the terminal `error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// A single notification carried by the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Chunk(String),
    Done(DonePayload),
    Error(ErrorPayload),
    Input(String),
    Log(String),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Chunk(_) => Topic::Chunk,
            Self::Done(_) => Topic::Done,
            Self::Error(_) => Topic::Error,
            Self::Input(_) => Topic::Input,
            Self::Log(_) => Topic::Log,
        }
    }

    /// Shorthand for a `done` event
    pub fn done(ok: bool, code: Option<i32>) -> Self {
        Self::Done(DonePayload { ok, code })
    }

    /// Shorthand for an `error` event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

type Handler = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    closed: AtomicBool,
    handlers: Mutex<HashMap<Topic, Vec<(u64, Handler)>>>,
}

impl BusInner {
    fn remove(&self, topic: Topic, id: u64) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        before != list.len()
    }
}

/// Cloneable handle onto a shared publish/subscribe bus
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.inner.handlers.lock();
        let live: usize = handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("subscriptions", &live)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped. Subscribing to a closed bus yields an inactive
    /// subscription.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Subscription {
                bus: Weak::new(),
                topic,
                id: None,
            };
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!("subscribed #{} to {}", id, topic);

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id: Some(id),
        }
    }

    /// Deliver `event` to every live subscription of its topic
    ///
    /// Returns the number of handlers invoked. Handlers are called in
    /// subscription order, outside the registry lock.
    pub fn publish(&self, event: Event) -> usize {
        self.publish_or_else(event, |_| {})
    }

    /// Like [`publish`](Self::publish), but hands `event` to `fallback` when
    /// no handler received it
    ///
    /// Each event reaches either the handlers or the fallback, never both.
    pub fn publish_or_else<F>(&self, event: Event, fallback: F) -> usize
    where
        F: FnOnce(Event),
    {
        let handlers = self.handlers_for(event.topic());
        if handlers.is_empty() {
            fallback(event);
            return 0;
        }

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }

    // Snapshot taken under the lock; handlers run outside it
    fn handlers_for(&self, topic: Topic) -> Vec<Handler> {
        if self.is_closed() {
            return Vec::new();
        }
        self.inner
            .handlers
            .lock()
            .get(&topic)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of live subscriptions for `topic`
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .handlers
            .lock()
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Drop every subscription and refuse further traffic
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.handlers.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Handle for one registered handler; unsubscribes on drop
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: Option<u64>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
            && self
                .bus
                .upgrade()
                .is_some_and(|bus| !bus.closed.load(Ordering::SeqCst))
    }

    /// Remove the handler from the bus. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.topic, id) {
                trace!("unsubscribed #{} from {}", id, self.topic);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// An event tagged with the generation of the subscription group that received it
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub generation: u64,
    pub event: Event,
}

/// The four per-request subscriptions, managed as one unit
///
/// A group is always torn down completely before its successor is
/// established, so a superseded request's events never reach the new group.
#[derive(Debug)]
pub struct SubscriptionGroup {
    generation: u64,
    subscriptions: Vec<Subscription>,
}

impl SubscriptionGroup {
    /// Topics covered by a group
    pub const TOPICS: [Topic; 4] = [Topic::Chunk, Topic::Done, Topic::Error, Topic::Input];

    /// Subscribe to all four topics, forwarding each event tagged with `generation`
    pub fn establish<F>(bus: &EventBus, generation: u64, forward: F) -> Self
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        let forward = Arc::new(forward);
        let subscriptions = Self::TOPICS
            .iter()
            .map(|topic| {
                let forward = forward.clone();
                bus.subscribe(*topic, move |event| forward(Delivery { generation, event }))
            })
            .collect();

        Self {
            generation,
            subscriptions,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while every member subscription is still registered
    pub fn is_active(&self) -> bool {
        !self.subscriptions.is_empty() && self.subscriptions.iter().all(Subscription::is_active)
    }

    /// Unsubscribe all members. Idempotent.
    pub fn teardown(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        self.teardown();
    }
}
