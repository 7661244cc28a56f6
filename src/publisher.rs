// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The `Publisher` trait and its shared state.
//!
//! The cross-publisher plumbing (looking up subscribers by id, enqueueing delivery)
//! lives on [`crate::engine::Engine`], which is the only thing that can see every
//! publisher and subscriber at once. This trait only carries the per-object
//! customization points and bookkeeping a concrete publisher needs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::ids::{PublisherId, SubscriberId};
use crate::topic::{Topic, Value};

/// Subscriber bookkeeping and the last-known-value cache shared by every publisher.
///
/// Invariants upheld by [`crate::engine::Engine`]'s subscribe/unsubscribe/push
/// operations: empty subscriber sets are removed rather than stored empty, and a
/// `cache` entry only ever exists for a topic that some `push_updates` call named.
#[derive(Debug, Default)]
pub struct PublisherState {
    pub(crate) subscribers: Mutex<HashMap<Topic, HashSet<SubscriberId>>>,
    pub(crate) cache: Mutex<HashMap<Topic, Value>>,
}

impl PublisherState {
    #[must_use]
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()), cache: Mutex::new(HashMap::new()) }
    }

    /// Snapshot of current subscribers for `topic`, empty if none.
    #[must_use]
    pub fn subscribers_of(&self, topic: &Topic) -> HashSet<SubscriberId> {
        self.subscribers.lock().expect("publisher state poisoned").get(topic).cloned().unwrap_or_default()
    }
}

/// A thing that can be subscribed to. Implementors declare *what* they publish and
/// *whether* they currently can; the engine handles the graph of who is subscribed to
/// what.
pub trait Publisher: Send + Sync {
    fn publisher_id(&self) -> PublisherId;

    fn publisher_state(&self) -> &PublisherState;

    /// Whether this publisher is currently able to serve any topic at all (e.g. a
    /// `FifoSink` whose backing path doesn't exist yet is not publishing anything).
    fn can_publish(&self) -> bool { true }

    /// Whether this publisher declares `topic` as one of the things it can emit.
    fn publishes(&self, topic: &Topic) -> bool;

    /// `can_publish() && publishes(topic)`.
    fn is_publishing(&self, topic: &Topic) -> bool {
        self.can_publish() && self.publishes(topic)
    }

    /// Reads the cached last-known value for `topic`, if any has ever been pushed.
    fn get(&self, topic: &Topic) -> Option<Value> {
        self.publisher_state().cache.lock().expect("publisher state poisoned").get(topic).cloned()
    }

    /// Called after a subscriber has been added to `topic`'s subscriber set.
    fn on_subscribe(&self, _subscriber: SubscriberId, _topic: &Topic) {}

    /// Called after a subscriber has been removed from `topic`'s subscriber set.
    fn on_unsubscribe(&self, _subscriber: SubscriberId, _topic: &Topic) {}
}
