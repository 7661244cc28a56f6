// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The `Subscriber` trait and its shared state.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::ids::{PublisherId, SubscriberId};
use crate::topic::{Topic, Updates};

/// The set of publishers a subscriber currently has an open subscription with, per
/// topic.
#[derive(Debug, Default)]
pub struct SubscriberState {
    pub(crate) subscriptions: Mutex<HashMap<Topic, HashSet<PublisherId>>>,
}

impl SubscriberState {
    #[must_use]
    pub fn new() -> Self {
        Self { subscriptions: Mutex::new(HashMap::new()) }
    }

    #[must_use]
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.subscriptions.lock().expect("subscriber state poisoned").contains_key(topic)
    }

    /// All `(topic, publisher)` pairs currently open, used by `Sink::stop` to
    /// unsubscribe from everything before going idle.
    #[must_use]
    pub fn all_subscriptions(&self) -> Vec<(Topic, PublisherId)> {
        self.subscriptions
            .lock()
            .expect("subscriber state poisoned")
            .iter()
            .flat_map(|(topic, publishers)| publishers.iter().map(move |p| (topic.clone(), *p)))
            .collect()
    }
}

/// A thing that can subscribe to publishers. `handle_updates`/`handle_unsubscribe` are
/// always invoked from the dispatcher thread (they are the body of the `receive_*`
/// queued calls the engine makes), so implementors never need their own locking around
/// per-sink state.
pub trait Subscriber: Send + Sync {
    fn subscriber_id(&self) -> SubscriberId;

    fn subscriber_state(&self) -> &SubscriberState;

    /// A batch of updates arrived from `source`. A subscriber may receive keys it did
    /// not subscribe to (the publisher fans out by topic, not by individual
    /// subscriber-topic pairing beyond the subscribers-of-that-topic set) and must
    /// filter for the keys it cares about.
    fn handle_updates(&self, updates: &Updates, source: PublisherId);

    /// `source` has evicted `topic` out from under this subscriber.
    fn handle_unsubscribe(&self, topic: &Topic, source: PublisherId);
}
