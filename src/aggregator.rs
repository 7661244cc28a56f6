// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The `Aggregator`: a Sink+Source hybrid that fans out every backing source behind a
//! single publisher/subscriber identity, so application sinks can subscribe without
//! caring which concrete source currently serves a topic.

use std::sync::Mutex;

use crate::engine::EngineHandle;
use crate::ids::{PublisherId, SubscriberId};
use crate::publisher::{Publisher, PublisherState};
use crate::subscriber::{Subscriber, SubscriberState};
use crate::topic::{Topic, Updates};

/// Ordered list of backing sources plus the usual publisher/subscriber bookkeeping.
/// Tie-break on `is_publishing` is list order: the first source that claims a topic
/// wins. Re-binding after a winning source drops a topic is not automatic — a fresh
/// `subscribe_to` is required to probe the next source in order.
#[derive(Default)]
pub struct Aggregator {
    publisher_state: PublisherState,
    subscriber_state: SubscriberState,
    sources: Mutex<Vec<std::sync::Arc<dyn Publisher>>>,
    engine: EngineHandle,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator").field("sources", &self.sources.lock().expect("poisoned").len()).finish()
    }
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            publisher_state: PublisherState::new(),
            subscriber_state: SubscriberState::new(),
            sources: Mutex::new(Vec::new()),
            engine: EngineHandle::new(),
        }
    }

    pub(crate) fn bind_engine(&self, engine: std::sync::Weak<crate::engine::Engine>) {
        self.engine.bind(engine);
    }

    pub(crate) fn register_source(&self, source: std::sync::Arc<dyn Publisher>) {
        self.sources.lock().expect("poisoned").push(source);
    }

    /// The first registered source (in order) that currently claims `topic`.
    fn winning_source(&self, topic: &Topic) -> Option<std::sync::Arc<dyn Publisher>> {
        self.sources.lock().expect("poisoned").iter().find(|s| s.is_publishing(topic)).cloned()
    }

    /// Stops the aggregator: unsubscribes from every upstream source it is currently
    /// riding on behalf of downstream sinks, mirroring `Sink::stop`.
    pub fn stop(&self) {
        let engine = self.engine.engine();
        for (topic, publisher_id) in self.subscriber_state.all_subscriptions() {
            engine.try_unsubscribe_from(SubscriberId::Aggregator, topic, publisher_id).ok();
        }
    }
}

impl Publisher for Aggregator {
    fn publisher_id(&self) -> PublisherId { PublisherId::Aggregator }

    fn publisher_state(&self) -> &PublisherState { &self.publisher_state }

    fn publishes(&self, topic: &Topic) -> bool { self.winning_source(topic).is_some() }

    fn on_subscribe(&self, _subscriber: SubscriberId, topic: &Topic) {
        let already_bound = self.subscriber_state.is_subscribed(topic);
        if already_bound {
            return;
        }
        let Some(source) = self.winning_source(topic) else { return };
        let engine = self.engine.engine();
        if let Err(error) = engine.try_subscribe_to(SubscriberId::Aggregator, topic.clone(), Some(source.publisher_id())) {
            tracing::error!(%error, ?topic, "aggregator failed to subscribe upstream");
        }
    }
}

impl Subscriber for Aggregator {
    fn subscriber_id(&self) -> SubscriberId { SubscriberId::Aggregator }

    fn subscriber_state(&self) -> &SubscriberState { &self.subscriber_state }

    fn handle_updates(&self, updates: &Updates, _source: PublisherId) {
        let engine = self.engine.engine();
        engine.push_updates(PublisherId::Aggregator, updates.clone());
    }

    fn handle_unsubscribe(&self, topic: &Topic, _source: PublisherId) {
        let engine = self.engine.engine();
        engine.push_unsubscribe(PublisherId::Aggregator, topic.clone());
    }
}
