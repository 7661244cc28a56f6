// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The engine arena: owns every source and sink by stable id and mediates the
//! publish/subscribe graph between them.
//!
//! This replaces the original's lazily-constructed module-level singleton (`Manager`)
//! with an explicit, constructed-once object threaded through the program instead of
//! hidden behind an import. Sources and sinks never talk to each other directly; they
//! go through `Engine`, which is the only thing that can resolve a `PublisherId` or
//! `SubscriberId` back to a live object.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, Weak};
use std::sync::Mutex;

use crate::aggregator::Aggregator;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::ids::{PublisherId, SinkId, SourceId, SubscriberId};
use crate::publisher::Publisher;
use crate::runnable::Runnable;
use crate::subscriber::Subscriber;
use crate::topic::{Topic, Updates};

/// A source: owns its own I/O thread and publishes whatever it reads from it.
pub trait Source: Runnable + Publisher {}
impl<T: Runnable + Publisher> Source for T {}

/// A sink: subscribes to one or more publishers and does something with what arrives.
pub trait Sink: Runnable + Subscriber {}
impl<T: Runnable + Subscriber> Sink for T {}

/// Holds a back-reference to the owning `Engine`, set once after registration. Shared
/// by the aggregator and every built-in source/sink base so they can call back into
/// the engine (to subscribe upstream, push updates, etc.) without the engine having to
/// pass itself into every method call.
#[derive(Debug, Default)]
pub struct EngineHandle(OnceLock<Weak<Engine>>);

impl EngineHandle {
    #[must_use]
    pub fn new() -> Self { Self(OnceLock::new()) }

    pub(crate) fn bind(&self, engine: Weak<Engine>) {
        let _ = self.0.set(engine);
    }

    /// Upgrades the stored weak reference. Panics if called before the owner has
    /// registered this object with an `Engine` — a programmer error, not a runtime
    /// condition callers should recover from.
    #[must_use]
    pub fn engine(&self) -> Arc<Engine> {
        self.0
            .get()
            .expect("used before being registered with an Engine")
            .upgrade()
            .expect("Engine dropped while a source/sink it owns is still alive")
    }
}

/// Owns the dispatcher, the aggregator, and every registered source/sink. The single
/// mediator for the publish/subscribe graph.
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    aggregator: Arc<Aggregator>,
    publishers: Mutex<HashMap<PublisherId, Arc<dyn Publisher>>>,
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    sources: Mutex<HashMap<SourceId, Arc<dyn Source>>>,
    sinks: Mutex<HashMap<SinkId, Arc<dyn Sink>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sources", &self.sources.lock().expect("poisoned").len())
            .field("sinks", &self.sinks.lock().expect("poisoned").len())
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        let aggregator = Arc::new(Aggregator::new());
        let engine = Arc::new(Self {
            dispatcher,
            aggregator: aggregator.clone(),
            publishers: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
        });
        aggregator.bind_engine(Arc::downgrade(&engine));
        engine
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> { &self.dispatcher }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<Aggregator> { &self.aggregator }

    /// Registers a source behind the aggregator. The source must already know its own
    /// `SourceId` (carried inside the `PublisherId` it reports).
    pub fn add_source(self: &Arc<Self>, source: Arc<dyn Source>) -> SourceId {
        let PublisherId::Source(id) = source.publisher_id() else {
            panic!("Source::publisher_id must report PublisherId::Source");
        };
        self.publishers.lock().expect("poisoned").insert(PublisherId::Source(id), source.clone());
        self.sources.lock().expect("poisoned").insert(id, source.clone());
        self.aggregator.register_source(source.clone());
        id
    }

    /// Registers a sink to be started/stopped with the engine.
    pub fn add_sink(self: &Arc<Self>, sink: Arc<dyn Sink>) -> SinkId {
        let SubscriberId::Sink(id) = sink.subscriber_id() else {
            panic!("Sink::subscriber_id must report SubscriberId::Sink");
        };
        self.subscribers.lock().expect("poisoned").insert(SubscriberId::Sink(id), sink.clone());
        self.sinks.lock().expect("poisoned").insert(id, sink.clone());
        id
    }

    fn publisher(&self, id: PublisherId) -> Option<Arc<dyn Publisher>> {
        if id == PublisherId::Aggregator {
            let aggregator: Arc<dyn Publisher> = self.aggregator.clone();
            Some(aggregator)
        } else {
            self.publishers.lock().expect("poisoned").get(&id).cloned()
        }
    }

    fn subscriber(&self, id: SubscriberId) -> Option<Arc<dyn Subscriber>> {
        if id == SubscriberId::Aggregator {
            let aggregator: Arc<dyn Subscriber> = self.aggregator.clone();
            Some(aggregator)
        } else {
            self.subscribers.lock().expect("poisoned").get(&id).cloned()
        }
    }

    // ---- Publisher-side operations (`Publisher::subscribe`/`unsubscribe`) ----

    /// Performs `subscribe` synchronously and returns its result. Used by the `queued`
    /// wrapper below, and directly by callers that are already running on the
    /// dispatcher thread (e.g. the aggregator's `on_subscribe`).
    pub fn try_subscribe(&self, publisher_id: PublisherId, subscriber_id: SubscriberId, topic: Topic) -> Result<()> {
        let publisher = self.publisher(publisher_id).ok_or(Error::NoSource)?;
        if !publisher.is_publishing(&topic) {
            return Err(Error::NotPublishing { topic });
        }

        let late_joiner_value = {
            let mut subscribers = publisher.publisher_state().subscribers.lock().expect("poisoned");
            subscribers.entry(topic.clone()).or_default().insert(subscriber_id);
            publisher.publisher_state().cache.lock().expect("poisoned").get(&topic).cloned()
        };

        if let Some(value) = late_joiner_value {
            if let Some(subscriber) = self.subscriber(subscriber_id) {
                let mut updates = Updates::new();
                updates.insert(topic.clone(), value);
                self.dispatcher.enqueue(move || subscriber.handle_updates(&updates, publisher_id));
            }
        }

        publisher.on_subscribe(subscriber_id, &topic);
        Ok(())
    }

    /// Fire-and-forget queued form of `try_subscribe`: enqueues the work and logs (but
    /// does not return) any failure.
    pub fn subscribe(self: &Arc<Self>, publisher_id: PublisherId, subscriber_id: SubscriberId, topic: Topic) {
        let engine = self.clone();
        self.dispatcher.enqueue(move || {
            if let Err(error) = engine.try_subscribe(publisher_id, subscriber_id, topic) {
                tracing::error!(%error, "subscribe failed");
            }
        });
    }

    /// Performs `unsubscribe` synchronously. Idempotent: a missing entry is tolerated.
    pub fn try_unsubscribe(&self, publisher_id: PublisherId, subscriber_id: SubscriberId, topic: Topic) -> Result<()> {
        let Some(publisher) = self.publisher(publisher_id) else { return Ok(()) };

        let became_empty = {
            let mut subscribers = publisher.publisher_state().subscribers.lock().expect("poisoned");
            if let Some(set) = subscribers.get_mut(&topic) {
                set.remove(&subscriber_id);
                let empty = set.is_empty();
                if empty {
                    subscribers.remove(&topic);
                }
                empty
            } else {
                false
            }
        };
        let _ = became_empty;

        publisher.on_unsubscribe(subscriber_id, &topic);
        Ok(())
    }

    pub fn unsubscribe(self: &Arc<Self>, publisher_id: PublisherId, subscriber_id: SubscriberId, topic: Topic) {
        let engine = self.clone();
        self.dispatcher.enqueue(move || {
            if let Err(error) = engine.try_unsubscribe(publisher_id, subscriber_id, topic) {
                tracing::error!(%error, "unsubscribe failed");
            }
        });
    }

    /// Merges `updates` into the publisher's cache and broadcasts the *whole* map
    /// (queued) to every subscriber of any of the included topics. Subscribers see
    /// keys they didn't subscribe to and are expected to filter for their own topic
    /// — this is the documented broadcast semantics, not a per-subscriber slice.
    /// Called directly from a publisher's own I/O thread, or from the dispatcher
    /// thread.
    pub fn push_updates(self: &Arc<Self>, publisher_id: PublisherId, updates: Updates) {
        let Some(publisher) = self.publisher(publisher_id) else { return };
        if updates.is_empty() {
            return;
        }

        let mut affected: HashSet<SubscriberId> = HashSet::new();
        {
            let mut cache = publisher.publisher_state().cache.lock().expect("poisoned");
            let subscribers = publisher.publisher_state().subscribers.lock().expect("poisoned");
            for (topic, value) in &updates {
                cache.insert(topic.clone(), value.clone());
                if let Some(subs) = subscribers.get(topic) {
                    affected.extend(subs.iter().copied());
                }
            }
        }

        for subscriber_id in affected {
            self.receive_updates(subscriber_id, updates.clone(), publisher_id);
        }
    }

    /// Evicts every subscriber of `topic` from `publisher_id`, delivering
    /// `receive_unsubscribe` (queued) to each.
    pub fn push_unsubscribe(self: &Arc<Self>, publisher_id: PublisherId, topic: Topic) {
        let Some(publisher) = self.publisher(publisher_id) else { return };
        let evicted = {
            let mut subscribers = publisher.publisher_state().subscribers.lock().expect("poisoned");
            subscribers.remove(&topic).unwrap_or_default()
        };
        for subscriber_id in evicted {
            self.receive_unsubscribe(subscriber_id, topic.clone(), publisher_id);
        }
    }

    // ---- Subscriber-side operations (`Subscriber::subscribe_to`/`unsubscribe_from`) ----

    /// Records the pairing locally, then subscribes to `source` (or the aggregator, if
    /// `source` is `None`). Synchronous form; see `subscribe_to` for the queued,
    /// fire-and-forget entry point.
    pub fn try_subscribe_to(&self, subscriber_id: SubscriberId, topic: Topic, source: Option<PublisherId>) -> Result<()> {
        let publisher_id = source.unwrap_or(PublisherId::Aggregator);
        if source.is_none() && self.publisher(PublisherId::Aggregator).is_none() {
            return Err(Error::NoSource);
        }

        let subscriber = self.subscriber(subscriber_id).ok_or(Error::NoSource)?;
        {
            let mut subscriptions = subscriber.subscriber_state().subscriptions.lock().expect("poisoned");
            subscriptions.entry(topic.clone()).or_default().insert(publisher_id);
        }

        self.try_subscribe(publisher_id, subscriber_id, topic)
    }

    pub fn subscribe_to(self: &Arc<Self>, subscriber_id: SubscriberId, topic: Topic, source: Option<PublisherId>) {
        let engine = self.clone();
        self.dispatcher.enqueue(move || {
            if let Err(error) = engine.try_subscribe_to(subscriber_id, topic, source) {
                tracing::error!(%error, "subscribe_to failed");
            }
        });
    }

    pub fn try_unsubscribe_from(&self, subscriber_id: SubscriberId, topic: Topic, source: PublisherId) -> Result<()> {
        if let Some(subscriber) = self.subscriber(subscriber_id) {
            let mut subscriptions = subscriber.subscriber_state().subscriptions.lock().expect("poisoned");
            if let Some(set) = subscriptions.get_mut(&topic) {
                set.remove(&source);
                if set.is_empty() {
                    subscriptions.remove(&topic);
                }
            }
        }
        self.try_unsubscribe(source, subscriber_id, topic)
    }

    pub fn unsubscribe_from(self: &Arc<Self>, subscriber_id: SubscriberId, topic: Topic, source: PublisherId) {
        let engine = self.clone();
        self.dispatcher.enqueue(move || {
            if let Err(error) = engine.try_unsubscribe_from(subscriber_id, topic, source) {
                tracing::error!(%error, "unsubscribe_from failed");
            }
        });
    }

    /// Queued delivery of a batch of updates to one subscriber. Public so sources whose
    /// delivery bypasses the cache/fan-out machinery (the filesystem watch source) can
    /// still route through the dispatcher's queued-callback contract.
    pub fn receive_updates(self: &Arc<Self>, subscriber_id: SubscriberId, updates: Updates, source: PublisherId) {
        let Some(subscriber) = self.subscriber(subscriber_id) else { return };
        self.dispatcher.enqueue(move || subscriber.handle_updates(&updates, source));
    }

    /// Queued delivery of an unsubscribe notification to one subscriber; also clears
    /// the subscriber-side bookkeeping for the pairing.
    pub fn receive_unsubscribe(self: &Arc<Self>, subscriber_id: SubscriberId, topic: Topic, source: PublisherId) {
        let Some(subscriber) = self.subscriber(subscriber_id) else { return };
        let engine = self.clone();
        self.dispatcher.enqueue(move || {
            {
                let mut subscriptions = subscriber.subscriber_state().subscriptions.lock().expect("poisoned");
                if let Some(set) = subscriptions.get_mut(&topic) {
                    set.remove(&source);
                    if set.is_empty() {
                        subscriptions.remove(&topic);
                    }
                }
            }
            let _ = &engine;
            subscriber.handle_unsubscribe(&topic, source);
        });
    }

    /// Starts every registered source, then every registered sink, then runs the
    /// dispatcher loop until shutdown is requested.
    pub fn run(self: &Arc<Self>) {
        for source in self.sources.lock().expect("poisoned").values() {
            source.start();
        }
        for sink in self.sinks.lock().expect("poisoned").values() {
            sink.start();
        }

        self.dispatcher.run();

        tracing::info!("shutdown requested; stopping sinks");
        for sink in self.sinks.lock().expect("poisoned").values() {
            sink.stop();
        }
        self.dispatcher.drain_pending();

        tracing::info!("stopping sources");
        for source in self.sources.lock().expect("poisoned").values() {
            source.stop();
        }
        self.aggregator.stop();
        self.dispatcher.drain_pending();

        self.dispatcher.close();
    }

    /// Enqueues the shutdown sentinel, causing a running `run()` call to begin the
    /// shutdown cascade.
    pub fn request_shutdown(&self) {
        self.dispatcher.request_shutdown();
    }
}
