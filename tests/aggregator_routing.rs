// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.
//
// Exercises the aggregator's source-selection invariant: when multiple sources are
// registered but only one actually publishes a given topic, subscribing through the
// aggregator (source = None) must land on that one source, never the others.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use brokerd::dispatcher::Dispatcher;
use brokerd::engine::{Engine, Source};
use brokerd::ids::{PublisherId, SourceId, SubscriberId};
use brokerd::publisher::{Publisher, PublisherState};
use brokerd::runnable::{RunState, Runnable};
use brokerd::subscriber::{Subscriber, SubscriberState};
use brokerd::topic::{Topic, Updates};

/// A source that only ever claims the one topic it was built with.
struct StaticSource {
    id: SourceId,
    state: PublisherState,
    run_state: RunState,
    claims: Topic,
}

impl Runnable for StaticSource {
    fn run_state(&self) -> &RunState { &self.run_state }
}

impl Publisher for StaticSource {
    fn publisher_id(&self) -> PublisherId { PublisherId::Source(self.id) }
    fn publisher_state(&self) -> &PublisherState { &self.state }
    fn publishes(&self, topic: &Topic) -> bool { *topic == self.claims }
}

struct RecordingSink {
    id: brokerd::ids::SinkId,
    state: SubscriberState,
    run_state: RunState,
    received: Mutex<Vec<Updates>>,
}

impl Runnable for RecordingSink {
    fn run_state(&self) -> &RunState { &self.run_state }
}

impl Subscriber for RecordingSink {
    fn subscriber_id(&self) -> SubscriberId { SubscriberId::Sink(self.id) }
    fn subscriber_state(&self) -> &SubscriberState { &self.state }

    fn handle_updates(&self, updates: &Updates, _source: PublisherId) {
        self.received.lock().unwrap().push(updates.clone());
    }

    fn handle_unsubscribe(&self, _topic: &Topic, _source: PublisherId) {}
}

#[test]
fn aggregator_routes_to_the_single_publishing_source() {
    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);
    let run_engine = engine.clone();
    let run_handle = std::thread::spawn(move || run_engine.run());

    let topic = Topic::User("greeting".to_string());

    let s1 = Arc::new(StaticSource {
        id: SourceId::next(),
        state: PublisherState::new(),
        run_state: RunState::new(),
        claims: Topic::User("unrelated".to_string()),
    });
    let s1_id = s1.publisher_id();
    let s1_dyn: Arc<dyn Source> = s1;
    engine.add_source(s1_dyn);

    let s2 = Arc::new(StaticSource {
        id: SourceId::next(),
        state: PublisherState::new(),
        run_state: RunState::new(),
        claims: topic.clone(),
    });
    let s2_id = s2.publisher_id();
    let s2_dyn: Arc<dyn Source> = s2;
    engine.add_source(s2_dyn);

    let sink = Arc::new(RecordingSink {
        id: brokerd::ids::SinkId::next(),
        state: SubscriberState::new(),
        run_state: RunState::new(),
        received: Mutex::new(Vec::new()),
    });
    let sink_dyn: Arc<dyn brokerd::engine::Sink> = sink.clone();
    engine.add_sink(sink_dyn);

    engine.try_subscribe_to(sink.subscriber_id(), topic.clone(), None).expect("subscribe through aggregator");
    std::thread::sleep(Duration::from_millis(100));

    let aggregator_subscriptions = engine.aggregator().subscriber_state().all_subscriptions();
    assert_eq!(aggregator_subscriptions, vec![(topic, s2_id)]);
    assert_ne!(s2_id, s1_id, "sanity: the two sources must be distinct");

    engine.request_shutdown();
    run_handle.join().unwrap();
}
