// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.
//
// Exercises the engine's invariants directly (late-join replay, idempotent shutdown,
// subscribe/unsubscribe round-tripping) against a pair of minimal in-memory
// source/sink stand-ins, independent of any real OS resource.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brokerd::dispatcher::Dispatcher;
use brokerd::engine::{Engine, Source};
use brokerd::ids::{PublisherId, SourceId, SubscriberId};
use brokerd::publisher::{Publisher, PublisherState};
use brokerd::runnable::{RunState, Runnable};
use brokerd::subscriber::{Subscriber, SubscriberState};
use brokerd::topic::{Topic, Updates, Value};

struct StaticSource {
    id: SourceId,
    state: PublisherState,
    run_state: RunState,
}

impl Runnable for StaticSource {
    fn run_state(&self) -> &RunState { &self.run_state }
}

impl Publisher for StaticSource {
    fn publisher_id(&self) -> PublisherId { PublisherId::Source(self.id) }
    fn publisher_state(&self) -> &PublisherState { &self.state }
    fn publishes(&self, topic: &Topic) -> bool { matches!(topic, Topic::User(name) if name == "greeting") }
}

struct RecordingSink {
    id: brokerd::ids::SinkId,
    state: SubscriberState,
    run_state: RunState,
    received: Mutex<Vec<Updates>>,
    unsubscribed: AtomicUsize,
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

    fn handle_unsubscribe(&self, _topic: &Topic, _source: PublisherId) {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
    }
}

fn start_engine() -> (Arc<Engine>, std::thread::JoinHandle<()>) {
    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);
    let run_engine = engine.clone();
    let handle = std::thread::spawn(move || run_engine.run());
    (engine, handle)
}

#[test]
fn late_joiner_replays_cached_value() {
    let (engine, run_handle) = start_engine();

    let source_id = SourceId::next();
    let source = Arc::new(StaticSource { id: source_id, state: PublisherState::new(), run_state: RunState::new() });
    let source_publisher_id = source.publisher_id();
    let source: Arc<dyn Source> = source;
    engine.add_source(source.clone());

    let topic = Topic::User("greeting".to_string());
    engine.push_updates(source_publisher_id, Updates::from([(topic.clone(), Value::Text("hi".to_string()))]));

    // give the dispatcher a moment to apply the cache write
    std::thread::sleep(Duration::from_millis(50));

    let sink = Arc::new(RecordingSink {
        id: brokerd::ids::SinkId::next(),
        state: SubscriberState::new(),
        run_state: RunState::new(),
        received: Mutex::new(Vec::new()),
        unsubscribed: AtomicUsize::new(0),
    });
    let sink_dyn: Arc<dyn brokerd::engine::Sink> = sink.clone();
    engine.add_sink(sink_dyn);

    engine.try_subscribe_to(sink.subscriber_id(), topic.clone(), Some(source_publisher_id)).expect("subscribe");
    std::thread::sleep(Duration::from_millis(50));

    {
        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 1, "expected exactly one late-join replay");
        match received[0].get(&topic) {
            Some(Value::Text(text)) => assert_eq!(text, "hi"),
            other => panic!("unexpected cached value: {other:?}"),
        }
    }

    engine.push_unsubscribe(source_publisher_id, topic.clone());
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.unsubscribed.load(Ordering::SeqCst), 1);

    engine.request_shutdown();
    run_handle.join().unwrap();
}

#[test]
fn idempotent_shutdown_via_runnable() {
    let run_state = RunState::new();
    struct Noop(RunState);
    impl Runnable for Noop {
        fn run_state(&self) -> &RunState { &self.0 }
    }
    let noop = Noop(run_state);
    assert!(noop.start());
    assert!(!noop.start());
    assert!(noop.stop());
    assert!(!noop.stop());
}
