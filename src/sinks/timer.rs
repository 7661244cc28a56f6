// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! `TimerSink`: binds to one `(MIN_INTERVAL, MAX_INTERVAL)` schedule, calling `tick()`
//! on every wake.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Engine, EngineHandle};
use crate::ids::{PublisherId, SinkId, SubscriberId};
use crate::publisher::Publisher;
use crate::runnable::{RunState, Runnable};
use crate::sources::timer::TimerSource;
use crate::subscriber::{Subscriber, SubscriberState};
use crate::topic::{Topic, Updates};

/// What a `TimerSink` does on every wake.
pub trait TimerHandler: Send + Sync {
    fn tick(&self);
}

struct Inner {
    id: SinkId,
    subscriber_state: SubscriberState,
    run_state: RunState,
    engine: EngineHandle,
    timer_source: TimerSource,
    min_interval: Duration,
    max_interval: Duration,
    handler: Box<dyn TimerHandler>,
}

#[derive(Clone)]
pub struct TimerSink(Arc<Inner>);

impl std::fmt::Debug for TimerSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSink")
            .field("id", &self.0.id)
            .field("min_interval", &self.0.min_interval)
            .field("max_interval", &self.0.max_interval)
            .finish()
    }
}

impl TimerSink {
    pub fn new(timer_source: TimerSource, min_interval: Duration, max_interval: Duration, handler: impl TimerHandler + 'static) -> Self {
        Self(Arc::new(Inner {
            id: SinkId::next(),
            subscriber_state: SubscriberState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            timer_source,
            min_interval,
            max_interval,
            handler: Box::new(handler),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<Engine>) {
        self.0.engine.bind(engine);
    }

    fn topic(&self) -> Topic {
        Topic::Timer { early: self.0.min_interval, late: self.0.max_interval }
    }
}

impl Runnable for TimerSink {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let engine = self.0.engine.engine();
        let source = self.0.timer_source.publisher_id();
        engine.subscribe_to(SubscriberId::Sink(self.0.id), self.topic(), Some(source));
    }

    fn on_stop(&self) {
        let engine = self.0.engine.engine();
        let source = self.0.timer_source.publisher_id();
        engine.unsubscribe_from(SubscriberId::Sink(self.0.id), self.topic(), source);
    }
}

impl Subscriber for TimerSink {
    fn subscriber_id(&self) -> SubscriberId { SubscriberId::Sink(self.0.id) }
    fn subscriber_state(&self) -> &SubscriberState { &self.0.subscriber_state }

    fn handle_updates(&self, updates: &Updates, _source: PublisherId) {
        if updates.contains_key(&self.topic()) {
            self.0.handler.tick();
        }
    }

    fn handle_unsubscribe(&self, _topic: &Topic, _source: PublisherId) {}
}
