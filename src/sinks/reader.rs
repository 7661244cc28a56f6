// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! `ReaderSink`: binds to a single byte-stream handle drawn from the descriptor
//! source. Upstream EOF (delivered as an unsubscribe) propagates as this sink
//! stopping itself.

use std::sync::{Arc, Mutex};

use crate::engine::{Engine, EngineHandle};
use crate::ids::{HandleId, PublisherId, SinkId, SubscriberId};
use crate::publisher::Publisher;
use crate::runnable::{RunState, Runnable};
use crate::sources::descriptor::{DescriptorSource, FdRead};
use crate::subscriber::{Subscriber, SubscriberState};
use crate::topic::{Topic, Updates};

enum HandleSlot {
    Pending(Box<dyn FdRead>),
    Registered(HandleId),
    Stopped,
}

struct Inner {
    id: SinkId,
    subscriber_state: SubscriberState,
    run_state: RunState,
    engine: EngineHandle,
    descriptor_source: DescriptorSource,
    handle: Mutex<HandleSlot>,
    on_line: Box<dyn Fn(&str) + Send + Sync>,
}

/// Calls `on_line` for every line read from `handle`, and stops itself when the
/// handle reaches EOF.
#[derive(Clone)]
pub struct ReaderSink(Arc<Inner>);

impl std::fmt::Debug for ReaderSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSink").field("id", &self.0.id).finish()
    }
}

impl ReaderSink {
    pub fn new(
        descriptor_source: DescriptorSource,
        handle: impl FdRead + 'static,
        on_line: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(Inner {
            id: SinkId::next(),
            subscriber_state: SubscriberState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            descriptor_source,
            handle: Mutex::new(HandleSlot::Pending(Box::new(handle))),
            on_line: Box::new(on_line),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<Engine>) {
        self.0.engine.bind(engine);
    }
}

impl Runnable for ReaderSink {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let mut slot = self.0.handle.lock().expect("poisoned");
        let HandleSlot::Pending(_) = &*slot else { return };
        let HandleSlot::Pending(handle) = std::mem::replace(&mut *slot, HandleSlot::Stopped) else { unreachable!() };
        let handle_id = self.0.descriptor_source.add_handle(handle);
        *slot = HandleSlot::Registered(handle_id);
        drop(slot);

        let engine = self.0.engine.engine();
        let source = self.0.descriptor_source.publisher_id();
        engine.subscribe_to(SubscriberId::Sink(self.0.id), Topic::Handle(handle_id), Some(source));
    }

    fn on_stop(&self) {
        let mut slot = self.0.handle.lock().expect("poisoned");
        let HandleSlot::Registered(handle_id) = *slot else { return };
        *slot = HandleSlot::Stopped;
        drop(slot);

        self.0.descriptor_source.remove_handle(handle_id);
        let engine = self.0.engine.engine();
        let source = self.0.descriptor_source.publisher_id();
        engine.unsubscribe_from(SubscriberId::Sink(self.0.id), Topic::Handle(handle_id), source);
    }
}

impl Subscriber for ReaderSink {
    fn subscriber_id(&self) -> SubscriberId { SubscriberId::Sink(self.0.id) }
    fn subscriber_state(&self) -> &SubscriberState { &self.0.subscriber_state }

    fn handle_updates(&self, updates: &Updates, _source: PublisherId) {
        let HandleSlot::Registered(handle_id) = *self.0.handle.lock().expect("poisoned") else { return };
        if let Some(crate::topic::Value::Text(line)) = updates.get(&Topic::Handle(handle_id)) {
            (self.0.on_line)(line);
        }
    }

    fn handle_unsubscribe(&self, _topic: &Topic, _source: PublisherId) {
        self.stop();
    }
}
