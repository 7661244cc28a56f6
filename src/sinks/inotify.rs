// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! `InotifySink`: binds to an explicit list of `{path, mask}` watches drawn from the
//! filesystem watch source, relaying each matching event to a handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{Engine, EngineHandle};
use crate::ids::{PublisherId, SinkId, SubscriberId};
use crate::publisher::Publisher;
use crate::runnable::{RunState, Runnable};
use crate::sources::fswatch::FsWatchSource;
use crate::subscriber::{Subscriber, SubscriberState};
use crate::topic::{FsEventKind, Topic, Updates, WatchMask};

/// What an `InotifySink` does when one of its watched paths changes.
pub trait InotifyHandler: Send + Sync {
    fn file_changed(&self, path: &Path, kind: FsEventKind);
}

struct Inner {
    id: SinkId,
    subscriber_state: SubscriberState,
    run_state: RunState,
    engine: EngineHandle,
    fswatch_source: FsWatchSource,
    watches: Vec<(PathBuf, WatchMask)>,
    handler: Box<dyn InotifyHandler>,
}

#[derive(Clone)]
pub struct InotifySink(Arc<Inner>);

impl std::fmt::Debug for InotifySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InotifySink").field("id", &self.0.id).field("watches", &self.0.watches).finish()
    }
}

impl InotifySink {
    pub fn new(fswatch_source: FsWatchSource, watches: Vec<(PathBuf, WatchMask)>, handler: impl InotifyHandler + 'static) -> Self {
        Self(Arc::new(Inner {
            id: SinkId::next(),
            subscriber_state: SubscriberState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            fswatch_source,
            watches,
            handler: Box::new(handler),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<Engine>) {
        self.0.engine.bind(engine);
    }
}

impl Runnable for InotifySink {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let engine = self.0.engine.engine();
        let source = self.0.fswatch_source.publisher_id();
        for (path, mask) in &self.0.watches {
            engine.subscribe_to(SubscriberId::Sink(self.0.id), Topic::Watch { path: path.clone(), mask: *mask }, Some(source));
        }
    }

    fn on_stop(&self) {
        let engine = self.0.engine.engine();
        let source = self.0.fswatch_source.publisher_id();
        for (path, mask) in &self.0.watches {
            engine.unsubscribe_from(SubscriberId::Sink(self.0.id), Topic::Watch { path: path.clone(), mask: *mask }, source);
        }
    }
}

impl Subscriber for InotifySink {
    fn subscriber_id(&self) -> SubscriberId { SubscriberId::Sink(self.0.id) }
    fn subscriber_state(&self) -> &SubscriberState { &self.0.subscriber_state }

    fn handle_updates(&self, updates: &Updates, _source: PublisherId) {
        for (topic, value) in updates {
            if let (Topic::Watch { path, .. }, crate::topic::Value::FsEvent(kind)) = (topic, value) {
                self.0.handler.file_changed(path, *kind);
            }
        }
    }

    fn handle_unsubscribe(&self, _topic: &Topic, _source: PublisherId) {}
}
