// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The filesystem watch source, backed by the `notify` crate (inotify on Linux).
//!
//! Delivery here deliberately bypasses `Engine::push_updates`: a filesystem event is
//! routed straight to the specific subscriber that registered the matching
//! `(path, mask)` watch, with no cache entry and no broadcast to other subscribers of
//! the same watch. Two sinks watching the same path each get their own delivery.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::engine::EngineHandle;
use crate::error::Error;
use crate::ids::{PublisherId, SourceId, SubscriberId};
use crate::publisher::{Publisher, PublisherState};
use crate::runnable::{RunState, Runnable};
use crate::topic::{FsEventKind, Topic, Updates, Value, WatchMask};

struct Inner {
    id: SourceId,
    publisher_state: PublisherState,
    run_state: RunState,
    engine: EngineHandle,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watch_table: Mutex<HashMap<PathBuf, Vec<(SubscriberId, WatchMask)>>>,
}

/// Publishes `Topic::Watch { path, mask }` for any path a sink asks to watch.
#[derive(Clone)]
pub struct FsWatchSource(Arc<Inner>);

impl std::fmt::Debug for FsWatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatchSource").field("id", &self.0.id).finish()
    }
}

impl FsWatchSource {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            id: SourceId::next(),
            publisher_state: PublisherState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            watcher: Mutex::new(None),
            watch_table: Mutex::new(HashMap::new()),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<crate::engine::Engine>) {
        self.0.engine.bind(engine);
    }

    fn handle_event(&self, event: Event) {
        let Some(kind) = classify(event.kind) else { return };

        let table = self.0.watch_table.lock().expect("poisoned");
        for path in &event.paths {
            let Some(watchers) = table.get(path) else { continue };
            for &(subscriber_id, mask) in watchers {
                if !mask.matches(kind) {
                    continue;
                }
                let engine = self.0.engine.engine();
                let mut updates = Updates::new();
                updates.insert(Topic::Watch { path: path.clone(), mask }, Value::FsEvent(kind));
                engine.receive_updates(subscriber_id, updates, PublisherId::Source(self.0.id));
            }
        }
    }

    fn add_watch(&self, path: &Path, subscriber_id: SubscriberId, mask: WatchMask) {
        let mut table = self.0.watch_table.lock().expect("poisoned");
        let first_watcher_of_path = !table.contains_key(path);
        table.entry(path.to_path_buf()).or_default().push((subscriber_id, mask));
        drop(table);

        if first_watcher_of_path {
            if let Some(watcher) = self.0.watcher.lock().expect("poisoned").as_mut() {
                if let Err(source) = watcher.watch(path, RecursiveMode::NonRecursive) {
                    let error = Error::Watch { path: path.to_path_buf(), source };
                    tracing::error!(%error, "failed to install filesystem watch");
                }
            }
        }
    }

    fn remove_watch(&self, path: &Path, subscriber_id: SubscriberId) {
        let mut table = self.0.watch_table.lock().expect("poisoned");
        let Some(watchers) = table.get_mut(path) else { return };
        watchers.retain(|(id, _)| *id != subscriber_id);
        let now_empty = watchers.is_empty();
        if now_empty {
            table.remove(path);
        }
        drop(table);

        if now_empty {
            if let Some(watcher) = self.0.watcher.lock().expect("poisoned").as_mut() {
                if let Err(source) = watcher.unwatch(path) {
                    let error = Error::Watch { path: path.to_path_buf(), source };
                    tracing::trace!(%error, "unwatch failed (already removed?)");
                }
            }
        }
    }
}

impl Default for FsWatchSource {
    fn default() -> Self { Self::new() }
}

fn classify(kind: EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Create),
        EventKind::Modify(_) => Some(FsEventKind::Modify),
        EventKind::Remove(_) => Some(FsEventKind::Remove),
        _ => None,
    }
}

impl Runnable for FsWatchSource {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let this = self.clone();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => this.handle_event(event),
            Err(error) => tracing::warn!(%error, "filesystem watcher error"),
        });
        match watcher {
            Ok(watcher) => *self.0.watcher.lock().expect("poisoned") = Some(watcher),
            Err(source) => {
                let error = Error::Watch { path: PathBuf::new(), source };
                tracing::error!(%error, "failed to start filesystem watcher");
            }
        }
    }

    fn on_stop(&self) {
        *self.0.watcher.lock().expect("poisoned") = None;
        self.0.watch_table.lock().expect("poisoned").clear();
    }
}

impl Publisher for FsWatchSource {
    fn publisher_id(&self) -> PublisherId { PublisherId::Source(self.0.id) }
    fn publisher_state(&self) -> &PublisherState { &self.0.publisher_state }
    fn publishes(&self, topic: &Topic) -> bool { matches!(topic, Topic::Watch { .. }) }

    fn on_subscribe(&self, subscriber: SubscriberId, topic: &Topic) {
        if let Topic::Watch { path, mask } = topic {
            self.add_watch(path, subscriber, *mask);
        }
    }

    fn on_unsubscribe(&self, subscriber: SubscriberId, topic: &Topic) {
        if let Topic::Watch { path, .. } = topic {
            self.remove_watch(path, subscriber);
        }
    }
}
