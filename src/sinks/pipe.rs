// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! `PipeSink`: a `ReaderSink` specialization that owns a child process. On upstream
//! EOF (the child exiting) it either relaunches the child, budget permitting, or
//! propagates shutdown like a plain `ReaderSink`.
//!
//! Supplements the distilled spec per the original's `PipeSink`/`Subprocess` (see
//! DESIGN.md).

use std::sync::Mutex;
use std::sync::Arc;

use crate::engine::{Engine, EngineHandle};
use crate::error::Error;
use crate::ids::{HandleId, PublisherId, SinkId, SubscriberId};
use crate::publisher::Publisher;
use crate::runnable::{RunState, Runnable};
use crate::sources::descriptor::DescriptorSource;
use crate::subprocess::{RestartOutcome, Subprocess};
use crate::subscriber::{Subscriber, SubscriberState};
use crate::topic::{Topic, Updates};

struct Inner {
    id: SinkId,
    subscriber_state: SubscriberState,
    run_state: RunState,
    engine: EngineHandle,
    descriptor_source: DescriptorSource,
    subprocess: Mutex<Subprocess>,
    handle_id: Mutex<Option<HandleId>>,
    on_line: Box<dyn Fn(&str) + Send + Sync>,
}

#[derive(Clone)]
pub struct PipeSink(Arc<Inner>);

impl std::fmt::Debug for PipeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSink").field("id", &self.0.id).finish()
    }
}

impl PipeSink {
    pub fn new(descriptor_source: DescriptorSource, subprocess: Subprocess, on_line: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(Inner {
            id: SinkId::next(),
            subscriber_state: SubscriberState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            descriptor_source,
            subprocess: Mutex::new(subprocess),
            handle_id: Mutex::new(None),
            on_line: Box::new(on_line),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<Engine>) {
        self.0.engine.bind(engine);
    }

    /// Registers the already-spawned child's stdout with the descriptor source and
    /// subscribes to it. Assumes `subprocess.spawn()` (or `try_restart`, which spawns
    /// internally) already ran.
    fn register_stdout(&self) {
        let mut subprocess = self.0.subprocess.lock().expect("poisoned");
        let Some(stdout) = subprocess.take_stdout() else {
            tracing::error!(command = %subprocess.cmd, "subprocess has no stdout pipe to register");
            return;
        };
        drop(subprocess);

        let handle_id = self.0.descriptor_source.add_handle(stdout);
        *self.0.handle_id.lock().expect("poisoned") = Some(handle_id);

        let engine = self.0.engine.engine();
        let source = self.0.descriptor_source.publisher_id();
        engine.subscribe_to(SubscriberId::Sink(self.0.id), Topic::Handle(handle_id), Some(source));
    }
}

impl Runnable for PipeSink {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let mut subprocess = self.0.subprocess.lock().expect("poisoned");
        let command = subprocess.cmd.clone();
        if let Err(source) = subprocess.spawn() {
            drop(subprocess);
            let error = Error::Io { context: format!("failed to spawn subprocess `{command}`"), source };
            tracing::error!(%error);
            return;
        }
        drop(subprocess);
        self.register_stdout();
    }

    fn on_stop(&self) {
        self.0.subprocess.lock().expect("poisoned").kill();
        if let Some(handle_id) = self.0.handle_id.lock().expect("poisoned").take() {
            self.0.descriptor_source.remove_handle(handle_id);
            let engine = self.0.engine.engine();
            let source = self.0.descriptor_source.publisher_id();
            engine.unsubscribe_from(SubscriberId::Sink(self.0.id), Topic::Handle(handle_id), source);
        }
    }
}

impl Subscriber for PipeSink {
    fn subscriber_id(&self) -> SubscriberId { SubscriberId::Sink(self.0.id) }
    fn subscriber_state(&self) -> &SubscriberState { &self.0.subscriber_state }

    fn handle_updates(&self, updates: &Updates, _source: PublisherId) {
        let Some(handle_id) = *self.0.handle_id.lock().expect("poisoned") else { return };
        if let Some(crate::topic::Value::Text(line)) = updates.get(&Topic::Handle(handle_id)) {
            (self.0.on_line)(line);
        }
    }

    fn handle_unsubscribe(&self, _topic: &Topic, _source: PublisherId) {
        self.0.handle_id.lock().expect("poisoned").take();

        let mut subprocess = self.0.subprocess.lock().expect("poisoned");
        let command = subprocess.cmd.clone();
        let outcome = subprocess.try_restart();
        drop(subprocess);

        match outcome {
            Ok(RestartOutcome::Restarted) => self.register_stdout(),
            Ok(RestartOutcome::Disabled) => {
                self.stop();
            }
            Ok(RestartOutcome::BudgetExhausted { attempts }) => {
                let error = Error::RestartBudgetExhausted { command, attempts };
                tracing::error!(%error);
                self.stop();
            }
            Err(source) => {
                let error = Error::Io { context: format!("failed to restart subprocess `{command}`"), source };
                tracing::error!(%error);
                self.stop();
            }
        }
    }
}
