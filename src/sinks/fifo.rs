// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! `FifoSink`: a `ReaderSink` specialization bound to a named pipe on disk rather than
//! a handle supplied by the caller. Unlike a plain descriptor, a FIFO's writer can
//! close and reopen many times over the life of the daemon, so EOF here means "wait
//! for the next writer", not "this sink is done" (see DESIGN.md).

use std::fs::OpenOptions;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::engine::{Engine, EngineHandle};
use crate::error::Error;
use crate::ids::{HandleId, PublisherId, SinkId, SubscriberId};
use crate::publisher::Publisher;
use crate::runnable::{RunState, Runnable};
use crate::sources::descriptor::DescriptorSource;
use crate::subscriber::{Subscriber, SubscriberState};
use crate::topic::{Topic, Updates};

struct Inner {
    id: SinkId,
    subscriber_state: SubscriberState,
    run_state: RunState,
    engine: EngineHandle,
    descriptor_source: DescriptorSource,
    path: PathBuf,
    create: bool,
    handle_id: Mutex<Option<HandleId>>,
    on_line: Box<dyn Fn(&str) + Send + Sync>,
}

#[derive(Clone)]
pub struct FifoSink(Arc<Inner>);

impl std::fmt::Debug for FifoSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoSink").field("id", &self.0.id).field("path", &self.0.path).finish()
    }
}

impl FifoSink {
    pub fn new(
        descriptor_source: DescriptorSource,
        path: PathBuf,
        create: bool,
        on_line: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(Inner {
            id: SinkId::next(),
            subscriber_state: SubscriberState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            descriptor_source,
            path,
            create,
            handle_id: Mutex::new(None),
            on_line: Box::new(on_line),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<Engine>) {
        self.0.engine.bind(engine);
    }

    /// Whether `path` currently exists and is a FIFO special file.
    #[must_use]
    pub fn can_publish(&self) -> bool {
        std::fs::metadata(&self.0.path).is_ok_and(|meta| meta.file_type().is_fifo())
    }

    fn ensure_fifo(&self) -> std::io::Result<()> {
        if std::fs::metadata(&self.0.path).is_ok() {
            return Ok(());
        }
        if !self.0.create {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "fifo path does not exist"));
        }
        let c_path = std::ffi::CString::new(self.0.path.as_os_str().as_encoded_bytes())
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the duration of this call.
        let result = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn reopen(&self) {
        if let Err(source) = self.ensure_fifo() {
            let error = Error::Io { context: format!("failed to create fifo at {}", self.0.path.display()), source };
            tracing::error!(%error);
            return;
        }
        let file = OpenOptions::new().read(true).custom_flags(libc::O_NONBLOCK).open(&self.0.path);
        let file = match file {
            Ok(file) => file,
            Err(source) => {
                let error = Error::Io { context: format!("failed to open fifo at {}", self.0.path.display()), source };
                tracing::error!(%error);
                return;
            }
        };

        let handle_id = self.0.descriptor_source.add_handle(file);
        *self.0.handle_id.lock().expect("poisoned") = Some(handle_id);

        let engine = self.0.engine.engine();
        let source = self.0.descriptor_source.publisher_id();
        engine.subscribe_to(SubscriberId::Sink(self.0.id), Topic::Handle(handle_id), Some(source));
    }
}

impl Runnable for FifoSink {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) { self.reopen(); }

    fn on_stop(&self) {
        if let Some(handle_id) = self.0.handle_id.lock().expect("poisoned").take() {
            self.0.descriptor_source.remove_handle(handle_id);
            let engine = self.0.engine.engine();
            let source = self.0.descriptor_source.publisher_id();
            engine.unsubscribe_from(SubscriberId::Sink(self.0.id), Topic::Handle(handle_id), source);
        }
    }
}

impl Subscriber for FifoSink {
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
        if self.is_running() {
            self.reopen();
        }
    }
}
