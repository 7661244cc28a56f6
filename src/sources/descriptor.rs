// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The descriptor (line-oriented byte stream) source.
//!
//! Shaped after the teacher's resilient-reactor-thread pattern: one dedicated thread
//! blocks in `mio::Poll::poll`, woken on demand by a `mio::Waker` whenever a handle is
//! added or removed, or when the source is asked to stop. Unlike the teacher's
//! `tokio::sync::broadcast`-based workers, delivery here goes through the engine's
//! push/cache contract instead of a broadcast channel, since this source has exactly
//! one logical publisher identity rather than many independent listeners.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::engine::EngineHandle;
use crate::ids::{HandleId, PublisherId, SourceId};
use crate::publisher::{Publisher, PublisherState};
use crate::runnable::{RunState, Runnable};
use crate::topic::{Topic, Updates, Value};

const WAKE_TOKEN: Token = Token(0);

/// Anything the descriptor source can read lines from and poll with `mio`: an open
/// file, a FIFO, a child's stdout.
pub trait FdRead: Read + AsRawFd + Send {}
impl<T: Read + AsRawFd + Send> FdRead for T {}

impl AsRawFd for Box<dyn FdRead> {
    fn as_raw_fd(&self) -> RawFd { (**self).as_raw_fd() }
}

enum ControlOp {
    Add(HandleId, Box<dyn FdRead>),
    Remove(HandleId),
}

struct OpenHandle {
    token: Token,
    reader: BufReader<Box<dyn FdRead>>,
}

struct Inner {
    id: SourceId,
    publisher_state: PublisherState,
    run_state: RunState,
    engine: EngineHandle,
    waker: Mutex<Option<Arc<Waker>>>,
    control: Mutex<Vec<ControlOp>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Publishes `Topic::Handle(h)` for every handle registered via `add_handle`. Cheap to
/// clone (an `Arc` underneath), so the worker thread can hold a `'static` handle back
/// to the same state the public API mutates.
#[derive(Clone)]
pub struct DescriptorSource(Arc<Inner>);

impl std::fmt::Debug for DescriptorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSource").field("id", &self.0.id).finish()
    }
}

impl DescriptorSource {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            id: SourceId::next(),
            publisher_state: PublisherState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            waker: Mutex::new(None),
            control: Mutex::new(Vec::new()),
            join: Mutex::new(None),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<crate::engine::Engine>) {
        self.0.engine.bind(engine);
    }

    /// Registers a new handle to read lines from. Takes effect on the poller's next
    /// wake, at which point the source starts publishing `Topic::Handle(id)`.
    pub fn add_handle(&self, handle: impl FdRead + 'static) -> HandleId {
        let id = HandleId::next();
        set_nonblocking(handle.as_raw_fd()).ok();
        self.0.control.lock().expect("poisoned").push(ControlOp::Add(id, Box::new(handle)));
        self.wake();
        id
    }

    /// Deregisters a handle; takes effect on the poller's next wake.
    pub fn remove_handle(&self, id: HandleId) {
        self.0.control.lock().expect("poisoned").push(ControlOp::Remove(id));
        self.wake();
    }

    fn wake(&self) {
        if let Some(waker) = self.0.waker.lock().expect("poisoned").as_ref() {
            let _ = waker.wake();
        }
    }

    fn worker_loop(self, mut poll: Poll, waker: Arc<Waker>) {
        *self.0.waker.lock().expect("poisoned") = Some(waker);

        let mut events = Events::with_capacity(128);
        let mut open: HashMap<HandleId, OpenHandle> = HashMap::new();
        let mut tokens: HashMap<Token, HandleId> = HashMap::new();
        let mut next_token = 1usize;

        'outer: loop {
            if let Err(error) = poll.poll(&mut events, None) {
                if error.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(%error, "descriptor source poll failed");
                break;
            }

            if !self.0.run_state.is_running() {
                break;
            }

            let mut to_remove = Vec::new();

            for event in &events {
                if event.token() == WAKE_TOKEN {
                    for op in self.0.control.lock().expect("poisoned").drain(..) {
                        match op {
                            ControlOp::Add(id, handle) => {
                                let raw_fd = handle.as_raw_fd();
                                let token = Token(next_token);
                                next_token += 1;
                                if let Err(error) =
                                    poll.registry().register(&mut SourceFd(&raw_fd), token, Interest::READABLE)
                                {
                                    tracing::error!(%error, "failed to register handle with poller");
                                    continue;
                                }
                                tokens.insert(token, id);
                                open.insert(id, OpenHandle { token, reader: BufReader::new(handle) });
                            }
                            ControlOp::Remove(id) => {
                                if let Some(entry) = open.remove(&id) {
                                    let raw_fd = entry.reader.get_ref().as_raw_fd();
                                    let _ = poll.registry().deregister(&mut SourceFd(&raw_fd));
                                    tokens.remove(&entry.token);
                                }
                            }
                        }
                    }
                    if !self.0.run_state.is_running() {
                        break 'outer;
                    }
                    continue;
                }

                let Some(&handle_id) = tokens.get(&event.token()) else { continue };
                let Some(entry) = open.get_mut(&handle_id) else { continue };

                loop {
                    let mut line = String::new();
                    match entry.reader.read_line(&mut line) {
                        Ok(0) => {
                            to_remove.push(handle_id);
                            break;
                        }
                        Ok(_) => {
                            let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
                            // Each line is its own update: a shared batch keyed by handle would
                            // let a second line from the same handle clobber the first.
                            let engine = self.0.engine.engine();
                            engine.push_updates(
                                PublisherId::Source(self.0.id),
                                Updates::from([(Topic::Handle(handle_id), Value::Text(trimmed.to_string()))]),
                            );
                        }
                        Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                        Err(error) => {
                            tracing::warn!(%error, "error reading handle; treating as eof");
                            to_remove.push(handle_id);
                            break;
                        }
                    }
                }
            }

            for handle_id in to_remove {
                if let Some(entry) = open.remove(&handle_id) {
                    let raw_fd = entry.reader.get_ref().as_raw_fd();
                    let _ = poll.registry().deregister(&mut SourceFd(&raw_fd));
                    tokens.remove(&entry.token);
                }
                let engine = self.0.engine.engine();
                engine.push_unsubscribe(PublisherId::Source(self.0.id), Topic::Handle(handle_id));
            }
        }
    }
}

impl Default for DescriptorSource {
    fn default() -> Self { Self::new() }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is a valid, open descriptor for the lifetime of this call; fcntl
    // with F_GETFL/F_SETFL never retains it past return.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl Runnable for DescriptorSource {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let poll = match Poll::new() {
            Ok(p) => p,
            Err(error) => {
                tracing::error!(%error, "failed to create poller; descriptor source disabled");
                return;
            }
        };
        let waker = match Waker::new(poll.registry(), WAKE_TOKEN) {
            Ok(w) => Arc::new(w),
            Err(error) => {
                tracing::error!(%error, "failed to create waker; descriptor source disabled");
                return;
            }
        };

        let worker = self.clone();
        let waker_clone = waker.clone();
        let handle = std::thread::Builder::new()
            .name("descriptor-source".into())
            .spawn(move || worker.worker_loop(poll, waker_clone))
            .expect("failed to spawn descriptor source thread");
        *self.0.join.lock().expect("poisoned") = Some(handle);
    }

    fn on_stop(&self) {
        self.wake();
        if let Some(handle) = self.0.join.lock().expect("poisoned").take() {
            if handle.join().is_err() {
                tracing::error!("descriptor source thread panicked");
            }
        }
    }
}

impl Publisher for DescriptorSource {
    fn publisher_id(&self) -> PublisherId { PublisherId::Source(self.0.id) }
    fn publisher_state(&self) -> &PublisherState { &self.0.publisher_state }
    fn publishes(&self, topic: &Topic) -> bool { matches!(topic, Topic::Handle(_)) }
}
