// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The single-threaded cooperative task queue every publisher/subscriber mutation runs
//! through.
//!
//! Grounded on the teacher's resilient-reactor-thread pattern (a dedicated thread that
//! owns state and is only ever talked to through a channel), simplified here to a
//! plain FIFO queue instead of a broadcast channel: this engine has exactly one
//! consumer thread, not many.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// A unit of work enqueued onto the dispatcher.
enum Task {
    Call(Box<dyn FnOnce() + Send>),
    Shutdown,
}

/// Owns the task queue. Cheap to clone-share via `Arc`; every source/sink constructor
/// takes one so it can enqueue callbacks instead of mutating shared state directly.
pub struct Dispatcher {
    sender: Sender<Task>,
    receiver: Mutex<Receiver<Task>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("closed", &self.closed.load(Ordering::Relaxed)).finish()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver: Mutex::new(receiver), closed: AtomicBool::new(false) }
    }

    /// Enqueues `task` to run later on the dispatcher thread. Returns immediately.
    ///
    /// Once the dispatcher has been closed (past the final shutdown drain) this logs
    /// and silently drops the task instead of erroring, matching the "no one is left to
    /// observe the failure" nature of post-shutdown work.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            tracing::warn!("dispatcher closed; dropping enqueued task");
            return;
        }
        if self.sender.send(Task::Call(Box::new(task))).is_err() {
            tracing::warn!("dispatcher channel gone; dropping enqueued task");
        }
    }

    /// Enqueues the sentinel that causes a running `run()` call to return.
    pub fn request_shutdown(&self) {
        let _ = self.sender.send(Task::Shutdown);
    }

    /// Blocks the calling thread, draining tasks one at a time in FIFO order, until a
    /// shutdown sentinel is received or the channel is abandoned.
    ///
    /// Panics unwinding out of a task are caught, logged, and swallowed: a buggy
    /// sink/subscriber callback never brings the dispatcher down.
    pub fn run(&self) {
        let receiver = self.receiver.lock().expect("dispatcher receiver poisoned");
        loop {
            match receiver.recv() {
                Ok(Task::Call(f)) => Self::run_task(f),
                Ok(Task::Shutdown) | Err(_) => break,
            }
        }
    }

    /// Runs every task currently sitting in the queue without blocking for more. Used
    /// during the shutdown cascade so unsubscribe fallout from stopping sinks/sources
    /// gets a chance to execute before the process exits.
    pub fn drain_pending(&self) {
        let receiver = self.receiver.lock().expect("dispatcher receiver poisoned");
        while let Ok(task) = receiver.try_recv() {
            if let Task::Call(f) = task {
                Self::run_task(f);
            }
        }
    }

    /// Closes the dispatcher: further `enqueue` calls are logged and dropped rather
    /// than queued. Called once the shutdown cascade's final drain has completed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn run_task(task: Box<dyn FnOnce() + Send>) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            let message = panic_message(&payload);
            tracing::error!(message = %message, "task panicked; dispatcher continues");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self { Self::new() }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tasks_run_fifo() {
        let dispatcher = Arc::new(Dispatcher::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            dispatcher.enqueue(move || order.lock().unwrap().push(i));
        }
        dispatcher.drain_pending();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panicking_task_does_not_stop_later_tasks() {
        let dispatcher = Arc::new(Dispatcher::new());
        let ran = Arc::new(Mutex::new(false));

        dispatcher.enqueue(|| panic!("boom"));
        let ran_clone = ran.clone();
        dispatcher.enqueue(move || *ran_clone.lock().unwrap() = true);
        dispatcher.drain_pending();

        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn run_returns_on_shutdown_sentinel() {
        let dispatcher = Arc::new(Dispatcher::new());
        let d = dispatcher.clone();
        let handle = std::thread::spawn(move || d.run());
        dispatcher.request_shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn enqueue_after_close_is_dropped() {
        let dispatcher = Dispatcher::new();
        dispatcher.close();
        let ran = Arc::new(Mutex::new(false));
        let ran_clone = ran.clone();
        dispatcher.enqueue(move || *ran_clone.lock().unwrap() = true);
        dispatcher.drain_pending();
        assert!(!*ran.lock().unwrap());
    }
}
