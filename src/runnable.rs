// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The idempotent start/stop state machine shared by every source and sink.

use std::sync::Mutex;

/// Tracks whether a `Runnable` is currently started, guarding the boolean with a
/// `Mutex` so concurrent `start`/`stop` calls never race each other's flag flip.
#[derive(Debug, Default)]
pub struct RunState {
    running: Mutex<bool>,
}

impl RunState {
    #[must_use]
    pub fn new() -> Self {
        Self { running: Mutex::new(false) }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.lock().expect("run state poisoned")
    }

    /// Flips `running` from `false` to `true`. Returns whether this call caused the
    /// transition (`false` if already running).
    #[must_use]
    pub fn mark_started(&self) -> bool {
        let mut running = self.running.lock().expect("run state poisoned");
        if *running {
            false
        } else {
            *running = true;
            true
        }
    }

    /// Flips `running` from `true` to `false`. Returns whether this call caused the
    /// transition (`false` if already stopped).
    #[must_use]
    pub fn mark_stopped(&self) -> bool {
        let mut running = self.running.lock().expect("run state poisoned");
        if *running {
            *running = false;
            true
        } else {
            false
        }
    }
}

/// Idempotent start/stop lifecycle. `on_start`/`on_stop` run outside the state lock, so
/// implementations may call back into other `Runnable`s without deadlocking; the
/// tradeoff is that a `start`/`stop` race from different threads can produce
/// overlapping `on_start`/`on_stop` effects. In this engine every non-source Runnable
/// is driven exclusively from the dispatcher thread, which sidesteps that race.
pub trait Runnable {
    fn run_state(&self) -> &RunState;

    /// Called once, outside the lock, the first time `start()` transitions this
    /// Runnable from stopped to running.
    fn on_start(&self) {}

    /// Called once, outside the lock, the first time `stop()` transitions this
    /// Runnable from running to stopped.
    fn on_stop(&self) {}

    /// Starts this Runnable. Returns `true` if this call caused the transition.
    fn start(&self) -> bool {
        let started = self.run_state().mark_started();
        if started {
            self.on_start();
        }
        started
    }

    /// Stops this Runnable. Returns `true` if this call caused the transition.
    fn stop(&self) -> bool {
        let stopped = self.run_state().mark_stopped();
        if stopped {
            self.on_stop();
        }
        stopped
    }

    fn is_running(&self) -> bool {
        self.run_state().is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        state: RunState,
        starts: AtomicU32,
        stops: AtomicU32,
    }

    impl Runnable for Counter {
        fn run_state(&self) -> &RunState { &self.state }
        fn on_start(&self) { self.starts.fetch_add(1, Ordering::SeqCst); }
        fn on_stop(&self) { self.stops.fetch_add(1, Ordering::SeqCst); }
    }

    #[test]
    fn start_stop_is_idempotent() {
        let c = Counter { state: RunState::new(), starts: AtomicU32::new(0), stops: AtomicU32::new(0) };

        assert!(c.start());
        assert!(!c.start());
        assert_eq!(c.starts.load(Ordering::SeqCst), 1);

        assert!(c.stop());
        assert!(!c.stop());
        assert_eq!(c.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn starts_stopped() {
        let c = Counter { state: RunState::new(), starts: AtomicU32::new(0), stops: AtomicU32::new(0) };
        assert!(!c.is_running());
    }
}
