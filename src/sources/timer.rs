// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The coalescing timer source: a tick generator, not a queue.
//!
//! Each schedule entry asks to be woken no sooner than `early` after its last wake,
//! and no later than `late`. The worker thread sleeps via `park_timeout` rather than a
//! busy loop, and is interrupted (`Thread::unpark`) whenever a schedule entry is added
//! or removed so it can recompute its deadline immediately.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use crate::engine::EngineHandle;
use crate::ids::{PublisherId, SourceId, SubscriberId};
use crate::publisher::{Publisher, PublisherState};
use crate::runnable::{RunState, Runnable};
use crate::topic::{Topic, Updates, Value};

/// One subscriber's wake schedule. Identity is `(subscriber, early, late)`; two
/// subscribers asking for the same `(early, late)` pair get independent entries (and
/// independent `last_fire` tracking).
struct ScheduleEntry {
    subscriber: SubscriberId,
    early: Duration,
    late: Duration,
    last_fire: Instant,
}

struct Inner {
    id: SourceId,
    publisher_state: PublisherState,
    run_state: RunState,
    engine: EngineHandle,
    schedule: Mutex<Vec<ScheduleEntry>>,
    park_thread: Mutex<Option<Thread>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Publishes `Topic::Timer { early, late }`.
#[derive(Clone)]
pub struct TimerSource(Arc<Inner>);

impl std::fmt::Debug for TimerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSource").field("id", &self.0.id).finish()
    }
}

impl TimerSource {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            id: SourceId::next(),
            publisher_state: PublisherState::new(),
            run_state: RunState::new(),
            engine: EngineHandle::new(),
            schedule: Mutex::new(Vec::new()),
            park_thread: Mutex::new(None),
            join: Mutex::new(None),
        }))
    }

    pub fn bind_engine(&self, engine: std::sync::Weak<crate::engine::Engine>) {
        self.0.engine.bind(engine);
    }

    /// Adds a wake schedule for `subscriber`. Idempotent in spirit with the dispatch
    /// model: calling this again for the same `(subscriber, early, late)` key adds a
    /// second independent entry, since callers are expected to call this once per
    /// `on_subscribe`.
    pub fn add_entry(&self, subscriber: SubscriberId, early: Duration, late: Duration) {
        // Seeded so `now - last_fire >= early` holds on the very first check: a newly
        // subscribed entry fires on the next tick rather than waiting out `late` first.
        let last_fire = Instant::now().checked_sub(early.max(late)).unwrap_or_else(Instant::now);
        self.0.schedule.lock().expect("poisoned").push(ScheduleEntry { subscriber, early, late, last_fire });
        self.interrupt();
    }

    pub fn remove_entry(&self, subscriber: SubscriberId, early: Duration, late: Duration) {
        self.0
            .schedule
            .lock()
            .expect("poisoned")
            .retain(|e| !(e.subscriber == subscriber && e.early == early && e.late == late));
        self.interrupt();
    }

    fn interrupt(&self) {
        if let Some(thread) = self.0.park_thread.lock().expect("poisoned").as_ref() {
            thread.unpark();
        }
    }

    fn worker_loop(self) {
        *self.0.park_thread.lock().expect("poisoned") = Some(thread::current());

        loop {
            if !self.0.run_state.is_running() {
                break;
            }

            let now = Instant::now();
            let mut updates = Updates::new();
            let mut next_deadline: Option<Instant> = None;

            {
                let mut schedule = self.0.schedule.lock().expect("poisoned");
                for entry in schedule.iter_mut() {
                    if now.saturating_duration_since(entry.last_fire) >= entry.early {
                        entry.last_fire = now;
                        updates.insert(Topic::Timer { early: entry.early, late: entry.late }, Value::Tick(now));

                        let deadline = now + entry.late;
                        next_deadline = Some(next_deadline.map_or(deadline, |d| d.min(deadline)));
                    }
                }
            }

            if !updates.is_empty() {
                let engine = self.0.engine.engine();
                engine.push_updates(PublisherId::Source(self.0.id), updates);
            }

            if !self.0.run_state.is_running() {
                break;
            }

            match next_deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        thread::park_timeout(deadline - now);
                    }
                }
                None => thread::park(),
            }
        }
    }
}

impl Default for TimerSource {
    fn default() -> Self { Self::new() }
}

impl Runnable for TimerSource {
    fn run_state(&self) -> &RunState { &self.0.run_state }

    fn on_start(&self) {
        let worker = self.clone();
        let handle = thread::Builder::new()
            .name("timer-source".into())
            .spawn(move || worker.worker_loop())
            .expect("failed to spawn timer source thread");
        *self.0.join.lock().expect("poisoned") = Some(handle);
    }

    fn on_stop(&self) {
        self.interrupt();
        if let Some(handle) = self.0.join.lock().expect("poisoned").take() {
            if handle.join().is_err() {
                tracing::error!("timer source thread panicked");
            }
        }
    }
}

impl Publisher for TimerSource {
    fn publisher_id(&self) -> PublisherId { PublisherId::Source(self.0.id) }
    fn publisher_state(&self) -> &PublisherState { &self.0.publisher_state }
    fn publishes(&self, topic: &Topic) -> bool { matches!(topic, Topic::Timer { .. }) }

    fn on_subscribe(&self, subscriber: SubscriberId, topic: &Topic) {
        if let Topic::Timer { early, late } = *topic {
            self.add_entry(subscriber, early, late);
        }
    }

    fn on_unsubscribe(&self, subscriber: SubscriberId, topic: &Topic) {
        if let Topic::Timer { early, late } = *topic {
            self.remove_entry(subscriber, early, late);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_entry_mutate_schedule_len() {
        let timer = TimerSource::new();
        let subscriber = SubscriberId::Aggregator;
        timer.add_entry(subscriber, Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(timer.0.schedule.lock().unwrap().len(), 1);
        timer.remove_entry(subscriber, Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(timer.0.schedule.lock().unwrap().len(), 0);
    }
}
