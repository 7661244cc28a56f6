// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use brokerd::dispatcher::Dispatcher;
use brokerd::engine::Engine;
use brokerd::sinks::{TimerHandler, TimerSink};
use brokerd::sources::TimerSource;

struct CountingHandler {
    ticks: Arc<Mutex<Vec<Instant>>>,
}

impl TimerHandler for CountingHandler {
    fn tick(&self) {
        self.ticks.lock().expect("poisoned").push(Instant::now());
    }
}

#[test]
#[serial_test::serial]
fn timer_sink_fires_within_early_late_bounds() {
    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);

    let timer_source = TimerSource::new();
    timer_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(timer_source.clone()));

    let ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = TimerSink::new(
        timer_source,
        Duration::from_millis(20),
        Duration::from_millis(60),
        CountingHandler { ticks: ticks.clone() },
    );
    sink.bind_engine(Arc::downgrade(&engine));
    engine.add_sink(Arc::new(sink));

    let engine_run = engine.clone();
    let run_handle = std::thread::spawn(move || engine_run.run());

    std::thread::sleep(Duration::from_millis(500));
    engine.request_shutdown();
    run_handle.join().unwrap();

    let ticks = ticks.lock().unwrap();
    assert!(ticks.len() >= 3, "expected several ticks over 500ms, got {}", ticks.len());
    for pair in ticks.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap <= Duration::from_millis(200), "wake interval exceeded late bound: {gap:?}");
    }
}
