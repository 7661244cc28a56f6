// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use brokerd::dispatcher::Dispatcher;
use brokerd::engine::Engine;
use brokerd::runnable::Runnable;
use brokerd::sinks::PipeSink;
use brokerd::sources::DescriptorSource;
use brokerd::subprocess::{RestartBudget, Subprocess};

#[test]
#[serial_test::serial]
fn pipe_sink_relays_subprocess_output_and_stops_without_restart() {
    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);

    let descriptor_source = DescriptorSource::new();
    descriptor_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(descriptor_source.clone()));

    let lines = Arc::new(Mutex::new(Vec::new()));
    let lines_clone = lines.clone();
    let subprocess = Subprocess::new("sh", vec!["-c".into(), "printf 'one\\ntwo\\n'".into()], false);
    let sink = PipeSink::new(descriptor_source, subprocess, move |line| {
        lines_clone.lock().expect("poisoned").push(line.to_string());
    });
    sink.bind_engine(Arc::downgrade(&engine));
    let sink_clone = sink.clone();
    engine.add_sink(Arc::new(sink));

    let engine_run = engine.clone();
    let run_handle = std::thread::spawn(move || engine_run.run());

    std::thread::sleep(Duration::from_millis(500));

    assert_eq!(*lines.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
    assert!(!sink_clone.is_running(), "sink should stop once the non-restarting child exits");

    engine.request_shutdown();
    run_handle.join().unwrap();
}

#[test]
#[serial_test::serial]
fn pipe_sink_stops_once_restart_budget_is_exhausted() {
    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);

    let descriptor_source = DescriptorSource::new();
    descriptor_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(descriptor_source.clone()));

    // Exits instantly on every launch, and is allowed to restart, so the budget burns
    // through its two tokens almost immediately.
    let subprocess = Subprocess::new("sh", vec!["-c".into(), "exit 0".into()], true)
        .with_budget(RestartBudget::new(2, Duration::from_secs(10)));
    let sink = PipeSink::new(descriptor_source, subprocess, |_line| {});
    sink.bind_engine(Arc::downgrade(&engine));
    let sink_clone = sink.clone();
    engine.add_sink(Arc::new(sink));

    let engine_run = engine.clone();
    let run_handle = std::thread::spawn(move || engine_run.run());

    std::thread::sleep(Duration::from_millis(2000));

    assert!(!sink_clone.is_running(), "sink should stop once the restart budget is exhausted");

    engine.request_shutdown();
    run_handle.join().unwrap();
}
