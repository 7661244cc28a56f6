// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brokerd::dispatcher::Dispatcher;
use brokerd::engine::Engine;
use brokerd::runnable::Runnable;
use brokerd::sinks::ReaderSink;
use brokerd::sources::DescriptorSource;

#[test]
#[serial_test::serial]
fn reader_sink_relays_lines_and_stops_on_eof() {
    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);

    let descriptor_source = DescriptorSource::new();
    descriptor_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(descriptor_source.clone()));

    let (reader, mut writer) = std::io::pipe().expect("failed to create os pipe");

    let lines = Arc::new(Mutex::new(Vec::new()));
    let lines_clone = lines.clone();
    let sink = ReaderSink::new(descriptor_source, reader, move |line| {
        lines_clone.lock().expect("poisoned").push(line.to_string());
    });
    sink.bind_engine(Arc::downgrade(&engine));
    let sink_clone = sink.clone();
    engine.add_sink(Arc::new(sink));

    let engine_run = engine.clone();
    let run_handle = std::thread::spawn(move || engine_run.run());

    std::thread::sleep(Duration::from_millis(300));

    writeln!(writer, "hello").unwrap();
    writeln!(writer, "world").unwrap();
    writer.flush().unwrap();

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(*lines.lock().unwrap(), vec!["hello".to_string(), "world".to_string()]);

    drop(writer);
    std::thread::sleep(Duration::from_millis(300));
    assert!(!sink_clone.is_running(), "sink should stop itself on upstream eof");

    engine.request_shutdown();
    run_handle.join().unwrap();
}
