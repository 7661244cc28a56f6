// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brokerd::dispatcher::Dispatcher;
use brokerd::engine::Engine;
use brokerd::sinks::{InotifyHandler, InotifySink};
use brokerd::sources::FsWatchSource;
use brokerd::topic::{FsEventKind, WatchMask};

struct RecordingHandler {
    events: Arc<Mutex<Vec<(PathBuf, FsEventKind)>>>,
}

impl InotifyHandler for RecordingHandler {
    fn file_changed(&self, path: &Path, kind: FsEventKind) {
        self.events.lock().expect("poisoned").push((path.to_path_buf(), kind));
    }
}

#[test]
#[serial_test::serial]
fn inotify_sink_observes_file_modification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("watched.txt");
    fs::write(&file_path, "initial").unwrap();

    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);

    let fswatch_source = FsWatchSource::new();
    fswatch_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(fswatch_source.clone()));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = InotifySink::new(
        fswatch_source,
        vec![(file_path.clone(), WatchMask::ALL)],
        RecordingHandler { events: events.clone() },
    );
    sink.bind_engine(Arc::downgrade(&engine));
    engine.add_sink(Arc::new(sink));

    let engine_run = engine.clone();
    let run_handle = std::thread::spawn(move || engine_run.run());

    std::thread::sleep(Duration::from_millis(200));
    fs::write(&file_path, "changed").unwrap();
    std::thread::sleep(Duration::from_millis(500));

    engine.request_shutdown();
    run_handle.join().unwrap();

    let events = events.lock().unwrap();
    assert!(!events.is_empty(), "expected at least one filesystem event");
    assert!(events.iter().all(|(path, _)| path == &file_path));
}
