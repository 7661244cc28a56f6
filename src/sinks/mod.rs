// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

mod fifo;
mod inotify;
mod pipe;
mod reader;
mod timer;

pub use fifo::FifoSink;
pub use inotify::{InotifyHandler, InotifySink};
pub use pipe::PipeSink;
pub use reader::ReaderSink;
pub use timer::{TimerHandler, TimerSink};
