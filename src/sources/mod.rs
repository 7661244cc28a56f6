// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The three intrinsic sources: descriptor, filesystem watch, and timer.

pub mod descriptor;
pub mod fswatch;
pub mod timer;

pub use descriptor::DescriptorSource;
pub use fswatch::FsWatchSource;
pub use timer::TimerSource;
