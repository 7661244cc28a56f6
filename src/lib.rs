/*
 *   Copyright (c) 2025 brokerd contributors.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! A local publish/subscribe event dispatch daemon.
//!
//! Three intrinsic [`sources`] (a line-oriented descriptor reader, a filesystem
//! watcher, a timer) publish onto a single-threaded [`dispatcher`] through an
//! [`engine::Engine`] arena; [`sinks`] subscribe to them and act on what arrives. The
//! [`aggregator`] stands in as a default upstream so a sink can subscribe without
//! naming a specific source.

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ids;
pub mod log;
pub mod publisher;
pub mod runnable;
pub mod sinks;
pub mod sources;
pub mod subprocess;
pub mod subscriber;
pub mod topic;

pub use engine::Engine;
pub use error::{Error, Result};
