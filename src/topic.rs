// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The closed set of things you can publish and subscribe to.
//!
//! The original duck-typed "anything hashable" topic space doesn't translate to Rust;
//! [`Topic`] enumerates the engine's intrinsic topic shapes instead; [`Topic::User`]
//! keeps an escape hatch open for application-defined identifiers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::ids::HandleId;

/// Everything a publisher can declare and a subscriber can ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// An open, line-oriented byte stream tracked by the descriptor source.
    Handle(HandleId),
    /// A filesystem path plus the kinds of change that should wake subscribers.
    Watch { path: PathBuf, mask: WatchMask },
    /// A timer schedule: wake no sooner than `early`, no later than `late`.
    Timer { early: Duration, late: Duration },
    /// An application-defined topic identifier, for embedders that don't need one of
    /// the intrinsic shapes above.
    User(String),
}

/// Which filesystem events a `Topic::Watch` cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchMask {
    pub create: bool,
    pub modify: bool,
    pub remove: bool,
}

impl WatchMask {
    pub const ALL: Self = Self { create: true, modify: true, remove: true };

    #[must_use]
    pub fn matches(&self, kind: FsEventKind) -> bool {
        match kind {
            FsEventKind::Create => self.create,
            FsEventKind::Modify => self.modify,
            FsEventKind::Remove => self.remove,
        }
    }
}

/// The kind of change a filesystem watch observed, independent of `notify`'s richer
/// (and platform-specific) event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Create,
    Modify,
    Remove,
}

/// An opaque payload delivered alongside a [`Topic`]. The engine never inspects a
/// `Value`'s contents; only sinks match on it.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    FsEvent(FsEventKind),
    Tick(Instant),
    Bytes(Vec<u8>),
}

/// A batch of topic/value pairs, as handed to `push_updates`/`receive_updates`. Always
/// non-empty by construction of the call sites that build one.
pub type Updates = HashMap<Topic, Value>;
