// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! Opaque identifiers for engine-owned objects.
//!
//! The engine arena hands these out when a source/sink is registered; callers carry
//! them around instead of borrowing into the arena directly. [`PublisherId`] and
//! [`SubscriberId`] are small enums rather than raw integers because both a `Source`
//! and the engine's single `Aggregator` can act as a publisher (symmetrically for
//! sinks/subscriber), and the engine needs to tell them apart without a second lookup.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Allocates a fresh, globally unique id. Embedders implementing a custom
            /// `Source`/`Sink` call this once at construction time to get the id their
            /// `publisher_id()`/`subscriber_id()` reports.
            #[must_use]
            pub fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(SourceId, "Identifies a Source owned by the engine arena.");
define_id!(SinkId, "Identifies a Sink owned by the engine arena.");

/// Identifies anything that can act as a `Publisher`: a registered `Source`, or the
/// engine's single `Aggregator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PublisherId {
    Source(SourceId),
    Aggregator,
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(id) => write!(f, "{id}"),
            Self::Aggregator => write!(f, "Aggregator"),
        }
    }
}

/// Identifies anything that can act as a `Subscriber`: a registered `Sink`, or the
/// engine's single `Aggregator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriberId {
    Sink(SinkId),
    Aggregator,
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink(id) => write!(f, "{id}"),
            Self::Aggregator => write!(f, "Aggregator"),
        }
    }
}

define_id!(HandleId, "Identifies one open, line-oriented byte stream registered with the descriptor source.");
