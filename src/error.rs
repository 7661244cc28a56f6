// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! Error types for the dispatch engine.
//!
//! [`Error`] is the single error type returned by fallible engine operations. It
//! implements [`miette::Diagnostic`] so the CLI binary can render rich diagnostics
//! (error codes, OS-specific help text) while library callers can match on it like
//! any other [`thiserror`] enum.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::topic::Topic;

/// Errors produced by the dispatch engine and its sources/sinks.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// A subscriber tried to subscribe to a publisher that has no upstream source for
    /// the requested topic.
    #[error("no publisher is willing to publish {topic:?}")]
    #[diagnostic(
        code(brokerd::not_publishing),
        help("check that a source advertising this topic has been registered with the engine")
    )]
    NotPublishing { topic: Topic },

    /// A sink declared a dependency on a source that was never registered.
    #[error("sink requires a source that was never attached")]
    #[diagnostic(
        code(brokerd::no_source),
        help("call Engine::add_source before Engine::add_sink for sinks that read from a source")
    )]
    NoSource,

    /// Wraps an I/O failure (file, pipe, fifo, poll registration, ...).
    #[error("i/o error: {context}")]
    #[diagnostic(code(brokerd::io))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A task running on the dispatcher's queue panicked. The dispatcher recovers and
    /// keeps running, but the panic is surfaced so callers can decide whether to log,
    /// alert, or escalate.
    #[error("task panicked: {message}")]
    #[diagnostic(code(brokerd::task_panic))]
    TaskPanic { message: String },

    /// The declarative config file at `path` failed to parse or did not match the
    /// expected schema.
    #[error("failed to load config at {path}")]
    #[diagnostic(
        code(brokerd::config),
        help("validate the file against the documented config schema")
    )]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// A filesystem watch could not be installed or removed.
    #[error("watch error for {path}")]
    #[diagnostic(code(brokerd::watch))]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// A restartable subprocess sink exhausted its restart budget.
    #[error("subprocess {command} exceeded its restart budget ({attempts} attempts)")]
    #[diagnostic(
        code(brokerd::restart_exhausted),
        help("the command may be crash-looping; inspect its stderr or raise the restart budget")
    )]
    RestartBudgetExhausted { command: String, attempts: u32 },
}

/// Narrower error used while parsing/reading the declarative config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read file")]
    Read(#[source] std::io::Error),
    #[error("invalid json")]
    Parse(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
