// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! Tracing setup for the daemon binary. Deliberately simpler than the teacher's
//! TUI-aware logger (no in-app log viewer, no file rotation): a daemon writes to
//! whatever stderr its supervisor (systemd, launchd, a terminal) captures.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. `verbose` raises the default level from
/// `info` to `debug`; `RUST_LOG` always takes precedence when set.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}
