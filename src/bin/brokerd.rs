// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! The daemon harness: loads configuration, wires the three intrinsic sources to
//! config-driven sinks, installs termination signal handling, and runs the engine
//! until `SIGTERM`/`SIGINT`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use brokerd::config::Config;
use brokerd::engine::Engine;
use brokerd::dispatcher::Dispatcher;
use brokerd::sinks::{InotifyHandler, InotifySink, PipeSink, TimerHandler, TimerSink};
use brokerd::sources::{DescriptorSource, FsWatchSource, TimerSource};
use brokerd::subprocess::{RestartBudget, Subprocess};
use brokerd::topic::FsEventKind;

#[derive(Parser)]
#[command(name = "brokerd", version, about = "Local publish/subscribe event dispatch daemon")]
struct Cli {
    /// Path to the declarative config file. Defaults to `~/.config/brokerd/config.json`.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Raise the default log level from `info` to `debug`.
    #[arg(short, long)]
    verbose: bool,
}

struct ShellTimerHandler {
    command: String,
}

impl TimerHandler for ShellTimerHandler {
    fn tick(&self) {
        run_shell(&self.command, &[]);
    }
}

struct ShellWatchHandler {
    command: String,
}

impl InotifyHandler for ShellWatchHandler {
    fn file_changed(&self, path: &Path, kind: FsEventKind) {
        run_shell(&self.command, &[("BROKERD_PATH", path.display().to_string()), ("BROKERD_EVENT", format!("{kind:?}"))]);
    }
}

fn run_shell(command: &str, env: &[(&str, String)]) {
    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    for (key, value) in env {
        cmd.env(key, value);
    }
    match cmd.status() {
        Ok(status) if !status.success() => {
            tracing::warn!(%command, ?status, "command exited non-zero");
        }
        Err(error) => tracing::error!(%error, %command, "failed to run command"),
        Ok(_) => {}
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    brokerd::log::init(cli.verbose);

    let config_path = cli.config.or_else(Config::default_path);
    let config = match config_path {
        Some(path) if path.exists() => match Config::load(&path) {
            Ok(config) => config,
            Err(error) => {
                tracing::error!(%error, "failed to load config");
                return std::process::ExitCode::FAILURE;
            }
        },
        _ => Config::default(),
    };

    let dispatcher = Arc::new(Dispatcher::default());
    let engine = Engine::new(dispatcher);

    let descriptor_source = DescriptorSource::new();
    descriptor_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(descriptor_source.clone()));

    let fswatch_source = FsWatchSource::new();
    fswatch_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(fswatch_source.clone()));

    let timer_source = TimerSource::new();
    timer_source.bind_engine(Arc::downgrade(&engine));
    engine.add_source(Arc::new(timer_source.clone()));

    for watch in config.watches {
        let sink = InotifySink::new(
            fswatch_source.clone(),
            vec![(watch.path, watch.mask.into())],
            ShellWatchHandler { command: watch.command },
        );
        sink.bind_engine(Arc::downgrade(&engine));
        engine.add_sink(Arc::new(sink));
    }

    for timer in config.timers {
        let sink = TimerSink::new(
            timer_source.clone(),
            Duration::from_millis(timer.early_ms),
            Duration::from_millis(timer.late_ms),
            ShellTimerHandler { command: timer.command },
        );
        sink.bind_engine(Arc::downgrade(&engine));
        engine.add_sink(Arc::new(sink));
    }

    for command in config.commands {
        let mut budget = RestartBudget::default();
        if let Some(max_restarts) = command.max_restarts {
            budget.max_restarts = max_restarts;
        }
        if let Some(secs) = command.start_limit_interval_secs {
            budget.start_limit_interval = Duration::from_secs(secs);
        }
        let subprocess = Subprocess::new(command.cmd.clone(), command.args, command.restart).with_budget(budget);
        let label = command.cmd.clone();
        let sink = PipeSink::new(descriptor_source.clone(), subprocess, move |line| {
            tracing::info!(command = %label, %line, "subprocess output");
        });
        sink.bind_engine(Arc::downgrade(&engine));
        engine.add_sink(Arc::new(sink));
    }

    if let Err(error) = install_signal_handler(&engine) {
        tracing::error!(%error, "failed to install signal handler");
        return std::process::ExitCode::FAILURE;
    }

    engine.run();
    std::process::ExitCode::SUCCESS
}

#[cfg(unix)]
fn install_signal_handler(engine: &Arc<Engine>) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let engine = engine.clone();
    std::thread::Builder::new().name("signal-handler".into()).spawn(move || {
        if signals.forever().next().is_some() {
            tracing::info!("received termination signal; shutting down");
            engine.request_shutdown();
        }
    })?;
    Ok(())
}
