// Copyright (c) 2025 brokerd contributors. Licensed under Apache License, Version 2.0.

//! `Subprocess`: the child-process helper backing `PipeSink`.
//!
//! `RestartBudget` is a systemd-inspired exponential backoff counter, adapted from the
//! teacher's `RestartPolicy` (in-process thread supervision) to OS child-process
//! supervision: a crash-looping command burns through its budget and is left stopped
//! rather than restarted forever.

use std::io;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Caps how many times, and how fast, a `PipeSink` may relaunch its child after it
/// exits. Mirrors the teacher's `RestartPolicy` defaults in spirit (bounded attempts,
/// growing delay) but counts against a rolling window instead of a fixed attempt
/// sequence, since a long-lived daemon should forgive restarts that are spaced far
/// apart.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    pub max_restarts: u32,
    pub start_limit_interval: Duration,
    attempts: Vec<Instant>,
}

impl RestartBudget {
    #[must_use]
    pub fn new(max_restarts: u32, start_limit_interval: Duration) -> Self {
        Self { max_restarts, start_limit_interval, attempts: Vec::new() }
    }

    /// Records a restart attempt at `now` and returns whether the budget still has
    /// tokens left for a *next* attempt.
    pub fn record_attempt(&mut self, now: Instant) -> bool {
        self.attempts.retain(|&t| now.duration_since(t) <= self.start_limit_interval);
        self.attempts.push(now);
        self.attempts.len() <= self.max_restarts as usize
    }

    #[must_use]
    pub fn attempts_in_window(&self) -> u32 { u32::try_from(self.attempts.len()).unwrap_or(u32::MAX) }
}

impl Default for RestartBudget {
    fn default() -> Self { Self::new(3, Duration::from_secs(10)) }
}

/// Outcome of `Subprocess::try_restart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// `restart` is disabled on this subprocess; the caller should stop like a
    /// non-restarting sink.
    Disabled,
    /// The child was relaunched.
    Restarted,
    /// `restart` is enabled but the rolling-window budget has no tokens left.
    BudgetExhausted { attempts: u32 },
}

/// A supervised child process feeding a `PipeSink`'s descriptor-source handle.
#[derive(Debug)]
pub struct Subprocess {
    pub cmd: String,
    pub args: Vec<String>,
    /// Whether the sink should relaunch the command when it exits, budget permitting.
    /// Kept distinct from `try_restart()` below (the original conflated a field and a
    /// method of the same name; see DESIGN.md).
    pub restart: bool,
    child: Option<Child>,
    budget: RestartBudget,
}

impl Subprocess {
    #[must_use]
    pub fn new(cmd: impl Into<String>, args: Vec<String>, restart: bool) -> Self {
        Self { cmd: cmd.into(), args, restart, child: None, budget: RestartBudget::default() }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: RestartBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn spawn(&mut self) -> io::Result<()> {
        let child = Command::new(&self.cmd)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()?;
        self.child = Some(child);
        Ok(())
    }

    /// Takes the child's stdout handle, if the process is currently running.
    pub fn take_stdout(&mut self) -> Option<std::process::ChildStdout> {
        self.child.as_mut().and_then(|child| child.stdout.take())
    }

    pub fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Attempts to relaunch the child, provided `restart` is enabled and the restart
    /// budget still has room.
    pub fn try_restart(&mut self) -> io::Result<RestartOutcome> {
        if !self.restart {
            return Ok(RestartOutcome::Disabled);
        }
        if !self.budget.record_attempt(Instant::now()) {
            return Ok(RestartOutcome::BudgetExhausted { attempts: self.budget.attempts_in_window() });
        }
        self.spawn()?;
        Ok(RestartOutcome::Restarted)
    }

    #[must_use]
    pub fn restart_attempts(&self) -> u32 { self.budget.attempts_in_window() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_up_to_max_restarts() {
        let mut budget = RestartBudget::new(2, Duration::from_mins(1));
        let now = Instant::now();
        assert!(budget.record_attempt(now));
        assert!(budget.record_attempt(now));
        assert!(!budget.record_attempt(now));
    }

    #[test]
    fn budget_forgives_attempts_outside_window() {
        let mut budget = RestartBudget::new(1, Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(budget.record_attempt(t0));
        assert!(!budget.record_attempt(t0));
        let later = t0 + Duration::from_millis(200);
        assert!(budget.record_attempt(later));
    }
}
