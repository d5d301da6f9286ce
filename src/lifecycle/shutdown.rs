//! Shutdown coordination for the API server.
//!
//! ```text
//! Running ──signal──▶ Draining ──requests done + tasks idle──▶ Stopped (clean, exit 0)
//!                         │
//!                         └──budget elapsed / forced──────────▶ Stopped (forced, exit 2)
//! ```
//!
//! The state only moves forward. One drain budget bounds the aggregate wait
//! for in-flight requests and background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{SecondSignalPolicy, ShutdownConfig};
use crate::lifecycle::tasks::{IdleOutcome, TaskTracker};

/// Exit status for a drain that ran out of budget or was escalated.
pub const EXIT_FORCED: u8 = 2;

/// Process lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// How the drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Clean,
    /// Some work may have been cut short.
    Forced {
        requests_pending: bool,
        outstanding_tasks: usize,
        escalated: bool,
    },
}

impl DrainOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, DrainOutcome::Clean)
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            DrainOutcome::Clean => 0,
            DrainOutcome::Forced { .. } => EXIT_FORCED,
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Owns the lifecycle state, the background [`TaskTracker`], and the
/// cancellation token that stops the listener and periodic jobs.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    /// Fired on Running → Draining.
    drain: CancellationToken,
    /// Fired when a second signal escalates the drain.
    force: CancellationToken,
    tasks: TaskTracker,
    drain_budget: Duration,
    second_signal: SecondSignalPolicy,
}

impl ShutdownCoordinator {
    pub fn new(config: &ShutdownConfig) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            drain: CancellationToken::new(),
            force: CancellationToken::new(),
            tasks: TaskTracker::new(config.late_tasks),
            drain_budget: config.drain_budget(),
            second_signal: config.second_signal,
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn drain_budget(&self) -> Duration {
        self.drain_budget
    }

    /// Token cancelled when draining begins. Long-running loops select on it.
    pub fn drain_token(&self) -> CancellationToken {
        self.drain.clone()
    }

    /// Resolves once draining has begun.
    pub async fn draining(&self) {
        self.drain.cancelled().await
    }

    /// Move from `Running` to `Draining`.
    ///
    /// Returns `false` if the drain had already begun.
    pub fn begin_drain(&self) -> bool {
        let began = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if began {
            self.tasks.close();
            self.drain.cancel();
            tracing::info!(
                budget_secs = self.drain_budget.as_secs_f64(),
                outstanding_tasks = self.tasks.outstanding(),
                "Draining: no longer accepting connections"
            );
        }
        began
    }

    /// Handle an interrupt. The first starts the drain; later ones follow
    /// the second-signal policy.
    pub fn signal(&self) {
        if self.begin_drain() {
            return;
        }
        match self.second_signal {
            SecondSignalPolicy::Ignore => {
                tracing::warn!("Already draining; additional signal ignored");
            }
            SecondSignalPolicy::Force => {
                tracing::warn!("Second signal received; forcing shutdown");
                self.force.cancel();
            }
        }
    }

    /// Drive the drain to completion.
    ///
    /// `in_flight` resolves when the transport has finished every accepted
    /// request. Both it and the task tracker share one deadline.
    pub async fn drain<F>(&self, in_flight: F) -> DrainOutcome
    where
        F: Future,
    {
        self.begin_drain();
        let deadline = Instant::now() + self.drain_budget;

        let requests_done = tokio::select! {
            finished = tokio::time::timeout_at(deadline, in_flight) => finished.is_ok(),
            _ = self.force.cancelled() => false,
        };

        let tasks = tokio::select! {
            outcome = self.tasks.wait_until_idle_until(deadline) => outcome,
            _ = self.force.cancelled() => IdleOutcome::TimedOut {
                outstanding: self.tasks.outstanding(),
            },
        };

        let outcome = match (requests_done, tasks) {
            (true, IdleOutcome::Idle) => DrainOutcome::Clean,
            (_, tasks) => DrainOutcome::Forced {
                requests_pending: !requests_done,
                outstanding_tasks: match tasks {
                    IdleOutcome::Idle => 0,
                    IdleOutcome::TimedOut { outstanding } => outstanding,
                },
                escalated: self.force.is_cancelled(),
            },
        };

        self.state.send_replace(ShutdownState::Stopped);

        match outcome {
            DrainOutcome::Clean => tracing::info!("Drain complete"),
            DrainOutcome::Forced {
                requests_pending,
                outstanding_tasks,
                escalated,
            } => tracing::warn!(
                requests_pending,
                outstanding_tasks,
                escalated,
                "Drain did not finish; deferred work may be lost"
            ),
        }
        outcome
    }
}
