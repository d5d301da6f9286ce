//! Background task tracking.
//!
//! Handlers register deferred work (notification delivery and the like)
//! before dispatching it, and the shutdown coordinator waits for the count
//! to reach zero during the drain.
//!
//! # Design Decisions
//! - Registration happens on the handler's task, before `tokio::spawn`, so
//!   the count can never read zero while work is about to start
//! - Completion is a guard `Drop`, so success, error and panic all release
//! - The count lives in a `watch` channel; waiters check the current value
//!   before sleeping and cannot miss a release

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::LateTaskPolicy;
use crate::observability::metrics;
use crate::resilience::containment::panic_message;

/// Registration refused because the server is draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("server is shutting down; background work not accepted")]
pub struct TaskRejected;

/// Result of waiting for the tracker to empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    Idle,
    TimedOut { outstanding: usize },
}

#[derive(Debug, Clone, Copy, Default)]
struct TrackerState {
    outstanding: usize,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    state: watch::Sender<TrackerState>,
    late_policy: LateTaskPolicy,
}

/// Counted set of outstanding background units. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

impl TaskTracker {
    pub fn new(late_policy: LateTaskPolicy) -> Self {
        let (state, _) = watch::channel(TrackerState::default());
        Self {
            inner: Arc::new(Inner { state, late_policy }),
        }
    }

    /// Count one unit of work. The returned guard releases it on drop.
    pub fn register(&self) -> Result<TaskGuard, TaskRejected> {
        let mut accepted = false;
        let mut outstanding = 0;
        let late_policy = self.inner.late_policy;

        self.inner.state.send_if_modified(|state| {
            if state.closed && late_policy == LateTaskPolicy::Reject {
                return false;
            }
            state.outstanding += 1;
            outstanding = state.outstanding;
            accepted = true;
            true
        });

        if !accepted {
            tracing::warn!("Background task rejected: draining");
            return Err(TaskRejected);
        }

        metrics::record_background_tasks(outstanding);
        Ok(TaskGuard {
            tracker: self.clone(),
        })
    }

    fn done(&self) {
        let mut outstanding = 0;
        self.inner.state.send_modify(|state| {
            debug_assert!(state.outstanding > 0, "task released more than once");
            state.outstanding = state.outstanding.saturating_sub(1);
            outstanding = state.outstanding;
        });
        metrics::record_background_tasks(outstanding);
    }

    /// Mark the start of the drain. Later registrations follow the
    /// configured [`LateTaskPolicy`].
    pub fn close(&self) {
        self.inner.state.send_modify(|state| state.closed = true);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }

    pub fn outstanding(&self) -> usize {
        self.inner.state.borrow().outstanding
    }

    /// Wait until no task is outstanding or `budget` elapses.
    pub async fn wait_until_idle(&self, budget: Duration) -> IdleOutcome {
        self.wait_until_idle_until(Instant::now() + budget).await
    }

    /// Like [`wait_until_idle`](Self::wait_until_idle) with an absolute deadline.
    pub async fn wait_until_idle_until(&self, deadline: Instant) -> IdleOutcome {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let idle = tokio::time::timeout_at(deadline, rx.wait_for(|s| s.outstanding == 0))
            .await
            .is_ok();
        if idle {
            IdleOutcome::Idle
        } else {
            IdleOutcome::TimedOut {
                outstanding: self.outstanding(),
            }
        }
    }

    /// Register, then spawn `work` holding the guard.
    pub fn spawn<F, E>(&self, name: &'static str, work: F) -> Result<(), TaskRejected>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.register()?.spawn(name, work);
        Ok(())
    }
}

/// Releases one registration when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard immediately marks the task as done"]
pub struct TaskGuard {
    tracker: TaskTracker,
}

impl TaskGuard {
    /// Dispatch `work` on the runtime; the registration is released when it
    /// ends. Errors and panics from `work` are logged under `name`.
    pub fn spawn<F, E>(self, name: &'static str, work: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        tokio::spawn(async move {
            let _guard = self;
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task finished"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
                Err(payload) => tracing::error!(
                    task = name,
                    panic = %panic_message(payload.as_ref()),
                    "Background task panicked"
                ),
            }
        });
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tracker.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_count_outstanding_work() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        assert_eq!(tracker.outstanding(), 0);

        let a = tracker.register().unwrap();
        let b = tracker.register().unwrap();
        assert_eq!(tracker.outstanding(), 2);

        drop(a);
        assert_eq!(tracker.outstanding(), 1);
        drop(b);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn late_registration_follows_policy() {
        let strict = TaskTracker::new(LateTaskPolicy::Reject);
        strict.close();
        assert_eq!(strict.register().unwrap_err(), TaskRejected);
        assert_eq!(strict.outstanding(), 0);

        let lenient = TaskTracker::new(LateTaskPolicy::Accept);
        lenient.close();
        let guard = lenient.register().unwrap();
        assert_eq!(lenient.outstanding(), 1);
        drop(guard);
    }

    #[test]
    fn registrations_before_close_are_kept() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        let guard = tracker.register().unwrap();
        tracker.close();
        assert!(tracker.is_closed());
        assert_eq!(tracker.outstanding(), 1);
        drop(guard);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn idle_immediately_when_empty() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        assert_eq!(
            tracker.wait_until_idle(Duration::from_millis(1)).await,
            IdleOutcome::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_once_all_tasks_finish() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        for delay in [10u64, 50, 200] {
            let guard = tracker.register().unwrap();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                drop(guard);
            });
        }

        let start = Instant::now();
        let outcome = tracker.wait_until_idle(Duration::from_secs(5)).await;
        assert_eq!(outcome, IdleOutcome::Idle);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_exactly_the_budget() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        let _stuck = tracker.register().unwrap();

        let start = Instant::now();
        let outcome = tracker.wait_until_idle(Duration::from_secs(3)).await;
        assert_eq!(outcome, IdleOutcome::TimedOut { outstanding: 1 });
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn spawned_task_releases_on_error_and_panic() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);

        tracker
            .spawn("fails", async { Err::<(), _>("boom") })
            .unwrap();
        tracker
            .spawn("panics", async {
                if true {
                    panic!("deferred work exploded");
                }
                Ok::<(), String>(())
            })
            .unwrap();
        tracker.spawn("succeeds", async { Ok::<(), String>(()) }).unwrap();

        assert_eq!(
            tracker.wait_until_idle(Duration::from_secs(5)).await,
            IdleOutcome::Idle
        );
    }

    #[tokio::test]
    async fn spawn_reports_rejection() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        tracker.close();
        let result = tracker.spawn("late", async { Ok::<(), String>(()) });
        assert_eq!(result, Err(TaskRejected));
    }

    #[tokio::test]
    async fn concurrent_register_and_release() {
        let tracker = TaskTracker::new(LateTaskPolicy::Reject);
        let mut handles = Vec::new();
        for _ in 0..64 {
            let guard = tracker.register().unwrap();
            handles.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                drop(guard);
            }));
        }
        assert_eq!(
            tracker.wait_until_idle(Duration::from_secs(5)).await,
            IdleOutcome::Idle
        );
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(tracker.outstanding(), 0);
    }
}
