// src/schedule/mod.rs
//! Per-source cadence: an explicit state machine plus the cooperative shutdown flag.

pub mod runner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub use runner::Scheduler;

/// Timing knobs for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPolicy {
    /// Regular cadence.
    pub default: Duration,
    /// Delay after a failed cycle.
    pub retry: Duration,
    /// Delay once a known end time has passed (the storefront is probably rotating).
    pub settle: Duration,
    /// How far ahead an end time is waited on exactly.
    pub horizon: Duration,
    /// Whether this source reports end times worth waiting on.
    pub track_deadline: bool,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30 * 60),
            retry: Duration::from_secs(5 * 60),
            settle: Duration::from_secs(10 * 60),
            horizon: Duration::from_secs(24 * 3600),
            track_deadline: false,
        }
    }
}

/// Result of one pipeline run, as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "deadline", rename_all = "snake_case")]
pub enum ScheduleState {
    #[default]
    Normal,
    RetrySoon,
    AwaitingDeadline(DateTime<Utc>),
}

impl ScheduleState {
    /// Next state from the last cycle's result and the nearest known end time.
    pub fn transition(
        result: CycleResult,
        nearest_deadline: Option<DateTime<Utc>>,
        policy: &IntervalPolicy,
    ) -> Self {
        match (result, nearest_deadline) {
            (CycleResult::Failed, _) => ScheduleState::RetrySoon,
            (CycleResult::Succeeded, Some(t)) if policy.track_deadline => {
                ScheduleState::AwaitingDeadline(t)
            }
            (CycleResult::Succeeded, _) => ScheduleState::Normal,
        }
    }

    /// How long to sleep before the next cycle.
    pub fn sleep_for(&self, now: DateTime<Utc>, policy: &IntervalPolicy) -> Duration {
        match self {
            ScheduleState::Normal => policy.default,
            ScheduleState::RetrySoon => policy.retry,
            ScheduleState::AwaitingDeadline(deadline) => match (*deadline - now).to_std() {
                Ok(remaining) if remaining.is_zero() => policy.settle,
                Ok(remaining) if remaining <= policy.horizon => remaining,
                Ok(_) => policy.default,
                // Already passed.
                Err(_) => policy.settle,
            },
        }
    }
}

/// Cooperative stop signal. Cloning shares the same flag.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `trigger` has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
