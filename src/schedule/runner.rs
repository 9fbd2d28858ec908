// src/schedule/runner.rs
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, Id, JoinSet};

use super::{CycleResult, ScheduleState, Shutdown};
use crate::context::AppContext;
use crate::deal::nearest_end;
use crate::pipeline::run_cycle;

/// Work item owned by the scheduler; the index points into `AppContext::sources`.
enum Unit {
    Slept(usize),
    Cycled(usize, CycleResult),
}

struct Tracked {
    index: usize,
    /// Present while the unit is only sleeping, so shutdown can cut it short.
    sleep: Option<AbortHandle>,
}

/// Drives one independent cycle loop per source until shutdown.
///
/// A panic or failure in one source's cycle only affects that source: it is recorded as a
/// failed cycle and the source is re-armed with its retry delay.
pub struct Scheduler {
    ctx: Arc<AppContext>,
    units: JoinSet<Unit>,
    tracked: HashMap<Id, Tracked>,
}

impl Scheduler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            units: JoinSet::new(),
            tracked: HashMap::new(),
        }
    }

    fn spawn_cycle(&mut self, index: usize) {
        let ctx = self.ctx.clone();
        let handle = self.units.spawn(async move {
            let entry = ctx.sources()[index].clone();
            let report = run_cycle(&ctx, &entry).await;
            Unit::Cycled(index, report.result)
        });
        self.tracked.insert(handle.id(), Tracked { index, sleep: None });
    }

    fn spawn_sleep(&mut self, index: usize, delay: Duration) {
        let handle = self.units.spawn(async move {
            tokio::time::sleep(delay).await;
            Unit::Slept(index)
        });
        self.tracked.insert(
            handle.id(),
            Tracked {
                index,
                sleep: Some(handle),
            },
        );
    }

    /// Compute the next state for a source and arm its timer.
    fn after_cycle(&mut self, index: usize, result: CycleResult, rearm: bool) {
        let entry = self.ctx.sources()[index].clone();
        let source = entry.snapshot();
        let policy = source.schedule;
        let state = ScheduleState::transition(result, nearest_end(source.deals()), &policy);
        let now = Utc::now();
        let delay = state.sleep_for(now, &policy);
        let next_run = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        entry.record_cycle(result, state, next_run);
        tracing::info!(
            source = %entry.id(),
            ?result,
            ?state,
            sleep_secs = delay.as_secs(),
            "cycle finished"
        );
        if rearm {
            self.spawn_sleep(index, delay);
        }
    }

    /// Run until `shutdown` triggers. Sleeping sources stop immediately; cycles already in
    /// flight finish (their fan-out included) but are not re-armed.
    pub async fn run(mut self, shutdown: Shutdown) {
        let count = self.ctx.sources().len();
        tracing::info!(sources = count, "scheduler starting");
        for index in 0..count {
            self.spawn_cycle(index);
        }

        let mut draining = shutdown.is_set();
        if draining {
            self.abort_sleepers();
        }
        loop {
            let next = if draining {
                self.units.join_next_with_id().await
            } else {
                tokio::select! {
                    _ = shutdown.wait() => {
                        tracing::info!("shutdown requested, draining in-flight cycles");
                        draining = true;
                        self.abort_sleepers();
                        continue;
                    }
                    next = self.units.join_next_with_id() => next,
                }
            };
            let Some(next) = next else {
                break;
            };

            match next {
                Ok((id, Unit::Slept(index))) => {
                    self.tracked.remove(&id);
                    if !draining {
                        self.spawn_cycle(index);
                    }
                }
                Ok((id, Unit::Cycled(index, result))) => {
                    self.tracked.remove(&id);
                    self.after_cycle(index, result, !draining);
                }
                Err(e) => {
                    let Some(t) = self.tracked.remove(&e.id()) else {
                        continue;
                    };
                    if e.is_cancelled() {
                        continue;
                    }
                    let source = self.ctx.sources()[t.index].id().clone();
                    tracing::error!(source = %source, "source task panicked: {e}");
                    self.after_cycle(t.index, CycleResult::Failed, !draining);
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    fn abort_sleepers(&self) {
        for t in self.tracked.values() {
            if let Some(h) = &t.sleep {
                h.abort();
            }
        }
    }
}
