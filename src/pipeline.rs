// src/pipeline.rs
//! One cycle of one source: fetch, reconcile, compose, notify, persist. Stages run strictly
//! in order; the source's slot is only written once the cycle has something consistent.

use metrics::counter;

use crate::context::{AppContext, SourceEntry};
use crate::notify::FanoutReport;
use crate::reconcile::reconcile;
use crate::schedule::CycleResult;

#[derive(Debug)]
pub struct CycleReport {
    pub result: CycleResult,
    pub changed: bool,
    pub fanout: Option<FanoutReport>,
}

impl CycleReport {
    fn failed() -> Self {
        Self {
            result: CycleResult::Failed,
            changed: false,
            fanout: None,
        }
    }
}

pub async fn run_cycle(ctx: &AppContext, entry: &SourceEntry) -> CycleReport {
    let report = cycle(ctx, entry).await;
    let outcome = match (report.result, report.changed) {
        (CycleResult::Failed, _) => "failed",
        (CycleResult::Succeeded, true) => "changed",
        (CycleResult::Succeeded, false) => "unchanged",
    };
    counter!("scheduler_cycles_total", "source" => entry.id().to_string(), "outcome" => outcome)
        .increment(1);
    report
}

async fn cycle(ctx: &AppContext, entry: &SourceEntry) -> CycleReport {
    let mut source = entry.snapshot();
    let id = source.id.clone();

    let fetched = match entry.adapter().fetch(&source).await {
        Ok(deals) => deals,
        Err(e) => {
            tracing::warn!(source = %id, stage = "fetch", adapter = entry.adapter().name(), "scrape failed: {e:#}");
            return CycleReport::failed();
        }
    };

    let changed = match reconcile(&mut source, Some(fetched), ctx.store.as_ref()).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(source = %id, stage = "reconcile", "{e:#}");
            return CycleReport::failed();
        }
    };

    if changed {
        match ctx
            .compositor
            .compose(&id, source.deals(), source.layout)
            .await
        {
            Ok(media) => source.media = media,
            Err(e) => {
                // The slot keeps the previous list, so the retry detects the change again.
                tracing::warn!(source = %id, stage = "media", error = %e, "media failed, notification suppressed");
                return CycleReport::failed();
            }
        }
    }

    entry.replace(source.clone());

    let fanout = if changed && source.has_active_deals() {
        Some(ctx.fanout.notify(&source).await)
    } else {
        if changed {
            tracing::info!(source = %id, "list changed but nothing is live, not notifying");
        }
        None
    };

    if let Err(e) = ctx.store.save_deals(&id, source.deals()).await {
        tracing::warn!(source = %id, stage = "persist", "saving deals failed: {e:#}");
    }
    if let (true, Some(media)) = (changed, &source.media) {
        if let Err(e) = ctx.store.save_image(&id, &media.wide).await {
            tracing::warn!(source = %id, stage = "persist", "saving image failed: {e:#}");
        }
    }

    CycleReport {
        result: CycleResult::Succeeded,
        changed,
        fanout,
    }
}
