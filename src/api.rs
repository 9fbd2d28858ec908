// src/api.rs
//! Read-only admin surface: liveness, per-source status and the current-deals view.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::context::AppContext;
use crate::events::current_deals;
use crate::render::{Embed, Viewport};
use crate::schedule::ScheduleState;
use crate::source::SourceId;

#[derive(Clone)]
pub struct ApiState {
    ctx: Arc<AppContext>,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/stats", get(stats))
        .route("/api/deals/{source}", get(deals))
        .layer(CorsLayer::very_permissive())
        .with_state(ApiState { ctx })
}

#[derive(Serialize)]
struct SourceStats {
    id: String,
    name: String,
    deals: usize,
    active: usize,
    has_media: bool,
    schedule: ScheduleState,
    cycles: u64,
    last_result: Option<&'static str>,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct StatsResp {
    sources: Vec<SourceStats>,
    destinations: Option<usize>,
}

async fn stats(State(state): State<ApiState>) -> Json<StatsResp> {
    let sources = state
        .ctx
        .sources()
        .iter()
        .map(|entry| {
            let s = entry.snapshot();
            let status = entry.status();
            SourceStats {
                id: s.id.to_string(),
                deals: s.deals().len(),
                active: s.active_deals().count(),
                has_media: s.media.is_some(),
                name: s.name,
                schedule: status.state,
                cycles: status.cycles,
                last_result: status.last_result,
                last_run: status.last_run,
                next_run: status.next_run,
            }
        })
        .collect();
    let destinations = match state.ctx.store.list_destinations().await {
        Ok(list) => Some(list.len()),
        Err(e) => {
            tracing::warn!("listing destinations for stats failed: {e:#}");
            None
        }
    };
    Json(StatsResp {
        sources,
        destinations,
    })
}

#[derive(Deserialize)]
struct DealsQuery {
    #[serde(default)]
    viewport: Viewport,
}

#[derive(Serialize)]
struct DealsResp {
    source: String,
    content: Option<String>,
    embed: Option<Embed>,
    attachment: Option<String>,
}

async fn deals(
    State(state): State<ApiState>,
    Path(source): Path<String>,
    Query(q): Query<DealsQuery>,
) -> Result<Json<DealsResp>, StatusCode> {
    let msg = current_deals(&state.ctx, &SourceId::new(source.clone()), q.viewport)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(DealsResp {
        source,
        content: msg.content,
        embed: msg.embed,
        attachment: msg.attachment.map(|a| a.filename),
    }))
}
