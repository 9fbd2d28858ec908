// src/context.rs
//! Shared application state: the tracked sources and the services their pipelines use.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::adapter::SourceAdapter;
use crate::config::{NotifierConfig, Secrets, StoreConfig};
use crate::media::{ClipEncoder, Compositor, FfmpegClipEncoder, HttpArtworkFetcher};
use crate::notify::{BlueskyClient, DiscordClient, Fanout, XClient};
use crate::schedule::{CycleResult, ScheduleState};
use crate::source::{MediaSet, Source, SourceId};
use crate::store::{DocumentStore, FileStore, MemoryStore};

/// Scheduling bookkeeping exposed on the admin surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStatus {
    pub state: ScheduleState,
    pub cycles: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<&'static str>,
    pub next_run: Option<DateTime<Utc>>,
}

/// One tracked source: its state slot, its scraper and its schedule status.
///
/// The slot is only written by the source's own pipeline run; readers get clones.
pub struct SourceEntry {
    id: SourceId,
    slot: RwLock<Source>,
    adapter: Arc<dyn SourceAdapter>,
    status: RwLock<SourceStatus>,
}

impl SourceEntry {
    pub fn new(source: Source, adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            id: source.id.clone(),
            slot: RwLock::new(source),
            adapter,
            status: RwLock::new(SourceStatus::default()),
        }
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn adapter(&self) -> &dyn SourceAdapter {
        self.adapter.as_ref()
    }

    pub fn snapshot(&self) -> Source {
        match self.slot.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, source: Source) {
        match self.slot.write() {
            Ok(mut g) => *g = source,
            Err(poisoned) => *poisoned.into_inner() = source,
        }
    }

    pub fn status(&self) -> SourceStatus {
        match self.status.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn record_cycle(
        &self,
        result: CycleResult,
        state: ScheduleState,
        next_run: DateTime<Utc>,
    ) {
        let mut g = match self.status.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        g.state = state;
        g.cycles += 1;
        g.last_run = Some(Utc::now());
        g.last_result = Some(match result {
            CycleResult::Succeeded => "succeeded",
            CycleResult::Failed => "failed",
        });
        g.next_run = Some(next_run);
    }
}

pub struct AppContext {
    sources: Vec<Arc<SourceEntry>>,
    pub store: Arc<dyn DocumentStore>,
    pub compositor: Compositor,
    pub fanout: Fanout,
}

impl AppContext {
    pub fn new(store: Arc<dyn DocumentStore>, compositor: Compositor, fanout: Fanout) -> Self {
        Self {
            sources: Vec::new(),
            store,
            compositor,
            fanout,
        }
    }

    pub fn with_source(mut self, source: Source, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.sources.push(Arc::new(SourceEntry::new(source, adapter)));
        self
    }

    pub fn sources(&self) -> &[Arc<SourceEntry>] {
        &self.sources
    }

    pub fn source(&self, id: &SourceId) -> Option<&Arc<SourceEntry>> {
        self.sources.iter().find(|e| e.id() == id)
    }

    /// Load every source's persisted list and image so the first cycle compares against
    /// what was last announced instead of announcing everything again.
    pub async fn hydrate_from_store(&self) {
        for entry in &self.sources {
            let mut source = entry.snapshot();
            match self.store.load_deals(&source.id).await {
                Ok(deals) if !deals.is_empty() => source.data = Some(deals),
                Ok(_) => {}
                Err(e) => tracing::warn!(source = %source.id, "loading persisted deals failed: {e:#}"),
            }
            match self.store.load_image(&source.id).await {
                // Only the wide GIF is persisted; it stands in for the mobile one until the
                // next regeneration.
                Ok(Some(img)) => {
                    source.media = Some(MediaSet {
                        wide: img.clone(),
                        mobile: img,
                        clip: None,
                    })
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(source = %source.id, "loading persisted image failed: {e:#}"),
            }
            tracing::info!(
                source = %source.id,
                deals = source.deals().len(),
                image = source.media.is_some(),
                "source hydrated"
            );
            entry.replace(source);
        }
    }

    /// Wire the production services from configuration and environment credentials.
    pub async fn from_config(cfg: &NotifierConfig, secrets: &Secrets) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match &cfg.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::File { root } => Arc::new(
                FileStore::open(root)
                    .await
                    .with_context(|| format!("opening store at {}", root.display()))?,
            ),
        };

        let media = cfg.media.media_config();
        let clip: Option<Arc<dyn ClipEncoder>> = cfg
            .media
            .ffmpeg
            .as_ref()
            .map(|bin| Arc::new(FfmpegClipEncoder::new(bin)) as Arc<dyn ClipEncoder>);
        let compositor = Compositor::new(
            Arc::new(HttpArtworkFetcher::new(media.fetch_timeout)),
            clip,
            media,
        );

        let mut fanout = Fanout::new(store.clone())
            .with_concurrency(cfg.scheduler.fanout_concurrency)
            .with_admin(secrets.admin_user);
        match &secrets.discord_token {
            Some(token) => fanout = fanout.with_chat(Arc::new(DiscordClient::new(token.clone()))),
            None => tracing::warn!("DISCORD_BOT_TOKEN not set, chat delivery disabled"),
        }
        if let Some(token) = &secrets.x_token {
            fanout = fanout.with_microblog(Arc::new(XClient::new(token.clone())));
        }
        if let Some((handle, password)) = &secrets.bsky {
            fanout = fanout.with_social(Arc::new(BlueskyClient::new(handle.clone(), password.clone())));
        }

        let mut ctx = Self::new(store, compositor, fanout);
        for sc in &cfg.sources {
            let adapter = sc
                .adapter
                .build()
                .with_context(|| format!("building adapter for source `{}`", sc.id))?;
            ctx = ctx.with_source(sc.to_source(), adapter);
        }
        Ok(ctx)
    }
}
