// src/notify/mod.rs
//! Fan-out of one source's change to chat destinations, the microblog and the social feed.

pub mod chat;
pub mod discord;
pub mod microblog;
pub mod social;

use futures::stream::{self, StreamExt};
use metrics::counter;
use std::sync::Arc;

use crate::destination::{DestinationRecord, GuildId, UserId};
use crate::render::{render_microblog, render_social};
use crate::source::Source;
use crate::store::DocumentStore;

pub use chat::{ChatError, ChatPlatform, DeliveryOutcome, DestinationDelivery, GuildInfo};
pub use discord::DiscordClient;
pub use microblog::{MicroblogClient, XClient};
pub use social::{BlueskyClient, SocialClient};

/// Result of one single-post platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOutcome {
    /// Not configured for this source, or nothing to post.
    Skipped,
    Posted(String),
    Failed,
}

impl PlatformOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            PlatformOutcome::Skipped => "skipped",
            PlatformOutcome::Posted(_) => "posted",
            PlatformOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub chat: Vec<DestinationDelivery>,
    pub microblog: PlatformOutcome,
    pub social: PlatformOutcome,
}

impl FanoutReport {
    pub fn chat_outcome(&self, destination: GuildId) -> Option<DeliveryOutcome> {
        self.chat
            .iter()
            .find(|d| d.destination == destination)
            .map(|d| d.outcome)
    }
}

pub struct Fanout {
    store: Arc<dyn DocumentStore>,
    chat: Option<Arc<dyn ChatPlatform>>,
    microblog: Option<Arc<dyn MicroblogClient>>,
    social: Option<Arc<dyn SocialClient>>,
    admin_user: Option<UserId>,
    concurrency: usize,
}

impl Fanout {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            chat: None,
            microblog: None,
            social: None,
            admin_user: None,
            concurrency: 8,
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatPlatform>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_microblog(mut self, client: Arc<dyn MicroblogClient>) -> Self {
        self.microblog = Some(client);
        self
    }

    pub fn with_social(mut self, client: Arc<dyn SocialClient>) -> Self {
        self.social = Some(client);
        self
    }

    /// Chat user who receives the URLs of microblog and social posts.
    pub fn with_admin(mut self, user: Option<UserId>) -> Self {
        self.admin_user = user;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn chat(&self) -> Option<&Arc<dyn ChatPlatform>> {
        self.chat.as_ref()
    }

    /// Deliver `source`'s current content everywhere it is configured to go. Every platform
    /// and destination is isolated; failures are logged and reported, never raised.
    pub async fn notify(&self, source: &Source) -> FanoutReport {
        let (chat, microblog, social) = tokio::join!(
            self.notify_chat(source),
            self.notify_microblog(source),
            self.notify_social(source)
        );
        tracing::info!(
            source = %source.id,
            destinations = chat.len(),
            microblog = microblog.as_str(),
            social = social.as_str(),
            "fan-out finished"
        );
        FanoutReport {
            chat,
            microblog,
            social,
        }
    }

    async fn notify_chat(&self, source: &Source) -> Vec<DestinationDelivery> {
        let Some(chat) = self.chat.as_deref().filter(|_| source.channels.chat) else {
            return Vec::new();
        };
        let destinations = match self.store.list_destinations().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(source = %source.id, "listing destinations failed: {e:#}");
                return Vec::new();
            }
        };

        let cache = chat::PermissionCache::default();
        let cache = &cache;
        stream::iter(destinations.into_iter().filter(|d| d.wants(&source.id)))
            .map(|record| async move {
                let delivery = chat::deliver(chat, cache, &record, source).await;
                counter!("deliveries_total", "platform" => "chat", "outcome" => delivery.outcome.as_str())
                    .increment(1);

                if let Some(perms) = delivery.permissions.filter(|p| record.last_permissions != Some(*p)) {
                    // Patch the stored record, not our copy: settings may have changed during the sends.
                    let patch = Box::new(move |current: Option<DestinationRecord>| {
                        let mut rec = current?;
                        if rec.last_permissions == Some(perms) {
                            return None;
                        }
                        rec.last_permissions = Some(perms);
                        Some(rec)
                    });
                    if let Err(e) = self.store.update_destination(record.destination_id, patch).await {
                        tracing::warn!(destination = record.destination_id, "saving permission state failed: {e:#}");
                    }
                }
                delivery
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn notify_microblog(&self, source: &Source) -> PlatformOutcome {
        let Some(client) = self.microblog.as_ref().filter(|_| source.channels.microblog) else {
            return PlatformOutcome::Skipped;
        };
        let text = match render_microblog(source) {
            Ok((tier, text)) => {
                tracing::debug!(source = %source.id, ?tier, "microblog text rendered");
                text
            }
            Err(e) => {
                tracing::warn!(source = %source.id, platform = "microblog", error = %e, "nothing posted");
                counter!("deliveries_total", "platform" => "microblog", "outcome" => "format_error")
                    .increment(1);
                return PlatformOutcome::Failed;
            }
        };
        let gif = source.media.as_ref().map(|m| m.mobile.clone());
        let outcome = match client.post(&text, gif).await {
            Ok(url) => PlatformOutcome::Posted(url),
            Err(e) => {
                tracing::warn!(source = %source.id, platform = "microblog", "post failed: {e:#}");
                PlatformOutcome::Failed
            }
        };
        counter!("deliveries_total", "platform" => "microblog", "outcome" => outcome.as_str())
            .increment(1);
        self.log_to_admin(source, "microblog", &outcome).await;
        outcome
    }

    async fn notify_social(&self, source: &Source) -> PlatformOutcome {
        let Some(client) = self.social.as_ref().filter(|_| source.channels.social) else {
            return PlatformOutcome::Skipped;
        };
        let Some(post) = render_social(source) else {
            return PlatformOutcome::Skipped;
        };
        let clip = source.media.as_ref().and_then(|m| m.clip.clone());
        let outcome = match client.post(&post, clip).await {
            Ok(url) => PlatformOutcome::Posted(url),
            Err(e) => {
                tracing::warn!(source = %source.id, platform = "social", "post failed: {e:#}");
                PlatformOutcome::Failed
            }
        };
        counter!("deliveries_total", "platform" => "social", "outcome" => outcome.as_str())
            .increment(1);
        self.log_to_admin(source, "social", &outcome).await;
        outcome
    }

    async fn log_to_admin(&self, source: &Source, platform: &str, outcome: &PlatformOutcome) {
        let (Some(chat), Some(admin), PlatformOutcome::Posted(url)) =
            (self.chat.as_ref(), self.admin_user, outcome)
        else {
            return;
        };
        let text = format!("Posted {} deals to {platform}: {url}", source.name);
        if let Err(e) = chat.direct_message(admin, &text).await {
            tracing::debug!(platform, error = %e, "admin log DM failed");
        }
    }
}
