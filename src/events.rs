// src/events.rs
//! Chat-side events (guild joins/leaves, settings changes, reaction opt-ins) and the
//! read-only "current deals" command.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeSet;

use crate::context::AppContext;
use crate::destination::{ChannelId, DestinationRecord, GuildId, RoleId};
use crate::notify::chat::PermissionCache;
use crate::notify::ChatPlatform;
use crate::render::{current_deals_message, ChatMessage, Viewport};
use crate::source::SourceId;

/// A settings update from the chat UI. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub channel: Option<ChannelId>,
    /// `Some(None)` removes the mention role.
    pub role: Option<Option<RoleId>>,
    pub subscriptions: Option<BTreeSet<SourceId>>,
}

/// First channel the bot can fully post in, system channel first.
async fn pick_default_channel(
    chat: &dyn ChatPlatform,
    guild: GuildId,
) -> Result<(Option<ChannelId>, Option<String>)> {
    let info = chat
        .guild(guild)
        .await
        .with_context(|| format!("looking up guild {guild}"))?;
    let cache = PermissionCache::default();
    let candidates = info
        .system_channel
        .into_iter()
        .chain(info.text_channels.iter().copied());
    for channel in candidates {
        if let Ok(p) = cache.get(chat, channel).await {
            if p.is_complete() {
                return Ok((Some(channel), Some(info.name)));
            }
        }
    }
    Ok((None, Some(info.name)))
}

fn welcome(ctx: &AppContext, record: &DestinationRecord) -> String {
    let mut out = String::from("Thanks for adding me! I'll post new free games here");
    let names: Vec<String> = ctx
        .sources()
        .iter()
        .map(|e| e.snapshot())
        .filter(|s| record.subscriptions.contains(&s.id))
        .map(|s| s.name)
        .collect();
    if !names.is_empty() {
        out.push_str(&format!(" from {}", names.join(", ")));
    }
    out.push_str(". React with a store's emoji to subscribe or unsubscribe.");
    out
}

pub async fn on_destination_joined(ctx: &AppContext, guild: GuildId) -> Result<DestinationRecord> {
    let defaults: BTreeSet<SourceId> = ctx
        .sources()
        .iter()
        .map(|e| e.snapshot())
        .filter(|s| s.subscribe_by_default)
        .map(|s| s.id)
        .collect();

    let mut found = (None, None);
    if let Some(chat) = ctx.fanout.chat() {
        match pick_default_channel(chat.as_ref(), guild).await {
            Ok(picked) => found = picked,
            Err(e) => tracing::warn!(destination = guild, "default channel lookup failed: {e:#}"),
        }
    }
    let (channel, name) = found;

    let join = Box::new(move |current: Option<DestinationRecord>| {
        let mut record = current.unwrap_or_else(|| DestinationRecord::new(guild));
        record.joined_at = Some(Utc::now());
        if record.subscriptions.is_empty() {
            record.subscriptions = defaults;
        }
        if name.is_some() {
            record.name = name;
        }
        if record.channel_id.is_none() {
            record.channel_id = channel;
        }
        Some(record)
    });
    let record = ctx
        .store
        .update_destination(guild, join)
        .await?
        .context("destination record missing after join")?;
    tracing::info!(
        destination = guild,
        channel = ?record.channel_id,
        subscriptions = record.subscriptions.len(),
        "destination joined"
    );

    if let (Some(chat), Some(channel)) = (ctx.fanout.chat(), record.channel_id) {
        if let Err(e) = chat.send(channel, &ChatMessage::text(welcome(ctx, &record))).await {
            tracing::warn!(destination = guild, channel, error = %e, "welcome message failed");
        }
    }
    Ok(record)
}

pub async fn on_destination_removed(ctx: &AppContext, guild: GuildId) -> Result<bool> {
    let removed = ctx.store.delete_destination(guild).await?;
    tracing::info!(destination = guild, removed, "destination removed");
    Ok(removed)
}

pub async fn on_user_config_changed(
    ctx: &AppContext,
    guild: GuildId,
    change: ConfigChange,
) -> Result<DestinationRecord> {
    // Probe the new channel before taking the store lock.
    let mut probed = None;
    if let (Some(channel), Some(chat)) = (change.channel, ctx.fanout.chat()) {
        match chat.channel_permissions(channel).await {
            Ok(p) => probed = Some(p),
            Err(e) => tracing::debug!(destination = guild, channel, error = %e, "permission probe failed"),
        }
    }
    let subscriptions = change.subscriptions.map(|subs| {
        let (known, unknown): (BTreeSet<SourceId>, BTreeSet<SourceId>) =
            subs.into_iter().partition(|id| ctx.source(id).is_some());
        if !unknown.is_empty() {
            tracing::warn!(destination = guild, ?unknown, "ignoring unknown sources");
        }
        known
    });

    let apply = Box::new(move |current: Option<DestinationRecord>| {
        let mut record = current.unwrap_or_else(|| DestinationRecord::new(guild));
        if let Some(channel) = change.channel {
            record.channel_id = Some(channel);
            record.last_permissions = probed;
        }
        if let Some(role) = change.role {
            record.role_id = role;
        }
        if let Some(subs) = subscriptions {
            record.subscriptions = subs;
        }
        Some(record)
    });
    ctx.store
        .update_destination(guild, apply)
        .await?
        .context("destination record missing after settings change")
}

/// Toggle a subscription by a source's emoji. `Ok(None)` when no source uses that emoji.
pub async fn on_reaction_toggled(
    ctx: &AppContext,
    guild: GuildId,
    emoji: &str,
    added: bool,
) -> Result<Option<DestinationRecord>> {
    let Some(source) = ctx
        .sources()
        .iter()
        .map(|e| e.snapshot())
        .find(|s| s.emoji.as_deref() == Some(emoji))
    else {
        return Ok(None);
    };

    let id = source.id.clone();
    let toggle = Box::new(move |current: Option<DestinationRecord>| {
        let mut record = current.unwrap_or_else(|| DestinationRecord::new(guild));
        let changed = if added {
            record.subscriptions.insert(id)
        } else {
            record.subscriptions.remove(&id)
        };
        changed.then_some(record)
    });
    let record = ctx
        .store
        .update_destination(guild, toggle)
        .await?
        .unwrap_or_else(|| DestinationRecord::new(guild));
    tracing::info!(destination = guild, source = %source.id, added, "subscription toggled");
    Ok(Some(record))
}

/// What a user sees when asking for a source's deals. Never triggers a notification.
pub fn current_deals(ctx: &AppContext, source: &SourceId, viewport: Viewport) -> Option<ChatMessage> {
    ctx.source(source)
        .map(|e| current_deals_message(&e.snapshot(), viewport))
}
