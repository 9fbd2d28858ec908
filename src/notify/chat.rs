// src/notify/chat.rs
//! Chat platform seam and the per-destination delivery guard.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::destination::{ChannelId, ChannelPermissions, DestinationRecord, GuildId, RoleId, UserId};
use crate::render::{chat_announcement, ChatMessage, Viewport};
use crate::source::Source;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("missing access")]
    Forbidden,
    #[error("unknown channel, guild or user")]
    NotFound,
    #[error(transparent)]
    Http(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    pub system_channel: Option<ChannelId>,
    /// Text channels in display order.
    pub text_channels: Vec<ChannelId>,
}

#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Effective permissions of the bot in `channel`.
    async fn channel_permissions(&self, channel: ChannelId) -> Result<ChannelPermissions, ChatError>;
    async fn send(&self, channel: ChannelId, message: &ChatMessage) -> Result<(), ChatError>;
    async fn guild(&self, guild: GuildId) -> Result<GuildInfo, ChatError>;
    async fn direct_message(&self, user: UserId, text: &str) -> Result<(), ChatError>;

    /// The role every member holds. Discord reuses the guild id for it.
    fn default_role(&self, guild: GuildId) -> RoleId {
        guild
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Full announcement posted.
    Delivered,
    /// Only a permission notice went out.
    Degraded,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Degraded => "degraded",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationDelivery {
    pub destination: GuildId,
    pub outcome: DeliveryOutcome,
    /// Permission state observed in the target channel, when it could be read.
    pub permissions: Option<ChannelPermissions>,
}

/// Channel permission lookups memoized for one fan-out call.
#[derive(Default)]
pub struct PermissionCache {
    seen: Mutex<HashMap<ChannelId, ChannelPermissions>>,
}

impl PermissionCache {
    pub async fn get(
        &self,
        chat: &dyn ChatPlatform,
        channel: ChannelId,
    ) -> Result<ChannelPermissions, ChatError> {
        if let Some(p) = self.cached(channel) {
            return Ok(p);
        }
        let p = chat.channel_permissions(channel).await?;
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(channel, p);
        }
        Ok(p)
    }

    fn cached(&self, channel: ChannelId) -> Option<ChannelPermissions> {
        self.seen.lock().ok().and_then(|m| m.get(&channel).copied())
    }
}

pub fn mention(chat: &dyn ChatPlatform, guild: GuildId, role: Option<RoleId>) -> Option<String> {
    let role = role?;
    if role == chat.default_role(guild) {
        Some("@everyone".to_string())
    } else {
        Some(format!("<@&{role}>"))
    }
}

/// Plain-text notice listing what is granted and what is missing in `channel`.
pub fn deficiency_notice(source: &Source, channel: ChannelId, perms: &ChannelPermissions) -> String {
    let mut out = format!(
        "I couldn't post the latest {} free games in <#{channel}>. Please grant me these permissions there:",
        source.name
    );
    for (label, granted) in perms.checklist() {
        let mark = if granted { "✅" } else { "❌" };
        out.push_str(&format!("\n{mark} {label}"));
    }
    out
}

/// Full announcement with content line and optional mention.
pub fn announcement(source: &Source, mention: Option<String>) -> ChatMessage {
    let mut msg = chat_announcement(source, Viewport::Desktop);
    let line = match mention {
        Some(m) => format!("New free games on {}! {m}", source.name),
        None => format!("New free games on {}!", source.name),
    };
    msg.content = Some(line);
    msg
}

/// Deliver one source's announcement to one destination, degrading to a permission notice
/// when the channel does not allow a full post.
pub async fn deliver(
    chat: &dyn ChatPlatform,
    cache: &PermissionCache,
    record: &DestinationRecord,
    source: &Source,
) -> DestinationDelivery {
    let guild = record.destination_id;
    let result = |outcome, permissions| DestinationDelivery {
        destination: guild,
        outcome,
        permissions,
    };
    let Some(channel) = record.channel_id else {
        return result(DeliveryOutcome::Failed, None);
    };

    let perms = match cache.get(chat, channel).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(source = %source.id, destination = guild, channel, error = %e, "permission lookup failed");
            return result(DeliveryOutcome::Failed, None);
        }
    };

    if perms.is_complete() {
        let msg = announcement(source, mention(chat, guild, record.role_id));
        return match chat.send(channel, &msg).await {
            Ok(()) => result(DeliveryOutcome::Delivered, Some(perms)),
            Err(e) => {
                tracing::warn!(source = %source.id, destination = guild, channel, error = %e, "announcement failed");
                result(DeliveryOutcome::Failed, Some(perms))
            }
        };
    }

    let notice = ChatMessage::text(deficiency_notice(source, channel, &perms));
    if perms.can_send() {
        // Partial rights: the notice stays in the target channel, no fallback.
        return match chat.send(channel, &notice).await {
            Ok(()) => result(DeliveryOutcome::Degraded, Some(perms)),
            Err(e) => {
                tracing::warn!(source = %source.id, destination = guild, channel, error = %e, "permission notice failed");
                result(DeliveryOutcome::Failed, Some(perms))
            }
        };
    }

    let outcome = if notify_elsewhere(chat, cache, guild, channel, &notice).await {
        DeliveryOutcome::Degraded
    } else {
        tracing::warn!(source = %source.id, destination = guild, "no reachable channel for permission notice, giving up");
        DeliveryOutcome::Failed
    };
    result(outcome, Some(perms))
}

/// System channel, then owner DM, then the first public text channel with send rights.
/// Stops at the first success.
async fn notify_elsewhere(
    chat: &dyn ChatPlatform,
    cache: &PermissionCache,
    guild: GuildId,
    blocked: ChannelId,
    notice: &ChatMessage,
) -> bool {
    let info = match chat.guild(guild).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(destination = guild, error = %e, "guild lookup failed");
            return false;
        }
    };

    if let Some(system) = info.system_channel.filter(|c| *c != blocked) {
        match chat.send(system, notice).await {
            Ok(()) => return true,
            Err(e) => tracing::debug!(destination = guild, channel = system, error = %e, "system channel refused notice"),
        }
    }

    let text = notice.content.as_deref().unwrap_or_default();
    match chat.direct_message(info.owner_id, text).await {
        Ok(()) => return true,
        Err(e) => tracing::debug!(destination = guild, owner = info.owner_id, error = %e, "owner DM refused notice"),
    }

    for channel in info.text_channels.iter().copied() {
        if channel == blocked || Some(channel) == info.system_channel {
            continue;
        }
        let sendable = cache
            .get(chat, channel)
            .await
            .map(|p| p.can_send())
            .unwrap_or(false);
        if sendable && chat.send(channel, notice).await.is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::RecordingChat;

    fn record(channel: ChannelId, role: Option<RoleId>) -> DestinationRecord {
        let mut r = DestinationRecord::new(10);
        r.channel_id = Some(channel);
        r.role_id = role;
        r.subscriptions.insert("epic".into());
        r
    }

    fn source() -> Source {
        let mut s = Source::new("epic", "Epic Games", "https://store.epicgames.com");
        s.data = Some(vec![crate::deal::Deal::new("Hades", "https://e/hades", true)]);
        s
    }

    #[test]
    fn default_role_mentions_everyone() {
        let chat = RecordingChat::new();
        assert_eq!(mention(&chat, 10, Some(10)).as_deref(), Some("@everyone"));
        assert_eq!(mention(&chat, 10, Some(77)).as_deref(), Some("<@&77>"));
        assert_eq!(mention(&chat, 10, None), None);
    }

    #[test]
    fn notice_lists_each_permission() {
        let perms = ChannelPermissions {
            view: true,
            send: true,
            ..Default::default()
        };
        let text = deficiency_notice(&source(), 5, &perms);
        assert!(text.contains("<#5>"));
        assert!(text.contains("✅ Send Messages"));
        assert!(text.contains("❌ Embed Links"));
        assert!(text.contains("❌ Attach Files"));
    }

    #[tokio::test]
    async fn cache_queries_each_channel_once() {
        let chat = RecordingChat::new().with_permissions(5, ChannelPermissions::ALL);
        let cache = PermissionCache::default();
        for _ in 0..3 {
            cache.get(&chat, 5).await.unwrap();
        }
        assert_eq!(chat.permission_queries(), 1);
    }

    #[tokio::test]
    async fn full_rights_post_announcement_with_mention() {
        let chat = RecordingChat::new().with_permissions(5, ChannelPermissions::ALL);
        let out = deliver(&chat, &PermissionCache::default(), &record(5, Some(10)), &source()).await;
        assert_eq!(out.outcome, DeliveryOutcome::Delivered);
        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 5);
        assert!(sent[0].1.embed.is_some());
        assert!(sent[0].1.content.as_deref().unwrap().ends_with("@everyone"));
    }
}
