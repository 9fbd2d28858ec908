// src/destination.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::source::SourceId;

pub type GuildId = u64;
pub type ChannelId = u64;
pub type RoleId = u64;
pub type UserId = u64;

/// Permission bits the bot needs in a notification channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPermissions {
    pub view: bool,
    pub send: bool,
    pub embed: bool,
    pub attach: bool,
}

impl ChannelPermissions {
    pub const ALL: Self = Self {
        view: true,
        send: true,
        embed: true,
        attach: true,
    };

    pub fn is_complete(&self) -> bool {
        self.view && self.send && self.embed && self.attach
    }

    pub fn can_send(&self) -> bool {
        self.view && self.send
    }

    /// `(label, granted)` pairs in display order.
    pub fn checklist(&self) -> [(&'static str, bool); 4] {
        [
            ("View Channel", self.view),
            ("Send Messages", self.send),
            ("Embed Links", self.embed),
            ("Attach Files", self.attach),
        ]
    }
}

/// One registered chat guild and what it wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub destination_id: GuildId,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub subscriptions: BTreeSet<SourceId>,
    #[serde(default)]
    pub last_permissions: Option<ChannelPermissions>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl DestinationRecord {
    pub fn new(destination_id: GuildId) -> Self {
        Self {
            destination_id,
            channel_id: None,
            role_id: None,
            subscriptions: BTreeSet::new(),
            last_permissions: None,
            name: None,
            joined_at: None,
        }
    }

    /// A destination receives a source's notifications only with a channel and a subscription.
    pub fn wants(&self, source: &SourceId) -> bool {
        self.channel_id.is_some() && self.subscriptions.contains(source)
    }
}
