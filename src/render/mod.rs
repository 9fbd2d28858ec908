// src/render/mod.rs
//! Platform content built from a source's deal list.

pub mod embed;
pub mod microblog;
pub mod social;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::source::Source;

pub use embed::{Embed, EmbedField};
pub use microblog::{render_microblog, MicroblogTier, RenderError, MICROBLOG_BUDGET};
pub use social::{render_social, LinkFacet, SocialPost};

pub const EMBED_COLOR: u32 = 0x00aff4;
/// Name the wide GIF is uploaded under; embeds reference it as `attachment://img.gif`.
pub const ATTACHMENT_NAME: &str = "img.gif";

/// Chat embed layout, chosen per source at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// "Free Now" / "Up Next" columns.
    Showcase,
    /// One field per deal.
    Listing,
    /// Two-column grid that wraps at the field size limit.
    #[default]
    Grid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewport {
    #[default]
    Desktop,
    Mobile,
}

impl RendererKind {
    pub fn render(&self, source: &Source, viewport: Viewport) -> Embed {
        match self {
            RendererKind::Showcase => embed::showcase(source, viewport),
            RendererKind::Listing => embed::listing(source),
            RendererKind::Grid => embed::grid(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Bytes,
}

/// What gets posted to one chat channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub attachment: Option<Attachment>,
}

impl ChatMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Rich announcement for a source: embed plus the composed GIF when there is one.
pub fn chat_announcement(source: &Source, viewport: Viewport) -> ChatMessage {
    let image = source.media.as_ref().map(|m| match viewport {
        Viewport::Desktop => m.wide.clone(),
        Viewport::Mobile => m.mobile.clone(),
    });
    let mut embed = source.renderer.render(source, viewport);
    if image.is_none() {
        embed.image_url = None;
    }
    ChatMessage {
        content: None,
        embed: Some(embed),
        attachment: image.map(|data| Attachment {
            filename: ATTACHMENT_NAME.to_string(),
            data,
        }),
    }
}

/// The read-only "current deals" view. Same content as a notification, minus any mention.
pub fn current_deals_message(source: &Source, viewport: Viewport) -> ChatMessage {
    if source.has_active_deals() {
        chat_announcement(source, viewport)
    } else {
        ChatMessage::text(format!("No free games on {}", source.name))
    }
}
