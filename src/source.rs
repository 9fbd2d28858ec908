// src/source.rs
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::deal::Deal;
use crate::render::RendererKind;
use crate::schedule::IntervalPolicy;

/// Stable storefront identifier (`epic`, `gog`, ...). Also the store key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which platforms a source feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    #[serde(default = "yes")]
    pub chat: bool,
    #[serde(default)]
    pub microblog: bool,
    #[serde(default)]
    pub social: bool,
}

fn yes() -> bool {
    true
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            chat: true,
            microblog: false,
            social: false,
        }
    }
}

/// How artwork is arranged into frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaLayout {
    /// One frame per active deal.
    #[default]
    Sequence,
    /// Each current deal side by side with an upcoming one.
    Paired,
}

/// Composed attachments. Always regenerated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSet {
    /// Looping GIF for chat embeds.
    pub wide: Bytes,
    /// Half-height GIF used by the command view and the microblog post.
    pub mobile: Bytes,
    /// MP4 clip for the social feed; absent when encoding failed.
    pub clip: Option<Bytes>,
}

/// A tracked storefront.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    /// Landing page used when deals are summarized instead of listed.
    pub url: String,
    pub data: Option<Vec<Deal>>,
    pub media: Option<MediaSet>,
    pub channels: Channels,
    pub emoji: Option<String>,
    pub renderer: RendererKind,
    pub layout: MediaLayout,
    pub schedule: IntervalPolicy,
    pub subscribe_by_default: bool,
}

impl Source {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(id),
            name: name.into(),
            url: url.into(),
            data: None,
            media: None,
            channels: Channels::default(),
            emoji: None,
            renderer: RendererKind::default(),
            layout: MediaLayout::default(),
            schedule: IntervalPolicy::default(),
            subscribe_by_default: false,
        }
    }

    pub fn deals(&self) -> &[Deal] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn active_deals(&self) -> impl Iterator<Item = &Deal> {
        self.deals().iter().filter(|d| d.active)
    }

    pub fn has_active_deals(&self) -> bool {
        self.active_deals().next().is_some()
    }

    /// Forget deals and every composed artifact.
    pub fn clear(&mut self) {
        self.data = None;
        self.media = None;
    }
}
