// src/testkit.rs
//! In-process fakes for every external seam, shared by unit and integration tests.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use image::RgbaImage;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::adapter::SourceAdapter;
use crate::deal::Deal;
use crate::destination::{ChannelId, ChannelPermissions, GuildId, UserId};
use crate::media::{ArtworkFetcher, ClipEncoder, ClipSpec};
use crate::notify::{ChatError, ChatPlatform, GuildInfo, MicroblogClient, SocialClient};
use crate::render::{ChatMessage, SocialPost};
use crate::source::Source;

/// A `w` x `h` single-colour PNG.
pub fn solid_png(w: u32, h: u32, rgb: [u8; 3]) -> Bytes {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(rgb)));
    let mut buf = std::io::Cursor::new(Vec::new());
    if img.write_to(&mut buf, ImageFormat::Png).is_err() {
        return Bytes::new();
    }
    Bytes::from(buf.into_inner())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replays scripted fetch results; the last entry repeats once the script runs out.
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<Result<Vec<Deal>, String>>>,
    last: Mutex<Result<Vec<Deal>, String>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn always(deals: Vec<Deal>) -> Self {
        Self::sequence(vec![Ok(deals)])
    }

    pub fn failing(reason: &str) -> Self {
        Self::sequence(vec![Err(reason.to_string())])
    }

    pub fn sequence(script: Vec<Result<Vec<Deal>, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(&self, _source: &Source) -> Result<Vec<Deal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.script).pop_front();
        let res = match next {
            Some(r) => {
                *lock(&self.last) = r.clone();
                r
            }
            None => lock(&self.last).clone(),
        };
        res.map_err(|e| anyhow!(e))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Adapter whose fetch panics; exercises task isolation in the scheduler.
pub struct PanickingAdapter;

#[async_trait::async_trait]
impl SourceAdapter for PanickingAdapter {
    async fn fetch(&self, source: &Source) -> Result<Vec<Deal>> {
        panic!("adapter for {} blew up", source.id);
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// Serves a solid PNG for every URL except those containing `missing`.
#[derive(Default)]
pub struct StubArtwork {
    requests: AtomicUsize,
}

impl StubArtwork {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ArtworkFetcher for StubArtwork {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if url.contains("missing") {
            return Err(anyhow!("404 for {url}"));
        }
        Ok(solid_png(60, 80, [200, 40, 40]))
    }
}

/// Returns a fixed byte string instead of a real MP4.
pub struct StubClip;

impl ClipEncoder for StubClip {
    fn encode(&self, frames: &[RgbaImage], _spec: ClipSpec) -> Result<Vec<u8>> {
        Ok(format!("MP4:{}", frames.len()).into_bytes())
    }
}

/// Chat platform that records everything and answers from configured state.
///
/// Channels with configured permissions reject sends unless `can_send`; unknown channels
/// accept them. Permission lookups for unknown channels fail with `NotFound`.
#[derive(Default)]
pub struct RecordingChat {
    permissions: HashMap<ChannelId, ChannelPermissions>,
    guilds: HashMap<GuildId, GuildInfo>,
    refused_channels: HashSet<ChannelId>,
    refused_users: HashSet<UserId>,
    sent: Mutex<Vec<(ChannelId, ChatMessage)>>,
    dms: Mutex<Vec<(UserId, String)>>,
    permission_queries: AtomicUsize,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permissions(mut self, channel: ChannelId, perms: ChannelPermissions) -> Self {
        self.permissions.insert(channel, perms);
        self
    }

    pub fn with_guild(mut self, info: GuildInfo) -> Self {
        self.guilds.insert(info.id, info);
        self
    }

    pub fn refusing_channel(mut self, channel: ChannelId) -> Self {
        self.refused_channels.insert(channel);
        self
    }

    pub fn refusing_dm(mut self, user: UserId) -> Self {
        self.refused_users.insert(user);
        self
    }

    pub fn sent(&self) -> Vec<(ChannelId, ChatMessage)> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, channel: ChannelId) -> Vec<ChatMessage> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn direct_messages(&self) -> Vec<(UserId, String)> {
        lock(&self.dms).clone()
    }

    pub fn permission_queries(&self) -> usize {
        self.permission_queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatPlatform for RecordingChat {
    async fn channel_permissions(&self, channel: ChannelId) -> Result<ChannelPermissions, ChatError> {
        self.permission_queries.fetch_add(1, Ordering::SeqCst);
        self.permissions
            .get(&channel)
            .copied()
            .ok_or(ChatError::NotFound)
    }

    async fn send(&self, channel: ChannelId, message: &ChatMessage) -> Result<(), ChatError> {
        let blocked = self.refused_channels.contains(&channel)
            || self
                .permissions
                .get(&channel)
                .is_some_and(|p| !p.can_send());
        if blocked {
            return Err(ChatError::Forbidden);
        }
        lock(&self.sent).push((channel, message.clone()));
        Ok(())
    }

    async fn guild(&self, guild: GuildId) -> Result<GuildInfo, ChatError> {
        self.guilds.get(&guild).cloned().ok_or(ChatError::NotFound)
    }

    async fn direct_message(&self, user: UserId, text: &str) -> Result<(), ChatError> {
        if self.refused_users.contains(&user) {
            return Err(ChatError::Forbidden);
        }
        lock(&self.dms).push((user, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMicroblog {
    fail: bool,
    posts: Mutex<Vec<(String, bool)>>,
}

impl RecordingMicroblog {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// `(text, had_gif)` per post.
    pub fn posts(&self) -> Vec<(String, bool)> {
        lock(&self.posts).clone()
    }
}

#[async_trait::async_trait]
impl MicroblogClient for RecordingMicroblog {
    async fn post(&self, text: &str, gif: Option<Bytes>) -> Result<String> {
        if self.fail {
            return Err(anyhow!("microblog unavailable"));
        }
        let mut posts = lock(&self.posts);
        posts.push((text.to_string(), gif.is_some()));
        Ok(format!("https://microblog.test/{}", posts.len()))
    }
}

#[derive(Default)]
pub struct RecordingSocial {
    fail: bool,
    posts: Mutex<Vec<(SocialPost, bool)>>,
}

impl RecordingSocial {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// `(post, had_clip)` per post.
    pub fn posts(&self) -> Vec<(SocialPost, bool)> {
        lock(&self.posts).clone()
    }
}

#[async_trait::async_trait]
impl SocialClient for RecordingSocial {
    async fn post(&self, post: &SocialPost, clip: Option<Bytes>) -> Result<String> {
        if self.fail {
            return Err(anyhow!("social feed unavailable"));
        }
        let mut posts = lock(&self.posts);
        posts.push((post.clone(), clip.is_some()));
        Ok(format!("https://social.test/{}", posts.len()))
    }
}
