// src/media/mod.rs
//! Media compositor: artwork download (async, concurrent) feeding GIF and clip encoding
//! on the blocking pool.

pub mod clip;
pub mod frames;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::join_all;
use metrics::counter;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::deal::Deal;
use crate::source::{MediaLayout, MediaSet, SourceId};

pub use clip::{ClipEncoder, ClipSpec, FfmpegClipEncoder};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("none of the {requested} artwork images could be used")]
    NoArtwork { requested: usize },
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("media worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConfig {
    pub frame_height: u32,
    pub gif_frame_ms: u32,
    pub clip: ClipSpec,
    pub fetch_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            frame_height: 300,
            gif_frame_ms: 2000,
            clip: ClipSpec {
                fps: 24,
                frame_secs: 3,
            },
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// Downloads one artwork image.
#[async_trait::async_trait]
pub trait ArtworkFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

pub struct HttpArtworkFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpArtworkFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ArtworkFetcher for HttpArtworkFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let rsp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .context("artwork request")?
            .error_for_status()
            .context("artwork non-2xx")?;
        rsp.bytes().await.context("artwork body")
    }
}

pub struct Compositor {
    fetcher: Arc<dyn ArtworkFetcher>,
    clip: Option<Arc<dyn ClipEncoder>>,
    cfg: MediaConfig,
}

impl Compositor {
    pub fn new(
        fetcher: Arc<dyn ArtworkFetcher>,
        clip: Option<Arc<dyn ClipEncoder>>,
        cfg: MediaConfig,
    ) -> Self {
        Self { fetcher, clip, cfg }
    }

    /// Compose the attachments for `deals`.
    ///
    /// `Ok(None)` when nothing is active. A failed download only drops that image; losing
    /// every current image is an error.
    pub async fn compose(
        &self,
        source: &SourceId,
        deals: &[Deal],
        layout: MediaLayout,
    ) -> Result<Option<MediaSet>, ComposeError> {
        let current: Vec<&Deal> = deals.iter().filter(|d| d.active).collect();
        if current.is_empty() {
            return Ok(None);
        }
        let upcoming: Vec<&Deal> = match layout {
            MediaLayout::Paired => deals.iter().filter(|d| !d.active).collect(),
            MediaLayout::Sequence => Vec::new(),
        };

        let (current_blobs, upcoming_blobs) =
            tokio::join!(self.fetch_all(source, &current), self.fetch_all(source, &upcoming));
        if current_blobs.is_empty() {
            return Err(ComposeError::NoArtwork {
                requested: current.len(),
            });
        }

        let cfg = self.cfg;
        let clip = self.clip.clone();
        let label = source.to_string();
        let requested = current.len();
        tokio::task::spawn_blocking(move || {
            build_media(&label, requested, current_blobs, upcoming_blobs, cfg, clip.as_deref())
        })
        .await?
        .map(Some)
    }

    async fn fetch_all(&self, source: &SourceId, deals: &[&Deal]) -> Vec<(String, Bytes)> {
        let jobs = deals.iter().filter_map(|d| {
            let url = d.image.as_ref().or(d.wide_image.as_ref())?.clone();
            let fetcher = self.fetcher.clone();
            Some(async move {
                let res = fetcher.fetch(&url).await;
                (url, res)
            })
        });

        join_all(jobs)
            .await
            .into_iter()
            .filter_map(|(url, res)| match res {
                Ok(raw) => Some((url, raw)),
                Err(e) => {
                    tracing::warn!(source = %source, %url, error = %format!("{e:#}"), "artwork fetch failed");
                    counter!("media_artwork_failures_total", "source" => source.to_string())
                        .increment(1);
                    None
                }
            })
            .collect()
    }
}

fn build_media(
    label: &str,
    requested: usize,
    current: Vec<(String, Bytes)>,
    upcoming: Vec<(String, Bytes)>,
    cfg: MediaConfig,
    clip: Option<&dyn ClipEncoder>,
) -> Result<MediaSet, ComposeError> {
    let current = frames::decode_all(label, &current);
    if current.is_empty() {
        return Err(ComposeError::NoArtwork { requested });
    }
    let upcoming = frames::decode_all(label, &upcoming);

    let height = frames::align_down_16(cfg.frame_height);
    let fit = |imgs: &[image::RgbaImage]| -> Vec<image::RgbaImage> {
        imgs.iter().map(|i| frames::fit_height(i, height)).collect()
    };
    let wide_frames = frames::normalize(&frames::pair(&fit(&current), &fit(&upcoming)), height);
    let single_frames = frames::normalize(&current, height);
    let mobile_frames = frames::half_size(&single_frames);

    let wide = frames::encode_gif(&wide_frames, cfg.gif_frame_ms)?;
    let mobile = frames::encode_gif(&mobile_frames, cfg.gif_frame_ms)?;

    let clip = clip.and_then(|enc| match enc.encode(&single_frames, cfg.clip) {
        Ok(v) => Some(Bytes::from(v)),
        Err(e) => {
            tracing::warn!(source = label, error = %format!("{e:#}"), "clip encoding failed, posting without video");
            None
        }
    });

    tracing::debug!(
        source = label,
        frames = wide_frames.len(),
        wide_bytes = wide.len(),
        clip = clip.is_some(),
        "media composed"
    );
    Ok(MediaSet {
        wide: Bytes::from(wide),
        mobile: Bytes::from(mobile),
        clip,
    })
}
