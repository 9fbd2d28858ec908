// src/config/mod.rs
//! Static configuration: one TOML file describing the tracked sources and the runtime knobs.

pub mod secrets;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{EpicAdapter, JsonFeedAdapter, SourceAdapter};
use crate::media::{ClipSpec, MediaConfig};
use crate::render::RendererKind;
use crate::schedule::IntervalPolicy;
use crate::source::{Channels, MediaLayout, Source};

pub use secrets::Secrets;

pub const ENV_CONFIG_PATH: &str = "NOTIFIER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/notifier.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub media: MediaSection,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Chat destinations delivered to at once for one source.
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,
}

fn default_fanout_concurrency() -> usize {
    8
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: default_fanout_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSection {
    pub frame_height: u32,
    pub gif_frame_ms: u32,
    pub clip_fps: u32,
    pub clip_frame_secs: u32,
    pub fetch_timeout_secs: u64,
    /// Encoder binary for the social clip; no clip is produced when unset.
    pub ffmpeg: Option<PathBuf>,
}

impl Default for MediaSection {
    fn default() -> Self {
        let d = MediaConfig::default();
        Self {
            frame_height: d.frame_height,
            gif_frame_ms: d.gif_frame_ms,
            clip_fps: d.clip.fps,
            clip_frame_secs: d.clip.frame_secs,
            fetch_timeout_secs: d.fetch_timeout.as_secs(),
            ffmpeg: None,
        }
    }
}

impl MediaSection {
    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            frame_height: self.frame_height,
            gif_frame_ms: self.gif_frame_ms,
            clip: ClipSpec {
                fps: self.clip_fps,
                frame_secs: self.clip_frame_secs,
            },
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    File { root: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub renderer: RendererKind,
    #[serde(default)]
    pub layout: MediaLayout,
    #[serde(default)]
    pub channels: Channels,
    #[serde(default)]
    pub subscribe_by_default: bool,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub adapter: AdapterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub default_mins: u64,
    pub retry_mins: u64,
    pub settle_mins: u64,
    pub horizon_hours: u64,
    pub track_deadline: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let p = IntervalPolicy::default();
        Self {
            default_mins: p.default.as_secs() / 60,
            retry_mins: p.retry.as_secs() / 60,
            settle_mins: p.settle.as_secs() / 60,
            horizon_hours: p.horizon.as_secs() / 3600,
            track_deadline: p.track_deadline,
        }
    }
}

impl ScheduleConfig {
    pub fn policy(&self) -> IntervalPolicy {
        IntervalPolicy {
            default: Duration::from_secs(self.default_mins.max(1) * 60),
            retry: Duration::from_secs(self.retry_mins.max(1) * 60),
            settle: Duration::from_secs(self.settle_mins.max(1) * 60),
            horizon: Duration::from_secs(self.horizon_hours * 3600),
            track_deadline: self.track_deadline,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    Epic {
        #[serde(default)]
        url: Option<String>,
        /// Read the promotions payload from a local file instead.
        #[serde(default)]
        fixture: Option<PathBuf>,
    },
    JsonFeed {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        fixture: Option<PathBuf>,
    },
}

impl AdapterConfig {
    pub fn build(&self) -> Result<Arc<dyn SourceAdapter>> {
        let read = |p: &Path| {
            fs::read_to_string(p).with_context(|| format!("reading fixture {}", p.display()))
        };
        Ok(match self {
            AdapterConfig::Epic {
                fixture: Some(p), ..
            } => Arc::new(EpicAdapter::from_fixture(&read(p)?)),
            AdapterConfig::Epic { url: Some(u), .. } => Arc::new(EpicAdapter::from_url(u.clone())),
            AdapterConfig::Epic { .. } => Arc::new(EpicAdapter::default()),
            AdapterConfig::JsonFeed {
                fixture: Some(p), ..
            } => Arc::new(JsonFeedAdapter::from_fixture(&read(p)?)),
            AdapterConfig::JsonFeed { url: Some(u), .. } => {
                Arc::new(JsonFeedAdapter::from_url(u.clone()))
            }
            AdapterConfig::JsonFeed { .. } => bail!("json_feed adapter needs `url` or `fixture`"),
        })
    }
}

impl SourceConfig {
    pub fn to_source(&self) -> Source {
        let mut s = Source::new(&self.id, &self.name, &self.url);
        s.emoji = self.emoji.clone();
        s.renderer = self.renderer;
        s.layout = self.layout;
        s.channels = self.channels;
        s.subscribe_by_default = self.subscribe_by_default;
        s.schedule = self.schedule.policy();
        s
    }
}

impl NotifierConfig {
    /// Parse and validate. No sources is a configuration error.
    pub fn parse(s: &str) -> Result<Self> {
        let cfg: NotifierConfig = toml::from_str(s).context("parsing notifier config")?;
        if cfg.sources.is_empty() {
            bail!("no sources configured");
        }
        let mut ids = std::collections::HashSet::new();
        for src in &cfg.sources {
            if src.id.trim().is_empty() {
                bail!("source with empty id");
            }
            // Ids name files in the store; keep them one-to-one with their file names.
            if !src
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                bail!("source id `{}` may only contain A-Z, a-z, 0-9, `-` and `_`", src.id);
            }
            if !ids.insert(src.id.as_str()) {
                bail!("duplicate source id `{}`", src.id);
            }
        }
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading notifier config from {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load using env var + fallback:
    /// 1) $NOTIFIER_CONFIG_PATH
    /// 2) config/notifier.toml
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const SAMPLE: &str = r#"
[scheduler]
fanout_concurrency = 4

[store]
kind = "file"
root = "data"

[media]
ffmpeg = "/usr/bin/ffmpeg"

[[sources]]
id = "epic"
name = "Epic Games"
url = "https://store.epicgames.com/en-US/free-games"
renderer = "showcase"
layout = "paired"
subscribe_by_default = true
channels = { chat = true, microblog = true, social = true }
schedule = { track_deadline = true, retry_mins = 2 }
adapter = { kind = "epic" }

[[sources]]
id = "gog"
name = "GOG"
url = "https://www.gog.com"
adapter = { kind = "json_feed", url = "http://scraper.local/gog" }
"#;

    #[test]
    fn parses_full_sample() {
        let cfg = NotifierConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.scheduler.fanout_concurrency, 4);
        assert!(matches!(cfg.store, StoreConfig::File { .. }));
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.media.frame_height, 300);

        let epic = cfg.sources[0].to_source();
        assert_eq!(epic.renderer, RendererKind::Showcase);
        assert_eq!(epic.layout, MediaLayout::Paired);
        assert!(epic.channels.social);
        assert!(epic.schedule.track_deadline);
        assert_eq!(epic.schedule.retry, Duration::from_secs(120));
        assert_eq!(epic.schedule.default, Duration::from_secs(1800));

        let gog = cfg.sources[1].to_source();
        assert!(gog.channels.chat);
        assert!(!gog.channels.microblog);
        assert_eq!(gog.renderer, RendererKind::Grid);
        assert!(cfg.sources[1].adapter.build().is_ok());
    }

    #[test]
    fn zero_sources_is_fatal() {
        let err = NotifierConfig::parse("[http]\nbind = \"127.0.0.1:1\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("no sources"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let raw = r#"
[[sources]]
id = "a"
name = "A"
url = "u"
adapter = { kind = "epic" }
[[sources]]
id = "a"
name = "B"
url = "u"
adapter = { kind = "epic" }
"#;
        assert!(NotifierConfig::parse(raw).is_err());
    }

    #[test]
    fn ids_that_would_collide_on_disk_are_rejected() {
        let with_id = |id: &str| {
            format!("[[sources]]\nid = \"{id}\"\nname = \"A\"\nurl = \"u\"\nadapter = {{ kind = \"epic\" }}\n")
        };
        for bad in ["a.b", "a b", "../epic", "épic"] {
            let err = NotifierConfig::parse(&with_id(bad)).unwrap_err();
            assert!(format!("{err:#}").contains("may only contain"), "{bad}");
        }
        assert!(NotifierConfig::parse(&with_id("epic_games-2")).is_ok());
    }

    #[test]
    fn json_feed_without_location_fails_to_build() {
        let a = AdapterConfig::JsonFeed {
            url: None,
            fixture: None,
        };
        assert!(a.build().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallback() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        // Nothing in the temp CWD.
        assert!(NotifierConfig::load_default().is_err());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_PATH), SAMPLE).unwrap();
        assert_eq!(NotifierConfig::load_default().unwrap().sources.len(), 2);

        let other = tmp.path().join("other.toml");
        let one = SAMPLE.split("[[sources]]\nid = \"gog\"").next().unwrap();
        fs::write(&other, one).unwrap();
        env::set_var(ENV_CONFIG_PATH, other.display().to_string());
        assert_eq!(NotifierConfig::load_default().unwrap().sources.len(), 1);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
        assert!(NotifierConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
