// src/adapter/mod.rs
pub mod epic;
pub mod json_feed;

use anyhow::Result;

use crate::deal::Deal;
use crate::source::Source;

pub use epic::EpicAdapter;
pub use json_feed::JsonFeedAdapter;

/// Per-storefront scraper producing a normalized deal list.
///
/// `Err` is a scrape failure (retry soon, keep known state). `Ok(vec![])` means the
/// storefront has nothing live.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<Deal>>;
    fn name(&self) -> &'static str;
}
