// src/adapter/json_feed.rs
//! Reads an already-normalized deal list (the store's own JSON shape) from an external
//! scraper endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::SourceAdapter;
use crate::deal::{normalize_title, Deal};
use crate::source::Source;

pub struct JsonFeedAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl JsonFeedAdapter {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
                timeout: Duration::from_secs(30),
            },
        }
    }

    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    fn parse(raw: &str) -> Result<Vec<Deal>> {
        let deals: Vec<Deal> = serde_json::from_str(raw).context("parsing deal feed json")?;
        Ok(deals
            .into_iter()
            .map(|mut d| {
                d.title = normalize_title(&d.title);
                let (start, end) = (d.start_date, d.end_date);
                d.with_window(start, end)
            })
            .filter(|d| !d.title.is_empty())
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for JsonFeedAdapter {
    async fn fetch(&self, source: &Source) -> Result<Vec<Deal>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse(s),
            Mode::Http {
                url,
                client,
                timeout,
            } => {
                let body = client
                    .get(url)
                    .timeout(*timeout)
                    .send()
                    .await
                    .with_context(|| format!("{}: feed http get()", source.id))?
                    .error_for_status()
                    .context("feed non-2xx")?
                    .text()
                    .await
                    .context("feed http .text()")?;
                Self::parse(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "json_feed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_and_normalizes_entries() {
        let raw = r#"[
            {"title":"  Control&amp;Alt ","url":"https://gog.com/c","activeDeal":true,
             "startDate":"1970-01-01T00:00:00Z","endDate":"2025-06-20T15:00:00Z","category":"addon"},
            {"title":"™","url":"https://gog.com/x","activeDeal":true}
        ]"#;
        let adapter = JsonFeedAdapter::from_fixture(raw);
        let deals = adapter
            .fetch(&Source::new("gog", "GOG", "https://gog.com"))
            .await
            .unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].title, "Control&Alt");
        assert_eq!(deals[0].start_date, None);
        assert!(deals[0].end_date.is_some());
        assert!(!deals[0].is_primary());
    }
}
