// src/deal.rs
//! Normalized promotion records shared by adapters, reconciliation and renderers.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a deal is a full game or something that rides on one (DLC, in-game loot).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealCategory {
    #[default]
    Game,
    Addon,
}

/// One promotional offer as returned by a source adapter.
///
/// `title` is the identity used when comparing two lists of the same source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub wide_image: Option<String>,
    #[serde(rename = "activeDeal")]
    pub active: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: DealCategory,
}

impl Deal {
    pub fn new(title: impl AsRef<str>, url: impl Into<String>, active: bool) -> Self {
        Self {
            title: normalize_title(title.as_ref()),
            url: url.into(),
            image: None,
            wide_image: None,
            active,
            start_date: None,
            end_date: None,
            category: DealCategory::Game,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_wide_image(mut self, image: impl Into<String>) -> Self {
        self.wide_image = Some(image.into());
        self
    }

    pub fn with_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        // Some feeds report the unix epoch for "unknown".
        self.start_date = start.filter(|t| t.timestamp() > 0);
        self.end_date = end.filter(|t| t.timestamp() > 0);
        self
    }

    pub fn with_category(mut self, category: DealCategory) -> Self {
        self.category = category;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.category == DealCategory::Game
    }
}

/// Titles of the active entries, in list order.
pub fn active_titles(deals: &[Deal]) -> Vec<&str> {
    deals
        .iter()
        .filter(|d| d.active)
        .map(|d| d.title.as_str())
        .collect()
}

/// True when every active title of `online` also appears among the active titles of `local`.
pub fn active_subset(online: &[Deal], local: &[Deal]) -> bool {
    let known: HashSet<&str> = active_titles(local).into_iter().collect();
    active_titles(online).iter().all(|t| known.contains(t))
}

/// Earliest end time across the list, if any deal reports one.
pub fn nearest_end(deals: &[Deal]) -> Option<DateTime<Utc>> {
    deals.iter().filter_map(|d| d.end_date).min()
}

/// Normalize a scraped title: decode entities, drop non-ASCII glyphs (™, ®, emoji),
/// collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let ascii: String = decoded.chars().filter(|c| c.is_ascii()).collect();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&ascii, " ").trim().to_string()
}

/// Short human date used in embeds and posts, e.g. `Jun 20`.
pub fn short_date(t: DateTime<Utc>) -> String {
    t.format("%b %-d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalize_title_strips_marks_and_entities() {
        assert_eq!(
            normalize_title("  Death&nbsp;Stranding™   Director's\tCut "),
            "Death Stranding Director's Cut"
        );
    }

    #[test]
    fn subset_ignores_inactive_entries() {
        let local = vec![
            Deal::new("A", "u", true),
            Deal::new("B", "u", false),
        ];
        let online = vec![Deal::new("A", "u", true), Deal::new("C", "u", false)];
        assert!(active_subset(&online, &local));

        let online = vec![Deal::new("B", "u", true)];
        assert!(!active_subset(&online, &local));
    }

    #[test]
    fn epoch_dates_are_treated_as_unknown() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 20, 15, 0, 0).unwrap();
        let d = Deal::new("A", "u", true).with_window(Some(epoch), Some(end));
        assert_eq!(d.start_date, None);
        assert_eq!(d.end_date, Some(end));
        assert_eq!(short_date(end), "Jun 20");
    }

    #[test]
    fn nearest_end_picks_minimum() {
        let t1 = Utc.with_ymd_and_hms(2025, 6, 20, 15, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 27, 15, 0, 0).unwrap();
        let deals = vec![
            Deal::new("A", "u", true).with_window(None, Some(t2)),
            Deal::new("B", "u", false).with_window(None, Some(t1)),
            Deal::new("C", "u", true),
        ];
        assert_eq!(nearest_end(&deals), Some(t1));
        assert_eq!(nearest_end(&[]), None);
    }

    #[test]
    fn deserializes_store_shape() {
        let raw = r#"{"title":"A","url":"https://x","activeDeal":true,"endDate":"2025-06-20T15:00:00Z"}"#;
        let d: Deal = serde_json::from_str(raw).unwrap();
        assert!(d.active);
        assert_eq!(d.category, DealCategory::Game);
        assert!(d.end_date.is_some());
    }
}
