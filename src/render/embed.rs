// src/render/embed.rs
use serde::Serialize;

use super::{Viewport, ATTACHMENT_NAME, EMBED_COLOR};
use crate::deal::short_date;
use crate::source::Source;

/// Discord caps embed field values at 1024 characters.
pub const FIELD_LIMIT: usize = 1024;
const BLANK: &str = "\u{200B}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip)]
    pub image_url: Option<String>,
}

impl Embed {
    fn new(title: String, description: impl Into<String>) -> Self {
        Self {
            title,
            description: description.into(),
            color: EMBED_COLOR,
            fields: Vec::new(),
            image_url: Some(format!("attachment://{ATTACHMENT_NAME}")),
        }
    }

    fn field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
    }
}

/// Titles longer than this are cut with an ellipsis.
const TITLE_LIMIT: usize = 200;

fn clamp_title(title: &str) -> String {
    if title.chars().count() <= TITLE_LIMIT {
        return title.to_string();
    }
    let mut cut: String = title.chars().take(TITLE_LIMIT - 1).collect();
    cut.push('…');
    cut
}

/// One linked deal line. Always well under half a field, so any entry fits an empty column.
fn bullet(title: &str, url: &str) -> String {
    let title = clamp_title(title);
    let linked = format!("• [**{title}**]({url})");
    if linked.chars().count() < FIELD_LIMIT / 2 {
        linked
    } else {
        // Absurd URL: keep the title, drop the link.
        format!("• **{title}**")
    }
}

/// Current deals beside upcoming ones.
pub fn showcase(source: &Source, viewport: Viewport) -> Embed {
    let mut embed = Embed::new(format!("🕹️ {} Free Games 🕹️", source.name), "");
    let deals = source.deals();

    let now_until = deals
        .iter()
        .filter(|d| d.active)
        .find_map(|d| d.end_date)
        .map(|t| format!("Until: {}\n\n", short_date(t)))
        .unwrap_or_default();
    let free_now: Vec<String> = deals
        .iter()
        .filter(|d| d.active)
        .map(|d| bullet(&d.title, &d.url))
        .collect();
    embed.field(
        format!("{BLANK}\n**Free Now**"),
        format!("{now_until}{}", free_now.join("\n")),
        true,
    );

    let upcoming: Vec<_> = deals.iter().filter(|d| !d.active).collect();
    if viewport == Viewport::Desktop && !upcoming.is_empty() {
        let window = upcoming
            .iter()
            .find_map(|d| match (d.start_date, d.end_date) {
                (Some(s), Some(e)) => Some(format!("Free: {} - {}\n\n", short_date(s), short_date(e))),
                _ => None,
            })
            .unwrap_or_default();
        let lines: Vec<String> = upcoming.iter().map(|d| bullet(&d.title, &d.url)).collect();
        embed.field(
            format!("{BLANK}\n**Up Next**"),
            format!("{window}{}", lines.join("\n")),
            true,
        );
    }
    embed
}

/// One field per deal with its end date.
pub fn listing(source: &Source) -> Embed {
    let mut embed = Embed::new(
        format!("🕹️ {} 🕹️", source.name),
        format!("{BLANK}\n**Free Now**"),
    );
    for deal in source.active_deals() {
        let mut value = bullet(&deal.title, &deal.url)
            .trim_start_matches("• ")
            .to_string();
        if let Some(end) = deal.end_date {
            value.push_str(&format!("\nUntil: {}", short_date(end)));
        }
        embed.field(format!("{BLANK}\n"), value, false);
    }
    embed
}

/// Two columns, alternating deals; starts a new row before a column would overflow.
pub fn grid(source: &Source) -> Embed {
    let mut embed = Embed::new(
        format!("🕹️ {} 🕹️", source.name),
        format!("{BLANK}\n**Free now**"),
    );
    let mut cols = [String::new(), String::new()];

    fn flush(embed: &mut Embed, cols: &mut [String; 2]) {
        if cols[0].is_empty() && cols[1].is_empty() {
            return;
        }
        let left = std::mem::take(&mut cols[0]);
        let right = std::mem::take(&mut cols[1]);
        embed.field(format!("{BLANK}\n"), or_blank(left), true);
        embed.field(BLANK, BLANK, true);
        embed.field(BLANK, or_blank(right), true);
    }

    for (i, deal) in source.active_deals().enumerate() {
        let mut entry = bullet(&deal.title, &deal.url);
        if let Some(end) = deal.end_date {
            entry.push_str(&format!("\nUntil: {}", short_date(end)));
        }
        entry.push_str("\n\n");

        let col = i % 2;
        if cols[col].chars().count() + entry.chars().count() >= FIELD_LIMIT {
            flush(&mut embed, &mut cols);
        }
        cols[col].push_str(&entry);
    }
    flush(&mut embed, &mut cols);
    embed
}

fn or_blank(s: String) -> String {
    if s.is_empty() {
        BLANK.to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::Deal;
    use chrono::{TimeZone, Utc};

    fn source(deals: Vec<Deal>) -> Source {
        let mut s = Source::new("epic", "Epic", "https://store.epicgames.com");
        s.data = Some(deals);
        s
    }

    #[test]
    fn showcase_splits_now_and_next() {
        let end = Utc.with_ymd_and_hms(2025, 6, 26, 15, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 6, 26, 15, 0, 0).unwrap();
        let next_end = Utc.with_ymd_and_hms(2025, 7, 3, 15, 0, 0).unwrap();
        let s = source(vec![
            Deal::new("Now Game", "https://a", true).with_window(None, Some(end)),
            Deal::new("Next Game", "https://b", false).with_window(Some(start), Some(next_end)),
        ]);

        let e = showcase(&s, Viewport::Desktop);
        assert_eq!(e.fields.len(), 2);
        assert!(e.fields[0].value.starts_with("Until: Jun 26"));
        assert!(e.fields[0].value.contains("[**Now Game**](https://a)"));
        assert!(e.fields[1].value.starts_with("Free: Jun 26 - Jul 3"));

        let m = showcase(&s, Viewport::Mobile);
        assert_eq!(m.fields.len(), 1);
    }

    #[test]
    fn listing_skips_inactive() {
        let s = source(vec![Deal::new("A", "https://a", true), Deal::new("B", "https://b", false)]);
        let e = listing(&s);
        assert_eq!(e.fields.len(), 1);
        assert_eq!(e.fields[0].value, "[**A**](https://a)");
    }

    #[test]
    fn oversized_entries_still_fit_a_field() {
        let huge_title = "Ultimate ".repeat(300);
        let huge_url = format!("https://store.test/{}", "x".repeat(2000));
        let s = source(vec![
            Deal::new(&huge_title, "https://a", true),
            Deal::new("Short", &huge_url, true),
            Deal::new("Normal", "https://b", true),
        ]);
        for e in [grid(&s), listing(&s)] {
            assert!(e.fields.iter().all(|f| f.value.chars().count() <= FIELD_LIMIT));
        }
        let g = grid(&s);
        let text: String = g.fields.iter().map(|f| f.value.as_str()).collect();
        assert!(text.contains('…'));
        assert!(text.contains("• **Short**"));
        assert!(text.contains("[**Normal**](https://b)"));
    }

    #[test]
    fn grid_wraps_before_field_limit() {
        let long = "x".repeat(200);
        let deals: Vec<Deal> = (0..20)
            .map(|i| Deal::new(format!("{long}{i}"), "https://u", true))
            .collect();
        let e = grid(&source(deals));
        assert!(e.fields.len() > 3);
        assert_eq!(e.fields.len() % 3, 0);
        assert!(e.fields.iter().all(|f| f.value.chars().count() < FIELD_LIMIT));
    }
}
