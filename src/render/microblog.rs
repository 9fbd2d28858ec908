// src/render/microblog.rs
//! Post text under a hard character budget.
//!
//! Three tiers, least compacted first; the first that fits wins:
//!   1. every active deal with link and end date
//!   2. primary deals with link, everything else folded into one counted line
//!   3. one grouped line with the landing page

use thiserror::Error;

use crate::deal::{short_date, Deal};
use crate::source::Source;

pub const MICROBLOG_BUDGET: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroblogTier {
    Full,
    PrimaryOnly,
    Grouped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("{source_name}: no active deals to post")]
    NothingToPost { source_name: String },
    #[error("{source_name}: shortest rendering is {shortest} chars, budget is {budget}")]
    TooLong {
        source_name: String,
        shortest: usize,
        budget: usize,
    },
}

fn header(source: &Source) -> String {
    format!("🕹️ Free now on {} 🕹️", source.name)
}

fn full(source: &Source, active: &[&Deal]) -> String {
    let mut out = header(source);
    for d in active {
        out.push_str(&format!("\n\n• {}\n{}", d.title, d.url));
        if let Some(end) = d.end_date {
            out.push_str(&format!("\nUntil: {}", short_date(end)));
        }
    }
    out
}

fn primary_only(source: &Source, active: &[&Deal]) -> String {
    let mut out = header(source);
    let (primary, rest): (Vec<&Deal>, Vec<&Deal>) = active.iter().partition(|d| d.is_primary());
    for d in &primary {
        out.push_str(&format!("\n\n• {}\n{}", d.title, d.url));
    }
    if !rest.is_empty() {
        let noun = if rest.len() == 1 { "add-on" } else { "add-ons" };
        out.push_str(&format!("\n\n+ {} free {noun}\n{}", rest.len(), source.url));
    }
    out
}

fn grouped(source: &Source, active: &[&Deal]) -> String {
    let noun = if active.len() == 1 { "game" } else { "games" };
    format!("{}\n\n{} free {noun}\n{}", header(source), active.len(), source.url)
}

/// Length as the budget counts it.
pub fn rendered_len(text: &str) -> usize {
    text.chars().count()
}

/// Render under `budget`, returning the tier used.
pub fn render_microblog_with_budget(
    source: &Source,
    budget: usize,
) -> Result<(MicroblogTier, String), RenderError> {
    let active: Vec<&Deal> = source.active_deals().collect();
    if active.is_empty() {
        return Err(RenderError::NothingToPost {
            source_name: source.name.clone(),
        });
    }

    let tiers: [(MicroblogTier, fn(&Source, &[&Deal]) -> String); 3] = [
        (MicroblogTier::Full, full),
        (MicroblogTier::PrimaryOnly, primary_only),
        (MicroblogTier::Grouped, grouped),
    ];
    let mut shortest = usize::MAX;
    for (tier, render) in tiers {
        let text = render(source, &active);
        let len = rendered_len(&text);
        if len <= budget {
            return Ok((tier, text));
        }
        shortest = shortest.min(len);
    }
    Err(RenderError::TooLong {
        source_name: source.name.clone(),
        shortest,
        budget,
    })
}

pub fn render_microblog(source: &Source) -> Result<(MicroblogTier, String), RenderError> {
    render_microblog_with_budget(source, MICROBLOG_BUDGET)
}
