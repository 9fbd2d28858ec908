// src/reconcile.rs
//! Decides whether a freshly scraped deal list differs from what a source already knows.
//!
//! Scrapes are noisy: a deal missing from one response is not proof that it ended. The
//! comparison therefore only looks at whether every live title is already known
//! (`online ⊆ local`). Genuine shrinkage is caught by the count check below.

use anyhow::{Context, Result};
use metrics::counter;

use crate::deal::{active_subset, active_titles, Deal};
use crate::source::Source;
use crate::store::DocumentStore;

/// Compare `fetched` against `source.data`, updating the source in place.
///
/// Returns `true` when the deal set changed and subscribers should hear about it.
pub async fn reconcile(
    source: &mut Source,
    fetched: Option<Vec<Deal>>,
    store: &dyn DocumentStore,
) -> Result<bool> {
    let fetched = match fetched {
        Some(v) if !v.is_empty() => v,
        _ => {
            // Nothing live right now. Not an event in itself.
            if source.data.is_some() {
                tracing::info!(source = %source.id, "no live deals, clearing known state");
            }
            source.clear();
            return Ok(false);
        }
    };

    let (local, recovered) = match source.data.take() {
        Some(known) if !known.is_empty() => (known, false),
        _ => {
            let persisted = store
                .load_deals(&source.id)
                .await
                .with_context(|| format!("loading persisted deals for {}", source.id))?;
            if persisted.is_empty() {
                tracing::info!(source = %source.id, count = fetched.len(), "first deals seen");
                return Ok(accept(source, fetched));
            }
            (persisted, true)
        }
    };

    tracing::debug!(
        source = %source.id,
        online = ?active_titles(&fetched),
        local = ?active_titles(&local),
        recovered,
        "comparing deal lists"
    );

    if active_subset(&fetched, &local) {
        let bloated = active_titles(&local).len() > fetched.len();
        if bloated || recovered {
            tracing::info!(source = %source.id, bloated, recovered, "accepting fresh list");
            return Ok(accept(source, fetched));
        }
        tracing::info!(source = %source.id, "deals unchanged");
        source.data = Some(local);
        return Ok(false);
    }

    tracing::info!(source = %source.id, count = fetched.len(), "new deals detected");
    Ok(accept(source, fetched))
}

fn accept(source: &mut Source, fetched: Vec<Deal>) -> bool {
    counter!("reconcile_changed_total", "source" => source.id.to_string()).increment(1);
    source.data = Some(fetched);
    true
}
