//! Merge-and-filter control flow shared by every run.
//!
//! Adapters are called one after another; each adapter's events are buffered
//! and appended to the pool only once its fetch has finished, so the pool
//! order is always adapter call order followed by adapter output order. That
//! order decides which record survives deduplication.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::diagnostics::Diagnostics;
use crate::models::{Event, RawEvent};
use crate::normalize::Normalizer;
use crate::scraping::SourceAdapter;

/// Raw events from a single adapter, tagged with the adapter's name.
#[derive(Debug, Clone)]
pub struct Batch {
    pub source: String,
    pub events: Vec<RawEvent>,
}

/// Calls every adapter in order. A failing adapter contributes an empty batch.
pub fn collect(sources: &[Box<dyn SourceAdapter>], diagnostics: &mut Diagnostics) -> Vec<Batch> {
    let mut batches = Vec::with_capacity(sources.len());

    for source in sources {
        let name = source.name().to_string();
        let events = match source.fetch(diagnostics) {
            Ok(events) => {
                debug!(source = %name, count = events.len(), "source fetched");
                events
            }
            Err(err) => {
                diagnostics.warn(&name, format!("source failed: {err:#}"));
                Vec::new()
            }
        };
        batches.push(Batch {
            source: name,
            events,
        });
    }

    batches
}

/// Normalizes every raw event, dropping the ones that fail validation.
pub fn normalize_all(
    batches: Vec<Batch>,
    normalizer: &Normalizer,
    diagnostics: &mut Diagnostics,
) -> Vec<Event> {
    let mut events = Vec::new();
    for batch in batches {
        for raw in batch.events {
            let title = raw.title.clone();
            match normalizer.normalize(raw) {
                Ok(event) => events.push(event),
                Err(err) => diagnostics.warn(&batch.source, format!("skipped {title:?}: {err}")),
            }
        }
    }
    events
}

/// Keeps the first event seen for each identity key.
pub fn dedupe(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(event.identity_key()))
        .collect()
}

/// Future and ongoing events, plus events at most `retention_days` whole days old.
pub fn within_window(event: &Event, now: DateTime<Utc>, retention_days: i64) -> bool {
    event.start >= now || (now - event.start).num_days() <= retention_days
}

pub fn apply_window(events: Vec<Event>, now: DateTime<Utc>, retention_days: i64) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| within_window(event, now, retention_days))
        .collect()
}

/// Stable, so events sharing a start keep their deduplicated order.
pub fn sort_by_start(events: &mut [Event]) {
    events.sort_by_key(|event| event.start);
}

/// Runs normalize → dedupe → window → sort over collected batches.
pub fn process(
    batches: Vec<Batch>,
    normalizer: &Normalizer,
    retention_days: i64,
    now: DateTime<Utc>,
    diagnostics: &mut Diagnostics,
) -> Vec<Event> {
    let raw_count: usize = batches.iter().map(|batch| batch.events.len()).sum();
    let normalized = normalize_all(batches, normalizer, diagnostics);
    let valid_count = normalized.len();
    let unique = dedupe(normalized);
    let unique_count = unique.len();
    let mut events = apply_window(unique, now, retention_days);
    sort_by_start(&mut events);

    info!(
        raw = raw_count,
        valid = valid_count,
        unique = unique_count,
        kept = events.len(),
        "pipeline finished"
    );
    events
}
