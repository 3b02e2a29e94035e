use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::base::{self, HttpFetcher};
use super::{SourceAdapter, SourceKind};
use crate::config::FeedSource;
use crate::diagnostics::Diagnostics;
use crate::models::RawEvent;

static LD_JSON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});

/// Reads schema.org `Event` nodes embedded as JSON-LD in a web page.
pub struct JsonLdPage {
    source: FeedSource,
    label: String,
    fetcher: Arc<HttpFetcher>,
}

impl SourceAdapter for JsonLdPage {
    fn name(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Html
    }

    fn origin(&self) -> &str {
        &self.source.url
    }

    fn fetch(&self, diagnostics: &mut Diagnostics) -> Result<Vec<RawEvent>> {
        let html = self.fetcher.fetch_text(&self.source.url)?;
        Ok(self.parse_document(&html, diagnostics))
    }
}

impl JsonLdPage {
    pub fn new(source: FeedSource, fetcher: Arc<HttpFetcher>) -> Self {
        let label = format!(
            "html:{}",
            source.name.clone().unwrap_or_else(|| source.url.clone())
        );
        Self {
            source,
            label,
            fetcher,
        }
    }

    pub(crate) fn parse_document(
        &self,
        html: &str,
        diagnostics: &mut Diagnostics,
    ) -> Vec<RawEvent> {
        let document = Html::parse_document(html);
        let mut events = Vec::new();

        for script in document.select(&LD_JSON_SELECTOR) {
            let payload = script.text().collect::<String>();
            if payload.trim().is_empty() {
                continue;
            }
            let data: Value = match serde_json::from_str(&payload) {
                Ok(value) => value,
                Err(err) => {
                    debug!(source = %self.label, "ignoring invalid ld+json block: {err}");
                    continue;
                }
            };
            for node in flatten_nodes(data) {
                if !is_event(&node) {
                    continue;
                }
                if let Some(event) = self.build_event(&node, diagnostics) {
                    events.push(event);
                }
            }
        }

        events
    }

    fn build_event(&self, node: &Value, diagnostics: &mut Diagnostics) -> Option<RawEvent> {
        let title = string_field(node, "name").or_else(|| string_field(node, "headline"))?;
        let start_text = string_field(node, "startDate")?;

        let Some(start) = base::parse_iso_datetime(&start_text) else {
            diagnostics.warn(
                &self.label,
                format!("skipped {title:?}: unparsable startDate {start_text:?}"),
            );
            return None;
        };
        let end = match string_field(node, "endDate") {
            Some(text) => match base::parse_iso_datetime(&text) {
                Some(end) => Some(end),
                None => {
                    diagnostics.warn(
                        &self.label,
                        format!("skipped {title:?}: unparsable endDate {text:?}"),
                    );
                    return None;
                }
            },
            None => None,
        };

        let mut event = RawEvent::new(title, start);
        event.end = end;
        event.location = location_of(node);
        event.url = base::absolute_url(&self.source.url, string_field(node, "url"))
            .or_else(|| Some(self.source.url.clone()));
        event.organizer = self.source.name.clone();
        event.source_url = Some(self.source.url.clone());
        Some(event)
    }
}

/// Expands top-level arrays and `@graph` containers into individual nodes.
fn flatten_nodes(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items.into_iter().flat_map(flatten_nodes).collect(),
        Value::Object(mut map) => match map.remove("@graph") {
            Some(graph) => flatten_nodes(graph),
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

/// `Event` and its schema.org subtypes (`EducationEvent`, `SocialEvent`, ...).
fn is_event(node: &Value) -> bool {
    let is_event_type = |t: &str| t.ends_with("Event");
    match node.get("@type") {
        Some(Value::String(t)) => is_event_type(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_event_type),
        _ => false,
    }
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    base::non_empty(node.get(key).and_then(Value::as_str).map(str::to_string))
}

fn location_of(node: &Value) -> Option<String> {
    match node.get("location")? {
        Value::String(text) => base::non_empty(Some(text.clone())),
        place @ Value::Object(_) => {
            string_field(place, "name").or_else(|| string_field(place, "address"))
        }
        _ => None,
    }
}
