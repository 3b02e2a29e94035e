use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use super::base::{self, HttpFetcher};
use super::{SourceAdapter, SourceKind};
use crate::config::FeedSource;
use crate::diagnostics::Diagnostics;
use crate::error::RecordError;
use crate::models::{EventTime, RawEvent};

/// Reads VEVENT components from an iCalendar feed.
pub struct IcsFeed {
    source: FeedSource,
    label: String,
    fetcher: Arc<HttpFetcher>,
}

#[derive(Debug, Default)]
struct Property {
    params: HashMap<String, String>,
    value: String,
}

impl SourceAdapter for IcsFeed {
    fn name(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Ics
    }

    fn origin(&self) -> &str {
        &self.source.url
    }

    fn fetch(&self, diagnostics: &mut Diagnostics) -> Result<Vec<RawEvent>> {
        let body = self.fetcher.fetch_text(&self.source.url)?;
        self.parse_calendar(&body, diagnostics)
    }
}

impl IcsFeed {
    pub fn new(source: FeedSource, fetcher: Arc<HttpFetcher>) -> Self {
        let label = format!(
            "ics:{}",
            source.name.clone().unwrap_or_else(|| source.url.clone())
        );
        Self {
            source,
            label,
            fetcher,
        }
    }

    pub(crate) fn parse_calendar(
        &self,
        body: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RawEvent>> {
        let lines = unfold(body);
        if !lines
            .iter()
            .any(|line| line.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
        {
            bail!("payload from {} is not an iCalendar document", self.source.url);
        }

        let mut events = Vec::new();
        let mut current: Option<HashMap<String, Property>> = None;
        // Nested components (VALARM) must not overwrite the event's own properties.
        let mut depth = 0usize;

        for line in &lines {
            let Some((name, property)) = parse_line(line) else {
                continue;
            };
            let is_vevent = property.value.trim().eq_ignore_ascii_case("VEVENT");
            let marker = match name.as_str() {
                "BEGIN" => Some(true),
                "END" => Some(false),
                _ => None,
            };
            match (marker, is_vevent) {
                (Some(true), true) => {
                    current = Some(HashMap::new());
                    depth = 0;
                }
                (Some(false), true) => {
                    if let Some(props) = current.take() {
                        match self.build_event(&props) {
                            Ok(event) => events.push(event),
                            Err(err) => {
                                diagnostics.warn(&self.label, format!("skipped VEVENT: {err}"))
                            }
                        }
                    }
                }
                (Some(true), false) if current.is_some() => depth += 1,
                (Some(false), false) if current.is_some() => depth = depth.saturating_sub(1),
                _ => {
                    if let Some(props) = current.as_mut() {
                        if depth == 0 {
                            props.entry(name).or_insert(property);
                        }
                    }
                }
            }
        }

        Ok(events)
    }

    fn build_event(&self, props: &HashMap<String, Property>) -> Result<RawEvent, RecordError> {
        let title = props
            .get("SUMMARY")
            .map(|p| base::clean_text(&unescape(&p.value)))
            .filter(|title| !title.is_empty())
            .ok_or(RecordError::MissingField("SUMMARY"))?;
        let start = props
            .get("DTSTART")
            .ok_or(RecordError::MissingField("DTSTART"))
            .and_then(|p| parse_date_value(p, "DTSTART"))?;
        let end = props
            .get("DTEND")
            .map(|p| parse_date_value(p, "DTEND"))
            .transpose()?;

        let mut event = RawEvent::new(title, start);
        event.end = end;
        event.location = base::non_empty(props.get("LOCATION").map(|p| unescape(&p.value)));
        event.url = base::non_empty(props.get("URL").map(|p| p.value.clone()));
        event.organizer = self.source.name.clone();
        event.source_url = Some(self.source.url.clone());
        Ok(event)
    }
}

/// Joins folded continuation lines (RFC 5545 §3.1).
fn unfold(body: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in body.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn parse_line(line: &str) -> Option<(String, Property)> {
    let mut in_quotes = false;
    let split = line.char_indices().find_map(|(idx, ch)| match ch {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ':' if !in_quotes => Some(idx),
        _ => None,
    })?;
    let (head, value) = (&line[..split], &line[split + 1..]);
    let mut parts = head.split(';');
    let name = parts.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }
    let params = parts
        .filter_map(|param| {
            let (key, val) = param.split_once('=')?;
            Some((key.trim().to_ascii_uppercase(), val.trim_matches('"').to_string()))
        })
        .collect();
    Some((
        name,
        Property {
            params,
            value: value.to_string(),
        },
    ))
}

fn parse_date_value(property: &Property, field: &'static str) -> Result<EventTime, RecordError> {
    let value = property.value.trim();
    let unparsable = || RecordError::Unparsable {
        field,
        value: value.to_string(),
    };

    let is_date = property
        .params
        .get("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || value.len() == 8;
    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(EventTime::Date)
            .map_err(|_| unparsable());
    }

    if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        let naive =
            NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| unparsable())?;
        return Ok(EventTime::from(naive.and_utc()));
    }

    let naive =
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| unparsable())?;
    let zone = property
        .params
        .get("TZID")
        .and_then(|tzid| tzid.trim_start_matches('/').parse::<Tz>().ok());
    match zone {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| EventTime::Absolute(dt.fixed_offset()))
            .ok_or(RecordError::NonexistentLocalTime {
                time: naive,
                zone: tz.name().to_string(),
            }),
        None => Ok(EventTime::Floating(naive)),
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
