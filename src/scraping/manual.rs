use std::{fs, io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::base;
use super::{SourceAdapter, SourceKind};
use crate::config::ManualSource;
use crate::diagnostics::Diagnostics;
use crate::error::RecordError;
use crate::models::{EventTime, RawEvent};

/// Events typed in by hand, one YAML file per institution or group.
pub struct ManualFile {
    source: ManualSource,
    label: String,
    path: PathBuf,
    origin: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ManualDocument {
    events: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct ManualEntry {
    date: String,
    start: String,
    end: Option<String>,
    title: Option<String>,
    location: Option<String>,
    url: Option<String>,
    organizer: Option<String>,
}

impl SourceAdapter for ManualFile {
    fn name(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Manual
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn fetch(&self, diagnostics: &mut Diagnostics) -> Result<Vec<RawEvent>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                diagnostics.info(&self.label, format!("{} not found, no events", self.origin));
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("unable to read {}", self.origin));
            }
        };
        self.parse_entries(&contents, diagnostics)
    }
}

impl ManualFile {
    /// `path` is resolved against `data_dir` unless it is absolute.
    pub fn new(source: ManualSource, data_dir: &std::path::Path) -> Self {
        let path = data_dir.join(&source.path);
        let origin = path.display().to_string();
        let label = format!("manual:{}", source.name);
        Self {
            source,
            label,
            path,
            origin,
        }
    }

    pub(crate) fn parse_entries(
        &self,
        contents: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RawEvent>> {
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let document: Option<ManualDocument> = serde_yaml::from_str(contents)
            .with_context(|| format!("malformed manual data in {}", self.origin))?;

        let mut events = Vec::new();
        for (index, value) in document.unwrap_or_default().events.into_iter().enumerate() {
            let entry: ManualEntry = match serde_yaml::from_value(value) {
                Ok(entry) => entry,
                Err(err) => {
                    diagnostics.warn(&self.label, format!("entry {index} skipped: {err}"));
                    continue;
                }
            };
            match self.build_event(entry, diagnostics) {
                Ok(event) => events.push(event),
                Err(err) => diagnostics.warn(&self.label, format!("entry {index} skipped: {err}")),
            }
        }
        Ok(events)
    }

    fn build_event(
        &self,
        entry: ManualEntry,
        diagnostics: &mut Diagnostics,
    ) -> Result<RawEvent, RecordError> {
        let start = parse_moment(&entry.date, &entry.start, "start")?;
        let end = match entry.end.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(end) => match parse_moment(&entry.date, end, "end") {
                Ok(end) => Some(end),
                Err(err) => {
                    diagnostics.warn(&self.label, format!("ignoring end time: {err}"));
                    None
                }
            },
            None => None,
        };

        let title = base::non_empty(entry.title).unwrap_or_else(|| self.default_title());
        let mut event = RawEvent::new(title, EventTime::Floating(start));
        event.end = end.map(EventTime::Floating);
        event.location = base::non_empty(entry.location);
        event.organizer =
            base::non_empty(entry.organizer).or_else(|| Some(self.default_organizer()));
        event.url = base::non_empty(entry.url);
        event.source_url = event.url.clone();
        Ok(event)
    }

    fn default_title(&self) -> String {
        self.source
            .default_title
            .clone()
            .unwrap_or_else(|| format!("Avoimet ovet – {}", self.source.name))
    }

    fn default_organizer(&self) -> String {
        self.source
            .default_organizer
            .clone()
            .unwrap_or_else(|| self.source.name.clone())
    }
}

fn parse_moment(
    date: &str,
    time: &str,
    field: &'static str,
) -> Result<NaiveDateTime, RecordError> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        RecordError::Unparsable {
            field: "date",
            value: date.to_string(),
        }
    })?;
    let clock = base::parse_clock(time).ok_or_else(|| RecordError::Unparsable {
        field,
        value: time.to_string(),
    })?;
    Ok(day.and_time(clock))
}
