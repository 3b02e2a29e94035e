use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::Event;

pub const JSON_FILE: &str = "events.json";
pub const ICS_FILE: &str = "opendoors.ics";
pub const PRODUCT_ID: &str = "-//OpenDoorsBot//EN";
pub const UID_DOMAIN: &str = "opendoors.bot";

const ICS_LINE_LIMIT: usize = 75;

/// Shape of one entry in `events.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub organizer: Option<String>,
    pub source_url: Option<String>,
}

impl From<&Event> for PublishedEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            location: event.location.clone(),
            url: event.url.clone(),
            organizer: event.organizer.clone(),
            source_url: event.source_url.clone(),
        }
    }
}

impl From<PublishedEvent> for Event {
    fn from(published: PublishedEvent) -> Self {
        Event {
            title: published.title,
            start: published.start,
            end: published.end,
            location: published.location,
            url: published.url,
            organizer: published.organizer,
            source_url: published.source_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub json: PathBuf,
    pub ics: PathBuf,
}

/// Pretty-printed JSON array; non-ASCII text is written as-is.
pub fn dump_events_json(events: &[Event]) -> Result<String, PipelineError> {
    let payload: Vec<PublishedEvent> = events.iter().map(PublishedEvent::from).collect();
    Ok(serde_json::to_string_pretty(&payload)?)
}

pub fn dump_events_ics(events: &[Event], generated_at: DateTime<Utc>) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        format!("PRODID:{PRODUCT_ID}"),
        "VERSION:2.0".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
    ];
    let stamp = ics_time(&generated_at);

    for event in events {
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}@{UID_DOMAIN}", event.id()));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("SUMMARY:{}", escape_text(&event.title)));
        lines.push(format!("DTSTART:{}", ics_time(&event.start)));
        if let Some(end) = event.end {
            lines.push(format!("DTEND:{}", ics_time(&end)));
        }
        if let Some(location) = &event.location {
            lines.push(format!("LOCATION:{}", escape_text(location)));
        }
        if let Some(url) = &event.url {
            lines.push(format!("URL:{url}"));
        }
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str("\r\n");
    }
    out
}

/// Writes both artifacts into `out_dir`, creating it if needed.
pub fn write_outputs(
    out_dir: &Path,
    events: &[Event],
    generated_at: DateTime<Utc>,
) -> Result<OutputPaths, PipelineError> {
    fs::create_dir_all(out_dir).map_err(|source| PipelineError::OutputDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let paths = OutputPaths {
        json: out_dir.join(JSON_FILE),
        ics: out_dir.join(ICS_FILE),
    };
    write_file(&paths.json, dump_events_json(events)?.as_bytes())?;
    write_file(&paths.ics, dump_events_ics(events, generated_at).as_bytes())?;
    Ok(paths)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    fs::write(path, contents).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn ics_time(value: &DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Splits a content line into 75-octet chunks without breaking a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    if line.len() <= ICS_LINE_LIMIT {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / ICS_LINE_LIMIT * 3);
    let mut width = 0;
    // Continuation lines start with a space, which counts toward their limit.
    let mut limit = ICS_LINE_LIMIT;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > limit {
            out.push_str("\r\n ");
            width = 0;
            limit = ICS_LINE_LIMIT - 1;
        }
        out.push(ch);
        width += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vec<Event> {
        vec![
            Event {
                title: "Avoimet ovet – Mäkelänrinteen lukio".to_string(),
                start: Utc.with_ymd_and_hms(2026, 1, 14, 8, 30, 0).unwrap(),
                end: Some(Utc.with_ymd_and_hms(2026, 1, 14, 10, 0, 0).unwrap()),
                location: Some("Mäkelänrinteen lukio, Helsinki".to_string()),
                url: Some(
                    "https://www.hel.fi/fi/kasvatus-ja-koulutus/makelanrinteen-lukio".to_string(),
                ),
                organizer: Some("Mäkelänrinteen lukio".to_string()),
                source_url: Some("https://www.hel.fi/fi/kasvatus-ja-koulutus".to_string()),
            },
            Event {
                title: "Infoilta; huoltajille".to_string(),
                start: Utc.with_ymd_and_hms(2026, 1, 27, 17, 0, 0).unwrap(),
                end: None,
                location: None,
                url: None,
                organizer: None,
                source_url: None,
            },
        ]
    }

    #[test]
    fn json_round_trip_reproduces_identity() {
        let events = sample();
        let json = dump_events_json(&events).expect("encode");
        assert!(json.contains("Mäkelänrinteen"), "non-ascii kept verbatim");
        assert!(json.contains("\n  {"), "indented output");

        let parsed: Vec<PublishedEvent> = serde_json::from_str(&json).expect("decode");
        assert_eq!(parsed.len(), events.len());
        for (published, original) in parsed.into_iter().zip(&events) {
            assert_eq!(published.id, original.id());
            let restored = Event::from(published);
            assert_eq!(restored.identity_key(), original.identity_key());
            assert_eq!(&restored, original);
        }
    }

    #[test]
    fn json_omits_missing_end() {
        let json = dump_events_json(&sample()[1..]).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&json).expect("decode");
        let entry = &value[0];
        assert!(entry.get("end").is_none());
        assert_eq!(entry["start"], "2026-01-27T17:00:00Z");
        assert!(entry["location"].is_null());
    }

    #[test]
    fn ics_contains_one_vevent_per_record() {
        let events = sample();
        let generated_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let ics = dump_events_ics(&events, generated_at);

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nPRODID:-//OpenDoorsBot//EN\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.lines().all(|line| line.len() <= ICS_LINE_LIMIT));
        let unfolded = ics.replace("\r\n ", "");
        let uid = format!("UID:{}@opendoors.bot", events[0].id());
        assert!(uid.len() > ICS_LINE_LIMIT);
        assert!(!ics.contains(&uid), "uid line must be folded");
        assert!(unfolded.contains(&format!("{uid}\r\n")));
        assert!(ics.contains("DTSTART:20260114T083000Z\r\n"));
        assert!(ics.contains("DTEND:20260114T100000Z\r\n"));
        assert!(ics.contains("DTSTAMP:20260101T120000Z\r\n"));
        assert!(ics.contains("SUMMARY:Infoilta\\; huoltajille\r\n"));
        assert!(ics.contains("LOCATION:Mäkelänrinteen lukio\\, Helsinki\r\n"));
        assert_eq!(ics.matches("DTEND").count(), 1);
    }

    #[test]
    fn long_lines_are_folded_on_char_boundaries() {
        let line = format!("SUMMARY:{}", "ä".repeat(60));
        let folded = fold_line(&line);
        for (index, part) in folded.split("\r\n").enumerate() {
            assert!(part.len() <= ICS_LINE_LIMIT, "part {index} too long");
            if index > 0 {
                assert!(part.starts_with(' '));
            }
        }
        let unfolded = folded.replace("\r\n ", "");
        assert_eq!(unfolded, line);
    }

    #[test]
    fn writes_both_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out_dir = dir.path().join("dist");
        let paths = write_outputs(&out_dir, &sample(), Utc::now()).expect("write");
        assert!(paths.json.exists());
        assert!(paths.ics.exists());
        assert_eq!(paths.json.file_name().unwrap(), JSON_FILE);
    }
}
