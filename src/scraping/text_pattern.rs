use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};

use super::base::{self, HttpFetcher};
use super::{SourceAdapter, SourceKind};
use crate::config::TextSource;
use crate::diagnostics::Diagnostics;
use crate::error::RecordError;
use crate::models::{EventTime, RawEvent};

// Matches announcements such as:
//   ke 14.1.2026 klo 10.30–12.00
//   Tutustumisilta 14.11. klo 18-19
//   ti 27.1. klo 19.00–21.00 on lisäksi tilaisuus huoltajille
static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?:\b(?:ma|ti|ke|to|pe|la|su)\s+)?",
        r"\b(?P<day>3[01]|[12]\d|0?[1-9])\.(?P<month>1[0-2]|0?[1-9])\b",
        r"(?:\.(?P<year>20\d{2}))?\.?",
        r"[^\n]{0,40}?\bklo\s+",
        r"(?P<sh>\d{1,2})(?:[.:](?P<sm>\d{2}))?",
        r"\s*[–—-]\s*",
        r"(?P<eh>\d{1,2})(?:[.:](?P<em>\d{2}))?",
        r"(?P<extra>[^\n]*)",
    ))
    .expect("valid date time regex")
});
// A day.month candidate right after "klo" or "klo 9.00–" is a clock time.
static CLOCK_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bklo\s*(?:\d{1,2}(?:[.:]\d{2})?\s*[–—-]\s*)?$")
        .expect("valid clock prefix regex")
});
static YEAR_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)avoimet\s+ovet\s+(20\d{2})").expect("valid heading regex"));
static ANY_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid year regex"));
static TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(avoimet ovet|tutustumisilta|tutustumispäivä|esittelyilta|infoilta)\b")
        .expect("valid title regex")
});

const DEFAULT_TITLE: &str = "Avoimet ovet";
const SCHOOL_CONTEXT_BYTES: usize = 250;
const TITLE_CONTEXT_BYTES: usize = 200;
const CLOCK_PREFIX_BYTES: usize = 24;

/// Scans the visible text of a page for dated open house announcements.
pub struct TextPage {
    source: TextSource,
    label: String,
    fetcher: Arc<HttpFetcher>,
}

impl SourceAdapter for TextPage {
    fn name(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Text
    }

    fn origin(&self) -> &str {
        &self.source.url
    }

    fn fetch(&self, diagnostics: &mut Diagnostics) -> Result<Vec<RawEvent>> {
        let html = self.fetcher.fetch_text(&self.source.url)?;
        self.extract(&base::page_text(&html), diagnostics)
    }
}

impl TextPage {
    pub fn new(source: TextSource, fetcher: Arc<HttpFetcher>) -> Self {
        let label = format!("text:{}", source.name);
        Self {
            source,
            label,
            fetcher,
        }
    }

    pub(crate) fn extract(
        &self,
        text: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<RawEvent>> {
        let schools = self.school_regexes()?;
        let page_year = YEAR_HEADING_RE
            .captures(text)
            .or_else(|| ANY_YEAR_RE.captures(text))
            .and_then(|caps| caps.get(1)?.as_str().parse::<i32>().ok());

        let mut events = Vec::new();
        let mut at = 0;
        while let Some(caps) = DATE_TIME_RE.captures_at(text, at) {
            let (Some(whole), Some(day)) = (caps.get(0), caps.name("day")) else {
                break;
            };
            let prefix = base::context_before(text, day.start(), CLOCK_PREFIX_BYTES);
            if CLOCK_PREFIX_RE.is_match(prefix) {
                at = day.end();
                continue;
            }
            at = whole.end();
            match self.build_event(text, whole.start(), &caps, page_year, &schools) {
                Ok(event) => events.push(event),
                Err(err) => diagnostics.warn(
                    &self.label,
                    format!("skipped {:?}: {err}", base::clean_text(whole.as_str())),
                ),
            }
        }
        Ok(events)
    }

    fn build_event(
        &self,
        text: &str,
        offset: usize,
        caps: &Captures<'_>,
        page_year: Option<i32>,
        schools: &[Regex],
    ) -> Result<RawEvent, RecordError> {
        let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
        let day = number("day").ok_or(RecordError::MissingField("day"))?;
        let month = number("month").ok_or(RecordError::MissingField("month"))?;
        let year = match caps.name("year") {
            Some(m) => m.as_str().parse::<i32>().ok(),
            None => page_year,
        }
        .ok_or_else(|| RecordError::UnknownYear(format!("{day}.{month}.")))?;

        let clock = |hour: &str, minute: &str| -> Result<NaiveTime, RecordError> {
            let h = number(hour).ok_or(RecordError::MissingField("hour"))?;
            let m = caps.name(minute).map_or(Some(0), |m| m.as_str().parse().ok());
            m.and_then(|m| NaiveTime::from_hms_opt(h, m, 0))
                .ok_or_else(|| RecordError::Unparsable {
                    field: "time",
                    value: format!("{h}.{}", caps.name(minute).map_or("00", |m| m.as_str())),
                })
        };
        let invalid_date = || RecordError::Unparsable {
            field: "date",
            value: format!("{day}.{month}.{year}"),
        };
        let start = base::local_datetime(year, month, day, clock("sh", "sm")?)
            .ok_or_else(invalid_date)?;
        let end = base::local_datetime(year, month, day, clock("eh", "em")?)
            .ok_or_else(invalid_date)?;

        let school = find_last(schools, base::context_before(text, offset, SCHOOL_CONTEXT_BYTES));
        let heading = TITLE_RE
            .find_iter(base::context_before(text, offset, TITLE_CONTEXT_BYTES))
            .last()
            .map(|m| capitalize(&m.as_str().to_lowercase()))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let for_guardians = caps
            .name("extra")
            .is_some_and(|m| m.as_str().to_lowercase().contains("huoltaj"));

        let host = school.clone().unwrap_or_else(|| self.source.name.clone());
        let title = if for_guardians {
            format!("{heading} (huoltajille) – {host}")
        } else {
            format!("{heading} – {host}")
        };
        let location = match (&school, &self.source.city) {
            (Some(school), Some(city)) => Some(format!("{school}, {city}")),
            (Some(school), None) => Some(school.clone()),
            (None, _) => self.source.location.clone().or_else(|| self.source.city.clone()),
        };

        let mut event = RawEvent::new(title, EventTime::Floating(start));
        event.end = Some(EventTime::Floating(end));
        event.location = location;
        event.url = Some(self.source.url.clone());
        event.organizer = Some(host);
        event.source_url = Some(self.source.url.clone());
        Ok(event)
    }

    fn school_regexes(&self) -> Result<Vec<Regex>> {
        self.source
            .school_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid school pattern {pattern:?}"))
            })
            .collect()
    }
}

/// Text of the match that sits closest to the end of `context`.
fn find_last(patterns: &[Regex], context: &str) -> Option<String> {
    patterns
        .iter()
        .filter_map(|re| re.find_iter(context).last())
        .max_by_key(|m| m.end())
        .map(|m| base::clean_text(m.as_str()))
        .filter(|name| !name.is_empty())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
