use chrono::{DateTime, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::RecordError;
use crate::models::{Event, EventTime, RawEvent};

/// Rewrites adapter timestamps into absolute UTC instants.
///
/// Values with an offset are converted. Values without one are read as wall-clock
/// time in `naive_zone`, which defaults to UTC so that an offset-less value is
/// taken to be already canonical. Bare dates start at midnight in the same zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    naive_zone: Tz,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            naive_zone: chrono_tz::UTC,
        }
    }
}

impl Normalizer {
    pub fn new(naive_zone: Tz) -> Self {
        Self { naive_zone }
    }

    pub fn naive_zone(&self) -> Tz {
        self.naive_zone
    }

    pub fn normalize_time(&self, value: &EventTime) -> Result<DateTime<Utc>, RecordError> {
        match value {
            EventTime::Absolute(dt) => Ok(dt.with_timezone(&Utc)),
            EventTime::Floating(naive) => self.resolve_local(naive),
            EventTime::Date(date) => self.resolve_local(&date.and_time(NaiveTime::MIN)),
        }
    }

    /// Normalizes both timestamps and rejects records that cannot be published.
    pub fn normalize(&self, raw: RawEvent) -> Result<Event, RecordError> {
        let title = raw.title.trim();
        if title.is_empty() {
            return Err(RecordError::MissingTitle);
        }

        let start = self.normalize_time(&raw.start)?;
        let end = raw
            .end
            .as_ref()
            .map(|value| self.normalize_time(value))
            .transpose()?;
        if let Some(end) = end {
            if end < start {
                return Err(RecordError::EndBeforeStart { start, end });
            }
        }

        Ok(Event {
            title: title.to_string(),
            start,
            end,
            location: raw.location,
            url: raw.url,
            organizer: raw.organizer,
            source_url: raw.source_url,
        })
    }

    fn resolve_local(&self, naive: &NaiveDateTime) -> Result<DateTime<Utc>, RecordError> {
        match self.naive_zone.from_local_datetime(naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(RecordError::NonexistentLocalTime {
                time: *naive,
                zone: self.naive_zone.name().to_string(),
            }),
        }
    }
}
