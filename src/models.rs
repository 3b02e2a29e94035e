use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// A timestamp as an adapter found it, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    /// Calendar date with no time of day.
    Date(NaiveDate),
    /// Wall-clock time with no offset information.
    Floating(NaiveDateTime),
    Absolute(DateTime<FixedOffset>),
}

impl From<DateTime<Utc>> for EventTime {
    fn from(value: DateTime<Utc>) -> Self {
        EventTime::Absolute(value.fixed_offset())
    }
}

/// Event candidate produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub title: String,
    pub start: EventTime,
    pub end: Option<EventTime>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub organizer: Option<String>,
    pub source_url: Option<String>,
}

impl RawEvent {
    pub fn new(title: impl Into<String>, start: EventTime) -> Self {
        Self {
            title: title.into(),
            start,
            end: None,
            location: None,
            url: None,
            organizer: None,
            source_url: None,
        }
    }
}

/// Normalized event. Timestamps are absolute UTC instants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub organizer: Option<String>,
    pub source_url: Option<String>,
}

/// Fields that decide whether two events are the same occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    title: String,
    start: String,
    location: String,
}

impl IdentityKey {
    pub fn new(title: &str, start: &DateTime<Utc>, location: Option<&str>) -> Self {
        Self {
            title: title.trim().to_lowercase(),
            start: canonical_time(start),
            location: location.unwrap_or_default().trim().to_lowercase(),
        }
    }

    /// Hex SHA-256 of `title|start|location`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"|");
        hasher.update(self.start.as_bytes());
        hasher.update(b"|");
        hasher.update(self.location.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Event {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(&self.title, &self.start, self.location.as_deref())
    }

    pub fn id(&self) -> String {
        self.identity_key().fingerprint()
    }
}

/// RFC 3339 in UTC with a `Z` suffix; fractional seconds only when present.
pub fn canonical_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
