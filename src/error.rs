use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Errors that stop a run before both artifacts are written.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read source configuration {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid source configuration {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),
    #[error("http client setup failed: {0}")]
    HttpClient(String),
    #[error("failed to create output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode events: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reasons a single record is rejected while the rest of its source survives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("event has no title")]
    MissingTitle,
    #[error("end {end} precedes start {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("local time {time} does not exist in {zone}")]
    NonexistentLocalTime { time: NaiveDateTime, zone: String },
    #[error("unparsable {field}: {value:?}")]
    Unparsable { field: &'static str, value: String },
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("year cannot be inferred for {0:?}")]
    UnknownYear(String),
}
