use std::{fs, path::Path, path::PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::warn;

use crate::error::PipelineError;
use crate::normalize::Normalizer;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_USER_AGENT: &str = "OpenDoorsBot/1.0 (+contact@example.com)";

/// Contents of `sources.yaml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SourcesConfig {
    /// IANA zone used for timestamps that carry no offset.
    pub naive_timezone: Option<String>,
    pub retention_days: Option<i64>,
    pub http: HttpSettings,
    pub ics: Vec<FeedSource>,
    pub html: Vec<FeedSource>,
    pub text: Vec<TextSource>,
    pub manual: Vec<ManualSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 2,
            backoff_ms: 1500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Calendar feed or JSON-LD page.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    pub name: Option<String>,
}

/// Free-text page scanned for Finnish date and time announcements.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TextSource {
    pub name: String,
    pub url: String,
    pub location: Option<String>,
    /// Appended to a matched school name to build its location.
    pub city: Option<String>,
    /// Regexes naming individual schools on a page that lists several.
    #[serde(default)]
    pub school_patterns: Vec<String>,
}

/// Hand-maintained YAML file of events.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManualSource {
    pub name: String,
    pub path: PathBuf,
    pub default_title: Option<String>,
    pub default_organizer: Option<String>,
}

impl SourcesConfig {
    /// Reads the configuration; a missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            warn!("source configuration {:?} not found, no sources registered", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn normalizer(&self) -> Result<Normalizer, PipelineError> {
        match self.naive_timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(Normalizer::default()),
            Some(name) => name
                .parse::<Tz>()
                .map(Normalizer::new)
                .map_err(|_| PipelineError::UnknownTimeZone(name.to_string())),
        }
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS)
    }
}
