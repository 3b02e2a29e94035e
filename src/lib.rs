pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod scraping;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tracing::info;

use config::SourcesConfig;
use diagnostics::Diagnostics;
use error::PipelineError;
use scraping::{base::HttpFetcher, SourceAdapter, SourceInfo};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub sources_path: PathBuf,
    pub out_dir: PathBuf,
    /// Base directory for relative manual data paths.
    pub data_dir: PathBuf,
    /// Reference time for the retention window; the wall clock when unset.
    pub now: Option<DateTime<Utc>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from("sources.yaml"),
            out_dir: PathBuf::from("dist"),
            data_dir: PathBuf::from("."),
            now: None,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub written: usize,
    pub json_path: PathBuf,
    pub ics_path: PathBuf,
    pub diagnostics: Diagnostics,
}

/// Collects every configured source and writes `events.json` and `opendoors.ics`.
///
/// Source failures only shrink the output; an error is returned only when the
/// configuration cannot be used or the artifacts cannot be written.
pub fn run(options: &RunOptions) -> Result<RunSummary, PipelineError> {
    let config = SourcesConfig::load(&options.sources_path)?;
    let normalizer = config.normalizer()?;
    let sources = build_sources(&config, &options.data_dir)?;
    info!(
        sources = sources.len(),
        naive_zone = normalizer.naive_zone().name(),
        "collecting events"
    );

    let mut diagnostics = Diagnostics::default();
    let batches = pipeline::collect(&sources, &mut diagnostics);
    let now = options.now.unwrap_or_else(Utc::now);
    let events = pipeline::process(
        batches,
        &normalizer,
        config.retention_days(),
        now,
        &mut diagnostics,
    );

    let paths = output::write_outputs(&options.out_dir, &events, now)?;
    info!(
        "Wrote {} events → {}, {}",
        events.len(),
        paths.json.display(),
        paths.ics.display()
    );

    Ok(RunSummary {
        written: events.len(),
        json_path: paths.json,
        ics_path: paths.ics,
        diagnostics,
    })
}

/// Registered adapters in call order, without fetching anything.
pub fn list_sources(options: &RunOptions) -> Result<Vec<SourceInfo>, PipelineError> {
    let config = SourcesConfig::load(&options.sources_path)?;
    let sources = build_sources(&config, &options.data_dir)?;
    Ok(scraping::list_sources(&sources))
}

fn build_sources(
    config: &SourcesConfig,
    data_dir: &Path,
) -> Result<Vec<Box<dyn SourceAdapter>>, PipelineError> {
    let fetcher = HttpFetcher::new(&config.http)
        .map_err(|err| PipelineError::HttpClient(format!("{err:#}")))?;
    Ok(scraping::registry(config, Arc::new(fetcher), data_dir))
}
