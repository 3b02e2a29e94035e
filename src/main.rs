use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use open_doors_lib::{list_sources, run, RunOptions};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "open-doors",
    version,
    about = "Collects school open house events into events.json and opendoors.ics"
)]
struct Cli {
    /// Source configuration file
    #[arg(long, default_value = "sources.yaml")]
    sources: PathBuf,

    /// Directory the artifacts are written to
    #[arg(long, default_value = "dist")]
    out: PathBuf,

    /// Base directory for relative manual data file paths
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Reference time for the retention window (RFC 3339), defaults to now
    #[arg(long, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,

    /// Print the registered sources in call order and exit
    #[arg(long)]
    list: bool,
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| format!("expected an RFC 3339 timestamp: {err}"))
}

fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let cli = Cli::parse();
    let options = RunOptions {
        sources_path: cli.sources,
        out_dir: cli.out,
        data_dir: cli.data_dir,
        now: cli.now,
    };

    if cli.list {
        match list_sources(&options) {
            Ok(sources) => {
                for source in sources {
                    println!("{:<7} {:<40} {}", source.kind, source.name, source.origin);
                }
            }
            Err(err) => {
                error!("{err}");
                std::process::exit(1);
            }
        }
        return;
    }

    match run(&options) {
        Ok(summary) => {
            let warnings = summary.diagnostics.warning_count();
            if warnings > 0 {
                info!(warnings, "finished with source warnings");
            }
        }
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    }
}
