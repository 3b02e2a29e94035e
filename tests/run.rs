use std::fs;

use chrono::{TimeZone, Utc};
use open_doors_lib::{list_sources, output::PublishedEvent, run, RunOptions};

const SOURCES: &str = r#"
naive_timezone: Europe/Helsinki
manual:
  - name: Keuda
    path: keuda.yaml
  - name: Kerava
    path: kerava.yaml
    default_title: Avoimet ovet – Keravan lukio
  - name: Careeria
    path: careeria.yaml
"#;

const KEUDA: &str = r#"
events:
  - date: "2026-01-20"
    start: "18:00"
    end: "19:30"
    title: Avoimet ovet
    location: Keuda Kerava
    url: https://www.keuda.fi/
  - date: "2025-11-01"
    start: "10:00"
    title: Vanha tilaisuus
  - date: "2026-01-15"
    start: "18:00"
    end: "17:00"
    title: Väärä loppuaika
"#;

const KERAVA: &str = r#"
events:
  - date: "2026-01-20"
    start: "18:00"
    title: "  AVOIMET OVET "
    location: keuda kerava
  - date: "2026-01-15"
    start: "18:00"
    location: Keravan lukio
"#;

fn workspace() -> (tempfile::TempDir, RunOptions) {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("sources.yaml"), SOURCES).expect("sources");
    fs::write(dir.path().join("keuda.yaml"), KEUDA).expect("keuda");
    fs::write(dir.path().join("kerava.yaml"), KERAVA).expect("kerava");
    let options = RunOptions {
        sources_path: dir.path().join("sources.yaml"),
        out_dir: dir.path().join("dist"),
        data_dir: dir.path().to_path_buf(),
        now: Some(Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()),
    };
    (dir, options)
}

#[test]
fn run_merges_filters_and_writes_artifacts() {
    let (_dir, options) = workspace();
    let summary = run(&options).expect("run");

    assert_eq!(summary.written, 2);
    let json = fs::read_to_string(&summary.json_path).expect("events.json");
    let events: Vec<PublishedEvent> = serde_json::from_str(&json).expect("decode");
    let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Avoimet ovet – Keravan lukio", "Avoimet ovet"]);

    // Helsinki local 18:00 in January is 16:00 UTC.
    assert_eq!(
        events[1].start,
        Utc.with_ymd_and_hms(2026, 1, 20, 16, 0, 0).unwrap()
    );
    assert_eq!(events[1].organizer.as_deref(), Some("Keuda"));
    assert_eq!(events[1].url.as_deref(), Some("https://www.keuda.fi/"));

    let ics = fs::read_to_string(&summary.ics_path).expect("opendoors.ics");
    assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
    assert!(ics.contains("DTSTART:20260120T160000Z\r\n"));
    let unfolded = ics.replace("\r\n ", "");
    assert!(unfolded.contains(&format!("UID:{}@opendoors.bot\r\n", events[1].id)));
    assert!(ics.contains("DTSTAMP:20260110T120000Z\r\n"));

    // Missing careeria.yaml is informational; the bad end time is a warning.
    assert_eq!(summary.diagnostics.warning_count(), 1);
}

#[test]
fn run_without_configuration_writes_empty_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = RunOptions {
        sources_path: dir.path().join("missing.yaml"),
        out_dir: dir.path().join("out"),
        data_dir: dir.path().to_path_buf(),
        now: None,
    };
    let summary = run(&options).expect("run");
    assert_eq!(summary.written, 0);
    let json = fs::read_to_string(&summary.json_path).expect("events.json");
    assert_eq!(json.trim(), "[]");
    let ics = fs::read_to_string(&summary.ics_path).expect("opendoors.ics");
    assert!(!ics.contains("BEGIN:VEVENT"));
}

#[test]
fn unknown_time_zone_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sources = dir.path().join("sources.yaml");
    fs::write(&sources, "naive_timezone: Europe/Atlantis\n").expect("write");
    let options = RunOptions {
        sources_path: sources,
        out_dir: dir.path().join("dist"),
        ..RunOptions::default()
    };
    assert!(run(&options).is_err());
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn listing_reports_sources_in_call_order() {
    let (_dir, options) = workspace();
    let names: Vec<String> = list_sources(&options)
        .expect("list")
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(
        names,
        vec!["manual:Keuda", "manual:Kerava", "manual:Careeria"]
    );
}
