use std::{thread, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::config::HttpSettings;
use crate::models::EventTime;

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?:[.:](\d{2}))?$").expect("valid clock regex"));

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Blocking HTTP client shared by the network-backed adapters.
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .context("unable to build http client")?;
        Ok(Self {
            client,
            retries: settings.retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    /// GETs `url`, retrying a fixed number of times with a fixed delay.
    pub fn fetch_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(url) {
                Ok(body) => return Ok(body),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    debug!(url, attempt, "retrying after error: {err:#}");
                    thread::sleep(self.backoff);
                }
                Err(err) => {
                    return Err(err.context(format!("giving up after {} attempts", attempt + 1)))
                }
            }
        }
    }

    fn try_fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request failed for {url}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status for {url}"))?;
        response
            .text()
            .with_context(|| format!("unable to read response body for {url}"))
    }
}

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| clean_text(&text))
        .filter(|text| !text.is_empty())
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

/// Visible text of a page, one line per block element, scripts and styles dropped.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);
    raw.lines()
        .map(clean_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_TAGS.contains(&name) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                out.push('\n');
            }
            collect_text(child_element, out);
            if block {
                out.push('\n');
            }
        }
    }
}

/// Slice of at most `max_bytes` ending at `end`, widened to a char boundary.
pub fn context_before(text: &str, end: usize, max_bytes: usize) -> &str {
    let mut start = end.saturating_sub(max_bytes);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    &text[start..end]
}

/// `HH:MM`, `HH.MM` or a bare hour.
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(text.trim())?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps
        .get(2)
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(0))?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn local_datetime(year: i32, month: u32, day: u32, time: NaiveTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.and_time(time))
}

/// Parses the ISO-8601 shapes found in structured markup.
///
/// Offsets are kept, offset-less date-times become floating values, and a
/// bare date stays a date.
pub fn parse_iso_datetime(input: &str) -> Option<EventTime> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(EventTime::Absolute(dt));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(EventTime::Absolute(dt));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(EventTime::Floating(naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(EventTime::Date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, Timelike};

    #[test]
    fn parses_iso_variants() {
        match parse_iso_datetime("2026-01-10T10:00:00+02:00") {
            Some(EventTime::Absolute(dt)) => {
                assert_eq!(dt.offset().fix().local_minus_utc(), 7200);
                assert_eq!(dt.hour(), 10);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_iso_datetime("2026-01-10T10:00+02:00"),
            Some(EventTime::Absolute(_))
        ));
        assert!(matches!(
            parse_iso_datetime("2026-01-10T10:00"),
            Some(EventTime::Floating(_))
        ));
        assert!(matches!(
            parse_iso_datetime("2026-01-10"),
            Some(EventTime::Date(_))
        ));
        assert_eq!(parse_iso_datetime("ensi keväänä"), None);
    }

    #[test]
    fn parses_clock_forms() {
        assert_eq!(parse_clock("18:00"), NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(parse_clock("9.30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock("18"), NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(parse_clock("25:00"), None);
        assert_eq!(parse_clock("kuusi"), None);
    }

    #[test]
    fn page_text_breaks_on_blocks_and_skips_scripts() {
        let html = r#"<html><head><script>var x = "ti 1.1.2026 klo 10.00-11.00";</script></head>
            <body><h2>Avoimet   ovet</h2><p>ti <b>27.1.2026</b> klo 19.00–21.00</p></body></html>"#;
        let text = page_text(html);
        assert_eq!(text, "Avoimet ovet\nti 27.1.2026 klo 19.00–21.00");
    }

    #[test]
    fn context_before_respects_char_boundaries() {
        let text = "Mäkelänrinteen lukio ke 14.1.";
        let end = text.find(" ke ").unwrap() + 1;
        let context = context_before(text, end, 19);
        assert!(context.ends_with("lukio "));
        assert!(context.len() >= 19);
    }

    #[test]
    fn resolves_relative_urls() {
        assert_eq!(
            absolute_url("https://www.hel.fi/fi/kasvatus", Some("/fi/tapahtuma/1".to_string())),
            Some("https://www.hel.fi/fi/tapahtuma/1".to_string())
        );
        assert_eq!(absolute_url("https://www.hel.fi/", None), None);
    }

    fn quick_retries(retries: u32) -> HttpSettings {
        HttpSettings {
            timeout_secs: 5,
            retries,
            backoff_ms: 0,
            ..HttpSettings::default()
        }
    }

    #[test]
    fn fetch_text_retries_until_success() {
        let mut server = mockito::Server::new();
        let failing = server
            .mock("GET", "/feed.ics")
            .with_status(500)
            .expect(2)
            .create();
        let ok = server
            .mock("GET", "/feed.ics")
            .match_header("user-agent", crate::config::DEFAULT_USER_AGENT)
            .with_status(200)
            .with_body("BEGIN:VCALENDAR")
            .expect(1)
            .create();

        let fetcher = HttpFetcher::new(&quick_retries(2)).expect("client");
        let body = fetcher
            .fetch_text(&format!("{}/feed.ics", server.url()))
            .expect("third attempt succeeds");

        assert_eq!(body, "BEGIN:VCALENDAR");
        failing.assert();
        ok.assert();
    }

    #[test]
    fn fetch_text_gives_up_after_retries() {
        let mut server = mockito::Server::new();
        let failing = server
            .mock("GET", "/feed.ics")
            .with_status(503)
            .expect(3)
            .create();

        let fetcher = HttpFetcher::new(&quick_retries(2)).expect("client");
        let err = fetcher
            .fetch_text(&format!("{}/feed.ics", server.url()))
            .expect_err("retries exhausted");

        assert!(format!("{err:#}").contains("giving up after 3 attempts"));
        failing.assert();
    }
}
