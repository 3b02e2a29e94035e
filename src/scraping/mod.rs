pub mod base;
pub mod ics_feed;
pub mod jsonld_html;
pub mod manual;
pub mod text_pattern;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::SourcesConfig;
use crate::diagnostics::Diagnostics;
use crate::models::RawEvent;

use base::HttpFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Ics,
    Html,
    Text,
    Manual,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::Ics => "ics",
            SourceKind::Html => "html",
            SourceKind::Text => "text",
            SourceKind::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// One origin of raw events. Failures stay local to the adapter that raised them.
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;
    /// URL or file path the adapter reads from.
    fn origin(&self) -> &str;
    fn fetch(&self, diagnostics: &mut Diagnostics) -> anyhow::Result<Vec<RawEvent>>;
}

#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub kind: SourceKind,
    pub name: String,
    pub origin: String,
}

/// Builds every configured adapter in call order: ics, html, text, manual,
/// each group in the order it appears in the configuration.
pub fn registry(
    config: &SourcesConfig,
    fetcher: Arc<HttpFetcher>,
    data_dir: &Path,
) -> Vec<Box<dyn SourceAdapter>> {
    let mut sources: Vec<Box<dyn SourceAdapter>> = Vec::new();
    for feed in &config.ics {
        sources.push(Box::new(ics_feed::IcsFeed::new(feed.clone(), fetcher.clone())));
    }
    for page in &config.html {
        sources.push(Box::new(jsonld_html::JsonLdPage::new(
            page.clone(),
            fetcher.clone(),
        )));
    }
    for page in &config.text {
        sources.push(Box::new(text_pattern::TextPage::new(
            page.clone(),
            fetcher.clone(),
        )));
    }
    for file in &config.manual {
        sources.push(Box::new(manual::ManualFile::new(file.clone(), data_dir)));
    }
    sources
}

pub fn list_sources(sources: &[Box<dyn SourceAdapter>]) -> Vec<SourceInfo> {
    sources
        .iter()
        .map(|source| SourceInfo {
            kind: source.kind(),
            name: source.name().to_string(),
            origin: source.origin().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;

    const CONFIG: &str = r#"
manual:
  - name: Kerava
    path: kerava_manual.yaml
text:
  - name: Stadin AO
    url: https://stadinao.hel.fi/
ics:
  - url: https://example.fi/a.ics
    name: A
  - url: https://example.fi/b.ics
html:
  - url: https://example.fi/page
    name: Page
"#;

    #[test]
    fn registry_follows_fixed_group_order() {
        let config = SourcesConfig::from_yaml_str(CONFIG).expect("config");
        let fetcher = Arc::new(HttpFetcher::new(&HttpSettings::default()).expect("client"));
        let sources = registry(&config, fetcher, Path::new("data"));
        let listed = list_sources(&sources);

        let names: Vec<&str> = listed.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ics:A",
                "ics:https://example.fi/b.ics",
                "html:Page",
                "text:Stadin AO",
                "manual:Kerava",
            ]
        );
        assert_eq!(listed[4].kind, SourceKind::Manual);
        assert!(listed[4].origin.ends_with("kerava_manual.yaml"));
        assert_eq!(SourceKind::Html.to_string(), "html");
    }
}
