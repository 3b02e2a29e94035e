use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// One advisory message raised while collecting or processing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: String,
    pub message: String,
}

/// Collects diagnostics for a run and mirrors each one to the tracing subscriber.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn warn(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(source, "{message}");
        self.push(Severity::Warning, source, message);
    }

    pub fn info(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        info!(source, "{message}");
        self.push(Severity::Info, source, message);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
            .count()
    }

    fn push(&mut self, severity: Severity, source: &str, message: String) {
        self.entries.push(Diagnostic {
            severity,
            source: source.to_string(),
            message,
        });
    }
}
