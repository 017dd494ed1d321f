//! Run progress reporting.
//!
//! Reports what `fusion run` is doing while it fetches sources and waits on
//! the enricher. Progress goes to **stderr** so the stdout summary stays
//! parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A source is being listed. Total unknown.
    Discovering { source: String },
    /// A source finished listing with `count` articles.
    Fetched { source: String, count: u64 },
    /// `n` of `total` enrichment calls have completed.
    Enriching { n: u64, total: u64 },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress: "enrich  12 / 40 articles".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { source } => format!("fetch {}  listing...\n", source),
            ProgressEvent::Fetched { source, count } => {
                format!("fetch {}  {} articles\n", source, format_number(*count))
            }
            ProgressEvent::Enriching { n, total } => format!(
                "enrich  {} / {} articles\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { source } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "source": source,
            }),
            ProgressEvent::Fetched { source, count } => serde_json::json!({
                "event": "progress",
                "phase": "fetched",
                "source": source,
                "count": count,
            }),
            ProgressEvent::Enriching { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "enriching",
                "n": n,
                "total": total,
            }),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", obj);
        let _ = stderr.flush();
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" | "none" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
