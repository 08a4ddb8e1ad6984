//! Progress reporting for long-running commands.
//!
//! `sgm rank`, `sgm classify`, and `sgm embed` report how many chunks or
//! subgenres have been processed. Progress is emitted on **stderr** so
//! stdout stays parseable for scripts and workflow tools.

use std::io::{IsTerminal, Write};

/// Chunk progress is reported every this many chunks (and at the end).
pub const REPORT_EVERY: u64 = 10;

/// What is being counted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Query chunks scored against the reference store.
    Ranking,
    /// Subgenre prototypes sent to the embedding endpoint.
    Embedding,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Ranking => "ranking",
            Stage::Embedding => "embedding",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Stage::Ranking => "chunks",
            Stage::Embedding => "subgenres",
        }
    }
}

/// A single progress event: `n` of `total` items done.
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub n: u64,
    pub total: u64,
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);

    /// Report only on every [`REPORT_EVERY`]th item and on the last one.
    fn tick(&self, stage: Stage, n: u64, total: u64) {
        if n % REPORT_EVERY == 0 || n == total {
            self.report(ProgressEvent { stage, n, total });
        }
    }
}

/// Human-friendly progress on stderr: "ranking  10 / 42 chunks".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = format!(
            "{}  {} / {} {}\n",
            event.stage.as_str(),
            format_number(event.n),
            format_number(event.total),
            event.stage.unit()
        );
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "stage": event.stage.as_str(),
            "n": event.n,
            "total": event.total
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
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
