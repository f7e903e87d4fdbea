//! Run progress reporting.
//!
//! Reports what a run is doing so users see which files are being
//! summarized and how many remain. Progress goes to **stderr** so stdout
//! stays reserved for the final summary line.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Walking the tree. Total unknown.
    Discovering { root: String },
    /// Classification finished.
    Classified {
        new: usize,
        changed: usize,
        unchanged: usize,
    },
    /// Worker picked up file `n` of `total`.
    Processing { n: usize, total: usize, path: String },
    /// A file finished with the given outcome label.
    Outcome { path: String, outcome: String },
    /// Document written with `records` sections.
    Written { path: String, records: usize },
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "codectx  processing  12 / 340  src/app.py".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { root } => format!("codectx  scanning {}...\n", root),
            ProgressEvent::Classified {
                new,
                changed,
                unchanged,
            } => format!(
                "codectx  {} new, {} changed, {} up-to-date\n",
                format_number(*new),
                format_number(*changed),
                format_number(*unchanged)
            ),
            ProgressEvent::Processing { n, total, path } => format!(
                "codectx  processing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                path
            ),
            ProgressEvent::Outcome { path, outcome } => {
                format!("codectx  {:<12} {}\n", outcome, path)
            }
            ProgressEvent::Written { path, records } => format!(
                "codectx  wrote {} ({} files)\n",
                path,
                format_number(*records)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &ProgressEvent) -> serde_json::Value {
        match event {
            ProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            ProgressEvent::Classified {
                new,
                changed,
                unchanged,
            } => serde_json::json!({
                "event": "progress",
                "phase": "classified",
                "new": new,
                "changed": changed,
                "unchanged": unchanged
            }),
            ProgressEvent::Processing { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "path": path
            }),
            ProgressEvent::Outcome { path, outcome } => serde_json::json!({
                "event": "outcome",
                "path": path,
                "outcome": outcome
            }),
            ProgressEvent::Written { path, records } => serde_json::json!({
                "event": "written",
                "path": path,
                "records": records
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
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
        if atty::is(atty::Stream::Stderr) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_carry_phase() {
        let v = JsonProgress::to_json(&ProgressEvent::Processing {
            n: 3,
            total: 10,
            path: "src/a.py".into(),
        });
        assert_eq!(v["phase"], "processing");
        assert_eq!(v["n"], 3);
        assert_eq!(v["path"], "src/a.py");

        let v = JsonProgress::to_json(&ProgressEvent::Outcome {
            path: "b.py".into(),
            outcome: "mock".into(),
        });
        assert_eq!(v["event"], "outcome");
    }
}
