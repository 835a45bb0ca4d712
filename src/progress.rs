//! Indexing progress reporting.
//!
//! Reports observable progress during `pmem index` so users see which file
//! is being scanned and how much is left. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for an indexing run.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// Walking the tree; total not known yet.
    Discovering { root: String },
    /// `n` of `total` candidate files processed.
    Scanning { file: String, n: u64, total: u64 },
    /// Run complete.
    Finished { processed: u64, skipped: u64, errors: u64 },
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index  scanning  12 / 1,204  Foo.h".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Discovering { root } => format!("index {}  discovering...\n", root),
            IndexProgressEvent::Scanning { file, n, total } => format!(
                "index  scanning  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                file
            ),
            IndexProgressEvent::Finished {
                processed,
                skipped,
                errors,
            } => format!(
                "index  done  {} processed, {} skipped, {} errors\n",
                format_number(*processed),
                format_number(*skipped),
                format_number(*errors)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            IndexProgressEvent::Scanning { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "file": file,
                "n": n,
                "total": total
            }),
            IndexProgressEvent::Finished {
                processed,
                skipped,
                errors,
            } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "processed": processed,
                "skipped": skipped,
                "errors": errors
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
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
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Resolve `Auto`: human progress when stderr is a TTY, otherwise off.
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto => {
                if atty::is(atty::Stream::Stderr) {
                    ProgressMode::Human
                } else {
                    ProgressMode::Off
                }
            }
            other => other,
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self.resolve() {
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            ProgressMode::Off | ProgressMode::Auto => Box::new(NoProgress),
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
    fn explicit_modes_resolve_to_themselves() {
        assert_eq!(ProgressMode::Json.resolve(), ProgressMode::Json);
        assert_eq!(ProgressMode::Off.resolve(), ProgressMode::Off);
        assert_ne!(ProgressMode::Auto.resolve(), ProgressMode::Auto);
    }
}
