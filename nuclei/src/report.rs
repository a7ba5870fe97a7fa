//! Reporting sinks for pipeline diagnostics.
//!
//! Operations that can degrade (unsupported dimensionality, overwritten
//! channels, skipped fields) take a [`Reporter`] explicitly instead of
//! writing to a global logger. [`LogReporter`] forwards to the `log` facade,
//! [`RecordingReporter`] keeps every message in memory so callers can audit
//! what happened during a run.
//!
//! Binaries install a process-wide logger once with [`init_logging`].

use log::{Level, LevelFilter, SetLoggerError};
use std::sync::{Arc, Mutex, PoisonError};

/// Default `log` target used by [`LogReporter`].
pub const DEFAULT_TARGET: &str = "nuclei";

/// Sink receiving diagnostics emitted by segmentation and extraction steps.
pub trait Reporter: Send + Sync {
    fn report(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.report(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.report(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }
}

/// Forwards every message to the `log` facade under a fixed target.
#[derive(Debug, Clone)]
pub struct LogReporter {
    target: String,
}

impl LogReporter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}

impl Reporter for LogReporter {
    fn report(&self, level: Level, message: &str) {
        log::log!(target: self.target.as_str(), level, "{message}");
    }
}

/// Keeps every reported message, in order, and also forwards it to `log`.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of messages reported at exactly `level`.
    pub fn count(&self, level: Level) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    /// True if some message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, level: Level, message: &str) {
        log::log!(target: DEFAULT_TARGET, level, "{message}");
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

/// Shared handle to the default reporter.
pub fn default_reporter() -> Arc<dyn Reporter> {
    Arc::new(LogReporter::default())
}

/// Install an `env_logger` backend for the process.
///
/// Meant for the outermost entry point only; `RUST_LOG` still overrides the
/// level passed here.
pub fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        reporter.info("first");
        reporter.warn("second");
        reporter.warn("third");

        let records = reporter.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], (Level::Info, "first".to_string()));
        assert_eq!(reporter.count(Level::Warn), 2);
        assert!(reporter.contains(Level::Warn, "thi"));
        assert!(!reporter.contains(Level::Error, "first"));
    }

    #[test]
    fn test_log_reporter_target() {
        assert_eq!(LogReporter::default().target(), DEFAULT_TARGET);
        let reporter = LogReporter::new("segment");
        reporter.debug("not captured, just must not panic");
        assert_eq!(reporter.target(), "segment");
    }
}
