//! Run diagnostics.
//!
//! The process-wide logger is wrapped in an explicit handle that components
//! receive as a parameter, so tests can capture or suppress output without
//! installing a global subscriber. The default sink forwards to the `log`
//! facade; whatever logger the embedding binary installs sees the records.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Error,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub level: Level,
    pub message: String,
}

enum Sink {
    Log,
    Capture(Mutex<Vec<Entry>>),
}

pub struct Diagnostics {
    sink: Sink,
}

impl Diagnostics {
    /// Forward records to the `log` facade.
    pub fn log() -> Self {
        Self { sink: Sink::Log }
    }

    /// Buffer records in memory; retrieve them with [`Diagnostics::entries`].
    pub fn capture() -> Self {
        Self {
            sink: Sink::Capture(Mutex::new(Vec::new())),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.record(Level::Debug, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Level::Error, message.into());
    }

    fn record(&self, level: Level, message: String) {
        match &self.sink {
            Sink::Log => match level {
                Level::Debug => log::debug!("{message}"),
                Level::Error => log::error!("{message}"),
            },
            Sink::Capture(buffer) => {
                // A poisoned lock means a test already panicked; the entry
                // is not worth a second panic.
                if let Ok(mut entries) = buffer.lock() {
                    entries.push(Entry { level, message });
                }
            }
        }
    }

    /// Captured records, oldest first. Empty for the forwarding sink.
    pub fn entries(&self) -> Vec<Entry> {
        match &self.sink {
            Sink::Log => Vec::new(),
            Sink::Capture(buffer) => buffer.lock().map(|e| e.clone()).unwrap_or_default(),
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sink_records_in_order() {
        let diag = Diagnostics::capture();
        diag.debug("first");
        diag.error("second");

        let entries = diag.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Debug);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].level, Level::Error);
    }

    #[test]
    fn log_sink_has_no_buffer() {
        let diag = Diagnostics::log();
        diag.debug("not retained");
        assert!(diag.entries().is_empty());
    }
}
