//! Warning capture for tests.
//!
//! Installs a process-wide `log` backend that keeps warnings and errors in
//! memory. Tests run in parallel, so assertions should look for a message
//! unique to the test rather than count records.

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::sync::{Mutex, Once};

struct CaptureLogger {
    records: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if let Ok(mut records) = self.records.lock() {
                records.push(record.args().to_string());
            }
        }
    }

    fn flush(&self) {}
}

static LOGGER: Lazy<CaptureLogger> = Lazy::new(|| CaptureLogger {
    records: Mutex::new(Vec::new()),
});

static INIT: Once = Once::new();

/// Installs the capturing logger. Safe to call from every test.
pub(crate) fn install() {
    INIT.call_once(|| {
        if log::set_logger(&*LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Warn);
        }
    });
}

/// Captured warnings containing `needle`.
pub(crate) fn warnings_containing(needle: &str) -> Vec<String> {
    LOGGER
        .records
        .lock()
        .map(|records| {
            records
                .iter()
                .filter(|message| message.contains(needle))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
