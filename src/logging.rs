//! Injectable logging.
//!
//! Inference calls never reach for process-wide logger state. Each call
//! receives a [`Logger`] through its [`crate::Inference`] context; the
//! default forwards to `tracing`, so binaries pick the subscriber.

use std::fmt;
use std::sync::Mutex;

use tracing::Level;

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn enabled(&self, _level: Level) -> bool {
        true
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::WARN) {
            self.log(Level::WARN, args);
        }
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::INFO) {
            self.log(Level::INFO, args);
        }
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::DEBUG) {
            self.log(Level::DEBUG, args);
        }
    }
}

/// Forwards every record to the `tracing` macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level == Level::ERROR {
            tracing::error!("{}", args);
        } else if level == Level::WARN {
            tracing::warn!("{}", args);
        } else if level == Level::INFO {
            tracing::info!("{}", args);
        } else if level == Level::DEBUG {
            tracing::debug!("{}", args);
        } else {
            tracing::trace!("{}", args);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}

    fn enabled(&self, _level: Level) -> bool {
        false
    }
}

/// Keeps formatted records in memory, up to a maximum verbosity.
#[derive(Debug)]
pub struct MemoryLogger {
    max_level: Level,
    records: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    pub fn new(max_level: Level) -> Self {
        Self { max_level, records: Mutex::new(Vec::new()) }
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new(Level::TRACE)
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        match self.records.lock() {
            Ok(mut records) => records.push((level, message)),
            Err(poisoned) => poisoned.into_inner().push((level, message)),
        }
    }

    fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }
}
