//! Leveled, thread-safe logger.
//!
//! A `Logger` is a cheap handle: clones (and scoped children created with
//! [`Logger::with_prefix`]) share one sink, one lock and one threshold.
//! Records below the threshold are discarded before any formatting or
//! locking happens.

pub mod level;
pub mod record;
pub mod sink;

use std::fmt;
use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

pub use level::{AnsiColor, LogLevel};
pub use record::{Attr, DEFAULT_TIME_LAYOUT, LogRecord};
pub use sink::{BufferSink, SharedSink};

use crate::config::LogConfig;
use crate::error::{ConfigError, LogError};

/// Attribute list accepted by every log call.
pub type Attrs<'a> = &'a [(&'a str, &'a dyn fmt::Display)];

/// Construction options for a [`Logger`].
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub level: LogLevel,
    pub time_layout: String,
    pub color: bool,
    pub prefix: Option<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            time_layout: DEFAULT_TIME_LAYOUT.to_string(),
            color: false,
            prefix: None,
        }
    }
}

struct LoggerState {
    sink: SharedSink,
    threshold: AtomicI32,
    time_layout: String,
    color: bool,
    write_failures: AtomicU64,
}

/// Shared handle to a leveled sink.
#[derive(Clone)]
pub struct Logger {
    state: Arc<LoggerState>,
    prefix: Option<Arc<str>>,
}

impl Logger {
    /// Create a logger writing plain (uncolored) lines to `sink`.
    pub fn new(sink: SharedSink, level: LogLevel) -> Self {
        Self::with_options(
            sink,
            LoggerOptions {
                level,
                ..Default::default()
            },
        )
    }

    pub fn with_options(sink: SharedSink, options: LoggerOptions) -> Self {
        Self {
            state: Arc::new(LoggerState {
                sink,
                threshold: AtomicI32::new(options.level.rank()),
                time_layout: options.time_layout,
                color: options.color,
                write_failures: AtomicU64::new(0),
            }),
            prefix: options.prefix.filter(|p| !p.is_empty()).map(Arc::from),
        }
    }

    /// Build the process default logger. Only the binary's entry point calls this.
    pub fn from_config(config: &LogConfig) -> Result<Self, ConfigError> {
        let (sink, is_terminal) = match &config.file {
            Some(path) => (SharedSink::file(path)?, false),
            None => (SharedSink::stdout(), std::io::stdout().is_terminal()),
        };

        Ok(Self::with_options(
            sink,
            LoggerOptions {
                level: config.level,
                time_layout: DEFAULT_TIME_LAYOUT.to_string(),
                color: config.color.unwrap_or(is_terminal),
                prefix: config.prefix.clone(),
            },
        ))
    }

    /// Derive a scoped logger sharing this one's sink and threshold.
    ///
    /// Nested scopes are joined with `.`: `"synapse"` then `"worker"` gives
    /// `"synapse.worker"`.
    pub fn with_prefix(&self, name: &str) -> Self {
        let prefix = match &self.prefix {
            Some(parent) if !name.is_empty() => Some(Arc::from(format!("{parent}.{name}"))),
            Some(parent) => Some(Arc::clone(parent)),
            None if name.is_empty() => None,
            None => Some(Arc::from(name)),
        };
        Self {
            state: Arc::clone(&self.state),
            prefix,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn sink(&self) -> &SharedSink {
        &self.state.sink
    }

    pub fn level(&self) -> LogLevel {
        // Only ranks of real levels are ever stored.
        LogLevel::from_rank(self.state.threshold.load(Ordering::SeqCst)).unwrap_or(LogLevel::Info)
    }

    /// Change the threshold for all handles sharing this logger's state.
    pub fn set_level(&self, level: LogLevel) {
        self.state.threshold.store(level.rank(), Ordering::SeqCst);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level.rank() >= self.state.threshold.load(Ordering::SeqCst)
    }

    /// Number of records the sink failed to accept.
    pub fn write_failures(&self) -> u64 {
        self.state.write_failures.load(Ordering::Relaxed)
    }

    /// Format and write one record if `level` passes the threshold.
    pub fn log(&self, level: LogLevel, message: &str, attrs: Attrs<'_>) -> Result<(), LogError> {
        if !self.enabled(level) {
            return Ok(());
        }

        let line = LogRecord::new(level, self.prefix(), message, attrs)
            .format(&self.state.time_layout, self.state.color);

        self.state
            .sink
            .write_line(line.as_bytes())
            .map_err(|source| LogError::WriteFailed {
                bytes: line.len(),
                source,
            })
    }

    pub fn debug(&self, message: &str, attrs: Attrs<'_>) -> Result<(), LogError> {
        self.log(LogLevel::Debug, message, attrs)
    }

    pub fn info(&self, message: &str, attrs: Attrs<'_>) -> Result<(), LogError> {
        self.log(LogLevel::Info, message, attrs)
    }

    pub fn warn(&self, message: &str, attrs: Attrs<'_>) -> Result<(), LogError> {
        self.log(LogLevel::Warn, message, attrs)
    }

    pub fn error(&self, message: &str, attrs: Attrs<'_>) -> Result<(), LogError> {
        self.log(LogLevel::Error, message, attrs)
    }

    pub fn critical(&self, message: &str, attrs: Attrs<'_>) -> Result<(), LogError> {
        self.log(LogLevel::Critical, message, attrs)
    }

    /// Log at `Fatal` and terminate the process with status 1.
    pub fn fatal(&self, message: &str, attrs: Attrs<'_>) -> ! {
        if let Err(e) = self.log(LogLevel::Fatal, message, attrs) {
            let line = LogRecord::new(LogLevel::Fatal, self.prefix(), message, attrs)
                .format(&self.state.time_layout, false);
            eprint!("{line}");
            eprintln!("log sink unavailable: {e}");
        }
        std::process::exit(1);
    }

    /// Log without returning the sink error.
    ///
    /// Used by background activities that have no caller to report to. A
    /// failed write is counted and reported once more at `Error`.
    pub fn note(&self, level: LogLevel, message: &str, attrs: Attrs<'_>) {
        if let Err(e) = self.log(level, message, attrs) {
            self.state.write_failures.fetch_add(1, Ordering::Relaxed);
            let _ = self.log(
                LogLevel::Error,
                "log sink write failed",
                &[("level", &level), ("error", &e)],
            );
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("prefix", &self.prefix)
            .field("color", &self.state.color)
            .finish()
    }
}
