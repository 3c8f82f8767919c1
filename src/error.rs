//! Error types for Synapse.

use std::time::Duration;

/// Top-level error type for the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Log sink errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to write {bytes}-byte line: {source}")]
    WriteFailed {
        bytes: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Worker lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Failed to register handler for {signal}: {source}")]
    SignalRegistration {
        signal: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start heartbeat timer: {reason}")]
    TimerStart { reason: String },

    #[error("Lifecycle already in state {state}, cannot run again")]
    AlreadyRun { state: String },

    #[error("{activity} did not stop within {timeout:?}")]
    ShutdownTimeout { activity: String, timeout: Duration },
}

/// Remote API authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Authentication rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Authentication request failed: {0}")]
    Transport(String),

    #[error("Invalid session payload: {0}")]
    InvalidSession(String),
}

/// Remote API posting errors.
#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("Post rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Post request failed: {0}")]
    Transport(String),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    #[error("Insert into {table} failed: {reason}")]
    Insert { table: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Task execution errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Post failed: {0}")]
    Post(#[from] PostError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Task {task} cancelled")]
    Cancelled { task: String },

    #[error("Invalid cron schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },
}

impl TaskError {
    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled { .. } | Self::InvalidSchedule { .. })
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
