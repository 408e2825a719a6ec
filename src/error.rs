use thiserror::Error;

use crate::blockchain::source::SourceError;
use crate::models::Network;
use crate::storage::StorageError;

/// Main error type for the chain event listener
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Block source error: {0}")]
    Source(#[from] SourceError),

    #[error("Watch store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No listener registered for network {0}")]
    UnregisteredNetwork(Network),

    #[error("Listener for {0} is already running")]
    AlreadyStarted(Network),

    #[error("Listener for {0} has been stopped")]
    Stopped(Network),

    #[error("Listener for {0} is running; stop it before touching its state")]
    Running(Network),

    #[error("Event stream for {0} has already been taken")]
    EventsUnavailable(Network),

    #[error("Event stream closed")]
    StreamClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Poll task failed: {0}")]
    TaskJoin(String),

    #[error("Shutdown finished with {} failing listener(s)", .failures.len())]
    Shutdown { failures: Vec<(Network, String)> },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),
}

/// Failure reported by an application event handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Event handler failed: {0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError(message.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ListenerError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Errors that leave a listener unable to make progress
    Critical,
    /// Errors surfaced to a caller that must act on them
    High,
    /// Transient errors retried on the next poll
    Medium,
    /// Expected conditions during shutdown
    Low,
}

impl ListenerError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ListenerError::TaskJoin(_) => ErrorSeverity::Critical,
            ListenerError::Config(_) => ErrorSeverity::Critical,
            ListenerError::StreamClosed => ErrorSeverity::Critical,

            ListenerError::UnregisteredNetwork(_) => ErrorSeverity::High,
            ListenerError::AlreadyStarted(_) => ErrorSeverity::High,
            ListenerError::Stopped(_) => ErrorSeverity::High,
            ListenerError::Running(_) => ErrorSeverity::High,
            ListenerError::EventsUnavailable(_) => ErrorSeverity::High,
            ListenerError::Shutdown { .. } => ErrorSeverity::High,

            ListenerError::Source(_) => ErrorSeverity::Medium,
            ListenerError::Storage(_) => ErrorSeverity::Medium,

            ListenerError::Cancelled => ErrorSeverity::Low,
        }
    }

    /// Check if the next poll cycle can be expected to get past this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            ListenerError::Source(_) => true,
            ListenerError::Storage(StorageError::Lock(_)) => true,
            ListenerError::Storage(StorageError::Sqlite(_)) => true,
            _ => false,
        }
    }
}
