//! # ShellKit Common
//!
//! Shared error type, logging setup, and retry helpers for the ShellKit
//! application-shell worker.
//!
//! ## Features
//!
//! - Unified error type with backtrace support for internal failures
//! - `tracing` subscriber setup (pretty, compact, JSON)
//! - Retry with exponential backoff, gated on the error kind

use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_when, RetryConfig};

/// Unified error type for ShellKit.
#[derive(Error, Debug)]
pub enum ShellKitError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The host platform lacks a required capability.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl ShellKitError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShellKitError::Network { .. } | ShellKitError::Io(_)
        )
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ShellKitError::Network { .. } => "network",
            ShellKitError::Config { .. } => "config",
            ShellKitError::Unsupported(_) => "unsupported",
            ShellKitError::Io(_) => "io",
            ShellKitError::NotFound(_) => "not_found",
            ShellKitError::InvalidArgument(_) => "invalid_argument",
            ShellKitError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for ShellKit operations.
pub type Result<T> = std::result::Result<T, ShellKitError>;
