//! Errors that can occur during discovery and supervision.

use thiserror::Error;

/// Errors produced by discovery strategies and the topology supervisor.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Configuration error (missing or ill-typed option).
    #[error("configuration error: {0}")]
    Config(String),

    /// DNS resolution failed.
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// Network error while talking to a discovery endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// Could not bind an owned socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address the worker tried to bind.
        addr: String,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// Backend-specific error.
    #[error("backend error ({backend}): {message}")]
    Backend {
        /// Name of the discovery backend.
        backend: &'static str,
        /// Error message from the backend.
        message: String,
    },

    /// A discovery document could not be parsed; the datum is dropped.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
