//! Error types for the BioScout core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the reasoning gateway, external data sources, pipeline execution,
//! and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the BioScout core library.
#[derive(Debug, thiserror::Error)]
pub enum BioscoutError {
    #[error("Reasoner error: {0}")]
    Reasoner(#[from] ReasonerError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from reasoning-gateway interactions.
///
/// Structured-output parse failures are deliberately NOT a variant here:
/// callers that request structured output must validate the returned text
/// themselves and fall back deterministically, so a malformed payload is a
/// successful call from the gateway's point of view.
#[derive(Debug, thiserror::Error)]
pub enum ReasonerError {
    #[error("Gateway request failed: {message}")]
    Request { message: String },

    #[error("Gateway request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("No instruction configured for role '{role}'")]
    UnknownRole { role: String },

    #[error("Gateway connection failed: {message}")]
    Connection { message: String },
}

/// Errors from external data sources (trial registry, publication indexes,
/// full-text and dataset repositories).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("'{source_name}' request failed: {message}")]
    Request { source_name: String, message: String },

    #[error("'{source_name}' timed out after {timeout_secs}s")]
    Timeout { source_name: String, timeout_secs: u64 },

    #[error("'{source_name}' returned a malformed payload: {message}")]
    MalformedPayload { source_name: String, message: String },

    #[error("'{source_name}' rate limited the request")]
    RateLimited { source_name: String },
}

/// Errors from the pipeline executor.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("Step '{step}' failed: {source}")]
    ReasonerFailed {
        step: String,
        #[source]
        source: ReasonerError,
    },

    #[error("Pipeline event channel closed")]
    ChannelClosed,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `BioscoutError`.
pub type Result<T> = std::result::Result<T, BioscoutError>;
