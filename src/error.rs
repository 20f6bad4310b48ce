//! Error types for the pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for internal pipeline operations
pub type Result<T> = std::result::Result<T, GateError>;

/// Internal error type for pipeline stages.
///
/// These never cross the pipeline boundary: the orchestrator folds every
/// anticipated failure into a [`crate::types::PipelineResult::Failure`] with
/// an [`ErrorKind`].
#[derive(Debug, Error)]
pub enum GateError {
    /// Threat detector failed (parse error, backend error, etc.)
    #[error("threat detector error: {0}")]
    Detector(String),

    /// Model provider failed
    #[error("model provider error: {0}")]
    Provider(String),

    /// External call exceeded its deadline
    #[error("external call timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration (bad regex, out-of-range threshold, etc.)
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Caller-facing error taxonomy.
///
/// Kinds, not types: every pipeline failure is classified as exactly one of
/// these, with a human-readable message alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Input failed structural validation (length, emptiness, obfuscation)
    InputInvalid,
    /// An instruction-override attempt was detected
    InjectionDetected,
    /// The model response did not match the declared schema
    SchemaMismatch,
    /// The model response violated output policy
    PolicyViolation,
    /// An external call exceeded its deadline
    Timeout,
    /// The model provider returned an error
    ProviderError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InputInvalid => write!(f, "INPUT_INVALID"),
            ErrorKind::InjectionDetected => write!(f, "INJECTION_DETECTED"),
            ErrorKind::SchemaMismatch => write!(f, "SCHEMA_MISMATCH"),
            ErrorKind::PolicyViolation => write!(f, "POLICY_VIOLATION"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::ProviderError => write!(f, "PROVIDER_ERROR"),
        }
    }
}
