//! Error taxonomy shared across the incident-response pipeline.

use thiserror::Error;

/// Result type alias used throughout the autopilot crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error taxonomy.
///
/// Variant names are concept-level (see the error handling design), not tied to any one
/// collaborator's transport: a `KeyValueStore` backend and an `ActionProvider` both report
/// their own failures through this enum rather than through separate error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A `KeyValueStore` call failed in a way expected to be transient (connection reset,
    /// lock contention). Retried once in-place by the caller, then dropped.
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    /// A caller attempted an operation that is invalid for the current state, e.g. approving
    /// an action that is not `pending`. No mutation occurs.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A safety rail vetoed an autonomous execution. Carries the human-readable reason that is
    /// attached to the resulting DecisionLog.
    #[error("safety violation: {0}")]
    SafetyViolation(String),

    /// An `ActionProvider` reported failure while executing an approved action.
    #[error("provider failure: {0}")]
    ProviderFailure(String),

    /// The AI analyzer seam did not return a usable analysis (timeout, malformed response,
    /// transport error). Callers fall back to the heuristic root-cause path.
    #[error("analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),

    /// JSON read from storage failed to parse. The offending item is skipped, never aborting
    /// the loop that encountered it.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] serde_json::Error),

    /// A configuration value was missing or out of range at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A bounded external call (LLM, provider, store) exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Catch-all for errors that don't need their own variant, preserved with full context.
    #[error("{0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Whether a caller should retry this error once before giving up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientStorage(_) | Error::Timeout(_))
    }

    /// Coarse category, useful for logging and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Error::TransientStorage(_) => "transient_storage",
            Error::InvalidState(_) => "invalid_state",
            Error::SafetyViolation(_) => "safety_violation",
            Error::ProviderFailure(_) => "provider_failure",
            Error::AnalyzerUnavailable(_) => "analyzer_unavailable",
            Error::MalformedInput(_) => "malformed_input",
            Error::Configuration(_) => "configuration",
            Error::Timeout(_) => "timeout",
            Error::Generic(_) => "generic",
        }
    }
}
