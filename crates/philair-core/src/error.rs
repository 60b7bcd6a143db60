// ── Core error types ──
//
// Errors surfaced to whoever owns a Coordinator. Transport failures from
// philair-api are folded into these through `From<philair_api::Error>`.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup errors ─────────────────────────────────────────────────
    /// The first session did not open within the setup timeout.
    #[error("Device at {target} did not respond within {timeout_secs}s")]
    SetupTimeout { target: String, timeout_secs: u64 },

    #[error("Cannot set up device at {target}: {reason}")]
    SetupFailed { target: String, reason: String },

    // ── Runtime errors ───────────────────────────────────────────────
    /// No session is installed (reconnect in progress, or shut down).
    #[error("Device is not connected")]
    NotConnected,

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    // ── Capability errors ────────────────────────────────────────────
    #[error("Operation not supported by {model}: {operation}")]
    Unsupported { model: String, operation: String },

    #[error("Unknown preset mode '{name}' for {model}")]
    UnknownPreset { model: String, name: String },

    #[error("Unknown device model: {model}")]
    UnknownModel { model: String },

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error("Device error: {message}")]
    Api { message: String, transient: bool },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<philair_api::Error> for CoreError {
    fn from(err: philair_api::Error) -> Self {
        match err {
            philair_api::Error::Rejected { message } => CoreError::CommandFailed { message },
            philair_api::Error::Closed => CoreError::NotConnected,
            other => CoreError::Api {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}
