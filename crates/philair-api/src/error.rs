use thiserror::Error;

/// Top-level error type for the `philair-api` crate.
///
/// Covers every failure a device client can surface: session setup,
/// the observation stream, and control writes. `philair-core` maps these
/// into coordinator-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// Opening a session to the device failed.
    #[error("Cannot connect to device at {target}: {reason}")]
    Connect { target: String, reason: String },

    /// An operation did not complete in time.
    #[error("Device request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was already shut down.
    #[error("Device session closed")]
    Closed,

    // ── Observation ─────────────────────────────────────────────────
    /// The observe stream stopped delivering status.
    #[error("Status stream closed: {reason}")]
    StreamClosed { reason: String },

    // ── Control ─────────────────────────────────────────────────────
    /// The device refused a control write.
    #[error("Device rejected control write: {message}")]
    Rejected { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The device sent something the client could not decode.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns `true` if a fresh session is likely to succeed where this
    /// one failed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Timeout { .. }
                | Self::Io(_)
                | Self::Closed
                | Self::StreamClosed { .. }
        )
    }
}
