//! Typed error taxonomy for backend calls and the turn engine.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single generation-backend call. Every variant is
/// failover-eligible: the wrapper retries the backup on any of these.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("backend transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the backend.
    #[error("backend API error {status}: {body}")]
    Api {
        /// HTTP status code returned.
        status: u16,
        /// Response body, verbatim, for diagnostics.
        body: String,
    },

    /// Call exceeded its deadline.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// Structured-output call returned text that does not parse into the
    /// requested shape.
    #[error("malformed structured output: {reason}")]
    MalformedOutput {
        /// Parse failure detail.
        reason: String,
    },

    /// A live token stream failed after it had started.
    #[error("response stream aborted: {reason}")]
    Stream {
        /// Abort cause reported by the backend.
        reason: String,
    },

    /// Response parsed but carried no usable content.
    #[error("backend response has no content")]
    EmptyResponse,
}

/// Failure surfaced to the engine's caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A generation call failed on the primary and on the backup. Both
    /// underlying errors are attached verbatim.
    #[error("both processors failed: primary: {primary}; backup: {backup}")]
    BothBackendsFailed {
        /// What the primary backend reported.
        primary: BackendError,
        /// What the backup backend reported.
        backup: BackendError,
    },

    /// The response stream failed after chunks had already been relayed;
    /// the turn is aborted with nothing persisted.
    #[error("response stream aborted mid-turn: {0}")]
    StreamAborted(#[source] BackendError),

    /// Regenerate/rewind invoked on a session with no prior user turn.
    #[error("no prior user message to operate on")]
    NoHistory,

    /// A slash-command other than the recognized ones.
    #[error("unknown command `{command}`; valid commands: /regenerate, /rewind")]
    UnknownCommand {
        /// The command as typed.
        command: String,
    },

    /// A summary append was attempted with an inverted range. This is a
    /// compression-math contract violation, never retried.
    #[error("invalid summary range: start_offset {start} > end_offset {end}")]
    InvalidRange {
        /// Claimed start of the range.
        start: u64,
        /// Claimed end of the range.
        end: u64,
    },

    /// A turn was requested for a session that has not been loaded.
    #[error("session `{session_id}` is not loaded")]
    SessionNotLoaded {
        /// The session id as given.
        session_id: String,
    },

    /// A message-log or summary-store operation failed. Not retried by the
    /// engine: a silent retry on a log append risks duplicate offsets.
    #[error("storage operation failed: {0}")]
    Storage(anyhow::Error),
}

impl EngineError {
    /// Collapse a storage error back into its typed form when the store
    /// reported a contract violation rather than an I/O failure.
    #[must_use]
    pub fn from_storage(error: anyhow::Error) -> Self {
        match error.downcast::<EngineError>() {
            Ok(typed) => typed,
            Err(other) => Self::Storage(other),
        }
    }
}
