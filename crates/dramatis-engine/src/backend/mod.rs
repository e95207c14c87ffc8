//! Generation backend interface: text, structured, and streamed call shapes.

mod failover;
mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BackendError;

pub use failover::{BackendRoute, FailoverBackend, Routed};
pub use http::HttpBackend;

/// One prior turn of context sent with a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorTurn {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Turn text.
    pub content: String,
}

impl PriorTurn {
    /// Build a prior turn from role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Arguments of one generation call. Cloneable so a failed primary call can
/// be retried on the backup with identical arguments.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System prompt (persona, memory summary, instructions).
    pub system_prompt: String,
    /// The prompt for this call.
    pub user_prompt: String,
    /// Recent conversation context, oldest first.
    pub prior_turns: Vec<PriorTurn>,
}

impl GenerationRequest {
    /// Build a request without prior-turn context.
    #[must_use]
    pub fn new(system_prompt: String, user_prompt: String) -> Self {
        Self {
            system_prompt,
            user_prompt,
            prior_turns: Vec::new(),
        }
    }

    /// Attach prior-turn context to this request.
    #[must_use]
    pub fn with_prior_turns(mut self, prior_turns: Vec<PriorTurn>) -> Self {
        self.prior_turns = prior_turns;
        self
    }
}

/// Items flowing out of a streamed generation call. The stream is lazy,
/// finite, and non-restartable; an `Err` item aborts the sequence.
pub type StreamReceiver = mpsc::Receiver<Result<String, BackendError>>;

/// A text/structured-output generation service.
///
/// `generate_json` is the dyn-safe carrier for structured calls: backends
/// return raw JSON and the failover wrapper deserializes into the requested
/// shape, treating parse failure as a backend failure.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate plain text; blocks until complete.
    async fn generate_text(&self, request: GenerationRequest) -> Result<String, BackendError>;

    /// Generate a JSON value for a structured-output call.
    async fn generate_json(
        &self,
        request: GenerationRequest,
    ) -> Result<serde_json::Value, BackendError>;

    /// Generate a live token stream. The caller must fully drain the
    /// receiver to know the call succeeded.
    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<StreamReceiver, BackendError>;

    /// Display name for logging.
    fn name(&self) -> &str;
}
