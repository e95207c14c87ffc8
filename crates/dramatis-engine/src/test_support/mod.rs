//! Scripted backend doubles for engine tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use crate::backend::{GenerationBackend, GenerationRequest, StreamReceiver};
use crate::error::BackendError;

/// Install a compact subscriber honouring `RUST_LOG`; safe to call from
/// every test, only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One recorded backend call: which shape it was and its full request.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// "text", "structured", or "stream".
    pub shape: &'static str,
    /// The request as the backend received it.
    pub request: GenerationRequest,
}

/// A scripted backend: either serves fixed responses or fails every call.
/// Every call is recorded for prompt assertions.
pub struct StubBackend {
    name: String,
    fail_all: bool,
    evaluation: serde_json::Value,
    reply_chunks: Vec<String>,
    digest_text: String,
    stream_error: Option<String>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl StubBackend {
    /// A backend that serves every call.
    #[must_use]
    pub fn healthy(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_all: false,
            evaluation: json!({
                "avoid_patterns": [],
                "situation": "the conversation continues",
                "elapsed_time": null,
                "user_name": null,
            }),
            reply_chunks: vec!["scripted reply".to_string()],
            digest_text: "scripted digest".to_string(),
            stream_error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A backend that fails every call.
    #[must_use]
    pub fn failing(name: &str) -> Self {
        Self {
            fail_all: true,
            ..Self::healthy(name)
        }
    }

    /// Override the JSON served to structured calls.
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: serde_json::Value) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Override the chunks served to stream calls.
    #[must_use]
    pub fn with_reply_chunks(mut self, chunks: &[&str]) -> Self {
        self.reply_chunks = chunks.iter().map(ToString::to_string).collect();
        self
    }

    /// Override the text served to plain-text calls.
    #[must_use]
    pub fn with_digest(mut self, digest: &str) -> Self {
        self.digest_text = digest.to_string();
        self
    }

    /// End every stream with an error after the scripted chunks.
    #[must_use]
    pub fn with_stream_error(mut self, reason: &str) -> Self {
        self.stream_error = Some(reason.to_string());
        self
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, shape: &'static str, request: &GenerationRequest) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                shape,
                request: request.clone(),
            });
        }
    }

    fn scripted_failure(&self) -> BackendError {
        BackendError::Api {
            status: 500,
            body: format!("scripted failure from {}", self.name),
        }
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn generate_text(&self, request: GenerationRequest) -> Result<String, BackendError> {
        self.record("text", &request);
        if self.fail_all {
            return Err(self.scripted_failure());
        }
        Ok(self.digest_text.clone())
    }

    async fn generate_json(
        &self,
        request: GenerationRequest,
    ) -> Result<serde_json::Value, BackendError> {
        self.record("structured", &request);
        if self.fail_all {
            return Err(self.scripted_failure());
        }
        Ok(self.evaluation.clone())
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<StreamReceiver, BackendError> {
        self.record("stream", &request);
        if self.fail_all {
            return Err(self.scripted_failure());
        }
        let (tx, rx) = mpsc::channel(self.reply_chunks.len() + 2);
        for chunk in &self.reply_chunks {
            let _ = tx.try_send(Ok(chunk.clone()));
        }
        if let Some(ref reason) = self.stream_error {
            let _ = tx.try_send(Err(BackendError::Stream {
                reason: reason.clone(),
            }));
        }
        Ok(rx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
