//! Failover wrapper: primary backend with transparent retry on a backup.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{BackendError, EngineError};
use crate::observability::SessionEvent;

use super::{GenerationBackend, GenerationRequest, StreamReceiver};

const RELAY_CHANNEL_CAPACITY: usize = 100;

/// Which backend actually served a call. Exposed for audit logging only;
/// identical values from different routes are indistinguishable otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendRoute {
    /// Served by the primary backend.
    Primary,
    /// Served by the backup after a primary failure.
    Fallback,
}

impl BackendRoute {
    /// Stable string id for logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// A call result tagged with the route that served it.
#[derive(Debug)]
pub struct Routed<T> {
    /// The call's value.
    pub value: T,
    /// The route that produced it.
    pub route: BackendRoute,
}

/// Wraps a primary and a backup backend. Every call shape runs the primary
/// under a deadline; any failure (transport, API, malformed output, timeout)
/// retries the backup with identical arguments. If both fail, the caller
/// gets both errors attached.
pub struct FailoverBackend {
    primary: Arc<dyn GenerationBackend>,
    backup: Arc<dyn GenerationBackend>,
    deadline: Duration,
}

impl FailoverBackend {
    /// Wrap the given backends with a per-call deadline.
    #[must_use]
    pub fn new(
        primary: Arc<dyn GenerationBackend>,
        backup: Arc<dyn GenerationBackend>,
        deadline: Duration,
    ) -> Self {
        Self {
            primary,
            backup,
            deadline,
        }
    }

    async fn attempt<T, F, Fut>(&self, shape: &str, call: F) -> Result<Routed<T>, EngineError>
    where
        F: Fn(Arc<dyn GenerationBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let primary_error = match timeout(self.deadline, call(Arc::clone(&self.primary))).await {
            Ok(Ok(value)) => {
                tracing::debug!(
                    event = SessionEvent::BackendServed.as_str(),
                    shape,
                    backend = self.primary.name(),
                    route = BackendRoute::Primary.as_str(),
                    "generation call served"
                );
                return Ok(Routed {
                    value,
                    route: BackendRoute::Primary,
                });
            }
            Ok(Err(error)) => error,
            Err(_) => BackendError::Timeout(self.deadline),
        };
        tracing::warn!(
            event = SessionEvent::FailoverEngaged.as_str(),
            shape,
            primary = self.primary.name(),
            backup = self.backup.name(),
            error = %primary_error,
            "primary backend failed; retrying on backup"
        );
        let backup_error = match timeout(self.deadline, call(Arc::clone(&self.backup))).await {
            Ok(Ok(value)) => {
                tracing::debug!(
                    event = SessionEvent::BackendServed.as_str(),
                    shape,
                    backend = self.backup.name(),
                    route = BackendRoute::Fallback.as_str(),
                    "generation call served"
                );
                return Ok(Routed {
                    value,
                    route: BackendRoute::Fallback,
                });
            }
            Ok(Err(error)) => error,
            Err(_) => BackendError::Timeout(self.deadline),
        };
        tracing::error!(
            event = SessionEvent::FailoverExhausted.as_str(),
            shape,
            primary_error = %primary_error,
            backup_error = %backup_error,
            "both processors failed"
        );
        Err(EngineError::BothBackendsFailed {
            primary: primary_error,
            backup: backup_error,
        })
    }

    /// Plain-text generation with failover.
    pub async fn generate_text(
        &self,
        request: GenerationRequest,
    ) -> Result<Routed<String>, EngineError> {
        self.attempt("text", |backend| {
            let request = request.clone();
            async move { backend.generate_text(request).await }
        })
        .await
    }

    /// Structured generation with failover. The backend's JSON is
    /// deserialized into the requested shape; a parse failure counts as a
    /// backend failure and triggers the backup like any other.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        request: GenerationRequest,
    ) -> Result<Routed<T>, EngineError> {
        self.attempt("structured", |backend| {
            let request = request.clone();
            async move {
                let value = backend.generate_json(request).await?;
                serde_json::from_value(value).map_err(|e| BackendError::MalformedOutput {
                    reason: e.to_string(),
                })
            }
        })
        .await
    }

    /// Streamed generation with failover. The route is committed once the
    /// chosen backend has produced its first chunk (or ended cleanly);
    /// establishment failures and a failed first chunk fall over to the
    /// backup, so the caller never sees duplicated chunks. A failure later
    /// in the stream arrives as an `Err` item and aborts the sequence.
    pub async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<Routed<StreamReceiver>, EngineError> {
        let routed = self
            .attempt("stream", |backend| {
                let request = request.clone();
                async move {
                    let mut rx = backend.generate_stream(request).await?;
                    match rx.recv().await {
                        None => Ok((rx, None)),
                        Some(Ok(first)) => Ok((rx, Some(first))),
                        Some(Err(error)) => Err(error),
                    }
                }
            })
            .await?;
        let (mut rx, first) = routed.value;
        let route = routed.route;
        let (tx, out) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            if let Some(first) = first {
                if tx.send(Ok(first)).await.is_err() {
                    return;
                }
            }
            while let Some(item) = rx.recv().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Ok(Routed { value: out, route })
    }
}
