//! Summary store contract and in-memory reference store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::observability::SessionEvent;

/// A compressed digest of a closed offset range `[start_offset, end_offset]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[must_use]
pub struct Summary {
    /// Session the summary belongs to.
    pub session_id: String,
    /// Character the session is held with.
    pub character_id: String,
    /// Digest text (state changes, not narration).
    pub summary_text: String,
    /// First offset covered, inclusive.
    pub start_offset: u64,
    /// Last offset covered, inclusive.
    pub end_offset: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Summary {
    /// Build a summary stamped with the current time.
    pub fn new(
        session_id: &str,
        character_id: &str,
        summary_text: &str,
        start_offset: u64,
        end_offset: u64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            character_id: character_id.to_string(),
            summary_text: summary_text.to_string(),
            start_offset,
            end_offset,
            created_at: Utc::now(),
        }
    }
}

/// Store of compressed summaries, appended in non-decreasing end-offset
/// order by a well-behaved session.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Append a summary; returns its id. Fails with
    /// [`EngineError::InvalidRange`] when `start_offset > end_offset` and
    /// leaves the store unchanged.
    async fn append_summary(&self, summary: Summary) -> Result<u64>;

    /// All summaries for a session, ordered by `start_offset`.
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Summary>>;

    /// Maximum `end_offset` summarized so far, or `None` when the session
    /// has no summaries.
    async fn max_end_offset(&self, session_id: &str) -> Result<Option<u64>>;

    /// Delete all summaries for a session; returns the count removed.
    async fn delete_session_summaries(&self, session_id: &str) -> Result<u64>;
}

/// In-memory store: session_id → summaries in append order.
#[derive(Default)]
pub struct InMemorySummaryStore {
    inner: Arc<RwLock<HashMap<String, Vec<Summary>>>>,
    next_id: AtomicU64,
}

impl InMemorySummaryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn append_summary(&self, summary: Summary) -> Result<u64> {
        if summary.start_offset > summary.end_offset {
            tracing::error!(
                session_id = %summary.session_id,
                start_offset = summary.start_offset,
                end_offset = summary.end_offset,
                "summary append rejected: inverted range is a compression-math bug"
            );
            return Err(EngineError::InvalidRange {
                start: summary.start_offset,
                end: summary.end_offset,
            }
            .into());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut g = self.inner.write().await;
        let entry = g.entry(summary.session_id.clone()).or_default();
        tracing::debug!(
            event = SessionEvent::SummaryAppended.as_str(),
            session_id = %summary.session_id,
            start_offset = summary.start_offset,
            end_offset = summary.end_offset,
            summary_chars = summary.summary_text.chars().count(),
            "summary appended"
        );
        entry.push(summary);
        Ok(id)
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Summary>> {
        let g = self.inner.read().await;
        let mut out = g.get(session_id).cloned().unwrap_or_default();
        out.sort_by_key(|s| s.start_offset);
        tracing::debug!(
            event = SessionEvent::SummariesLoaded.as_str(),
            session_id,
            loaded_summaries = out.len(),
            "summaries loaded"
        );
        Ok(out)
    }

    async fn max_end_offset(&self, session_id: &str) -> Result<Option<u64>> {
        let g = self.inner.read().await;
        Ok(g.get(session_id)
            .and_then(|entry| entry.iter().map(|s| s.end_offset).max()))
    }

    async fn delete_session_summaries(&self, session_id: &str) -> Result<u64> {
        let mut g = self.inner.write().await;
        let removed = g.remove(session_id).map_or(0, |entry| entry.len() as u64);
        tracing::debug!(
            event = SessionEvent::SessionCleared.as_str(),
            session_id,
            removed,
            "session summaries deleted"
        );
        Ok(removed)
    }
}
