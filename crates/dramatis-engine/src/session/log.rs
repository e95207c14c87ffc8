//! Message log contract and in-memory reference store.
//!
//! The durable relational store lives outside this crate behind the same
//! trait; the in-memory store backs tests and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;

use dramatis_window::{FragmentKind, TurnFragment};

use crate::observability::SessionEvent;

/// Ordered, per-session sequence of turn fragments keyed by offset.
///
/// Offsets within a session are gapless and strictly increasing by append
/// order; only truncation removes rows.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append fragments as one batch; returns the last offset written.
    /// Fragments must arrive with contiguous offsets continuing the
    /// session's sequence.
    async fn append(
        &self,
        session_id: &str,
        character_id: &str,
        fragments: Vec<TurnFragment>,
    ) -> Result<u64>;

    /// Most recent `limit` fragments, chronological order, optionally
    /// filtered by kind.
    async fn read_recent(
        &self,
        session_id: &str,
        limit: usize,
        kind: Option<FragmentKind>,
    ) -> Result<Vec<TurnFragment>>;

    /// Full session history, chronological order.
    async fn read_all(&self, session_id: &str) -> Result<Vec<TurnFragment>>;

    /// Delete every fragment at `from_offset` and after; returns the count
    /// removed.
    async fn delete_from_offset(&self, session_id: &str, from_offset: u64) -> Result<u64>;

    /// Delete the whole session; returns the count removed.
    async fn delete_session(&self, session_id: &str) -> Result<u64>;
}

/// In-memory log: session_id → fragments in offset order.
#[derive(Default)]
pub struct InMemoryMessageLog {
    inner: Arc<RwLock<HashMap<String, Vec<TurnFragment>>>>,
}

impl InMemoryMessageLog {
    /// Create a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(
        &self,
        session_id: &str,
        character_id: &str,
        fragments: Vec<TurnFragment>,
    ) -> Result<u64> {
        if fragments.is_empty() {
            bail!("append of zero fragments for session_id={session_id}");
        }
        let mut g = self.inner.write().await;
        let entry = g.entry(session_id.to_string()).or_default();
        let mut expected = entry.last().map_or(0, |f| f.offset + 1);
        for fragment in &fragments {
            if fragment.offset != expected {
                bail!(
                    "non-contiguous append for session_id={session_id}: \
                     offset {} where {expected} was expected",
                    fragment.offset
                );
            }
            expected += 1;
        }
        let last_offset = expected - 1;
        entry.extend(fragments);
        tracing::debug!(
            event = SessionEvent::LogAppended.as_str(),
            session_id,
            character_id,
            last_offset,
            total_fragments = entry.len(),
            "fragments appended"
        );
        Ok(last_offset)
    }

    async fn read_recent(
        &self,
        session_id: &str,
        limit: usize,
        kind: Option<FragmentKind>,
    ) -> Result<Vec<TurnFragment>> {
        let g = self.inner.read().await;
        let Some(entry) = g.get(session_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<TurnFragment> = entry
            .iter()
            .rev()
            .filter(|f| kind.is_none_or(|k| f.kind == k))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn read_all(&self, session_id: &str) -> Result<Vec<TurnFragment>> {
        let g = self.inner.read().await;
        Ok(g.get(session_id).cloned().unwrap_or_default())
    }

    async fn delete_from_offset(&self, session_id: &str, from_offset: u64) -> Result<u64> {
        let mut g = self.inner.write().await;
        let Some(entry) = g.get_mut(session_id) else {
            return Ok(0);
        };
        let before = entry.len();
        entry.retain(|f| f.offset < from_offset);
        let removed = (before - entry.len()) as u64;
        tracing::debug!(
            event = SessionEvent::LogTruncated.as_str(),
            session_id,
            from_offset,
            removed,
            "log truncated"
        );
        Ok(removed)
    }

    async fn delete_session(&self, session_id: &str) -> Result<u64> {
        let mut g = self.inner.write().await;
        let removed = g.remove(session_id).map_or(0, |entry| entry.len() as u64);
        tracing::debug!(
            event = SessionEvent::SessionCleared.as_str(),
            session_id,
            removed,
            "session log deleted"
        );
        Ok(removed)
    }
}
