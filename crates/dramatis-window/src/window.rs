//! Session window: bounded tail of the turn log plus per-session scratch state.

use std::collections::VecDeque;

use crate::{FragmentKind, TurnFragment};

/// In-process working set for one live session: the most recent fragments
/// (generously over-fetched on load), the running memory summary, the cached
/// next offset, and short scratch fields carried between turns. Owned
/// exclusively by one engine instance; the log remains the source of truth.
#[derive(Debug)]
pub struct SessionWindow {
    session_id: String,
    ring: VecDeque<TurnFragment>,
    max_fragments: usize,
    current_offset: u64,
    memory_summary: String,
    user_display_name: Option<String>,
    forward_plan: Option<String>,
}

impl SessionWindow {
    /// Create an empty window with a fixed capacity.
    #[must_use]
    pub fn new(session_id: &str, max_fragments: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            ring: VecDeque::with_capacity(max_fragments.min(4096)),
            max_fragments,
            current_offset: 0,
            memory_summary: String::new(),
            user_display_name: None,
            forward_plan: None,
        }
    }

    /// Rebuild from storage: the log tail (oldest to newest) and the
    /// concatenated summary text. The next offset is derived from the tail.
    pub fn rebuild(&mut self, tail: Vec<TurnFragment>, memory_summary: String) {
        self.ring.clear();
        self.current_offset = tail.last().map_or(0, |f| f.offset + 1);
        for fragment in tail {
            self.push(fragment);
        }
        self.memory_summary = memory_summary;
    }

    /// Append fragments just persisted to the log, advancing the next offset.
    pub fn extend(&mut self, fragments: Vec<TurnFragment>) {
        for fragment in fragments {
            self.current_offset = fragment.offset + 1;
            self.push(fragment);
        }
    }

    fn push(&mut self, fragment: TurnFragment) {
        self.ring.push_back(fragment);
        while self.ring.len() > self.max_fragments {
            let _ = self.ring.pop_front();
        }
    }

    /// Last `max_fragments` conversation-kind fragments (oldest to newest),
    /// for prompt context building. Evaluation fragments are never sent back
    /// to a backend as prior turns.
    #[must_use]
    pub fn conversation_tail(&self, max_fragments: usize) -> Vec<&TurnFragment> {
        let mut out: Vec<&TurnFragment> = self
            .ring
            .iter()
            .rev()
            .filter(|f| f.kind == FragmentKind::Conversation)
            .take(max_fragments)
            .collect();
        out.reverse();
        out
    }

    /// All conversation-kind fragments currently held (oldest to newest).
    #[must_use]
    pub fn conversation_fragments(&self) -> Vec<&TurnFragment> {
        self.ring
            .iter()
            .filter(|f| f.kind == FragmentKind::Conversation)
            .collect()
    }

    /// Most recent assistant-authored conversation fragment, if any.
    #[must_use]
    pub fn last_reply(&self) -> Option<&TurnFragment> {
        self.ring
            .iter()
            .rev()
            .find(|f| f.kind == FragmentKind::Conversation && !f.is_user_turn())
    }

    /// Remove the most recent user-authored conversation fragment and
    /// everything after it. Returns the removed user text and the offset it
    /// occupied (the authoritative delete-from point), or `None` when the
    /// window holds no user turn.
    pub fn truncate_to_last_user(&mut self) -> Option<(String, u64)> {
        let index = self.ring.iter().rposition(TurnFragment::is_user_turn)?;
        let user_text = self.ring[index].content.clone();
        let delete_from = self.ring[index].offset;
        self.ring.truncate(index);
        self.current_offset = delete_from;
        Some((user_text, delete_from))
    }

    /// Keep only the newest `keep` fragments; older content is carried by the
    /// memory summary from here on.
    pub fn shrink_to_tail(&mut self, keep: usize) {
        while self.ring.len() > keep {
            let _ = self.ring.pop_front();
        }
    }

    /// Stats for diagnostics: (held fragments, conversation fragments, next offset).
    #[must_use]
    pub fn stats(&self) -> (usize, usize, u64) {
        let conversation = self
            .ring
            .iter()
            .filter(|f| f.kind == FragmentKind::Conversation)
            .count();
        (self.ring.len(), conversation, self.current_offset)
    }

    /// Number of fragments currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the window holds no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Next offset to be assigned in this session's log.
    #[must_use]
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Running memory summary (concatenation of stored summaries).
    #[must_use]
    pub fn memory_summary(&self) -> &str {
        &self.memory_summary
    }

    /// Replace the running memory summary after a compression pass.
    pub fn set_memory_summary(&mut self, summary: String) {
        self.memory_summary = summary;
    }

    /// Display name the user has stated for themselves, if known.
    #[must_use]
    pub fn user_display_name(&self) -> Option<&str> {
        self.user_display_name.as_deref()
    }

    /// Remember a newly stated user display name.
    pub fn set_user_display_name(&mut self, name: String) {
        self.user_display_name = Some(name);
    }

    /// Forward-looking plan text computed by the latest evaluation, if any.
    #[must_use]
    pub fn forward_plan(&self) -> Option<&str> {
        self.forward_plan.as_deref()
    }

    /// Carry the latest evaluation's situation text into the next turn.
    pub fn set_forward_plan(&mut self, plan: String) {
        self.forward_plan = Some(plan);
    }

    /// Session identifier for this window.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
