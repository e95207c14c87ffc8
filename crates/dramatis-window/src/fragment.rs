//! Single fragment in the per-session turn log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Written by the human participant.
    User,
    /// Written by the character (or on its behalf).
    Assistant,
}

impl Role {
    /// Stable string id for storage and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// What a fragment carries: ordinary dialogue or an internal evaluation note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Conversation text shown to the user.
    Conversation,
    /// Serialized situation evaluation, never shown to the user.
    Evaluation,
}

impl FragmentKind {
    /// Stable string id for storage and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Evaluation => "evaluation",
        }
    }
}

/// One row in the turn log. Offsets are per-session, zero-based, gapless by
/// append order; gaps appear only transiently through truncation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[must_use]
pub struct TurnFragment {
    /// Session the fragment belongs to.
    pub session_id: String,
    /// Character the session is held with.
    pub character_id: String,
    /// Author role.
    pub role: Role,
    /// Fragment text (dialogue, or a serialized evaluation).
    pub content: String,
    /// Fragment kind.
    pub kind: FragmentKind,
    /// Position in the session's log.
    pub offset: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TurnFragment {
    /// Build a fragment stamped with the current time.
    pub fn new(
        session_id: &str,
        character_id: &str,
        role: Role,
        kind: FragmentKind,
        content: &str,
        offset: u64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            character_id: character_id.to_string(),
            role,
            content: content.to_string(),
            kind,
            offset,
            created_at: Utc::now(),
        }
    }

    /// Whether this is user-authored dialogue (the anchor for undo operations).
    #[must_use]
    pub fn is_user_turn(&self) -> bool {
        self.role == Role::User && self.kind == FragmentKind::Conversation
    }
}
