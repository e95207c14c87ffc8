//! Structured situation evaluation of the latest exchange.

use serde::{Deserialize, Serialize};

/// Result of assessing the latest exchange. Not stored as its own entity;
/// it is serialized into an evaluation-kind fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    /// Phrasings or beats the character has been repeating and should avoid.
    #[serde(default)]
    pub avoid_patterns: Vec<String>,
    /// Prose update of the in-story situation; carried into the next turn
    /// as the forward-looking plan.
    #[serde(default)]
    pub situation: String,
    /// In-story time elapsed across the exchange, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<String>,
    /// Display name the user newly stated for themselves, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl Evaluation {
    /// Serialize for storage in an evaluation-kind fragment.
    #[must_use]
    pub fn to_fragment_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse back from fragment text. Lenient: a fragment that does not
    /// parse is treated as absent.
    #[must_use]
    pub fn from_fragment_text(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
