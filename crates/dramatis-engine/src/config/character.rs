//! Character profile consumed by the turn pipeline.
//!
//! Authoring and CRUD of characters live outside the engine; the profile
//! arrives here fully formed at session load.

use serde::{Deserialize, Serialize};

/// Who the user is talking to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    /// Stable character id.
    pub id: String,
    /// Display name used in prompts.
    pub name: String,
    /// Persona text injected into every system prompt.
    pub persona: String,
    /// Optional scenario text; seeds the session's first summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

impl CharacterProfile {
    /// Build a profile from its parts.
    #[must_use]
    pub fn new(id: &str, name: &str, persona: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            persona: persona.to_string(),
            scenario: None,
        }
    }

    /// Attach scenario text to this profile.
    #[must_use]
    pub fn with_scenario(mut self, scenario: &str) -> Self {
        self.scenario = Some(scenario.to_string());
        self
    }
}
