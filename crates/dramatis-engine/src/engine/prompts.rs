//! Prompt assembly for the evaluation, reply, and digest calls.

use dramatis_window::SessionWindow;

use crate::backend::{GenerationRequest, PriorTurn};
use crate::config::CharacterProfile;

/// Recent conversation-kind fragments as prior-turn context, oldest first.
pub(crate) fn prior_turns(window: &SessionWindow, limit: usize) -> Vec<PriorTurn> {
    window
        .conversation_tail(limit)
        .into_iter()
        .map(|f| PriorTurn::new(f.role.as_str(), &f.content))
        .collect()
}

/// Request for the structured situation evaluation of the new user message.
pub(crate) fn evaluation_request(
    character: &CharacterProfile,
    window: &SessionWindow,
    user_message: &str,
    prior: Vec<PriorTurn>,
) -> GenerationRequest {
    let mut system = format!(
        "You evaluate an ongoing conversation between a user and the character {name}.\n\
         Character persona: {persona}\n",
        name = character.name,
        persona = character.persona,
    );
    if !window.memory_summary().is_empty() {
        system.push_str(&format!(
            "Story so far: {}\n",
            window.memory_summary()
        ));
    }
    if let Some(plan) = window.forward_plan() {
        system.push_str(&format!("Current situation: {plan}\n"));
    }
    system.push_str(
        "Respond with a single JSON object and nothing else, with keys:\n\
         \"avoid_patterns\" (array of phrasings the character has been overusing),\n\
         \"situation\" (one-paragraph prose update of the in-story situation),\n\
         \"elapsed_time\" (in-story time passed this exchange, or null),\n\
         \"user_name\" (a name the user newly stated for themselves, or null).",
    );
    let user_prompt = format!("Latest user message: {user_message}");
    GenerationRequest::new(system, user_prompt).with_prior_turns(prior)
}

/// Request for the character's streamed reply.
pub(crate) fn reply_request(
    character: &CharacterProfile,
    window: &SessionWindow,
    situation: &str,
    user_message: &str,
    prior: Vec<PriorTurn>,
) -> GenerationRequest {
    let mut system = format!(
        "You are {name}. Stay in character.\n\
         Persona: {persona}\n",
        name = character.name,
        persona = character.persona,
    );
    if !window.memory_summary().is_empty() {
        system.push_str(&format!(
            "Story so far: {}\n",
            window.memory_summary()
        ));
    }
    if !situation.is_empty() {
        system.push_str(&format!("Current situation: {situation}\n"));
    }
    if let Some(name) = window.user_display_name() {
        system.push_str(&format!("The user goes by: {name}\n"));
    }
    if let Some(reply) = window.last_reply() {
        system.push_str(&format!(
            "Your previous reply, for continuity (do not repeat it): {}\n",
            reply.content
        ));
    }
    system.push_str("Reply as the character, in prose, without narration labels.");
    GenerationRequest::new(system, user_message.to_string()).with_prior_turns(prior)
}

/// Request for the history digest written during compression.
pub(crate) fn compression_request(
    character: &CharacterProfile,
    running_summary: &str,
    transcript: &str,
) -> GenerationRequest {
    let mut system = format!(
        "You maintain the long-term memory of a conversation with the character {name}.\n",
        name = character.name,
    );
    if !running_summary.is_empty() {
        system.push_str(&format!("Memory so far: {running_summary}\n"));
    }
    system.push_str(
        "Digest the transcript below into a terse record of state changes only: \
         facts established, decisions made, names learned, items gained or lost, \
         relationship shifts. No narration, no quotes, no commentary.",
    );
    let user_prompt = format!("Transcript:\n{transcript}");
    GenerationRequest::new(system, user_prompt)
}
