//! Slash-command parsing for the turn pipeline.

use crate::error::EngineError;

/// A recognized inverse operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlashCommand {
    /// Remove the last exchange and re-run the pipeline with the same user text.
    Regenerate,
    /// Remove the last exchange and stop.
    Rewind,
}

/// Parse a leading slash-command. `Ok(None)` means an ordinary message;
/// an unrecognized command is a user-facing error listing the valid ones.
pub(crate) fn parse_command(message: &str) -> Result<Option<SlashCommand>, EngineError> {
    let trimmed = message.trim();
    if !trimmed.starts_with('/') {
        return Ok(None);
    }
    let token = trimmed.split_whitespace().next().unwrap_or(trimmed);
    match token {
        "/regenerate" => Ok(Some(SlashCommand::Regenerate)),
        "/rewind" => Ok(Some(SlashCommand::Rewind)),
        other => Err(EngineError::UnknownCommand {
            command: other.to_string(),
        }),
    }
}
