//! Turn orchestrator: context resolution, compression, generation, persistence.

mod commands;
mod compression;
mod evaluation;
mod prompts;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use dramatis_window::{FragmentKind, Role, SessionWindow, TurnFragment};

use crate::backend::{FailoverBackend, GenerationBackend, HttpBackend};
use crate::config::{CharacterProfile, EngineConfig};
use crate::error::EngineError;
use crate::observability::SessionEvent;
use crate::session::{
    InMemoryMessageLog, InMemorySummaryStore, MessageLog, Summary, SummaryStore,
};

use commands::SlashCommand;

pub use evaluation::Evaluation;

/// Lifecycle notice emitted while a turn is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThinkingStage {
    /// History is being compressed into a summary.
    Summarizing,
    /// The situation evaluation call is running.
    Evaluating,
    /// The reply stream is being produced.
    Responding,
}

impl ThinkingStage {
    /// Stable label shown to the calling layer.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summarizing => "thinking:summarizing",
            Self::Evaluating => "thinking:evaluating",
            Self::Responding => "thinking:responding",
        }
    }
}

/// Events delivered on the turn channel: reply chunks in arrival order,
/// lifecycle notices, and inline errors.
#[derive(Clone, Debug)]
pub enum TurnEvent {
    /// One generated reply fragment.
    Chunk(String),
    /// A lifecycle notice.
    Thinking(ThinkingStage),
    /// A rewind finished; no new text follows.
    CommandCompleted,
    /// The turn failed; rendered inline by the UI.
    Error(String),
}

impl TurnEvent {
    /// Stable label for lifecycle notices; reply chunks have none.
    #[must_use]
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Chunk(_) => None,
            Self::Thinking(stage) => Some(stage.as_str()),
            Self::CommandCompleted => Some("command:completed"),
            Self::Error(_) => Some("error"),
        }
    }
}

/// Handle returned by session load.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    /// Session id (given or freshly generated).
    pub session_id: String,
    /// Character the session is held with.
    pub character_id: String,
}

/// Diagnostics snapshot of a loaded session's window.
#[derive(Clone, Copy, Debug)]
pub struct SessionStats {
    /// Fragments currently held in the window.
    pub fragments_held: usize,
    /// Conversation-kind fragments among them.
    pub conversation_held: usize,
    /// Next offset to be assigned in the log.
    pub next_offset: u64,
}

struct SessionSlot {
    character: CharacterProfile,
    window: Mutex<SessionWindow>,
}

/// The turn engine. One instance serves many sessions; each session's
/// window is owned exclusively behind its own lock, and the caller
/// serializes turns per session (one request in flight at a time).
pub struct TurnEngine {
    config: EngineConfig,
    log: Arc<dyn MessageLog>,
    summaries: Arc<dyn SummaryStore>,
    backend: FailoverBackend,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl TurnEngine {
    /// Build an engine from explicitly supplied collaborators.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        log: Arc<dyn MessageLog>,
        summaries: Arc<dyn SummaryStore>,
        primary: Arc<dyn GenerationBackend>,
        backup: Arc<dyn GenerationBackend>,
    ) -> Self {
        let deadline = Duration::from_secs(config.generation_deadline_secs);
        Self {
            backend: FailoverBackend::new(primary, backup, deadline),
            log,
            summaries,
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Process-boundary factory: HTTP backends from config, in-memory stores.
    #[must_use]
    pub fn from_config(config: EngineConfig) -> Self {
        let primary = Arc::new(HttpBackend::from_settings(&config.primary));
        let backup = Arc::new(HttpBackend::from_settings(&config.backup));
        Self::new(
            config,
            Arc::new(InMemoryMessageLog::new()),
            Arc::new(InMemorySummaryStore::new()),
            primary,
            backup,
        )
    }

    /// Load a session's window from storage, or create a fresh session.
    /// A fresh session with scenario text gets a seed summary covering `[0, 0]`.
    pub async fn load_or_create_session(
        &self,
        session_id: Option<String>,
        character: CharacterProfile,
    ) -> Result<SessionHandle, EngineError> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let tail = self
            .log
            .read_recent(&session_id, self.config.window_overfetch_fragments, None)
            .await
            .map_err(EngineError::from_storage)?;
        let stored_summaries = self
            .summaries
            .list_by_session(&session_id)
            .await
            .map_err(EngineError::from_storage)?;
        let fresh = tail.is_empty() && stored_summaries.is_empty();

        let mut window = SessionWindow::new(&session_id, self.config.window_overfetch_fragments);
        window.rebuild(tail, join_summaries(&stored_summaries));
        if fresh && let Some(scenario) = character.scenario.clone() {
            let seed = Summary::new(&session_id, &character.id, &scenario, 0, 0);
            self.summaries
                .append_summary(seed)
                .await
                .map_err(EngineError::from_storage)?;
            window.set_memory_summary(scenario);
        }

        let (fragments_held, _, next_offset) = window.stats();
        tracing::info!(
            event = if fresh {
                SessionEvent::SessionCreated.as_str()
            } else {
                SessionEvent::SessionLoaded.as_str()
            },
            session_id,
            character_id = %character.id,
            fragments_held,
            next_offset,
            summaries = stored_summaries.len(),
            "session ready"
        );

        let handle = SessionHandle {
            session_id: session_id.clone(),
            character_id: character.id.clone(),
        };
        let slot = Arc::new(SessionSlot {
            character,
            window: Mutex::new(window),
        });
        self.sessions.write().await.insert(session_id, slot);
        Ok(handle)
    }

    /// Run one user turn. Reply chunks and lifecycle notices flow through
    /// `events`; the full reply text is returned once the stream has
    /// drained and the triple is persisted. A failure before persistence
    /// leaves the log exactly as it was.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_message: &str,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, EngineError> {
        let slot = self.slot(session_id).await?;
        let mut window = slot.window.lock().await;
        tracing::debug!(
            event = SessionEvent::TurnStarted.as_str(),
            session_id,
            message_chars = user_message.chars().count(),
            "turn started"
        );
        let result = match commands::parse_command(user_message) {
            Ok(None) => self.run_pipeline(&slot, &mut window, user_message, events).await,
            Ok(Some(SlashCommand::Regenerate)) => self.regenerate(&slot, &mut window, events).await,
            Ok(Some(SlashCommand::Rewind)) => self.rewind(&mut window, events).await,
            Err(error) => {
                tracing::debug!(
                    event = SessionEvent::CommandRejected.as_str(),
                    session_id,
                    error = %error,
                    "slash command rejected"
                );
                Err(error)
            }
        };
        if let Err(ref error) = result {
            let _ = events.send(TurnEvent::Error(error.to_string())).await;
            tracing::warn!(
                event = SessionEvent::TurnFailed.as_str(),
                session_id,
                error = %error,
                "turn aborted with no partial persistence"
            );
        }
        result
    }

    /// Remove a session's log, summaries, and window. Returns whether
    /// anything existed to clear.
    pub async fn clear_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let existed = self.sessions.write().await.remove(session_id).is_some();
        let removed_fragments = self
            .log
            .delete_session(session_id)
            .await
            .map_err(EngineError::from_storage)?;
        let removed_summaries = self
            .summaries
            .delete_session_summaries(session_id)
            .await
            .map_err(EngineError::from_storage)?;
        tracing::info!(
            event = SessionEvent::SessionCleared.as_str(),
            session_id,
            removed_fragments,
            removed_summaries,
            "session cleared"
        );
        Ok(existed || removed_fragments > 0 || removed_summaries > 0)
    }

    /// Window diagnostics for a loaded session.
    pub async fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        let slot = self.sessions.read().await.get(session_id).cloned()?;
        let window = slot.window.lock().await;
        let (fragments_held, conversation_held, next_offset) = window.stats();
        Some(SessionStats {
            fragments_held,
            conversation_held,
            next_offset,
        })
    }

    async fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, EngineError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotLoaded {
                session_id: session_id.to_string(),
            })
    }

    /// The normal pipeline: compression check, evaluation, streamed reply,
    /// then the all-or-nothing triple append.
    async fn run_pipeline(
        &self,
        slot: &SessionSlot,
        window: &mut SessionWindow,
        user_message: &str,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, EngineError> {
        let session_id = window.session_id().to_string();

        if self.should_compress(window).await {
            let _ = events
                .send(TurnEvent::Thinking(ThinkingStage::Summarizing))
                .await;
            self.compress(slot, window).await?;
        }

        let prior = prompts::prior_turns(window, self.config.prior_turns_window);

        let _ = events
            .send(TurnEvent::Thinking(ThinkingStage::Evaluating))
            .await;
        let request =
            prompts::evaluation_request(&slot.character, window, user_message, prior.clone());
        let evaluated = self
            .backend
            .generate_structured::<Evaluation>(request)
            .await?;
        let evaluation = evaluated.value;
        if let Some(name) = evaluation
            .user_name
            .clone()
            .filter(|name| !name.trim().is_empty())
        {
            window.set_user_display_name(name);
        }

        let _ = events
            .send(TurnEvent::Thinking(ThinkingStage::Responding))
            .await;
        let request = prompts::reply_request(
            &slot.character,
            window,
            &evaluation.situation,
            user_message,
            prior,
        );
        let streamed = self.backend.generate_stream(request).await?;
        let reply_route = streamed.route;
        let mut rx = streamed.value;
        let mut reply = String::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) => {
                    reply.push_str(&chunk);
                    let _ = events.send(TurnEvent::Chunk(chunk)).await;
                }
                Err(error) => {
                    tracing::warn!(
                        event = SessionEvent::StreamAborted.as_str(),
                        session_id,
                        relayed_chars = reply.chars().count(),
                        error = %error,
                        "reply stream aborted; nothing persisted"
                    );
                    return Err(EngineError::StreamAborted(error));
                }
            }
        }

        let base = window.current_offset();
        let character_id = slot.character.id.as_str();
        let fragments = vec![
            TurnFragment::new(
                &session_id,
                character_id,
                Role::User,
                FragmentKind::Conversation,
                user_message,
                base,
            ),
            TurnFragment::new(
                &session_id,
                character_id,
                Role::Assistant,
                FragmentKind::Evaluation,
                &evaluation.to_fragment_text(),
                base + 1,
            ),
            TurnFragment::new(
                &session_id,
                character_id,
                Role::Assistant,
                FragmentKind::Conversation,
                &reply,
                base + 2,
            ),
        ];
        let last_offset = self
            .log
            .append(&session_id, character_id, fragments.clone())
            .await
            .map_err(EngineError::from_storage)?;
        window.extend(fragments);
        if !evaluation.situation.is_empty() {
            window.set_forward_plan(evaluation.situation.clone());
        }
        tracing::debug!(
            event = SessionEvent::TurnPersisted.as_str(),
            session_id,
            first_offset = base,
            last_offset,
            evaluation_route = evaluated.route.as_str(),
            reply_route = reply_route.as_str(),
            "turn persisted"
        );
        Ok(reply)
    }

    /// Whether enough fragments have accumulated past the last summary.
    /// Falls back to the window-size rule when the summary store is
    /// unreachable.
    async fn should_compress(&self, window: &SessionWindow) -> bool {
        let threshold = self.config.compression_threshold_fragments;
        match self.summaries.max_end_offset(window.session_id()).await {
            Ok(max_end) => {
                let pending = compression::pending_fragments(window.current_offset(), max_end);
                if pending >= threshold {
                    tracing::debug!(
                        event = SessionEvent::CompressionTriggered.as_str(),
                        session_id = window.session_id(),
                        pending,
                        threshold,
                        "compression triggered"
                    );
                    return true;
                }
                false
            }
            Err(error) => {
                let window_len = window.len() as u64;
                tracing::warn!(
                    event = SessionEvent::CompressionFallbackTrigger.as_str(),
                    session_id = window.session_id(),
                    window_len,
                    threshold,
                    error = %error,
                    "summary store unavailable; using window-size trigger"
                );
                window_len > threshold
            }
        }
    }

    /// Digest the window into a summary, then shrink the window. The
    /// summary append happens-before the shrink: a crash between the two
    /// only wastes a recomputation.
    async fn compress(
        &self,
        slot: &SessionSlot,
        window: &mut SessionWindow,
    ) -> Result<(), EngineError> {
        let session_id = window.session_id().to_string();
        let transcript = {
            let fragments = window.conversation_fragments();
            if fragments.is_empty() {
                tracing::debug!(
                    event = SessionEvent::CompressionSkipped.as_str(),
                    session_id,
                    "no conversation fragments to compress"
                );
                return Ok(());
            }
            compression::transcript_block(&fragments)
        };
        let (start_offset, end_offset) =
            compression::compression_range(window.current_offset(), window.len());
        let request =
            prompts::compression_request(&slot.character, window.memory_summary(), &transcript);
        let digested = self.backend.generate_text(request).await?;
        let summary = Summary::new(
            &session_id,
            &slot.character.id,
            digested.value.trim(),
            start_offset,
            end_offset,
        );
        self.summaries
            .append_summary(summary)
            .await
            .map_err(EngineError::from_storage)?;
        let all = self
            .summaries
            .list_by_session(&session_id)
            .await
            .map_err(EngineError::from_storage)?;
        window.set_memory_summary(join_summaries(&all));
        window.shrink_to_tail(self.config.window_keep_after_compression);
        tracing::debug!(
            event = SessionEvent::CompressionCompleted.as_str(),
            session_id,
            start_offset,
            end_offset,
            route = digested.route.as_str(),
            kept_fragments = window.len(),
            "history compressed"
        );
        Ok(())
    }

    /// Remove the last exchange and re-run the pipeline with the same user
    /// text. The log delete is authoritative; the window is only a cache.
    async fn regenerate(
        &self,
        slot: &SessionSlot,
        window: &mut SessionWindow,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, EngineError> {
        let (user_text, delete_from) = window
            .truncate_to_last_user()
            .ok_or(EngineError::NoHistory)?;
        let session_id = window.session_id().to_string();
        let removed = self
            .log
            .delete_from_offset(&session_id, delete_from)
            .await
            .map_err(EngineError::from_storage)?;
        tracing::debug!(
            event = SessionEvent::CommandRegenerate.as_str(),
            session_id,
            delete_from,
            removed,
            "last exchange removed; regenerating"
        );
        self.run_pipeline(slot, window, &user_text, events).await
    }

    /// Remove the last exchange and stop. Completion is signalled on the
    /// event channel; the returned text is empty.
    async fn rewind(
        &self,
        window: &mut SessionWindow,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<String, EngineError> {
        let (_, delete_from) = window
            .truncate_to_last_user()
            .ok_or(EngineError::NoHistory)?;
        let session_id = window.session_id().to_string();
        let removed = self
            .log
            .delete_from_offset(&session_id, delete_from)
            .await
            .map_err(EngineError::from_storage)?;
        tracing::debug!(
            event = SessionEvent::CommandRewind.as_str(),
            session_id,
            delete_from,
            removed,
            "last exchange removed"
        );
        let _ = events.send(TurnEvent::CommandCompleted).await;
        Ok(String::new())
    }
}

/// Concatenate stored summaries into the running memory summary, ordered by
/// start offset.
fn join_summaries(summaries: &[Summary]) -> String {
    summaries
        .iter()
        .map(|s| s.summary_text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
