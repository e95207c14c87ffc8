//! Stable event ids attached to tracing records.
//!
//! Ids are namespaced `session.*` (session lifecycle and storage),
//! `engine.*` (turn pipeline and compression), and `backend.*` (generation
//! calls and failover). Dashboards key on these strings; treat them as an
//! append-only registry.

/// One observability event id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was created fresh (no prior log or summaries).
    SessionCreated,
    /// A session window was rebuilt from the log and summary store.
    SessionLoaded,
    /// A session's log, summaries, and window were removed.
    SessionCleared,
    /// Fragments were appended to the message log.
    LogAppended,
    /// The message log was truncated from an offset onward.
    LogTruncated,
    /// A summary row was appended.
    SummaryAppended,
    /// Summaries were loaded for a session.
    SummariesLoaded,
    /// A turn entered the pipeline.
    TurnStarted,
    /// A turn's triple was persisted with contiguous offsets.
    TurnPersisted,
    /// A turn was aborted before persistence.
    TurnFailed,
    /// A regenerate command truncated the log and re-entered the pipeline.
    CommandRegenerate,
    /// A rewind command truncated the log.
    CommandRewind,
    /// A slash-command was rejected as unknown.
    CommandRejected,
    /// The compression trigger fired.
    CompressionTriggered,
    /// The summary-store check failed; the window-size fallback rule was used.
    CompressionFallbackTrigger,
    /// Compression skipped (no conversation fragments in the window).
    CompressionSkipped,
    /// A compression pass wrote its summary and shrank the window.
    CompressionCompleted,
    /// A generation call was served, with the route that served it.
    BackendServed,
    /// The primary backend failed; the backup is being tried.
    FailoverEngaged,
    /// Primary and backup both failed.
    FailoverExhausted,
    /// A response stream failed after relay had begun.
    StreamAborted,
}

impl SessionEvent {
    /// Every registered event, for registry tests and docs.
    pub const ALL: &'static [Self] = &[
        Self::SessionCreated,
        Self::SessionLoaded,
        Self::SessionCleared,
        Self::LogAppended,
        Self::LogTruncated,
        Self::SummaryAppended,
        Self::SummariesLoaded,
        Self::TurnStarted,
        Self::TurnPersisted,
        Self::TurnFailed,
        Self::CommandRegenerate,
        Self::CommandRewind,
        Self::CommandRejected,
        Self::CompressionTriggered,
        Self::CompressionFallbackTrigger,
        Self::CompressionSkipped,
        Self::CompressionCompleted,
        Self::BackendServed,
        Self::FailoverEngaged,
        Self::FailoverExhausted,
        Self::StreamAborted,
    ];

    /// Stable string id for this event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCreated => "session.created",
            Self::SessionLoaded => "session.loaded",
            Self::SessionCleared => "session.cleared",
            Self::LogAppended => "session.log.appended",
            Self::LogTruncated => "session.log.truncated",
            Self::SummaryAppended => "session.summary.appended",
            Self::SummariesLoaded => "session.summary.loaded",
            Self::TurnStarted => "engine.turn.started",
            Self::TurnPersisted => "engine.turn.persisted",
            Self::TurnFailed => "engine.turn.failed",
            Self::CommandRegenerate => "engine.command.regenerate",
            Self::CommandRewind => "engine.command.rewind",
            Self::CommandRejected => "engine.command.rejected",
            Self::CompressionTriggered => "engine.compression.triggered",
            Self::CompressionFallbackTrigger => "engine.compression.fallback_trigger",
            Self::CompressionSkipped => "engine.compression.skipped",
            Self::CompressionCompleted => "engine.compression.completed",
            Self::BackendServed => "backend.call.served",
            Self::FailoverEngaged => "backend.failover.engaged",
            Self::FailoverExhausted => "backend.failover.exhausted",
            Self::StreamAborted => "backend.stream.aborted",
        }
    }
}
