//! Dramatis engine: turn orchestration and bounded memory for long-running
//! AI character sessions.
//!
//! - Resolves each turn's context window from a per-session, offset-addressed
//!   turn log, compressing old history into running summaries.
//! - Calls a generation backend with transparent primary→backup failover for
//!   text, structured, and streamed shapes.
//! - Persists each turn as an atomic user/evaluation/reply triple so undo
//!   and regenerate can truncate history precisely.

#![allow(missing_docs)]

mod backend;
mod config;
mod engine;
mod error;
mod observability;
mod session;
#[doc(hidden)]
pub mod test_support;

pub use dramatis_window::{FragmentKind, Role, SessionWindow, TurnFragment};

pub use backend::{
    BackendRoute, FailoverBackend, GenerationBackend, GenerationRequest, HttpBackend, PriorTurn,
    Routed, StreamReceiver,
};
pub use config::{BackendSettings, CharacterProfile, EngineConfig};
pub use engine::{
    Evaluation, SessionHandle, SessionStats, ThinkingStage, TurnEngine, TurnEvent,
};
pub use error::{BackendError, EngineError};
pub use session::{InMemoryMessageLog, InMemorySummaryStore, MessageLog, Summary, SummaryStore};
