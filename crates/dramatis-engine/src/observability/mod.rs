//! Structured observability event registry.

pub(crate) mod session_events;

pub(crate) use session_events::SessionEvent;
