//! Session window: per-session tail cache of the turn log plus scratch state.

mod fragment;
mod window;

pub use fragment::{FragmentKind, Role, TurnFragment};
pub use window::SessionWindow;
