//! The turn controller: one user message in, one assistant message out.
//!
//! A turn is the unit of work between accepting a user message and emitting
//! the final assistant reply, including any tool round-trips in between.
//! Every state transition is checkpointed so a thread survives restarts
//! mid-conversation.

pub mod runner;
pub mod stream_event;

pub use runner::{TurnRunner, TurnState};
pub use stream_event::TurnEvent;
