//! Turn pipeline — channel-agnostic processing of one inbound utterance.
//!
//! Channel adapters call [`turn::run_turn`] and only add their own
//! transport-specific receive/send handling on top.

pub mod context;
pub mod turn;

pub use context::{ReplySink, TurnContext};
pub use turn::{run_turn, TurnOutcome};
