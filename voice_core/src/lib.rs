//! Speech output for relay sessions.
//!
//! [`SpeechQueue`] is a [`relay_core::SpeechSink`] that plays utterances
//! sequentially through a [`SpeechBackend`] and reports start, finish and
//! cancel events.

pub mod backend;
pub mod queue;

pub use backend::{CommandBackend, PacedBackend, SpeechBackend};
pub use queue::{SpeechEvent, SpeechQueue};
