//! Where a relay session sends its output.
//!
//! Speech goes to a [`SpeechSink`], everything the caller wants to display or
//! react to goes to a [`RelayObserver`]. [`UpdateSender`] implements both and
//! funnels them into one ordered channel of [`RelayUpdate`]s.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{RelayError, SinkError};
use crate::session::Termination;

/// Accepts utterances. Calls must return quickly; playback happens elsewhere
/// and consecutive calls are queued by the sink.
pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), SinkError>;
}

/// Caller-facing callbacks of a relay session.
pub trait RelayObserver: Send + Sync {
    fn on_open(&self) {}

    /// Called with the full transcript after every appended fragment.
    fn on_transcript_update(&self, full_text: &str);

    /// Called once when the session ends without an error.
    fn on_complete(&self, reason: Termination);

    fn on_error(&self, error: &RelayError);
}

/// Serializable form of everything a session emits, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayUpdate {
    Opened,
    Transcript { text: String },
    Utterance { text: String },
    Complete { reason: Termination },
    Error { kind: String, message: String },
}

#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<RelayUpdate>,
}

pub fn update_channel() -> (UpdateSender, mpsc::UnboundedReceiver<RelayUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSender { tx }, rx)
}

impl UpdateSender {
    fn send(&self, update: RelayUpdate) {
        if self.tx.send(update).is_err() {
            tracing::debug!("Relay update receiver dropped");
        }
    }
}

impl SpeechSink for UpdateSender {
    fn speak(&self, text: &str) -> Result<(), SinkError> {
        self.tx
            .send(RelayUpdate::Utterance { text: text.to_string() })
            .map_err(|_| SinkError::Closed)
    }
}

impl RelayObserver for UpdateSender {
    fn on_open(&self) {
        self.send(RelayUpdate::Opened);
    }

    fn on_transcript_update(&self, full_text: &str) {
        self.send(RelayUpdate::Transcript { text: full_text.to_string() });
    }

    fn on_complete(&self, reason: Termination) {
        self.send(RelayUpdate::Complete { reason });
    }

    fn on_error(&self, error: &RelayError) {
        self.send(RelayUpdate::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }
}

/// Hands every utterance to several sinks. Every sink is tried; the first
/// failure is returned.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SpeechSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn SpeechSink>>) -> Self {
        Self { sinks }
    }
}

impl SpeechSink for FanoutSink {
    fn speak(&self, text: &str) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.speak(text) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
