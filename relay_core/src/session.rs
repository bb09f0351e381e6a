//! Per-request relay state.
//!
//! A [`RelaySession`] lives for exactly one streaming connection. It is fed
//! transport events one at a time, accumulates the transcript, applies the
//! speech-dispatch policy, and decides when the connection must be closed.
//! Termination is compare-and-set: the first terminal event wins and every
//! later event is ignored.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::delta::CompletionDelta;
use crate::error::RelayError;
use crate::policy::SpeechDispatchPolicy;
use crate::sink::{RelayObserver, SpeechSink};
use crate::sse::SseEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Streaming,
    Terminated,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The done sentinel arrived.
    Done,
    /// A chunk carried the stop finish reason.
    Stop,
    /// The body ended without either of the above.
    EndOfStream,
    Cancelled,
    Failed,
}

/// What the transport delivers to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
}

impl TransportEvent {
    /// Map a decoded SSE event; non-message event types yield `None`.
    pub fn from_sse(event: SseEvent) -> Option<Self> {
        event.is_message().then_some(TransportEvent::Message(event.data))
    }
}

/// What the transport must do after an event has been handled.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The session just terminated; release the connection.
    Close,
    /// The session had already terminated; nothing happened.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelaySummary {
    pub session_id: Uuid,
    pub transcript: String,
    pub audio_started: bool,
    pub utterances: usize,
    pub termination: Option<Termination>,
}

pub struct RelaySession {
    id: Uuid,
    state: RelayState,
    accumulated_text: String,
    policy: SpeechDispatchPolicy,
    terminated: bool,
    termination: Option<Termination>,
    error: Option<RelayError>,
    utterances: usize,
    done_sentinel: String,
    stop_reason: String,
    sink: Arc<dyn SpeechSink>,
    observer: Arc<dyn RelayObserver>,
}

impl RelaySession {
    pub fn new(
        config: &RelayConfig,
        sink: Arc<dyn SpeechSink>,
        observer: Arc<dyn RelayObserver>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RelayState::Idle,
            accumulated_text: String::new(),
            policy: SpeechDispatchPolicy::new(config.word_threshold),
            terminated: false,
            termination: None,
            error: None,
            utterances: 0,
            done_sentinel: config.done_sentinel.clone(),
            stop_reason: config.stop_reason.clone(),
            sink,
            observer,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn transcript(&self) -> &str {
        &self.accumulated_text
    }

    pub fn audio_started(&self) -> bool {
        self.policy.started()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn error(&self) -> Option<&RelayError> {
        self.error.as_ref()
    }

    pub fn utterances(&self) -> usize {
        self.utterances
    }

    /// Mark the request as in flight.
    pub fn connecting(&mut self) {
        if self.state == RelayState::Idle {
            self.state = RelayState::Connecting;
        }
    }

    pub fn handle(&mut self, event: TransportEvent) -> Flow {
        if self.terminated {
            debug!(session = %self.id, "Ignoring {:?} after termination", event);
            return Flow::Ignored;
        }
        match event {
            TransportEvent::Open => {
                info!(session = %self.id, "SSE connection opened");
                self.state = RelayState::Streaming;
                self.observer.on_open();
                Flow::Continue
            }
            TransportEvent::Message(data) => {
                self.state = RelayState::Streaming;
                self.on_message(&data)
            }
            TransportEvent::Error(message) => self.fail(RelayError::Transport(message)),
        }
    }

    fn on_message(&mut self, data: &str) -> Flow {
        if data.trim() == self.done_sentinel {
            return self.terminate(Termination::Done);
        }
        let delta = match CompletionDelta::parse(data) {
            Ok(delta) => delta,
            Err(e) => return self.fail(e),
        };
        if delta.finish_reason() == Some(self.stop_reason.as_str()) {
            return self.terminate(Termination::Stop);
        }
        if let Some(content) = delta.content().filter(|c| !c.is_empty()) {
            self.append(content);
        }
        Flow::Continue
    }

    fn append(&mut self, fragment: &str) {
        self.accumulated_text.push_str(fragment);
        self.observer.on_transcript_update(&self.accumulated_text);

        let Some(utterance) = self.policy.on_fragment(&self.accumulated_text, fragment) else {
            return;
        };
        self.utterances += 1;
        if let Err(e) = self.sink.speak(utterance) {
            warn!(session = %self.id, "Speech dispatch failed: {e}");
            self.observer.on_error(&RelayError::Sink(e));
        }
    }

    /// End the session normally. Only the first terminal call has any effect.
    pub fn terminate(&mut self, reason: Termination) -> Flow {
        if self.terminated {
            return Flow::Ignored;
        }
        self.terminated = true;
        self.state = RelayState::Terminated;
        self.termination = Some(reason);
        info!(
            session = %self.id,
            "Relay session finished: {:?}, {} chars, {} utterance(s)",
            reason,
            self.accumulated_text.len(),
            self.utterances
        );
        self.observer.on_complete(reason);
        Flow::Close
    }

    pub fn cancel(&mut self) -> Flow {
        self.terminate(Termination::Cancelled)
    }

    /// End the session with an error. Non-fatal errors are reported and the
    /// session carries on.
    pub fn fail(&mut self, error: RelayError) -> Flow {
        if self.terminated {
            debug!(session = %self.id, "Dropping error after termination: {error}");
            return Flow::Ignored;
        }
        if !error.is_fatal() {
            warn!(session = %self.id, "{error}");
            self.observer.on_error(&error);
            return Flow::Continue;
        }
        self.terminated = true;
        self.state = RelayState::Terminated;
        self.termination = Some(Termination::Failed);
        warn!(session = %self.id, "Relay session failed: {error}");
        self.observer.on_error(&error);
        self.error = Some(error);
        Flow::Close
    }

    pub fn summary(&self) -> RelaySummary {
        RelaySummary {
            session_id: self.id,
            transcript: self.accumulated_text.clone(),
            audio_started: self.audio_started(),
            utterances: self.utterances,
            termination: self.termination,
        }
    }
}
