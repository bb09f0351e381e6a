use thiserror::Error;

/// Failures a relay session can report to its observer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Speech sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Relay task failed: {0}")]
    Task(String),
}

impl RelayError {
    /// Short machine-readable name, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Transport(_) => "transport",
            RelayError::Decode(_) => "decode",
            RelayError::Sink(_) => "sink",
            RelayError::Task(_) => "task",
        }
    }

    /// Whether this error ends the session. Sink failures are reported and the
    /// stream keeps going.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::Sink(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}

/// Failures raised by a speech sink when handed an utterance.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("speech sink is closed")]
    Closed,

    #[error("utterance rejected: {0}")]
    Rejected(String),
}
