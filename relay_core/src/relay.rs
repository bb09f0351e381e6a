//! The streaming speech relay: one HTTP streaming request per session, driven
//! on its own tokio task.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::request::ChatRequest;
use crate::session::{Flow, RelaySession, RelaySummary, Termination, TransportEvent};
use crate::sink::{RelayObserver, SpeechSink};
use crate::sse::SseDecoder;

/// Maximum number of bytes of an error body kept in the error message
const ERROR_BODY_LIMIT: usize = 512;

pub struct StreamingSpeechRelay {
    config: Arc<RelayConfig>,
    client: reqwest::Client,
}

impl StreamingSpeechRelay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config: Arc::new(config), client })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start a session for `prompt`. Must be called from within a tokio runtime.
    ///
    /// The returned handle can cancel or await the session; dropping it leaves
    /// the session running.
    pub fn begin(
        &self,
        prompt: &str,
        sink: Arc<dyn SpeechSink>,
        observer: Arc<dyn RelayObserver>,
    ) -> RelayHandle {
        let session = RelaySession::new(&self.config, sink, observer);
        let session_id = session.id();
        let cancel = CancellationToken::new();

        info!(session = %session_id, "Starting relay session: prompt length={}", prompt.len());

        let task = tokio::spawn(run_session(
            self.client.clone(),
            self.config.clone(),
            prompt.to_string(),
            session,
            cancel.clone(),
        ));

        RelayHandle { session_id, cancel, task }
    }
}

pub struct RelayHandle {
    session_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<Result<RelaySummary, RelayError>>,
}

impl RelayHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Stop the session. Safe to call any number of times, including after
    /// the stream has already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this session when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> Result<RelaySummary, RelayError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!(session = %self.session_id, "Relay task join error: {e}");
                Err(RelayError::Task(e.to_string()))
            }
        }
    }
}

async fn run_session(
    client: reqwest::Client,
    config: Arc<RelayConfig>,
    prompt: String,
    mut session: RelaySession,
    cancel: CancellationToken,
) -> Result<RelaySummary, RelayError> {
    session.connecting();

    let request = client
        .post(&config.endpoint)
        .bearer_auth(&config.credential)
        .json(&ChatRequest::streaming(&config, &prompt))
        .send();

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(session = %session.id(), "Cancelled while connecting");
            let _ = session.cancel();
            return finish(session);
        }
        response = request => response,
    };

    match response {
        Ok(response) if response.status().is_success() => {
            let _ = session.handle(TransportEvent::Open);
            drive(&mut session, response.bytes_stream(), &cancel).await;
        }
        Ok(response) => {
            let status = response.status();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(session = %session.id(), "Cancelled while reading error body");
                    let _ = session.cancel();
                }
                body = response.text() => {
                    let mut body = body.unwrap_or_default();
                    body.truncate(floor_char_boundary(&body, ERROR_BODY_LIMIT));
                    let _ = session.fail(RelayError::Transport(format!("upstream returned {status}: {body}")));
                }
            }
        }
        Err(e) => {
            let _ = session.fail(RelayError::from(e));
        }
    }

    finish(session)
}

fn finish(session: RelaySession) -> Result<RelaySummary, RelayError> {
    match session.error() {
        Some(e) => Err(e.clone()),
        None => Ok(session.summary()),
    }
}

/// The open response body. Closing drops the body, which releases the
/// underlying connection; it happens at most once.
struct Connection<S> {
    body: Option<S>,
}

impl<S> Connection<S>
where
    S: Stream + Unpin,
{
    fn new(body: S) -> Self {
        Self { body: Some(body) }
    }

    async fn next(&mut self) -> Option<S::Item> {
        match self.body.as_mut() {
            Some(body) => body.next().await,
            None => None,
        }
    }

    fn close(&mut self) -> bool {
        self.body.take().is_some()
    }

    fn is_closed(&self) -> bool {
        self.body.is_none()
    }
}

enum Next<T> {
    Cancelled,
    Chunk(Option<T>),
}

/// Feed a response body into the session until the session terminates, the
/// body ends, or `cancel` fires. Returns the number of times the connection
/// was closed, which is always one.
pub(crate) async fn drive<S, B, E>(
    session: &mut RelaySession,
    body: S,
    cancel: &CancellationToken,
) -> usize
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut connection = Connection::new(Box::pin(body));
    let mut decoder = SseDecoder::new();
    let mut closes = 0;

    while !connection.is_closed() {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => Next::Cancelled,
            chunk = connection.next() => Next::Chunk(chunk),
        };

        let flow = match next {
            Next::Cancelled => session.cancel(),
            Next::Chunk(Some(Ok(bytes))) => {
                let mut flow = Flow::Continue;
                for event in decoder.push(bytes.as_ref()) {
                    let Some(event) = TransportEvent::from_sse(event) else {
                        debug!(session = %session.id(), "Skipping non-message SSE event");
                        continue;
                    };
                    flow = session.handle(event);
                    if flow != Flow::Continue {
                        break;
                    }
                }
                flow
            }
            Next::Chunk(Some(Err(e))) => {
                warn!(session = %session.id(), "Stream read error: {e}");
                session.handle(TransportEvent::Error(e.to_string()))
            }
            Next::Chunk(None) => {
                let mut flow = Flow::Continue;
                if let Some(event) = decoder.finish().and_then(TransportEvent::from_sse) {
                    flow = session.handle(event);
                }
                if flow == Flow::Continue {
                    flow = session.terminate(Termination::EndOfStream);
                }
                flow
            }
        };

        if flow != Flow::Continue && connection.close() {
            closes += 1;
            debug!(session = %session.id(), "SSE connection closed");
        }
    }

    closes
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
