//! A speech sink that speaks utterances one after another.
//!
//! `speak` only enqueues, so a relay can keep handing over fragments while an
//! earlier one is still playing. Lifecycle events are published on a
//! broadcast channel for anyone who wants to mirror the speaking state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_core::{SinkError, SpeechSink};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::backend::SpeechBackend;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpeechEvent {
    Start { utterance: u64, text: String },
    Finish { utterance: u64 },
    Cancel { utterance: u64 },
}

enum Command {
    Speak(String),
    Stop,
}

pub struct SpeechQueue {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SpeechEvent>,
    speaking: Arc<AtomicBool>,
}

impl SpeechQueue {
    /// Start the worker task. Must be called from within a tokio runtime.
    pub fn spawn(backend: impl SpeechBackend + 'static) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let speaking = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_worker(Box::new(backend), rx, events.clone(), speaking.clone()));

        Self { commands, events, speaking }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events.subscribe()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Drop everything queued and cut off the current utterance.
    pub fn stop(&self) {
        if self.commands.send(Command::Stop).is_err() {
            debug!("Speech worker already gone");
        }
    }
}

impl SpeechSink for SpeechQueue {
    fn speak(&self, text: &str) -> Result<(), SinkError> {
        self.commands
            .send(Command::Speak(text.to_string()))
            .map_err(|_| SinkError::Closed)
    }
}

async fn run_worker(
    backend: Box<dyn SpeechBackend>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<SpeechEvent>,
    speaking: Arc<AtomicBool>,
) {
    let mut pending: VecDeque<String> = VecDeque::new();
    let mut next_id: u64 = 0;
    let mut open = true;

    while open {
        if pending.is_empty() {
            match commands.recv().await {
                Some(Command::Speak(text)) => pending.push_back(text),
                Some(Command::Stop) => continue,
                None => break,
            }
        }

        let Some(text) = pending.pop_front() else {
            continue;
        };
        next_id += 1;
        let utterance = next_id;

        speaking.store(true, Ordering::SeqCst);
        let _ = events.send(SpeechEvent::Start { utterance, text: text.clone() });

        let playback = backend.speak(&text);
        tokio::pin!(playback);

        let cancelled = loop {
            tokio::select! {
                result = &mut playback => {
                    if let Err(e) = result {
                        warn!("Speech playback failed: {e:#}");
                    }
                    break false;
                }
                command = commands.recv() => match command {
                    Some(Command::Speak(next)) => pending.push_back(next),
                    Some(Command::Stop) => {
                        pending.clear();
                        break true;
                    }
                    None => {
                        open = false;
                        pending.clear();
                        break true;
                    }
                },
            }
        };

        speaking.store(false, Ordering::SeqCst);
        let event = if cancelled {
            SpeechEvent::Cancel { utterance }
        } else {
            SpeechEvent::Finish { utterance }
        };
        let _ = events.send(event);
    }

    debug!("Speech worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PacedBackend;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast::Receiver;

    #[derive(Clone, Default)]
    struct Recording {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SpeechBackend for Recording {
        async fn speak(&self, text: &str) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    async fn next_event(rx: &mut Receiver<SpeechEvent>) -> SpeechEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("speech event")
            .expect("open channel")
    }

    #[tokio::test]
    async fn test_utterances_are_spoken_in_order() {
        let backend = Recording::default();
        let queue = SpeechQueue::spawn(backend.clone());
        let mut events = queue.subscribe();

        queue.speak("Hi there how are you doing").unwrap();
        queue.speak(" today").unwrap();

        assert_eq!(
            next_event(&mut events).await,
            SpeechEvent::Start { utterance: 1, text: "Hi there how are you doing".into() }
        );
        assert_eq!(next_event(&mut events).await, SpeechEvent::Finish { utterance: 1 });
        assert_eq!(
            next_event(&mut events).await,
            SpeechEvent::Start { utterance: 2, text: " today".into() }
        );
        assert_eq!(next_event(&mut events).await, SpeechEvent::Finish { utterance: 2 });
        assert_eq!(*backend.spoken.lock().unwrap(), vec!["Hi there how are you doing", " today"]);
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_stop_cancels_current_and_pending() {
        let queue = SpeechQueue::spawn(PacedBackend::new(Duration::from_secs(30)));
        let mut events = queue.subscribe();

        queue.speak("a very long utterance").unwrap();
        queue.speak("never spoken").unwrap();
        assert!(matches!(next_event(&mut events).await, SpeechEvent::Start { utterance: 1, .. }));
        assert!(queue.is_speaking());

        queue.stop();
        assert_eq!(next_event(&mut events).await, SpeechEvent::Cancel { utterance: 1 });
        assert!(!queue.is_speaking());

        // the queue keeps working after a stop
        queue.speak("fresh").unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SpeechEvent::Start { utterance: 2, text: "fresh".into() }
        );
    }

    #[tokio::test]
    async fn test_failed_playback_still_finishes() {
        struct Failing;

        #[async_trait]
        impl SpeechBackend for Failing {
            async fn speak(&self, _text: &str) -> anyhow::Result<()> {
                anyhow::bail!("audio device unavailable")
            }
        }

        let queue = SpeechQueue::spawn(Failing);
        let mut events = queue.subscribe();
        queue.speak("hello").unwrap();

        assert!(matches!(next_event(&mut events).await, SpeechEvent::Start { .. }));
        assert_eq!(next_event(&mut events).await, SpeechEvent::Finish { utterance: 1 });
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(SpeechEvent::Start { utterance: 3, text: "Hi".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "start", "utterance": 3, "text": "Hi"}));
    }
}
