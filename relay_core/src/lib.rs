//! Incremental token-to-speech streaming.
//!
//! A [`StreamingSpeechRelay`] opens one streaming chat-completion request per
//! prompt, assembles the streamed deltas into a running transcript, and hands
//! newly available text to a [`SpeechSink`] while the reply is still arriving.
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_core::{update_channel, RelayConfig, StreamingSpeechRelay};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let relay = StreamingSpeechRelay::new(RelayConfig::from_env()?)?;
//! let (updates, mut rx) = update_channel();
//! let handle = relay.begin("Explain quantum computing", Arc::new(updates.clone()), Arc::new(updates));
//! while let Some(update) = rx.recv().await {
//!     println!("{update:?}");
//! }
//! let summary = handle.join().await?;
//! println!("{}", summary.transcript);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delta;
pub mod error;
pub mod policy;
pub mod relay;
pub mod request;
pub mod session;
pub mod sink;
pub mod sse;

pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, SinkError};
pub use relay::{RelayHandle, StreamingSpeechRelay};
pub use session::{RelayState, RelaySummary, Termination};
pub use sink::{update_channel, FanoutSink, RelayObserver, RelayUpdate, SpeechSink, UpdateSender};
