// Configuration for a relay: where to send the completion request and how to
// turn the streamed reply into speech.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that can answer questions and help with tasks. Be concise and to the point. Single paragraph response.";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_WORD_THRESHOLD: usize = 5;
pub const DEFAULT_DONE_SENTINEL: &str = "[DONE]";
pub const DEFAULT_STOP_REASON: &str = "stop";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in the environment")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct RelayConfig {
    pub endpoint: String,
    pub credential: String,
    pub model: String,
    pub system_prompt: String,
    /// `None` leaves `max_tokens` out of the request body.
    pub max_tokens: Option<u32>,
    /// Words that must be buffered before the first utterance is spoken.
    pub word_threshold: usize,
    pub done_sentinel: String,
    pub stop_reason: String,
    pub connect_timeout: Duration,
}

impl RelayConfig {
    pub fn new(
        endpoint: impl Into<String>,
        credential: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            word_threshold: DEFAULT_WORD_THRESHOLD,
            done_sentinel: DEFAULT_DONE_SENTINEL.to_string(),
            stop_reason: DEFAULT_STOP_REASON.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Read the relay configuration from the environment.
    ///
    /// `API_URL`, `API_KEY` and `MODEL` are required; everything else falls
    /// back to the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = required("API_URL")?;
        let credential = required("API_KEY")?;
        let model = required("MODEL")?;
        let mut config = Self::new(endpoint, credential, model);

        if let Ok(prompt) = std::env::var("RELAY_SYSTEM_PROMPT") {
            if !prompt.trim().is_empty() {
                config.system_prompt = prompt;
            }
        }
        if let Some(max_tokens) = parsed::<u32>("RELAY_MAX_TOKENS")? {
            config.max_tokens = (max_tokens > 0).then_some(max_tokens);
        }
        if let Some(threshold) = parsed::<usize>("RELAY_WORD_THRESHOLD")? {
            config.word_threshold = threshold;
        }
        if let Ok(sentinel) = std::env::var("RELAY_DONE_SENTINEL") {
            config.done_sentinel = sentinel;
        }
        if let Ok(reason) = std::env::var("RELAY_STOP_REASON") {
            config.stop_reason = reason;
        }
        if let Some(secs) = parsed::<u64>("RELAY_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_word_threshold(mut self, threshold: usize) -> Self {
        self.word_threshold = threshold;
        self
    }

    pub fn with_done_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.done_sentinel = sentinel.into();
        self
    }

    pub fn with_stop_reason(mut self, reason: impl Into<String>) -> Self {
        self.stop_reason = reason.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// Manual Debug so the credential never ends up in logs
impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("endpoint", &self.endpoint)
            .field("credential", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("word_threshold", &self.word_threshold)
            .field("done_sentinel", &self.done_sentinel)
            .field("stop_reason", &self.stop_reason)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
