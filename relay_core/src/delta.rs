use serde::Deserialize;

use crate::error::RelayError;

/// One decoded `message` payload of a streamed chat completion.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionDelta {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionDelta {
    /// Decode an SSE `data` payload. Invalid JSON and a missing `choices[0]`
    /// are both decode errors.
    pub fn parse(data: &str) -> Result<Self, RelayError> {
        let delta: CompletionDelta = serde_json::from_str(data)
            .map_err(|e| RelayError::Decode(format!("invalid completion chunk: {e}")))?;
        if delta.choices.is_empty() {
            return Err(RelayError::Decode("completion chunk has no choices".to_string()));
        }
        Ok(delta)
    }

    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.content.as_deref())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}
