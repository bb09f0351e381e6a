use serde::Serialize;

use crate::config::RelayConfig;

/// Body of a streaming chat-completion request
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Message<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

impl<'a> ChatRequest<'a> {
    pub fn streaming(config: &'a RelayConfig, prompt: &'a str) -> Self {
        Self {
            model: &config.model,
            stream: true,
            max_tokens: config.max_tokens,
            messages: vec![
                Message { role: "system", content: &config.system_prompt },
                Message { role: "user", content: prompt },
            ],
        }
    }
}
