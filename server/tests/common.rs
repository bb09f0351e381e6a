//! Common utilities for integration tests
#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use relay_core::{RelayConfig, StreamingSpeechRelay};
use serde_json::json;
use server::{build_router, config::ServerConfig, AppState};
use voice_core::SpeechQueue;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        relay_timeout_secs: 5,
        ..ServerConfig::default()
    }
}

/// App state whose relay talks to the mock upstream
pub fn test_state(upstream: &MockServer, speech: Option<SpeechQueue>, config: ServerConfig) -> AppState {
    let relay_config = RelayConfig::new(
        format!("{}{}", upstream.uri(), COMPLETIONS_PATH),
        "test-key",
        "gpt-4o-mini",
    );
    let relay = StreamingSpeechRelay::new(relay_config).expect("Failed to create relay for tests");
    AppState::new(relay, speech, config)
}

/// Create a test app instance without local speech
pub fn create_test_app(upstream: &MockServer) -> Router {
    build_router(test_state(upstream, None, test_config()))
}

pub fn content_event(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]})
    )
}

/// A well-formed streamed reply ending with the done sentinel
pub fn sse_reply(fragments: &[&str]) -> String {
    let mut body: String = fragments.iter().map(|f| content_event(f)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

pub async fn mount_reply(upstream: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(upstream)
        .await;
}

/// An upstream that takes `delay` before answering
pub async fn mount_slow_reply(upstream: &MockServer, body: String, delay: Duration) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/event-stream")
                .set_delay(delay),
        )
        .mount(upstream)
        .await;
}

pub const GREETING: [&str; 7] = ["Hi", " there", " how", " are", " you", " doing", " today"];
