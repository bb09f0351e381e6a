pub mod config;
pub mod error;
pub mod handlers;
pub mod validation;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use relay_core::{FanoutSink, RelayHandle, RelayObserver, SpeechSink, StreamingSpeechRelay, UpdateSender};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use voice_core::SpeechQueue;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<StreamingSpeechRelay>,
    /// Local speech output, when a TTS command is configured.
    pub speech: Option<Arc<SpeechQueue>>,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
    // session currently driving local speech
    speaker: Arc<Mutex<Option<CancellationToken>>>,
}

impl AppState {
    pub fn new(relay: StreamingSpeechRelay, speech: Option<SpeechQueue>, config: ServerConfig) -> Self {
        Self {
            relay: Arc::new(relay),
            speech: speech.map(Arc::new),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
            speaker: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a relay session whose output goes to `updates` and, when
    /// configured, to the local speaker.
    ///
    /// Only one session speaks locally at a time: a new session cancels the
    /// previous speaker session and cuts off its speech. The speaker slot
    /// stays locked until the new session owns it.
    pub fn begin(&self, prompt: &str, updates: UpdateSender) -> RelayHandle {
        let observer: Arc<dyn RelayObserver> = Arc::new(updates.clone());
        let Some(speech) = &self.speech else {
            return self.relay.begin(prompt, Arc::new(updates), observer);
        };

        let mut speaker = self.speaker.lock().unwrap_or_else(|e| e.into_inner());
        silence(&mut speaker, speech);
        let local: Arc<dyn SpeechSink> = speech.clone();
        let sinks: Vec<Arc<dyn SpeechSink>> = vec![Arc::new(updates), local];
        let handle = self.relay.begin(prompt, Arc::new(FanoutSink::new(sinks)), observer);
        *speaker = Some(handle.cancel_token());
        handle
    }

    /// Cancel the session that owns the local speaker and stop speech.
    /// Returns false when no local speech is configured.
    pub fn interrupt_speaker(&self) -> bool {
        let Some(speech) = &self.speech else {
            return false;
        };
        let mut speaker = self.speaker.lock().unwrap_or_else(|e| e.into_inner());
        silence(&mut speaker, speech);
        true
    }
}

fn silence(speaker: &mut Option<CancellationToken>, speech: &SpeechQueue) {
    if let Some(token) = speaker.take() {
        info!("Interrupting previous speaker session");
        token.cancel();
    }
    speech.stop();
}

/// Build the application router with all endpoints, at the root and under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/relay", post(handlers::relay_endpoint))
        .route("/relay/ws", get(handlers::relay_ws))
        .route("/speech/stop", post(handlers::speech_stop));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}

/// CORS configuration - environment-aware
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    let base = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(allowed_origins) = &config.cors_allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
