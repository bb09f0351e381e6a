use std::net::SocketAddr;

use relay_core::{RelayConfig, StreamingSpeechRelay};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use voice_core::{CommandBackend, SpeechEvent, SpeechQueue};

use server::config::ServerConfig;
use server::{build_router, cors_layer, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech relay server...");

    let relay_config = RelayConfig::from_env()?;
    info!(
        "Relay configured: model={}, word_threshold={}, max_tokens={:?}",
        relay_config.model, relay_config.word_threshold, relay_config.max_tokens
    );
    let relay = StreamingSpeechRelay::new(relay_config)?;

    // Load configuration from environment
    let config = ServerConfig::from_env();

    let speech = match config.tts_command.as_deref() {
        Some(command) => {
            let backend = CommandBackend::parse(command)?;
            info!("Local speech enabled via {}", backend.program());
            let queue = SpeechQueue::spawn(backend);
            spawn_speech_logger(&queue);
            Some(queue)
        }
        None => {
            info!("TTS_COMMAND not set, utterances are only streamed to clients");
            None
        }
    };

    let state = AppState::new(relay, speech, config.clone());
    info!(
        "Server configuration loaded: port={}, relay_timeout={}s, request_timeout={}s",
        config.port, config.relay_timeout_secs, config.request_timeout_secs
    );

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let app = build_router(state).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_speech_logger(queue: &SpeechQueue) {
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SpeechEvent::Start { utterance, text }) => {
                    info!("Speaking utterance {utterance}: {} chars", text.len())
                }
                Ok(SpeechEvent::Finish { utterance }) => info!("Utterance {utterance} finished"),
                Ok(SpeechEvent::Cancel { utterance }) => info!("Utterance {utterance} cancelled"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Speech event logger lagged by {n} events")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
