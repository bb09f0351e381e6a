use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::SinkExt;
use relay_core::{update_channel, RelayUpdate, Termination};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::validation::validate_prompt;
use crate::AppState;

#[derive(Deserialize)]
pub struct RelayRequest {
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct RelayQuery {
    pub prompt: String,
}

#[derive(Serialize, Debug)]
pub struct RelayResponse {
    pub session_id: Uuid,
    pub transcript: String,
    /// Every utterance in the order it was handed to the speech sink.
    pub utterances: Vec<String>,
    pub audio_started: bool,
    pub termination: Option<Termination>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// Run one relay session to completion and return what was said.
pub async fn relay_endpoint(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    let request_no = state.request_count.fetch_add(1, Ordering::Relaxed) + 1;
    validate_prompt(&req.prompt)?;

    let (updates, mut rx) = update_channel();
    let handle = state.begin(&req.prompt, updates);
    let cancel = handle.cancel_token();
    info!(
        session = %handle.session_id(),
        "Relay request #{} received: prompt length={}",
        request_no,
        req.prompt.len()
    );

    let utterances = async move {
        let mut utterances = Vec::new();
        while let Some(update) = rx.recv().await {
            if let RelayUpdate::Utterance { text } = update {
                utterances.push(text);
            }
        }
        utterances
    };

    let timeout = state.config.relay_timeout();
    let (summary, utterances) =
        match tokio::time::timeout(timeout, async { tokio::join!(handle.join(), utterances) }).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                error!("Relay request #{} timed out after {}s", request_no, timeout.as_secs());
                return Err(ApiError::Timeout(timeout.as_secs()));
            }
        };
    let summary = summary?;

    Ok(Json(RelayResponse {
        session_id: summary.session_id,
        transcript: summary.transcript,
        utterances,
        audio_started: summary.audio_started,
        termination: summary.termination,
    }))
}

/// Stream a relay session over a WebSocket.
///
/// Every [`RelayUpdate`] is sent as a JSON text frame. Sending the text
/// `cancel`, or closing the socket, cancels the session.
pub async fn relay_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
) -> impl IntoResponse {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    if let Err(e) = validate_prompt(&query.prompt) {
        return ws.on_upgrade(move |mut socket| async move {
            let error_msg = serde_json::json!({ "type": "error", "kind": "invalid_input", "message": e.to_string() });
            let _ = socket.send(Message::Text(error_msg.to_string().into())).await;
            let _ = socket.close().await;
        });
    }

    ws.on_upgrade(move |socket| relay_socket(socket, state, query.prompt))
}

async fn relay_socket(mut socket: WebSocket, state: AppState, prompt: String) {
    let (updates, mut rx) = update_channel();
    let handle = state.begin(&prompt, updates);
    let session_id = handle.session_id();
    info!(session = %session_id, "WebSocket relay session started");

    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else { break };
                let text = match serde_json::to_string(&update) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(session = %session_id, "Failed to encode relay update: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    warn!(session = %session_id, "WebSocket send failed, cancelling session");
                    handle.cancel();
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str().trim() == "cancel" => {
                    info!(session = %session_id, "Client cancelled relay session");
                    handle.cancel();
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(session = %session_id, "WebSocket closed by client");
                    handle.cancel();
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    match handle.join().await {
        Ok(summary) => info!(
            session = %session_id,
            "WebSocket relay session ended: {:?}",
            summary.termination
        ),
        Err(e) => warn!(session = %session_id, "WebSocket relay session failed: {e}"),
    }
    let _ = socket.close().await;
}

/// Stop local speech and cancel the session feeding it.
pub async fn speech_stop(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if !state.interrupt_speaker() {
        return Err(ApiError::NotFound("Local speech is not configured".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
