use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ApiState;

/// GET /ws: stream every detector result as a JSON text frame
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ApiState>) {
    let (id, mut rx) = state.coordinator.subscribe().await;
    debug!(subscriber_id = %id, "WebSocket client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                let Some(result) = result else {
                    // Hub dropped us (slow consumer)
                    break;
                };
                let frame = match serde_json::to_string(&result) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize result for WebSocket");
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Pings are answered by axum; other frames are ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.coordinator.unsubscribe(id).await;
    debug!(subscriber_id = %id, "WebSocket client disconnected");
}
