use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use clinical_flow::{ConnectionRegistry, PushMessage, PushSink};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::service::AppState;

const OUTBOUND_BUFFER: usize = 32;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one push connection. Outbound messages go through a channel so the
/// registry can hold a sender; inbound frames are handled one at a time, so
/// results arrive in request order.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<PushMessage>(OUTBOUND_BUFFER);

    let connection_id = ConnectionRegistry::new_connection_id();
    state.registry.add(connection_id.clone(), tx.clone());
    info!(connection_id = %connection_id, connections = state.registry.count(), "Client connected");

    let sender = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Dropping unserializable push message");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    if tx
        .push(PushMessage::connected(connection_id.clone()))
        .await
        .is_ok()
    {
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Err(e) = state.dispatcher.handle_text(text.as_str(), &tx).await {
                        debug!(connection_id = %connection_id, error = %e, "Push channel gone");
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    state.registry.remove(&connection_id);
    drop(tx);
    let _ = sender.await;
    info!(connection_id = %connection_id, connections = state.registry.count(), "Client disconnected");
}
