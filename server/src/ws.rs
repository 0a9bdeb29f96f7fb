use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use roomworld_shared::protocol::{ClientMsg, ServerMsg};
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;

use crate::engine::EngineCommand;

/// Largest accepted client frame (bytes)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;
/// Unparsable frames tolerated before the connection is closed
pub const MAX_PARSE_ERRORS: u32 = 10;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub engine_tx: mpsc::Sender<EngineCommand>,
}

/// Routes served by the binary and the integration tests.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(|socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .engine_tx
        .send(EngineCommand::Connect { response: resp_tx })
        .await
        .is_err()
    {
        tracing::error!("Engine is not running, refusing connection");
        return;
    }
    let Ok((my_id, mut outbound)) = resp_rx.await else {
        tracing::error!("Engine dropped connect request");
        return;
    };

    let mut parse_errors = 0;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_MESSAGE_SIZE {
                            tracing::warn!("Client {} sent oversized frame, closing", my_id);
                            break;
                        }
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(client_msg) => {
                                let cmd = EngineCommand::from_client(my_id, client_msg);
                                if app_state.engine_tx.send(cmd).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                parse_errors += 1;
                                tracing::debug!("Client {} sent bad frame: {}", my_id, e);
                                if parse_errors > MAX_PARSE_ERRORS {
                                    tracing::warn!("Client {} exceeded parse error limit, closing", my_id);
                                    break;
                                }
                                let reply = ServerMsg::Error {
                                    reason: format!("invalid message: {}", e),
                                };
                                if send_json(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Client {} socket error: {}", my_id, e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                if send_json(&mut sink, &msg).await.is_err() {
                    break;
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .engine_tx
        .send(EngineCommand::Disconnect { client_id: my_id })
        .await;
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize {:?}: {}", msg, e);
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}
