use crate::protocol::{ClientMessage, ServerMessage};
use crate::run::{RunErrorResponse, bearer_token};
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::broadcast::Subscription;

/// Browsers cannot set headers on a WebSocket handshake
#[derive(Debug, Default, Deserialize)]
pub struct WsAuth {
    pub access_token: Option<String>,
}

/// WebSocket upgrade handler for `/ws/runs/:id`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(run_id): Path<String>,
    Query(auth): Query<WsAuth>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, RunErrorResponse> {
    let token = bearer_token(&headers).or(auth.access_token.as_deref());
    state.controller.authorize_viewer(token).await?;
    let subscription = state.controller.registry().subscribe(&run_id)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, run_id, subscription)))
}

/// Stream one run's events to a client until the terminal event
async fn handle_socket(socket: WebSocket, run_id: String, subscription: Subscription) {
    let connection_id = Uuid::new_v4();
    info!("Observer {} attached to run {}", connection_id, run_id);

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward outgoing messages; close after the terminal one
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                    counter!("loadrun_ws_messages_sent_total", "type" => msg.message_type())
                        .increment(1);
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
            if msg.is_terminal() {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // Replay the latest event, then relay the run's channel
    let relay_tx = tx.clone();
    let relay_task = tokio::spawn(relay(subscription, relay_tx, connection_id));

    // Handle incoming messages
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping { seq }) => {
                        debug!("Ping {} from {}", seq, connection_id);
                        if tx.send(ServerMessage::Pong).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse client message: {}", e);
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("Client {} requested close", connection_id);
                    break;
                }
                // Ping frames are answered by axum
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    relay_task.abort();

    info!("Observer {} detached from run {}", connection_id, run_id);
}

async fn relay(subscription: Subscription, tx: mpsc::Sender<ServerMessage>, connection_id: Uuid) {
    let Subscription { replay, receiver } = subscription;

    if let Some(msg) = replay {
        let terminal = msg.is_terminal();
        if tx.send(msg).await.is_err() || terminal {
            return;
        }
    }
    let Some(mut receiver) = receiver else {
        return;
    };

    loop {
        match receiver.recv().await {
            Ok(msg) => {
                let terminal = msg.is_terminal();
                if tx.send(msg).await.is_err() || terminal {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(
                    "Observer {} lagged, skipped {} events",
                    connection_id, skipped
                );
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
