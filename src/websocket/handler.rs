use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::registry::{ConnectionContext, ConnectionHandle};
use crate::rooms::RoomKey;
use crate::server::AppState;

use super::message::{ClientMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Authentication happens here, once per connection lifetime: a failed
/// handshake is rejected before the upgrade and the connection never joins
/// any room.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = match extract_token(&query, &headers) {
        Some(t) => t,
        None => {
            return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
        }
    };

    let ctx = match state.registry.authenticate(&token).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake authentication failed");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    tracing::info!(user_id = %ctx.user_id, tenant_id = %ctx.tenant_id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, ctx))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, ctx),
    fields(user_id = %ctx.user_id, tenant_id = %ctx.tenant_id)
)]
async fn handle_socket(socket: WebSocket, state: AppState, ctx: ConnectionContext) {
    // Channel for messages destined to this connection
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.settings.websocket.channel_buffer);

    let handle = state.registry.register(&ctx, tx);
    let connection_id = handle.id;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    state.registry.unregister(connection_id);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
            true
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(state, handle),
    fields(connection_id = %handle.id, user_id = %handle.user_id)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &Arc<ConnectionHandle>) {
    match msg {
        ClientMessage::Join { rooms } => handle_join(rooms, state, handle).await,
        ClientMessage::Leave { rooms } => handle_leave(rooms, state, handle).await,
        ClientMessage::Ping => {
            let _ = handle.send(ServerMessage::Pong).await;
        }
    }
}

/// Join pharmacy/order rooms requested over the live connection.
/// `user:` and `tenant:` rooms are handshake-assigned and rejected here.
async fn handle_join(rooms: Vec<String>, state: &AppState, handle: &Arc<ConnectionHandle>) {
    let mut joined = Vec::new();
    let mut errors = Vec::new();

    for raw in rooms {
        match RoomKey::parse(&raw) {
            Some(room) if room.is_client_joinable() => {
                state.registry.join(handle.id, &room);
                joined.push(raw);
            }
            Some(_) => {
                errors.push(format!("Room not joinable: {}", raw));
            }
            None => {
                errors.push(format!("Invalid room key: {}", raw));
            }
        }
    }

    if !joined.is_empty() {
        tracing::info!(connection_id = %handle.id, rooms = ?joined, "Joined rooms");
        let _ = handle.send(ServerMessage::joined(joined)).await;
    }

    if !errors.is_empty() {
        let _ = handle
            .send(ServerMessage::error("JOIN_ERROR", errors.join("; ")))
            .await;
    }
}

async fn handle_leave(rooms: Vec<String>, state: &AppState, handle: &Arc<ConnectionHandle>) {
    let mut left = Vec::new();

    for raw in rooms {
        if let Some(room) = RoomKey::parse(&raw) {
            if room.is_client_joinable() {
                state.registry.leave(handle.id, &room);
                left.push(raw);
            }
        }
    }

    if !left.is_empty() {
        tracing::info!(connection_id = %handle.id, rooms = ?left, "Left rooms");
        let _ = handle.send(ServerMessage::left(left)).await;
    }
}
