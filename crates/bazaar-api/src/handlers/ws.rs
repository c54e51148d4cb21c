//! WebSocket upgrade handler.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt, future};
use tracing::{debug, info};

use bazaar_core::types::ConversationId;
use bazaar_realtime::{ConnectRequest, SessionEnd, TransportEvent, WireMessage};

use crate::extractors::bearer_token;
use crate::state::AppState;

/// Query parameters of the chat upgrade.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    pub token: Option<String>,
}

/// GET /chat/{conversation_id}?token={jwt}: WebSocket upgrade
///
/// The token may also arrive as a bearer Authorization header. Token and
/// membership checks happen after the upgrade so failures are reported
/// with a close code.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string));

    let request = ConnectRequest {
        conversation_id,
        token,
    };

    ws.on_upgrade(move |socket| handle_socket(state, request, socket))
}

/// Adapts an upgraded socket to the chat protocol.
async fn handle_socket(state: AppState, request: ConnectRequest, socket: WebSocket) {
    let conversation_id = request.conversation_id;
    let (ws_tx, ws_rx) = socket.split();

    let inbound = ws_rx.map(|result| result.map(into_event));
    let outbound = ws_tx.with(|msg: WireMessage| future::ready(Ok::<_, axum::Error>(into_message(msg))));

    match state.realtime.handler.serve(request, inbound, outbound).await {
        SessionEnd::Rejected { code, reason } => {
            debug!(conversation_id = %conversation_id, code, reason = %reason, "Chat upgrade rejected");
        }
        SessionEnd::Closed {
            conn_id,
            user_id,
            frames_handled,
        } => {
            info!(
                conn_id = %conn_id,
                user_id = %user_id,
                conversation_id = %conversation_id,
                frames_handled,
                "WebSocket session ended"
            );
        }
    }
}

fn into_event(message: Message) -> TransportEvent {
    match message {
        Message::Text(text) => TransportEvent::Text(text.as_str().to_owned()),
        Message::Binary(data) => TransportEvent::Binary(data.to_vec()),
        Message::Ping(_) | Message::Pong(_) => TransportEvent::Heartbeat,
        Message::Close(_) => TransportEvent::Close,
    }
}

fn into_message(message: WireMessage) -> Message {
    match message {
        WireMessage::Text(text) => Message::Text(text.into()),
        WireMessage::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}
