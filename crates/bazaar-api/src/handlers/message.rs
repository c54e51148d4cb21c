//! REST fallback for sending chat messages.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::{info, warn};

use bazaar_core::error::AppError;
use bazaar_core::types::ConversationId;
use bazaar_realtime::message::types::MessageData;
use bazaar_realtime::message::validator;

use crate::dto::request::SendMessageRequest;
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// POST /api/conversations/{conversation_id}/messages
///
/// Persists the message and broadcasts it to every connected participant,
/// the sender's own sockets included.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<ConversationId>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageData>>), ApiError> {
    state
        .conversations
        .get_conversation(conversation_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Conversation not found"))?;

    let content = validator::validate_message_content(
        &req.content,
        req.message_type,
        state.config.realtime.max_message_chars,
    )?;

    let message = state
        .messages
        .create_message(conversation_id, user_id, content, req.message_type)
        .await?;
    state.realtime.metrics.message_persisted();

    let delivered = state.realtime.router.broadcast_message(&message).await;
    if delivered > 0 {
        if let Err(e) = state.messages.mark_as_delivered(message.id).await {
            warn!(message_id = %message.id, error = %e, "Failed to mark message delivered");
        }
    }

    info!(
        message_id = %message.id,
        conversation_id = %conversation_id,
        sender = %user_id,
        delivered,
        "Message sent via REST"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(MessageData::from(&message))),
    ))
}
