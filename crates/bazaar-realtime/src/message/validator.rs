//! Validation rules for inbound frames and message content.

use bazaar_core::error::AppError;
use bazaar_entity::MessageType;

/// Rejects raw frames larger than `max_bytes`.
pub fn validate_frame_size(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Frame exceeds maximum size of {max_bytes} bytes"
        )));
    }
    Ok(())
}

/// Validates a message a client wants to send.
///
/// Returns the content unchanged; whitespace is only used for the
/// emptiness check.
pub fn validate_message_content<'a>(
    content: &'a str,
    message_type: MessageType,
    max_chars: usize,
) -> Result<&'a str, AppError> {
    if content.trim().is_empty() {
        return Err(AppError::validation("Message content cannot be empty"));
    }

    if content.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "Message content exceeds {max_chars} characters"
        )));
    }

    if !message_type.is_client_sendable() {
        return Err(AppError::validation(format!(
            "Message type '{message_type}' cannot be sent by clients"
        )));
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_content() {
        assert!(validate_message_content("", MessageType::Text, 10).is_err());
        assert!(validate_message_content(" \n\t ", MessageType::Text, 10).is_err());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let content = "ééééé";
        assert_eq!(validate_message_content(content, MessageType::Text, 5).ok(), Some(content));
        assert!(validate_message_content("ééééé!", MessageType::Text, 5).is_err());
    }

    #[test]
    fn test_rejects_system_messages() {
        assert!(validate_message_content("hi", MessageType::System, 10).is_err());
        assert!(validate_message_content("https://x/y.png", MessageType::Image, 100).is_ok());
    }

    #[test]
    fn test_frame_size_limit() {
        assert!(validate_frame_size("abcd", 4).is_ok());
        assert!(validate_frame_size("abcde", 4).is_err());
    }
}
