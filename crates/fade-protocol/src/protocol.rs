/// Client ↔ room frames.
///
/// JSON objects tagged by `"type"`. Field names match what the web
/// client already reads (`username`, `message`, `createdAt`, ...).
use serde::{Deserialize, Serialize};

use crate::error::FadeError;
use crate::message::ActiveMessage;
use crate::types::{Identity, MessageId};

/// Default cap on chat text length, in characters.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4000;

/// Reason reported for frames that don't parse.
pub const INVALID_FORMAT: &str = "Invalid message format";

/// Frames a connected client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Post a chat message to the room.
    Chat { text: String },
}

impl ClientEvent {
    /// Parse one text frame.
    pub fn parse(frame: &str) -> Result<Self, FadeError> {
        serde_json::from_str(frame).map_err(|e| {
            tracing::debug!(error = %e, "unparseable client frame");
            FadeError::Validation {
                reason: INVALID_FORMAT.into(),
            }
        })
    }
}

/// Frames the room pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    AuthSuccess { username: Identity },
    NewMessage(ActiveMessage),
    MessageExpired { id: MessageId },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(err: &FadeError) -> Self {
        ServerEvent::Error {
            message: err.client_message(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Check chat text before it enters the send path.
///
/// Whitespace-only text counts as empty. Length is in characters, not bytes.
pub fn validate_text(text: &str, max_chars: usize) -> Result<(), FadeError> {
    if text.trim().is_empty() {
        return Err(FadeError::Validation {
            reason: "Message cannot be empty".into(),
        });
    }
    if text.chars().count() > max_chars {
        return Err(FadeError::Validation {
            reason: format!("Message is too long (max {max_chars} characters)"),
        });
    }
    Ok(())
}
