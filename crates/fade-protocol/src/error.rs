/// Errors for the FadeChat message lifecycle engine.
///
/// Every failure is scoped to the request or subscriber that caused it;
/// nothing here is meant to bring the process down.
use crate::hub::ChannelId;

/// Top-level error returned by room operations.
#[derive(Debug, thiserror::Error)]
pub enum FadeError {
    #[error("invalid client event: {reason}")]
    Validation { reason: String },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("channel {channel} failed: {reason}")]
    Channel { channel: ChannelId, reason: String },

    #[error("room is shut down")]
    Shutdown,
}

impl FadeError {
    /// Text sent back to the client in an `error` frame.
    ///
    /// Internal details (SQL errors, crypto internals) stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            FadeError::Validation { reason } => reason.clone(),
            FadeError::Crypto(_) | FadeError::Storage(_) => "Failed to send message".into(),
            FadeError::Channel { .. } => "Connection error".into(),
            FadeError::Shutdown => "Server is shutting down".into(),
        }
    }
}

/// Encryption, decryption and key handling failures.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("decryption failed: authentication error")]
    Decryption,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    #[error("key is sealed and no master key is configured")]
    Sealed,
}

/// Message store failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("store lock poisoned")]
    Poisoned,
}
