/// Message records as stored, and as shown to clients.
use serde::{Deserialize, Serialize};

use crate::types::{Identity, MessageId};

/// Remaining whole seconds before `expires_at`, rounded up, 0 once reached.
///
/// Rounding up keeps `remaining > 0` for every instant strictly before
/// expiry, and exactly 0 at or after it.
pub fn remaining_secs(expires_at: u64, now: u64) -> u64 {
    expires_at.saturating_sub(now).div_ceil(1000)
}

/// An encrypted message as persisted by a [`MessageStore`](crate::store::MessageStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    /// Sender identity.
    pub identity: Identity,
    /// Envelope text from [`crypto::encrypt`](crate::crypto::encrypt).
    pub ciphertext: String,
    /// Per-message key in its stored form (see [`KeySealer`](crate::crypto::KeySealer)).
    pub key: String,
    /// Creation time (Unix ms).
    pub created_at: u64,
    /// Lifetime in seconds, fixed at creation. Always >= 1.
    pub lifetime_secs: u64,
}

impl StoredMessage {
    /// Absolute expiry time (Unix ms).
    pub fn expires_at(&self) -> u64 {
        self.created_at
            .saturating_add(self.lifetime_secs.saturating_mul(1000))
    }

    pub fn remaining_secs(&self, now: u64) -> u64 {
        remaining_secs(self.expires_at(), now)
    }

    /// Logically deleted, whether or not the row is physically gone yet.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at()
    }
}

/// A live, decrypted message as delivered to clients.
///
/// Serializes with the field names the web client reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMessage {
    pub id: MessageId,
    #[serde(rename = "username")]
    pub identity: Identity,
    #[serde(rename = "message")]
    pub text: String,
    pub created_at: u64,
    #[serde(rename = "lifetime")]
    pub lifetime_secs: u64,
    pub expires_at: u64,
    #[serde(rename = "remaining")]
    pub remaining_secs: u64,
}

impl ActiveMessage {
    /// View of `stored` with its decrypted `text`, as of `now`.
    pub fn from_stored(stored: &StoredMessage, text: String, now: u64) -> Self {
        Self {
            id: stored.id.clone(),
            identity: stored.identity.clone(),
            text,
            created_at: stored.created_at,
            lifetime_secs: stored.lifetime_secs,
            expires_at: stored.expires_at(),
            remaining_secs: stored.remaining_secs(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(created_at: u64, lifetime_secs: u64) -> StoredMessage {
        StoredMessage {
            id: MessageId::from("msg-1"),
            identity: Identity::from("alice"),
            ciphertext: String::new(),
            key: String::new(),
            created_at,
            lifetime_secs,
        }
    }

    #[test]
    fn remaining_is_positive_strictly_before_expiry() {
        let msg = stored(10_000, 5);
        assert_eq!(msg.expires_at(), 15_000);
        assert_eq!(msg.remaining_secs(10_000), 5);
        assert_eq!(msg.remaining_secs(10_001), 5);
        assert_eq!(msg.remaining_secs(14_000), 1);
        assert_eq!(msg.remaining_secs(14_999), 1);
        assert!(!msg.is_expired(14_999));
    }

    #[test]
    fn remaining_is_zero_at_and_after_expiry() {
        let msg = stored(10_000, 5);
        assert_eq!(msg.remaining_secs(15_000), 0);
        assert_eq!(msg.remaining_secs(99_000), 0);
        assert!(msg.is_expired(15_000));
    }

    #[test]
    fn active_message_wire_names() {
        let msg = stored(1_000, 600);
        let active = ActiveMessage::from_stored(&msg, "hi".into(), 1_000);
        let json = serde_json::to_value(&active).unwrap();
        assert_eq!(json["id"], "msg-1");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["createdAt"], 1_000);
        assert_eq!(json["lifetime"], 600);
        assert_eq!(json["expiresAt"], 601_000);
        assert_eq!(json["remaining"], 600);
    }
}
