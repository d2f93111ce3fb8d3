/// In-memory message store.
///
/// Messages by id in a sharded map: each id is guarded by its shard's
/// lock only, so inserts and deletes of different messages rarely touch
/// the same lock.
use dashmap::DashMap;

use super::{check_lifetime, MessageStore};
use crate::error::StorageError;
use crate::message::StoredMessage;
use crate::types::{Identity, MessageId};

/// Volatile store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    messages: DashMap<MessageId, StoredMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a specific message.
    pub fn get(&self, id: &MessageId) -> Option<StoredMessage> {
        self.messages.get(id).map(|m| m.value().clone())
    }

    /// Check if we have a message.
    pub fn has(&self, id: &MessageId) -> bool {
        self.messages.contains_key(id)
    }
}

impl MessageStore for MemoryStore {
    fn insert(
        &self,
        identity: &Identity,
        ciphertext: &str,
        key: &str,
        created_at: u64,
        lifetime_secs: u64,
    ) -> Result<MessageId, StorageError> {
        check_lifetime(lifetime_secs)?;
        let id = MessageId::new();
        self.messages.insert(
            id.clone(),
            StoredMessage {
                id: id.clone(),
                identity: identity.clone(),
                ciphertext: ciphertext.to_string(),
                key: key.to_string(),
                created_at,
                lifetime_secs,
            },
        );
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError> {
        Ok(self.messages.iter().map(|m| m.value().clone()).collect())
    }

    fn delete_by_id(&self, id: &MessageId) -> Result<bool, StorageError> {
        Ok(self.messages.remove(id).is_some())
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.messages.len())
    }
}
