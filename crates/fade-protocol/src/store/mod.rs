/// Message store: encrypted messages with creation time and lifetime.
///
/// Two backends share one trait:
/// - **MemoryStore**: sharded in-memory map, for tests and `--memory` runs
/// - **SqliteStore**: on-disk SQLite table
///
/// Both are safe to share between the send path, the expiry scanner and
/// initial-load queries. Writes to one id are serialized; unrelated ids
/// never wait on each other for long.
pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageError;
use crate::message::StoredMessage;
use crate::types::{Identity, MessageId};

/// Storage backend for encrypted messages.
pub trait MessageStore: Send + Sync {
    /// Persist a new message and return its freshly assigned id.
    ///
    /// `lifetime_secs` must be at least 1.
    fn insert(
        &self,
        identity: &Identity,
        ciphertext: &str,
        key: &str,
        created_at: u64,
        lifetime_secs: u64,
    ) -> Result<MessageId, StorageError>;

    /// Every stored message, in no particular order.
    fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError>;

    /// Remove a message. `Ok(true)` if it existed, `Ok(false)` if it was
    /// already gone; deleting twice is not an error.
    fn delete_by_id(&self, id: &MessageId) -> Result<bool, StorageError>;

    /// Number of stored messages (expired-but-not-swept included).
    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// Reject records that would break the lifetime invariant.
pub(crate) fn check_lifetime(lifetime_secs: u64) -> Result<(), StorageError> {
    if lifetime_secs < 1 {
        return Err(StorageError::InvalidRecord {
            reason: "lifetime must be at least 1 second".into(),
        });
    }
    Ok(())
}
