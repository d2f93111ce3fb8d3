/// SQLite-backed message store.
///
/// One `messages` table keyed by message id. The file runs in WAL mode so
/// readers (initial loads, sweeps) don't block the writer, and a few
/// connections are handed out round-robin so one slow caller doesn't hold
/// everyone else behind a single handle. Row-level conflicts are left to
/// SQLite's own locking; `busy_timeout` bounds the wait.
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::{check_lifetime, MessageStore};
use crate::error::StorageError;
use crate::message::StoredMessage;
use crate::types::{Identity, MessageId};

/// Connections opened for an on-disk store.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,
    identity      TEXT NOT NULL,
    ciphertext    TEXT NOT NULL,
    key           TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    lifetime_secs INTEGER NOT NULL CHECK (lifetime_secs >= 1)
);
";

/// Persistent store in a single SQLite file.
pub struct SqliteStore {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl SqliteStore {
    /// Open (or create) the database at `path` with the default pool size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_pool(path, DEFAULT_POOL_SIZE)
    }

    /// Open (or create) the database at `path` with `pool_size` connections.
    pub fn open_with_pool(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut conns = Vec::with_capacity(pool_size.max(1));
        for i in 0..pool_size.max(1) {
            let conn = Connection::open(path)?;
            configure(&conn)?;
            if i == 0 {
                conn.execute_batch(SCHEMA)?;
            }
            conns.push(Mutex::new(conn));
        }
        tracing::info!(path = %path.display(), connections = conns.len(), "message store opened");
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database (single connection).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conns: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
        })
    }

    /// Look up a single message.
    pub fn get(&self, id: &MessageId) -> Result<Option<StoredMessage>, StorageError> {
        let conn = self.conn()?;
        let msg = conn
            .query_row(
                "SELECT id, identity, ciphertext, key, created_at, lifetime_secs
                 FROM messages WHERE id = ?1",
                params![id.as_ref()],
                row_to_message,
            )
            .optional()?;
        Ok(msg)
    }

    /// Grab a free connection, starting at the round-robin slot.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        let n = self.conns.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % n;
        for offset in 0..n {
            match self.conns[(start + offset) % n].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => return Err(StorageError::Poisoned),
            }
        }
        // All busy: wait for our slot.
        self.conns[start].lock().map_err(|_| StorageError::Poisoned)
    }
}

impl MessageStore for SqliteStore {
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
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (id, identity, ciphertext, key, created_at, lifetime_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_ref(),
                identity.as_str(),
                ciphertext,
                key,
                created_at as i64,
                lifetime_secs as i64
            ],
        )?;
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, identity, ciphertext, key, created_at, lifetime_secs FROM messages",
        )?;
        let rows = stmt.query_map([], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn delete_by_id(&self, id: &MessageId) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM messages WHERE id = ?1", params![id.as_ref()])?;
        Ok(changed > 0)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn configure(conn: &Connection) -> Result<(), StorageError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: MessageId(row.get(0)?),
        identity: Identity(row.get(1)?),
        ciphertext: row.get(2)?,
        key: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        lifetime_secs: row.get::<_, i64>(5)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn alice() -> Identity {
        Identity::from("alice")
    }

    #[test]
    fn in_memory_insert_list_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert(&alice(), "n:c", "key", 1_000, 300).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].created_at, 1_000);
        assert_eq!(all[0].lifetime_secs, 300);

        assert!(store.delete_by_id(&id).unwrap());
        assert!(!store.delete_by_id(&id).unwrap());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn get_single_message() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert(&alice(), "n:c", "key", 1_000, 1).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().identity, alice());
        assert!(store.get(&MessageId::from("msg-missing")).unwrap().is_none());
    }

    #[test]
    fn zero_lifetime_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.insert(&alice(), "x", "k", 0, 0),
            Err(StorageError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.sqlite3");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(&alice(), "n:c", "key", 42, 10).unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].created_at, 42);
    }

    #[test]
    fn concurrent_inserts_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("m.sqlite3")).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let who = Identity(format!("user{t}"));
                    let mut ids = Vec::new();
                    for i in 0..25 {
                        ids.push(store.insert(&who, "n:c", "k", i, 60).unwrap());
                    }
                    // Delete every other one, twice
                    for id in ids.iter().step_by(2) {
                        assert!(store.delete_by_id(id).unwrap());
                        assert!(!store.delete_by_id(id).unwrap());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 4 * 12);
    }
}
