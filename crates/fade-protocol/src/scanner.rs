/// ExpiryScanner: removes messages whose lifetime has elapsed.
///
/// One sweep: list the store, delete every row whose remaining time is 0,
/// and publish `message-expired` for each row this sweep actually removed.
/// The event always follows the delete. A row someone else already
/// deleted (`Ok(false)`) is skipped silently, so repeated sweeps over the
/// same id are no-ops. A failed delete is logged and retried next sweep.
///
/// Sweeps look only at timestamps; ciphertext is never decrypted here.
use std::sync::Arc;

use crate::hub::BroadcastHub;
use crate::protocol::ServerEvent;
use crate::store::MessageStore;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows examined.
    pub scanned: usize,
    /// Rows deleted (one event published per row).
    pub expired: usize,
    /// Rows whose delete failed; left for the next sweep.
    pub failed: usize,
}

pub struct ExpiryScanner {
    store: Arc<dyn MessageStore>,
    hub: BroadcastHub,
}

impl ExpiryScanner {
    pub fn new(store: Arc<dyn MessageStore>, hub: BroadcastHub) -> Self {
        Self { store, hub }
    }

    /// Run one sweep as of `now` (Unix ms).
    pub fn sweep(&self, now: u64) -> SweepReport {
        let mut report = SweepReport::default();

        let messages = match self.store.list_all() {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep: list failed, skipping cycle");
                return report;
            }
        };
        report.scanned = messages.len();

        for msg in messages.iter().filter(|m| m.is_expired(now)) {
            match self.store.delete_by_id(&msg.id) {
                Ok(true) => {
                    report.expired += 1;
                    let delivered = self
                        .hub
                        .publish(&ServerEvent::MessageExpired { id: msg.id.clone() })
                        .delivered;
                    tracing::debug!(
                        id = %msg.id,
                        identity = %msg.identity,
                        delivered,
                        "message expired"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        id = %msg.id,
                        error = %e,
                        "expiry sweep: delete failed, will retry"
                    );
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                failed = report.failed,
                "expiry sweep"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::message::StoredMessage;
    use crate::store::MemoryStore;
    use crate::types::{Identity, MessageId};
    use std::sync::Mutex;

    fn setup() -> (Arc<MemoryStore>, BroadcastHub, ExpiryScanner) {
        let store = Arc::new(MemoryStore::new());
        let hub = BroadcastHub::default();
        let scanner = ExpiryScanner::new(store.clone(), hub.clone());
        (store, hub, scanner)
    }

    #[test]
    fn sweep_deletes_expired_and_publishes_once() {
        let (store, hub, scanner) = setup();
        let mut sub = hub.connect(&Identity::from("viewer"));
        let alice = Identity::from("alice");
        let short = store.insert(&alice, "x", "k", 0, 1).unwrap();
        let long = store.insert(&alice, "x", "k", 0, 600).unwrap();

        // Not yet at 999 ms
        assert_eq!(scanner.sweep(999).expired, 0);

        let report = scanner.sweep(2_000);
        assert_eq!(report, SweepReport { scanned: 2, expired: 1, failed: 0 });
        assert_eq!(sub.try_recv(), Some(ServerEvent::MessageExpired { id: short.clone() }));
        assert_eq!(sub.try_recv(), None);

        assert!(!store.has(&short));
        assert!(store.has(&long));
    }

    #[test]
    fn repeated_sweeps_are_noops() {
        let (store, hub, scanner) = setup();
        let mut sub = hub.connect(&Identity::from("viewer"));
        store.insert(&Identity::from("alice"), "x", "k", 0, 1).unwrap();

        assert_eq!(scanner.sweep(1_000).expired, 1);
        assert_eq!(scanner.sweep(1_000).expired, 0);
        assert_eq!(scanner.sweep(5_000).expired, 0);

        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    /// Store whose deletes fail for one id and report "already gone" for another.
    struct FlakyStore {
        inner: MemoryStore,
        broken: Mutex<Option<MessageId>>,
        vanished: Mutex<Option<MessageId>>,
    }

    impl MessageStore for FlakyStore {
        fn insert(
            &self,
            identity: &Identity,
            ciphertext: &str,
            key: &str,
            created_at: u64,
            lifetime_secs: u64,
        ) -> Result<MessageId, StorageError> {
            self.inner.insert(identity, ciphertext, key, created_at, lifetime_secs)
        }

        fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError> {
            self.inner.list_all()
        }

        fn delete_by_id(&self, id: &MessageId) -> Result<bool, StorageError> {
            if self.broken.lock().unwrap().as_ref() == Some(id) {
                return Err(StorageError::Poisoned);
            }
            if self.vanished.lock().unwrap().as_ref() == Some(id) {
                self.inner.delete_by_id(id)?;
                return Ok(false);
            }
            self.inner.delete_by_id(id)
        }

        fn len(&self) -> Result<usize, StorageError> {
            self.inner.len()
        }
    }

    #[test]
    fn failed_delete_does_not_abort_sweep_and_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            broken: Mutex::new(None),
            vanished: Mutex::new(None),
        });
        let hub = BroadcastHub::default();
        let scanner = ExpiryScanner::new(store.clone(), hub.clone());
        let mut sub = hub.connect(&Identity::from("viewer"));

        let alice = Identity::from("alice");
        let bad = store.insert(&alice, "x", "k", 0, 1).unwrap();
        let good = store.insert(&alice, "x", "k", 0, 1).unwrap();
        let raced = store.insert(&alice, "x", "k", 0, 1).unwrap();
        *store.broken.lock().unwrap() = Some(bad.clone());
        *store.vanished.lock().unwrap() = Some(raced);

        let report = scanner.sweep(1_000);
        assert_eq!(report, SweepReport { scanned: 3, expired: 1, failed: 1 });
        assert_eq!(sub.try_recv(), Some(ServerEvent::MessageExpired { id: good }));
        assert_eq!(sub.try_recv(), None);

        // Store recovers; next sweep picks up the leftover row
        *store.broken.lock().unwrap() = None;
        let report = scanner.sweep(2_000);
        assert_eq!(report, SweepReport { scanned: 1, expired: 1, failed: 0 });
        assert_eq!(sub.try_recv(), Some(ServerEvent::MessageExpired { id: bad }));
    }

    #[test]
    fn corrupt_ciphertext_still_expires() {
        let (store, _hub, scanner) = setup();
        store
            .insert(&Identity::from("alice"), "garbage", "not-a-key", 0, 1)
            .unwrap();
        assert_eq!(scanner.sweep(1_000).expired, 1);
        assert!(store.is_empty().unwrap());
    }
}
