/// ChatRoom: one shared room wiring every lifecycle component together.
///
/// Send path:
///   validate → record activity → TTL → fresh key → encrypt → seal key →
///   insert → publish `new-message`
///
/// Independently, `start()` runs the expiry sweep (every second by
/// default) and the activity janitor (every minute) until the returned
/// [`RoomHandle`] is shut down.
///
/// All operations are synchronous and non-blocking; the room is cheap to
/// clone and safe to share across connection tasks.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::activity::ActivityTracker;
use crate::config::RoomConfig;
use crate::crypto::{self, KeySealer, MessageKey};
use crate::error::FadeError;
use crate::hub::{BroadcastHub, Subscription};
use crate::message::{ActiveMessage, StoredMessage};
use crate::protocol::{validate_text, ClientEvent, ServerEvent};
use crate::scanner::{ExpiryScanner, SweepReport};
use crate::schedule::ScheduledTask;
use crate::store::MessageStore;
use crate::types::{Clock, Identity, SystemClock};

struct RoomInner {
    config: RoomConfig,
    store: Arc<dyn MessageStore>,
    hub: BroadcastHub,
    activity: ActivityTracker,
    scanner: ExpiryScanner,
    sealer: KeySealer,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct ChatRoom {
    inner: Arc<RoomInner>,
}

impl ChatRoom {
    /// Room over `store`, on the wall clock.
    pub fn new(store: Arc<dyn MessageStore>, config: RoomConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Room over `store`, reading time from `clock`.
    pub fn with_clock(
        store: Arc<dyn MessageStore>,
        config: RoomConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let hub = BroadcastHub::new(config.subscriber_buffer);
        let activity = ActivityTracker::new(config.activity_window);
        let scanner = ExpiryScanner::new(store.clone(), hub.clone());
        let sealer = config.key_sealer();
        if sealer.is_sealed() {
            tracing::info!("message keys sealed under master key");
        }
        Self {
            inner: Arc::new(RoomInner {
                config,
                store,
                hub,
                activity,
                scanner,
                sealer,
                clock,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.inner.hub
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.inner.store
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.inner.activity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // ── Send path ────────────────────────────────────────────────────────

    /// Post `text` as `identity` and broadcast it to every channel.
    pub fn send(&self, identity: &Identity, text: &str) -> Result<ActiveMessage, FadeError> {
        if self.is_closed() {
            return Err(FadeError::Shutdown);
        }
        validate_text(text, self.inner.config.max_message_chars)?;

        let now = self.inner.clock.now_ms();
        let recent = self.inner.activity.record_and_count(identity, now);
        let lifetime_secs = self.inner.config.ttl_policy.lifetime(recent);

        let key = MessageKey::generate();
        let ciphertext = crypto::encrypt(text, &key)?;
        let stored_key = self.inner.sealer.seal(&key)?;

        let id = self
            .inner
            .store
            .insert(identity, &ciphertext, &stored_key, now, lifetime_secs)?;

        let stored = StoredMessage {
            id,
            identity: identity.clone(),
            ciphertext,
            key: stored_key,
            created_at: now,
            lifetime_secs,
        };
        let message = ActiveMessage::from_stored(&stored, text.to_string(), now);

        let report = self
            .inner
            .hub
            .publish(&ServerEvent::NewMessage(message.clone()));
        tracing::debug!(
            id = %message.id,
            %identity,
            recent,
            lifetime_secs,
            delivered = report.delivered,
            "message sent"
        );
        Ok(message)
    }

    /// Handle one raw frame from `identity`'s channel.
    ///
    /// On error the caller replies to that channel only, with
    /// [`ServerEvent::error`]; nothing is broadcast.
    pub fn handle_frame(
        &self,
        identity: &Identity,
        frame: &str,
    ) -> Result<ActiveMessage, FadeError> {
        let result = ClientEvent::parse(frame).and_then(|event| match event {
            ClientEvent::Chat { text } => self.send(identity, &text),
        });
        if let Err(e) = &result {
            match e {
                FadeError::Validation { .. } => {
                    tracing::debug!(%identity, error = %e, "rejected frame")
                }
                _ => tracing::warn!(%identity, error = %e, "send failed"),
            }
        }
        result
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Every live message, decrypted, oldest first.
    ///
    /// Expired rows still awaiting the sweep are filtered out. Rows that
    /// fail to decrypt are logged and skipped.
    pub fn list_active(&self) -> Result<Vec<ActiveMessage>, FadeError> {
        let now = self.inner.clock.now_ms();
        let mut active: Vec<ActiveMessage> = self
            .inner
            .store
            .list_all()?
            .into_iter()
            .filter(|m| !m.is_expired(now))
            .filter_map(|m| match self.open(&m) {
                Ok(text) => Some(ActiveMessage::from_stored(&m, text, now)),
                Err(e) => {
                    tracing::warn!(id = %m.id, error = %e, "skipping unreadable message");
                    None
                }
            })
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    fn open(&self, stored: &StoredMessage) -> Result<String, FadeError> {
        let key = self.inner.sealer.open(&stored.key)?;
        Ok(crypto::decrypt(&stored.ciphertext, &key)?)
    }

    // ── Channels ─────────────────────────────────────────────────────────

    /// Attach a new channel for `identity`. Drop it to disconnect.
    pub fn connect(&self, identity: &Identity) -> Subscription {
        self.inner.hub.connect(identity)
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// One expiry sweep at the current time.
    pub fn sweep_expired(&self) -> SweepReport {
        self.inner.scanner.sweep(self.inner.clock.now_ms())
    }

    /// Drop idle activity windows. Returns how many identities were removed.
    pub fn prune_activity(&self) -> usize {
        let removed = self.inner.activity.prune(self.inner.clock.now_ms());
        if removed > 0 {
            tracing::debug!(removed, tracked = self.inner.activity.tracked(), "activity pruned");
        }
        removed
    }

    /// Start the recurring sweep and janitor. Must be called inside a tokio runtime.
    pub fn start(&self) -> RoomHandle {
        let room = self.clone();
        let sweeper = ScheduledTask::spawn(
            "expiry-sweep",
            self.inner.config.sweep_interval,
            move || {
                room.sweep_expired();
            },
        );
        let room = self.clone();
        let janitor = ScheduledTask::spawn(
            "activity-prune",
            self.inner.config.activity_prune_interval,
            move || {
                room.prune_activity();
            },
        );
        tracing::info!(
            sweep_interval = ?self.inner.config.sweep_interval,
            prune_interval = ?self.inner.config.activity_prune_interval,
            "room started"
        );
        RoomHandle {
            room: self.clone(),
            sweeper,
            janitor,
        }
    }
}

/// Running background tasks of a started room.
pub struct RoomHandle {
    room: ChatRoom,
    sweeper: ScheduledTask,
    janitor: ScheduledTask,
}

impl RoomHandle {
    pub fn room(&self) -> &ChatRoom {
        &self.room
    }

    /// Reject further sends and stop the recurring tasks.
    pub async fn shutdown(self) {
        self.room.inner.closed.store(true, Ordering::Release);
        let sweeps = self.sweeper.stop().await;
        let prunes = self.janitor.stop().await;
        tracing::info!(sweeps, prunes, "room shut down");
    }
}
