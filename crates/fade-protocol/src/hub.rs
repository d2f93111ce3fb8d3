/// BroadcastHub: fan-out of room events to every connected client.
///
/// Registry: identity → set of live channels (one per tab/device). Every
/// channel is the sending half of a bounded queue; publishing never
/// awaits, it `try_send`s into each queue. A full or closed queue is an
/// implicit disconnect and the channel is dropped from the registry.
///
/// Per-channel order is the order `publish` was called. Across channels
/// there is no ordering promise.
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::FadeError;
use crate::protocol::ServerEvent;
use crate::types::Identity;

/// Default per-channel queue capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Hub-assigned handle for one client channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Channels the event was queued on.
    pub delivered: usize,
    /// Channels removed because the send failed.
    pub dropped: usize,
}

struct HubInner {
    subscribers: DashMap<Identity, HashMap<ChannelId, mpsc::Sender<ServerEvent>>>,
    next_channel: AtomicU64,
    buffer: usize,
}

/// Shared registry of subscriber channels. Cheap to clone.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub whose `connect` queues hold `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: DashMap::new(),
                next_channel: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register `sender` as a channel of `identity`.
    pub fn subscribe(&self, identity: &Identity, sender: mpsc::Sender<ServerEvent>) -> ChannelId {
        let channel = ChannelId(self.inner.next_channel.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .entry(identity.clone())
            .or_default()
            .insert(channel, sender);
        tracing::debug!(%identity, %channel, "channel subscribed");
        channel
    }

    /// Open a new queue for `identity` and subscribe it.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes it.
    pub fn connect(&self, identity: &Identity) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let channel = self.subscribe(identity, tx);
        Subscription {
            hub: self.clone(),
            identity: identity.clone(),
            channel,
            rx,
            closed: false,
        }
    }

    /// Remove a channel; drops the identity once it has no channels left.
    ///
    /// Returns `false` if the channel was not registered (already gone).
    pub fn unsubscribe(&self, identity: &Identity, channel: ChannelId) -> bool {
        let Entry::Occupied(mut entry) = self.inner.subscribers.entry(identity.clone()) else {
            return false;
        };
        let removed = entry.get_mut().remove(&channel).is_some();
        if entry.get().is_empty() {
            entry.remove();
        }
        if removed {
            tracing::debug!(%identity, %channel, "channel unsubscribed");
        }
        removed
    }

    /// Queue `event` on every channel of every identity.
    ///
    /// A channel whose queue is full or closed is unsubscribed; the rest
    /// still get the event.
    pub fn publish(&self, event: &ServerEvent) -> PublishReport {
        let mut report = PublishReport::default();
        let mut failed = Vec::new();

        for entry in self.inner.subscribers.iter() {
            for (channel, tx) in entry.value() {
                match tx.try_send(event.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        failed.push((entry.key().clone(), *channel, "queue full"));
                    }
                    Err(TrySendError::Closed(_)) => {
                        failed.push((entry.key().clone(), *channel, "channel closed"));
                    }
                }
            }
        }

        // Registry locks are released before removal.
        for (identity, channel, reason) in failed {
            let err = FadeError::Channel {
                channel,
                reason: reason.into(),
            };
            tracing::warn!(%identity, error = %err, "dropping subscriber");
            if self.unsubscribe(&identity, channel) {
                report.dropped += 1;
            }
        }

        report
    }

    /// Number of identities with at least one channel.
    pub fn identity_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Total live channels across all identities.
    pub fn channel_count(&self) -> usize {
        self.inner.subscribers.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_connected(&self, identity: &Identity) -> bool {
        self.inner.subscribers.contains_key(identity)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// One connected client's view of the hub.
///
/// Receives every published event. Unsubscribes on `close` or drop.
pub struct Subscription {
    hub: BroadcastHub,
    identity: Identity,
    channel: ChannelId,
    rx: mpsc::Receiver<ServerEvent>,
    closed: bool,
}

impl Subscription {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel
    }

    /// Next event, or `None` once the hub dropped this channel.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }

    /// Unsubscribe now. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hub.unsubscribe(&self.identity, self.channel);
            self.rx.close();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
