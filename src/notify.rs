use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for scheduling events, one channel per barber. Feeds
/// realtime consumers: the agenda UI, the POS, push notifications.
///
/// Shop-wide events (catalog edits, shop-wide blocks) go out on the
/// `Ulid::nil()` channel.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a barber. Creates the channel if needed.
    pub fn subscribe(&self, barber_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(barber_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to shop-wide notifications.
    pub fn subscribe_shop(&self) -> broadcast::Receiver<Event> {
        self.subscribe(Ulid::nil())
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, barber_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&barber_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a barber is retired for good).
    pub fn remove(&self, barber_id: &Ulid) {
        self.channels.remove(barber_id);
    }
}
