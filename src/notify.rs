use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::limits::WATCH_CHANNEL_CAPACITY;
use crate::model::Event;

/// Per-layout change feed.
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

    /// Subscribe to a layout's events. Creates the channel if needed.
    pub fn subscribe(&self, layout_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(layout_id)
            .or_insert_with(|| broadcast::channel(WATCH_CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, layout_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&layout_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a layout's channel; open receivers see `Closed`.
    pub fn remove(&self, layout_id: &Ulid) {
        self.channels.remove(layout_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let lid = Ulid::new();
        let mut rx = hub.subscribe(lid);

        let event = Event::BoothRemoved { layout_id: lid, booth_id: Ulid::new() };
        hub.send(lid, &event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn feeds_are_per_layout() {
        let hub = NotifyHub::new();
        let (a, b) = (Ulid::new(), Ulid::new());
        let mut rx_a = hub.subscribe(a);
        hub.send(b, &Event::LayoutDeleted { id: b });
        assert!(matches!(rx_a.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let lid = Ulid::new();
        hub.send(lid, &Event::LayoutDeleted { id: lid });
    }

    #[tokio::test]
    async fn remove_closes_receivers() {
        let hub = NotifyHub::new();
        let lid = Ulid::new();
        let mut rx = hub.subscribe(lid);
        hub.remove(&lid);
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
    }
}
