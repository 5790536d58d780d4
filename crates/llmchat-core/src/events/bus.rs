//! Ordered in-process event fan-out.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::AppEvent;
use crate::ports::AppEventEmitter;

/// Emitter that delivers every event to every live subscriber.
///
/// Each subscriber gets its own unbounded channel, so delivery is lossless and
/// preserves emission order. Subscribers whose receiver was dropped are pruned
/// on the next emit.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<AppEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive all events emitted after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AppEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl AppEventEmitter for EventBus {
    fn emit(&self, event: AppEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(AppEvent::model_removed("a"));
        bus.emit(AppEvent::model_removed("b"));
        bus.emit(AppEvent::selection_changed(None));

        assert_eq!(rx.recv().await, Some(AppEvent::model_removed("a")));
        assert_eq!(rx.recv().await, Some(AppEvent::model_removed("b")));
        assert_eq!(rx.recv().await, Some(AppEvent::selection_changed(None)));
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(AppEvent::model_removed("m"));

        assert_eq!(first.recv().await, Some(AppEvent::model_removed("m")));
        assert_eq!(second.recv().await, Some(AppEvent::model_removed("m")));
    }

    #[test]
    fn test_dropped_subscribers_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _kept = bus.subscribe();
        drop(rx);

        bus.emit(AppEvent::model_removed("m"));
        assert_eq!(bus.subscriber_count(), 1);
    }
}
