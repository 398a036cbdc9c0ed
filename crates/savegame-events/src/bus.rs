//! EventBus - synchronous typed pub/sub.
//!
//! Handlers run on the publishing thread in subscription order. Channel
//! subscribers get a clone of every event through `mpsc`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::{EventError, Result};

/// Identifies a handler registered with [`EventBus::subscribe`].
pub type SubscriptionId = u64;

type Handler<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

/// Thread-safe publish/subscribe bus for one event type.
///
/// # Delivery
///
/// - **Handlers** are invoked synchronously, in the order they subscribed.
///   A handler that returns an error or panics is logged and skipped; the
///   remaining handlers still see the event.
/// - **Channels** receive a clone of each event after the handlers ran.
///   Disconnected receivers are dropped on the next publish.
///
/// The handler list is snapshotted before delivery, so a handler may
/// subscribe or unsubscribe without deadlocking the bus.
pub struct EventBus<E> {
    next_id: AtomicU64,
    handlers: Arc<RwLock<Vec<(SubscriptionId, Handler<E>)>>>,
    channels: Arc<RwLock<Vec<Sender<E>>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Arc::new(RwLock::new(Vec::new())),
            channels: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a handler and returns its subscription id.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push((id, Arc::new(handler)));
        }
        id
    }

    /// Removes a handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|e| EventError::LockPoisoned(e.to_string()))?;

        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        if handlers.len() == before {
            return Err(EventError::NotFound(id));
        }
        Ok(())
    }

    /// Subscribes through a channel.
    ///
    /// The receiver is disconnected when the bus is dropped.
    pub fn subscribe_channel(&self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut channels) = self.channels.write() {
            channels.push(tx);
        }
        rx
    }

    /// Delivers an event to every subscriber.
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(e) => {
                warn!(error = %e, "event handlers unavailable");
                Vec::new()
            }
        };

        for (id, handler) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(subscription = id, error = %e, "event handler failed"),
                Err(_) => warn!(subscription = id, "event handler panicked"),
            }
        }

        if let Ok(mut channels) = self.channels.write() {
            channels.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(move |n: &u32| {
                seen.lock().unwrap().push(format!("{tag}:{n}"));
                Ok(())
            });
        }

        bus.publish(&7);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:7", "second:7", "third:7"]
        );
    }

    #[test]
    fn test_failing_handlers_do_not_block_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let delivered = Arc::new(Mutex::new(0));

        bus.subscribe(|_| Err(EventError::Handler("refused".into())));
        bus.subscribe(|_| panic!("subscriber bug"));
        let d = delivered.clone();
        bus.subscribe(move |_| {
            *d.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(&1);
        bus.publish(&2);

        assert_eq!(*delivered.lock().unwrap(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let c = count.clone();
        let id = bus.subscribe(move |_| {
            *c.lock().unwrap() += 1;
            Ok(())
        });
        assert_eq!(bus.len(), 1);

        bus.publish(&1);
        bus.unsubscribe(id).unwrap();
        bus.publish(&2);

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(bus.is_empty());
        assert!(matches!(bus.unsubscribe(id), Err(EventError::NotFound(_))));
    }

    #[test]
    fn test_channel_subscribers() {
        let bus: EventBus<String> = EventBus::new();
        let rx1 = bus.subscribe_channel();
        let rx2 = bus.subscribe_channel();

        bus.publish(&"saved".to_string());

        assert_eq!(rx1.recv_timeout(Duration::from_secs(1)).unwrap(), "saved");
        assert_eq!(rx2.recv_timeout(Duration::from_secs(1)).unwrap(), "saved");
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let bus: EventBus<u32> = EventBus::new();
        let rx = bus.subscribe_channel();
        drop(rx);

        bus.publish(&1);

        assert_eq!(bus.channels.read().unwrap().len(), 0);
    }

    #[test]
    fn test_handler_can_subscribe_during_publish() {
        let bus: Arc<EventBus<u32>> = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.subscribe(move |_| {
            inner.subscribe(|_| Ok(()));
            Ok(())
        });

        bus.publish(&1);

        assert_eq!(bus.len(), 2);
    }
}
