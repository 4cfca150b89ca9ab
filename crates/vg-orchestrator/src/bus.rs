//! In-process event bus
//!
//! Every component that reports progress publishes here; the command server
//! and the remote relay subscribe and decide what leaves the process. The bus
//! itself never filters.
//!
//! Delivery is synchronous and ordered: `publish` returns after every handler
//! registered at that moment has run. A re-entrant lock serializes delivery
//! across threads, so handlers never observe two messages interleaved while a
//! handler may still publish from inside its own callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;

use vg_core::time::current_time_millis;
use vg_protocol::{EventKind, EventMessage};

/// Callback invoked for every published message
pub type Handler = Arc<dyn Fn(&EventMessage) -> anyhow::Result<()> + Send + Sync>;

/// Synchronous multicast bus for stage and event messages
pub struct EventBus {
    /// Registered handlers in subscription order
    handlers: RwLock<Vec<(u64, Handler)>>,
    /// Serializes delivery across publishers
    delivery: ReentrantMutex<()>,
    /// Next subscription id
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            delivery: ReentrantMutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish an internal progress signal
    pub fn publish_stage(&self, name: &str, payload: Option<Value>) -> Arc<EventMessage> {
        self.publish(EventKind::Stage, name, payload)
    }

    /// Publish a business event
    pub fn publish_event(&self, name: &str, payload: Option<Value>) -> Arc<EventMessage> {
        self.publish(EventKind::Event, name, payload)
    }

    /// Stamp a message with the current time and deliver it to all handlers
    pub fn publish(&self, kind: EventKind, name: &str, payload: Option<Value>) -> Arc<EventMessage> {
        let message = Arc::new(EventMessage::new(kind, name, payload, current_time_millis()));

        let _delivery = self.delivery.lock();
        let handlers: Vec<(u64, Handler)> = self.handlers.read().clone();

        tracing::trace!(
            "Delivering {} {} to {} handlers",
            message.kind,
            message.name,
            handlers.len()
        );

        for (id, handler) in &handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Subscriber {} failed to handle {} {}: {:#}",
                        id,
                        message.kind,
                        message.name,
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "Subscriber {} panicked while handling {} {}",
                        id,
                        message.kind,
                        message.name
                    );
                }
            }
        }

        message
    }

    /// Register a handler
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&EventMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push((id, Arc::new(handler)));
        tracing::debug!("Subscriber {} registered", id);

        Subscription {
            bus: Arc::downgrade(self),
            id,
            active: true,
        }
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn remove(&self, id: u64) {
        let mut handlers = self.handlers.write();
        handlers.retain(|(existing, _)| *existing != id);
        tracing::debug!("Subscriber {} removed", id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle returned by [`EventBus::subscribe`]
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<EventBus>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Subscription id, as used in log lines
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler; takes effect before the next publish
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use vg_protocol::names;

    fn recorder(bus: &Arc<EventBus>) -> (Subscription, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = bus.subscribe(move |message| {
            sink.lock().push(message.name.clone());
            Ok(())
        });
        (subscription, seen)
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = Arc::new(EventBus::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut subs = Vec::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            subs.push(bus.subscribe(move |_| {
                order.lock().push(tag);
                Ok(())
            }));
        }

        bus.publish_stage(names::STEPPED_SCAN_STARTED, None);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_message_is_stamped() {
        let bus = Arc::new(EventBus::new());
        let message = bus.publish_event(names::NO_ISSUES_DETECTED, Some(serde_json::json!({"a": 1})));

        assert_eq!(message.kind, EventKind::Event);
        assert_eq!(message.name, names::NO_ISSUES_DETECTED);
        assert_eq!(message.payload["a"], 1);
        assert!(message.ts > 0);
    }

    #[test]
    fn test_failing_handler_does_not_stop_delivery() {
        let bus = Arc::new(EventBus::new());
        let _failing = bus.subscribe(|_| Err(anyhow::anyhow!("boom")));
        let _panicking = bus.subscribe(|_| panic!("handler exploded"));
        let (_sub, seen) = recorder(&bus);

        bus.publish_event(names::DETECTED_UNWANTED_APPS, None);
        bus.publish_event(names::NO_ISSUES_DETECTED, None);

        assert_eq!(
            *seen.lock(),
            vec![names::DETECTED_UNWANTED_APPS, names::NO_ISSUES_DETECTED]
        );
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let bus = Arc::new(EventBus::new());
        let (explicit, seen_explicit) = recorder(&bus);
        let (dropped, seen_dropped) = recorder(&bus);
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish_stage(names::SCAN_RESET, None);
        explicit.unsubscribe();
        drop(dropped);
        bus.publish_stage(names::SCAN_RESET, None);

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(seen_explicit.lock().len(), 1);
        assert_eq!(seen_dropped.lock().len(), 1);
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = Arc::new(EventBus::new());
        let (sub, _) = recorder(&bus);
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn test_handler_may_publish() {
        let bus = Arc::new(EventBus::new());
        let (_sub, seen) = recorder(&bus);

        let inner_bus = Arc::downgrade(&bus);
        let _chain = bus.subscribe(move |message| {
            if message.name == names::SCAN_STEP1_COMPLETED {
                if let Some(bus) = inner_bus.upgrade() {
                    bus.publish_stage(names::STEPPED_SCAN_COMPLETED, None);
                }
            }
            Ok(())
        });

        bus.publish_stage(names::SCAN_STEP1_COMPLETED, None);
        assert_eq!(
            *seen.lock(),
            vec![names::SCAN_STEP1_COMPLETED, names::STEPPED_SCAN_COMPLETED]
        );
    }

    #[test]
    fn test_handler_may_subscribe_during_delivery() {
        let bus = Arc::new(EventBus::new());
        let late = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&bus);
        let late_subs = Arc::clone(&late);
        let _sub = bus.subscribe(move |_| {
            if let Some(bus) = weak.upgrade() {
                late_subs.lock().push(bus.subscribe(|_| Ok(())));
            }
            Ok(())
        });

        bus.publish_stage(names::SCAN_RESET, None);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_concurrent_publishers_never_interleave() {
        let bus = Arc::new(EventBus::new());
        let in_delivery = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let overlaps = Arc::new(AtomicU64::new(0));

        let flag = Arc::clone(&in_delivery);
        let counter = Arc::clone(&overlaps);
        let _sub = bus.subscribe(move |_| {
            if flag.swap(true, Ordering::SeqCst) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::yield_now();
            flag.store(false, Ordering::SeqCst);
            Ok(())
        });

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        bus.publish_stage(names::SCAN_STEP1_COMPLETED, None);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
