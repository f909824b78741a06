use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Events observable by applications driving the control point.
#[derive(Debug, Clone)]
pub enum ControlPointEvent {
    /// A device tree was built and installed in storage.
    DeviceAdded { udn: String },

    /// A device left the network (byebye) or expired.
    DeviceRemoved { udn: String },

    /// A build task failed; not retried until a fresh alive is seen.
    BuildFailed { udn: String, reason: String },

    /// A NOTIFY updated a remote state variable.
    StateVariableChanged {
        udn: String,
        service_id: String,
        variable: String,
        value: String,
    },

    /// A subscription moved to the Failed state.
    SubscriptionFailed {
        udn: String,
        service_id: String,
        reason: String,
    },
}

/// Fan-out bus for control point events.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<ControlPointEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<ControlPointEvent> {
        let (tx, rx) = unbounded::<ControlPointEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: ControlPointEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.broadcast(ControlPointEvent::DeviceAdded {
            udn: "uuid:A".to_string(),
        });

        assert!(matches!(
            rx1.try_recv().unwrap(),
            ControlPointEvent::DeviceAdded { .. }
        ));
        assert!(matches!(
            rx2.try_recv().unwrap(),
            ControlPointEvent::DeviceAdded { .. }
        ));
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.broadcast(ControlPointEvent::DeviceRemoved {
            udn: "uuid:A".to_string(),
        });
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}
