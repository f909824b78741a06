//! Control-point storage: root device trees keyed by UDN.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use pavupnp::dataelements::ResourceType;

use crate::events::{ControlPointEvent, EventBus};
use crate::model::RemoteDevice;

struct DeviceEntry {
    device: Arc<RemoteDevice>,
    expires_at: Instant,
}

/// Registry of discovered root devices.
///
/// A UDN uniquely keys an owned device tree. Installation is atomic under
/// the registry lock held by the caller; insertion and removal fire
/// `DeviceAdded` / `DeviceRemoved` on the event bus.
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceEntry>,
    bus: EventBus,
}

impl DeviceRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            devices: HashMap::new(),
            bus,
        }
    }

    /// Installs (or replaces) a root device tree and schedules its expiry
    /// at `now + max_age`.
    pub fn insert(&mut self, device: Arc<RemoteDevice>) {
        let udn = device.udn().as_str().to_string();
        let expires_at = Instant::now() + Duration::from_secs(device.max_age().max(1) as u64);
        let replaced = self
            .devices
            .insert(
                udn.clone(),
                DeviceEntry {
                    device,
                    expires_at,
                },
            )
            .is_some();
        if replaced {
            debug!("Device {} replaced in storage", udn);
        } else {
            info!("✅ Device {} added to storage", udn);
        }
        self.bus.broadcast(ControlPointEvent::DeviceAdded { udn });
    }

    /// Pushes back the expiry of a device whose alive was just seen.
    pub fn refresh_presence(&mut self, udn: &str, max_age: u32) {
        if let Some(entry) = self.devices.get_mut(udn) {
            entry.expires_at = Instant::now() + Duration::from_secs(max_age.max(1) as u64);
        }
    }

    pub fn contains(&self, udn: &str) -> bool {
        self.devices.contains_key(udn)
    }

    /// Stored boot id of a device, if any.
    pub fn boot_id(&self, udn: &str) -> Option<u32> {
        self.devices.get(udn).and_then(|e| e.device.boot_id())
    }

    /// Removes a device tree; subscriptions held against it are dropped by
    /// the subscription manager on its next maintenance pass.
    pub fn remove(&mut self, udn: &str) -> Option<Arc<RemoteDevice>> {
        let removed = self.devices.remove(udn).map(|e| e.device);
        if removed.is_some() {
            info!("❌ Device {} removed from storage", udn);
            self.bus.broadcast(ControlPointEvent::DeviceRemoved {
                udn: udn.to_string(),
            });
        }
        removed
    }

    /// Expires devices whose cache-control lifetime has lapsed.
    pub fn expire_lapsed(&mut self, now: Instant) -> Vec<Arc<RemoteDevice>> {
        let lapsed: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(udn, _)| udn.clone())
            .collect();
        lapsed
            .into_iter()
            .filter_map(|udn| self.remove(&udn))
            .collect()
    }

    pub fn search_by_udn(&self, udn: &str) -> Option<Arc<RemoteDevice>> {
        self.devices.get(udn).map(|e| Arc::clone(&e.device))
    }

    /// Root devices whose tree carries a device of the wanted type
    /// (version >= requested).
    pub fn search_by_type(&self, wanted: &ResourceType) -> Vec<Arc<RemoteDevice>> {
        self.devices
            .values()
            .filter(|e| e.device.matches_device_type(wanted))
            .map(|e| Arc::clone(&e.device))
            .collect()
    }

    pub fn root_devices(&self) -> Vec<Arc<RemoteDevice>> {
        self.devices.values().map(|e| Arc::clone(&e.device)).collect()
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }
}
