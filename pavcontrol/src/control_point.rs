//! The control point facade: discovery, storage, actions and events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::info;
use uuid::Uuid;

use pavupnp::dataelements::ResourceType;
use pavupnp::errors::UpnpError;
use pavupnp::ssdp::SsdpClient;

use crate::builder::DeviceBuilder;
use crate::discovery::DiscoveryManager;
use crate::events::{ControlPointEvent, EventBus};
use crate::model::RemoteDevice;
use crate::registry::DeviceRegistry;
use crate::soap_client::invoke_service_action;
use crate::subscriptions::{SubscriptionManager, SubscriptionStatus};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// A UPnP control point: discovers devices, mirrors their trees, invokes
/// actions and tracks remote state through GENA events.
pub struct ControlPoint {
    registry: Arc<RwLock<DeviceRegistry>>,
    bus: EventBus,
    builder: Arc<DeviceBuilder>,
    subscriptions: Arc<SubscriptionManager>,
    ssdp: Arc<SsdpClient>,
    shutdown: Arc<AtomicBool>,
    started: AtomicBool,
}

impl ControlPoint {
    pub fn new() -> Result<Self, UpnpError> {
        let bus = EventBus::new();
        let registry = Arc::new(RwLock::new(DeviceRegistry::new(bus.clone())));
        let builder = Arc::new(DeviceBuilder::new(Arc::clone(&registry), bus.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let subscriptions =
            SubscriptionManager::start(Arc::clone(&registry), bus.clone(), Arc::clone(&shutdown))?;

        let ssdp = Arc::new(SsdpClient::new()?);

        Ok(Self {
            registry,
            bus,
            builder,
            subscriptions,
            ssdp,
            shutdown,
            started: AtomicBool::new(false),
        })
    }

    /// Starts the SSDP listener, the maintenance loop, and sends an
    /// initial `ssdp:all` search.
    pub fn start(&self) -> Result<(), UpnpError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(UpnpError::AlreadyInitialized(
                "control point already started".to_string(),
            ));
        }

        let mut discovery = DiscoveryManager::new(Arc::clone(&self.registry), Arc::clone(&self.builder));
        discovery.set_interest(None);

        {
            let ssdp = Arc::clone(&self.ssdp);
            thread::Builder::new()
                .name("ssdp-listener".into())
                .spawn(move || {
                    ssdp.run_event_loop(move |msg, _from| {
                        discovery.handle_ssdp_message(msg);
                    });
                })?;
        }

        // expiration périodique des devices dont le max-age est écoulé
        {
            let registry = Arc::clone(&self.registry);
            let shutdown = Arc::clone(&self.shutdown);
            thread::Builder::new()
                .name("device-expiry".into())
                .spawn(move || {
                    loop {
                        if shutdown.load(Ordering::SeqCst) {
                            return;
                        }
                        registry.write().unwrap().expire_lapsed(Instant::now());
                        thread::sleep(MAINTENANCE_INTERVAL);
                    }
                })?;
        }

        self.search("ssdp:all", 3)?;
        info!("✅ Control point started");
        Ok(())
    }

    /// Sends an M-SEARCH for the given target.
    pub fn search(&self, st: &str, mx: u32) -> Result<(), UpnpError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(UpnpError::ShuttingDown);
        }
        self.ssdp.send_msearch(st, mx)?;
        Ok(())
    }

    /// Root devices currently in storage.
    pub fn devices(&self) -> Vec<Arc<RemoteDevice>> {
        self.registry.read().unwrap().root_devices()
    }

    /// Device by UDN.
    pub fn device(&self, udn: &str) -> Option<Arc<RemoteDevice>> {
        self.registry.read().unwrap().search_by_udn(udn)
    }

    /// Devices carrying the wanted type (version >= requested).
    pub fn devices_of_type(&self, wanted: &ResourceType) -> Vec<Arc<RemoteDevice>> {
        self.registry.read().unwrap().search_by_type(wanted)
    }

    /// Subscribes to control point events (device added/removed, state
    /// variable changes, build failures).
    pub fn events(&self) -> Receiver<ControlPointEvent> {
        self.bus.subscribe()
    }

    /// Invokes an action on a service of a stored device.
    pub fn invoke(
        &self,
        udn: &str,
        service_id: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<HashMap<String, String>, UpnpError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(UpnpError::ShuttingDown);
        }
        let device = self
            .device(udn)
            .ok_or_else(|| UpnpError::OperationFailed(format!("unknown device {}", udn)))?;
        let service = device
            .find_service(service_id)
            .ok_or_else(|| UpnpError::OperationFailed(format!("unknown service {}", service_id)))?;
        invoke_service_action(&service, action, args)
    }

    /// Subscribes to a service's events; renewal is automatic.
    pub fn subscribe(&self, udn: &str, service_id: &str) -> Result<Uuid, UpnpError> {
        let device = self
            .device(udn)
            .ok_or_else(|| UpnpError::OperationFailed(format!("unknown device {}", udn)))?;
        let service = device
            .find_service(service_id)
            .ok_or_else(|| UpnpError::OperationFailed(format!("unknown service {}", service_id)))?;
        self.subscriptions.subscribe(udn, &service)
    }

    pub fn subscription_status(&self, id: Uuid) -> Option<SubscriptionStatus> {
        self.subscriptions.status(id)
    }

    /// Cancels a subscription with an UNSUBSCRIBE on the wire.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscriptions.unsubscribe(id);
    }

    /// Cooperative shutdown: stops discovery and builds, then attempts an
    /// UNSUBSCRIBE on every subscription within `timeout_ms`.
    pub fn shutdown(&self, timeout_ms: u64) {
        info!("Control point shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        self.ssdp.shutdown_flag().store(true, Ordering::SeqCst);
        self.builder.shutdown();
        self.subscriptions.cancel_all(timeout_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_start_is_already_initialized() {
        // pas de réseau requis : start() échoue proprement au second appel
        let Ok(control_point) = ControlPoint::new() else {
            // environnement sans réseau : rien à vérifier ici
            return;
        };
        if control_point.start().is_ok() {
            assert!(matches!(
                control_point.start(),
                Err(UpnpError::AlreadyInitialized(_))
            ));
        }
        control_point.shutdown(100);
    }

    #[test]
    fn test_invoke_unknown_device() {
        let Ok(control_point) = ControlPoint::new() else {
            return;
        };
        let err = control_point
            .invoke("uuid:ghost", "SwitchPower", "GetStatus", &[])
            .unwrap_err();
        assert!(matches!(err, UpnpError::OperationFailed(_)));
        control_point.shutdown(100);
    }
}
