//! Registre des devices publiés, indexés par UDN.

use std::collections::HashMap;
use std::sync::Arc;

use crate::devices::{DeviceError, DeviceInstance};

/// Registre des devices racines du host.
///
/// Invariant : deux devices du host n'ont jamais le même UDN. Les devices
/// disposés restent stockés mais n'apparaissent plus dans les lookups.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Arc<DeviceInstance>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre un device racine ; refuse un UDN déjà présent.
    pub fn register(&mut self, device: Arc<DeviceInstance>) -> Result<(), DeviceError> {
        let udn = device.udn().as_str().to_string();
        if self.devices.contains_key(&udn) {
            return Err(DeviceError::DeviceAlreadyExists(udn));
        }
        self.devices.insert(udn, device);
        Ok(())
    }

    /// Device par UDN ; les devices disposés sont invisibles.
    pub fn get_device(&self, udn: &str) -> Option<Arc<DeviceInstance>> {
        self.devices
            .get(udn)
            .filter(|d| !d.is_disposed())
            .cloned()
    }

    /// Tous les devices vivants.
    pub fn list_devices(&self) -> Vec<Arc<DeviceInstance>> {
        self.devices
            .values()
            .filter(|d| !d.is_disposed())
            .cloned()
            .collect()
    }

    /// Nombre de devices vivants.
    pub fn count(&self) -> usize {
        self.devices.values().filter(|d| !d.is_disposed()).count()
    }

    /// Retire un device du registre.
    pub fn remove(&mut self, udn: &str) -> Option<Arc<DeviceInstance>> {
        self.devices.remove(udn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Device;

    fn instance(udn: &str) -> Arc<DeviceInstance> {
        let mut model = Device::new("light", "Light", "Hall Light");
        model.set_udn(udn.parse().unwrap());
        DeviceInstance::new(Arc::new(model))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DeviceRegistry::new();
        registry.register(instance("uuid:A")).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.get_device("uuid:A").is_some());
        assert!(registry.get_device("uuid:B").is_none());
    }

    #[test]
    fn test_duplicate_udn_rejected() {
        let mut registry = DeviceRegistry::new();
        registry.register(instance("uuid:A")).unwrap();
        assert!(matches!(
            registry.register(instance("uuid:A")),
            Err(DeviceError::DeviceAlreadyExists(_))
        ));
    }

    #[test]
    fn test_disposed_devices_are_hidden() {
        let mut registry = DeviceRegistry::new();
        let device = instance("uuid:A");
        registry.register(Arc::clone(&device)).unwrap();

        device.dispose();
        assert!(registry.get_device("uuid:A").is_none());
        assert_eq!(registry.count(), 0);
        assert!(registry.list_devices().is_empty());
    }
}
