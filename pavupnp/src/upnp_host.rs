//! Extension UPnP du serveur HTTP.
//!
//! Ce module fournit le trait [`UpnpHost`] qui étend [`Server`] avec
//! l'enregistrement de devices UPnP, et le câblage vers le serveur SSDP.
//!
//! # Architecture
//!
//! ```text
//! server::Server
//!     + UpnpHost trait
//!     + DeviceRegistry (stockage global)
//!     + SsdpServer (annonces)
//! ```

use std::fs;
use std::sync::Arc;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use tracing::info;

use crate::config::get_config;
use crate::dataelements::Udn;
use crate::devices::{Device, DeviceError, DeviceInstance, DeviceRegistry};
use crate::errors::UpnpError;
use crate::server::Server;
use crate::ssdp::{SsdpAdvertisedDevice, SsdpServer};

/// Registre de devices global et thread-safe.
///
/// Les handlers Axum s'exécutent sur des threads arbitraires ; le registre
/// doit donc être partagé globalement.
static DEVICE_REGISTRY: Lazy<RwLock<DeviceRegistry>> =
    Lazy::new(|| RwLock::new(DeviceRegistry::new()));

/// Trait étendant un serveur avec des fonctionnalités de device host UPnP.
pub trait UpnpHost {
    /// Enregistre un device UPnP et toutes ses URLs.
    ///
    /// # Returns
    ///
    /// L'instance du device créée et enregistrée.
    async fn register_device(
        &mut self,
        device: Arc<Device>,
    ) -> Result<Arc<DeviceInstance>, DeviceError>;

    /// Retourne le nombre de devices enregistrés.
    fn device_count(&self) -> usize;

    /// Liste tous les devices enregistrés.
    fn list_devices(&self) -> Vec<Arc<DeviceInstance>>;

    /// Récupère un device par son UDN.
    fn get_device(&self, udn: &str) -> Option<Arc<DeviceInstance>>;
}

impl UpnpHost for Server {
    async fn register_device(
        &mut self,
        device: Arc<Device>,
    ) -> Result<Arc<DeviceInstance>, DeviceError> {
        let instance = DeviceInstance::new(device);

        instance.register_urls(self).await;

        DEVICE_REGISTRY.write().unwrap().register(instance.clone())?;

        Ok(instance)
    }

    fn device_count(&self) -> usize {
        DEVICE_REGISTRY.read().unwrap().count()
    }

    fn list_devices(&self) -> Vec<Arc<DeviceInstance>> {
        DEVICE_REGISTRY.read().unwrap().list_devices()
    }

    fn get_device(&self, udn: &str) -> Option<Arc<DeviceInstance>> {
        DEVICE_REGISTRY.read().unwrap().get_device(udn)
    }
}

/// Annonce un device enregistré sur le serveur SSDP : le device est
/// converti en jeu d'identifiants de ressources (`upnp:rootdevice`, UDN,
/// types de devices et de services de tout l'arbre).
pub fn advertise_device(ssdp: &SsdpServer, instance: &DeviceInstance) {
    let config = get_config();
    let mut advertised = SsdpAdvertisedDevice::new(
        instance.udn().clone(),
        instance.location(),
        config.server_token.clone(),
    );
    for identifier in instance.resource_identifiers() {
        advertised.add_notification_type(identifier);
    }
    info!(
        "📢 Advertising {} ({} resource identifiers)",
        instance.name(),
        advertised.notification_types().len()
    );
    ssdp.add_device(advertised);
}

/// Retire un device du serveur SSDP (rafale de byebye) et du registre.
pub fn withdraw_device(ssdp: &SsdpServer, udn: &Udn) {
    ssdp.remove_device(udn);
    DEVICE_REGISTRY.write().unwrap().remove(udn.as_str());
}

/// Charge le modèle de device désigné par `path_to_device_description`.
pub fn load_configured_device() -> Result<Option<Device>, UpnpError> {
    let config = get_config();
    let Some(path) = config.path_to_device_description else {
        return Ok(None);
    };
    let xml = fs::read_to_string(&path).map_err(|e| {
        UpnpError::InvalidConfiguration(format!("cannot read device description '{}': {}", path, e))
    })?;
    let device = Device::from_description_xml(&xml)
        .map_err(|e| UpnpError::InvalidDeviceDescription(e.to_string()))?;
    Ok(Some(device))
}

/// Exécute une closure avec un accès en lecture seule aux devices.
pub fn with_devices<F, R>(f: F) -> R
where
    F: FnOnce(&Vec<Arc<DeviceInstance>>) -> R,
{
    let devices = DEVICE_REGISTRY.read().unwrap().list_devices();
    f(&devices)
}

/// Récupère un device par son UDN depuis n'importe quel thread.
pub fn get_device_by_udn(udn: &str) -> Option<Arc<DeviceInstance>> {
    DEVICE_REGISTRY.read().unwrap().get_device(udn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerBuilder;

    #[tokio::test]
    async fn test_device_registration() {
        let mut server = ServerBuilder::new("TestServer", "http://localhost:8080", 8080).build();

        let mut model = Device::new("test-light", "Light", "Test Light");
        model.set_udn("uuid:test-light-1".parse().unwrap());

        let instance = server.register_device(Arc::new(model)).await.unwrap();

        assert_eq!(instance.udn().as_str(), "uuid:test-light-1");
        assert!(server.get_device("uuid:test-light-1").is_some());

        // double enregistrement du même UDN : refusé
        let mut duplicate = Device::new("test-light-2", "Light", "Test Light 2");
        duplicate.set_udn("uuid:test-light-1".parse().unwrap());
        assert!(server.register_device(Arc::new(duplicate)).await.is_err());

        DEVICE_REGISTRY.write().unwrap().remove("uuid:test-light-1");
    }
}
