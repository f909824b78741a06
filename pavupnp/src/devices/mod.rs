//! # Module Devices - Devices UPnP côté host
//!
//! Un [`Device`] est le modèle (métadonnées, services, sous-devices) ;
//! une [`DeviceInstance`] est l'arbre vivant publié : UDN, description XML,
//! routes HTTP. Le [`DeviceRegistry`] indexe les racines par UDN.

mod device;
mod device_instance;
mod device_registry;

pub use device::{Device, DeviceFactory};
pub use device_instance::DeviceInstance;
pub use device_registry::DeviceRegistry;

use thiserror::Error;

/// Erreurs liées aux devices UPnP.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Service déjà existant
    #[error("Service '{0}' already exists in device")]
    ServiceAlreadyExists(String),

    /// Device déjà existant (UDN dupliqué)
    #[error("Device '{0}' already exists")]
    DeviceAlreadyExists(String),

    /// Version invalide
    #[error("Device version must be > 0")]
    InvalidVersion,

    /// Description de device inexploitable
    #[error("Invalid device description: {0}")]
    InvalidDescription(String),

    /// Erreur d'enregistrement d'URL
    #[error("Failed to register URL: {0}")]
    UrlRegistrationError(String),
}
