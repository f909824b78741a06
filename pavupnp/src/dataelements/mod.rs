//! # Module DataElements - Identifiants typés UPnP
//!
//! Ce module regroupe les identifiants de l'UPnP Device Architecture sous
//! forme de types validés à la construction.
//!
//! ## Fonctionnalités
//!
//! - ✅ UDN (`uuid:<uuid>`) avec niveau strict optionnel
//! - ✅ Types de devices/services (`urn:<domain>:device|service:<name>:<ver>`)
//! - ✅ ServiceId (`urn:<domain>:serviceId:<id>`)
//! - ✅ USN composite (UDN + ressource)
//! - ✅ Product tokens (`OS/ver UPnP/ver produit/ver`) avec parsing tolérant
//! - ✅ Métadonnées de device avec avertissements de longueur UDA

mod device_info;
mod endpoint;
mod product_tokens;
mod resource_type;
mod udn;
mod usn;

pub use device_info::{DeviceIcon, DeviceInfo, ModelInfo, ServiceInfo};
pub use endpoint::Endpoint;
pub use product_tokens::{ProductToken, ProductTokens};
pub use resource_type::{ResourceType, ResourceTypeKind, ServiceId};
pub use udn::Udn;
pub use usn::{ResourceIdentifier, Usn};

use thiserror::Error;

/// Erreurs de parsing des identifiants UPnP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataElementError {
    #[error("invalid UDN '{0}': missing 'uuid:' prefix or empty suffix")]
    InvalidUdn(String),

    #[error("invalid resource type '{0}'")]
    InvalidResourceType(String),

    #[error("invalid service id '{0}'")]
    InvalidServiceId(String),

    #[error("invalid USN '{0}'")]
    InvalidUsn(String),

    #[error("invalid resource identifier '{0}'")]
    InvalidResourceIdentifier(String),

    #[error("invalid product tokens '{0}'")]
    InvalidProductTokens(String),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}
