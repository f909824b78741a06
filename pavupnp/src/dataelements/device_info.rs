//! Métadonnées de device et de service.

use tracing::warn;

use super::{ResourceType, ServiceId, Udn};

/// Informations de modèle d'un device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    pub description: Option<String>,
    pub name: String,
    pub number: Option<String>,
    pub url: Option<String>,
}

/// Icône déclarée dans une description de device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIcon {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
    /// Octets de l'image, une fois récupérée
    pub data: Option<Vec<u8>>,
}

/// Métadonnées immuables d'un device UPnP.
///
/// Les limites de longueur de l'UDA sont vérifiées à la construction mais
/// ne sont jamais fatales : un champ trop long produit un avertissement,
/// la valeur est conservée telle quelle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: ResourceType,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model: ModelInfo,
    pub serial_number: Option<String>,
    pub udn: Udn,
    pub upc: Option<String>,
    pub icons: Vec<DeviceIcon>,
    pub presentation_url: Option<String>,
}

impl DeviceInfo {
    pub fn new(
        device_type: ResourceType,
        friendly_name: impl Into<String>,
        manufacturer: impl Into<String>,
        model: ModelInfo,
        udn: Udn,
    ) -> Self {
        let info = Self {
            device_type,
            friendly_name: friendly_name.into(),
            manufacturer: manufacturer.into(),
            manufacturer_url: None,
            model,
            serial_number: None,
            udn,
            upc: None,
            icons: Vec::new(),
            presentation_url: None,
        };
        info.check_field_lengths();
        info
    }

    /// Avertissements non fatals sur les longueurs de champs de l'UDA.
    pub fn check_field_lengths(&self) {
        if self.friendly_name.len() > 64 {
            warn!("friendlyName longer than 64 characters: [{}]", self.friendly_name);
        }
        if self.manufacturer.len() > 64 {
            warn!("manufacturer longer than 64 characters: [{}]", self.manufacturer);
        }
        if let Some(desc) = &self.model.description {
            if desc.len() > 128 {
                warn!("modelDescription longer than 128 characters: [{}]", desc);
            }
        }
        if self.model.name.len() > 32 {
            warn!("modelName longer than 32 characters: [{}]", self.model.name);
        }
        if let Some(number) = &self.model.number {
            if number.len() > 32 {
                warn!("modelNumber longer than 32 characters: [{}]", number);
            }
        }
        if let Some(serial) = &self.serial_number {
            if serial.len() > 64 {
                warn!("serialNumber longer than 64 characters: [{}]", serial);
            }
        }
        if let Some(upc) = &self.upc {
            if !upc_is_acceptable(upc) {
                warn!("UPC should be a 12-digit, all-numeric code: [{}]", upc);
            }
        }
    }
}

/// Un UPC est un code à 12 chiffres ; la forme 13 caractères avec un tiret
/// ou une espace en position 6 est tolérée.
pub fn upc_is_acceptable(upc: &str) -> bool {
    match upc.len() {
        12 => upc.chars().all(|c| c.is_ascii_digit()),
        13 => upc.char_indices().all(|(i, c)| {
            if i == 6 {
                c == '-' || c == ' '
            } else {
                c.is_ascii_digit()
            }
        }),
        _ => false,
    }
}

/// Références d'un service telles que publiées dans la description du device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_id: ServiceId,
    pub service_type: ResourceType,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
    /// Au moins une variable d'état du service est événementielle
    pub evented: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> DeviceInfo {
        DeviceInfo::new(
            "urn:schemas-upnp-org:device:Light:1".parse().unwrap(),
            "Hall Light",
            "Pavillon",
            ModelInfo {
                description: None,
                name: "L-100".to_string(),
                number: Some("100".to_string()),
                url: None,
            },
            "uuid:5d794fc2-5c5e-4460-a023-f04a51363300".parse().unwrap(),
        )
    }

    #[test]
    fn test_construction() {
        let info = sample_info();
        assert_eq!(info.friendly_name, "Hall Light");
        assert_eq!(info.device_type.type_name(), "Light");
        assert!(info.icons.is_empty());
    }

    #[test]
    fn test_upc_acceptance() {
        assert!(upc_is_acceptable("123456789012"));
        assert!(upc_is_acceptable("123456-789012"));
        assert!(upc_is_acceptable("123456 789012"));
        assert!(!upc_is_acceptable("12345678901"));
        assert!(!upc_is_acceptable("1234567890123"));
        assert!(!upc_is_acceptable("12345678901a"));
        assert!(!upc_is_acceptable("123456789-012"));
    }

    #[test]
    fn test_overlong_fields_are_kept() {
        // trop long : avertissement seulement, la valeur reste intacte
        let mut info = sample_info();
        info.friendly_name = "x".repeat(80);
        info.check_field_lengths();
        assert_eq!(info.friendly_name.len(), 80);
    }
}
