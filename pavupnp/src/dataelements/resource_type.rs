//! Types de devices/services et ServiceId.

use std::fmt;
use std::str::FromStr;

use super::DataElementError;

/// Domaine des types standards définis par le forum UPnP.
const STANDARD_DOMAIN: &str = "schemas-upnp-org";

/// Catégorie d'un type de ressource UPnP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTypeKind {
    StandardDeviceType,
    VendorDeviceType,
    StandardServiceType,
    VendorServiceType,
}

/// Type de device ou de service, `urn:<domain>:device|service:<name>:<ver>`.
///
/// L'égalité porte sur la chaîne complète ; les comparaisons de versions sont
/// des comparaisons entières sur le suffixe numérique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType {
    urn: String,
    domain: String,
    kind: ResourceTypeKind,
    name: String,
    version: u32,
}

impl ResourceType {
    pub fn kind(&self) -> ResourceTypeKind {
        self.kind
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Nom du type, sans domaine ni version (ex: "MediaRenderer").
    pub fn type_name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_device_type(&self) -> bool {
        matches!(
            self.kind,
            ResourceTypeKind::StandardDeviceType | ResourceTypeKind::VendorDeviceType
        )
    }

    pub fn is_service_type(&self) -> bool {
        !self.is_device_type()
    }

    pub fn as_str(&self) -> &str {
        &self.urn
    }

    /// Même domaine, même catégorie et même nom, versions mises à part.
    pub fn is_same_type(&self, other: &ResourceType) -> bool {
        self.domain == other.domain
            && self.is_device_type() == other.is_device_type()
            && self.name == other.name
    }

    /// Retourne une copie du type avec une autre version.
    pub fn with_version(&self, version: u32) -> ResourceType {
        let what = if self.is_device_type() { "device" } else { "service" };
        ResourceType {
            urn: format!("urn:{}:{}:{}:{}", self.domain, what, self.name, version),
            domain: self.domain.clone(),
            kind: self.kind,
            name: self.name.clone(),
            version,
        }
    }
}

impl FromStr for ResourceType {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || DataElementError::InvalidResourceType(s.to_string());

        let rest = s.strip_prefix("urn:").ok_or_else(err)?;
        let mut parts = rest.splitn(4, ':');
        let domain = parts.next().ok_or_else(err)?;
        let what = parts.next().ok_or_else(err)?;
        let name = parts.next().ok_or_else(err)?;
        let version = parts.next().ok_or_else(err)?;

        if domain.is_empty() || name.is_empty() {
            return Err(err());
        }

        let version: u32 = version.parse().map_err(|_| err())?;

        let kind = match (what, domain == STANDARD_DOMAIN) {
            ("device", true) => ResourceTypeKind::StandardDeviceType,
            ("device", false) => ResourceTypeKind::VendorDeviceType,
            ("service", true) => ResourceTypeKind::StandardServiceType,
            ("service", false) => ResourceTypeKind::VendorServiceType,
            _ => return Err(err()),
        };

        Ok(ResourceType {
            urn: s.to_string(),
            domain: domain.to_string(),
            kind,
            name: name.to_string(),
            version,
        })
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn)
    }
}

/// Identifiant de service, `urn:<domain>:serviceId:<id>`.
///
/// Doit être unique au sein d'un device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    urn: String,
    domain: String,
    id: String,
}

impl ServiceId {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Partie finale de l'identifiant (ex: "AVTransport").
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn as_str(&self) -> &str {
        &self.urn
    }
}

impl FromStr for ServiceId {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || DataElementError::InvalidServiceId(s.to_string());

        let rest = s.strip_prefix("urn:").ok_or_else(err)?;
        let mut parts = rest.splitn(3, ':');
        let domain = parts.next().ok_or_else(err)?;
        let marker = parts.next().ok_or_else(err)?;
        let id = parts.next().ok_or_else(err)?;

        if domain.is_empty() || id.is_empty() || marker != "serviceId" {
            return Err(err());
        }

        Ok(ServiceId {
            urn: s.to_string(),
            domain: domain.to_string(),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_device_type() {
        let t: ResourceType = "urn:schemas-upnp-org:device:MediaRenderer:1".parse().unwrap();
        assert_eq!(t.kind(), ResourceTypeKind::StandardDeviceType);
        assert_eq!(t.type_name(), "MediaRenderer");
        assert_eq!(t.version(), 1);
        assert!(t.is_device_type());
    }

    #[test]
    fn test_parse_vendor_service_type() {
        let t: ResourceType = "urn:av-openhome-org:service:Playlist:2".parse().unwrap();
        assert_eq!(t.kind(), ResourceTypeKind::VendorServiceType);
        assert!(t.is_service_type());
        assert_eq!(t.version(), 2);
    }

    #[test]
    fn test_version_comparison_is_numeric() {
        let v2: ResourceType = "urn:schemas-upnp-org:service:SwitchPower:2".parse().unwrap();
        let v10: ResourceType = "urn:schemas-upnp-org:service:SwitchPower:10".parse().unwrap();
        assert!(v10.version() > v2.version());
        assert!(v2.is_same_type(&v10));
    }

    #[test]
    fn test_with_version_rebuilds_urn() {
        let t: ResourceType = "urn:schemas-upnp-org:service:SwitchPower:1".parse().unwrap();
        let t3 = t.with_version(3);
        assert_eq!(t3.as_str(), "urn:schemas-upnp-org:service:SwitchPower:3");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("urn:schemas-upnp-org:thing:X:1".parse::<ResourceType>().is_err());
        assert!("urn:schemas-upnp-org:device:X:one".parse::<ResourceType>().is_err());
        assert!("schemas-upnp-org:device:X:1".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_service_id() {
        let id: ServiceId = "urn:upnp-org:serviceId:SwitchPower".parse().unwrap();
        assert_eq!(id.id(), "SwitchPower");
        assert_eq!(id.domain(), "upnp-org");
        assert!("urn:upnp-org:service:SwitchPower".parse::<ServiceId>().is_err());
    }
}
