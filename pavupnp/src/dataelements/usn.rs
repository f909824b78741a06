//! USN (Unique Service Name) et identifiants de ressources SSDP.

use std::fmt;
use std::str::FromStr;

use super::{DataElementError, ResourceType, Udn};

/// Ressource désignée par une annonce SSDP : `upnp:rootdevice`, un UDN
/// ou un type de device/service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceIdentifier {
    RootDevice,
    Udn(Udn),
    Type(ResourceType),
}

impl ResourceIdentifier {
    /// Le type transporté, si la ressource en est un.
    pub fn resource_type(&self) -> Option<&ResourceType> {
        match self {
            ResourceIdentifier::Type(t) => Some(t),
            _ => None,
        }
    }
}

impl FromStr for ResourceIdentifier {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "upnp:rootdevice" {
            Ok(ResourceIdentifier::RootDevice)
        } else if s.starts_with("uuid:") {
            Ok(ResourceIdentifier::Udn(s.parse()?))
        } else if s.starts_with("urn:") {
            Ok(ResourceIdentifier::Type(s.parse().map_err(|_| {
                DataElementError::InvalidResourceIdentifier(s.to_string())
            })?))
        } else {
            Err(DataElementError::InvalidResourceIdentifier(s.to_string()))
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIdentifier::RootDevice => f.write_str("upnp:rootdevice"),
            ResourceIdentifier::Udn(udn) => write!(f, "{}", udn),
            ResourceIdentifier::Type(t) => write!(f, "{}", t),
        }
    }
}

/// USN : un UDN et une ressource optionnelle, sérialisés `<udn>::<resource>`.
///
/// Un USN est valide dès que sa composante UDN l'est ; la ressource
/// peut être absente (annonce du device lui-même).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Usn {
    udn: Udn,
    resource: Option<ResourceIdentifier>,
}

impl Usn {
    pub fn new(udn: Udn, resource: Option<ResourceIdentifier>) -> Self {
        Self { udn, resource }
    }

    /// USN annonçant le root device (`<udn>::upnp:rootdevice`).
    pub fn root_device(udn: Udn) -> Self {
        Self::new(udn, Some(ResourceIdentifier::RootDevice))
    }

    pub fn udn(&self) -> &Udn {
        &self.udn
    }

    pub fn resource(&self) -> Option<&ResourceIdentifier> {
        self.resource.as_ref()
    }
}

impl FromStr for Usn {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once("::") {
            Some((udn_part, resource_part)) => {
                let udn: Udn = udn_part
                    .parse()
                    .map_err(|_| DataElementError::InvalidUsn(s.to_string()))?;
                let resource: ResourceIdentifier = resource_part
                    .parse()
                    .map_err(|_| DataElementError::InvalidUsn(s.to_string()))?;
                Ok(Usn::new(udn, Some(resource)))
            }
            None => {
                let udn: Udn = s
                    .parse()
                    .map_err(|_| DataElementError::InvalidUsn(s.to_string()))?;
                Ok(Usn::new(udn, None))
            }
        }
    }
}

impl fmt::Display for Usn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}::{}", self.udn, resource),
            None => write!(f, "{}", self.udn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usn_decomposition() {
        let usn: Usn = "uuid:X::urn:schemas-upnp-org:device:T:1".parse().unwrap();
        assert_eq!(usn.udn().as_str(), "uuid:X");
        assert_eq!(
            usn.resource().unwrap().resource_type().unwrap().as_str(),
            "urn:schemas-upnp-org:device:T:1"
        );
    }

    #[test]
    fn test_usn_rootdevice() {
        let usn: Usn = "uuid:X::upnp:rootdevice".parse().unwrap();
        assert_eq!(usn.resource(), Some(&ResourceIdentifier::RootDevice));
        assert_eq!(usn.to_string(), "uuid:X::upnp:rootdevice");
    }

    #[test]
    fn test_usn_bare_udn() {
        let usn: Usn = "uuid:X".parse().unwrap();
        assert!(usn.resource().is_none());
        assert_eq!(usn.to_string(), "uuid:X");
    }

    #[test]
    fn test_usn_roundtrip() {
        for s in [
            "uuid:X",
            "uuid:X::upnp:rootdevice",
            "uuid:X::urn:schemas-upnp-org:service:SwitchPower:1",
        ] {
            let usn: Usn = s.parse().unwrap();
            assert_eq!(usn.to_string(), s);
        }
    }

    #[test]
    fn test_usn_invalid() {
        assert!("upnp:rootdevice".parse::<Usn>().is_err());
        assert!("uuid:X::bogus".parse::<Usn>().is_err());
    }
}
