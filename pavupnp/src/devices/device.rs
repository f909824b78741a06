//! Définition du modèle Device UPnP.

use std::io::BufReader;
use std::sync::Arc;

use xmltree::Element;

use crate::dataelements::{DeviceIcon, ModelInfo, ResourceType, Udn};
use crate::devices::DeviceError;
use crate::services::Service;

/// Fabrique de devices par type de ressource.
///
/// Remplace l'héritage : l'application fournit une closure qui, pour un
/// type de device donné, construit le modèle complet (services compris).
pub type DeviceFactory = Arc<dyn Fn(&ResourceType) -> Option<Device> + Send + Sync>;

/// Modèle d'un device UPnP.
///
/// Représente la définition d'un device selon l'UPnP Device Architecture.
/// Un device porte des services et éventuellement des sous-devices.
#[derive(Debug, Clone)]
pub struct Device {
    /// Nom interne, utilisé dans les routes HTTP
    name: String,

    /// Nom du type de device (ex: "Light", "MediaRenderer")
    device_type: String,

    /// Version du type
    version: u32,

    /// Domaine du type (schemas-upnp-org pour les types standards)
    domain: String,

    /// Nom convivial
    friendly_name: String,

    /// Fabricant
    manufacturer: String,

    /// URL du fabricant
    manufacturer_url: Option<String>,

    /// Informations de modèle
    model: ModelInfo,

    /// Numéro de série
    serial_number: Option<String>,

    /// UPC (Universal Product Code)
    upc: Option<String>,

    /// URL de présentation
    presentation_url: Option<String>,

    /// Icônes du device
    icons: Vec<DeviceIcon>,

    /// UDN imposé ; généré à l'instanciation sinon
    udn: Option<Udn>,

    /// Services du device
    services: Vec<Arc<Service>>,

    /// Sous-devices (embedded devices)
    embedded: Vec<Arc<Device>>,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        device_type: impl Into<String>,
        friendly_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            device_type: device_type.into(),
            version: 1,
            domain: "schemas-upnp-org".to_string(),
            friendly_name: friendly_name.into(),
            manufacturer: "Pavillon".to_string(),
            manufacturer_url: None,
            model: ModelInfo {
                description: None,
                name: name.clone(),
                number: None,
                url: None,
            },
            serial_number: None,
            upc: None,
            presentation_url: None,
            icons: Vec::new(),
            udn: None,
            services: Vec::new(),
            embedded: Vec::new(),
            name,
        }
    }

    pub fn set_version(&mut self, version: u32) -> Result<(), DeviceError> {
        if version == 0 {
            return Err(DeviceError::InvalidVersion);
        }
        self.version = version;
        Ok(())
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
    }

    pub fn set_manufacturer(&mut self, manufacturer: impl Into<String>) {
        self.manufacturer = manufacturer.into();
    }

    pub fn set_manufacturer_url(&mut self, url: impl Into<String>) {
        self.manufacturer_url = Some(url.into());
    }

    pub fn set_model(&mut self, model: ModelInfo) {
        self.model = model;
    }

    pub fn set_serial_number(&mut self, serial: impl Into<String>) {
        self.serial_number = Some(serial.into());
    }

    pub fn set_upc(&mut self, upc: impl Into<String>) {
        self.upc = Some(upc.into());
    }

    pub fn set_presentation_url(&mut self, url: impl Into<String>) {
        self.presentation_url = Some(url.into());
    }

    pub fn add_icon(&mut self, icon: DeviceIcon) {
        self.icons.push(icon);
    }

    /// Fixe l'UDN au lieu d'en générer un à l'instanciation.
    pub fn set_udn(&mut self, udn: Udn) {
        self.udn = Some(udn);
    }

    /// Ajoute un service ; les identifiants de service sont uniques au
    /// sein du device.
    pub fn add_service(&mut self, service: Service) -> Result<(), DeviceError> {
        if self
            .services
            .iter()
            .any(|s| s.identifier() == service.identifier())
        {
            return Err(DeviceError::ServiceAlreadyExists(
                service.identifier().to_string(),
            ));
        }
        self.services.push(Arc::new(service));
        Ok(())
    }

    /// Ajoute un sous-device.
    pub fn add_embedded(&mut self, device: Device) -> Result<(), DeviceError> {
        if self.embedded.iter().any(|d| d.name() == device.name()) {
            return Err(DeviceError::DeviceAlreadyExists(device.name().to_string()));
        }
        self.embedded.push(Arc::new(device));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn manufacturer_url(&self) -> Option<&str> {
        self.manufacturer_url.as_deref()
    }

    pub fn model(&self) -> &ModelInfo {
        &self.model
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn upc(&self) -> Option<&str> {
        self.upc.as_deref()
    }

    pub fn presentation_url(&self) -> Option<&str> {
        self.presentation_url.as_deref()
    }

    pub fn icons(&self) -> &[DeviceIcon] {
        &self.icons
    }

    pub fn fixed_udn(&self) -> Option<&Udn> {
        self.udn.as_ref()
    }

    /// Type de device UPnP complet.
    ///
    /// Format: `urn:{domain}:device:{type}:{version}`
    pub fn device_type_urn(&self) -> String {
        format!(
            "urn:{}:device:{}:{}",
            self.domain, self.device_type, self.version
        )
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn embedded(&self) -> &[Arc<Device>] {
        &self.embedded
    }

    /// Construit un modèle de device depuis une description XML (voir la
    /// configuration `path_to_device_description`). Les services créés sont
    /// des coquilles : leurs actions et invocateurs restent à fournir par
    /// l'application.
    pub fn from_description_xml(xml: &str) -> Result<Device, DeviceError> {
        let root = Element::parse(BufReader::new(xml.as_bytes()))
            .map_err(|e| DeviceError::InvalidDescription(e.to_string()))?;

        let device_elem = root
            .get_child("device")
            .ok_or_else(|| DeviceError::InvalidDescription("missing <device>".to_string()))?;

        Self::from_device_element(device_elem)
    }

    fn from_device_element(elem: &Element) -> Result<Device, DeviceError> {
        let text = |name: &str| -> Option<String> {
            elem.get_child(name)
                .and_then(|c| c.get_text())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        };

        let device_type_urn = text("deviceType")
            .ok_or_else(|| DeviceError::InvalidDescription("missing <deviceType>".to_string()))?;
        let device_type: ResourceType = device_type_urn
            .parse()
            .map_err(|_| DeviceError::InvalidDescription(device_type_urn.clone()))?;

        let friendly_name = text("friendlyName")
            .ok_or_else(|| DeviceError::InvalidDescription("missing <friendlyName>".to_string()))?;

        let mut device = Device::new(
            device_type.type_name().to_string(),
            device_type.type_name().to_string(),
            friendly_name,
        );
        device.set_version(device_type.version()).ok();
        device.set_domain(device_type.domain().to_string());

        if let Some(manufacturer) = text("manufacturer") {
            device.set_manufacturer(manufacturer);
        }
        if let Some(url) = text("manufacturerURL") {
            device.set_manufacturer_url(url);
        }
        device.set_model(ModelInfo {
            description: text("modelDescription"),
            name: text("modelName").unwrap_or_else(|| device_type.type_name().to_string()),
            number: text("modelNumber"),
            url: text("modelURL"),
        });
        if let Some(serial) = text("serialNumber") {
            device.set_serial_number(serial);
        }
        if let Some(upc) = text("UPC") {
            device.set_upc(upc);
        }
        if let Some(url) = text("presentationURL") {
            device.set_presentation_url(url);
        }
        if let Some(udn) = text("UDN") {
            let udn: Udn = udn
                .parse()
                .map_err(|_| DeviceError::InvalidDescription(format!("bad UDN '{}'", udn)))?;
            device.set_udn(udn);
        }

        if let Some(icon_list) = elem.get_child("iconList") {
            for icon_elem in icon_list.children.iter().filter_map(|n| n.as_element()) {
                let icon_text = |name: &str| -> Option<String> {
                    icon_elem
                        .get_child(name)
                        .and_then(|c| c.get_text())
                        .map(|t| t.trim().to_string())
                };
                if let Some(url) = icon_text("url") {
                    device.add_icon(DeviceIcon {
                        mime_type: icon_text("mimetype").unwrap_or_default(),
                        width: icon_text("width").and_then(|w| w.parse().ok()).unwrap_or(0),
                        height: icon_text("height").and_then(|h| h.parse().ok()).unwrap_or(0),
                        depth: icon_text("depth").and_then(|d| d.parse().ok()).unwrap_or(0),
                        url,
                        data: None,
                    });
                }
            }
        }

        if let Some(service_list) = elem.get_child("serviceList") {
            for service_elem in service_list.children.iter().filter_map(|n| n.as_element()) {
                let service_text = |name: &str| -> Option<String> {
                    service_elem
                        .get_child(name)
                        .and_then(|c| c.get_text())
                        .map(|t| t.trim().to_string())
                };
                let Some(service_type_urn) = service_text("serviceType") else {
                    continue;
                };
                let Ok(service_type) = service_type_urn.parse::<ResourceType>() else {
                    return Err(DeviceError::InvalidDescription(service_type_urn));
                };
                let mut service = Service::new(service_type.type_name().to_string());
                service.set_version(service_type.version());
                service.set_domain(service_type.domain().to_string());
                if let Some(service_id) = service_text("serviceId") {
                    if let Some(id) = service_id.rsplit(':').next() {
                        service.set_identifier(id.to_string());
                    }
                }
                device.add_service(service)?;
            }
        }

        if let Some(device_list) = elem.get_child("deviceList") {
            for child in device_list.children.iter().filter_map(|n| n.as_element()) {
                if child.name == "device" {
                    device.add_embedded(Self::from_device_element(child)?)?;
                }
            }
        }

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_variables::StateVariable;
    use crate::variable_types::StateVarType;

    #[test]
    fn test_device_type_urn() {
        let mut device = Device::new("light", "Light", "Hall Light");
        assert_eq!(
            device.device_type_urn(),
            "urn:schemas-upnp-org:device:Light:1"
        );
        device.set_version(2).unwrap();
        assert_eq!(
            device.device_type_urn(),
            "urn:schemas-upnp-org:device:Light:2"
        );
        assert!(device.set_version(0).is_err());
    }

    #[test]
    fn test_service_id_uniqueness() {
        let mut device = Device::new("light", "Light", "Hall Light");
        device.add_service(Service::new("SwitchPower")).unwrap();
        assert!(matches!(
            device.add_service(Service::new("SwitchPower")),
            Err(DeviceError::ServiceAlreadyExists(_))
        ));
    }

    #[test]
    fn test_from_description_xml() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:Light:1</deviceType>
    <friendlyName>Hall Light</friendlyName>
    <manufacturer>Pavillon</manufacturer>
    <modelName>L-100</modelName>
    <UDN>uuid:5d794fc2-5c5e-4460-a023-f04a51363300</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:SwitchPower:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:SwitchPower</serviceId>
        <SCPDURL>/device/Light/service/SwitchPower/scpd.xml</SCPDURL>
        <controlURL>/device/Light/service/SwitchPower/control</controlURL>
        <eventSubURL>/device/Light/service/SwitchPower/event</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Dimmer:1</deviceType>
        <friendlyName>Dimmer</friendlyName>
      </device>
    </deviceList>
  </device>
</root>"#;

        let device = Device::from_description_xml(xml).unwrap();
        assert_eq!(device.friendly_name(), "Hall Light");
        assert_eq!(device.fixed_udn().unwrap().suffix(), "5d794fc2-5c5e-4460-a023-f04a51363300");
        assert_eq!(device.services().len(), 1);
        assert_eq!(device.services()[0].identifier(), "SwitchPower");
        assert_eq!(device.embedded().len(), 1);
        assert_eq!(device.embedded()[0].friendly_name(), "Dimmer");
    }

    #[test]
    fn test_from_description_requires_device_type() {
        let xml = r#"<root><device><friendlyName>X</friendlyName></device></root>"#;
        assert!(matches!(
            Device::from_description_xml(xml),
            Err(DeviceError::InvalidDescription(_))
        ));
    }

    #[test]
    fn test_factory_closure() {
        let factory: DeviceFactory = Arc::new(|device_type: &ResourceType| {
            if device_type.type_name() == "Light" {
                let mut device = Device::new("light", "Light", "Factory Light");
                let mut service = Service::new("SwitchPower");
                service.add_variable(StateVariable::new("Status", StateVarType::Boolean).evented());
                device.add_service(service).ok()?;
                Some(device)
            } else {
                None
            }
        });

        let light_type: ResourceType = "urn:schemas-upnp-org:device:Light:1".parse().unwrap();
        let other_type: ResourceType = "urn:schemas-upnp-org:device:Fan:1".parse().unwrap();
        assert!(factory(&light_type).is_some());
        assert!(factory(&other_type).is_none());
    }
}
