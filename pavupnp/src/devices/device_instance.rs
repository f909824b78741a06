//! Implémentation de DeviceInstance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::dataelements::Udn;
use crate::devices::Device;
use crate::services::{ParentDeviceHandle, ServiceInstance};

/// Instance d'un device UPnP : l'arbre vivant publié sur le réseau.
///
/// Porte l'UDN, les instances de services et de sous-devices, et génère
/// la description XML servie sur HTTP.
pub struct DeviceInstance {
    /// Modèle du device
    model: Arc<Device>,

    /// UDN de cette instance
    udn: Udn,

    /// URL de base du serveur (protocole + hôte + port)
    base_url: RwLock<String>,

    /// Route de ce device
    route: String,

    /// Instances de services, dans l'ordre de déclaration
    services: Vec<Arc<ServiceInstance>>,

    /// Instances de sous-devices
    embedded: Vec<Arc<DeviceInstance>>,

    /// Cycle de vie : un device disposé disparaît des lookups mais le
    /// nœud reste récupérable tant qu'un handle externe existe
    disposed: AtomicBool,
}

impl std::fmt::Debug for DeviceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInstance")
            .field("udn", &self.udn)
            .field("route", &self.route)
            .field("services", &self.services.len())
            .field("embedded", &self.embedded.len())
            .finish()
    }
}

impl DeviceInstance {
    /// Instancie un device racine : UDN fixé par le modèle ou généré,
    /// services et sous-devices matérialisés récursivement.
    pub fn new(model: Arc<Device>) -> Arc<Self> {
        Self::instantiate(model, None)
    }

    fn instantiate(model: Arc<Device>, parent_route: Option<&str>) -> Arc<Self> {
        let udn = model.fixed_udn().cloned().unwrap_or_else(Udn::generate);
        let route = match parent_route {
            Some(parent) => format!("{}/device/{}", parent, model.name()),
            None => format!("/device/{}", model.name()),
        };

        let services: Vec<Arc<ServiceInstance>> = model
            .services()
            .iter()
            .map(|service| Arc::new(ServiceInstance::new(service)))
            .collect();

        let embedded: Vec<Arc<DeviceInstance>> = model
            .embedded()
            .iter()
            .map(|child| Self::instantiate(Arc::clone(child), Some(&route)))
            .collect();

        let instance = Arc::new(Self {
            udn: udn.clone(),
            base_url: RwLock::new("http://localhost:8080".to_string()),
            route: route.clone(),
            services,
            embedded,
            model,
            disposed: AtomicBool::new(false),
        });

        for service in &instance.services {
            service.set_parent(ParentDeviceHandle {
                name: instance.model.name().to_string(),
                udn: udn.clone(),
                route: route.clone(),
                base_url: instance.base_url.read().unwrap().clone(),
            });
        }

        instance
    }

    pub fn model(&self) -> &Device {
        &self.model
    }

    pub fn udn(&self) -> &Udn {
        &self.udn
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().unwrap().clone()
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        *self.base_url.write().unwrap() = url.into();
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Route de la description du device.
    pub fn description_route(&self) -> String {
        format!("{}/desc.xml", self.route)
    }

    /// URL complète de la description (LOCATION des annonces SSDP).
    pub fn location(&self) -> String {
        format!("{}{}", self.base_url(), self.description_route())
    }

    pub fn services(&self) -> &[Arc<ServiceInstance>] {
        &self.services
    }

    pub fn embedded(&self) -> &[Arc<DeviceInstance>] {
        &self.embedded
    }

    /// Service par identifiant (suffixe du serviceId), sur ce device seulement.
    pub fn get_service(&self, identifier: &str) -> Option<Arc<ServiceInstance>> {
        self.services
            .iter()
            .find(|s| s.service_id().rsplit(':').next() == Some(identifier))
            .cloned()
    }

    /// Tous les services de l'arbre, racine et sous-devices confondus.
    pub fn all_services(&self) -> Vec<Arc<ServiceInstance>> {
        let mut services: Vec<Arc<ServiceInstance>> = self.services.clone();
        for child in &self.embedded {
            services.extend(child.all_services());
        }
        services
    }

    /// Marque le device disposé : il disparaît des lookups du registre.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        for child in &self.embedded {
            child.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Identifiants de ressources annoncés sur SSDP : `upnp:rootdevice`,
    /// l'UDN racine, un type par device de l'arbre, un type par service.
    pub fn resource_identifiers(&self) -> Vec<String> {
        let mut identifiers = vec![
            "upnp:rootdevice".to_string(),
            self.udn.as_str().to_string(),
        ];
        self.collect_type_identifiers(&mut identifiers);
        identifiers
    }

    fn collect_type_identifiers(&self, identifiers: &mut Vec<String>) {
        let device_type = self.model.device_type_urn();
        if !identifiers.contains(&device_type) {
            identifiers.push(device_type);
        }
        for service in &self.services {
            let service_type = service.service_type();
            if !identifiers.contains(&service_type) {
                identifiers.push(service_type);
            }
        }
        for child in &self.embedded {
            child.collect_type_identifiers(identifiers);
        }
    }

    /// Élément `<device>` de la description.
    pub fn to_device_element(&self) -> Element {
        let mut elem = Element::new("device");
        let model = &self.model;

        let mut push_text = |name: &str, value: String| {
            let mut child = Element::new(name);
            child.children.push(XMLNode::Text(value));
            elem.children.push(XMLNode::Element(child));
        };

        push_text("deviceType", model.device_type_urn());
        push_text("friendlyName", model.friendly_name().to_string());
        push_text("manufacturer", model.manufacturer().to_string());
        if let Some(url) = model.manufacturer_url() {
            push_text("manufacturerURL", url.to_string());
        }
        if let Some(description) = &model.model().description {
            push_text("modelDescription", description.clone());
        }
        push_text("modelName", model.model().name.clone());
        if let Some(number) = &model.model().number {
            push_text("modelNumber", number.clone());
        }
        if let Some(url) = &model.model().url {
            push_text("modelURL", url.clone());
        }
        if let Some(serial) = model.serial_number() {
            push_text("serialNumber", serial.to_string());
        }
        push_text("UDN", self.udn.as_str().to_string());
        if let Some(upc) = model.upc() {
            push_text("UPC", upc.to_string());
        }

        if !model.icons().is_empty() {
            let mut icon_list = Element::new("iconList");
            for (index, icon) in model.icons().iter().enumerate() {
                let mut icon_elem = Element::new("icon");
                let mut icon_text = |name: &str, value: String| {
                    let mut child = Element::new(name);
                    child.children.push(XMLNode::Text(value));
                    icon_elem.children.push(XMLNode::Element(child));
                };
                icon_text("mimetype", icon.mime_type.clone());
                icon_text("width", icon.width.to_string());
                icon_text("height", icon.height.to_string());
                icon_text("depth", icon.depth.to_string());
                icon_text("url", format!("{}/icon/{}", self.route, index));
                icon_list.children.push(XMLNode::Element(icon_elem));
            }
            elem.children.push(XMLNode::Element(icon_list));
        }

        if !self.services.is_empty() {
            let mut service_list = Element::new("serviceList");
            for service in &self.services {
                let mut service_elem = Element::new("service");
                let mut service_text = |name: &str, value: String| {
                    let mut child = Element::new(name);
                    child.children.push(XMLNode::Text(value));
                    service_elem.children.push(XMLNode::Element(child));
                };
                service_text("serviceType", service.service_type());
                service_text("serviceId", service.service_id());
                service_text("SCPDURL", service.scpd_route());
                service_text("controlURL", service.control_route());
                service_text("eventSubURL", service.event_route());
                service_list.children.push(XMLNode::Element(service_elem));
            }
            elem.children.push(XMLNode::Element(service_list));
        }

        if !self.embedded.is_empty() {
            let mut device_list = Element::new("deviceList");
            for child in &self.embedded {
                device_list
                    .children
                    .push(XMLNode::Element(child.to_device_element()));
            }
            elem.children.push(XMLNode::Element(device_list));
        }

        if let Some(url) = model.presentation_url() {
            let mut presentation = Element::new("presentationURL");
            presentation.children.push(XMLNode::Text(url.to_string()));
            elem.children.push(XMLNode::Element(presentation));
        }

        elem
    }

    /// Document de description complet (`<root>` + specVersion + device).
    pub fn description_xml(&self) -> String {
        let mut root = Element::new("root");
        root.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:device-1-0".to_string(),
        );
        root.attributes
            .insert("configId".to_string(), "1".to_string());

        let mut spec = Element::new("specVersion");
        let mut major = Element::new("major");
        major.children.push(XMLNode::Text("1".to_string()));
        spec.children.push(XMLNode::Element(major));
        let mut minor = Element::new("minor");
        minor.children.push(XMLNode::Text("1".to_string()));
        spec.children.push(XMLNode::Element(minor));
        root.children.push(XMLNode::Element(spec));

        root.children.push(XMLNode::Element(self.to_device_element()));

        let mut buf = Vec::new();
        let config = EmitterConfig::new().perform_indent(true).indent_string("  ");
        root.write_with_config(&mut buf, config)
            .expect("description serialization cannot fail");
        String::from_utf8(buf).unwrap()
    }

    /// Enregistre la description, les icônes et les routes des services.
    pub async fn register_urls(self: &Arc<Self>, server: &mut crate::server::Server) {
        self.set_base_url(server.base_url().to_string());

        info!(
            "✅ Device description for {} available at: {}",
            self.name(),
            self.location()
        );

        // la description est figée à l'enregistrement
        let description = self.description_xml();
        server
            .add_handler(&self.description_route(), move || {
                let description = description.clone();
                async move {
                    (
                        StatusCode::OK,
                        [(
                            axum::http::header::CONTENT_TYPE,
                            "text/xml; charset=\"utf-8\"",
                        )],
                        description,
                    )
                        .into_response()
                }
            })
            .await;

        for (index, icon) in self.model.icons().iter().enumerate() {
            let mime_type = icon.mime_type.clone();
            let data = icon.data.clone();
            server
                .add_handler(&format!("{}/icon/{}", self.route, index), move || {
                    let mime_type = mime_type.clone();
                    let data = data.clone();
                    async move {
                        match data {
                            Some(bytes) => (
                                StatusCode::OK,
                                [(axum::http::header::CONTENT_TYPE, mime_type)],
                                bytes,
                            )
                                .into_response(),
                            None => StatusCode::NOT_FOUND.into_response(),
                        }
                    }
                })
                .await;
        }

        for service in &self.services {
            service.register_urls(server).await;
        }
        for child in &self.embedded {
            Box::pin(child.register_urls(server)).await;
        }
    }

    /// Démarre le notifier GENA de chaque service de l'arbre.
    pub fn start_notifiers(&self, interval: std::time::Duration) -> Vec<tokio::task::JoinHandle<()>> {
        self.all_services()
            .iter()
            .map(|service| service.start_notifier(interval))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Service;
    use crate::state_variables::StateVariable;
    use crate::variable_types::{StateValue, StateVarType};

    fn light_model() -> Arc<Device> {
        let mut device = Device::new("light", "Light", "Hall Light");
        device.set_udn("uuid:A".parse().unwrap());
        let mut service = Service::new("SwitchPower");
        service.add_variable(
            StateVariable::new("Status", StateVarType::Boolean)
                .with_default(StateValue::Boolean(false))
                .evented(),
        );
        device.add_service(service).unwrap();

        let mut dimmer = Device::new("dimmer", "Dimming", "Dimmer");
        let mut dim_service = Service::new("Dimming");
        dim_service.add_variable(StateVariable::new("LoadLevelStatus", StateVarType::Ui1).evented());
        dimmer.add_service(dim_service).unwrap();
        device.add_embedded(dimmer).unwrap();

        Arc::new(device)
    }

    #[test]
    fn test_instance_tree() {
        let instance = DeviceInstance::new(light_model());
        assert_eq!(instance.udn().as_str(), "uuid:A");
        assert_eq!(instance.services().len(), 1);
        assert_eq!(instance.embedded().len(), 1);
        assert_eq!(instance.all_services().len(), 2);
        assert_eq!(instance.route(), "/device/light");
        assert_eq!(
            instance.embedded()[0].route(),
            "/device/light/device/dimmer"
        );
    }

    #[test]
    fn test_resource_identifiers_burst_shape() {
        // 1 rootdevice + 1 udn + 2 types de devices + 2 types de services
        let instance = DeviceInstance::new(light_model());
        let identifiers = instance.resource_identifiers();
        assert_eq!(identifiers.len(), 2 + 2 + 2);
        assert_eq!(identifiers[0], "upnp:rootdevice");
        assert_eq!(identifiers[1], "uuid:A");
        assert!(identifiers.contains(&"urn:schemas-upnp-org:device:Dimming:1".to_string()));
        assert!(identifiers.contains(&"urn:schemas-upnp-org:service:Dimming:1".to_string()));
    }

    #[test]
    fn test_description_contains_tree() {
        let instance = DeviceInstance::new(light_model());
        let xml = instance.description_xml();
        assert!(xml.contains("<UDN>uuid:A</UDN>"));
        assert!(xml.contains("urn:schemas-upnp-org:device:Light:1"));
        assert!(xml.contains("<serviceList>"));
        assert!(xml.contains("<deviceList>"));
        assert!(xml.contains("/device/light/service/SwitchPower/control"));
    }

    #[test]
    fn test_description_roundtrip_is_structurally_stable() {
        // parse de la description puis re-sérialisation : métadonnées égales
        let instance = DeviceInstance::new(light_model());
        let xml = instance.description_xml();

        let reparsed = Device::from_description_xml(&xml).unwrap();
        assert_eq!(reparsed.friendly_name(), "Hall Light");
        assert_eq!(reparsed.device_type_urn(), "urn:schemas-upnp-org:device:Light:1");
        assert_eq!(reparsed.fixed_udn().unwrap().as_str(), "uuid:A");
        assert_eq!(reparsed.services().len(), 1);
        assert_eq!(reparsed.embedded().len(), 1);

        // le modèle reparsé produit une description au même squelette
        let reinstance = DeviceInstance::new(Arc::new(reparsed));
        let xml2 = reinstance.description_xml();
        assert!(xml2.contains("<UDN>uuid:A</UDN>"));
        assert!(xml2.contains("<deviceList>"));
    }

    #[test]
    fn test_dispose_cascades() {
        let instance = DeviceInstance::new(light_model());
        assert!(!instance.is_disposed());
        instance.dispose();
        assert!(instance.is_disposed());
        assert!(instance.embedded()[0].is_disposed());
    }
}
