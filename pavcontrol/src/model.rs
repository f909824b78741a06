//! In-process mirror of remote devices and services.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use pavupnp::actions::Action;
use pavupnp::dataelements::{DeviceInfo, ResourceType, ServiceInfo, Udn};
use pavupnp::state_variables::StateVariable;

/// A remote service: its published endpoints, action and state-variable
/// schemas, and the last known values of its evented variables.
pub struct RemoteService {
    info: ServiceInfo,
    actions: Vec<Action>,
    variables: Vec<Arc<StateVariable>>,
    values: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for RemoteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteService")
            .field("service_id", &self.info.service_id.as_str())
            .field("actions", &self.actions.len())
            .field("variables", &self.variables.len())
            .finish()
    }
}

impl RemoteService {
    pub fn new(info: ServiceInfo, actions: Vec<Action>, variables: Vec<Arc<StateVariable>>) -> Self {
        // seed values from declared defaults
        let mut values = HashMap::new();
        for variable in &variables {
            if let Some(default) = variable.default_value() {
                values.insert(variable.name().to_string(), default.to_lexical());
            }
        }
        Self {
            info,
            actions,
            variables,
            values: RwLock::new(values),
        }
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn service_type(&self) -> &ResourceType {
        &self.info.service_type
    }

    pub fn is_evented(&self) -> bool {
        self.info.evented
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name() == name)
    }

    pub fn variables(&self) -> &[Arc<StateVariable>] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Arc<StateVariable>> {
        self.variables.iter().find(|v| v.name() == name)
    }

    /// Last known value of a state variable.
    pub fn value(&self, name: &str) -> Option<String> {
        self.values.read().unwrap().get(name).cloned()
    }

    /// Applies a value coming from a NOTIFY property set. Unknown variables
    /// and values that do not match the declared schema are kept anyway
    /// (devices in the field are sloppy), but logged.
    pub fn update_value(&self, name: &str, lexical: &str) -> bool {
        match self.variable(name) {
            Some(variable) => {
                if variable.validate_lexical(lexical).is_err() {
                    warn!(
                        "Value '{}' for {}::{} does not match its declared schema",
                        lexical,
                        self.info.service_id.id(),
                        name
                    );
                }
            }
            None => {
                warn!(
                    "NOTIFY carries unknown variable '{}' for {}",
                    name,
                    self.info.service_id.id()
                );
            }
        }
        let mut values = self.values.write().unwrap();
        let changed = values.get(name).map(|v| v.as_str()) != Some(lexical);
        values.insert(name.to_string(), lexical.to_string());
        changed
    }
}

/// A remote device tree node, mirroring a `<device>` element.
#[derive(Debug)]
pub struct RemoteDevice {
    info: DeviceInfo,
    location: String,
    server: String,
    boot_id: Option<u32>,
    max_age: u32,
    services: Vec<Arc<RemoteService>>,
    embedded: Vec<Arc<RemoteDevice>>,
}

impl RemoteDevice {
    pub fn new(
        info: DeviceInfo,
        location: String,
        server: String,
        boot_id: Option<u32>,
        max_age: u32,
        services: Vec<Arc<RemoteService>>,
        embedded: Vec<Arc<RemoteDevice>>,
    ) -> Self {
        Self {
            info,
            location,
            server,
            boot_id,
            max_age,
            services,
            embedded,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn udn(&self) -> &Udn {
        &self.info.udn
    }

    pub fn device_type(&self) -> &ResourceType {
        &self.info.device_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn boot_id(&self) -> Option<u32> {
        self.boot_id
    }

    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    pub fn services(&self) -> &[Arc<RemoteService>] {
        &self.services
    }

    pub fn embedded(&self) -> &[Arc<RemoteDevice>] {
        &self.embedded
    }

    /// All services of the tree, this device and embedded ones.
    pub fn all_services(&self) -> Vec<Arc<RemoteService>> {
        let mut services = self.services.clone();
        for child in &self.embedded {
            services.extend(child.all_services());
        }
        services
    }

    /// All UDNs present in the tree, root first.
    pub fn all_udns(&self) -> Vec<Udn> {
        let mut udns = vec![self.info.udn.clone()];
        for child in &self.embedded {
            udns.extend(child.all_udns());
        }
        udns
    }

    /// Finds a service anywhere in the tree by serviceId suffix.
    pub fn find_service(&self, service_id: &str) -> Option<Arc<RemoteService>> {
        for service in &self.services {
            if service.info().service_id.id() == service_id {
                return Some(Arc::clone(service));
            }
        }
        self.embedded
            .iter()
            .find_map(|child| child.find_service(service_id))
    }

    /// Finds the first service of the wanted type with version >= wanted.
    pub fn find_service_by_type(&self, wanted: &ResourceType) -> Option<Arc<RemoteService>> {
        for service in &self.services {
            let advertised = service.service_type();
            if advertised.is_same_type(wanted) && advertised.version() >= wanted.version() {
                return Some(Arc::clone(service));
            }
        }
        self.embedded
            .iter()
            .find_map(|child| child.find_service_by_type(wanted))
    }

    /// True if any device in the tree matches the wanted type, version
    /// comparison included.
    pub fn matches_device_type(&self, wanted: &ResourceType) -> bool {
        let advertised = self.device_type();
        if advertised.is_same_type(wanted) && advertised.version() >= wanted.version() {
            return true;
        }
        self.embedded.iter().any(|d| d.matches_device_type(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pavupnp::dataelements::ModelInfo;
    use pavupnp::state_variables::StateVariable;
    use pavupnp::variable_types::{StateValue, StateVarType};

    fn sample_service() -> RemoteService {
        RemoteService::new(
            ServiceInfo {
                service_id: "urn:upnp-org:serviceId:SwitchPower".parse().unwrap(),
                service_type: "urn:schemas-upnp-org:service:SwitchPower:1".parse().unwrap(),
                scpd_url: "http://192.168.1.10:8080/scpd.xml".to_string(),
                control_url: "http://192.168.1.10:8080/control".to_string(),
                event_sub_url: "http://192.168.1.10:8080/event".to_string(),
                evented: true,
            },
            vec![],
            vec![Arc::new(
                StateVariable::new("Status", StateVarType::Boolean)
                    .with_default(StateValue::Boolean(false))
                    .evented(),
            )],
        )
    }

    fn sample_device() -> RemoteDevice {
        RemoteDevice::new(
            DeviceInfo::new(
                "urn:schemas-upnp-org:device:Light:1".parse().unwrap(),
                "Hall Light",
                "Pavillon",
                ModelInfo {
                    description: None,
                    name: "L-100".to_string(),
                    number: None,
                    url: None,
                },
                "uuid:A".parse().unwrap(),
            ),
            "http://192.168.1.10:8080/device/light/desc.xml".to_string(),
            "Linux/5.0 UPnP/1.1 Pavillon/0.3".to_string(),
            Some(3),
            1800,
            vec![Arc::new(sample_service())],
            vec![],
        )
    }

    #[test]
    fn test_default_values_are_seeded() {
        let service = sample_service();
        assert_eq!(service.value("Status"), Some("0".to_string()));
    }

    #[test]
    fn test_update_value_reports_change() {
        let service = sample_service();
        assert!(service.update_value("Status", "1"));
        assert!(!service.update_value("Status", "1"));
        assert_eq!(service.value("Status"), Some("1".to_string()));
    }

    #[test]
    fn test_unknown_variable_is_kept() {
        // les devices du terrain envoient des variables non déclarées
        let service = sample_service();
        assert!(service.update_value("LastChange", "<Event/>"));
        assert_eq!(service.value("LastChange"), Some("<Event/>".to_string()));
    }

    #[test]
    fn test_find_service_by_type_versioning() {
        let device = sample_device();
        let v1: ResourceType = "urn:schemas-upnp-org:service:SwitchPower:1".parse().unwrap();
        let v2: ResourceType = "urn:schemas-upnp-org:service:SwitchPower:2".parse().unwrap();
        assert!(device.find_service_by_type(&v1).is_some());
        assert!(device.find_service_by_type(&v2).is_none());
    }

    #[test]
    fn test_find_service_by_id() {
        let device = sample_device();
        assert!(device.find_service("SwitchPower").is_some());
        assert!(device.find_service("AVTransport").is_none());
    }
}
