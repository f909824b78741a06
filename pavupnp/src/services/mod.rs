//! # Module Services - Services UPnP côté host
//!
//! Un [`Service`] est le modèle (variables d'état, actions, invocateurs) ;
//! une [`ServiceInstance`] est sa matérialisation attachée à un device :
//! endpoints SCPD/contrôle/événements et abonnés GENA.

pub mod eventing;
mod service_instance;

pub use service_instance::{ParentDeviceHandle, ServiceInstance};

use std::sync::Arc;

use thiserror::Error;

use crate::actions::{Action, ActionInvoker};
use crate::state_variables::StateVariable;

/// Erreurs liées aux services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service '{0}' already exists in device")]
    AlreadyExists(String),

    #[error("failed to register URL: {0}")]
    UrlRegistrationError(String),
}

/// Modèle d'un service UPnP.
///
/// Le nom du service est le nom de type UPnP (ex: "SwitchPower") ; le
/// `serviceId` en est dérivé sauf s'il est fixé explicitement.
#[derive(Clone)]
pub struct Service {
    name: String,
    version: u32,
    identifier: String,
    domain: String,
    variables: Vec<Arc<StateVariable>>,
    actions: Vec<(Arc<Action>, ActionInvoker)>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("identifier", &self.identifier)
            .field("variables", &self.variables.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            identifier: name.clone(),
            name,
            version: 1,
            domain: "schemas-upnp-org".to_string(),
            variables: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version.max(1);
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = identifier.into();
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
    }

    /// Déclare une variable d'état.
    pub fn add_variable(&mut self, variable: StateVariable) {
        self.variables.push(Arc::new(variable));
    }

    /// Déclare une action et son invocateur.
    pub fn add_action(&mut self, action: Action, invoker: ActionInvoker) {
        self.actions.push((Arc::new(action), invoker));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Type de service UPnP complet.
    ///
    /// Format: `urn:{domain}:service:{name}:{version}`
    pub fn service_type(&self) -> String {
        format!("urn:{}:service:{}:{}", self.domain, self.name, self.version)
    }

    /// ID de service UPnP.
    ///
    /// Format: `urn:upnp-org:serviceId:{identifier}`
    pub fn service_id(&self) -> String {
        format!("urn:upnp-org:serviceId:{}", self.identifier)
    }

    /// Au moins une variable est événementielle.
    pub fn is_evented(&self) -> bool {
        self.variables.iter().any(|v| v.is_evented())
    }

    pub fn variables(&self) -> &[Arc<StateVariable>] {
        &self.variables
    }

    pub fn actions(&self) -> &[(Arc<Action>, ActionInvoker)] {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_variables::StateVariable;
    use crate::variable_types::StateVarType;

    #[test]
    fn test_service_type_and_id() {
        let mut service = Service::new("SwitchPower");
        assert_eq!(
            service.service_type(),
            "urn:schemas-upnp-org:service:SwitchPower:1"
        );
        assert_eq!(service.service_id(), "urn:upnp-org:serviceId:SwitchPower");
        service.set_version(2);
        assert_eq!(
            service.service_type(),
            "urn:schemas-upnp-org:service:SwitchPower:2"
        );
    }

    #[test]
    fn test_is_evented() {
        let mut service = Service::new("SwitchPower");
        service.add_variable(StateVariable::new("Target", StateVarType::Boolean));
        assert!(!service.is_evented());
        service.add_variable(StateVariable::new("Status", StateVarType::Boolean).evented());
        assert!(service.is_evented());
    }
}
