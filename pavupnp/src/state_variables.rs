//! # Module StateVariables - Variables d'état UPnP
//!
//! Définitions de variables d'état (schéma) et instances (valeur courante),
//! avec validation à l'affectation et observateurs de changement.
//!
//! ## Architecture
//!
//! - [`StateVariable`] : le schéma déclaré dans le SCPD
//! - [`StateVarInstance`] : la valeur vivante d'un service
//! - [`StateVarInstanceSet`] : l'ensemble des variables d'un service

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use xmltree::{Element, XMLNode};

use crate::variable_types::{StateValue, StateValueError, StateVarType};

/// Mode d'événementiel d'une variable d'état.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventingMode {
    NoEvents,
    UnicastOnly,
    /// Modélisé mais la diffusion multicast n'est pas implémentée
    UnicastAndMulticast,
}

/// Erreurs liées aux variables d'état.
#[derive(Error, Debug)]
pub enum StateVariableError {
    #[error("state variable '{0}' already exists")]
    AlreadyExists(String),

    #[error("unknown state variable '{0}'")]
    Unknown(String),

    #[error("value error: {0}")]
    Value(#[from] StateValueError),

    #[error("value '{value}' is not in the allowed value list of '{variable}'")]
    NotAllowed { variable: String, value: String },

    #[error("value '{value}' is outside the allowed range of '{variable}'")]
    OutOfRange { variable: String, value: String },

    #[error("type mismatch: variable '{variable}' is {expected}, got {actual}")]
    TypeMismatch {
        variable: String,
        expected: StateVarType,
        actual: StateVarType,
    },

    #[error("state variable '{0}' is immutable")]
    Immutable(String),
}

/// Plage de valeurs autorisées (types numériques seulement).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub minimum: f64,
    pub maximum: f64,
    pub step: Option<f64>,
}

impl ValueRange {
    pub fn new(minimum: f64, maximum: f64, step: Option<f64>) -> Self {
        Self {
            minimum,
            maximum,
            step,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// Observateur de changement de valeur : (nom de la variable, valeur).
pub type StateVarObserver = Box<dyn Fn(&str, &StateValue) + Send + Sync>;

/// Schéma d'une variable d'état UPnP.
#[derive(Debug, Clone)]
pub struct StateVariable {
    name: String,
    var_type: StateVarType,
    default_value: Option<StateValue>,
    allowed_values: Vec<String>,
    range: Option<ValueRange>,
    eventing: EventingMode,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, var_type: StateVarType) -> Self {
        Self {
            name: name.into(),
            var_type,
            default_value: None,
            allowed_values: Vec::new(),
            range: None,
            eventing: EventingMode::NoEvents,
        }
    }

    pub fn with_default(mut self, value: StateValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_eventing(mut self, eventing: EventingMode) -> Self {
        self.eventing = eventing;
        self
    }

    /// Raccourci : variable événementielle en unicast.
    pub fn evented(self) -> Self {
        self.with_eventing(EventingMode::UnicastOnly)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> StateVarType {
        self.var_type
    }

    pub fn default_value(&self) -> Option<&StateValue> {
        self.default_value.as_ref()
    }

    pub fn allowed_values(&self) -> &[String] {
        &self.allowed_values
    }

    pub fn range(&self) -> Option<&ValueRange> {
        self.range.as_ref()
    }

    pub fn eventing(&self) -> EventingMode {
        self.eventing
    }

    pub fn is_evented(&self) -> bool {
        self.eventing != EventingMode::NoEvents
    }

    /// Valide une forme lexicale : type, liste de valeurs, plage.
    pub fn validate_lexical(&self, lexical: &str) -> Result<StateValue, StateVariableError> {
        let value = StateValue::parse(self.var_type, lexical)?;
        self.validate_value(&value)?;
        Ok(value)
    }

    /// Valide une valeur déjà typée.
    pub fn validate_value(&self, value: &StateValue) -> Result<(), StateVariableError> {
        // int/number/float sont des synonymes : comparer sur la valeur parsée
        let compatible = value.type_of() == self.var_type
            || StateValue::parse(self.var_type, &value.to_lexical()).is_ok();
        if !compatible {
            return Err(StateVariableError::TypeMismatch {
                variable: self.name.clone(),
                expected: self.var_type,
                actual: value.type_of(),
            });
        }

        if !self.allowed_values.is_empty() {
            let lexical = value.to_lexical();
            if !self.allowed_values.iter().any(|v| v == &lexical) {
                return Err(StateVariableError::NotAllowed {
                    variable: self.name.clone(),
                    value: lexical,
                });
            }
        }

        if let Some(range) = &self.range {
            if let Some(numeric) = value.as_f64() {
                if !range.contains(numeric) {
                    return Err(StateVariableError::OutOfRange {
                        variable: self.name.clone(),
                        value: value.to_lexical(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Élément `<stateVariable>` du SCPD.
    pub fn to_scpd_element(&self) -> Element {
        let mut elem = Element::new("stateVariable");
        elem.attributes.insert(
            "sendEvents".to_string(),
            if self.is_evented() { "yes" } else { "no" }.to_string(),
        );
        if self.eventing == EventingMode::UnicastAndMulticast {
            elem.attributes
                .insert("multicast".to_string(), "yes".to_string());
        }

        let mut name = Element::new("name");
        name.children.push(XMLNode::Text(self.name.clone()));
        elem.children.push(XMLNode::Element(name));

        let mut data_type = Element::new("dataType");
        data_type
            .children
            .push(XMLNode::Text(self.var_type.as_str().to_string()));
        elem.children.push(XMLNode::Element(data_type));

        if let Some(default) = &self.default_value {
            let mut default_elem = Element::new("defaultValue");
            default_elem
                .children
                .push(XMLNode::Text(default.to_lexical()));
            elem.children.push(XMLNode::Element(default_elem));
        }

        if !self.allowed_values.is_empty() {
            let mut list = Element::new("allowedValueList");
            for value in &self.allowed_values {
                let mut allowed = Element::new("allowedValue");
                allowed.children.push(XMLNode::Text(value.clone()));
                list.children.push(XMLNode::Element(allowed));
            }
            elem.children.push(XMLNode::Element(list));
        }

        if let Some(range) = &self.range {
            let mut range_elem = Element::new("allowedValueRange");
            let mut minimum = Element::new("minimum");
            minimum
                .children
                .push(XMLNode::Text(range.minimum.to_string()));
            range_elem.children.push(XMLNode::Element(minimum));
            let mut maximum = Element::new("maximum");
            maximum
                .children
                .push(XMLNode::Text(range.maximum.to_string()));
            range_elem.children.push(XMLNode::Element(maximum));
            if let Some(step) = range.step {
                let mut step_elem = Element::new("step");
                step_elem.children.push(XMLNode::Text(step.to_string()));
                range_elem.children.push(XMLNode::Element(step_elem));
            }
            elem.children.push(XMLNode::Element(range_elem));
        }

        elem
    }
}

/// Valeur vivante d'une variable d'état dans une instance de service.
pub struct StateVarInstance {
    definition: Arc<StateVariable>,
    value: RwLock<StateValue>,
    observers: RwLock<Vec<StateVarObserver>>,
}

impl std::fmt::Debug for StateVarInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateVarInstance")
            .field("definition", &self.definition)
            .field("value", &self.value)
            .finish()
    }
}

impl StateVarInstance {
    pub fn new(definition: Arc<StateVariable>) -> Self {
        let initial = definition
            .default_value()
            .cloned()
            .unwrap_or_else(|| definition.var_type().default_value());
        Self {
            definition,
            value: RwLock::new(initial),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn definition(&self) -> &StateVariable {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn is_evented(&self) -> bool {
        self.definition.is_evented()
    }

    pub fn value(&self) -> StateValue {
        self.value.read().unwrap().clone()
    }

    pub fn lexical(&self) -> String {
        self.value.read().unwrap().to_lexical()
    }

    /// Affecte une valeur typée après validation. Retourne `true` si la
    /// valeur a changé ; les observateurs ne sont prévenus que dans ce cas.
    pub fn set_value(&self, value: StateValue) -> Result<bool, StateVariableError> {
        self.definition.validate_value(&value)?;

        // normaliser vers le type déclaré (int/i4, number/r8...)
        let value = if value.type_of() == self.definition.var_type() {
            value
        } else {
            StateValue::parse(self.definition.var_type(), &value.to_lexical())
                .map_err(StateVariableError::Value)?
        };

        let changed = {
            let mut current = self.value.write().unwrap();
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        };

        if changed {
            let observers = self.observers.read().unwrap();
            for observer in observers.iter() {
                observer(self.definition.name(), &value);
            }
        }

        Ok(changed)
    }

    /// Affecte depuis la forme lexicale.
    pub fn set_from_lexical(&self, lexical: &str) -> Result<bool, StateVariableError> {
        let value = self.definition.validate_lexical(lexical)?;
        self.set_value(value)
    }

    pub fn add_observer(&self, observer: StateVarObserver) {
        self.observers.write().unwrap().push(observer);
    }
}

/// Ensemble des variables d'état d'un service, avec ordre de déclaration.
#[derive(Debug, Default)]
pub struct StateVarInstanceSet {
    instances: HashMap<String, Arc<StateVarInstance>>,
    order: Vec<String>,
}

impl StateVarInstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insertion ; les noms sont uniques au sein d'un service.
    pub fn insert(&mut self, instance: Arc<StateVarInstance>) -> Result<(), StateVariableError> {
        let name = instance.name().to_string();
        if self.instances.contains_key(&name) {
            return Err(StateVariableError::AlreadyExists(name));
        }
        self.order.push(name.clone());
        self.instances.insert(name, instance);
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<StateVarInstance>> {
        self.instances.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<StateVarInstance>> {
        self.order
            .iter()
            .filter_map(|name| self.instances.get(name).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Élément `<serviceStateTable>` du SCPD.
    pub fn to_scpd_element(&self) -> Element {
        let mut table = Element::new("serviceStateTable");
        for instance in self.all() {
            table
                .children
                .push(XMLNode::Element(instance.definition().to_scpd_element()));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn status_variable() -> StateVariable {
        StateVariable::new("Status", StateVarType::Boolean)
            .with_default(StateValue::Boolean(false))
            .evented()
    }

    #[test]
    fn test_default_value() {
        let instance = StateVarInstance::new(Arc::new(status_variable()));
        assert_eq!(instance.value(), StateValue::Boolean(false));
        assert_eq!(instance.lexical(), "0");
    }

    #[test]
    fn test_allowed_values() {
        let var = StateVariable::new("TransportState", StateVarType::String)
            .with_allowed_values(["STOPPED", "PLAYING"]);
        assert!(var.validate_lexical("PLAYING").is_ok());
        assert!(matches!(
            var.validate_lexical("PAUSED"),
            Err(StateVariableError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_range() {
        let var = StateVariable::new("Volume", StateVarType::Ui2)
            .with_range(ValueRange::new(0.0, 100.0, Some(1.0)));
        assert!(var.validate_lexical("100").is_ok());
        assert!(matches!(
            var.validate_lexical("101"),
            Err(StateVariableError::OutOfRange { .. })
        ));
        // forme lexicale invalide avant même la plage
        assert!(matches!(
            var.validate_lexical("loud"),
            Err(StateVariableError::Value(_))
        ));
    }

    #[test]
    fn test_observer_fires_on_change_only() {
        let instance = Arc::new(StateVarInstance::new(Arc::new(status_variable())));
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        instance.add_observer(Box::new(move |name, value| {
            seen_clone
                .lock()
                .unwrap()
                .push(format!("{}={}", name, value));
        }));

        assert!(instance.set_from_lexical("1").unwrap());
        assert!(!instance.set_from_lexical("1").unwrap()); // pas de changement
        assert!(instance.set_from_lexical("0").unwrap());

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec!["Status=1".to_string(), "Status=0".to_string()]);
    }

    #[test]
    fn test_set_uniqueness() {
        let mut set = StateVarInstanceSet::new();
        set.insert(Arc::new(StateVarInstance::new(Arc::new(status_variable()))))
            .unwrap();
        let duplicate = set.insert(Arc::new(StateVarInstance::new(Arc::new(status_variable()))));
        assert!(matches!(
            duplicate,
            Err(StateVariableError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_scpd_element() {
        let var = StateVariable::new("Volume", StateVarType::Ui2)
            .with_default(StateValue::Ui2(50))
            .with_range(ValueRange::new(0.0, 100.0, Some(1.0)))
            .evented();
        let elem = var.to_scpd_element();
        assert_eq!(elem.attributes.get("sendEvents").unwrap(), "yes");
        assert!(elem.get_child("allowedValueRange").is_some());
        assert_eq!(
            elem.get_child("defaultValue").unwrap().get_text().unwrap(),
            "50"
        );
    }
}
