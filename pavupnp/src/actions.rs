//! # Module Actions - Actions UPnP
//!
//! Schémas d'actions (arguments IN/OUT ordonnés, variable d'état liée) et
//! invocateurs exécutant la logique métier.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use xmltree::{Element, XMLNode};

use crate::soap::error_codes;
use crate::state_variables::StateVarInstanceSet;
use crate::variable_types::StateValue;

/// Erreurs du registre d'actions.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("action '{0}' already exists")]
    AlreadyExists(String),

    #[error("argument '{arg}' of action '{action}' references unknown state variable '{variable}'")]
    UnknownRelatedVariable {
        action: String,
        arg: String,
        variable: String,
    },
}

/// Échec d'exécution d'une action, porteur d'un code UPnP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub code: u16,
    pub description: String,
}

impl ActionFailure {
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn invalid_action() -> Self {
        Self::new(error_codes::INVALID_ACTION, "Invalid Action")
    }

    pub fn invalid_args(detail: impl Into<String>) -> Self {
        Self::new(
            error_codes::INVALID_ARGS,
            format!("Invalid Args: {}", detail.into()),
        )
    }

    pub fn action_failed(detail: impl Into<String>) -> Self {
        Self::new(
            error_codes::ACTION_FAILED,
            format!("Action Failed: {}", detail.into()),
        )
    }

    pub fn value_invalid(arg: impl Into<String>) -> Self {
        Self::new(
            error_codes::ARGUMENT_VALUE_INVALID,
            format!("Argument Value Invalid: {}", arg.into()),
        )
    }

    pub fn value_out_of_range(arg: impl Into<String>) -> Self {
        Self::new(
            error_codes::ARGUMENT_VALUE_OUT_OF_RANGE,
            format!("Argument Value Out of Range: {}", arg.into()),
        )
    }
}

/// Direction d'un argument d'action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Argument d'action : nom, direction et variable d'état liée (qui fournit
/// le type et les contraintes de valeur).
#[derive(Debug, Clone)]
pub struct Argument {
    name: String,
    direction: Direction,
    related_state_variable: String,
}

impl Argument {
    pub fn input(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            related_state_variable: related.into(),
        }
    }

    pub fn output(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Out,
            related_state_variable: related.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn related_state_variable(&self) -> &str {
        &self.related_state_variable
    }

    fn to_scpd_element(&self) -> Element {
        let mut elem = Element::new("argument");

        let mut name = Element::new("name");
        name.children.push(XMLNode::Text(self.name.clone()));
        elem.children.push(XMLNode::Element(name));

        let mut direction = Element::new("direction");
        direction.children.push(XMLNode::Text(
            match self.direction {
                Direction::In => "in",
                Direction::Out => "out",
            }
            .to_string(),
        ));
        elem.children.push(XMLNode::Element(direction));

        let mut related = Element::new("relatedStateVariable");
        related
            .children
            .push(XMLNode::Text(self.related_state_variable.clone()));
        elem.children.push(XMLNode::Element(related));

        elem
    }
}

/// Arguments d'entrée d'une invocation, indexés par nom.
pub type ActionInputs = BTreeMap<String, StateValue>;

/// Sorties d'une invocation : formes lexicales dans l'ordre déclaré.
pub type ActionOutputs = Vec<(String, String)>;

/// Invocateur : résout un jeu d'entrées en sorties ou en code d'erreur
/// UPnP. Reçoit les variables d'état du service pour lire et écrire l'état.
pub type ActionInvoker =
    Arc<dyn Fn(&StateVarInstanceSet, &ActionInputs) -> Result<ActionOutputs, ActionFailure> + Send + Sync>;

/// Schéma d'une action UPnP.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    arguments: Vec<Argument>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn in_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(|a| a.direction() == Direction::In)
    }

    pub fn out_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(|a| a.direction() == Direction::Out)
    }

    /// Élément `<action>` du SCPD.
    pub fn to_scpd_element(&self) -> Element {
        let mut elem = Element::new("action");

        let mut name = Element::new("name");
        name.children.push(XMLNode::Text(self.name.clone()));
        elem.children.push(XMLNode::Element(name));

        if !self.arguments.is_empty() {
            let mut list = Element::new("argumentList");
            for argument in &self.arguments {
                list.children.push(XMLNode::Element(argument.to_scpd_element()));
            }
            elem.children.push(XMLNode::Element(list));
        }

        elem
    }
}

/// Registre des actions d'un service, avec ordre de déclaration.
#[derive(Default)]
pub struct ActionSet {
    actions: HashMap<String, Arc<Action>>,
    invokers: HashMap<String, ActionInvoker>,
    order: Vec<String>,
}

impl std::fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSet").field("order", &self.order).finish()
    }
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insertion ; les noms d'actions sont uniques au sein d'un service.
    pub fn insert(&mut self, action: Arc<Action>, invoker: ActionInvoker) -> Result<(), ActionError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(ActionError::AlreadyExists(name));
        }
        self.order.push(name.clone());
        self.invokers.insert(name.clone(), invoker);
        self.actions.insert(name, action);
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get(name).cloned()
    }

    pub fn invoker_for(&self, name: &str) -> Option<ActionInvoker> {
        self.invokers.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Action>> {
        self.order
            .iter()
            .filter_map(|name| self.actions.get(name).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Élément `<actionList>` du SCPD.
    pub fn to_scpd_element(&self) -> Element {
        let mut list = Element::new("actionList");
        for action in self.all() {
            list.children.push(XMLNode::Element(action.to_scpd_element()));
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_target() -> Action {
        Action::new("SetTarget").with_argument(Argument::input("newTargetValue", "Target"))
    }

    fn noop_invoker() -> ActionInvoker {
        Arc::new(|_, _| Ok(Vec::new()))
    }

    #[test]
    fn test_argument_partition() {
        let action = Action::new("GetVolume")
            .with_argument(Argument::input("Channel", "A_ARG_TYPE_Channel"))
            .with_argument(Argument::output("CurrentVolume", "Volume"));
        assert_eq!(action.in_arguments().count(), 1);
        assert_eq!(action.out_arguments().count(), 1);
        assert_eq!(
            action.out_arguments().next().unwrap().related_state_variable(),
            "Volume"
        );
    }

    #[test]
    fn test_uniqueness() {
        let mut set = ActionSet::new();
        set.insert(Arc::new(set_target()), noop_invoker()).unwrap();
        assert!(matches!(
            set.insert(Arc::new(set_target()), noop_invoker()),
            Err(ActionError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_declaration_order() {
        let mut set = ActionSet::new();
        set.insert(Arc::new(Action::new("Zeta")), noop_invoker()).unwrap();
        set.insert(Arc::new(Action::new("Alpha")), noop_invoker()).unwrap();
        let names: Vec<String> = set.all().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_scpd_element() {
        let elem = set_target().to_scpd_element();
        assert_eq!(elem.get_child("name").unwrap().get_text().unwrap(), "SetTarget");
        let list = elem.get_child("argumentList").unwrap();
        let argument = list.get_child("argument").unwrap();
        assert_eq!(
            argument.get_child("direction").unwrap().get_text().unwrap(),
            "in"
        );
        assert_eq!(
            argument
                .get_child("relatedStateVariable")
                .unwrap()
                .get_text()
                .unwrap(),
            "Target"
        );
    }

    #[test]
    fn test_failure_constructors() {
        assert_eq!(ActionFailure::invalid_action().code, 401);
        assert_eq!(ActionFailure::value_out_of_range("Volume").code, 601);
        assert!(ActionFailure::invalid_args("missing newTargetValue")
            .description
            .contains("newTargetValue"));
    }
}
