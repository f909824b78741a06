//! Implémentation de ServiceInstance.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::time;
use tracing::{debug, error, info, warn};
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::actions::{ActionInputs, ActionSet};
use crate::config::get_config;
use crate::dataelements::Udn;
use crate::services::Service;
use crate::services::eventing::{
    self, NON_EVENTED_TIMEOUT_SECS, Subscriber, SubscriberSet, SubscribeAction,
    build_property_set, classify_subscribe, parse_timeout_header, send_notify,
};
use crate::soap::{SoapFault, build_soap_fault, build_soap_response, parse_soap_action};
use crate::state_variables::{StateVarInstance, StateVarInstanceSet, StateVariableError};

/// Méthodes HTTP des événements UPnP.
pub const METHOD_SUBSCRIBE: &str = "SUBSCRIBE";
pub const METHOD_UNSUBSCRIBE: &str = "UNSUBSCRIBE";

/// Référence légère vers le device parent (pas de propriété cyclique).
#[derive(Debug, Clone)]
pub struct ParentDeviceHandle {
    pub name: String,
    pub udn: Udn,
    pub route: String,
    pub base_url: String,
}

/// Instance de service UPnP attachée à un device.
///
/// Gère l'exécution des actions SOAP, les abonnements GENA et les
/// notifications de changements d'état.
///
/// # Cycle de vie
///
/// 1. Création via [`ServiceInstance::new`]
/// 2. Attachement au device parent puis [`register_urls`](Self::register_urls)
/// 3. Démarrage du notifier avec [`start_notifier`](Self::start_notifier)
#[derive(Clone)]
pub struct ServiceInstance {
    /// Modèle du service
    model: Arc<Service>,

    /// Device parent, renseigné à l'attachement
    parent: Arc<RwLock<Option<ParentDeviceHandle>>>,

    /// Variables d'état instanciées
    statevariables: Arc<StateVarInstanceSet>,

    /// Actions instanciées et leurs invocateurs
    actions: Arc<ActionSet>,

    /// Abonnés GENA
    subscribers: Arc<RwLock<SubscriberSet>>,

    /// Changements en attente de notification (ordre préservé, dédupliqué)
    changed_buffer: Arc<Mutex<Vec<(String, String)>>>,

    /// Client HTTP partagé pour les NOTIFY
    http_client: reqwest::Client,
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.model.name())
            .field("service_type", &self.model.service_type())
            .finish()
    }
}

impl ServiceInstance {
    pub fn new(model: &Service) -> Self {
        let changed_buffer: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));

        // Phase 1 : instancier les variables d'état ; les variables
        // événementielles alimentent le buffer de changements
        let mut statevariables = StateVarInstanceSet::new();
        for definition in model.variables() {
            let instance = Arc::new(StateVarInstance::new(Arc::clone(definition)));
            if definition.is_evented() {
                let buffer = Arc::clone(&changed_buffer);
                instance.add_observer(Box::new(move |name, value| {
                    let mut pending = buffer.lock().unwrap();
                    let lexical = value.to_lexical();
                    if let Some(entry) = pending.iter_mut().find(|(n, _)| n == name) {
                        entry.1 = lexical;
                    } else {
                        pending.push((name.to_string(), lexical));
                    }
                }));
            }
            if let Err(e) = statevariables.insert(instance) {
                error!("Failed to insert state variable: {:?}", e);
            }
        }

        // Phase 2 : instancier les actions, en vérifiant que chaque
        // argument référence une variable déclarée
        let mut actions = ActionSet::new();
        for (action, invoker) in model.actions() {
            let missing: Vec<&str> = action
                .arguments()
                .iter()
                .map(|a| a.related_state_variable())
                .filter(|name| statevariables.get_by_name(name).is_none())
                .collect();

            if !missing.is_empty() {
                error!(
                    "Action '{}' references missing state variables: {:?}",
                    action.name(),
                    missing
                );
                continue;
            }

            if let Err(e) = actions.insert(Arc::clone(action), invoker.clone()) {
                error!("Failed to insert action '{}': {:?}", action.name(), e);
            }
        }

        Self {
            model: Arc::new(model.clone()),
            parent: Arc::new(RwLock::new(None)),
            statevariables: Arc::new(statevariables),
            actions: Arc::new(actions),
            subscribers: Arc::new(RwLock::new(SubscriberSet::new())),
            changed_buffer,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn service_type(&self) -> String {
        self.model.service_type()
    }

    pub fn service_id(&self) -> String {
        self.model.service_id()
    }

    pub fn is_evented(&self) -> bool {
        self.model.is_evented()
    }

    /// Attache le service à son device parent.
    pub fn set_parent(&self, parent: ParentDeviceHandle) {
        *self.parent.write().unwrap() = Some(parent);
    }

    /// Variables d'état du service.
    pub fn statevariables(&self) -> &StateVarInstanceSet {
        &self.statevariables
    }

    /// Raccourci : variable d'état par nom.
    pub fn get_variable(&self, name: &str) -> Option<Arc<StateVarInstance>> {
        self.statevariables.get_by_name(name)
    }

    /// Modifie une variable d'état depuis le code applicatif.
    ///
    /// Refusé lorsque la configuration déclare les variables immuables ;
    /// les invocateurs d'actions, eux, écrivent directement dans le set.
    pub fn set_variable(&self, name: &str, lexical: &str) -> Result<bool, StateVariableError> {
        if get_config().state_variables_are_immutable {
            warn!("State variables are configured immutable, refusing write to '{}'", name);
            return Err(StateVariableError::Immutable(name.to_string()));
        }
        match self.statevariables.get_by_name(name) {
            Some(instance) => instance.set_from_lexical(lexical),
            None => Err(StateVariableError::Unknown(name.to_string())),
        }
    }

    /// Route du service, relative au serveur HTTP.
    pub fn route(&self) -> String {
        let parent = self.parent.read().unwrap();
        match parent.as_ref() {
            Some(parent) => format!("{}/service/{}", parent.route, self.name()),
            None => format!("/service/{}", self.name()),
        }
    }

    pub fn control_route(&self) -> String {
        format!("{}/control", self.route())
    }

    pub fn event_route(&self) -> String {
        format!("{}/event", self.route())
    }

    pub fn scpd_route(&self) -> String {
        format!("{}/scpd.xml", self.route())
    }

    /// USN du service : `<udn>::<serviceType>`.
    pub fn usn(&self) -> String {
        let parent = self.parent.read().unwrap();
        match parent.as_ref() {
            Some(parent) => format!("{}::{}", parent.udn, self.service_type()),
            None => format!("::{}", self.service_type()),
        }
    }

    /// Nombre d'abonnés GENA vivants.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    /// Enregistre les routes SCPD, contrôle et événements.
    pub async fn register_urls(&self, server: &mut crate::server::Server) {
        info!(
            "✅ Service {} available: scpd={}, control={}, event={}",
            self.name(),
            self.scpd_route(),
            self.control_route(),
            self.event_route()
        );

        let instance_scpd = self.clone();
        server
            .add_handler(&self.scpd_route(), move || {
                let instance = instance_scpd.clone();
                async move { instance.scpd_handler().await }
            })
            .await;

        server
            .add_post_handler_with_state(&self.control_route(), control_handler, self.clone())
            .await;

        server
            .add_any_handler_with_state(&self.event_route(), event_sub_handler, self.clone())
            .await;
    }

    /// Génère l'élément XML racine du SCPD.
    pub fn scpd_element(&self) -> Element {
        let mut elem = Element::new("scpd");
        elem.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:service-1-0".to_string(),
        );

        let mut spec = Element::new("specVersion");
        let mut major = Element::new("major");
        major.children.push(XMLNode::Text("1".to_string()));
        spec.children.push(XMLNode::Element(major));
        let mut minor = Element::new("minor");
        minor.children.push(XMLNode::Text("1".to_string()));
        spec.children.push(XMLNode::Element(minor));
        elem.children.push(XMLNode::Element(spec));

        if !self.actions.is_empty() {
            elem.children
                .push(XMLNode::Element(self.actions.to_scpd_element()));
        }

        if !self.statevariables.is_empty() {
            elem.children
                .push(XMLNode::Element(self.statevariables.to_scpd_element()));
        }

        elem
    }

    async fn scpd_handler(&self) -> Response {
        let elem = self.scpd_element();

        let config = EmitterConfig::new().perform_indent(true).indent_string("  ");
        let mut xml_output = Vec::new();
        if let Err(e) = elem.write_with_config(&mut xml_output, config) {
            error!("Failed to serialize SCPD XML: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        let xml = String::from_utf8_lossy(&xml_output).to_string();
        xml_response(StatusCode::OK, xml)
    }

    /// Traite un POST de contrôle SOAP : parse, validation des arguments
    /// d'entrée, exécution de l'invocateur, réponse ou fault.
    pub fn dispatch_control(&self, body: &[u8]) -> (u16, String) {
        let action_request = match parse_soap_action(body) {
            Ok(request) => request,
            Err(e) => {
                debug!("Unparsable SOAP request: {}", e);
                return fault_response(402, format!("Invalid Args: {}", e));
            }
        };

        let Some(action) = self.actions.get_by_name(&action_request.name) else {
            return fault_response(401, "Invalid Action");
        };

        // valider chaque argument IN contre sa variable d'état liée
        let mut inputs = ActionInputs::new();
        for argument in action.in_arguments() {
            let Some(raw) = action_request.arg(argument.name()) else {
                return fault_response(
                    402,
                    format!("Invalid Args: missing argument '{}'", argument.name()),
                );
            };
            // les liaisons d'arguments sont vérifiées à la construction
            let Some(variable) = self
                .statevariables
                .get_by_name(argument.related_state_variable())
            else {
                return fault_response(501, "Action Failed");
            };
            match variable.definition().validate_lexical(raw) {
                Ok(value) => {
                    inputs.insert(argument.name().to_string(), value);
                }
                Err(StateVariableError::OutOfRange { .. }) => {
                    return fault_response(
                        601,
                        format!("Argument Value Out of Range: {}", argument.name()),
                    );
                }
                Err(_) => {
                    return fault_response(
                        600,
                        format!("Argument Value Invalid: {}", argument.name()),
                    );
                }
            }
        }

        let Some(invoker) = self.actions.invoker_for(&action_request.name) else {
            return fault_response(602, "Optional Action Not Implemented");
        };

        match invoker(&self.statevariables, &inputs) {
            Ok(outputs) => match build_soap_response(
                &self.service_type(),
                &action_request.name,
                &outputs,
            ) {
                Ok(xml) => (200, xml),
                Err(e) => {
                    error!("Failed to serialize SOAP response: {}", e);
                    fault_response(501, "Action Failed")
                }
            },
            Err(failure) => fault_response(failure.code, failure.description),
        }
    }

    /// Ajoute un abonné et retourne (SID, timeout accordé en secondes).
    pub fn add_subscriber(&self, callbacks: Vec<String>, requested_timeout: Option<&str>) -> (String, u32) {
        let config = get_config();
        let granted = if self.is_evented() {
            parse_timeout_header(requested_timeout, config.max_subscription_timeout_secs)
        } else {
            // service non événementiel : abonnement accepté, un jour, zéro événement
            NON_EVENTED_TIMEOUT_SECS
        };

        let subscriber = Subscriber::new(callbacks, Duration::from_secs(granted as u64));
        let sid = self.subscribers.write().unwrap().insert(subscriber);
        info!("🔒 New subscription on {}: SID={}, Timeout={}s", self.name(), sid, granted);
        (sid, granted)
    }

    /// Renouvelle un abonnement ; retourne le timeout accordé.
    pub fn renew_subscriber(&self, sid: &str, requested_timeout: Option<&str>) -> Option<u32> {
        let config = get_config();
        let granted = if self.is_evented() {
            parse_timeout_header(requested_timeout, config.max_subscription_timeout_secs)
        } else {
            NON_EVENTED_TIMEOUT_SECS
        };
        let renewed = self
            .subscribers
            .write()
            .unwrap()
            .renew(sid, Duration::from_secs(granted as u64));
        if renewed {
            info!("♻️ Renewed SID {} for {}s", sid, granted);
            Some(granted)
        } else {
            None
        }
    }

    /// Supprime un abonné ; `false` si le SID est inconnu.
    pub fn remove_subscriber(&self, sid: &str) -> bool {
        self.subscribers.write().unwrap().remove(sid)
    }

    /// Snapshot de toutes les variables événementielles, pour l'événement
    /// initial (SEQ=0).
    pub fn evented_snapshot(&self) -> Vec<(String, String)> {
        self.statevariables
            .all()
            .iter()
            .filter(|v| v.is_evented())
            .map(|v| (v.name().to_string(), v.lexical()))
            .collect()
    }

    /// Envoie l'événement initial à un nouvel abonné : SEQ=0 et l'ensemble
    /// complet des variables événementielles.
    pub async fn send_initial_event(&self, sid: String) {
        let snapshot = self.evented_snapshot();
        if snapshot.is_empty() {
            return;
        }

        let (callbacks, seq) = {
            let mut subscribers = self.subscribers.write().unwrap();
            let Some(subscriber) = subscribers.get_mut(&sid) else {
                return;
            };
            (subscriber.callbacks().to_vec(), subscriber.advance_seq())
        };

        let body = build_property_set(&snapshot);

        // budget de 3 s sur la première tentative ; au-delà, l'abonné ne
        // respecte probablement pas le keep-alive HTTP et on repart sur
        // une connexion neuve avec le timeout standard
        let quick_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_else(|_| self.http_client.clone());

        for callback in &callbacks {
            if send_notify(&quick_client, callback, &sid, seq, body.clone())
                .await
                .is_ok()
            {
                info!("✅ Initial event sent to {} (SEQ=0)", callback);
                return;
            }
            warn!(
                "Initial notify to SID {} failed within 3s; the subscriber does not seem to \
                 respect HTTP keep-alive. Re-sending on a fresh connection.",
                sid
            );
            if send_notify(&self.http_client, callback, &sid, seq, body.clone())
                .await
                .is_ok()
            {
                info!("✅ Initial event sent to {} after retry", callback);
                return;
            }
        }
        error!("Failed to deliver initial event for SID {}", sid);
    }

    /// Notifie tous les abonnés des changements en attente. Les livraisons
    /// se font hors verrou ; l'ordre des SEQ est garanti par abonné car ce
    /// chemin n'est parcouru que par la tâche du notifier.
    pub async fn notify_subscribers(&self) {
        {
            let mut subscribers = self.subscribers.write().unwrap();
            subscribers.expire_lapsed(Instant::now());
        }

        let changed = {
            let mut buffer = self.changed_buffer.lock().unwrap();
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        let deliveries: Vec<(String, Vec<String>, u32)> = {
            let mut subscribers = self.subscribers.write().unwrap();
            subscribers
                .sids()
                .into_iter()
                .filter_map(|sid| {
                    subscribers
                        .get_mut(&sid)
                        .map(|s| (sid, s.callbacks().to_vec(), s.advance_seq()))
                })
                .collect()
        };

        if deliveries.is_empty() {
            return;
        }

        let body = build_property_set(&changed);

        for (sid, callbacks, seq) in deliveries {
            let mut delivered = false;
            for callback in &callbacks {
                if send_notify(&self.http_client, callback, &sid, seq, body.clone())
                    .await
                    .is_ok()
                {
                    debug!("✅ Notified subscriber {} (SEQ={})", callback, seq);
                    delivered = true;
                    break;
                }
            }

            let mut subscribers = self.subscribers.write().unwrap();
            if let Some(subscriber) = subscribers.get_mut(&sid) {
                if delivered {
                    subscriber.record_delivery_success();
                } else if subscriber.record_delivery_failure() {
                    warn!(
                        "Expiring subscription {} after {} consecutive delivery failures",
                        sid,
                        eventing::MAX_DELIVERY_FAILURES
                    );
                    subscribers.remove(&sid);
                }
            }
        }
    }

    /// Démarre le notifier périodique.
    pub fn start_notifier(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let instance = self.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            info!("✅ Starting notifier for {} every {:?}", instance.name(), interval);

            loop {
                ticker.tick().await;
                instance.notify_subscribers().await;
            }
        })
    }
}

fn xml_response(status: StatusCode, xml: String) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")],
        xml,
    )
        .into_response()
}

fn fault_response(code: u16, description: impl Into<String>) -> (u16, String) {
    let fault = SoapFault::upnp(code, description);
    let status = fault.http_status();
    let xml = build_soap_fault(&fault).unwrap_or_else(|_| String::new());
    (status, xml)
}

fn rfc1123_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Handler Axum du contrôle SOAP.
fn control_handler(
    State(instance): State<ServiceInstance>,
    body: String,
) -> Pin<Box<dyn Future<Output = Response> + Send>> {
    Box::pin(async move {
        debug!("📡 Control request for {}", instance.name());
        let (status, xml) = instance.dispatch_control(body.as_bytes());
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        xml_response(status, xml)
    })
}

/// Handler Axum des événements (SUBSCRIBE/UNSUBSCRIBE).
fn event_sub_handler(
    State(instance): State<ServiceInstance>,
    headers: HeaderMap,
    req: Request<Body>,
) -> Pin<Box<dyn Future<Output = Response> + Send>> {
    Box::pin(async move {
        debug!("📡 Event subscription request for {}", instance.name());

        let method = req.method().as_str().to_ascii_uppercase();
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        match method.as_str() {
            METHOD_SUBSCRIBE => {
                match classify_subscribe(header("NT"), header("CALLBACK"), header("SID")) {
                    SubscribeAction::New { callbacks } => {
                        let (sid, granted) =
                            instance.add_subscriber(callbacks, header("TIMEOUT"));

                        let response = subscription_response(&sid, granted);

                        let instance_clone = instance.clone();
                        let sid_clone = sid.clone();
                        tokio::spawn(async move {
                            instance_clone.send_initial_event(sid_clone).await;
                        });

                        response
                    }
                    SubscribeAction::Renew { sid } => {
                        match instance.renew_subscriber(&sid, header("TIMEOUT")) {
                            Some(granted) => subscription_response(&sid, granted),
                            None => StatusCode::PRECONDITION_FAILED.into_response(),
                        }
                    }
                    SubscribeAction::BadRequest => {
                        warn!("SUBSCRIBE with incompatible header fields");
                        (StatusCode::BAD_REQUEST, "Incompatible header fields").into_response()
                    }
                }
            }
            METHOD_UNSUBSCRIBE => {
                if header("CALLBACK").is_some() || header("NT").is_some() {
                    return (StatusCode::BAD_REQUEST, "Incompatible header fields")
                        .into_response();
                }
                match header("SID") {
                    Some(sid) if instance.remove_subscriber(sid) => {
                        info!("❌ Unsubscribed SID={}", sid);
                        StatusCode::OK.into_response()
                    }
                    Some(_) => StatusCode::PRECONDITION_FAILED.into_response(),
                    None => (StatusCode::BAD_REQUEST, "Incompatible header fields")
                        .into_response(),
                }
            }
            other => {
                warn!("Unsupported EventSub method: {}", other);
                StatusCode::METHOD_NOT_ALLOWED.into_response()
            }
        }
    })
}

fn subscription_response(sid: &str, granted_secs: u32) -> Response {
    let config = get_config();
    axum::http::Response::builder()
        .status(StatusCode::OK)
        .header("SID", sid)
        .header("TIMEOUT", format!("Second-{}", granted_secs))
        .header("SERVER", config.server_token)
        .header("DATE", rfc1123_date())
        .body(Body::empty())
        .unwrap()
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    use crate::actions::{Action, ActionFailure, Argument};
    use crate::soap::{parse_soap_envelope, parse_soap_response, parse_upnp_fault};
    use crate::state_variables::StateVariable;
    use crate::variable_types::{StateValue, StateVarType};

    /// Le service SwitchPower:1 du standard, avec Target/Status.
    fn switch_power() -> Service {
        let mut service = Service::new("SwitchPower");
        service.add_variable(StateVariable::new("Target", StateVarType::Boolean)
            .with_default(StateValue::Boolean(false)));
        service.add_variable(
            StateVariable::new("Status", StateVarType::Boolean)
                .with_default(StateValue::Boolean(false))
                .evented(),
        );

        service.add_action(
            Action::new("SetTarget").with_argument(Argument::input("newTargetValue", "Target")),
            StdArc::new(|variables, inputs| {
                let value = inputs
                    .get("newTargetValue")
                    .cloned()
                    .ok_or_else(|| ActionFailure::invalid_args("missing newTargetValue"))?;
                let target = variables.get_by_name("Target").unwrap();
                target
                    .set_value(value.clone())
                    .map_err(|e| ActionFailure::action_failed(e.to_string()))?;
                // un interrupteur idéal : le statut suit la cible
                let status = variables.get_by_name("Status").unwrap();
                status
                    .set_value(value)
                    .map_err(|e| ActionFailure::action_failed(e.to_string()))?;
                Ok(Vec::new())
            }),
        );

        service.add_action(
            Action::new("GetStatus").with_argument(Argument::output("ResultStatus", "Status")),
            StdArc::new(|variables, _| {
                let status = variables.get_by_name("Status").unwrap();
                Ok(vec![("ResultStatus".to_string(), status.lexical())])
            }),
        );

        service
    }

    fn soap_body(action: &str, args: &[(&str, &str)]) -> String {
        crate::soap::build_soap_request(
            "urn:schemas-upnp-org:service:SwitchPower:1",
            action,
            args,
        )
        .unwrap()
    }

    #[test]
    fn test_set_target_updates_status() {
        let instance = ServiceInstance::new(&switch_power());

        let (status, xml) =
            instance.dispatch_control(soap_body("SetTarget", &[("newTargetValue", "1")]).as_bytes());
        assert_eq!(status, 200);
        assert!(xml.contains("SetTargetResponse"));

        assert_eq!(instance.get_variable("Status").unwrap().lexical(), "1");

        let (status, xml) = instance.dispatch_control(soap_body("GetStatus", &[]).as_bytes());
        assert_eq!(status, 200);
        let outputs = parse_soap_response(xml.as_bytes(), "GetStatus").unwrap();
        assert_eq!(outputs.get("ResultStatus"), Some(&"1".to_string()));
    }

    #[test]
    fn test_unknown_action_is_401() {
        let instance = ServiceInstance::new(&switch_power());
        let (status, xml) = instance.dispatch_control(soap_body("Reboot", &[]).as_bytes());
        assert_eq!(status, 401);
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(parse_upnp_fault(&envelope).unwrap().error_code, 401);
    }

    #[test]
    fn test_missing_argument_is_402() {
        let instance = ServiceInstance::new(&switch_power());
        let (status, _) = instance.dispatch_control(soap_body("SetTarget", &[]).as_bytes());
        assert_eq!(status, 402);
    }

    #[test]
    fn test_invalid_argument_value_is_600() {
        let instance = ServiceInstance::new(&switch_power());
        let (status, xml) = instance
            .dispatch_control(soap_body("SetTarget", &[("newTargetValue", "maybe")]).as_bytes());
        assert_eq!(status, 600);
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(parse_upnp_fault(&envelope).unwrap().error_code, 600);
    }

    #[test]
    fn test_change_is_buffered_for_eventing() {
        let instance = ServiceInstance::new(&switch_power());
        instance
            .dispatch_control(soap_body("SetTarget", &[("newTargetValue", "1")]).as_bytes());

        let pending = instance.changed_buffer.lock().unwrap();
        // seul Status est événementiel ; Target ne doit pas apparaître
        assert_eq!(*pending, vec![("Status".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_subscription_lifecycle() {
        let instance = ServiceInstance::new(&switch_power());
        let (sid, granted) = instance.add_subscriber(
            vec!["http://192.168.1.20:4004/cb".to_string()],
            Some("Second-300"),
        );
        assert!(sid.starts_with("uuid:"));
        assert_eq!(granted, 300);
        assert_eq!(instance.subscriber_count(), 1);

        assert!(instance.renew_subscriber(&sid, Some("Second-300")).is_some());
        assert!(instance.renew_subscriber("uuid:unknown", None).is_none());

        assert!(instance.remove_subscriber(&sid));
        assert!(!instance.remove_subscriber(&sid));
    }

    #[test]
    fn test_timeout_is_bounded_by_config() {
        let instance = ServiceInstance::new(&switch_power());
        let (_, granted) = instance.add_subscriber(
            vec!["http://192.168.1.20:4004/cb".to_string()],
            Some("Second-999999"),
        );
        assert_eq!(granted, get_config().max_subscription_timeout_secs);
    }

    #[test]
    fn test_non_evented_service_gets_day_long_subscription() {
        let mut service = Service::new("Inert");
        service.add_variable(StateVariable::new("Opaque", StateVarType::String));
        let instance = ServiceInstance::new(&service);
        let (_, granted) = instance.add_subscriber(
            vec!["http://192.168.1.20:4004/cb".to_string()],
            Some("Second-300"),
        );
        assert_eq!(granted, NON_EVENTED_TIMEOUT_SECS);
        assert!(instance.evented_snapshot().is_empty());
    }

    #[test]
    fn test_evented_snapshot() {
        let instance = ServiceInstance::new(&switch_power());
        assert_eq!(
            instance.evented_snapshot(),
            vec![("Status".to_string(), "0".to_string())]
        );
    }

    #[test]
    fn test_scpd_contains_actions_and_state_table() {
        let instance = ServiceInstance::new(&switch_power());
        let scpd = instance.scpd_element();
        assert!(scpd.get_child("actionList").is_some());
        assert!(scpd.get_child("serviceStateTable").is_some());
        let table = scpd.get_child("serviceStateTable").unwrap();
        assert_eq!(table.children.len(), 2);
    }

    #[test]
    fn test_action_with_unknown_related_variable_is_dropped() {
        let mut service = Service::new("Broken");
        service.add_variable(StateVariable::new("Known", StateVarType::String));
        service.add_action(
            Action::new("Bad").with_argument(Argument::input("Arg", "Unknown")),
            StdArc::new(|_, _| Ok(Vec::new())),
        );
        let instance = ServiceInstance::new(&service);
        assert!(instance.actions.get_by_name("Bad").is_none());
    }
}
