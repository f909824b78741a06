//! Device description and SCPD fetching/parsing.
//!
//! The description document is a small recursive tree: it is parsed with a
//! DOM (`xmltree`). SCPDs are flat and parsed with the `quick-xml` pull
//! reader. Both support a strict mode (reject non-conforming documents)
//! and a tolerant mode (log, drop the offending action, continue).

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;
use tracing::{debug, warn};
use ureq::Agent;
use url::Url;
use xmltree::Element;

use pavupnp::actions::{Action, Argument};
use pavupnp::dataelements::{ModelInfo, ResourceType, ServiceId, Udn};
use pavupnp::state_variables::{EventingMode, StateVariable, ValueRange};
use pavupnp::variable_types::{StateValue, StateVarType};

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("Failed to read HTTP body: {0}")]
    HttpIo(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("SCPD parsing error: {0}")]
    Scpd(#[from] quick_xml::Error),

    #[error("Missing required device element: {0}")]
    MissingField(&'static str),

    #[error("Invalid device description: {0}")]
    InvalidDevice(String),

    #[error("Invalid service description: {0}")]
    InvalidService(String),
}

/// Icon reference from a description document.
#[derive(Debug, Clone)]
pub struct ParsedIcon {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
}

/// Service references from a `<service>` entry.
#[derive(Debug, Clone)]
pub struct ParsedServiceRef {
    pub service_type: ResourceType,
    pub service_id: ServiceId,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

/// A `<device>` element, embedded devices included.
#[derive(Debug, Clone)]
pub struct ParsedDevice {
    pub device_type: ResourceType,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model: ModelInfo,
    pub serial_number: Option<String>,
    pub udn: Udn,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
    pub icons: Vec<ParsedIcon>,
    pub services: Vec<ParsedServiceRef>,
    pub embedded: Vec<ParsedDevice>,
}

impl ParsedDevice {
    /// All UDNs of the tree, root first.
    pub fn all_udns(&self) -> Vec<&Udn> {
        let mut udns = vec![&self.udn];
        for child in &self.embedded {
            udns.extend(child.all_udns());
        }
        udns
    }
}

/// A parsed root description document.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub url_base: Option<String>,
    pub device: ParsedDevice,
}

/// Parsed SCPD: action and state-variable schemas.
#[derive(Debug)]
pub struct Scpd {
    pub actions: Vec<Action>,
    pub variables: Vec<Arc<StateVariable>>,
}

impl Scpd {
    /// At least one state variable is evented.
    pub fn is_evented(&self) -> bool {
        self.variables.iter().any(|v| v.is_evented())
    }
}

fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Fetches and parses the description document at `location`.
pub fn fetch_device_description(
    location: &str,
    timeout: Duration,
) -> Result<DeviceDescription, DescriptionError> {
    debug!("Fetching device description at {}", location);
    let agent = build_agent(timeout);
    let mut response = agent.get(location).call().map_err(Box::new)?;
    if !response.status().is_success() {
        return Err(DescriptionError::InvalidDevice(format!(
            "GET {} returned HTTP {}",
            location,
            response.status()
        )));
    }
    let body = response.body_mut().read_to_vec().map_err(Box::new)?;
    parse_device_description(&body)
}

/// Parses a description document.
pub fn parse_device_description(xml: &[u8]) -> Result<DeviceDescription, DescriptionError> {
    let root = Element::parse(BufReader::new(xml))?;

    let url_base = root
        .get_child("URLBase")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let device_elem = root
        .get_child("device")
        .ok_or(DescriptionError::MissingField("device"))?;

    Ok(DeviceDescription {
        url_base,
        device: parse_device_element(device_elem)?,
    })
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn parse_device_element(elem: &Element) -> Result<ParsedDevice, DescriptionError> {
    let device_type_urn =
        child_text(elem, "deviceType").ok_or(DescriptionError::MissingField("deviceType"))?;
    let device_type: ResourceType = device_type_urn
        .parse()
        .map_err(|_| DescriptionError::InvalidDevice(device_type_urn.clone()))?;

    let friendly_name =
        child_text(elem, "friendlyName").ok_or(DescriptionError::MissingField("friendlyName"))?;
    let udn_text = child_text(elem, "UDN").ok_or(DescriptionError::MissingField("UDN"))?;
    let udn: Udn = udn_text
        .parse()
        .map_err(|_| DescriptionError::InvalidDevice(format!("bad UDN '{}'", udn_text)))?;

    let mut icons = Vec::new();
    if let Some(icon_list) = elem.get_child("iconList") {
        for icon_elem in icon_list.children.iter().filter_map(|n| n.as_element()) {
            let Some(url) = child_text(icon_elem, "url") else {
                continue;
            };
            icons.push(ParsedIcon {
                mime_type: child_text(icon_elem, "mimetype").unwrap_or_default(),
                width: child_text(icon_elem, "width")
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(0),
                height: child_text(icon_elem, "height")
                    .and_then(|h| h.parse().ok())
                    .unwrap_or(0),
                depth: child_text(icon_elem, "depth")
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(0),
                url,
            });
        }
    }

    let mut services = Vec::new();
    if let Some(service_list) = elem.get_child("serviceList") {
        for service_elem in service_list.children.iter().filter_map(|n| n.as_element()) {
            let service_type_urn = child_text(service_elem, "serviceType")
                .ok_or(DescriptionError::MissingField("serviceType"))?;
            let service_type: ResourceType = service_type_urn
                .parse()
                .map_err(|_| DescriptionError::InvalidDevice(service_type_urn.clone()))?;
            let service_id_urn = child_text(service_elem, "serviceId")
                .ok_or(DescriptionError::MissingField("serviceId"))?;
            let service_id: ServiceId = service_id_urn
                .parse()
                .map_err(|_| DescriptionError::InvalidDevice(service_id_urn.clone()))?;

            services.push(ParsedServiceRef {
                service_type,
                service_id,
                scpd_url: child_text(service_elem, "SCPDURL")
                    .ok_or(DescriptionError::MissingField("SCPDURL"))?,
                control_url: child_text(service_elem, "controlURL")
                    .ok_or(DescriptionError::MissingField("controlURL"))?,
                event_sub_url: child_text(service_elem, "eventSubURL").unwrap_or_default(),
            });
        }
    }

    let mut embedded = Vec::new();
    if let Some(device_list) = elem.get_child("deviceList") {
        for child in device_list.children.iter().filter_map(|n| n.as_element()) {
            if child.name == "device" {
                embedded.push(parse_device_element(child)?);
            }
        }
    }

    Ok(ParsedDevice {
        device_type,
        friendly_name,
        manufacturer: child_text(elem, "manufacturer").unwrap_or_default(),
        manufacturer_url: child_text(elem, "manufacturerURL"),
        model: ModelInfo {
            description: child_text(elem, "modelDescription"),
            name: child_text(elem, "modelName").unwrap_or_default(),
            number: child_text(elem, "modelNumber"),
            url: child_text(elem, "modelURL"),
        },
        serial_number: child_text(elem, "serialNumber"),
        udn,
        upc: child_text(elem, "UPC"),
        presentation_url: child_text(elem, "presentationURL"),
        icons,
        services,
        embedded,
    })
}

/// Fetches and parses a SCPD.
pub fn fetch_scpd(url: &str, timeout: Duration, strict: bool) -> Result<Scpd, DescriptionError> {
    debug!("Fetching SCPD at {}", url);
    let agent = build_agent(timeout);
    let mut response = agent.get(url).call().map_err(Box::new)?;
    if !response.status().is_success() {
        return Err(DescriptionError::InvalidService(format!(
            "GET {} returned HTTP {}",
            url,
            response.status()
        )));
    }
    let body = response.body_mut().read_to_vec().map_err(Box::new)?;
    parse_scpd(&body, strict)
}

#[derive(Default)]
struct PendingArgument {
    name: Option<String>,
    direction: Option<String>,
    related: Option<String>,
}

#[derive(Default)]
struct PendingAction {
    name: Option<String>,
    arguments: Vec<PendingArgument>,
}

#[derive(Default)]
struct PendingVariable {
    name: Option<String>,
    data_type: Option<String>,
    default_value: Option<String>,
    allowed_values: Vec<String>,
    range_minimum: Option<String>,
    range_maximum: Option<String>,
    range_step: Option<String>,
    send_events: bool,
    multicast: bool,
}

/// Parses `<actionList>` and `<serviceStateTable>` out of a SCPD.
///
/// Strict mode rejects a missing mandatory element with
/// [`DescriptionError::InvalidService`] ; tolerant mode logs and drops the
/// offending action.
pub fn parse_scpd(xml: &[u8], strict: bool) -> Result<Scpd, DescriptionError> {
    let mut reader = Reader::from_reader(BufReader::new(xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut pending_actions: Vec<PendingAction> = Vec::new();
    let mut pending_variables: Vec<PendingVariable> = Vec::new();

    let mut current_action: Option<PendingAction> = None;
    let mut current_argument: Option<PendingArgument> = None;
    let mut current_variable: Option<PendingVariable> = None;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "action" => current_action = Some(PendingAction::default()),
                    "argument" => current_argument = Some(PendingArgument::default()),
                    "stateVariable" => {
                        let mut variable = PendingVariable {
                            // sendEvents vaut yes par défaut dans l'UDA
                            send_events: true,
                            ..PendingVariable::default()
                        };
                        for attribute in e.attributes().flatten() {
                            let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
                            let value =
                                String::from_utf8_lossy(attribute.value.as_ref()).to_string();
                            match key.as_str() {
                                "sendEvents" => {
                                    variable.send_events = value.eq_ignore_ascii_case("yes")
                                }
                                "multicast" => {
                                    variable.multicast = value.eq_ignore_ascii_case("yes")
                                }
                                _ => {}
                            }
                        }
                        current_variable = Some(variable);
                    }
                    _ => current_tag = Some(name),
                }
            }
            Event::Text(e) => {
                let Some(tag) = current_tag.as_deref() else {
                    continue;
                };
                let text = e.unescape().map(|t| t.trim().to_string()).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }

                if let Some(argument) = current_argument.as_mut() {
                    match tag {
                        "name" => argument.name = Some(text),
                        "direction" => argument.direction = Some(text),
                        "relatedStateVariable" => argument.related = Some(text),
                        _ => {}
                    }
                } else if let Some(action) = current_action.as_mut() {
                    if tag == "name" {
                        action.name = Some(text);
                    }
                } else if let Some(variable) = current_variable.as_mut() {
                    match tag {
                        "name" => variable.name = Some(text),
                        "dataType" => variable.data_type = Some(text),
                        "defaultValue" => variable.default_value = Some(text),
                        "allowedValue" => variable.allowed_values.push(text),
                        "minimum" => variable.range_minimum = Some(text),
                        "maximum" => variable.range_maximum = Some(text),
                        "step" => variable.range_step = Some(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "argument" => {
                        if let (Some(action), Some(argument)) =
                            (current_action.as_mut(), current_argument.take())
                        {
                            action.arguments.push(argument);
                        }
                    }
                    "action" => {
                        if let Some(action) = current_action.take() {
                            pending_actions.push(action);
                        }
                    }
                    "stateVariable" => {
                        if let Some(variable) = current_variable.take() {
                            pending_variables.push(variable);
                        }
                    }
                    _ => {}
                }
                current_tag = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let variables = finalize_variables(pending_variables, strict)?;
    let actions = finalize_actions(pending_actions, &variables, strict)?;

    Ok(Scpd { actions, variables })
}

fn finalize_variables(
    pending: Vec<PendingVariable>,
    strict: bool,
) -> Result<Vec<Arc<StateVariable>>, DescriptionError> {
    let mut variables = Vec::new();
    for entry in pending {
        let (Some(name), Some(data_type)) = (entry.name.clone(), entry.data_type.clone()) else {
            if strict {
                return Err(DescriptionError::InvalidService(
                    "stateVariable missing name or dataType".to_string(),
                ));
            }
            warn!("Dropping state variable missing name or dataType");
            continue;
        };

        let Ok(var_type) = data_type.parse::<StateVarType>() else {
            if strict {
                return Err(DescriptionError::InvalidService(format!(
                    "unknown dataType '{}' for '{}'",
                    data_type, name
                )));
            }
            warn!("Dropping state variable '{}' with unknown dataType '{}'", name, data_type);
            continue;
        };

        let eventing = match (entry.send_events, entry.multicast) {
            (false, _) => EventingMode::NoEvents,
            (true, false) => EventingMode::UnicastOnly,
            (true, true) => EventingMode::UnicastAndMulticast,
        };

        let mut variable = StateVariable::new(name.clone(), var_type).with_eventing(eventing);

        if let Some(default) = entry.default_value {
            match StateValue::parse(var_type, &default) {
                Ok(value) => variable = variable.with_default(value),
                Err(_) => warn!("Ignoring non-conforming defaultValue '{}' of '{}'", default, name),
            }
        }
        if !entry.allowed_values.is_empty() {
            variable = variable.with_allowed_values(entry.allowed_values);
        }
        if let (Some(minimum), Some(maximum)) = (entry.range_minimum, entry.range_maximum) {
            if let (Ok(minimum), Ok(maximum)) = (minimum.parse::<f64>(), maximum.parse::<f64>()) {
                let step = entry.range_step.and_then(|s| s.parse().ok());
                variable = variable.with_range(ValueRange::new(minimum, maximum, step));
            }
        }

        variables.push(Arc::new(variable));
    }
    Ok(variables)
}

fn finalize_actions(
    pending: Vec<PendingAction>,
    variables: &[Arc<StateVariable>],
    strict: bool,
) -> Result<Vec<Action>, DescriptionError> {
    let mut actions = Vec::new();

    'next_action: for entry in pending {
        let Some(name) = entry.name.clone() else {
            if strict {
                return Err(DescriptionError::InvalidService(
                    "action missing name".to_string(),
                ));
            }
            warn!("Dropping unnamed action");
            continue;
        };

        let mut action = Action::new(name.clone());
        for argument in entry.arguments {
            let (Some(arg_name), Some(direction), Some(related)) =
                (argument.name, argument.direction, argument.related)
            else {
                if strict {
                    return Err(DescriptionError::InvalidService(format!(
                        "action '{}' has an argument missing a mandatory element",
                        name
                    )));
                }
                warn!("Dropping action '{}' with incomplete argument", name);
                continue 'next_action;
            };

            if !variables.iter().any(|v| v.name() == related) {
                if strict {
                    return Err(DescriptionError::InvalidService(format!(
                        "argument '{}' of '{}' references undeclared variable '{}'",
                        arg_name, name, related
                    )));
                }
                warn!(
                    "Dropping action '{}': argument '{}' references undeclared variable '{}'",
                    name, arg_name, related
                );
                continue 'next_action;
            }

            action = if direction.eq_ignore_ascii_case("in") {
                action.with_argument(Argument::input(arg_name, related))
            } else {
                action.with_argument(Argument::output(arg_name, related))
            };
        }

        actions.push(action);
    }

    Ok(actions)
}

/// Resolves a possibly relative URL against `URLBase`, falling back to the
/// description LOCATION.
pub fn resolve_url(location: &str, url_base: Option<&str>, relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return relative.to_string();
    }
    let base = url_base.unwrap_or(location);
    match Url::parse(base).and_then(|b| b.join(relative)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => format!("{}/{}", base.trim_end_matches('/'), relative.trim_start_matches('/')),
    }
}

/// Fetches icon bytes.
pub fn fetch_icon(url: &str, timeout: Duration) -> Result<Vec<u8>, DescriptionError> {
    let agent = build_agent(timeout);
    let mut response = agent.get(url).call().map_err(Box::new)?;
    if !response.status().is_success() {
        return Err(DescriptionError::InvalidDevice(format!(
            "GET {} returned HTTP {}",
            url,
            response.status()
        )));
    }
    Ok(response.body_mut().read_to_vec().map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:Light:1</deviceType>
    <friendlyName>Hall Light</friendlyName>
    <manufacturer>Pavillon</manufacturer>
    <modelName>L-100</modelName>
    <UDN>uuid:A</UDN>
    <iconList>
      <icon>
        <mimetype>image/png</mimetype>
        <width>48</width><height>48</height><depth>24</depth>
        <url>/device/light/icon/0</url>
      </icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:SwitchPower:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:SwitchPower</serviceId>
        <SCPDURL>/device/light/service/SwitchPower/scpd.xml</SCPDURL>
        <controlURL>/device/light/service/SwitchPower/control</controlURL>
        <eventSubURL>/device/light/service/SwitchPower/event</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Dimmer:1</deviceType>
        <friendlyName>Dimmer</friendlyName>
        <UDN>uuid:B</UDN>
      </device>
    </deviceList>
  </device>
</root>"#;

    const SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <actionList>
    <action>
      <name>SetTarget</name>
      <argumentList>
        <argument>
          <name>newTargetValue</name>
          <direction>in</direction>
          <relatedStateVariable>Target</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
    <action>
      <name>GetStatus</name>
      <argumentList>
        <argument>
          <name>ResultStatus</name>
          <direction>out</direction>
          <relatedStateVariable>Status</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>Target</name>
      <dataType>boolean</dataType>
      <defaultValue>0</defaultValue>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>Status</name>
      <dataType>boolean</dataType>
      <defaultValue>0</defaultValue>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn test_parse_description_tree() {
        let description = parse_device_description(DESCRIPTION.as_bytes()).unwrap();
        assert!(description.url_base.is_none());

        let device = &description.device;
        assert_eq!(device.friendly_name, "Hall Light");
        assert_eq!(device.udn.as_str(), "uuid:A");
        assert_eq!(device.icons.len(), 1);
        assert_eq!(device.services.len(), 1);
        assert_eq!(device.embedded.len(), 1);
        assert_eq!(device.embedded[0].udn.as_str(), "uuid:B");
        assert_eq!(
            device.all_udns().iter().map(|u| u.as_str()).collect::<Vec<_>>(),
            vec!["uuid:A", "uuid:B"]
        );
    }

    #[test]
    fn test_parse_description_with_url_base() {
        let xml = DESCRIPTION.replace(
            "<device>",
            "<URLBase>http://192.168.1.10:9090/</URLBase>\n  <device>",
        );
        // only the first occurrence matters: the embedded <device> keeps its tag
        let description = parse_device_description(xml.as_bytes()).unwrap();
        assert_eq!(
            description.url_base.as_deref(),
            Some("http://192.168.1.10:9090/")
        );
    }

    #[test]
    fn test_missing_udn_is_rejected() {
        let xml = DESCRIPTION.replace("<UDN>uuid:A</UDN>", "");
        assert!(matches!(
            parse_device_description(xml.as_bytes()),
            Err(DescriptionError::MissingField("UDN"))
        ));
    }

    #[test]
    fn test_parse_scpd() {
        let scpd = parse_scpd(SCPD.as_bytes(), true).unwrap();
        assert_eq!(scpd.actions.len(), 2);
        assert_eq!(scpd.variables.len(), 2);
        assert!(scpd.is_evented());

        let set_target = &scpd.actions[0];
        assert_eq!(set_target.name(), "SetTarget");
        let argument = set_target.in_arguments().next().unwrap();
        assert_eq!(argument.related_state_variable(), "Target");

        let status = scpd.variables.iter().find(|v| v.name() == "Status").unwrap();
        assert!(status.is_evented());
        let target = scpd.variables.iter().find(|v| v.name() == "Target").unwrap();
        assert!(!target.is_evented());
    }

    #[test]
    fn test_scpd_missing_mandatory_argument_strict_vs_tolerant() {
        let broken = SCPD.replace(
            "<relatedStateVariable>Target</relatedStateVariable>",
            "",
        );

        // strict : rejet du document
        assert!(matches!(
            parse_scpd(broken.as_bytes(), true),
            Err(DescriptionError::InvalidService(_))
        ));

        // tolérant : l'action fautive est absente, le reste survit
        let scpd = parse_scpd(broken.as_bytes(), false).unwrap();
        assert_eq!(scpd.actions.len(), 1);
        assert_eq!(scpd.actions[0].name(), "GetStatus");
        assert_eq!(scpd.variables.len(), 2);
    }

    #[test]
    fn test_scpd_undeclared_related_variable() {
        let broken = SCPD.replace(
            "<relatedStateVariable>Target</relatedStateVariable>",
            "<relatedStateVariable>Ghost</relatedStateVariable>",
        );
        assert!(parse_scpd(broken.as_bytes(), true).is_err());
        let scpd = parse_scpd(broken.as_bytes(), false).unwrap();
        assert_eq!(scpd.actions.len(), 1);
    }

    #[test]
    fn test_scpd_allowed_values_and_range() {
        let xml = r#"<scpd>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>Mode</name>
      <dataType>string</dataType>
      <allowedValueList>
        <allowedValue>NORMAL</allowedValue>
        <allowedValue>ECO</allowedValue>
      </allowedValueList>
    </stateVariable>
    <stateVariable sendEvents="yes" multicast="yes">
      <name>Level</name>
      <dataType>ui2</dataType>
      <allowedValueRange>
        <minimum>0</minimum>
        <maximum>100</maximum>
        <step>5</step>
      </allowedValueRange>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;
        let scpd = parse_scpd(xml.as_bytes(), true).unwrap();
        let mode = &scpd.variables[0];
        assert_eq!(mode.allowed_values(), ["NORMAL", "ECO"]);
        let level = &scpd.variables[1];
        assert_eq!(level.eventing(), EventingMode::UnicastAndMulticast);
        let range = level.range().unwrap();
        assert_eq!(range.minimum, 0.0);
        assert_eq!(range.maximum, 100.0);
        assert_eq!(range.step, Some(5.0));
    }

    #[test]
    fn test_resolve_url() {
        let location = "http://192.168.1.10:8080/device/light/desc.xml";
        assert_eq!(
            resolve_url(location, None, "/device/light/scpd.xml"),
            "http://192.168.1.10:8080/device/light/scpd.xml"
        );
        assert_eq!(
            resolve_url(location, Some("http://192.168.1.10:9090/base/"), "scpd.xml"),
            "http://192.168.1.10:9090/base/scpd.xml"
        );
        assert_eq!(
            resolve_url(location, None, "http://192.168.1.99/absolute.xml"),
            "http://192.168.1.99/absolute.xml"
        );
    }
}
