//! SOAP action invocation against remote services.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};
use ureq::Agent;

use pavupnp::errors::UpnpError;
use pavupnp::soap::{
    SoapEnvelope, build_soap_request, error_codes, parse_soap_envelope, parse_soap_response,
    parse_upnp_fault,
};
use pavupnp::state_variables::StateVariableError;

use crate::model::RemoteService;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - parsed SOAP envelope if parsing succeeded
pub struct SoapCallResult {
    pub status: ureq::http::StatusCode,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Invoke a UPnP SOAP action on a control URL.
///
/// - `control_url`: full HTTP URL of the service control endpoint
/// - `service_type`: service URN
/// - `action`: action name
/// - `args`: list of (name, value) in declared order
pub fn invoke_upnp_action(
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<SoapCallResult> {
    let body_xml = build_soap_request(service_type, action, args)
        .context("Failed to build SOAP request body")?;

    debug!(
        url = control_url,
        action = action,
        service_type = service_type,
        "Sending SOAP request"
    );
    trace!(body = body_xml.as_str(), "SOAP request body");

    let mut builder = Agent::config_builder();
    builder = builder.http_status_as_error(false);
    builder = builder.timeout_global(Some(timeout.unwrap_or(DEFAULT_CALL_TIMEOUT)));

    let config = builder.build();
    let agent: Agent = config.into();

    let soap_action_header = format!(r#""{}#{}""#, service_type, action);

    let mut response = agent
        .post(control_url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPAction", &soap_action_header)
        .send(body_xml)
        .with_context(|| format!("HTTP error when sending SOAP request to {}", control_url))?;

    let status = response.status();
    debug!(status = status.as_u16(), "SOAP response received");

    let raw_body = response
        .body_mut()
        .read_to_string()
        .context("Failed to read SOAP response body")?;

    // parse non fatal : certains devices renvoient du XML douteux
    let parsed_envelope = parse_soap_envelope(raw_body.as_bytes()).ok();

    if !status.is_success() {
        warn!(
            url = control_url,
            action = action,
            status = status.as_u16(),
            body_snippet = %response_snippet(&raw_body),
            "SOAP call returned non-success status"
        );
    }

    Ok(SoapCallResult {
        status,
        raw_body,
        envelope: parsed_envelope,
    })
}

/// Invokes an action on a remote service, with local validation of each
/// input value against the related state variable's schema before the
/// request leaves the machine.
pub fn invoke_service_action(
    service: &RemoteService,
    action_name: &str,
    args: &[(&str, &str)],
) -> Result<HashMap<String, String>, UpnpError> {
    let Some(action) = service.action(action_name) else {
        return Err(UpnpError::action(
            error_codes::INVALID_ACTION,
            format!("no action '{}' on {}", action_name, service.info().service_id),
        ));
    };

    // validation locale : liste de valeurs → 600, plage → 601
    for argument in action.in_arguments() {
        let Some((_, value)) = args.iter().find(|(name, _)| *name == argument.name()) else {
            return Err(UpnpError::action(
                error_codes::INVALID_ARGS,
                format!("missing argument '{}'", argument.name()),
            ));
        };
        if let Some(variable) = service.variable(argument.related_state_variable()) {
            match variable.validate_lexical(value) {
                Ok(_) => {}
                Err(StateVariableError::OutOfRange { .. }) => {
                    return Err(UpnpError::action(
                        error_codes::ARGUMENT_VALUE_OUT_OF_RANGE,
                        format!("argument '{}' out of range", argument.name()),
                    ));
                }
                Err(_) => {
                    return Err(UpnpError::action(
                        error_codes::ARGUMENT_VALUE_INVALID,
                        format!("argument '{}' has invalid value", argument.name()),
                    ));
                }
            }
        }
    }

    let result = invoke_upnp_action(
        &service.info().control_url,
        service.service_type().as_str(),
        action_name,
        args,
        None,
    )
    .map_err(|e| UpnpError::Communications(e.to_string()))?;

    if !result.status.is_success() {
        // faute SOAP → code UPnP ; sinon échec générique
        if let Some(detail) = result.envelope.as_ref().and_then(parse_upnp_fault) {
            return Err(UpnpError::UpnpAction {
                code: detail.error_code,
                description: detail.error_description,
            });
        }
        return Err(UpnpError::OperationFailed(format!(
            "HTTP {} from {}",
            result.status,
            service.info().control_url
        )));
    }

    parse_soap_response(result.raw_body.as_bytes(), action_name)
        .map_err(|e| UpnpError::OperationFailed(e.to_string()))
}

fn response_snippet(body: &str) -> String {
    const MAX_LEN: usize = 256;
    let trimmed = body.trim();
    if trimmed.len() <= MAX_LEN {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..MAX_LEN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pavupnp::actions::{Action, Argument};
    use pavupnp::dataelements::ServiceInfo;
    use pavupnp::state_variables::{StateVariable, ValueRange};
    use pavupnp::variable_types::StateVarType;

    fn volume_service() -> RemoteService {
        RemoteService::new(
            ServiceInfo {
                service_id: "urn:upnp-org:serviceId:RenderingControl".parse().unwrap(),
                service_type: "urn:schemas-upnp-org:service:RenderingControl:1".parse().unwrap(),
                scpd_url: "http://127.0.0.1:1/scpd.xml".to_string(),
                control_url: "http://127.0.0.1:1/control".to_string(),
                event_sub_url: "http://127.0.0.1:1/event".to_string(),
                evented: false,
            },
            vec![
                Action::new("SetVolume")
                    .with_argument(Argument::input("DesiredVolume", "Volume")),
            ],
            vec![Arc::new(
                StateVariable::new("Volume", StateVarType::Ui2)
                    .with_range(ValueRange::new(0.0, 100.0, Some(1.0))),
            )],
        )
    }

    #[test]
    fn test_unknown_action_is_rejected_locally() {
        let service = volume_service();
        let err = invoke_service_action(&service, "Reboot", &[]).unwrap_err();
        assert!(matches!(err, UpnpError::UpnpAction { code: 401, .. }));
    }

    #[test]
    fn test_missing_argument_is_rejected_locally() {
        let service = volume_service();
        let err = invoke_service_action(&service, "SetVolume", &[]).unwrap_err();
        assert!(matches!(err, UpnpError::UpnpAction { code: 402, .. }));
    }

    #[test]
    fn test_out_of_range_value_is_rejected_locally() {
        // la validation locale doit échouer avant toute I/O réseau
        let service = volume_service();
        let err =
            invoke_service_action(&service, "SetVolume", &[("DesiredVolume", "150")]).unwrap_err();
        assert!(matches!(err, UpnpError::UpnpAction { code: 601, .. }));
    }

    #[test]
    fn test_invalid_value_is_rejected_locally() {
        let service = volume_service();
        let err =
            invoke_service_action(&service, "SetVolume", &[("DesiredVolume", "loud")]).unwrap_err();
        assert!(matches!(err, UpnpError::UpnpAction { code: 600, .. }));
    }
}
