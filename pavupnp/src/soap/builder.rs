//! Construction de requêtes et de réponses SOAP.

use xmltree::{Element, XMLNode};

fn wrap_in_envelope(inner: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(inner));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).unwrap())
}

fn text_child(parent: &mut Element, name: &str, value: &str) {
    let mut child = Element::new(name);
    child.children.push(XMLNode::Text(value.to_string()));
    parent.children.push(XMLNode::Element(child));
}

/// Construit une requête SOAP UPnP.
///
/// # Arguments
///
/// * `service_urn` - URN du service (namespace de l'action)
/// * `action` - Nom de l'action
/// * `args` - Arguments d'entrée, dans l'ordre déclaré du SCPD
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let mut action_elem = Element::new(&format!("u:{}", action));
    action_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        text_child(&mut action_elem, name, value);
    }

    wrap_in_envelope(action_elem)
}

/// Construit une réponse SOAP UPnP (`<u:ActionResponse>`).
///
/// # Arguments
///
/// * `service_urn` - URN du service
/// * `action` - Nom de l'action
/// * `values` - Valeurs de retour, dans l'ordre déclaré du SCPD
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: &[(String, String)],
) -> Result<String, xmltree::Error> {
    let mut response_elem = Element::new(&format!("u:{}Response", action));
    response_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in values {
        text_child(&mut response_elem, name, value);
    }

    wrap_in_envelope(response_elem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parser::{parse_soap_action, parse_soap_response};

    #[test]
    fn test_build_request() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:SwitchPower:1",
            "SetTarget",
            &[("newTargetValue", "1")],
        )
        .unwrap();

        assert!(xml.contains("u:SetTarget"));
        assert!(xml.contains("<newTargetValue>1</newTargetValue>"));
        assert!(xml.contains(r#"xmlns:u="urn:schemas-upnp-org:service:SwitchPower:1""#));
    }

    #[test]
    fn test_build_response() {
        let xml = build_soap_response(
            "urn:schemas-upnp-org:service:SwitchPower:1",
            "GetStatus",
            &[("ResultStatus".to_string(), "1".to_string())],
        )
        .unwrap();

        assert!(xml.contains("GetStatusResponse"));
        assert!(xml.contains("<ResultStatus>1</ResultStatus>"));
        assert!(xml.contains(r#"xmlns:s="http://schemas.xmlsoap.org/soap/envelope/""#));
    }

    #[test]
    fn test_build_empty_response() {
        let xml = build_soap_response("urn:schemas-upnp-org:service:SwitchPower:1", "SetTarget", &[])
            .unwrap();

        assert!(xml.contains("SetTargetResponse"));
    }

    #[test]
    fn test_request_roundtrip_is_canonical() {
        // encode → decode → re-encode : les deux sérialisations sont identiques
        let args = [("InstanceID", "0"), ("Speed", "1")];
        let xml = build_soap_request("urn:x:service:Test:1", "Play", &args).unwrap();

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        let reencoded_args: Vec<(&str, &str)> = action
            .args
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        let xml2 = build_soap_request("urn:x:service:Test:1", &action.name, &reencoded_args).unwrap();

        assert_eq!(xml, xml2);
    }

    #[test]
    fn test_response_roundtrip() {
        let values = vec![("Track".to_string(), "5".to_string())];
        let xml = build_soap_response("urn:x:service:Test:1", "GetPosition", &values).unwrap();
        let outputs = parse_soap_response(xml.as_bytes(), "GetPosition").unwrap();
        assert_eq!(outputs.get("Track"), Some(&"5".to_string()));
    }
}
