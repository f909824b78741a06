//! SOAP Faults et taxonomie d'erreurs UPnP.

use xmltree::{Element, XMLNode};

use super::SoapEnvelope;
use super::error_codes;

/// Erreur SOAP (Fault)
#[derive(Debug, Clone)]
pub struct SoapFault {
    /// Code du fault (ex: "s:Client")
    pub fault_code: String,

    /// Description du fault (toujours "UPnPError" pour les erreurs UPnP)
    pub fault_string: String,

    /// Détail UPnP optionnel
    pub upnp_error: Option<UpnpFaultDetail>,
}

/// Détail `<UPnPError>` d'un fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFaultDetail {
    /// Code d'erreur UPnP (401, 501, 600...)
    pub error_code: u16,

    /// Description de l'erreur
    pub error_description: String,
}

impl SoapFault {
    /// Fault UPnP standard : `s:Client` / `UPnPError` avec détail.
    pub fn upnp(error_code: u16, error_description: impl Into<String>) -> Self {
        Self {
            fault_code: "s:Client".to_string(),
            fault_string: "UPnPError".to_string(),
            upnp_error: Some(UpnpFaultDetail {
                error_code,
                error_description: error_description.into(),
            }),
        }
    }

    /// Statut HTTP à employer pour ce fault.
    pub fn http_status(&self) -> u16 {
        match &self.upnp_error {
            Some(detail) => error_codes::http_status_for(detail.error_code),
            None => 500,
        }
    }
}

/// Construit le XML d'un SOAP Fault.
pub fn build_soap_fault(fault: &SoapFault) -> Result<String, xmltree::Error> {
    let mut fault_elem = Element::new("s:Fault");

    let mut faultcode_elem = Element::new("faultcode");
    faultcode_elem
        .children
        .push(XMLNode::Text(fault.fault_code.clone()));
    fault_elem.children.push(XMLNode::Element(faultcode_elem));

    let mut faultstring_elem = Element::new("faultstring");
    faultstring_elem
        .children
        .push(XMLNode::Text(fault.fault_string.clone()));
    fault_elem.children.push(XMLNode::Element(faultstring_elem));

    if let Some(detail) = &fault.upnp_error {
        let mut detail_elem = Element::new("detail");

        let mut upnp_error = Element::new("UPnPError");
        upnp_error.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );

        let mut error_code_elem = Element::new("errorCode");
        error_code_elem
            .children
            .push(XMLNode::Text(detail.error_code.to_string()));
        upnp_error.children.push(XMLNode::Element(error_code_elem));

        let mut error_desc_elem = Element::new("errorDescription");
        error_desc_elem
            .children
            .push(XMLNode::Text(detail.error_description.clone()));
        upnp_error.children.push(XMLNode::Element(error_desc_elem));

        detail_elem.children.push(XMLNode::Element(upnp_error));
        fault_elem.children.push(XMLNode::Element(detail_elem));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).unwrap())
}

/// Extrait le détail UPnP d'une enveloppe de fault, s'il est présent.
pub fn parse_upnp_fault(envelope: &SoapEnvelope) -> Option<UpnpFaultDetail> {
    let fault = find_child_with_suffix(&envelope.body.content, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    let error_code_elem = find_child_with_suffix(upnp_error, "errorCode")?;
    let error_code = error_code_elem
        .get_text()?
        .trim()
        .parse::<u16>()
        .ok()?;

    let error_description = find_child_with_suffix(upnp_error, "errorDescription")
        .and_then(|elem| elem.get_text().map(|t| t.trim().to_string()))
        .unwrap_or_default();

    Some(UpnpFaultDetail {
        error_code,
        error_description,
    })
}

fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_envelope;

    #[test]
    fn test_build_upnp_fault() {
        let fault = SoapFault::upnp(401, "Invalid Action");
        let xml = build_soap_fault(&fault).unwrap();

        assert!(xml.contains("<s:Fault>"));
        assert!(xml.contains("<faultcode>s:Client</faultcode>"));
        assert!(xml.contains("<faultstring>UPnPError</faultstring>"));
        assert!(xml.contains("<detail>"));
        assert!(xml.contains("<errorCode>401</errorCode>"));
        assert!(xml.contains("<errorDescription>Invalid Action</errorDescription>"));
    }

    #[test]
    fn test_fault_http_status() {
        assert_eq!(SoapFault::upnp(401, "Invalid Action").http_status(), 401);
        assert_eq!(SoapFault::upnp(601, "Out of Range").http_status(), 601);
        assert_eq!(SoapFault::upnp(714, "No such item").http_status(), 714);
    }

    #[test]
    fn test_fault_roundtrip() {
        let fault = SoapFault::upnp(501, "Action Failed");
        let xml = build_soap_fault(&fault).unwrap();
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let detail = parse_upnp_fault(&envelope).unwrap();
        assert_eq!(detail.error_code, 501);
        assert_eq!(detail.error_description, "Action Failed");
    }

    #[test]
    fn test_parse_non_fault_envelope() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body><u:FooResponse xmlns:u="urn:x:service:T:1"/></s:Body>
</s:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert!(parse_upnp_fault(&envelope).is_none());
    }
}
