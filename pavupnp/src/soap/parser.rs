//! Parser SOAP pour actions et réponses UPnP.

use std::collections::HashMap;
use std::io::BufReader;

use xmltree::Element;

use super::{SoapBody, SoapEnvelope, SoapHeader};

/// Action UPnP extraite d'une enveloppe SOAP
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom de l'action (ex: "SetTarget")
    pub name: String,

    /// Namespace de l'action (le type de service)
    pub namespace: Option<String>,

    /// Arguments de l'action, dans l'ordre du document
    pub args: Vec<(String, String)>,
}

impl SoapAction {
    /// Valeur d'un argument par nom.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,

    #[error("Missing response element '{0}' in SOAP Body")]
    MissingResponse(String),
}

/// Parse une action SOAP à partir de bytes XML
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    extract_action_from_body(&envelope.body)
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    // Vérifier que c'est bien une Envelope
    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    // Extraire Header (optionnel)
    let header = root
        .children
        .iter()
        .find_map(|n| n.as_element())
        .filter(|e| e.name.ends_with("Header"))
        .map(|e| SoapHeader { content: e.clone() });

    // Extraire Body (obligatoire)
    let body_elem = root
        .get_child("Body")
        .or_else(|| {
            root.children
                .iter()
                .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Body")))
        })
        .ok_or(SoapParseError::MissingBody)?;

    let body = SoapBody {
        content: body_elem.clone(),
    };

    Ok(SoapEnvelope { header, body })
}

/// Extrait les arguments de sortie d'une réponse `<u:ActionResponse>`.
pub fn parse_soap_response(
    xml: &[u8],
    action: &str,
) -> Result<HashMap<String, String>, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let wanted = format!("{}Response", action);

    let response_elem = envelope
        .body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with(&wanted)))
        .ok_or(SoapParseError::MissingResponse(wanted))?;

    let mut outputs = HashMap::new();
    for child in &response_elem.children {
        if let Some(elem) = child.as_element() {
            let value = elem.get_text().unwrap_or_default().to_string();
            outputs.insert(elem.name.clone(), value);
        }
    }
    Ok(outputs)
}

/// Extrait l'action UPnP du corps SOAP
fn extract_action_from_body(body: &SoapBody) -> Result<SoapAction, SoapParseError> {
    // Le Body contient un élément enfant qui est l'action
    // Format: <u:ActionName xmlns:u="service-urn">...</u:ActionName>

    let action_elem = body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element())
        .ok_or(SoapParseError::NoAction)?;

    let name = action_elem.name.clone();
    let namespace = action_elem.namespace.clone();

    // Extraire les arguments (enfants directs de l'action), ordre préservé
    let mut args = Vec::new();
    for child in &action_elem.children {
        if let Some(elem) = child.as_element() {
            let arg_value = elem.get_text().unwrap_or_default().to_string();
            args.push((elem.name.clone(), arg_value));
        }
    }

    Ok(SoapAction {
        name,
        namespace,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_action() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:SetTarget xmlns:u="urn:schemas-upnp-org:service:SwitchPower:1">
      <newTargetValue>1</newTargetValue>
    </u:SetTarget>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "SetTarget");
        assert_eq!(
            action.namespace,
            Some("urn:schemas-upnp-org:service:SwitchPower:1".to_string())
        );
        assert_eq!(action.arg("newTargetValue"), Some("1"));
    }

    #[test]
    fn test_parse_action_no_args() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetStatus xmlns:u="urn:schemas-upnp-org:service:SwitchPower:1"/>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "GetStatus");
        assert!(action.args.is_empty());
    }

    #[test]
    fn test_argument_order_is_preserved() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:SetValues xmlns:u="urn:x:service:Test:1">
      <Zeta>1</Zeta>
      <Alpha>2</Alpha>
      <Mu>3</Mu>
    </u:SetValues>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        let names: Vec<&str> = action.args.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mu"]);
    }

    #[test]
    fn test_parse_response() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetStatusResponse xmlns:u="urn:schemas-upnp-org:service:SwitchPower:1">
      <ResultStatus>1</ResultStatus>
    </u:GetStatusResponse>
  </s:Body>
</s:Envelope>"#;

        let outputs = parse_soap_response(xml.as_bytes(), "GetStatus").unwrap();
        assert_eq!(outputs.get("ResultStatus"), Some(&"1".to_string()));
    }

    #[test]
    fn test_missing_body() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"></s:Envelope>"#;
        assert!(matches!(
            parse_soap_envelope(xml.as_bytes()),
            Err(SoapParseError::MissingBody)
        ));
    }
}
