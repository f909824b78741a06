//! # Module SOAP - Simple Object Access Protocol
//!
//! Ce module implémente le support SOAP 1.1 pour UPnP : invocation
//! d'actions, réponses et fautes.
//!
//! ## Fonctionnalités
//!
//! - ✅ Parsing d'enveloppes SOAP
//! - ✅ Extraction d'actions UPnP avec arguments
//! - ✅ Construction de requêtes et de réponses SOAP
//! - ✅ Gestion des SOAP Faults et de la taxonomie d'erreurs UPnP
//! - ✅ Support des namespaces UPnP
//!
//! ## Architecture
//!
//! - [`SoapEnvelope`] : Enveloppe SOAP complète
//! - [`SoapAction`] : Action UPnP extraite
//! - [`SoapFault`] : Erreur SOAP
//!
//! ## Example
//!
//! ```ignore
//! use pavupnp::soap::{parse_soap_action, build_soap_response};
//!
//! let body = r#"<?xml version="1.0"?>
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!   <s:Body>
//!     <u:SetTarget xmlns:u="urn:schemas-upnp-org:service:SwitchPower:1">
//!       <newTargetValue>1</newTargetValue>
//!     </u:SetTarget>
//!   </s:Body>
//! </s:Envelope>"#;
//!
//! let action = parse_soap_action(body.as_bytes()).unwrap();
//! assert_eq!(action.name, "SetTarget");
//! ```

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{SoapFault, UpnpFaultDetail, build_soap_fault, parse_upnp_fault};
pub use parser::{SoapAction, SoapParseError, parse_soap_action, parse_soap_envelope,
                 parse_soap_response};

/// Codes d'erreur UPnP standards et leur projection HTTP.
pub mod error_codes {
    /// Action invalide
    pub const INVALID_ACTION: u16 = 401;

    /// Arguments invalides
    pub const INVALID_ARGS: u16 = 402;

    /// Action échouée
    pub const ACTION_FAILED: u16 = 501;

    /// Valeur d'argument invalide
    pub const ARGUMENT_VALUE_INVALID: u16 = 600;

    /// Valeur d'argument hors limites
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u16 = 601;

    /// Action optionnelle non implémentée
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u16 = 602;

    /// Mémoire insuffisante
    pub const OUT_OF_MEMORY: u16 = 603;

    /// Intervention humaine requise
    pub const HUMAN_INTERVENTION_REQUIRED: u16 = 604;

    /// Argument chaîne trop long
    pub const STRING_ARGUMENT_TOO_LONG: u16 = 605;

    /// Libellé standard d'un code d'erreur UPnP.
    pub fn reason_phrase(code: u16) -> &'static str {
        match code {
            INVALID_ACTION => "Invalid Action",
            INVALID_ARGS => "Invalid Args",
            ACTION_FAILED => "Action Failed",
            ARGUMENT_VALUE_INVALID => "Argument Value Invalid",
            ARGUMENT_VALUE_OUT_OF_RANGE => "Argument Value Out of Range",
            OPTIONAL_ACTION_NOT_IMPLEMENTED => "Optional Action Not Implemented",
            OUT_OF_MEMORY => "Out of Memory",
            HUMAN_INTERVENTION_REQUIRED => "Human Intervention Required",
            STRING_ARGUMENT_TOO_LONG => "String Argument Too Long",
            606..=899 => "Action Specific Error",
            _ => "Unknown Error",
        }
    }

    /// Statut HTTP renvoyé pour un code d'erreur UPnP : les codes
    /// standards sont projetés un pour un, les plages 606-899 sont
    /// renvoyées telles quelles.
    pub fn http_status_for(code: u16) -> u16 {
        match code {
            401 | 402 | 501 | 600..=605 => code,
            606..=899 => code,
            _ => 500,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_reason_phrases() {
            assert_eq!(reason_phrase(401), "Invalid Action");
            assert_eq!(reason_phrase(601), "Argument Value Out of Range");
            assert_eq!(reason_phrase(604), "Human Intervention Required");
            assert_eq!(reason_phrase(714), "Action Specific Error");
        }

        #[test]
        fn test_http_mapping() {
            // projection un pour un pour la table standard
            for code in [401u16, 402, 501, 600, 601, 602, 603, 604, 605] {
                assert_eq!(http_status_for(code), code);
            }
            // plages spécifiques : écho du code
            assert_eq!(http_status_for(714), 714);
            assert_eq!(http_status_for(899), 899);
            // hors taxonomie : 500
            assert_eq!(http_status_for(42), 500);
        }
    }
}
