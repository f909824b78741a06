//! GENA côté host : abonnés, séquences, property-sets et livraison NOTIFY.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;
use xmltree::{Element, XMLNode};

/// Valeur du header NT d'un abonnement d'événements.
pub const NT_UPNP_EVENT: &str = "upnp:event";

/// Valeur du header NTS d'un NOTIFY d'événement.
pub const NTS_PROPCHANGE: &str = "upnp:propchange";

/// Nombre d'échecs de livraison consécutifs avant expiration d'un abonné.
pub const MAX_DELIVERY_FAILURES: u32 = 3;

/// Timeout accordé à un abonnement sur service non événementiel : un jour,
/// sans qu'aucun événement ne soit jamais émis. L'UDA est muet sur ce cas ;
/// ce comportement est conservé pour compatibilité avec l'existant.
pub const NON_EVENTED_TIMEOUT_SECS: u32 = 60 * 60 * 24;

/// Abonné GENA d'un service.
#[derive(Debug, Clone)]
pub struct Subscriber {
    sid: String,
    callbacks: Vec<String>,
    expires_at: Instant,
    /// SEQ du prochain NOTIFY ; 0 pour l'événement initial
    seq: u32,
    consecutive_failures: u32,
}

impl Subscriber {
    pub fn new(callbacks: Vec<String>, timeout: Duration) -> Self {
        Self {
            sid: format!("uuid:{}", Uuid::new_v4()),
            callbacks,
            expires_at: Instant::now() + timeout,
            seq: 0,
            consecutive_failures: 0,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn callbacks(&self) -> &[String] {
        &self.callbacks
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn renew(&mut self, timeout: Duration) {
        self.expires_at = Instant::now() + timeout;
    }

    /// Consomme le SEQ courant et avance le compteur. Le compteur ne
    /// décroît jamais ; au-delà de 2^32-1 il reboucle sur 1, jamais 0.
    pub fn advance_seq(&mut self) -> u32 {
        let current = self.seq;
        self.seq = if self.seq == u32::MAX { 1 } else { self.seq + 1 };
        current
    }

    pub fn record_delivery_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Retourne `true` si l'abonné doit être expiré.
    pub fn record_delivery_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= MAX_DELIVERY_FAILURES
    }
}

/// Ensemble des abonnés d'un service, indexés par SID.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    by_sid: HashMap<String, Subscriber>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscriber: Subscriber) -> String {
        let sid = subscriber.sid().to_string();
        self.by_sid.insert(sid.clone(), subscriber);
        sid
    }

    pub fn renew(&mut self, sid: &str, timeout: Duration) -> bool {
        match self.by_sid.get_mut(sid) {
            Some(subscriber) => {
                subscriber.renew(timeout);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, sid: &str) -> bool {
        self.by_sid.remove(sid).is_some()
    }

    pub fn get_mut(&mut self, sid: &str) -> Option<&mut Subscriber> {
        self.by_sid.get_mut(sid)
    }

    pub fn is_empty(&self) -> bool {
        self.by_sid.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_sid.len()
    }

    pub fn sids(&self) -> Vec<String> {
        self.by_sid.keys().cloned().collect()
    }

    /// Expire les abonnements arrivés à échéance ; retourne leurs SIDs.
    pub fn expire_lapsed(&mut self, now: Instant) -> Vec<String> {
        let lapsed: Vec<String> = self
            .by_sid
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(sid, _)| sid.clone())
            .collect();
        for sid in &lapsed {
            debug!("Subscription {} expired", sid);
            self.by_sid.remove(sid);
        }
        lapsed
    }
}

/// Décision prise sur une requête SUBSCRIBE entrante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeAction {
    /// NT + CALLBACK présents, pas de SID : nouvel abonnement
    New { callbacks: Vec<String> },

    /// SID seul : renouvellement
    Renew { sid: String },

    /// Combinaison de headers incompatible
    BadRequest,
}

/// Applique les règles de l'UDA sur les headers d'un SUBSCRIBE.
pub fn classify_subscribe(
    nt: Option<&str>,
    callback: Option<&str>,
    sid: Option<&str>,
) -> SubscribeAction {
    match (nt, callback, sid) {
        // un SID ne se combine ni avec NT ni avec CALLBACK
        (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => SubscribeAction::BadRequest,
        (None, None, Some(sid)) => SubscribeAction::Renew {
            sid: sid.trim().to_string(),
        },
        (Some(nt), Some(callback), None) => {
            if nt.trim() != NT_UPNP_EVENT {
                return SubscribeAction::BadRequest;
            }
            let callbacks = parse_callback_urls(callback);
            if callbacks.is_empty() {
                SubscribeAction::BadRequest
            } else {
                SubscribeAction::New { callbacks }
            }
        }
        _ => SubscribeAction::BadRequest,
    }
}

/// Extrait les URLs `<...>` d'un header CALLBACK.
pub fn parse_callback_urls(header: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = header;
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start + 1..].find('>') else {
            break;
        };
        let url = rest[start + 1..start + 1 + end].trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            urls.push(url.to_string());
        }
        rest = &rest[start + 1 + end + 1..];
    }
    urls
}

/// Parse un header `TIMEOUT: Second-N` ; borne le résultat par `max_secs`.
/// `Second-infinite`, valeur absente ou malformée → `max_secs`.
pub fn parse_timeout_header(value: Option<&str>, max_secs: u32) -> u32 {
    let Some(value) = value else {
        return max_secs;
    };
    let lower = value.trim().to_ascii_lowercase();
    if let Some(number) = lower.strip_prefix("second-") {
        if let Ok(secs) = number.parse::<u32>() {
            return secs.min(max_secs).max(1);
        }
    }
    max_secs
}

/// Construit le corps XML d'un property-set GENA.
///
/// ```text
/// <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
///   <e:property><VarName>value</VarName></e:property>
/// </e:propertyset>
/// ```
pub fn build_property_set(values: &[(String, String)]) -> String {
    let mut property_set = Element::new("e:propertyset");
    property_set.attributes.insert(
        "xmlns:e".to_string(),
        "urn:schemas-upnp-org:event-1-0".to_string(),
    );

    for (name, value) in values {
        let mut property = Element::new("e:property");
        let mut variable = Element::new(name);
        variable.children.push(XMLNode::Text(value.clone()));
        property.children.push(XMLNode::Element(variable));
        property_set.children.push(XMLNode::Element(property));
    }

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new().write_document_declaration(true);
    property_set
        .write_with_config(&mut buf, config)
        .expect("property set serialization cannot fail");
    String::from_utf8(buf).unwrap()
}

/// Envoie un NOTIFY d'événement à un callback.
pub async fn send_notify(
    client: &reqwest::Client,
    callback: &str,
    sid: &str,
    seq: u32,
    body: String,
) -> Result<(), String> {
    let callback = callback.trim().trim_matches(|c| c == '<' || c == '>');
    let response = client
        .request(reqwest::Method::from_bytes(b"NOTIFY").unwrap(), callback)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("NT", NT_UPNP_EVENT)
        .header("NTS", NTS_PROPCHANGE)
        .header("SID", sid)
        .header("SEQ", seq.to_string())
        .body(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        Ok(())
    } else {
        warn!(
            "NOTIFY to {} returned HTTP {}",
            callback,
            response.status()
        );
        Err(format!("HTTP {}", response.status()))
    }
}
