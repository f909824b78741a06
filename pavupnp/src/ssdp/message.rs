//! Messages SSDP typés : parsing et formatage.

use std::collections::HashMap;

use tracing::trace;

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT};
use crate::dataelements::Usn;

/// Un message SSDP reçu ou à émettre.
///
/// Le parsing est tolérant sur les lignes inconnues (compatibilité
/// ascendante) mais strict sur les headers critiques : un `CACHE-CONTROL`
/// malformé fait tomber le message entier.
#[derive(Debug, Clone, PartialEq)]
pub enum SsdpMessage {
    /// `NOTIFY * HTTP/1.1` avec `NTS: ssdp:alive`
    Alive {
        nt: String,
        usn: Usn,
        location: String,
        server: String,
        max_age: u32,
        boot_id: Option<u32>,
        config_id: Option<u32>,
    },

    /// `NOTIFY * HTTP/1.1` avec `NTS: ssdp:byebye`
    ByeBye {
        nt: String,
        usn: Usn,
        boot_id: Option<u32>,
    },

    /// `NOTIFY * HTTP/1.1` avec `NTS: ssdp:update` (redémarrage annoncé)
    Update {
        nt: String,
        usn: Usn,
        location: String,
        boot_id: u32,
        next_boot_id: u32,
    },

    /// `M-SEARCH * HTTP/1.1`
    Search { st: String, mx: u32 },

    /// Réponse unicast `HTTP/1.1 200 OK` à un M-SEARCH
    SearchResponse {
        st: String,
        usn: Usn,
        location: String,
        server: String,
        max_age: u32,
        boot_id: Option<u32>,
    },
}

impl SsdpMessage {
    /// Parse un datagramme SSDP. Retourne `None` si le message est d'un
    /// type inconnu ou si un header critique est absent ou malformé.
    pub fn parse(data: &str) -> Option<SsdpMessage> {
        let mut lines = data.lines();
        let first_line = lines.next()?.trim();
        let upper = first_line.to_ascii_uppercase();
        let headers = parse_headers(lines);

        if upper.starts_with("NOTIFY ") {
            parse_notify(&headers)
        } else if upper.starts_with("M-SEARCH ") {
            parse_search(&headers)
        } else if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
            parse_search_response(&headers)
        } else {
            trace!("Unknown SSDP message type: {}", first_line);
            None
        }
    }

    /// Formate le message en datagramme, headers terminés par CRLF.
    pub fn format(&self) -> String {
        match self {
            SsdpMessage::Alive {
                nt,
                usn,
                location,
                server,
                max_age,
                boot_id,
                config_id,
            } => {
                let mut msg = format!(
                    "NOTIFY * HTTP/1.1\r\n\
                     HOST: {}:{}\r\n\
                     CACHE-CONTROL: max-age={}\r\n\
                     LOCATION: {}\r\n\
                     NT: {}\r\n\
                     NTS: ssdp:alive\r\n\
                     SERVER: {}\r\n\
                     USN: {}\r\n",
                    SSDP_MULTICAST_ADDR, SSDP_PORT, max_age, location, nt, server, usn
                );
                if let Some(boot_id) = boot_id {
                    msg.push_str(&format!("BOOTID.UPNP.ORG: {}\r\n", boot_id));
                }
                if let Some(config_id) = config_id {
                    msg.push_str(&format!("CONFIGID.UPNP.ORG: {}\r\n", config_id));
                }
                msg.push_str("\r\n");
                msg
            }
            SsdpMessage::ByeBye { nt, usn, boot_id } => {
                let mut msg = format!(
                    "NOTIFY * HTTP/1.1\r\n\
                     HOST: {}:{}\r\n\
                     NT: {}\r\n\
                     NTS: ssdp:byebye\r\n\
                     USN: {}\r\n",
                    SSDP_MULTICAST_ADDR, SSDP_PORT, nt, usn
                );
                if let Some(boot_id) = boot_id {
                    msg.push_str(&format!("BOOTID.UPNP.ORG: {}\r\n", boot_id));
                }
                msg.push_str("\r\n");
                msg
            }
            SsdpMessage::Update {
                nt,
                usn,
                location,
                boot_id,
                next_boot_id,
            } => format!(
                "NOTIFY * HTTP/1.1\r\n\
                 HOST: {}:{}\r\n\
                 LOCATION: {}\r\n\
                 NT: {}\r\n\
                 NTS: ssdp:update\r\n\
                 USN: {}\r\n\
                 BOOTID.UPNP.ORG: {}\r\n\
                 NEXTBOOTID.UPNP.ORG: {}\r\n\
                 \r\n",
                SSDP_MULTICAST_ADDR, SSDP_PORT, location, nt, usn, boot_id, next_boot_id
            ),
            SsdpMessage::Search { st, mx } => format!(
                "M-SEARCH * HTTP/1.1\r\n\
                 HOST: {}:{}\r\n\
                 MAN: \"ssdp:discover\"\r\n\
                 MX: {}\r\n\
                 ST: {}\r\n\
                 \r\n",
                SSDP_MULTICAST_ADDR, SSDP_PORT, mx.max(&1), st
            ),
            SsdpMessage::SearchResponse {
                st,
                usn,
                location,
                server,
                max_age,
                boot_id,
            } => {
                let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
                let mut msg = format!(
                    "HTTP/1.1 200 OK\r\n\
                     CACHE-CONTROL: max-age={}\r\n\
                     DATE: {}\r\n\
                     EXT:\r\n\
                     LOCATION: {}\r\n\
                     SERVER: {}\r\n\
                     ST: {}\r\n\
                     USN: {}\r\n",
                    max_age, date, location, server, st, usn
                );
                if let Some(boot_id) = boot_id {
                    msg.push_str(&format!("BOOTID.UPNP.ORG: {}\r\n", boot_id));
                }
                msg.push_str("\r\n");
                msg
            }
        }
    }
}

fn parse_notify(headers: &HashMap<String, String>) -> Option<SsdpMessage> {
    // Headers critiques : NTS, NT, USN (exigés par la spec UPnP)
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn: Usn = headers.get("USN")?.parse().ok()?;

    let boot_id = parse_u32_header(headers.get("BOOTID.UPNP.ORG"));

    match nts.as_str() {
        "ssdp:alive" => {
            let location = headers.get("LOCATION")?.to_string();
            let server = headers
                .get("SERVER")
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            // un max-age malformé fait tomber tout le message
            let max_age = match headers.get("CACHE-CONTROL") {
                Some(value) => parse_max_age(value)?,
                None => MAX_AGE,
            };
            Some(SsdpMessage::Alive {
                nt,
                usn,
                location,
                server,
                max_age,
                boot_id,
                config_id: parse_u32_header(headers.get("CONFIGID.UPNP.ORG")),
            })
        }
        "ssdp:byebye" => Some(SsdpMessage::ByeBye { nt, usn, boot_id }),
        "ssdp:update" => Some(SsdpMessage::Update {
            nt,
            usn,
            location: headers.get("LOCATION").cloned().unwrap_or_default(),
            boot_id: boot_id?,
            next_boot_id: parse_u32_header(headers.get("NEXTBOOTID.UPNP.ORG"))?,
        }),
        other => {
            trace!("Unknown NTS value: {}", other);
            None
        }
    }
}

fn parse_search(headers: &HashMap<String, String>) -> Option<SsdpMessage> {
    let man = headers.get("MAN")?;
    if man.trim_matches('"') != "ssdp:discover" {
        trace!("M-SEARCH with unexpected MAN: {}", man);
        return None;
    }
    let st = headers.get("ST")?.to_string();
    let mx = headers
        .get("MX")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(1);
    Some(SsdpMessage::Search { st, mx })
}

fn parse_search_response(headers: &HashMap<String, String>) -> Option<SsdpMessage> {
    let st = headers.get("ST")?.to_string();
    let usn: Usn = headers.get("USN")?.parse().ok()?;
    let location = headers.get("LOCATION")?.to_string();
    let server = headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let max_age = match headers.get("CACHE-CONTROL") {
        Some(value) => parse_max_age(value)?,
        None => MAX_AGE,
    };
    Some(SsdpMessage::SearchResponse {
        st,
        usn,
        location,
        server,
        max_age,
        boot_id: parse_u32_header(headers.get("BOOTID.UPNP.ORG")),
    })
}

/// Parse les headers (noms insensibles à la casse, lignes inconnues ignorées).
pub(crate) fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // ligne vide : fin des headers
        if line.is_empty() {
            break;
        }

        // couper sur le premier ':' seulement (les valeurs peuvent en contenir)
        if let Some(colon_pos) = line.find(':') {
            let (name, value_with_colon) = line.split_at(colon_pos);
            let value = &value_with_colon[1..];

            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();

            if !name.is_empty() {
                headers.insert(name, value);
            }
        } else {
            trace!("Skipping line without colon: '{}'", line);
        }
    }
    headers
}

/// Parse `max-age=N` ; `None` si la directive est absente ou malformée.
fn parse_max_age(value: &str) -> Option<u32> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("max-age")?;
    let after_key = &value[idx + "max-age".len()..];
    let after_eq = after_key.trim_start().strip_prefix('=')?.trim_start();
    let digits: String = after_eq.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn parse_u32_header(value: Option<&String>) -> Option<u32> {
    value.and_then(|v| v.trim().parse().ok())
}
