//! SSDP event handling and the fetch decision.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use pavupnp::dataelements::{ResourceType, Udn, Usn};
use pavupnp::ssdp::SsdpMessage;

use crate::builder::{BuildTask, DeviceBuilder};
use crate::registry::DeviceRegistry;

/// Why an advertisement leads (or not) to a device build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Unknown UDN: build the tree.
    Fetch,

    /// BOOTID increased: the device restarted, tear down and rebuild.
    Rebuild,

    /// Advertised type matches the configured interest filter.
    FetchInterested,

    /// Already known and unchanged: just refresh presence.
    Refresh,
}

/// Applies the fetch rules to one advertisement.
///
/// Fetch iff the UDN is not yet in storage, the advertisement's BOOTID is
/// strictly greater than the stored one (restart), or the advertised type
/// version is >= the locally configured interest filter.
pub fn should_fetch(
    known: bool,
    stored_boot_id: Option<u32>,
    advertised_boot_id: Option<u32>,
    advertised_type: Option<&ResourceType>,
    interest: Option<&ResourceType>,
) -> FetchDecision {
    if !known {
        return FetchDecision::Fetch;
    }
    if let (Some(stored), Some(advertised)) = (stored_boot_id, advertised_boot_id) {
        if advertised > stored {
            return FetchDecision::Rebuild;
        }
    }
    if let (Some(advertised), Some(interest)) = (advertised_type, interest) {
        if advertised.is_same_type(interest) && advertised.version() >= interest.version() {
            return FetchDecision::FetchInterested;
        }
    }
    FetchDecision::Refresh
}

/// Routes SSDP messages to the registry and the build orchestrator.
pub struct DiscoveryManager {
    registry: Arc<RwLock<DeviceRegistry>>,
    builder: Arc<DeviceBuilder>,

    /// Optional "interested" type filter: advertisements of this type (or
    /// newer versions) always trigger a fetch.
    interest: Option<ResourceType>,
}

impl DiscoveryManager {
    pub fn new(registry: Arc<RwLock<DeviceRegistry>>, builder: Arc<DeviceBuilder>) -> Self {
        Self {
            registry,
            builder,
            interest: None,
        }
    }

    pub fn set_interest(&mut self, interest: Option<ResourceType>) {
        self.interest = interest;
    }

    pub fn handle_ssdp_message(&self, msg: SsdpMessage) {
        match msg {
            SsdpMessage::Alive {
                nt,
                usn,
                location,
                server,
                max_age,
                boot_id,
                ..
            } => {
                self.handle_alive(&usn, &nt, location, server, max_age, boot_id);
            }
            SsdpMessage::SearchResponse {
                st,
                usn,
                location,
                server,
                max_age,
                boot_id,
            } => {
                self.handle_alive(&usn, &st, location, server, max_age, boot_id);
            }
            SsdpMessage::Update {
                usn, next_boot_id, ..
            } => {
                // un update annonce un redémarrage imminent : on force un
                // rebuild au prochain alive en retirant l'arbre périmé
                let udn = usn.udn();
                let mut registry = self.registry.write().unwrap();
                if let Some(stored) = registry.boot_id(udn.as_str()) {
                    if next_boot_id > stored {
                        debug!("ssdp:update announces reboot of {}", udn);
                        registry.remove(udn.as_str());
                    }
                }
            }
            SsdpMessage::ByeBye { usn, .. } => {
                let udn = usn.udn();
                info!("👋 byebye from {}", udn);
                self.registry.write().unwrap().remove(udn.as_str());
            }
            SsdpMessage::Search { .. } => {
                // un autre control point cherche ; nous ne sommes pas un device
            }
        }
    }

    fn handle_alive(
        &self,
        usn: &Usn,
        target: &str,
        location: String,
        server: String,
        max_age: u32,
        boot_id: Option<u32>,
    ) {
        let udn: &Udn = usn.udn();
        let advertised_type = target.parse::<ResourceType>().ok();

        let decision = {
            let registry = self.registry.read().unwrap();
            should_fetch(
                registry.contains(udn.as_str()),
                registry.boot_id(udn.as_str()),
                boot_id,
                advertised_type.as_ref(),
                self.interest.as_ref(),
            )
        };

        match decision {
            FetchDecision::Fetch | FetchDecision::FetchInterested => {
                self.builder.enqueue(BuildTask {
                    udn: udn.clone(),
                    location,
                    server,
                    max_age,
                    boot_id,
                });
            }
            FetchDecision::Rebuild => {
                info!("BOOTID bumped for {}, tearing down and rebuilding", udn);
                self.registry.write().unwrap().remove(udn.as_str());
                self.builder.enqueue(BuildTask {
                    udn: udn.clone(),
                    location,
                    server,
                    max_age,
                    boot_id,
                });
            }
            FetchDecision::Refresh => {
                // même sans fetch, l'alive doit repousser l'expiration
                self.registry
                    .write()
                    .unwrap()
                    .refresh_presence(udn.as_str(), max_age);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(version: u32) -> ResourceType {
        format!("urn:schemas-upnp-org:device:Light:{}", version)
            .parse()
            .unwrap()
    }

    #[test]
    fn test_unknown_udn_is_fetched() {
        assert_eq!(
            should_fetch(false, None, None, None, None),
            FetchDecision::Fetch
        );
    }

    #[test]
    fn test_known_udn_is_refreshed() {
        assert_eq!(
            should_fetch(true, Some(7), Some(7), None, None),
            FetchDecision::Refresh
        );
        assert_eq!(
            should_fetch(true, None, None, None, None),
            FetchDecision::Refresh
        );
    }

    #[test]
    fn test_boot_id_bump_forces_rebuild() {
        assert_eq!(
            should_fetch(true, Some(7), Some(8), None, None),
            FetchDecision::Rebuild
        );
        // un BOOTID plus ancien (datagramme retardé) ne déclenche rien
        assert_eq!(
            should_fetch(true, Some(7), Some(6), None, None),
            FetchDecision::Refresh
        );
    }

    #[test]
    fn test_interest_filter_matches_newer_versions() {
        let interest = light(1);
        assert_eq!(
            should_fetch(true, None, None, Some(&light(2)), Some(&interest)),
            FetchDecision::FetchInterested
        );
        let interest = light(3);
        assert_eq!(
            should_fetch(true, None, None, Some(&light(2)), Some(&interest)),
            FetchDecision::Refresh
        );
    }
}
