//! Serveur SSDP du device host.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{MAX_MX, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpMessage};
use crate::config::get_config;
use crate::dataelements::{ResourceType, Udn, Usn};

/// Device annoncé sur SSDP, avec l'ensemble de ses identifiants de
/// ressources : `upnp:rootdevice`, l'UDN, chaque type de device de l'arbre
/// et chaque type de service.
#[derive(Debug, Clone)]
pub struct SsdpAdvertisedDevice {
    pub udn: Udn,
    pub location: String,
    pub server: String,
    notification_types: Vec<String>,
}

impl SsdpAdvertisedDevice {
    pub fn new(udn: Udn, location: String, server: String) -> Self {
        let notification_types = vec!["upnp:rootdevice".to_string(), udn.as_str().to_string()];
        Self {
            udn,
            location,
            server,
            notification_types,
        }
    }

    /// Ajoute un type de device ou de service à annoncer.
    pub fn add_notification_type(&mut self, nt: impl Into<String>) {
        let nt = nt.into();
        if !self.notification_types.contains(&nt) {
            self.notification_types.push(nt);
        }
    }

    pub fn notification_types(&self) -> &[String] {
        &self.notification_types
    }

    /// USN correspondant à un identifiant de ressource donné.
    pub fn usn_for(&self, nt: &str) -> Usn {
        if nt.starts_with("uuid:") {
            Usn::new(self.udn.clone(), None)
        } else {
            Usn::new(self.udn.clone(), nt.parse().ok())
        }
    }

    /// Identifiants à inclure dans la réponse à un M-SEARCH de cible `st`.
    ///
    /// Règles : `ssdp:all` → tout ; `upnp:rootdevice` → le root seul ;
    /// un UDN → ce device ; un type versionné → match si un type de même nom
    /// existe en version supérieure ou égale (la réponse annonce la version
    /// implémentée).
    pub fn matching_targets(&self, st: &str) -> Vec<String> {
        let st = st.trim();

        if st == "ssdp:all" {
            return self.notification_types.clone();
        }
        if st == "upnp:rootdevice" {
            return vec!["upnp:rootdevice".to_string()];
        }
        if st.starts_with("uuid:") {
            if st == self.udn.as_str() {
                return vec![self.udn.as_str().to_string()];
            }
            return Vec::new();
        }

        if let Ok(wanted) = st.parse::<ResourceType>() {
            for nt in &self.notification_types {
                if let Ok(advertised) = nt.parse::<ResourceType>() {
                    if advertised.is_same_type(&wanted) && advertised.version() >= wanted.version()
                    {
                        return vec![advertised.as_str().to_string()];
                    }
                }
            }
        }

        Vec::new()
    }
}

/// Serveur SSDP gérant annonces, ré-annonces et réponses aux recherches.
pub struct SsdpServer {
    /// Devices annoncés (UDN -> device)
    devices: Arc<RwLock<HashMap<String, SsdpAdvertisedDevice>>>,

    /// Socket UDP lié sur 1900
    socket: Option<Arc<UdpSocket>>,

    /// Drapeau d'arrêt coopératif
    shutdown: Arc<AtomicBool>,

    /// BOOTID.UPNP.ORG de cette exécution
    boot_id: u32,

    /// CONFIGID.UPNP.ORG de cette exécution
    config_id: u32,
}

impl SsdpServer {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            socket: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            boot_id: chrono::Utc::now().timestamp() as u32,
            config_id: 1,
        }
    }

    pub fn boot_id(&self) -> u32 {
        self.boot_id
    }

    /// Démarre le serveur : bind sur 1900, adhésion multicast, lancement
    /// des annonces périodiques et de l'écoute M-SEARCH.
    pub fn start(&mut self) -> std::io::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", SSDP_PORT))?;

        socket.join_multicast_v4(
            &SSDP_MULTICAST_ADDR.parse().unwrap(),
            &"0.0.0.0".parse().unwrap(),
        )?;

        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        socket.set_multicast_loop_v4(false)?;

        let socket = Arc::new(socket);
        self.socket = Some(socket.clone());

        info!("✅ SSDP server started on {}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT);

        self.start_periodic_announcements(socket.clone());
        self.start_msearch_listener(socket);

        Ok(())
    }

    /// Enregistre un device : byebye initial pour purger l'état des
    /// observateurs, puis rafale d'annonces alive.
    pub fn add_device(&self, device: SsdpAdvertisedDevice) {
        let udn = device.udn.as_str().to_string();
        {
            let mut devices = self.devices.write().unwrap();
            devices.insert(udn, device.clone());
        }

        if let Some(ref socket) = self.socket {
            Self::send_byebye_burst(socket, &device, self.boot_id);
            Self::send_alive_burst(socket, &device, self.boot_id, self.config_id);
        }
    }

    /// Retire un device et émet sa rafale de byebye.
    pub fn remove_device(&self, udn: &Udn) {
        let removed = {
            let mut devices = self.devices.write().unwrap();
            devices.remove(udn.as_str())
        };
        if let (Some(device), Some(socket)) = (removed, self.socket.as_ref()) {
            Self::send_byebye_burst(socket, &device, self.boot_id);
        }
    }

    /// Arrête le serveur : stoppe les tâches puis émet les byebye finaux.
    /// Après retour, plus aucun datagramme n'est émis.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(socket) = self.socket.take() {
            info!("👋 Shutting down SSDP server, sending byebye for all devices");
            let devices = self.devices.read().unwrap();
            for device in devices.values() {
                Self::send_byebye_burst(&socket, device, self.boot_id);
            }
        }
    }

    /// Rafale d'annonces alive : chaque identifiant de ressource, répété
    /// `individual_advertisement_count` fois.
    fn send_alive_burst(
        socket: &UdpSocket,
        device: &SsdpAdvertisedDevice,
        boot_id: u32,
        config_id: u32,
    ) {
        let config = get_config();
        for _ in 0..config.individual_advertisement_count.max(1) {
            for nt in device.notification_types() {
                let msg = SsdpMessage::Alive {
                    nt: nt.clone(),
                    usn: device.usn_for(nt),
                    location: device.location.clone(),
                    server: device.server.clone(),
                    max_age: config.cache_control_max_age,
                    boot_id: Some(boot_id),
                    config_id: Some(config_id),
                };
                Self::send_multicast(socket, &msg, nt);
            }
        }
    }

    fn send_byebye_burst(socket: &UdpSocket, device: &SsdpAdvertisedDevice, boot_id: u32) {
        let config = get_config();
        for _ in 0..config.individual_advertisement_count.max(1) {
            for nt in device.notification_types() {
                let msg = SsdpMessage::ByeBye {
                    nt: nt.clone(),
                    usn: device.usn_for(nt),
                    boot_id: Some(boot_id),
                };
                Self::send_multicast(socket, &msg, nt);
            }
        }
    }

    fn send_multicast(socket: &UdpSocket, msg: &SsdpMessage, nt: &str) {
        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .unwrap();
        match socket.send_to(msg.format().as_bytes(), addr) {
            Ok(_) => debug!("📤 SSDP notify sent (NT={})", nt),
            Err(e) => warn!("❌ Failed to send SSDP notify for {}: {}", nt, e),
        }
    }

    /// Ré-annonces périodiques à max-age/2 pour éviter l'expiration chez
    /// les control points bien élevés.
    fn start_periodic_announcements(&self, socket: Arc<UdpSocket>) {
        let devices = Arc::clone(&self.devices);
        let shutdown = Arc::clone(&self.shutdown);
        let boot_id = self.boot_id;
        let config_id = self.config_id;

        std::thread::spawn(move || {
            loop {
                let period_secs = (get_config().cache_control_max_age / 2).max(1) as u64;
                for _ in 0..period_secs {
                    if shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }

                let devices = devices.read().unwrap();
                for device in devices.values() {
                    Self::send_alive_burst(&socket, device, boot_id, config_id);
                }
            }
        });
    }

    fn start_msearch_listener(&self, socket: Arc<UdpSocket>) {
        let devices = Arc::clone(&self.devices);
        let shutdown = Arc::clone(&self.shutdown);
        let boot_id = self.boot_id;

        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                match socket.recv_from(&mut buf) {
                    Ok((n, src)) => {
                        let data = String::from_utf8_lossy(&buf[..n]);
                        if let Some(SsdpMessage::Search { st, mx }) = SsdpMessage::parse(&data) {
                            debug!("📥 M-SEARCH received from {} (ST={}, MX={})", src, st, mx);
                            let devices = devices.read().unwrap();
                            for device in devices.values() {
                                Self::answer_msearch(
                                    &socket, &shutdown, &src, &st, mx, device, boot_id,
                                );
                            }
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        warn!("❌ SSDP read error: {}", e);
                    }
                }
            }
        });
    }

    /// Répond à un M-SEARCH en unicast, après un délai uniforme dans
    /// [0, min(MX, 5)] secondes.
    fn answer_msearch(
        socket: &Arc<UdpSocket>,
        shutdown: &Arc<AtomicBool>,
        src: &SocketAddr,
        st: &str,
        mx: u32,
        device: &SsdpAdvertisedDevice,
        boot_id: u32,
    ) {
        let targets = device.matching_targets(st);
        if targets.is_empty() {
            return;
        }

        let config = get_config();
        let socket = Arc::clone(socket);
        let shutdown = Arc::clone(shutdown);
        let src = *src;
        let device = device.clone();
        let delay = Duration::from_millis(reply_delay_ms(mx, device.udn.as_str()));

        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            for nt in targets {
                let msg = SsdpMessage::SearchResponse {
                    st: nt.clone(),
                    usn: device.usn_for(&nt),
                    location: device.location.clone(),
                    server: device.server.clone(),
                    max_age: config.cache_control_max_age,
                    boot_id: Some(boot_id),
                };
                match socket.send_to(msg.format().as_bytes(), src) {
                    Ok(_) => info!("📡 M-SEARCH response sent to {} (ST={})", src, nt),
                    Err(e) => warn!("❌ Failed to send M-SEARCH response to {}: {}", src, e),
                }
            }
        });
    }
}

/// Délai de réponse dans [0, min(mx, 5)] secondes, dérivé d'un hachage de
/// l'UDN et de l'horloge (pas de dépendance RNG).
fn reply_delay_ms(mx: u32, udn: &str) -> u64 {
    let window_ms = (mx.clamp(1, MAX_MX) as u64) * 1000;
    let mut hasher = DefaultHasher::new();
    udn.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
        .hash(&mut hasher);
    hasher.finish() % (window_ms + 1)
}

impl Default for SsdpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SsdpServer {
    fn drop(&mut self) {
        if self.socket.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_device() -> SsdpAdvertisedDevice {
        let mut device = SsdpAdvertisedDevice::new(
            "uuid:A".parse().unwrap(),
            "http://192.168.1.10:8080/device/light/desc.xml".to_string(),
            "Linux/5.0 UPnP/1.1 Pavillon/0.3".to_string(),
        );
        device.add_notification_type("urn:schemas-upnp-org:device:Light:1");
        device.add_notification_type("urn:schemas-upnp-org:service:SwitchPower:2");
        device
    }

    #[test]
    fn test_burst_contents() {
        // 1 rootdevice + 1 udn + D types de devices + S types de services
        let device = light_device();
        assert_eq!(device.notification_types().len(), 2 + 1 + 1);
        assert_eq!(device.notification_types()[0], "upnp:rootdevice");
        assert_eq!(device.notification_types()[1], "uuid:A");
    }

    #[test]
    fn test_usn_for() {
        let device = light_device();
        assert_eq!(device.usn_for("uuid:A").to_string(), "uuid:A");
        assert_eq!(
            device.usn_for("upnp:rootdevice").to_string(),
            "uuid:A::upnp:rootdevice"
        );
        assert_eq!(
            device
                .usn_for("urn:schemas-upnp-org:device:Light:1")
                .to_string(),
            "uuid:A::urn:schemas-upnp-org:device:Light:1"
        );
    }

    #[test]
    fn test_matching_ssdp_all() {
        let device = light_device();
        assert_eq!(device.matching_targets("ssdp:all").len(), 4);
    }

    #[test]
    fn test_matching_rootdevice_and_udn() {
        let device = light_device();
        assert_eq!(
            device.matching_targets("upnp:rootdevice"),
            vec!["upnp:rootdevice".to_string()]
        );
        assert_eq!(device.matching_targets("uuid:A"), vec!["uuid:A".to_string()]);
        assert!(device.matching_targets("uuid:B").is_empty());
    }

    #[test]
    fn test_matching_versioned_type() {
        let device = light_device();
        // version implémentée (2) >= version demandée (1) : match, et la
        // réponse annonce la version implémentée
        assert_eq!(
            device.matching_targets("urn:schemas-upnp-org:service:SwitchPower:1"),
            vec!["urn:schemas-upnp-org:service:SwitchPower:2".to_string()]
        );
        assert!(device
            .matching_targets("urn:schemas-upnp-org:service:SwitchPower:3")
            .is_empty());
        assert!(device
            .matching_targets("urn:schemas-upnp-org:service:Dimming:1")
            .is_empty());
    }

    #[test]
    fn test_reply_delay_bounded() {
        for mx in [0, 1, 3, 5, 60] {
            let delay = reply_delay_ms(mx, "uuid:A");
            assert!(delay <= (mx.clamp(1, 5) as u64) * 1000);
        }
    }
}
