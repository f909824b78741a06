/*!
The SSDP client side is a *control point*. It must **not** bind to UDP
port 1900.

Reason:

* The SSDP *server* (UPnP device mode) must listen on 0.0.0.0:1900 for
  M-SEARCH discovery.
* The SSDP *client* only needs to send M-SEARCH and receive unicast
  HTTP/200 replies.
* If both client and server bind on 1900 (even with SO_REUSEPORT) the
  kernel load-balances incoming datagrams between sockets. As a result,
  NOTIFY and HTTP/200 messages are lost randomly by the client.

Therefore:

* SSDP server → bind(0.0.0.0:1900), join multicast, answer M-SEARCH.
* SSDP client → bind(0.0.0.0:0), use an ephemeral port, send M-SEARCH,
  receive replies.

The client still joins the multicast group so NOTIFY announcements are
received.
*/

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::{SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpMessage};

/// Client SSDP : envoi de M-SEARCH, écoute des annonces.
pub struct SsdpClient {
    socket: Arc<UdpSocket>,
    shutdown: Arc<AtomicBool>,
}

impl SsdpClient {
    /// Crée un client SSDP sur un port éphémère.
    pub fn new() -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        socket.set_multicast_loop_v4(true)?; // utile en dev local

        for iface in get_if_addrs::get_if_addrs()? {
            if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                if !ipv4.is_loopback() {
                    match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR.parse().unwrap(), &ipv4) {
                        Ok(()) => {
                            debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4);
                        }
                        Err(e) => {
                            warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e);
                        }
                    }
                }
            }
        }

        info!("✅ SSDP client ready (ephemeral port)");

        Ok(Self {
            socket: Arc::new(socket),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Drapeau d'arrêt partagé ; la boucle d'événements le consulte à
    /// chaque timeout de lecture (500 ms).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Envoie un M-SEARCH multicast pour la cible donnée.
    pub fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let msg = SsdpMessage::Search {
            st: st.to_string(),
            mx: mx.max(1),
        };

        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .unwrap();

        match self.socket.send_to(msg.format().as_bytes(), addr) {
            Ok(_) => {
                info!("📤 M-SEARCH sent (ST={}, MX={})", st, mx.max(1));
                Ok(())
            }
            Err(e) => {
                warn!("❌ Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Boucle de réception bloquante. Retourne quand le drapeau d'arrêt
    /// est levé.
    pub fn run_event_loop<F>(&self, mut on_message: F)
    where
        F: FnMut(SsdpMessage, SocketAddr) + Send + 'static,
    {
        let socket = Arc::clone(&self.socket);
        let mut buf = [0u8; 8192];
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("SSDP client event loop stopping");
                return;
            }
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    let data = String::from_utf8_lossy(&buf[..n]);
                    if let Some(msg) = SsdpMessage::parse(&data) {
                        debug!("📥 SSDP message from {}: {:?}", from, msg);
                        on_message(msg, from);
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!("❌ SSDP client read error: {}", e);
                }
            }
        }
    }
}
