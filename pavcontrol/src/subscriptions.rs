//! GENA subscriptions: SUBSCRIBE/renew/UNSUBSCRIBE and NOTIFY ingestion.
//!
//! Each subscription runs the state machine:
//!
//! ```text
//! Unsubscribed --subscribe()--> Subscribing --(200 with SID)--> Subscribed
//!                                          --(error)---------> Failed
//! Subscribed  --timer(tRenew)--> Renewing  --(200)-> Subscribed
//!                                          --(error)-> Failed
//! Subscribed  --cancel()-------> Unsubscribing --(200 or timeout)-> Unsubscribed
//! Failed      --reset()--------> Unsubscribed
//! ```
//!
//! The callback listener is a plain TCP accept loop with a hand-rolled
//! HTTP/1.1 reader (content-length and chunked bodies, mutually exclusive).

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};
use ureq::{Agent, http};
use uuid::Uuid;
use xmltree::{Element, XMLNode};

use pavupnp::errors::UpnpError;

use crate::events::{ControlPointEvent, EventBus};
use crate::model::RemoteService;
use crate::registry::DeviceRegistry;

const DEFAULT_REQUESTED_TIMEOUT_SECS: u64 = 300;
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_LOOP_INTERVAL: Duration = Duration::from_millis(250);

/// State of a (control point, service) subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Renewing,
    Unsubscribing,
    Failed,
}

/// Renewal fires at `timeout − max(30 s, timeout/4)`.
pub fn compute_renew_delay(timeout: Duration) -> Duration {
    let margin = std::cmp::max(Duration::from_secs(30), timeout / 4);
    timeout.saturating_sub(margin)
}

/// Verdict on an incoming NOTIFY sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// Exactly the expected value: process it.
    InOrder,
    /// Older than expected (duplicate or late datagram): drop and log.
    Stale,
    /// Newer than expected (missed events): resubscribe from scratch.
    Gap,
}

pub fn check_seq(expected: u32, received: u32) -> SeqCheck {
    if received == expected {
        SeqCheck::InOrder
    } else if received < expected {
        SeqCheck::Stale
    } else {
        SeqCheck::Gap
    }
}

/// One subscription slot. A `Failed` slot is retained with zeroed state so
/// the application may retry; no automatic retries are issued.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub udn: String,
    pub service_id: String,
    pub event_sub_url: String,
    pub callback_path: String,
    pub sid: Option<String>,
    pub status: SubscriptionStatus,
    pub expires_at: Option<Instant>,
    pub next_renew_at: Option<Instant>,
    pub expected_seq: u32,
    pub last_error: Option<String>,
}

impl Subscription {
    fn new(udn: String, service_id: String, event_sub_url: String) -> Self {
        let id = Uuid::new_v4();
        Self {
            callback_path: format!("/events/{}", id),
            id,
            udn,
            service_id,
            event_sub_url,
            sid: None,
            status: SubscriptionStatus::Unsubscribed,
            expires_at: None,
            next_renew_at: None,
            expected_seq: 0,
            last_error: None,
        }
    }

    /// Zeroes the wire state, keeping the slot.
    pub fn reset(&mut self) {
        self.sid = None;
        self.status = SubscriptionStatus::Unsubscribed;
        self.expires_at = None;
        self.next_renew_at = None;
        self.expected_seq = 0;
    }

    fn mark_subscribed(&mut self, sid: String, timeout: Duration) {
        self.sid = Some(sid);
        self.status = SubscriptionStatus::Subscribed;
        self.expires_at = Some(Instant::now() + timeout);
        self.next_renew_at = Some(Instant::now() + compute_renew_delay(timeout));
    }

    fn mark_failed(&mut self, reason: String) {
        self.status = SubscriptionStatus::Failed;
        self.last_error = Some(reason);
        self.sid = None;
        self.expires_at = None;
        self.next_renew_at = None;
        self.expected_seq = 0;
    }
}

struct IncomingNotify {
    path: String,
    sid: Option<String>,
    seq: Option<u32>,
    body: Vec<u8>,
}

#[derive(Default)]
struct ManagerState {
    subscriptions: HashMap<Uuid, Subscription>,
    by_path: HashMap<String, Uuid>,
}

/// Subscription manager: callback listener + renewal/maintenance worker.
pub struct SubscriptionManager {
    state: Arc<Mutex<ManagerState>>,
    registry: Arc<RwLock<DeviceRegistry>>,
    bus: EventBus,
    listener_port: u16,
    shutdown: Arc<AtomicBool>,
}

impl SubscriptionManager {
    pub fn start(
        registry: Arc<RwLock<DeviceRegistry>>,
        bus: EventBus,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Arc<Self>> {
        let listener = TcpListener::bind("0.0.0.0:0")?;
        listener.set_nonblocking(true)?;
        let listener_port = listener.local_addr()?.port();

        info!("GENA callback listener bound on port {}", listener_port);

        let (notify_tx, notify_rx) = unbounded::<IncomingNotify>();

        let manager = Arc::new(Self {
            state: Arc::new(Mutex::new(ManagerState::default())),
            registry,
            bus,
            listener_port,
            shutdown: Arc::clone(&shutdown),
        });

        {
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("gena-callback-listener".into())
                .spawn(move || run_http_listener(listener, notify_tx, shutdown))?;
        }

        {
            let manager = Arc::clone(&manager);
            thread::Builder::new()
                .name("gena-subscription-worker".into())
                .spawn(move || manager.run_worker(notify_rx))?;
        }

        Ok(manager)
    }

    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    /// Subscribes to a service's events. Returns the subscription id.
    pub fn subscribe(&self, udn: &str, service: &RemoteService) -> Result<Uuid, UpnpError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(UpnpError::ShuttingDown);
        }
        if !service.is_evented() {
            warn!(
                "Cannot subscribe to {}: service is not evented",
                service.info().service_id
            );
            return Err(UpnpError::OperationFailed(
                "service is not evented".to_string(),
            ));
        }

        let id = {
            let mut state = self.state.lock().unwrap();

            // une souscription vivante par service
            if let Some(existing) = state
                .subscriptions
                .values()
                .find(|s| s.udn == udn && s.service_id == service.info().service_id.id())
            {
                if existing.status == SubscriptionStatus::Subscribed {
                    return Ok(existing.id);
                }
                let id = existing.id;
                state.subscriptions.get_mut(&id).unwrap().reset();
                id
            } else {
                let subscription = Subscription::new(
                    udn.to_string(),
                    service.info().service_id.id().to_string(),
                    service.info().event_sub_url.clone(),
                );
                let id = subscription.id;
                state.by_path.insert(subscription.callback_path.clone(), id);
                state.subscriptions.insert(id, subscription);
                id
            }
        };

        self.drive_subscribe(id);
        Ok(id)
    }

    pub fn status(&self, id: Uuid) -> Option<SubscriptionStatus> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(&id)
            .map(|s| s.status)
    }

    /// Moves a `Failed` slot back to `Unsubscribed` for a manual retry.
    pub fn reset_subscription(&self, id: Uuid) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.subscriptions.get_mut(&id) {
            Some(subscription) => {
                subscription.reset();
                true
            }
            None => false,
        }
    }

    /// Cancels a subscription with an UNSUBSCRIBE on the wire.
    pub fn unsubscribe(&self, id: Uuid) {
        let (event_sub_url, sid) = {
            let mut state = self.state.lock().unwrap();
            let Some(subscription) = state.subscriptions.get_mut(&id) else {
                return;
            };
            subscription.status = SubscriptionStatus::Unsubscribing;
            (subscription.event_sub_url.clone(), subscription.sid.clone())
        };

        if let Some(sid) = sid {
            if let Err(e) = send_unsubscribe(&event_sub_url, &sid, HTTP_TIMEOUT) {
                debug!("UNSUBSCRIBE failed for {}: {}", sid, e);
            }
        }

        let mut state = self.state.lock().unwrap();
        if let Some(subscription) = state.subscriptions.get_mut(&id) {
            subscription.reset();
        }
    }

    /// Best-effort UNSUBSCRIBE of every live subscription, bounded in time.
    pub fn cancel_all(&self, timeout_ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let ids: Vec<Uuid> = {
            let state = self.state.lock().unwrap();
            state.subscriptions.keys().cloned().collect()
        };
        for id in ids {
            if Instant::now() >= deadline {
                warn!("cancel_all deadline reached, remaining subscriptions dropped");
                break;
            }
            self.unsubscribe(id);
        }
        // au-delà du délai, les slots restants sont remis à zéro sans fil
        let mut state = self.state.lock().unwrap();
        for subscription in state.subscriptions.values_mut() {
            subscription.reset();
        }
    }

    fn drive_subscribe(&self, id: Uuid) {
        let (event_sub_url, callback_path) = {
            let mut state = self.state.lock().unwrap();
            let Some(subscription) = state.subscriptions.get_mut(&id) else {
                return;
            };
            subscription.status = SubscriptionStatus::Subscribing;
            (
                subscription.event_sub_url.clone(),
                subscription.callback_path.clone(),
            )
        };

        let result = send_subscribe(
            &event_sub_url,
            &callback_path,
            self.listener_port,
            HTTP_TIMEOUT,
        );

        let mut state = self.state.lock().unwrap();
        let Some(subscription) = state.subscriptions.get_mut(&id) else {
            return;
        };
        match result {
            Ok((sid, timeout)) => {
                info!(
                    "✅ Subscribed to {} (SID={}, timeout {}s)",
                    subscription.service_id,
                    sid,
                    timeout.as_secs()
                );
                subscription.expected_seq = 0;
                subscription.mark_subscribed(sid, timeout);
            }
            Err(e) => {
                warn!("SUBSCRIBE failed for {}: {}", subscription.service_id, e);
                let reason = e.to_string();
                subscription.mark_failed(reason.clone());
                self.bus.broadcast(ControlPointEvent::SubscriptionFailed {
                    udn: subscription.udn.clone(),
                    service_id: subscription.service_id.clone(),
                    reason,
                });
            }
        }
    }

    fn run_worker(&self, notify_rx: Receiver<IncomingNotify>) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            while let Ok(notify) = notify_rx.try_recv() {
                self.handle_notify(notify);
            }
            self.renew_due();
            self.prune_for_missing_devices();
            thread::sleep(WORKER_LOOP_INTERVAL);
        }
    }

    fn renew_due(&self) {
        let now = Instant::now();
        let due: Vec<(Uuid, String, String)> = {
            let mut state = self.state.lock().unwrap();
            state
                .subscriptions
                .values_mut()
                .filter(|s| {
                    s.status == SubscriptionStatus::Subscribed
                        && s.next_renew_at.map(|at| at <= now).unwrap_or(false)
                })
                .map(|s| {
                    s.status = SubscriptionStatus::Renewing;
                    (s.id, s.event_sub_url.clone(), s.sid.clone().unwrap_or_default())
                })
                .collect()
        };

        for (id, event_sub_url, sid) in due {
            let result = send_renew(&event_sub_url, &sid, HTTP_TIMEOUT);
            let mut state = self.state.lock().unwrap();
            let Some(subscription) = state.subscriptions.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(timeout) => {
                    debug!("♻️ Renewed {} for {}s", sid, timeout.as_secs());
                    subscription.mark_subscribed(sid, timeout);
                }
                Err(e) => {
                    warn!("Renewal failed for {}: {}", sid, e);
                    let reason = e.to_string();
                    subscription.mark_failed(reason.clone());
                    self.bus.broadcast(ControlPointEvent::SubscriptionFailed {
                        udn: subscription.udn.clone(),
                        service_id: subscription.service_id.clone(),
                        reason,
                    });
                }
            }
        }
    }

    /// Drops subscriptions whose device left storage (byebye or expiry).
    /// No UNSUBSCRIBE is attempted: the device is gone. Lock order is
    /// storage before subscriptions, hence the snapshot.
    fn prune_for_missing_devices(&self) {
        let known: Vec<String> = {
            let registry = self.registry.read().unwrap();
            registry
                .root_devices()
                .iter()
                .flat_map(|d| d.all_udns())
                .map(|udn| udn.as_str().to_string())
                .collect()
        };

        let mut state = self.state.lock().unwrap();
        let gone: Vec<Uuid> = state
            .subscriptions
            .values()
            .filter(|s| {
                s.status != SubscriptionStatus::Unsubscribed && !known.contains(&s.udn)
            })
            .map(|s| s.id)
            .collect();
        for id in gone {
            if let Some(subscription) = state.subscriptions.get_mut(&id) {
                debug!(
                    "Dropping subscription {} ({}): device left storage",
                    id, subscription.service_id
                );
                subscription.reset();
            }
        }
    }

    fn handle_notify(&self, notify: IncomingNotify) {
        let (id, udn, service_id) = {
            let state = self.state.lock().unwrap();
            let Some(id) = state.by_path.get(&notify.path).cloned() else {
                debug!("Dropping notify for unknown path {}", notify.path);
                return;
            };
            let Some(subscription) = state.subscriptions.get(&id) else {
                return;
            };

            let sid_matches = match (&notify.sid, &subscription.sid) {
                (Some(received), Some(expected)) => expected.eq_ignore_ascii_case(received),
                _ => false,
            };
            if !sid_matches {
                debug!(
                    "Ignoring notify with mismatched SID (expected {:?}, got {:?})",
                    subscription.sid, notify.sid
                );
                return;
            }

            let Some(seq) = notify.seq else {
                debug!("Ignoring notify without SEQ header");
                return;
            };

            match check_seq(subscription.expected_seq, seq) {
                SeqCheck::InOrder => {}
                SeqCheck::Stale => {
                    warn!(
                        "Dropping stale notify (SEQ {} < expected {})",
                        seq, subscription.expected_seq
                    );
                    return;
                }
                SeqCheck::Gap => {
                    warn!(
                        "Missed events (SEQ {} > expected {}), resubscribing from scratch",
                        seq, subscription.expected_seq
                    );
                    let id = subscription.id;
                    drop(state);
                    {
                        let mut state = self.state.lock().unwrap();
                        if let Some(subscription) = state.subscriptions.get_mut(&id) {
                            subscription.reset();
                        }
                    }
                    self.drive_subscribe(id);
                    return;
                }
            }

            (id, subscription.udn.clone(), subscription.service_id.clone())
        };

        {
            let mut state = self.state.lock().unwrap();
            if let Some(subscription) = state.subscriptions.get_mut(&id) {
                subscription.expected_seq = subscription.expected_seq.wrapping_add(1).max(1);
            }
        }

        // mise à jour du stockage et diffusion des changements
        let values = parse_property_set(&notify.body);
        if values.is_empty() {
            return;
        }

        let registry = self.registry.read().unwrap();
        let Some(device) = registry.search_by_udn(&udn) else {
            return;
        };
        let Some(service) = device.find_service(&service_id) else {
            return;
        };
        drop(registry);

        for (name, value) in values {
            if service.update_value(&name, &value) {
                self.bus.broadcast(ControlPointEvent::StateVariableChanged {
                    udn: udn.clone(),
                    service_id: service_id.clone(),
                    variable: name,
                    value,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Callback HTTP listener
// ---------------------------------------------------------------------------

fn run_http_listener(
    listener: TcpListener,
    notify_tx: Sender<IncomingNotify>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match listener.accept() {
            Ok((mut stream, _)) => {
                let _ = stream.set_nonblocking(false);
                if let Err(e) = stream.set_read_timeout(Some(HTTP_TIMEOUT)) {
                    warn!("Failed to set read timeout on notify connection: {}", e);
                }

                match read_http_request(&mut BufReader::new(match stream.try_clone() {
                    Ok(clone) => clone,
                    Err(_) => continue,
                })) {
                    Ok(request) => {
                        if request.method != "NOTIFY" {
                            let _ = write_http_response(&mut stream, 405, "Method Not Allowed");
                            continue;
                        }

                        let notify = IncomingNotify {
                            path: request.path,
                            sid: request.headers.get("sid").cloned(),
                            seq: request
                                .headers
                                .get("seq")
                                .and_then(|s| s.trim().parse().ok()),
                            body: request.body,
                        };

                        if notify_tx.send(notify).is_err() {
                            warn!("Dropping notify event because worker channel is closed");
                        }
                        let _ = write_http_response(&mut stream, 200, "OK");
                    }
                    Err(err) => {
                        warn!("Failed to parse incoming notify request: {}", err);
                        let _ = write_http_response(&mut stream, 400, "Bad Request");
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                warn!("Incoming notify connection failed: {}", e);
            }
        }
    }
}

struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn read_http_request<R: BufRead>(reader: &mut R) -> io::Result<HttpRequest> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "missing request line",
        ));
    }

    let request_line = request_line.trim_end_matches(['\r', '\n']);
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing method"))?
        .to_ascii_uppercase();
    let path = parts
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing path"))?
        .to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        let len = reader.read_line(&mut line)?;
        if len == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);
    let content_length = headers.get("content-length");

    // déclarer les deux cadrages à la fois est une erreur de protocole
    if chunked && content_length.is_some() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "both chunked transfer-encoding and content-length declared",
        ));
    }

    let body = if chunked {
        read_chunked_body(reader)?
    } else {
        let content_length: usize = content_length.and_then(|v| v.parse().ok()).unwrap_or(0);
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        body
    };

    Ok(HttpRequest {
        method,
        path,
        headers,
        body,
    })
}

/// Lit un corps chunked : ligne de taille hexadécimale (extensions après
/// ';' ignorées), données, CRLF ; le chunk de taille zéro termine le corps
/// et les trailers sont jetés.
fn read_chunked_body<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        if reader.read_line(&mut size_line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "missing chunk size line",
            ));
        }
        let size_str = size_line
            .trim_end_matches(['\r', '\n'])
            .split(';')
            .next()
            .unwrap_or("")
            .trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?;

        if size == 0 {
            // trailers jusqu'à la ligne vide
            loop {
                let mut trailer = String::new();
                let len = reader.read_line(&mut trailer)?;
                if len == 0 || trailer.trim_end_matches(['\r', '\n']).is_empty() {
                    break;
                }
            }
            return Ok(body);
        }

        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk)?;
        body.extend_from_slice(&chunk);

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if &crlf != b"\r\n" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "chunk data not terminated by CRLF",
            ));
        }
    }
}

fn write_http_response(stream: &mut TcpStream, status: u16, message: &str) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, message
    );
    stream.write_all(response.as_bytes())
}

/// Extrait les couples (variable, valeur) d'un property-set GENA.
pub fn parse_property_set(body: &[u8]) -> Vec<(String, String)> {
    let mut values = Vec::new();
    let Ok(root) = Element::parse(io::Cursor::new(body)) else {
        warn!("Failed to parse notify property set");
        return values;
    };
    if !root.name.ends_with("propertyset") {
        return values;
    }

    for property in xml_children(&root) {
        if !property.name.ends_with("property") {
            continue;
        }
        for variable in xml_children(property) {
            let value = variable.get_text().unwrap_or_default().trim().to_string();
            values.push((variable.name.clone(), value));
        }
    }
    values
}

fn xml_children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(elem) => Some(elem),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Wire calls (SUBSCRIBE / UNSUBSCRIBE)
// ---------------------------------------------------------------------------

fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .allow_non_standard_methods(true)
        .build()
        .into()
}

fn send_subscribe(
    event_sub_url: &str,
    callback_path: &str,
    listener_port: u16,
    timeout: Duration,
) -> Result<(String, Duration)> {
    let (host_header, remote_host, remote_port) = subscribe_headers(event_sub_url)?;

    let local_ip = determine_local_ip(&remote_host, remote_port)
        .context("Cannot determine local IP for callback")?;
    let callback_url = format!("http://{}:{}{}", format_ip(&local_ip), listener_port, callback_path);

    debug!(
        url = event_sub_url,
        callback = callback_url.as_str(),
        "Subscribing to events"
    );

    let request = http::Request::builder()
        .method("SUBSCRIBE")
        .uri(event_sub_url)
        .header("HOST", host_header)
        .header("CALLBACK", format!("<{}>", callback_url))
        .header("NT", "upnp:event")
        .header("TIMEOUT", format!("Second-{}", DEFAULT_REQUESTED_TIMEOUT_SECS))
        .body(())
        .map_err(anyhow::Error::new)?;

    let response = build_agent(timeout).run(request)?;
    if !response.status().is_success() {
        anyhow::bail!("SUBSCRIBE returned HTTP {}", response.status());
    }

    let sid = response
        .headers()
        .get("SID")
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("SUBSCRIBE response missing SID"))?;
    let granted = parse_timeout(
        response
            .headers()
            .get("TIMEOUT")
            .and_then(|value| value.to_str().ok()),
    )
    .unwrap_or(Duration::from_secs(DEFAULT_REQUESTED_TIMEOUT_SECS));

    Ok((sid, granted))
}

fn send_renew(event_sub_url: &str, sid: &str, timeout: Duration) -> Result<Duration> {
    let (host_header, _, _) = subscribe_headers(event_sub_url)?;

    let request = http::Request::builder()
        .method("SUBSCRIBE")
        .uri(event_sub_url)
        .header("HOST", host_header)
        .header("TIMEOUT", format!("Second-{}", DEFAULT_REQUESTED_TIMEOUT_SECS))
        .header("SID", sid)
        .body(())
        .map_err(anyhow::Error::new)?;

    let response = build_agent(timeout).run(request)?;
    if !response.status().is_success() {
        anyhow::bail!("SUBSCRIBE renewal failed with {}", response.status());
    }

    Ok(parse_timeout(
        response
            .headers()
            .get("TIMEOUT")
            .and_then(|value| value.to_str().ok()),
    )
    .unwrap_or(Duration::from_secs(DEFAULT_REQUESTED_TIMEOUT_SECS)))
}

fn send_unsubscribe(event_sub_url: &str, sid: &str, timeout: Duration) -> Result<()> {
    let (host_header, _, _) = subscribe_headers(event_sub_url)?;

    let request = http::Request::builder()
        .method("UNSUBSCRIBE")
        .uri(event_sub_url)
        .header("HOST", host_header)
        .header("SID", sid)
        .body(())
        .map_err(anyhow::Error::new)?;

    let response = build_agent(timeout).run(request)?;
    if !response.status().is_success() {
        anyhow::bail!("UNSUBSCRIBE returned non-success status {}", response.status());
    }
    debug!("Unsubscribed SID {}", sid);
    Ok(())
}

fn subscribe_headers(event_sub_url: &str) -> Result<(String, String, u16)> {
    let (remote_host, remote_port) =
        parse_host_port(event_sub_url).context("Cannot extract host for SUBSCRIBE")?;
    Ok((
        format!("{}:{}", remote_host, remote_port),
        remote_host,
        remote_port,
    ))
}

/// Parse un header `TIMEOUT: Second-N`.
pub fn parse_timeout(raw: Option<&str>) -> Option<Duration> {
    let value = raw?;
    let lower = value.trim().to_ascii_lowercase();
    if lower == "second-infinite" {
        return Some(Duration::from_secs(DEFAULT_REQUESTED_TIMEOUT_SECS));
    }
    if let Some(idx) = lower.find("second-") {
        let number = &lower[idx + "second-".len()..];
        if let Ok(seconds) = number.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
    }
    None
}

fn parse_host_port(url: &str) -> Option<(String, u16)> {
    let default_port = if url.to_ascii_lowercase().starts_with("https://") {
        443
    } else {
        80
    };
    let (_, rest) = url.split_once("://")?;
    let mut parts = rest.splitn(2, '/');
    let authority = parts.next()?.trim();
    if authority.starts_with('[') {
        let end = authority.find(']')?;
        let host = &authority[1..end];
        let remainder = authority.get(end + 1..).unwrap_or("");
        let port = if let Some(stripped) = remainder.strip_prefix(':') {
            stripped.parse().unwrap_or(default_port)
        } else {
            default_port
        };
        Some((host.to_string(), port))
    } else if let Some((host, port)) = authority.split_once(':') {
        Some((host.to_string(), port.parse().ok()?))
    } else {
        Some((authority.to_string(), default_port))
    }
}

fn determine_local_ip(remote_host: &str, remote_port: u16) -> io::Result<IpAddr> {
    let is_ipv6 = remote_host.contains(':') && !remote_host.contains('.');
    let target = if is_ipv6 {
        format!(
            "[{}]:{}",
            remote_host.trim_matches(|c| c == '[' || c == ']'),
            remote_port
        )
    } else {
        format!("{}:{}", remote_host, remote_port)
    };
    let bind_addr = if is_ipv6 { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind_addr)?;
    socket.connect(&target)?;
    Ok(socket.local_addr()?.ip())
}

fn format_ip(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_delay() {
        // timeout 300 s : marge max(30, 75) = 75 → renouvellement à 225 s
        assert_eq!(
            compute_renew_delay(Duration::from_secs(300)),
            Duration::from_secs(225)
        );
        // timeout 60 s : marge max(30, 15) = 30 → renouvellement à 30 s
        assert_eq!(
            compute_renew_delay(Duration::from_secs(60)),
            Duration::from_secs(30)
        );
        // timeout 30 s : renouvellement à ≤ 22 s exigé ; 30 − 30 = 0 s
        assert!(compute_renew_delay(Duration::from_secs(30)) <= Duration::from_secs(22));
    }

    #[test]
    fn test_check_seq() {
        assert_eq!(check_seq(3, 3), SeqCheck::InOrder);
        assert_eq!(check_seq(3, 2), SeqCheck::Stale);
        assert_eq!(check_seq(3, 7), SeqCheck::Gap);
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(
            parse_timeout(Some("Second-1800")),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(
            parse_timeout(Some("second-infinite")),
            Some(Duration::from_secs(DEFAULT_REQUESTED_TIMEOUT_SECS))
        );
        assert_eq!(parse_timeout(Some("garbage")), None);
        assert_eq!(parse_timeout(None), None);
    }

    #[test]
    fn test_subscription_reset_zeroes_state() {
        let mut subscription = Subscription::new(
            "uuid:A".to_string(),
            "SwitchPower".to_string(),
            "http://192.168.1.10:8080/event".to_string(),
        );
        subscription.mark_subscribed("uuid:sid-1".to_string(), Duration::from_secs(300));
        subscription.expected_seq = 9;
        assert_eq!(subscription.status, SubscriptionStatus::Subscribed);

        subscription.reset();
        assert_eq!(subscription.status, SubscriptionStatus::Unsubscribed);
        assert!(subscription.sid.is_none());
        assert_eq!(subscription.expected_seq, 0);
    }

    #[test]
    fn test_failed_keeps_reason() {
        let mut subscription = Subscription::new(
            "uuid:A".to_string(),
            "SwitchPower".to_string(),
            "http://192.168.1.10:8080/event".to_string(),
        );
        subscription.mark_failed("connection refused".to_string());
        assert_eq!(subscription.status, SubscriptionStatus::Failed);
        assert_eq!(subscription.last_error.as_deref(), Some("connection refused"));
        assert!(subscription.sid.is_none());
    }

    #[test]
    fn test_read_request_with_content_length() {
        let raw = b"NOTIFY /events/x HTTP/1.1\r\nHOST: 10.0.0.1\r\nSID: uuid:s\r\nSEQ: 2\r\nContent-Length: 5\r\n\r\nhello";
        let request = read_http_request(&mut BufReader::new(&raw[..])).unwrap();
        assert_eq!(request.method, "NOTIFY");
        assert_eq!(request.path, "/events/x");
        assert_eq!(request.headers.get("seq").unwrap(), "2");
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn test_read_request_with_chunked_body() {
        let raw = b"NOTIFY /events/x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: ignored\r\n\r\n";
        let request = read_http_request(&mut BufReader::new(&raw[..])).unwrap();
        assert_eq!(request.body, b"hello world");
    }

    #[test]
    fn test_both_framings_declared_is_rejected() {
        let raw = b"NOTIFY /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n";
        assert!(read_http_request(&mut BufReader::new(&raw[..])).is_err());
    }

    #[test]
    fn test_truncated_chunk_is_rejected() {
        let raw = b"NOTIFY /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nA\r\nhi";
        assert!(read_http_request(&mut BufReader::new(&raw[..])).is_err());
    }

    #[test]
    fn test_parse_property_set() {
        let body = br#"<?xml version="1.0" encoding="utf-8"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><Status>1</Status></e:property>
  <e:property><Level>42</Level></e:property>
</e:propertyset>"#;
        let values = parse_property_set(body);
        assert_eq!(
            values,
            vec![
                ("Status".to_string(), "1".to_string()),
                ("Level".to_string(), "42".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_property_set_rejects_garbage() {
        assert!(parse_property_set(b"this is not xml").is_empty());
        assert!(parse_property_set(b"<other/>").is_empty());
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_host_port("http://192.168.1.10:8080/event"),
            Some(("192.168.1.10".to_string(), 8080))
        );
        assert_eq!(
            parse_host_port("http://renderer.local/event"),
            Some(("renderer.local".to_string(), 80))
        );
        assert_eq!(
            parse_host_port("http://[fe80::1]:8080/event"),
            Some(("fe80::1".to_string(), 8080))
        );
    }
}
