//! Concurrent, deduplicated construction of remote device trees.
//!
//! A build task turns an SSDP advertisement into a fully populated
//! [`RemoteDevice`]: description fetch (with retries), one SCPD per
//! service, icons, conformance validation, then atomic installation into
//! the registry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use tracing::{debug, info, warn};

use pavupnp::config::get_config;
use pavupnp::dataelements::{DeviceInfo, ServiceInfo, Udn};

use crate::description::{
    DeviceDescription, ParsedDevice, fetch_device_description, fetch_icon, fetch_scpd,
    resolve_url,
};
use crate::events::{ControlPointEvent, EventBus};
use crate::model::{RemoteDevice, RemoteService};
use crate::registry::DeviceRegistry;

/// Per-GET timeout of the build pipeline.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Description fetch attempts before the task fails.
const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Backoff base between attempts (doubled each retry).
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// One build request, carrying the advertisement context.
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub udn: Udn,
    pub location: String,
    pub server: String,
    pub max_age: u32,
    pub boot_id: Option<u32>,
}

/// Build orchestrator: a bounded queue drained by a small worker pool,
/// with one in-flight build per LOCATION.
pub struct DeviceBuilder {
    sender: Sender<BuildTask>,
    in_progress: Arc<Mutex<HashSet<String>>>,
    shutdown: Arc<AtomicBool>,
}

impl DeviceBuilder {
    pub fn new(registry: Arc<RwLock<DeviceRegistry>>, bus: EventBus) -> Self {
        let worker_count = get_config().worker_pool_size.max(1);
        let (sender, receiver) = bounded::<BuildTask>(16);
        let in_progress: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        for _ in 0..worker_count {
            let receiver = receiver.clone();
            let registry = Arc::clone(&registry);
            let bus = bus.clone();
            let in_progress = Arc::clone(&in_progress);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                while let Ok(task) = receiver.recv() {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let location = task.location.clone();
                    run_build(task, &registry, &bus);
                    in_progress.lock().unwrap().remove(&location);
                }
            });
        }

        Self {
            sender,
            in_progress,
            shutdown,
        }
    }

    /// Queues a build unless one is already in flight for this LOCATION
    /// (concurrent triggers join the existing task) or the queue is full.
    pub fn enqueue(&self, task: BuildTask) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut in_progress = self.in_progress.lock().unwrap();
            if !in_progress.insert(task.location.clone()) {
                debug!("Build already in progress for {}", task.location);
                return false;
            }
        }
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(e) => {
                // file pleine : on retente au prochain alive
                let task = e.into_inner();
                self.in_progress.lock().unwrap().remove(&task.location);
                warn!("Build queue full, dropping build for {}", task.location);
                false
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_build(task: BuildTask, registry: &Arc<RwLock<DeviceRegistry>>, bus: &EventBus) {
    info!("🔧 Building device {} from {}", task.udn, task.location);
    match build_device(&task) {
        Ok(device) => {
            let udn = device.udn().as_str().to_string();
            let mut registry = registry.write().unwrap();
            registry.insert(device);
            drop(registry);
            debug!("Device {} installed", udn);
        }
        Err(reason) => {
            warn!("❌ Build failed for {}: {}", task.udn, reason);
            bus.broadcast(ControlPointEvent::BuildFailed {
                udn: task.udn.as_str().to_string(),
                reason,
            });
        }
    }
}

/// The full pipeline for one task. Returns a human-readable failure reason
/// so the `build-failed` signal carries something actionable.
fn build_device(task: &BuildTask) -> Result<Arc<RemoteDevice>, String> {
    // 1. description, avec retries et backoff exponentiel
    let description = fetch_with_retries(&task.location)?;

    // 5. l'UDN annoncé doit apparaître dans l'arbre décrit
    let advertised = task.udn.as_str();
    if !description
        .device
        .all_udns()
        .iter()
        .any(|udn| udn.as_str() == advertised)
    {
        return Err(format!(
            "advertised UDN {} not present in device description",
            advertised
        ));
    }

    // 2-4. SCPD par service, icônes, assemblage récursif
    let device = assemble_device(
        &description.device,
        &task.location,
        description.url_base.as_deref(),
        task,
    )?;

    Ok(Arc::new(device))
}

fn fetch_with_retries(location: &str) -> Result<DeviceDescription, String> {
    let mut last_error = String::new();
    for attempt in 0..MAX_FETCH_ATTEMPTS {
        if attempt > 0 {
            thread::sleep(RETRY_BACKOFF * 2u32.pow(attempt - 1));
        }
        match fetch_device_description(location, FETCH_TIMEOUT) {
            Ok(description) => return Ok(description),
            Err(e) => {
                debug!("Description fetch attempt {} failed: {}", attempt + 1, e);
                last_error = e.to_string();
            }
        }
    }
    Err(format!(
        "description fetch failed after {} attempts: {}",
        MAX_FETCH_ATTEMPTS, last_error
    ))
}

fn assemble_device(
    parsed: &ParsedDevice,
    location: &str,
    url_base: Option<&str>,
    task: &BuildTask,
) -> Result<RemoteDevice, String> {
    let strict = get_config().strict_parsing;

    let mut services = Vec::new();
    for service_ref in &parsed.services {
        let scpd_url = resolve_url(location, url_base, &service_ref.scpd_url);
        let scpd = fetch_scpd(&scpd_url, FETCH_TIMEOUT, strict).map_err(|e| e.to_string())?;

        let info = ServiceInfo {
            service_id: service_ref.service_id.clone(),
            service_type: service_ref.service_type.clone(),
            scpd_url,
            control_url: resolve_url(location, url_base, &service_ref.control_url),
            event_sub_url: resolve_url(location, url_base, &service_ref.event_sub_url),
            evented: scpd.is_evented(),
        };

        services.push(Arc::new(RemoteService::new(info, scpd.actions, scpd.variables)));
    }

    let mut embedded = Vec::new();
    for child in &parsed.embedded {
        embedded.push(Arc::new(assemble_device(child, location, url_base, task)?));
    }

    let mut info = DeviceInfo::new(
        parsed.device_type.clone(),
        parsed.friendly_name.clone(),
        parsed.manufacturer.clone(),
        parsed.model.clone(),
        parsed.udn.clone(),
    );
    info.manufacturer_url = parsed.manufacturer_url.clone();
    info.serial_number = parsed.serial_number.clone();
    info.upc = parsed.upc.clone();
    info.presentation_url = parsed.presentation_url.clone();

    // 4. icônes : l'échec d'un GET d'icône n'est pas fatal
    for icon in &parsed.icons {
        let url = resolve_url(location, url_base, &icon.url);
        let data = match fetch_icon(&url, FETCH_TIMEOUT) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Icon fetch failed for {}: {}", url, e);
                None
            }
        };
        info.icons.push(pavupnp::dataelements::DeviceIcon {
            mime_type: icon.mime_type.clone(),
            width: icon.width,
            height: icon.height,
            depth: icon.depth,
            url,
            data,
        });
    }

    info.check_field_lengths();

    Ok(RemoteDevice::new(
        info,
        location.to_string(),
        task.server.clone(),
        task.boot_id,
        task.max_age,
        services,
        embedded,
    ))
}
