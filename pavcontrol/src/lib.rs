//! # pavcontrol - Control point UPnP de Pavillon
//!
//! Découverte SSDP, construction concurrente des arbres de devices,
//! invocation d'actions SOAP et suivi d'état distant par GENA.
//!
//! ```ignore
//! use pavcontrol::ControlPoint;
//!
//! let control_point = ControlPoint::new()?;
//! control_point.start()?;
//! for device in control_point.devices() {
//!     println!("{} ({})", device.info().friendly_name, device.udn());
//! }
//! ```

pub mod builder;
pub mod control_point;
pub mod description;
pub mod discovery;
pub mod events;
pub mod model;
pub mod registry;
pub mod soap_client;
pub mod subscriptions;

pub use builder::{BuildTask, DeviceBuilder};
pub use control_point::ControlPoint;
pub use description::{DescriptionError, DeviceDescription, Scpd};
pub use discovery::{DiscoveryManager, FetchDecision, should_fetch};
pub use events::{ControlPointEvent, EventBus};
pub use model::{RemoteDevice, RemoteService};
pub use registry::DeviceRegistry;
pub use soap_client::{SoapCallResult, invoke_service_action, invoke_upnp_action};
pub use subscriptions::{SubscriptionManager, SubscriptionStatus};
