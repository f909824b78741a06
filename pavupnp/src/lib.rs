//! # pavupnp - Pile UPnP 1.0/1.1 de Pavillon
//!
//! Modèle de device, SSDP, SOAP et événementiel GENA côté host, plus les
//! briques protocolaires partagées avec le control point (`pavcontrol`).
//!
//! ## Architecture
//!
//! - [`dataelements`] : identifiants typés (UDN, USN, types, product tokens)
//! - [`ssdp`] : découverte (serveur host + client control point)
//! - [`soap`] : enveloppes, requêtes, réponses et fautes SOAP
//! - [`variable_types`] / [`state_variables`] : système de types UPnP
//! - [`actions`] : schémas d'actions et invocateurs
//! - [`devices`] / [`services`] : arbre de devices publié
//! - [`server`] / [`upnp_host`] : surface HTTP et enregistrement

pub mod actions;
pub mod config;
pub mod dataelements;
pub mod devices;
pub mod errors;
pub mod server;
pub mod services;
pub mod soap;
pub mod ssdp;
pub mod state_variables;
pub mod upnp_host;
pub mod variable_types;

pub use crate::config::{HostConfig, get_config, set_config};
pub use crate::errors::UpnpError;
pub use crate::server::{Server, ServerBuilder};
pub use crate::upnp_host::UpnpHost;
