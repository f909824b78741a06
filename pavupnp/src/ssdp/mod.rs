//! # Module SSDP - Simple Service Discovery Protocol
//!
//! Ce module implémente le protocole SSDP pour UPnP, côté device host et
//! côté control point.
//!
//! ## Fonctionnalités
//!
//! - ✅ Messages typés NOTIFY alive/byebye/update, M-SEARCH et réponses
//! - ✅ Annonces en rafale répétées, ré-annonces périodiques à max-age/2
//! - ✅ Réponse aux M-SEARCH en unicast avec délai aléatoire borné par MX
//! - ✅ Byebye initial et final pour purger l'état des observateurs
//! - ✅ Headers BOOTID/CONFIGID (UPnP 1.1)
//!
//! ## Architecture
//!
//! - [`SsdpMessage`] : représentation typée des messages, parse + format
//! - [`SsdpServer`] : serveur SSDP du device host
//! - [`SsdpClient`] : client SSDP du control point
//!
//! ## Constantes SSDP
//!
//! - **Multicast Address**: 239.255.255.250:1900
//! - **Max-Age par défaut**: 1800 secondes

mod client;
mod message;
mod server;

pub use client::SsdpClient;
pub use message::SsdpMessage;
pub use server::{SsdpAdvertisedDevice, SsdpServer};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité des annonces par défaut (en secondes)
pub const MAX_AGE: u32 = 1800;

/// Plafond du délai de réponse à un M-SEARCH (en secondes)
pub const MAX_MX: u32 = 5;
