//! Configuration de l'hôte UPnP.
//!
//! La configuration est chargée depuis un fichier YAML (variable
//! d'environnement `PAVILLON_CONFIG`, puis `.pavillon.yml` dans le
//! répertoire courant), avec des valeurs par défaut embarquées.

use std::{env, fs, sync::RwLock};

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::UpnpError;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pavillon.yaml");

const ENV_CONFIG_FILE: &str = "PAVILLON_CONFIG";

/// Bornes imposées par l'UDA sur CACHE-CONTROL: max-age.
const MAX_AGE_MIN: u32 = 5;
const MAX_AGE_MAX: u32 = 60 * 60 * 24;

static CONFIG: Lazy<RwLock<HostConfig>> = Lazy::new(|| RwLock::new(HostConfig::load()));

/// Configuration d'un device host Pavillon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Nombre de répétitions de chaque annonce SSDP
    pub individual_advertisement_count: u32,

    /// Durée de validité des annonces, en secondes (clampée dans [5, 86400])
    pub cache_control_max_age: u32,

    /// Mode strict pour le parsing des descriptions et SCPD
    pub strict_parsing: bool,

    /// Interdit la modification des variables d'état hors handlers d'actions
    pub state_variables_are_immutable: bool,

    /// Taille du pool de workers pour les I/O longues
    pub worker_pool_size: usize,

    /// Timeout maximal accordé à un abonnement GENA, en secondes
    pub max_subscription_timeout_secs: u32,

    /// Chemin optionnel d'une description de device à charger au démarrage
    pub path_to_device_description: Option<String>,

    /// Valeur du header SERVER (OS/version UPnP/version produit/version)
    pub server_token: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        serde_yaml::from_str(DEFAULT_CONFIG).expect("embedded default configuration is valid")
    }
}

impl HostConfig {
    /// Charge la configuration depuis le premier emplacement disponible.
    pub fn load() -> Self {
        let mut data: Option<Vec<u8>> = None;
        let mut path = String::new();

        if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
            info!(env_var = ENV_CONFIG_FILE, path = %env_path, "Trying to load config from env");
            data = fs::read(&env_path).ok();
            if data.is_some() {
                path = env_path;
            } else {
                warn!(config_file = %env_path, "Cannot read config file from env var");
            }
        }

        if data.is_none() {
            let local = ".pavillon.yml";
            data = fs::read(local).ok();
            if data.is_some() {
                path = local.to_string();
            }
        }

        let mut config = match data {
            Some(bytes) => match serde_yaml::from_slice::<HostConfig>(&bytes) {
                Ok(config) => {
                    info!(config_file = %path, "✅ Configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(config_file = %path, error = %e, "Invalid config file, using defaults");
                    HostConfig::default()
                }
            },
            None => HostConfig::default(),
        };

        config.cache_control_max_age = config
            .cache_control_max_age
            .clamp(MAX_AGE_MIN, MAX_AGE_MAX);
        config
    }

    /// Fixe max-age en respectant les bornes de l'UDA.
    pub fn set_cache_control_max_age(&mut self, max_age_secs: u32) {
        self.cache_control_max_age = max_age_secs.clamp(MAX_AGE_MIN, MAX_AGE_MAX);
    }

    /// Vérifie que la configuration est exploitable.
    pub fn validate(&self) -> Result<(), UpnpError> {
        if self.individual_advertisement_count == 0 {
            return Err(UpnpError::InvalidConfiguration(
                "individual_advertisement_count must be > 0".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(UpnpError::InvalidConfiguration(
                "worker_pool_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retourne une copie de la configuration globale.
pub fn get_config() -> HostConfig {
    CONFIG.read().unwrap().clone()
}

/// Remplace la configuration globale (tests, setup programmatique).
pub fn set_config(config: HostConfig) {
    *CONFIG.write().unwrap() = config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.individual_advertisement_count, 2);
        assert_eq!(config.cache_control_max_age, 1800);
        assert!(!config.strict_parsing);
        assert!(config.worker_pool_size > 0);
        assert!(config.server_token.contains("UPnP/1.1"));
    }

    #[test]
    fn test_max_age_clamping() {
        let mut config = HostConfig::default();
        config.set_cache_control_max_age(1);
        assert_eq!(config.cache_control_max_age, 5);
        config.set_cache_control_max_age(1_000_000);
        assert_eq!(config.cache_control_max_age, 86400);
        config.set_cache_control_max_age(300);
        assert_eq!(config.cache_control_max_age, 300);
    }

    #[test]
    fn test_yaml_override() {
        let yaml = "individual_advertisement_count: 3\nstrict_parsing: true\n";
        let config: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.individual_advertisement_count, 3);
        assert!(config.strict_parsing);
        // les champs absents gardent leur défaut
        assert_eq!(config.cache_control_max_age, 1800);
    }

    #[test]
    fn test_validate() {
        let mut config = HostConfig::default();
        assert!(config.validate().is_ok());
        config.individual_advertisement_count = 0;
        assert!(config.validate().is_err());
    }
}
