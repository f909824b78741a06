//! Taxonomie d'erreurs commune à la pile UPnP.

use thiserror::Error;

/// Erreurs de la pile UPnP.
///
/// Chaque variante correspond à une famille de pannes observable par
/// l'appelant : description invalide, transport, arrêt coopératif,
/// faute SOAP distante, configuration inutilisable.
#[derive(Error, Debug)]
pub enum UpnpError {
    /// La description XML d'un device ne respecte pas l'UDA
    #[error("invalid device description: {0}")]
    InvalidDeviceDescription(String),

    /// Le SCPD d'un service ne respecte pas l'UDA
    #[error("invalid service description: {0}")]
    InvalidServiceDescription(String),

    /// Panne socket : open/connect/read/write/timeout
    #[error("communications error: {0}")]
    Communications(String),

    /// Annulation coopérative en cours
    #[error("shutting down")]
    ShuttingDown,

    /// HTTP non-2xx sans code UPnP exploitable
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Faute SOAP portant un code UPnP (voir [`crate::soap::error_codes`])
    #[error("UPnP error {code}: {description}")]
    UpnpAction { code: u16, description: String },

    /// La configuration fournie est inutilisable
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Mauvais usage du cycle de vie (double initialisation)
    #[error("already initialized: {0}")]
    AlreadyInitialized(String),
}

impl From<std::io::Error> for UpnpError {
    fn from(err: std::io::Error) -> Self {
        UpnpError::Communications(err.to_string())
    }
}

impl UpnpError {
    /// Raccourci pour une faute SOAP.
    pub fn action(code: u16, description: impl Into<String>) -> Self {
        UpnpError::UpnpAction {
            code,
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = UpnpError::action(401, "Invalid Action");
        assert_eq!(e.to_string(), "UPnP error 401: Invalid Action");

        let e = UpnpError::ShuttingDown;
        assert_eq!(e.to_string(), "shutting down");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let e: UpnpError = io.into();
        assert!(matches!(e, UpnpError::Communications(_)));
    }
}
