//! UDN (Unique Device Name).

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::DataElementError;

/// Identifiant unique d'un device, de la forme `uuid:<uuid>`.
///
/// La casse est préservée telle que fournie ; l'égalité est sensible à la
/// casse sur la forme littérale. Un UDN est *valide* dès lors que le préfixe
/// `uuid:` est présent avec un suffixe non vide ; le niveau *strict* exige
/// en plus un UUID bien formé (voir [`Udn::is_strictly_valid`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Udn {
    literal: String,
}

impl Udn {
    /// Construit un UDN depuis sa forme littérale complète (`uuid:...`).
    pub fn new(literal: impl Into<String>) -> Result<Self, DataElementError> {
        let literal = literal.into();
        let suffix = literal
            .strip_prefix("uuid:")
            .ok_or_else(|| DataElementError::InvalidUdn(literal.clone()))?;
        if suffix.trim().is_empty() {
            return Err(DataElementError::InvalidUdn(literal));
        }
        Ok(Self { literal })
    }

    /// Génère un UDN frais à partir d'un UUID v4.
    pub fn generate() -> Self {
        Self {
            literal: format!("uuid:{}", Uuid::new_v4()),
        }
    }

    /// Forme littérale complète, préfixe `uuid:` inclus.
    pub fn as_str(&self) -> &str {
        &self.literal
    }

    /// Partie après le préfixe `uuid:`.
    pub fn suffix(&self) -> &str {
        &self.literal["uuid:".len()..]
    }

    /// Niveau strict : le suffixe est un UUID bien formé.
    pub fn is_strictly_valid(&self) -> bool {
        Uuid::parse_str(self.suffix()).is_ok()
    }
}

impl FromStr for Udn {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Udn::new(s.trim())
    }
}

impl fmt::Display for Udn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let udn: Udn = "uuid:5d794fc2-5c5e-4460-a023-f04a51363300".parse().unwrap();
        assert_eq!(udn.suffix(), "5d794fc2-5c5e-4460-a023-f04a51363300");
        assert!(udn.is_strictly_valid());
    }

    #[test]
    fn test_parse_lenient() {
        // valide sans être strict : le suffixe n'est pas un UUID
        let udn: Udn = "uuid:my-device-1".parse().unwrap();
        assert!(!udn.is_strictly_valid());
        assert_eq!(udn.as_str(), "uuid:my-device-1");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("5d794fc2".parse::<Udn>().is_err());
        assert!("uuid:".parse::<Udn>().is_err());
        assert!("".parse::<Udn>().is_err());
    }

    #[test]
    fn test_case_sensitive_equality() {
        let a: Udn = "uuid:ABC".parse().unwrap();
        let b: Udn = "uuid:abc".parse().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate() {
        let udn = Udn::generate();
        assert!(udn.is_strictly_valid());
        assert_ne!(udn, Udn::generate());
    }
}
