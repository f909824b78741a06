//! Product tokens du header SERVER/USER-AGENT.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use super::DataElementError;

/// Un couple `token/version` (ex: `UPnP/1.1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductToken {
    token: String,
    version: String,
}

impl ProductToken {
    pub fn new(token: impl Into<String>, version: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        let version = version.into().trim().to_string();
        if token.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self { token, version })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Vrai si le token est `UPnP/1.0` ou `UPnP/1.1`.
    pub fn is_valid_upnp_token(&self) -> bool {
        self.token.eq_ignore_ascii_case("UPnP") && (self.version == "1.0" || self.version == "1.1")
    }

    /// Composante majeure de la version, si numérique.
    pub fn major_version(&self) -> Option<u32> {
        let major = self.version.split('.').next()?;
        major.parse().ok()
    }

    /// Composante mineure de la version, si numérique.
    pub fn minor_version(&self) -> Option<u32> {
        let minor = self.version.split('.').nth(1)?;
        minor.parse().ok()
    }
}

impl fmt::Display for ProductToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.token, self.version)
    }
}

/// Suite ordonnée de product tokens.
///
/// La forme conforme à l'UDA comporte au moins trois tokens dont le deuxième
/// est `UPnP/1.0` ou `UPnP/1.1` (`OS/ver UPnP/ver produit/ver`). Le parsing
/// accepte aussi les variantes à virgules et, en dernier recours, extrait le
/// seul token UPnP par balayage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductTokens {
    original: String,
    tokens: Vec<ProductToken>,
}

impl ProductTokens {
    /// Au moins un token a été extrait.
    pub fn is_valid(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// La chaîne suivait la forme UDA (3 tokens et plus, UPnP en deuxième).
    pub fn is_conforming(&self) -> bool {
        self.tokens.len() >= 3 && self.tokens[1].is_valid_upnp_token()
    }

    /// Token du système d'exploitation (premier de la forme conforme).
    pub fn os_token(&self) -> Option<&ProductToken> {
        if self.tokens.len() < 3 {
            return None;
        }
        Some(&self.tokens[0])
    }

    /// Token UPnP.
    pub fn upnp_token(&self) -> Option<&ProductToken> {
        match self.tokens.len() {
            0 => None,
            1 => Some(&self.tokens[0]),
            _ => Some(&self.tokens[1]),
        }
    }

    /// Token du produit (troisième de la forme conforme).
    pub fn product_token(&self) -> Option<&ProductToken> {
        if self.tokens.len() < 3 {
            return None;
        }
        Some(&self.tokens[2])
    }

    pub fn tokens(&self) -> &[ProductToken] {
        &self.tokens
    }

    /// Tokens au-delà des trois premiers.
    pub fn extra_tokens(&self) -> &[ProductToken] {
        if self.tokens.len() > 3 {
            &self.tokens[3..]
        } else {
            &[]
        }
    }

    // Parse strict : mots séparés par des blancs, chacun de la forme tok/ver.
    fn parse_strict(s: &str) -> Option<Vec<ProductToken>> {
        let mut tokens = Vec::new();
        for word in s.split_whitespace() {
            let (tok, ver) = word.split_once('/')?;
            tokens.push(ProductToken::new(tok, ver)?);
        }
        if tokens.len() >= 3 && tokens[1].is_valid_upnp_token() {
            Some(tokens)
        } else {
            None
        }
    }

    // Dernier recours : extraire le seul token UPnP/<ver> par balayage.
    fn scan_upnp_token(s: &str) -> Option<ProductToken> {
        let lower = s.to_ascii_lowercase();
        let mut search_from = 0;
        while let Some(rel) = lower[search_from..].find("upnp/") {
            let idx = search_from + rel;
            // le token doit commencer la chaîne ou suivre un délimiteur
            let at_boundary = idx == 0
                || lower[..idx]
                    .chars()
                    .next_back()
                    .map(|c| c.is_whitespace() || c == ',')
                    .unwrap_or(true);
            if at_boundary {
                let after_slash = idx + "upnp/".len();
                let version: String = s[after_slash..]
                    .chars()
                    .take_while(|c| !c.is_whitespace() && *c != ',')
                    .collect();
                let token = ProductToken::new(&s[idx..idx + 4], version)?;
                if token.is_valid_upnp_token() {
                    return Some(token);
                }
            }
            search_from = idx + 1;
        }
        None
    }
}

impl FromStr for ProductTokens {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let original = s.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some(tokens) = Self::parse_strict(&original) {
            return Ok(ProductTokens { original, tokens });
        }

        // certaines implémentations utilisent la virgule comme séparateur
        if original.contains(',') {
            let without_commas = original.replace(',', " ");
            if let Some(tokens) = Self::parse_strict(&without_commas) {
                warn!(
                    "Comma should not be used as a delimiter in product tokens: [{}]",
                    original
                );
                return Ok(ProductTokens { original, tokens });
            }
        }

        if let Some(token) = Self::scan_upnp_token(&original) {
            warn!(
                "Product tokens [{}] are not formed according to the UDA specification",
                original
            );
            return Ok(ProductTokens {
                original,
                tokens: vec![token],
            });
        }

        Err(DataElementError::InvalidProductTokens(original))
    }
}

impl fmt::Display for ProductTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conforming_tokens() {
        let tokens: ProductTokens = "Foo/1.0 UPnP/1.1 Bar/2.0".parse().unwrap();
        assert!(tokens.is_conforming());
        assert_eq!(
            tokens.upnp_token(),
            ProductToken::new("UPnP", "1.1").as_ref()
        );
        assert_eq!(tokens.os_token().unwrap().token(), "Foo");
        assert_eq!(tokens.product_token().unwrap().token(), "Bar");
    }

    #[test]
    fn test_comma_separated_variant() {
        let tokens: ProductTokens = "Linux/5.0, UPnP/1.0, MediaServer/1.0".parse().unwrap();
        assert!(tokens.is_valid());
        assert_eq!(tokens.upnp_token().unwrap().version(), "1.0");
    }

    #[test]
    fn test_fallback_scan() {
        // seul le token UPnP est récupérable
        let tokens: ProductTokens = "SomeServer (custom; build 12) UPnP/1.1".parse().unwrap();
        assert!(tokens.is_valid());
        assert!(!tokens.is_conforming());
        assert_eq!(
            tokens.upnp_token(),
            ProductToken::new("UPnP", "1.1").as_ref()
        );
        assert!(tokens.os_token().is_none());
    }

    #[test]
    fn test_no_upnp_token_at_all() {
        assert!("Apache/2.4".parse::<ProductTokens>().is_err());
    }

    #[test]
    fn test_extra_tokens() {
        let tokens: ProductTokens = "Foo/1.0 UPnP/1.1 Bar/2.0 Baz/3.1".parse().unwrap();
        assert_eq!(tokens.extra_tokens().len(), 1);
        assert_eq!(tokens.extra_tokens()[0].token(), "Baz");
    }

    #[test]
    fn test_version_components() {
        let token = ProductToken::new("UPnP", "1.1").unwrap();
        assert_eq!(token.major_version(), Some(1));
        assert_eq!(token.minor_version(), Some(1));
    }
}
