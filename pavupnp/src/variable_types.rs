//! # Module VariableTypes - Système de types UPnP
//!
//! Types de données des variables d'état UPnP et leurs valeurs typées,
//! avec parsing et sérialisation selon la forme lexicale de l'UDA.
//!
//! ## Types supportés
//!
//! ui1/ui2/ui4, i1/i2/i4, int, r4/r8, number, fixed.14.4, float, char,
//! string, date, dateTime, dateTime.tz, time, time.tz, boolean,
//! bin.base64, bin.hex, uri, uuid.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Erreurs de validation d'une valeur UPnP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateValueError {
    #[error("unknown UPnP data type '{0}'")]
    UnknownType(String),

    #[error("value '{value}' is not a valid {expected}")]
    InvalidLexicalForm { expected: &'static str, value: String },
}

/// Type de données d'une variable d'état.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVarType {
    Ui1,
    Ui2,
    Ui4,
    I1,
    I2,
    I4,
    Int,       // synonyme de i4
    R4,
    R8,
    Number,    // synonyme de r8
    Fixed14_4, // décimal à point fixe
    Float,     // synonyme de r8
    Char,
    String,
    Boolean,
    BinBase64,
    BinHex,
    Date,
    DateTime,
    DateTimeTz,
    Time,
    TimeTz,
    Uuid,
    Uri,
}

impl StateVarType {
    /// Nom du type tel qu'il apparaît dans un SCPD.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateVarType::Ui1 => "ui1",
            StateVarType::Ui2 => "ui2",
            StateVarType::Ui4 => "ui4",
            StateVarType::I1 => "i1",
            StateVarType::I2 => "i2",
            StateVarType::I4 => "i4",
            StateVarType::Int => "int",
            StateVarType::R4 => "r4",
            StateVarType::R8 => "r8",
            StateVarType::Number => "number",
            StateVarType::Fixed14_4 => "fixed.14.4",
            StateVarType::Float => "float",
            StateVarType::Char => "char",
            StateVarType::String => "string",
            StateVarType::Boolean => "boolean",
            StateVarType::BinBase64 => "bin.base64",
            StateVarType::BinHex => "bin.hex",
            StateVarType::Date => "date",
            StateVarType::DateTime => "dateTime",
            StateVarType::DateTimeTz => "dateTime.tz",
            StateVarType::Time => "time",
            StateVarType::TimeTz => "time.tz",
            StateVarType::Uuid => "uuid",
            StateVarType::Uri => "uri",
        }
    }

    /// Valeur par défaut du type (zéro, chaîne vide, epoch...).
    pub fn default_value(&self) -> StateValue {
        match self {
            StateVarType::Ui1 => StateValue::Ui1(0),
            StateVarType::Ui2 => StateValue::Ui2(0),
            StateVarType::Ui4 => StateValue::Ui4(0),
            StateVarType::I1 => StateValue::I1(0),
            StateVarType::I2 => StateValue::I2(0),
            StateVarType::I4 | StateVarType::Int => StateValue::I4(0),
            StateVarType::R4 => StateValue::R4(0.0),
            StateVarType::R8 | StateVarType::Number | StateVarType::Float => StateValue::R8(0.0),
            StateVarType::Fixed14_4 => StateValue::Fixed14_4(0.0),
            StateVarType::Char => StateValue::Char('\0'),
            StateVarType::String => StateValue::String(String::new()),
            StateVarType::Boolean => StateValue::Boolean(false),
            StateVarType::BinBase64 => StateValue::BinBase64(Vec::new()),
            StateVarType::BinHex => StateValue::BinHex(Vec::new()),
            StateVarType::Date => StateValue::Date(NaiveDate::default()),
            StateVarType::DateTime => StateValue::DateTime(NaiveDateTime::default()),
            StateVarType::DateTimeTz => StateValue::DateTimeTz(epoch_fixed_offset()),
            StateVarType::Time => StateValue::Time(NaiveTime::default()),
            StateVarType::TimeTz => StateValue::TimeTz(epoch_fixed_offset()),
            StateVarType::Uuid => StateValue::Uuid(Uuid::nil()),
            StateVarType::Uri => {
                StateValue::Uri(Url::parse("http://localhost/").unwrap())
            }
        }
    }

    /// Le type est-il numérique (comparable sur une plage min/max) ?
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            StateVarType::Ui1
                | StateVarType::Ui2
                | StateVarType::Ui4
                | StateVarType::I1
                | StateVarType::I2
                | StateVarType::I4
                | StateVarType::Int
                | StateVarType::R4
                | StateVarType::R8
                | StateVarType::Number
                | StateVarType::Float
                | StateVarType::Fixed14_4
        )
    }
}

impl FromStr for StateVarType {
    type Err = StateValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ui1" => Ok(StateVarType::Ui1),
            "ui2" => Ok(StateVarType::Ui2),
            "ui4" => Ok(StateVarType::Ui4),
            "i1" => Ok(StateVarType::I1),
            "i2" => Ok(StateVarType::I2),
            "i4" => Ok(StateVarType::I4),
            "int" => Ok(StateVarType::Int),
            "r4" => Ok(StateVarType::R4),
            "r8" => Ok(StateVarType::R8),
            "number" => Ok(StateVarType::Number),
            "fixed.14.4" => Ok(StateVarType::Fixed14_4),
            "float" => Ok(StateVarType::Float),
            "char" => Ok(StateVarType::Char),
            "string" => Ok(StateVarType::String),
            "boolean" => Ok(StateVarType::Boolean),
            "bin.base64" => Ok(StateVarType::BinBase64),
            "bin.hex" => Ok(StateVarType::BinHex),
            "date" => Ok(StateVarType::Date),
            "dateTime" => Ok(StateVarType::DateTime),
            "dateTime.tz" => Ok(StateVarType::DateTimeTz),
            "time" => Ok(StateVarType::Time),
            "time.tz" => Ok(StateVarType::TimeTz),
            "uuid" => Ok(StateVarType::Uuid),
            "uri" => Ok(StateVarType::Uri),
            other => Err(StateValueError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for StateVarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Valeur typée d'une variable d'état.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Ui1(u8),
    Ui2(u16),
    Ui4(u32),
    I1(i8),
    I2(i16),
    I4(i32),
    R4(f32),
    R8(f64),
    Fixed14_4(f64),
    Char(char),
    String(String),
    Boolean(bool),
    BinBase64(Vec<u8>),
    BinHex(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Time(NaiveTime),
    TimeTz(DateTime<FixedOffset>),
    Uuid(Uuid),
    Uri(Url),
}

impl StateValue {
    /// Parse une valeur selon la forme lexicale du type donné.
    pub fn parse(var_type: StateVarType, s: &str) -> Result<StateValue, StateValueError> {
        let s = s.trim();
        let invalid = |expected: &'static str| StateValueError::InvalidLexicalForm {
            expected,
            value: s.to_string(),
        };

        match var_type {
            StateVarType::Ui1 => s.parse().map(StateValue::Ui1).map_err(|_| invalid("ui1")),
            StateVarType::Ui2 => s.parse().map(StateValue::Ui2).map_err(|_| invalid("ui2")),
            StateVarType::Ui4 => s.parse().map(StateValue::Ui4).map_err(|_| invalid("ui4")),
            StateVarType::I1 => s.parse().map(StateValue::I1).map_err(|_| invalid("i1")),
            StateVarType::I2 => s.parse().map(StateValue::I2).map_err(|_| invalid("i2")),
            StateVarType::I4 | StateVarType::Int => {
                s.parse().map(StateValue::I4).map_err(|_| invalid("i4"))
            }
            StateVarType::R4 => s.parse().map(StateValue::R4).map_err(|_| invalid("r4")),
            StateVarType::R8 | StateVarType::Number | StateVarType::Float => {
                s.parse().map(StateValue::R8).map_err(|_| invalid("r8"))
            }
            StateVarType::Fixed14_4 => {
                parse_fixed_14_4(s).map(StateValue::Fixed14_4).ok_or_else(|| invalid("fixed.14.4"))
            }
            StateVarType::Char => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(StateValue::Char(c)),
                    _ => Err(invalid("char")),
                }
            }
            StateVarType::String => Ok(StateValue::String(s.to_string())),
            StateVarType::Boolean => match s {
                "1" | "true" | "yes" => Ok(StateValue::Boolean(true)),
                "0" | "false" | "no" => Ok(StateValue::Boolean(false)),
                _ => Err(invalid("boolean")),
            },
            StateVarType::BinBase64 => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(StateValue::BinBase64)
                .map_err(|_| invalid("bin.base64")),
            StateVarType::BinHex => parse_hex(s).map(StateValue::BinHex).ok_or_else(|| invalid("bin.hex")),
            StateVarType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(StateValue::Date)
                .map_err(|_| invalid("date")),
            StateVarType::DateTime => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .map(StateValue::DateTime)
                .map_err(|_| invalid("dateTime")),
            StateVarType::DateTimeTz => DateTime::parse_from_rfc3339(s)
                .map(StateValue::DateTimeTz)
                .map_err(|_| invalid("dateTime.tz")),
            StateVarType::Time => NaiveTime::parse_from_str(s, "%H:%M:%S")
                .map(StateValue::Time)
                .map_err(|_| invalid("time")),
            StateVarType::TimeTz => {
                // une heure avec fuseau : on l'ancre sur l'epoch pour le parsing
                DateTime::parse_from_rfc3339(&format!("1970-01-01T{}", s))
                    .map(StateValue::TimeTz)
                    .map_err(|_| invalid("time.tz"))
            }
            StateVarType::Uuid => Uuid::parse_str(s)
                .map(StateValue::Uuid)
                .map_err(|_| invalid("uuid")),
            StateVarType::Uri => Url::parse(s)
                .map(StateValue::Uri)
                .map_err(|_| invalid("uri")),
        }
    }

    /// Type de la valeur.
    pub fn type_of(&self) -> StateVarType {
        match self {
            StateValue::Ui1(_) => StateVarType::Ui1,
            StateValue::Ui2(_) => StateVarType::Ui2,
            StateValue::Ui4(_) => StateVarType::Ui4,
            StateValue::I1(_) => StateVarType::I1,
            StateValue::I2(_) => StateVarType::I2,
            StateValue::I4(_) => StateVarType::I4,
            StateValue::R4(_) => StateVarType::R4,
            StateValue::R8(_) => StateVarType::R8,
            StateValue::Fixed14_4(_) => StateVarType::Fixed14_4,
            StateValue::Char(_) => StateVarType::Char,
            StateValue::String(_) => StateVarType::String,
            StateValue::Boolean(_) => StateVarType::Boolean,
            StateValue::BinBase64(_) => StateVarType::BinBase64,
            StateValue::BinHex(_) => StateVarType::BinHex,
            StateValue::Date(_) => StateVarType::Date,
            StateValue::DateTime(_) => StateVarType::DateTime,
            StateValue::DateTimeTz(_) => StateVarType::DateTimeTz,
            StateValue::Time(_) => StateVarType::Time,
            StateValue::TimeTz(_) => StateVarType::TimeTz,
            StateValue::Uuid(_) => StateVarType::Uuid,
            StateValue::Uri(_) => StateVarType::Uri,
        }
    }

    /// Forme lexicale de la valeur, telle qu'émise sur le fil.
    pub fn to_lexical(&self) -> String {
        match self {
            StateValue::Ui1(v) => v.to_string(),
            StateValue::Ui2(v) => v.to_string(),
            StateValue::Ui4(v) => v.to_string(),
            StateValue::I1(v) => v.to_string(),
            StateValue::I2(v) => v.to_string(),
            StateValue::I4(v) => v.to_string(),
            StateValue::R4(v) => v.to_string(),
            StateValue::R8(v) => v.to_string(),
            StateValue::Fixed14_4(v) => format!("{:.4}", v),
            StateValue::Char(c) => c.to_string(),
            StateValue::String(s) => s.clone(),
            StateValue::Boolean(true) => "1".to_string(),
            StateValue::Boolean(false) => "0".to_string(),
            StateValue::BinBase64(bytes) => {
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
            StateValue::BinHex(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            StateValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            StateValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            StateValue::DateTimeTz(dt) => dt.to_rfc3339(),
            StateValue::Time(t) => t.format("%H:%M:%S").to_string(),
            StateValue::TimeTz(dt) => dt.format("%H:%M:%S%:z").to_string(),
            StateValue::Uuid(u) => u.to_string(),
            StateValue::Uri(u) => u.to_string(),
        }
    }

    /// La valeur vue comme un f64, pour les comparaisons de plage.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Ui1(v) => Some(*v as f64),
            StateValue::Ui2(v) => Some(*v as f64),
            StateValue::Ui4(v) => Some(*v as f64),
            StateValue::I1(v) => Some(*v as f64),
            StateValue::I2(v) => Some(*v as f64),
            StateValue::I4(v) => Some(*v as f64),
            StateValue::R4(v) => Some(*v as f64),
            StateValue::R8(v) => Some(*v),
            StateValue::Fixed14_4(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lexical())
    }
}

fn epoch_fixed_offset() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("1970-01-01T00:00:00+00:00").unwrap()
}

// 14 chiffres entiers et 4 décimales au plus
fn parse_fixed_14_4(s: &str) -> Option<f64> {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() || int_part.len() > 14 || frac_part.len() > 4 {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    s.parse().ok()
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_roundtrip() {
        for name in [
            "ui1", "ui2", "ui4", "i1", "i2", "i4", "int", "r4", "r8", "number", "fixed.14.4",
            "float", "char", "string", "boolean", "bin.base64", "bin.hex", "date", "dateTime",
            "dateTime.tz", "time", "time.tz", "uuid", "uri",
        ] {
            let t: StateVarType = name.parse().unwrap();
            assert_eq!(t.as_str(), name);
        }
        assert!("i8".parse::<StateVarType>().is_err());
    }

    #[test]
    fn test_boolean_lexicals() {
        for s in ["1", "true", "yes"] {
            assert_eq!(
                StateValue::parse(StateVarType::Boolean, s).unwrap(),
                StateValue::Boolean(true)
            );
        }
        for s in ["0", "false", "no"] {
            assert_eq!(
                StateValue::parse(StateVarType::Boolean, s).unwrap(),
                StateValue::Boolean(false)
            );
        }
        assert!(StateValue::parse(StateVarType::Boolean, "on").is_err());
        assert_eq!(StateValue::Boolean(true).to_lexical(), "1");
    }

    #[test]
    fn test_integers_and_overflow() {
        assert_eq!(
            StateValue::parse(StateVarType::Ui1, "255").unwrap(),
            StateValue::Ui1(255)
        );
        assert!(StateValue::parse(StateVarType::Ui1, "256").is_err());
        assert!(StateValue::parse(StateVarType::Ui4, "-1").is_err());
        assert_eq!(
            StateValue::parse(StateVarType::I2, "-32768").unwrap(),
            StateValue::I2(-32768)
        );
    }

    #[test]
    fn test_fixed_14_4() {
        assert_eq!(
            StateValue::parse(StateVarType::Fixed14_4, "12.5000").unwrap(),
            StateValue::Fixed14_4(12.5)
        );
        assert!(StateValue::parse(StateVarType::Fixed14_4, "1.23456").is_err());
        assert!(StateValue::parse(StateVarType::Fixed14_4, "abc").is_err());
        assert_eq!(StateValue::Fixed14_4(12.5).to_lexical(), "12.5000");
    }

    #[test]
    fn test_char_single() {
        assert_eq!(
            StateValue::parse(StateVarType::Char, "x").unwrap(),
            StateValue::Char('x')
        );
        assert!(StateValue::parse(StateVarType::Char, "xy").is_err());
        assert!(StateValue::parse(StateVarType::Char, "").is_err());
    }

    #[test]
    fn test_bin_types() {
        assert_eq!(
            StateValue::parse(StateVarType::BinBase64, "aGVsbG8=").unwrap(),
            StateValue::BinBase64(b"hello".to_vec())
        );
        assert_eq!(
            StateValue::parse(StateVarType::BinHex, "68656c6c6f").unwrap(),
            StateValue::BinHex(b"hello".to_vec())
        );
        assert!(StateValue::parse(StateVarType::BinHex, "0g").is_err());
        assert!(StateValue::parse(StateVarType::BinHex, "012").is_err());
    }

    #[test]
    fn test_temporal_types() {
        assert!(StateValue::parse(StateVarType::Date, "2026-08-02").is_ok());
        assert!(StateValue::parse(StateVarType::Date, "02/08/2026").is_err());
        assert!(StateValue::parse(StateVarType::DateTime, "2026-08-02T10:30:00").is_ok());
        assert!(StateValue::parse(StateVarType::DateTimeTz, "2026-08-02T10:30:00+02:00").is_ok());
        assert!(StateValue::parse(StateVarType::Time, "10:30:00").is_ok());
        assert!(StateValue::parse(StateVarType::TimeTz, "10:30:00+02:00").is_ok());
    }

    #[test]
    fn test_uri_and_uuid() {
        assert!(StateValue::parse(StateVarType::Uri, "http://example.org/a").is_ok());
        assert!(StateValue::parse(StateVarType::Uri, "::notaurl::").is_err());
        assert!(
            StateValue::parse(StateVarType::Uuid, "5d794fc2-5c5e-4460-a023-f04a51363300").is_ok()
        );
        assert!(StateValue::parse(StateVarType::Uuid, "nope").is_err());
    }

    #[test]
    fn test_lexical_roundtrip() {
        for (ty, s) in [
            (StateVarType::Ui4, "42"),
            (StateVarType::Boolean, "1"),
            (StateVarType::Date, "2026-08-02"),
            (StateVarType::DateTime, "2026-08-02T10:30:00"),
            (StateVarType::Time, "10:30:00"),
            (StateVarType::BinHex, "cafe"),
            (StateVarType::String, "hello world"),
        ] {
            let value = StateValue::parse(ty, s).unwrap();
            assert_eq!(value.to_lexical(), s);
        }
    }
}
