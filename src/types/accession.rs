//! Versioned sequence accessions.
//!
//! Raw accessions arrive from the provider as `KEY.VERSION` strings, e.g.
//! `AB123456.1` or `NC_003355.1`. Unversioned strings are rejected at the
//! boundary so the rest of the crate never has to guess a version.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a raw accession string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid accession {raw:?}: {reason}")]
pub struct AccessionParseError {
    /// The raw input string.
    pub raw: String,
    /// Why parsing failed.
    pub reason: String,
}

/// A versioned accession: a stable key plus an integer version.
///
/// Two sequences with the same key but different versions are revisions of the
/// same record. Uniqueness within a unit is tracked by key, not by version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Accession {
    key: String,
    version: u32,
}

impl Accession {
    /// Creates an accession from its parts.
    pub fn new(key: impl Into<String>, version: u32) -> Self {
        Accession {
            key: key.into(),
            version,
        }
    }

    /// Parses a raw `KEY.VERSION` string.
    pub fn parse(raw: &str) -> Result<Self, AccessionParseError> {
        let (key, version) = raw.rsplit_once('.').ok_or_else(|| AccessionParseError {
            raw: raw.to_string(),
            reason: "missing version suffix".to_string(),
        })?;

        if key.is_empty() {
            return Err(AccessionParseError {
                raw: raw.to_string(),
                reason: "empty accession key".to_string(),
            });
        }

        let version = version.parse().map_err(|_| AccessionParseError {
            raw: raw.to_string(),
            reason: "version is not an integer".to_string(),
        })?;

        Ok(Accession {
            key: key.to_string(),
            version,
        })
    }

    /// The stable accession key, without the version suffix.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The record version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns true if this accession comes from the RefSeq collection.
    ///
    /// RefSeq keys carry an underscore infix (e.g. `NC_003355`); plain
    /// GenBank keys do not.
    pub fn is_refseq(&self) -> bool {
        self.key.contains('_')
    }
}

/// Returns the key portion of a possibly versioned raw accession string.
pub fn accession_key(raw: &str) -> &str {
    match raw.find('.') {
        Some(i) => &raw[..i],
        None => raw,
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.version)
    }
}

impl FromStr for Accession {
    type Err = AccessionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Accession::parse(s)
    }
}

impl Serialize for Accession {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Accession {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Accession::parse(&raw).map_err(D::Error::custom)
    }
}
