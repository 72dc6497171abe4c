//! Isolates and isolate naming.
//!
//! An isolate groups the sequences of one biological sample under a unit. Its
//! name is derived from the source fields of the provider record; a sample
//! whose record carries no usable source field is explicitly unnamed rather
//! than named with an empty string.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::IsolateId;
use super::sequence::Sequence;

/// The kind of source field an isolate name was taken from.
///
/// Ordered by resolution priority. Do not reorder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolateNameKind {
    Isolate,
    Strain,
    Clone,
}

impl IsolateNameKind {
    /// The lowercase label used in provider source tables.
    pub fn label(&self) -> &'static str {
        match self {
            IsolateNameKind::Isolate => "isolate",
            IsolateNameKind::Strain => "strain",
            IsolateNameKind::Clone => "clone",
        }
    }
}

impl fmt::Display for IsolateNameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A name for an isolate: a kind plus a non-empty value.
///
/// For the name "Isolate PPSMV2-Badnapur", the kind is `isolate` and the
/// value is `PPSMV2-Badnapur`. An `IsolateName` with an empty value is never
/// constructed; "no name" is represented as `Option::None` at the use site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsolateName {
    kind: IsolateNameKind,
    value: String,
}

impl IsolateName {
    /// Creates a name from a kind and raw value.
    ///
    /// Returns `None` if the value is empty or whitespace-only.
    pub fn new(kind: IsolateNameKind, value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return None;
        }

        Some(IsolateName {
            kind,
            value: trimmed.to_string(),
        })
    }

    /// Derives one name from the raw source fields of a provider record.
    ///
    /// Precedence is `isolate > strain > clone`. Absent and empty fields are
    /// skipped, so two records without usable source fields both resolve to
    /// `None` instead of colliding on an identical empty name.
    pub fn resolve(
        isolate: Option<&str>,
        strain: Option<&str>,
        clone: Option<&str>,
    ) -> Option<Self> {
        let candidates = [
            (IsolateNameKind::Isolate, isolate),
            (IsolateNameKind::Strain, strain),
            (IsolateNameKind::Clone, clone),
        ];

        candidates
            .into_iter()
            .find_map(|(kind, value)| IsolateName::new(kind, value?))
    }

    /// The kind of source field the name came from.
    pub fn kind(&self) -> IsolateNameKind {
        self.kind
    }

    /// The name value. Never empty.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for IsolateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.kind.label();
        let mut chars = label.chars();
        match chars.next() {
            Some(first) => write!(f, "{}{} {}", first.to_uppercase(), chars.as_str(), self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// A specific biological sample grouped under a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isolate {
    /// The isolate id.
    pub id: IsolateId,

    /// The isolate's name, or `None` for an unnamed isolate.
    pub name: Option<IsolateName>,

    /// The isolate's sequences, in attachment order.
    pub sequences: Vec<Sequence>,
}

impl Isolate {
    /// Creates an empty isolate.
    pub fn new(id: IsolateId, name: Option<IsolateName>) -> Self {
        Isolate {
            id,
            name,
            sequences: Vec::new(),
        }
    }

    /// Returns the sequence with the given accession key, if present.
    pub fn get_sequence(&self, accession_key: &str) -> Option<&Sequence> {
        self.sequences
            .iter()
            .find(|sequence| sequence.accession.key() == accession_key)
    }

    /// Accession keys of all sequences in this isolate.
    pub fn accession_keys(&self) -> impl Iterator<Item = &str> {
        self.sequences
            .iter()
            .map(|sequence| sequence.accession.key())
    }
}
