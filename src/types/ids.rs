//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using an
//! IsolateId where an OtuId is expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The unique identifier of a taxonomic unit (OTU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OtuId(pub Uuid);

impl OtuId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        OtuId(Uuid::new_v4())
    }
}

impl Default for OtuId {
    fn default() -> Self {
        OtuId::new()
    }
}

impl fmt::Display for OtuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unique identifier of an isolate within a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsolateId(pub Uuid);

impl IsolateId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        IsolateId(Uuid::new_v4())
    }
}

impl Default for IsolateId {
    fn default() -> Self {
        IsolateId::new()
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unique identifier of a sequence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub Uuid);

impl SequenceId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        SequenceId(Uuid::new_v4())
    }
}

impl Default for SequenceId {
    fn default() -> Self {
        SequenceId::new()
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An external integer taxonomy identifier.
///
/// Taxids are assigned by the upstream taxonomy provider. Within a repository
/// the taxid-to-unit binding is 1:1 and permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taxid(pub u64);

impl fmt::Display for Taxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Taxid {
    fn from(n: u64) -> Self {
        Taxid(n)
    }
}

/// The serially incremented identifier of an event in the store.
///
/// Event IDs are monotonic across the whole store. Ordering by event id is the
/// single source of truth for replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    /// The id immediately following this one.
    pub fn next(self) -> EventId {
        EventId(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(n: u64) -> Self {
        EventId(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn taxid_serde_roundtrip(n: u64) {
            let taxid = Taxid(n);
            let json = serde_json::to_string(&taxid).unwrap();
            let parsed: Taxid = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(taxid, parsed);
        }

        #[test]
        fn event_id_serde_roundtrip(n: u64) {
            let id = EventId(n);
            let json = serde_json::to_string(&id).unwrap();
            let parsed: EventId = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(id, parsed);
        }

        #[test]
        fn event_id_next_increments(n in 0u64..u64::MAX) {
            prop_assert_eq!(EventId(n).next(), EventId(n + 1));
        }

        #[test]
        fn event_id_ordering_matches_underlying(a: u64, b: u64) {
            prop_assert_eq!(EventId(a) < EventId(b), a < b);
        }
    }

    #[test]
    fn otu_id_serializes_as_plain_uuid() {
        let id = OtuId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(OtuId::new(), OtuId::new());
        assert_ne!(IsolateId::new(), IsolateId::new());
        assert_ne!(SequenceId::new(), SequenceId::new());
    }
}
