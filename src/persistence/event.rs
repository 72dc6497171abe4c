//! Event records for the curation log.
//!
//! Every curation action is recorded as one immutable event. Events are
//! serialized as JSON Lines (one object per line) with the payload flattened
//! into the event object and tagged by kind:
//!
//! ```json
//! {"id":3,"timestamp":"2026-02-11T10:00:00Z","query":{"otu_id":"...","parent":2},
//!  "type":"create_isolate","isolate_id":"...","name":null}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{Plan, SegmentName};
use crate::types::accession::Accession;
use crate::types::ids::{EventId, IsolateId, OtuId, SequenceId, Taxid};
use crate::types::isolate::IsolateName;

/// One recorded curation action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The serially incremented, store-wide event id.
    pub id: EventId,

    /// When the event was recorded (UTC).
    pub timestamp: DateTime<Utc>,

    /// The selector targeting the event at a unit, echoing the expected
    /// prior head of that unit's partition.
    pub query: EventQuery,

    /// The event payload, flattened into the JSON object.
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Targets an event at a unit and carries the optimistic-concurrency check.
///
/// `parent` is the event id the writer observed as the unit's head when it
/// prepared this event. The store rejects the append if the partition head
/// has moved, which catches a writer racing against stale state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    /// The unit this event belongs to.
    pub otu_id: OtuId,

    /// The expected head of the unit's partition; `None` for a new unit.
    pub parent: Option<EventId>,
}

/// The closed set of event kinds, one strongly typed payload per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Initializes a unit shell. Must be the first event of a partition.
    CreateOtu {
        /// The new unit's id.
        otu_id: OtuId,
        /// The external taxonomy id being bound to the unit.
        taxid: Taxid,
        /// The unit name.
        name: String,
        /// The unit acronym. May be empty.
        acronym: String,
        /// The initial genome-segment plan.
        plan: Plan,
    },

    /// Appends an empty isolate to the unit.
    CreateIsolate {
        /// The new isolate's id.
        isolate_id: IsolateId,
        /// The isolate name; `None` for an unnamed isolate.
        name: Option<IsolateName>,
    },

    /// Attaches a sequence to an existing isolate.
    CreateSequence {
        /// The isolate receiving the sequence.
        isolate_id: IsolateId,
        /// The new sequence's id.
        sequence_id: SequenceId,
        /// The versioned accession of the record.
        accession: Accession,
        /// The plan segment the record is assigned to, if any.
        segment: Option<SegmentName>,
        /// The record length in bases.
        length: u64,
    },

    /// Removes an isolate from materialized state. The log keeps history.
    DeleteIsolate {
        /// The isolate being removed.
        isolate_id: IsolateId,
        /// Why the isolate was removed.
        rationale: String,
    },

    /// Adds accession keys to the unit's exclusion set.
    ExcludeAccessions {
        /// The keys being excluded, sorted for stable serialization.
        accessions: Vec<String>,
    },

    /// Removes accession keys from the unit's exclusion set.
    AllowAccessions {
        /// The keys being allowed again, sorted for stable serialization.
        accessions: Vec<String>,
    },

    /// Marks one isolate as the unit's representative.
    SetRepresentativeIsolate {
        /// The isolate being promoted.
        isolate_id: IsolateId,
    },

    /// Replaces the unit's plan.
    SetPlan {
        /// The new plan.
        plan: Plan,
    },
}

impl EventPayload {
    /// The kind tag used in serialized form, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::CreateOtu { .. } => "create_otu",
            EventPayload::CreateIsolate { .. } => "create_isolate",
            EventPayload::CreateSequence { .. } => "create_sequence",
            EventPayload::DeleteIsolate { .. } => "delete_isolate",
            EventPayload::ExcludeAccessions { .. } => "exclude_accessions",
            EventPayload::AllowAccessions { .. } => "allow_accessions",
            EventPayload::SetRepresentativeIsolate { .. } => "set_representative_isolate",
            EventPayload::SetPlan { .. } => "set_plan",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_event, arb_payload};
    use proptest::prelude::*;

    proptest! {
        /// Event serialization roundtrip.
        #[test]
        fn event_serde_roundtrip(event in arb_event()) {
            let json = serde_json::to_string(&event).unwrap();
            let parsed: Event = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(event, parsed);
        }

        /// Payload serialization roundtrip.
        #[test]
        fn payload_serde_roundtrip(payload in arb_payload()) {
            let json = serde_json::to_string(&payload).unwrap();
            let parsed: EventPayload = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(payload, parsed);
        }

        /// The serialized tag matches the payload kind.
        #[test]
        fn serialized_tag_matches_kind(payload in arb_payload()) {
            let value = serde_json::to_value(&payload).unwrap();
            prop_assert_eq!(value["type"].as_str(), Some(payload.kind()));
        }
    }

    #[test]
    fn payload_is_flattened_into_event_object() {
        let event = Event {
            id: EventId(7),
            timestamp: Utc::now(),
            query: EventQuery {
                otu_id: OtuId::new(),
                parent: Some(EventId(6)),
            },
            payload: EventPayload::ExcludeAccessions {
                accessions: vec!["KX965867".to_string()],
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "exclude_accessions");
        assert_eq!(value["accessions"][0], "KX965867");
        assert_eq!(value["id"], 7);
        assert_eq!(value["query"]["parent"], 6);
    }
}
