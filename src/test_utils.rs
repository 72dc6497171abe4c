//! Shared test utilities and arbitrary generators for property-based testing.

use proptest::prelude::*;
use std::collections::BTreeSet;

use crate::persistence::event::{Event, EventPayload, EventQuery};
use crate::plan::{Plan, Segment, SegmentName, SegmentRule};
use crate::types::accession::Accession;
use crate::types::ids::{EventId, IsolateId, OtuId, SequenceId, Taxid};
use crate::types::isolate::{Isolate, IsolateName, IsolateNameKind};
use crate::types::otu::Otu;
use crate::types::sequence::Sequence;

pub fn arb_accession() -> impl Strategy<Value = Accession> {
    ("[A-Z]{2}[0-9]{6}", 1u32..10).prop_map(|(key, version)| Accession::new(key, version))
}

pub fn arb_segment_name() -> impl Strategy<Value = SegmentName> {
    prop_oneof![
        Just(SegmentName::new("RNA1")),
        Just(SegmentName::new("RNA2")),
        Just(SegmentName::new("RNA3")),
        Just(SegmentName::new("DNA-A")),
        Just(SegmentName::new("DNA-B")),
    ]
}

pub fn arb_segment() -> impl Strategy<Value = Segment> {
    (
        arb_segment_name(),
        prop_oneof![Just(SegmentRule::Required), Just(SegmentRule::Optional)],
        500u64..20_000,
        0.0f64..0.2,
    )
        .prop_map(|(name, rule, length, tolerance)| Segment::new(name, rule, length, tolerance))
}

pub fn arb_plan() -> impl Strategy<Value = Plan> {
    (
        prop::collection::vec(arb_segment(), 0..3),
        prop::collection::btree_set("[A-Z]{2}[0-9]{6}", 0..3),
    )
        .prop_map(|(segments, defaults)| Plan::new(segments).with_defaults(defaults))
}

pub fn arb_isolate_name() -> impl Strategy<Value = Option<IsolateName>> {
    prop_oneof![
        Just(None),
        (
            prop_oneof![
                Just(IsolateNameKind::Isolate),
                Just(IsolateNameKind::Strain),
                Just(IsolateNameKind::Clone),
            ],
            "[A-Za-z0-9-]{1,12}",
        )
            .prop_map(|(kind, value)| IsolateName::new(kind, value)),
    ]
}

pub fn arb_sequence() -> impl Strategy<Value = Sequence> {
    (
        arb_accession(),
        prop::option::of(arb_segment_name()),
        500u64..20_000,
    )
        .prop_map(|(accession, segment, length)| Sequence {
            id: SequenceId::new(),
            accession,
            segment,
            length,
        })
}

pub fn arb_isolate() -> impl Strategy<Value = Isolate> {
    (arb_isolate_name(), prop::collection::vec(arb_sequence(), 0..3)).prop_map(
        |(name, sequences)| {
            let mut isolate = Isolate::new(IsolateId::new(), name);
            isolate.sequences = sequences;
            isolate
        },
    )
}

pub fn arb_otu() -> impl Strategy<Value = Otu> {
    (
        1u64..10_000_000,
        "[A-Z][a-z]{3,12} virus",
        "[A-Z]{2,6}",
        arb_plan(),
        prop::collection::vec(arb_isolate(), 0..3),
        prop::collection::btree_set("[A-Z]{2}[0-9]{6}", 0..3),
    )
        .prop_map(|(taxid, name, acronym, plan, isolates, excluded)| Otu {
            id: OtuId::new(),
            taxid: Taxid(taxid),
            name,
            acronym,
            plan,
            representative_isolate: isolates.first().map(|isolate| isolate.id),
            isolates,
            excluded_accessions: excluded,
        })
}

pub fn arb_payload() -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        (1u64..10_000_000, "[A-Z][a-z]{3,12} virus", "[A-Z]{2,6}", arb_plan()).prop_map(
            |(taxid, name, acronym, plan)| EventPayload::CreateOtu {
                otu_id: OtuId::new(),
                taxid: Taxid(taxid),
                name,
                acronym,
                plan,
            }
        ),
        arb_isolate_name().prop_map(|name| EventPayload::CreateIsolate {
            isolate_id: IsolateId::new(),
            name,
        }),
        (
            arb_accession(),
            prop::option::of(arb_segment_name()),
            500u64..20_000,
        )
            .prop_map(|(accession, segment, length)| EventPayload::CreateSequence {
                isolate_id: IsolateId::new(),
                sequence_id: SequenceId::new(),
                accession,
                segment,
                length,
            }),
        "[a-zA-Z ]{1,40}".prop_map(|rationale| EventPayload::DeleteIsolate {
            isolate_id: IsolateId::new(),
            rationale,
        }),
        prop::collection::btree_set("[A-Z]{2}[0-9]{6}", 1..4).prop_map(|keys| {
            EventPayload::ExcludeAccessions {
                accessions: keys.into_iter().collect(),
            }
        }),
        prop::collection::btree_set("[A-Z]{2}[0-9]{6}", 1..4).prop_map(|keys| {
            EventPayload::AllowAccessions {
                accessions: keys.into_iter().collect(),
            }
        }),
        Just(EventPayload::SetRepresentativeIsolate {
            isolate_id: IsolateId::new(),
        }),
        arb_plan().prop_map(|plan| EventPayload::SetPlan { plan }),
    ]
}

pub fn arb_event() -> impl Strategy<Value = Event> {
    (0u64..1_000_000, arb_payload()).prop_map(|(id, payload)| Event {
        id: EventId(id),
        timestamp: chrono::Utc::now(),
        query: EventQuery {
            otu_id: OtuId::new(),
            parent: if id == 0 { None } else { Some(EventId(id - 1)) },
        },
        payload,
    })
}

/// A minimal unit for tests that only need a valid value.
pub fn minimal_otu() -> Otu {
    Otu {
        id: OtuId::new(),
        taxid: Taxid(12345),
        name: "Test virus".to_string(),
        acronym: "TV".to_string(),
        plan: Plan::new(vec![Segment::new(
            SegmentName::new("RNA1"),
            SegmentRule::Required,
            1200,
            0.03,
        )]),
        representative_isolate: None,
        isolates: Vec::new(),
        excluded_accessions: BTreeSet::new(),
    }
}
