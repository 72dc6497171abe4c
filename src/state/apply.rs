//! Pure event application.
//!
//! `apply` folds one event payload into the materialized state of a unit.
//! It performs no I/O, so the same ordered payload sequence always produces
//! the same state, which is the determinism the rebuild path relies on. The
//! repository also uses it to validate staged events against an in-memory
//! copy before anything is written.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::persistence::event::EventPayload;
use crate::plan::PlanMismatchError;
use crate::types::ids::IsolateId;
use crate::types::isolate::{Isolate, IsolateName};
use crate::types::otu::Otu;
use crate::types::sequence::Sequence;

/// Errors raised while applying an event to unit state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    /// The first event of a unit was not a creation event.
    #[error("the first event of a unit must be create_otu")]
    MissingCreate,

    /// A creation event arrived for a unit that already exists.
    #[error("create_otu applied to an already-initialized unit")]
    DuplicateCreate,

    /// The isolate would collide with an existing isolate.
    #[error("unit already has an isolate named {}", name_label(.name))]
    DuplicateIsolate {
        /// The colliding name; `None` for the unnamed slot.
        name: Option<IsolateName>,
    },

    /// The accession is already present somewhere in the unit.
    #[error("accession {accession} already exists in the unit")]
    AccessionConflict {
        /// The conflicting accession key.
        accession: String,
    },

    /// The event targets an isolate the unit does not have.
    #[error("unit has no isolate {isolate_id}")]
    UnknownIsolate {
        /// The missing isolate.
        isolate_id: IsolateId,
    },

    /// The event would leave the unit in violation of its plan.
    #[error("plan validation failed: {0}")]
    Plan(#[from] PlanMismatchError),
}

fn name_label(name: &Option<IsolateName>) -> String {
    match name {
        Some(name) => format!("{:?}", name.to_string()),
        None => "<unnamed>".to_string(),
    }
}

/// Applies one event payload to the unit state, returning the new state.
///
/// `state` is `None` only before the unit's creation event. Any failure
/// leaves the caller's view untouched: the function consumes and returns
/// the state by value precisely so a failed application has no partial
/// effect anywhere.
pub fn apply(state: Option<Otu>, payload: &EventPayload) -> Result<Otu, ApplyError> {
    match payload {
        EventPayload::CreateOtu {
            otu_id,
            taxid,
            name,
            acronym,
            plan,
        } => {
            if state.is_some() {
                return Err(ApplyError::DuplicateCreate);
            }

            Ok(Otu {
                id: *otu_id,
                taxid: *taxid,
                name: name.clone(),
                acronym: acronym.clone(),
                plan: plan.clone(),
                representative_isolate: None,
                isolates: Vec::new(),
                excluded_accessions: BTreeSet::new(),
            })
        }

        EventPayload::CreateIsolate { isolate_id, name } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;

            let collides = match name {
                None => otu.unnamed_isolate().is_some(),
                Some(name) => otu
                    .isolates
                    .iter()
                    .any(|isolate| isolate.name.as_ref() == Some(name)),
            };

            if collides {
                return Err(ApplyError::DuplicateIsolate { name: name.clone() });
            }

            otu.isolates.push(Isolate::new(*isolate_id, name.clone()));
            Ok(otu)
        }

        EventPayload::CreateSequence {
            isolate_id,
            sequence_id,
            accession,
            segment,
            length,
        } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;
            let key = accession.key();

            if otu.contains_accession(key) || otu.is_excluded(key) {
                return Err(ApplyError::AccessionConflict {
                    accession: key.to_string(),
                });
            }

            let isolate = otu
                .isolates
                .iter_mut()
                .find(|isolate| isolate.id == *isolate_id)
                .ok_or(ApplyError::UnknownIsolate {
                    isolate_id: *isolate_id,
                })?;

            isolate.sequences.push(Sequence {
                id: *sequence_id,
                accession: accession.clone(),
                segment: segment.clone(),
                length: *length,
            });

            Ok(otu)
        }

        EventPayload::DeleteIsolate { isolate_id, .. } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;

            let index = otu
                .isolates
                .iter()
                .position(|isolate| isolate.id == *isolate_id)
                .ok_or(ApplyError::UnknownIsolate {
                    isolate_id: *isolate_id,
                })?;

            otu.isolates.remove(index);

            if otu.representative_isolate == Some(*isolate_id) {
                otu.representative_isolate = None;
            }

            Ok(otu)
        }

        EventPayload::ExcludeAccessions { accessions } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;
            otu.excluded_accessions
                .extend(accessions.iter().cloned());
            Ok(otu)
        }

        EventPayload::AllowAccessions { accessions } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;
            for accession in accessions {
                otu.excluded_accessions.remove(accession);
            }
            Ok(otu)
        }

        EventPayload::SetRepresentativeIsolate { isolate_id } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;

            if otu.get_isolate(*isolate_id).is_none() {
                return Err(ApplyError::UnknownIsolate {
                    isolate_id: *isolate_id,
                });
            }

            otu.representative_isolate = Some(*isolate_id);
            Ok(otu)
        }

        EventPayload::SetPlan { plan } => {
            let mut otu = state.ok_or(ApplyError::MissingCreate)?;

            plan.validate(&otu.isolates)?;

            if let Some(key) = plan
                .defaults()
                .iter()
                .find(|key| otu.is_excluded(key))
            {
                return Err(ApplyError::AccessionConflict {
                    accession: key.clone(),
                });
            }

            otu.plan = plan.clone();
            Ok(otu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Plan, Segment, SegmentName, SegmentRule};
    use crate::types::accession::Accession;
    use crate::types::ids::{OtuId, SequenceId, Taxid};
    use crate::types::isolate::IsolateNameKind;

    fn monopartite_plan() -> Plan {
        Plan::new(vec![Segment::new(
            SegmentName::new("RNA1"),
            SegmentRule::Required,
            1200,
            0.03,
        )])
    }

    fn created() -> Otu {
        apply(
            None,
            &EventPayload::CreateOtu {
                otu_id: OtuId::new(),
                taxid: Taxid(12345),
                name: "Test virus".to_string(),
                acronym: "TV".to_string(),
                plan: monopartite_plan(),
            },
        )
        .unwrap()
    }

    fn create_isolate(name: Option<IsolateName>) -> (IsolateId, EventPayload) {
        let isolate_id = IsolateId::new();
        (isolate_id, EventPayload::CreateIsolate { isolate_id, name })
    }

    fn create_sequence(isolate_id: IsolateId, accession: &str) -> EventPayload {
        EventPayload::CreateSequence {
            isolate_id,
            sequence_id: SequenceId::new(),
            accession: Accession::parse(accession).unwrap(),
            segment: Some(SegmentName::new("RNA1")),
            length: 1200,
        }
    }

    #[test]
    fn create_initializes_shell() {
        let otu = created();
        assert_eq!(otu.taxid, Taxid(12345));
        assert!(otu.isolates.is_empty());
        assert!(otu.excluded_accessions.is_empty());
        assert!(otu.representative_isolate.is_none());
    }

    #[test]
    fn create_twice_fails() {
        let otu = created();
        let result = apply(
            Some(otu.clone()),
            &EventPayload::CreateOtu {
                otu_id: otu.id,
                taxid: otu.taxid,
                name: otu.name.clone(),
                acronym: otu.acronym.clone(),
                plan: monopartite_plan(),
            },
        );
        assert!(matches!(result, Err(ApplyError::DuplicateCreate)));
    }

    #[test]
    fn first_event_must_be_create() {
        let (_, payload) = create_isolate(None);
        assert!(matches!(
            apply(None, &payload),
            Err(ApplyError::MissingCreate)
        ));
    }

    #[test]
    fn second_unnamed_isolate_fails() {
        let otu = created();
        let (_, first) = create_isolate(None);
        let otu = apply(Some(otu), &first).unwrap();

        let (_, second) = create_isolate(None);
        let result = apply(Some(otu), &second);
        assert!(matches!(
            result,
            Err(ApplyError::DuplicateIsolate { name: None })
        ));
    }

    #[test]
    fn duplicate_named_isolate_fails() {
        let name = IsolateName::new(IsolateNameKind::Isolate, "Badnapur");
        let otu = created();
        let (_, first) = create_isolate(name.clone());
        let otu = apply(Some(otu), &first).unwrap();

        let (_, second) = create_isolate(name);
        let result = apply(Some(otu), &second);
        assert!(matches!(
            result,
            Err(ApplyError::DuplicateIsolate { name: Some(_) })
        ));
    }

    #[test]
    fn distinct_named_isolates_coexist() {
        let otu = created();
        let (_, a) = create_isolate(IsolateName::new(IsolateNameKind::Isolate, "A"));
        let otu = apply(Some(otu), &a).unwrap();

        let (_, b) = create_isolate(IsolateName::new(IsolateNameKind::Isolate, "B"));
        let otu = apply(Some(otu), &b).unwrap();
        assert_eq!(otu.isolates.len(), 2);
    }

    #[test]
    fn sequence_attaches_to_isolate() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(Some(otu), &create_sequence(isolate_id, "AB123456.1")).unwrap();

        let isolate = otu.get_isolate(isolate_id).unwrap();
        assert_eq!(isolate.sequences.len(), 1);
        assert!(otu.contains_accession("AB123456"));
    }

    #[test]
    fn duplicate_accession_fails() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(Some(otu), &create_sequence(isolate_id, "AB123456.1")).unwrap();

        // Same key, different version, different isolate: still a conflict.
        let (other_id, other) =
            create_isolate(IsolateName::new(IsolateNameKind::Strain, "TW14"));
        let otu = apply(Some(otu), &other).unwrap();

        let result = apply(Some(otu), &create_sequence(other_id, "AB123456.2"));
        assert!(matches!(
            result,
            Err(ApplyError::AccessionConflict { accession }) if accession == "AB123456"
        ));
    }

    #[test]
    fn excluded_accession_cannot_be_attached() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(
            Some(otu),
            &EventPayload::ExcludeAccessions {
                accessions: vec!["AB123456".to_string()],
            },
        )
        .unwrap();

        let result = apply(Some(otu), &create_sequence(isolate_id, "AB123456.1"));
        assert!(matches!(result, Err(ApplyError::AccessionConflict { .. })));
    }

    #[test]
    fn sequence_for_unknown_isolate_fails() {
        let otu = created();
        let result = apply(Some(otu), &create_sequence(IsolateId::new(), "AB123456.1"));
        assert!(matches!(result, Err(ApplyError::UnknownIsolate { .. })));
    }

    #[test]
    fn exclusion_toggles_are_idempotent_on_state() {
        let otu = created();
        let exclude = EventPayload::ExcludeAccessions {
            accessions: vec!["KX965867".to_string()],
        };

        let once = apply(Some(otu.clone()), &exclude).unwrap();
        let twice = apply(Some(once.clone()), &exclude).unwrap();
        assert_eq!(once, twice);

        let allowed = apply(
            Some(twice),
            &EventPayload::AllowAccessions {
                accessions: vec!["KX965867".to_string()],
            },
        )
        .unwrap();
        assert!(!allowed.is_excluded("KX965867"));
    }

    #[test]
    fn delete_isolate_frees_its_accessions() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(Some(otu), &create_sequence(isolate_id, "AB123456.1")).unwrap();

        let otu = apply(
            Some(otu),
            &EventPayload::DeleteIsolate {
                isolate_id,
                rationale: "requested by curator".to_string(),
            },
        )
        .unwrap();

        assert!(otu.isolates.is_empty());
        assert!(!otu.contains_accession("AB123456"));
    }

    #[test]
    fn delete_clears_representative() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(
            Some(otu),
            &EventPayload::SetRepresentativeIsolate { isolate_id },
        )
        .unwrap();
        assert_eq!(otu.representative_isolate, Some(isolate_id));

        let otu = apply(
            Some(otu),
            &EventPayload::DeleteIsolate {
                isolate_id,
                rationale: "superseded".to_string(),
            },
        )
        .unwrap();
        assert_eq!(otu.representative_isolate, None);
    }

    #[test]
    fn set_representative_requires_existing_isolate() {
        let otu = created();
        let result = apply(
            Some(otu),
            &EventPayload::SetRepresentativeIsolate {
                isolate_id: IsolateId::new(),
            },
        );
        assert!(matches!(result, Err(ApplyError::UnknownIsolate { .. })));
    }

    #[test]
    fn set_plan_rejects_nonconforming_isolates() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(Some(otu), &create_sequence(isolate_id, "AB123456.1")).unwrap();

        // The new plan renames the only segment, stranding the isolate.
        let new_plan = Plan::new(vec![Segment::new(
            SegmentName::new("DNA-A"),
            SegmentRule::Required,
            1200,
            0.03,
        )]);

        let result = apply(Some(otu), &EventPayload::SetPlan { plan: new_plan });
        assert!(matches!(result, Err(ApplyError::Plan(_))));
    }

    #[test]
    fn set_plan_accepts_compatible_replacement() {
        let otu = created();
        let (isolate_id, isolate) = create_isolate(None);
        let otu = apply(Some(otu), &isolate).unwrap();
        let otu = apply(Some(otu), &create_sequence(isolate_id, "AB123456.1")).unwrap();

        // Same segment, wider tolerance, one extra optional segment.
        let new_plan = Plan::new(vec![
            Segment::new(SegmentName::new("RNA1"), SegmentRule::Required, 1200, 0.05),
            Segment::new(SegmentName::new("RNA2"), SegmentRule::Optional, 900, 0.05),
        ]);

        let otu = apply(Some(otu), &EventPayload::SetPlan { plan: new_plan }).unwrap();
        assert_eq!(otu.plan.segments().len(), 2);
    }
}
