//! The materialized state of a taxonomic unit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{IsolateId, OtuId, Taxid};
use super::isolate::Isolate;
use super::sequence::Sequence;
use crate::plan::Plan;

/// An operational taxonomic unit: the top-level curated reference entity.
///
/// An `Otu` is never mutated directly. It is materialized by replaying the
/// unit's events in order, so two replays of the same events always produce
/// equal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Otu {
    /// The unit id.
    pub id: OtuId,

    /// The external taxonomy id. Unique across the repository.
    pub taxid: Taxid,

    /// The unit name, e.g. "Pigeonpea sterility mosaic emaravirus 2".
    pub name: String,

    /// The unit acronym, e.g. "PPSMV2". May be empty.
    pub acronym: String,

    /// The genome-segment plan a valid isolate must satisfy.
    pub plan: Plan,

    /// The isolate that currently represents this unit, if one was chosen.
    pub representative_isolate: Option<IsolateId>,

    /// The unit's isolates, in creation order.
    pub isolates: Vec<Isolate>,

    /// Accession keys excluded from future inclusion.
    ///
    /// Excluded accessions are omitted from default enumeration but remain
    /// addressable by exact lookup via [`Otu::is_excluded`].
    pub excluded_accessions: BTreeSet<String>,
}

impl Otu {
    /// Returns the isolate with the given id, if present.
    pub fn get_isolate(&self, isolate_id: IsolateId) -> Option<&Isolate> {
        self.isolates
            .iter()
            .find(|isolate| isolate.id == isolate_id)
    }

    /// Returns the unit's unnamed isolate, if one exists.
    ///
    /// At most one isolate per unit may be unnamed.
    pub fn unnamed_isolate(&self) -> Option<&Isolate> {
        self.isolates.iter().find(|isolate| isolate.name.is_none())
    }

    /// Accession keys currently in use by the unit.
    ///
    /// Covers the plan's default set and every isolate's contents. Excluded
    /// accessions are not in use and are not enumerated here.
    pub fn accessions(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self.plan.defaults().iter().cloned().collect();

        for isolate in &self.isolates {
            keys.extend(isolate.accession_keys().map(str::to_string));
        }

        keys
    }

    /// Returns true if the accession key is in use anywhere in the unit.
    pub fn contains_accession(&self, accession_key: &str) -> bool {
        self.plan.defaults().contains(accession_key)
            || self
                .isolates
                .iter()
                .any(|isolate| isolate.get_sequence(accession_key).is_some())
    }

    /// Returns the sequence with the given accession key, searching every
    /// isolate.
    pub fn sequence_by_accession(&self, accession_key: &str) -> Option<&Sequence> {
        self.isolates
            .iter()
            .find_map(|isolate| isolate.get_sequence(accession_key))
    }

    /// Returns true if the accession key is excluded.
    pub fn is_excluded(&self, accession_key: &str) -> bool {
        self.excluded_accessions.contains(accession_key)
    }
}
