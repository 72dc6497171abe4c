//! Sequence records attached to isolates.

use serde::{Deserialize, Serialize};

use super::accession::Accession;
use super::ids::SequenceId;
use crate::plan::SegmentName;

/// One nucleotide record belonging to an isolate.
///
/// The nucleotide data itself stays with the provider; the repository tracks
/// the accession, the segment assignment and the record length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// The sequence id.
    pub id: SequenceId,

    /// The versioned accession of the record.
    pub accession: Accession,

    /// The plan segment this record is assigned to, if any.
    pub segment: Option<SegmentName>,

    /// The record length in bases.
    pub length: u64,
}
