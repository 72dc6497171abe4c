//! Genome-segment plans and plan validation.
//!
//! A plan declares the segments a valid isolate of a unit must carry. A
//! monopartite plan has one segment; a multipartite plan has several.
//! Validation is pure: it looks only at the plan and the contents handed to
//! it, never at the store.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::types::isolate::Isolate;
use crate::types::sequence::Sequence;

/// The name of a genome segment, e.g. "RNA1" or "DNA-A".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentName(String);

impl SegmentName {
    /// Creates a segment name.
    pub fn new(name: impl Into<String>) -> Self {
        SegmentName(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SegmentName {
    fn from(s: &str) -> Self {
        SegmentName(s.to_string())
    }
}

/// Whether a segment must be present in a conforming isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentRule {
    Required,
    Optional,
}

/// One segment of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// The segment name. Sequences are assigned by exact name match.
    pub name: SegmentName,

    /// Whether a conforming isolate must carry this segment.
    pub rule: SegmentRule,

    /// The expected sequence length in bases.
    pub length: u64,

    /// Fractional tolerance applied to `length` when checking sequences.
    pub length_tolerance: f64,
}

impl Segment {
    /// Creates a segment.
    pub fn new(name: SegmentName, rule: SegmentRule, length: u64, length_tolerance: f64) -> Self {
        Segment {
            name,
            rule,
            length,
            length_tolerance,
        }
    }

    /// The inclusive `(min, max)` length window this segment accepts.
    pub fn length_window(&self) -> (u64, u64) {
        let length = self.length as f64;
        let min = (length * (1.0 - self.length_tolerance)).floor() as u64;
        let max = (length * (1.0 + self.length_tolerance)).ceil() as u64;
        (min, max)
    }

    /// Returns true if a sequence of `length` bases fits this segment.
    pub fn accepts_length(&self, length: u64) -> bool {
        let (min, max) = self.length_window();
        (min..=max).contains(&length)
    }
}

/// Error returned when contents do not conform to a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanMismatchError {
    /// A required segment is not matched by any sequence.
    #[error("required segment {segment} is not satisfied")]
    MissingSegment {
        /// The unmatched segment.
        segment: SegmentName,
    },

    /// A segment is matched by more than one sequence.
    #[error("segment {segment} is matched by {count} sequences")]
    DuplicateSegment {
        /// The over-matched segment.
        segment: SegmentName,
        /// How many sequences claimed it.
        count: usize,
    },

    /// A sequence names a segment the plan does not declare.
    #[error("sequence {accession} is assigned to unknown segment {segment}")]
    UnknownSegment {
        /// The offending sequence's accession key.
        accession: String,
        /// The undeclared segment name.
        segment: SegmentName,
    },

    /// A sequence's length falls outside its segment's tolerance window.
    #[error("sequence {accession} has length {length}, outside [{min}, {max}] for segment {segment}")]
    LengthOutOfTolerance {
        accession: String,
        segment: SegmentName,
        length: u64,
        min: u64,
        max: u64,
    },

    /// An accession key appears more than once across plan defaults and
    /// isolate contents.
    #[error("accession {accession} appears more than once in the unit")]
    DuplicateAccession {
        /// The duplicated accession key.
        accession: String,
    },
}

/// The structural definition of the genome segments of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    segments: Vec<Segment>,
    defaults: BTreeSet<String>,
}

impl Plan {
    /// Creates a plan from its segments, with no default accessions.
    pub fn new(segments: Vec<Segment>) -> Self {
        Plan {
            segments,
            defaults: BTreeSet::new(),
        }
    }

    /// Returns this plan with the given default accession keys.
    ///
    /// Defaults are the accessions seeded from the plan-defining records.
    /// They count toward accession uniqueness like isolate contents do.
    pub fn with_defaults(mut self, defaults: impl IntoIterator<Item = String>) -> Self {
        self.defaults = defaults.into_iter().collect();
        self
    }

    /// The plan's segments, in declaration order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The plan's default accession keys.
    pub fn defaults(&self) -> &BTreeSet<String> {
        &self.defaults
    }

    /// Returns true if the plan declares exactly one segment.
    pub fn is_monopartite(&self) -> bool {
        self.segments.len() == 1
    }

    /// Returns the segment with the given name, if declared.
    pub fn get_segment(&self, name: &SegmentName) -> Option<&Segment> {
        self.segments.iter().find(|segment| &segment.name == name)
    }

    /// Validates one isolate's sequences against this plan.
    ///
    /// Every `Required` segment must be matched by exactly one sequence;
    /// `Optional` segments may be unmatched but not over-matched. A sequence
    /// assigned to a segment the plan does not declare is rejected, as is a
    /// sequence whose length falls outside its segment's tolerance window.
    /// Sequences with no segment assignment do not count toward coverage.
    pub fn validate_isolate(&self, sequences: &[Sequence]) -> Result<(), PlanMismatchError> {
        let mut matched: BTreeMap<&SegmentName, usize> = BTreeMap::new();

        for sequence in sequences {
            let Some(name) = &sequence.segment else {
                continue;
            };

            let segment =
                self.get_segment(name)
                    .ok_or_else(|| PlanMismatchError::UnknownSegment {
                        accession: sequence.accession.key().to_string(),
                        segment: name.clone(),
                    })?;

            if !segment.accepts_length(sequence.length) {
                let (min, max) = segment.length_window();
                return Err(PlanMismatchError::LengthOutOfTolerance {
                    accession: sequence.accession.key().to_string(),
                    segment: name.clone(),
                    length: sequence.length,
                    min,
                    max,
                });
            }

            *matched.entry(&segment.name).or_insert(0) += 1;
        }

        for segment in &self.segments {
            let count = matched.get(&segment.name).copied().unwrap_or(0);

            if count > 1 {
                return Err(PlanMismatchError::DuplicateSegment {
                    segment: segment.name.clone(),
                    count,
                });
            }

            if count == 0 && segment.rule == SegmentRule::Required {
                return Err(PlanMismatchError::MissingSegment {
                    segment: segment.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Validates a whole unit's isolates against this plan.
    ///
    /// Runs [`Plan::validate_isolate`] for every isolate and additionally
    /// checks that no accession key appears more than once across the union
    /// of plan defaults and isolate contents.
    pub fn validate(&self, isolates: &[Isolate]) -> Result<(), PlanMismatchError> {
        for isolate in isolates {
            self.validate_isolate(&isolate.sequences)?;
        }

        let mut seen: BTreeSet<&str> = self.defaults.iter().map(String::as_str).collect();

        for isolate in isolates {
            for key in isolate.accession_keys() {
                if !seen.insert(key) {
                    return Err(PlanMismatchError::DuplicateAccession {
                        accession: key.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
