//! Event-sourced repository for curated plant-virus reference genomes.
//!
//! Every curation action (creating a taxonomic unit, attaching an isolate
//! or sequence, excluding an accession, changing a plan) is recorded as an
//! immutable event in a per-unit append-only log. Current state is
//! materialized by replaying events in order, optionally seeded from a
//! derived snapshot. A directory-scoped lock serializes writers; reads are
//! lock-free.

pub mod error;
pub mod lock;
pub mod persistence;
pub mod plan;
pub mod repo;
pub mod source;
pub mod state;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use error::RepoError;
pub use repo::{NewSequence, Repository, RepositoryConfig};
