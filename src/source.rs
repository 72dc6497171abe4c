//! The source-data capability.
//!
//! The repository never talks to a network provider. Callers fetch records
//! and lineages through whatever implementation of [`SourceDataClient`] they
//! hold (a real provider client in the application, an in-memory fake in
//! tests) and pass the already-resolved values into repository operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ids::Taxid;
use crate::types::isolate::IsolateName;

/// Errors a source-data implementation may surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// No record exists for the requested accession.
    #[error("no record found for accession {0}")]
    RecordNotFound(String),

    /// No lineage exists for the requested taxid.
    #[error("no lineage found for taxid {0}")]
    LineageNotFound(Taxid),

    /// The provider could not be reached or gave an unusable response.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// A capability for fetching raw records and lineages from a provider.
///
/// Injected by the caller; the core depends only on this trait.
pub trait SourceDataClient {
    /// Fetches the raw records for the given versioned accessions.
    fn fetch_records(&self, accessions: &[String]) -> Result<Vec<RawRecord>, SourceError>;

    /// Fetches the taxonomy path for the given taxid.
    fn fetch_lineage(&self, taxid: Taxid) -> Result<TaxonomyPath, SourceError>;
}

/// The source fields of a raw provider record.
///
/// Each field is optional and may arrive empty; consumers must resolve them
/// through [`IsolateName::resolve`] rather than reading them directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSource {
    pub isolate: Option<String>,
    pub strain: Option<String>,
    pub clone: Option<String>,
}

/// One raw record as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// The versioned accession string, e.g. `AB123456.1`.
    pub accession: String,

    /// The record definition line.
    pub definition: String,

    /// The taxid the record is filed under.
    pub taxid: Taxid,

    /// The raw segment string, if the record names one.
    pub segment: Option<String>,

    /// The sequence length in bases.
    pub length: u64,

    /// The source table fields used for isolate naming.
    pub source: RawSource,
}

impl RawRecord {
    /// Derives the record's isolate name from its source fields.
    ///
    /// Returns `None` when no usable source field is present, which marks
    /// the record as belonging to an unnamed isolate.
    pub fn isolate_name(&self) -> Option<IsolateName> {
        IsolateName::resolve(
            self.source.isolate.as_deref(),
            self.source.strain.as_deref(),
            self.source.clone.as_deref(),
        )
    }
}

/// One taxon on a taxonomy path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    /// The taxon's id.
    pub id: Taxid,

    /// The taxon's scientific name.
    pub name: String,

    /// The taxon's rank, e.g. "species".
    pub rank: String,
}

/// A taxonomy path from the highest fetched rank down to the target taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyPath {
    /// The taxa on the path, most general first.
    pub taxa: Vec<Taxon>,
}

impl TaxonomyPath {
    /// The species-level taxon, if the path carries one.
    pub fn species(&self) -> Option<&Taxon> {
        self.taxa.iter().find(|taxon| taxon.rank == "species")
    }

    /// The most specific taxon on the path.
    pub fn target(&self) -> Option<&Taxon> {
        self.taxa.last()
    }
}
