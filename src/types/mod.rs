//! Domain types for the reference repository.

pub mod accession;
pub mod ids;
pub mod isolate;
pub mod otu;
pub mod sequence;

pub use accession::{accession_key, Accession, AccessionParseError};
pub use ids::{EventId, IsolateId, OtuId, SequenceId, Taxid};
pub use isolate::{Isolate, IsolateName, IsolateNameKind};
pub use otu::Otu;
pub use sequence::Sequence;
