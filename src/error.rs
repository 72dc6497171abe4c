//! The top-level error for repository operations.

use thiserror::Error;

use crate::lock::LockError;
use crate::persistence::snapshot::SnapshotError;
use crate::persistence::store::StoreError;
use crate::plan::PlanMismatchError;
use crate::state::apply::ApplyError;
use crate::state::builder::BuildError;
use crate::types::ids::{OtuId, Taxid};

/// Everything a repository operation can fail with.
///
/// Module errors are composed unchanged: nothing is retried or resolved
/// inside the core. Lock timeouts and append conflicts are recoverable by
/// retrying with refreshed state; duplicate and mismatch errors indicate
/// caller logic or bad external data and should not be retried blindly.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Lock acquisition or lock-discipline failure.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Event store failure, including append conflicts and log corruption.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Snapshot persistence failure.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Unit rebuild failure, including unknown units.
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// A staged event would produce invalid unit state.
    #[error("validation error: {0}")]
    Apply(#[from] ApplyError),

    /// Contents do not conform to a plan.
    #[error("plan error: {0}")]
    Plan(#[from] PlanMismatchError),

    /// The taxid is already bound to a unit.
    ///
    /// Taxid bindings are permanent; reconciling provider-side taxid merges
    /// is a caller concern.
    #[error("taxid {taxid} is already bound to unit {otu_id}")]
    DuplicateTaxid { taxid: Taxid, otu_id: OtuId },

    /// No unit is bound to the requested taxid.
    #[error("taxid {0} is not bound to any unit")]
    UnknownTaxid(Taxid),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;
