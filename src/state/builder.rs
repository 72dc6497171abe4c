//! Aggregate rebuild by replay.
//!
//! The builder turns a unit's ordered event sequence into its current state.
//! It seeds from the latest usable snapshot when one exists and replays only
//! the tail; replaying from a snapshot plus its tail always equals replaying
//! the full log from the beginning.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::apply::{apply, ApplyError};
use crate::persistence::snapshot::{try_load_snapshot, OtuSnapshot};
use crate::persistence::store::{EventStore, StoreError};
use crate::types::ids::{EventId, OtuId};
use crate::types::otu::Otu;

/// Errors that can occur while rebuilding a unit.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The unit has no events in the store.
    #[error("unit {0} not found")]
    NotFound(OtuId),

    /// The event log could not be read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An event could not be applied during replay.
    ///
    /// Replay applies exactly what validation admitted at write time, so
    /// this indicates the log and the apply rules have diverged. Treat it
    /// like corruption, not a caller error.
    #[error("replay error: {0}")]
    Apply(#[from] ApplyError),
}

/// Rebuilds unit state from the event log, seeded by snapshots.
pub struct AggregateBuilder<'a> {
    store: &'a EventStore,
    snapshot_dir: &'a Path,
}

impl<'a> AggregateBuilder<'a> {
    /// Creates a builder over the given store and snapshot directory.
    pub fn new(store: &'a EventStore, snapshot_dir: &'a Path) -> Self {
        AggregateBuilder {
            store,
            snapshot_dir,
        }
    }

    /// Materializes the current state of a unit.
    ///
    /// Seeds from the latest snapshot when it is usable, otherwise replays
    /// the full log. Requires no lock: committed events are immutable, so a
    /// concurrent writer can only extend the log past the prefix read here.
    pub fn build(&self, otu_id: OtuId) -> Result<Otu, BuildError> {
        let head = self
            .store
            .head(otu_id)
            .ok_or(BuildError::NotFound(otu_id))?;

        let (mut state, from) = match self.load_seed(otu_id, head) {
            Some(snapshot) => {
                let from = snapshot.at_event.next();
                (Some(snapshot.state), from)
            }
            None => (None, EventId(0)),
        };

        let mut applied = 0u64;
        for event in self.store.events(otu_id, from) {
            let event = event?;
            state = Some(apply(state, &event.payload)?);
            applied += 1;
        }

        debug!(%otu_id, events_replayed = applied, "materialized unit");

        state.ok_or(BuildError::NotFound(otu_id))
    }

    /// Materializes a unit by full replay, ignoring any snapshot.
    pub fn build_from_log(&self, otu_id: OtuId) -> Result<Otu, BuildError> {
        if self.store.head(otu_id).is_none() {
            return Err(BuildError::NotFound(otu_id));
        }

        let mut state: Option<Otu> = None;
        for event in self.store.events(otu_id, EventId(0)) {
            let event = event?;
            state = Some(apply(state, &event.payload)?);
        }

        state.ok_or(BuildError::NotFound(otu_id))
    }

    /// Loads the unit's snapshot if it can seed this rebuild.
    ///
    /// Snapshots are derived data: one that is missing, unreadable,
    /// schema-mismatched, or ahead of the partition head is ignored with a
    /// warning rather than failing the rebuild.
    fn load_seed(&self, otu_id: OtuId, head: EventId) -> Option<OtuSnapshot> {
        match try_load_snapshot(self.snapshot_dir, otu_id) {
            Ok(Some(snapshot)) if snapshot.at_event <= head => Some(snapshot),
            Ok(Some(snapshot)) => {
                warn!(
                    %otu_id,
                    at_event = %snapshot.at_event,
                    %head,
                    "snapshot is ahead of the event log; rebuilding from scratch"
                );
                None
            }
            Ok(None) => None,
            Err(error) => {
                warn!(%otu_id, %error, "unusable snapshot; rebuilding from scratch");
                None
            }
        }
    }

    /// The snapshot directory this builder reads from.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir.to_path_buf()
    }
}
