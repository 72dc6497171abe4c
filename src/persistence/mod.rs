//! Persistence layer: the append-only event log and derived snapshots.
//!
//! # File layout
//!
//! ```text
//! <repo>/
//!   LOCK                    # exclusive-writer lock file
//!   events/<otu_id>.log     # one append-only JSON Lines partition per unit
//!   snapshots/<otu_id>.json # derived state cache, safe to delete
//! ```
//!
//! # Crash safety
//!
//! - Event log: a torn trailing line is detected and truncated on open, so
//!   an append either fully lands or leaves no trace.
//! - Snapshots: written atomically via write-to-temp-then-rename; readers
//!   see either the old or the new file.
//! - Durable writes fsync both the file and, for newly created files, the
//!   containing directory.

pub mod event;
pub mod snapshot;
pub mod store;

pub use event::{Event, EventPayload, EventQuery};
pub use snapshot::{
    load_snapshot, save_snapshot_atomic, snapshot_path, try_load_snapshot, OtuSnapshot,
    SnapshotError, SCHEMA_VERSION,
};
pub use store::{EventIter, EventStore, StoreError};
