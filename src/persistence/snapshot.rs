//! Per-unit snapshots of materialized state.
//!
//! A snapshot caches the result of replaying a unit's events up to a given
//! event id, so a rebuild can seed from it and replay only the tail. It is
//! purely derived data: safe to delete at any time, and never required for
//! correctness.
//!
//! # Atomic writes
//!
//! Snapshots are written with the write-to-temp-then-rename pattern:
//! 1. Write to `<otu_id>.json.tmp`
//! 2. fsync the file
//! 3. Rename to `<otu_id>.json`
//! 4. fsync the directory
//!
//! A reader always sees either the old or the new snapshot, never a partial
//! write.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::fsync_dir;
use crate::types::ids::{EventId, OtuId};
use crate::types::otu::Otu;

/// Current snapshot schema version. Increment on breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("snapshot schema mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// A persisted materialization of one unit at a given event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtuSnapshot {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// The unit this snapshot materializes.
    pub otu_id: OtuId,

    /// The id of the last event applied to `state`.
    pub at_event: EventId,

    /// When the snapshot was taken (UTC).
    pub taken_at: DateTime<Utc>,

    /// The materialized unit state.
    pub state: Otu,
}

impl OtuSnapshot {
    /// Creates a snapshot of `state` as of `at_event`.
    pub fn new(state: Otu, at_event: EventId) -> Self {
        OtuSnapshot {
            schema_version: SCHEMA_VERSION,
            otu_id: state.id,
            at_event,
            taken_at: Utc::now(),
            state,
        }
    }
}

/// The path of a unit's snapshot file under `dir`.
pub fn snapshot_path(dir: &Path, otu_id: OtuId) -> PathBuf {
    dir.join(format!("{}.json", otu_id))
}

/// Saves a snapshot atomically under `dir`.
pub fn save_snapshot_atomic(dir: &Path, snapshot: &OtuSnapshot) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    std::fs::create_dir_all(dir)?;

    let path = snapshot_path(dir, snapshot.otu_id);
    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, &path)?;
    fsync_dir(dir)?;

    Ok(())
}

/// Loads a unit's snapshot from `dir`.
pub fn load_snapshot(dir: &Path, otu_id: OtuId) -> Result<OtuSnapshot> {
    let bytes = std::fs::read(snapshot_path(dir, otu_id))?;
    let snapshot: OtuSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Loads a unit's snapshot, mapping a missing file to `None`.
///
/// Other errors (malformed JSON, schema mismatch) are propagated; the caller
/// decides whether to fall back to a full replay.
pub fn try_load_snapshot(dir: &Path, otu_id: OtuId) -> Result<Option<OtuSnapshot>> {
    match load_snapshot(dir, otu_id) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Deletes a unit's snapshot if it exists.
pub fn delete_snapshot(dir: &Path, otu_id: OtuId) -> Result<()> {
    match std::fs::remove_file(snapshot_path(dir, otu_id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_otu;
    use proptest::prelude::*;
    use tempfile::tempdir;

    proptest! {
        /// Atomic save and load roundtrip preserves all data.
        #[test]
        fn save_load_roundtrip(state in arb_otu(), at in 0u64..1000) {
            let dir = tempdir().unwrap();
            let snapshot = OtuSnapshot::new(state, EventId(at));

            save_snapshot_atomic(dir.path(), &snapshot).unwrap();
            let loaded = load_snapshot(dir.path(), snapshot.otu_id).unwrap();

            prop_assert_eq!(snapshot, loaded);
        }

        /// Temp file is cleaned up after a successful save.
        #[test]
        fn temp_file_cleaned_up(state in arb_otu()) {
            let dir = tempdir().unwrap();
            let snapshot = OtuSnapshot::new(state, EventId(0));
            let tmp_path = snapshot_path(dir.path(), snapshot.otu_id).with_extension("json.tmp");

            save_snapshot_atomic(dir.path(), &snapshot).unwrap();

            prop_assert!(snapshot_path(dir.path(), snapshot.otu_id).exists());
            prop_assert!(!tmp_path.exists());
        }
    }

    #[test]
    fn try_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let result = try_load_snapshot(dir.path(), OtuId::new()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempdir().unwrap();
        let otu_id = OtuId::new();
        std::fs::write(snapshot_path(dir.path(), otu_id), "not valid json").unwrap();

        let result = load_snapshot(dir.path(), otu_id);
        assert!(matches!(result, Err(SnapshotError::Json(_))));
    }

    #[test]
    fn load_wrong_schema_version_returns_error() {
        let dir = tempdir().unwrap();
        let otu = crate::test_utils::minimal_otu();
        let otu_id = otu.id;

        let mut snapshot = OtuSnapshot::new(otu, EventId(0));
        snapshot.schema_version = SCHEMA_VERSION + 1;

        let json = serde_json::to_string(&snapshot).unwrap();
        std::fs::write(snapshot_path(dir.path(), otu_id), json).unwrap();

        let result = load_snapshot(dir.path(), otu_id);
        assert!(matches!(
            result,
            Err(SnapshotError::SchemaMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let otu_id = OtuId::new();

        delete_snapshot(dir.path(), otu_id).unwrap();

        let snapshot = OtuSnapshot::new(crate::test_utils::minimal_otu(), EventId(0));
        save_snapshot_atomic(dir.path(), &snapshot).unwrap();

        delete_snapshot(dir.path(), snapshot.otu_id).unwrap();
        delete_snapshot(dir.path(), snapshot.otu_id).unwrap();
        assert!(!snapshot_path(dir.path(), snapshot.otu_id).exists());
    }
}
