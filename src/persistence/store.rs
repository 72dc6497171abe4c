//! Append-only event store, partitioned per taxonomic unit.
//!
//! Each unit owns one JSON Lines log file at `<events_dir>/<otu_id>.log`.
//! Complete lines are always valid JSON; a partial line left by a crash
//! mid-write is detected and truncated the next time the store is opened, so
//! an append either fully lands or leaves no trace.
//!
//! Event ids are assigned from a single store-wide counter, so ordering by id
//! is meaningful across partitions. Within a partition, ids are strictly
//! increasing; a non-monotonic id or an unparseable complete line is
//! corruption and is fatal to that unit's rebuild, never skipped.
//!
//! # Durability
//!
//! Every append fsyncs the log file before returning, and the directory is
//! fsynced when a partition file is first created. After the fsync, the
//! written line is read back and verified.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use super::event::{Event, EventPayload, EventQuery};
use crate::types::ids::{EventId, OtuId};

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The event's query selector does not match the unit's observed head.
    ///
    /// The writer prepared its event against stale state. Recoverable: the
    /// caller may rebuild the unit and retry with a fresh selector.
    #[error("stale head for unit {otu_id}: expected {expected:?}, found {actual:?}")]
    Conflict {
        otu_id: OtuId,
        expected: Option<EventId>,
        actual: Option<EventId>,
    },

    /// The log contains a record that cannot be trusted.
    ///
    /// Fatal to the affected unit's rebuild. Not recoverable by retry.
    #[error("corrupt event log {}: {}", .path.display(), .detail)]
    Corruption { path: PathBuf, detail: String },
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy)]
struct PartitionState {
    /// The id of the last valid event, `None` for an empty partition file.
    head: Option<EventId>,

    /// Set when the scan at open found an untrustworthy record. Appends to a
    /// corrupt partition are refused.
    corrupt: bool,
}

/// An append-only, per-unit-partitioned event log.
pub struct EventStore {
    dir: PathBuf,
    partitions: HashMap<OtuId, PartitionState>,
    next_id: u64,
}

impl EventStore {
    /// Opens the store rooted at `dir`, creating the directory if needed.
    ///
    /// Every partition is scanned: torn tails from interrupted appends are
    /// truncated, per-partition heads are recorded, and the store-wide next
    /// event id is derived from the highest id seen. Partitions with
    /// mid-log corruption are registered but refuse appends; reading them
    /// surfaces [`StoreError::Corruption`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut partitions = HashMap::new();
        let mut max_id: Option<u64> = None;

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();

            let Some(otu_id) = partition_otu_id(&path) else {
                continue;
            };

            let state = recover_partition(&path)?;

            if let Some(head) = state.head {
                max_id = Some(max_id.map_or(head.0, |m| m.max(head.0)));
            }

            partitions.insert(otu_id, state);
        }

        Ok(EventStore {
            dir,
            partitions,
            next_id: max_id.map_or(0, |m| m + 1),
        })
    }

    /// The units that have a partition with at least one event.
    pub fn partition_ids(&self) -> Vec<OtuId> {
        let mut ids: Vec<OtuId> = self
            .partitions
            .iter()
            .filter(|(_, state)| state.head.is_some())
            .map(|(otu_id, _)| *otu_id)
            .collect();
        ids.sort();
        ids
    }

    /// The head event id of a unit's partition, or `None` if the unit has no
    /// events.
    pub fn head(&self, otu_id: OtuId) -> Option<EventId> {
        self.partitions.get(&otu_id).and_then(|state| state.head)
    }

    /// The id that will be assigned to the next appended event.
    pub fn next_id(&self) -> EventId {
        EventId(self.next_id)
    }

    /// Durably appends one event to the target unit's partition.
    ///
    /// The event is assigned the next store-wide id and the current
    /// timestamp. Fails with [`StoreError::Conflict`] when `query.parent`
    /// does not match the partition's observed head, and with
    /// [`StoreError::Corruption`] when the written line cannot be read back
    /// intact.
    pub fn append(&mut self, query: EventQuery, payload: EventPayload) -> Result<Event> {
        let otu_id = query.otu_id;
        let state = self.partitions.get(&otu_id).copied();

        if let Some(state) = state {
            if state.corrupt {
                return Err(StoreError::Corruption {
                    path: self.partition_path(otu_id),
                    detail: "partition is corrupt; refusing append".to_string(),
                });
            }
        }

        let actual = state.and_then(|s| s.head);

        if query.parent != actual {
            return Err(StoreError::Conflict {
                otu_id,
                expected: query.parent,
                actual,
            });
        }

        let event = Event {
            id: EventId(self.next_id),
            timestamp: Utc::now(),
            query,
            payload,
        };

        let path = self.partition_path(otu_id);
        let is_new_partition = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let offset = file.metadata()?.len();

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        io::Write::write_all(&mut file, &line)?;
        file.sync_all()?;

        if is_new_partition {
            fsync_dir(&self.dir)?;
        }

        self.verify_written(&path, offset, event.id)?;

        self.partitions.insert(
            otu_id,
            PartitionState {
                head: Some(event.id),
                corrupt: false,
            },
        );
        self.next_id += 1;

        Ok(event)
    }

    /// Lazily iterates a unit's events with `id >= from`, in strictly
    /// increasing id order.
    ///
    /// A missing partition yields no events. A complete record that fails to
    /// parse, or a non-monotonic id, yields [`StoreError::Corruption`] and
    /// ends the iteration; a final unterminated line is an in-flight append
    /// and is not yielded.
    pub fn events(&self, otu_id: OtuId, from: EventId) -> EventIter {
        EventIter::open(self.partition_path(otu_id), from)
    }

    /// The path of a unit's partition file.
    pub fn partition_path(&self, otu_id: OtuId) -> PathBuf {
        self.dir.join(format!("{}.log", otu_id))
    }

    /// Reads back the line written at `offset` and checks its event id.
    fn verify_written(&self, path: &Path, offset: u64, expected: EventId) -> Result<()> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        let mut line = String::new();
        reader.read_line(&mut line)?;

        let written: Event =
            serde_json::from_str(line.trim()).map_err(|e| StoreError::Corruption {
                path: path.to_path_buf(),
                detail: format!("written record did not read back: {e}"),
            })?;

        if written.id != expected {
            return Err(StoreError::Corruption {
                path: path.to_path_buf(),
                detail: format!(
                    "written record read back with id {}, expected {}",
                    written.id, expected
                ),
            });
        }

        Ok(())
    }
}

/// Extracts the unit id from a partition file name (`<uuid>.log`).
fn partition_otu_id(path: &Path) -> Option<OtuId> {
    if path.extension()? != "log" {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    stem.parse().ok().map(OtuId)
}

/// Scans a partition, truncating any torn tail left by a crash.
///
/// A trailing line without a terminating newline is torn regardless of
/// whether it happens to parse: the append that wrote it never completed.
/// Terminated lines that fail to parse, and non-monotonic ids, mark the
/// partition corrupt; the valid prefix before the damage still determines
/// the head so the store can report a consistent state.
fn recover_partition(path: &Path) -> Result<PartitionState> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut head: Option<EventId> = None;
    let mut last_valid_pos: u64 = 0;
    let mut current_pos: u64 = 0;
    let mut corrupt = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;

        if bytes_read == 0 {
            break;
        }

        current_pos += bytes_read as u64;
        let terminated = line.ends_with('\n');

        let trimmed = line.trim();
        if trimmed.is_empty() {
            last_valid_pos = current_pos;
            continue;
        }

        if !terminated {
            // Torn tail from an interrupted append. Drop it below.
            break;
        }

        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => {
                if head.is_some_and(|prev| event.id <= prev) {
                    warn!(
                        path = %path.display(),
                        id = %event.id,
                        "non-monotonic event id; marking partition corrupt"
                    );
                    corrupt = true;
                    break;
                }
                head = Some(event.id);
                last_valid_pos = current_pos;
            }
            Err(error) => {
                warn!(
                    path = %path.display(),
                    %error,
                    "unparseable complete record; marking partition corrupt"
                );
                corrupt = true;
                break;
            }
        }
    }

    if !corrupt && last_valid_pos < file_len {
        warn!(
            path = %path.display(),
            from = file_len,
            to = last_valid_pos,
            "truncating torn tail left by interrupted append"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(last_valid_pos)?;
        file.sync_all()?;
    }

    Ok(PartitionState { head, corrupt })
}

/// Syncs a directory so entries for newly created files survive a crash.
pub(crate) fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir)?;
    dir.sync_all()
}

/// Lazy iterator over one partition's events.
///
/// Restartable from any prior id by constructing a new iterator with a
/// higher `from`.
pub struct EventIter {
    reader: Option<BufReader<File>>,
    open_error: Option<io::Error>,
    path: PathBuf,
    from: EventId,
    last_id: Option<EventId>,
}

impl EventIter {
    fn open(path: PathBuf, from: EventId) -> Self {
        let (reader, open_error) = match File::open(&path) {
            Ok(file) => (Some(BufReader::new(file)), None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (None, None),
            Err(e) => (None, Some(e)),
        };

        EventIter {
            reader,
            open_error,
            path,
            from,
            last_id: None,
        }
    }

    fn corruption(&mut self, detail: String) -> StoreError {
        self.reader = None;
        StoreError::Corruption {
            path: self.path.clone(),
            detail,
        }
    }
}

impl Iterator for EventIter {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.open_error.take() {
            return Some(Err(e.into()));
        }

        loop {
            let reader = self.reader.as_mut()?;

            let mut line = String::new();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(n) => n,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e.into()));
                }
            };

            if bytes_read == 0 {
                self.reader = None;
                return None;
            }

            let terminated = line.ends_with('\n');
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }

            if !terminated {
                // In-flight append; everything before it is a consistent
                // prefix of history.
                self.reader = None;
                return None;
            }

            match serde_json::from_str::<Event>(trimmed) {
                Ok(event) => {
                    if self.last_id.is_some_and(|prev| event.id <= prev) {
                        return Some(Err(self.corruption(format!(
                            "non-monotonic event id {} after {}",
                            event.id,
                            self.last_id.map(|id| id.to_string()).unwrap_or_default()
                        ))));
                    }
                    self.last_id = Some(event.id);

                    if event.id < self.from {
                        continue;
                    }

                    return Some(Ok(event));
                }
                Err(e) => {
                    return Some(Err(self.corruption(format!("unparseable event record: {e}"))));
                }
            }
        }
    }
}
