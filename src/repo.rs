//! The event-sourced reference repository.
//!
//! `Repository` composes the event store, the snapshot cache, the aggregate
//! builder, the plan validator and the directory lock into the public API.
//! Every mutation follows the same shape: require the lock, materialize the
//! unit, validate the staged events against an in-memory copy, and only then
//! append. A rejected operation leaves zero events behind.
//!
//! Reads never take the lock. Committed events are immutable, so a reader
//! always sees a consistent prefix of history even while a writer appends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{RepoError, Result};
use crate::lock::{LockGuard, RepoLock};
use crate::persistence::event::{EventPayload, EventQuery};
use crate::persistence::snapshot::{save_snapshot_atomic, OtuSnapshot};
use crate::persistence::store::EventStore;
use crate::plan::{Plan, SegmentName};
use crate::state::apply::apply;
use crate::state::builder::AggregateBuilder;
use crate::types::accession::{accession_key, Accession};
use crate::types::ids::{EventId, IsolateId, OtuId, SequenceId, Taxid};
use crate::types::isolate::{Isolate, IsolateName};
use crate::types::otu::Otu;

/// Tuning knobs for a repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// How long a writer waits for the directory lock.
    pub lock_timeout: Duration,

    /// Refresh a unit's snapshot after this many appended events.
    /// Zero disables snapshot refresh.
    pub snapshot_interval: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            lock_timeout: Duration::from_secs(5),
            snapshot_interval: 16,
        }
    }
}

/// A sequence to attach as part of an isolate addition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSequence {
    /// The versioned accession of the record.
    pub accession: Accession,

    /// The plan segment the record is assigned to, if any.
    pub segment: Option<SegmentName>,

    /// The record length in bases.
    pub length: u64,
}

struct Inner {
    store: EventStore,
    taxids: HashMap<Taxid, OtuId>,
    pending_snapshot: HashMap<OtuId, u64>,
}

/// An event-sourced repository of curated taxonomic units.
pub struct Repository {
    root: PathBuf,
    snapshots: PathBuf,
    config: RepositoryConfig,
    lock: RepoLock,
    inner: Mutex<Inner>,
}

impl Repository {
    /// Opens the repository rooted at `path`, creating the layout if needed.
    ///
    /// Scans every unit partition to recover torn tails and rebuild the
    /// taxid index from each partition's creation event.
    pub fn open(path: impl AsRef<Path>, config: RepositoryConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let events_dir = root.join("events");
        let snapshots = root.join("snapshots");

        std::fs::create_dir_all(&root).map_err(crate::persistence::store::StoreError::from)?;
        std::fs::create_dir_all(&snapshots)
            .map_err(crate::persistence::store::StoreError::from)?;

        let store = EventStore::open(&events_dir)?;

        let mut taxids = HashMap::new();
        for otu_id in store.partition_ids() {
            match store.events(otu_id, EventId(0)).next() {
                Some(Ok(event)) => match event.payload {
                    EventPayload::CreateOtu { taxid, .. } => {
                        taxids.insert(taxid, otu_id);
                    }
                    other => {
                        warn!(
                            %otu_id,
                            kind = other.kind(),
                            "partition does not start with a creation event; not indexing"
                        );
                    }
                },
                Some(Err(error)) => {
                    warn!(%otu_id, %error, "partition is unreadable; not indexing");
                }
                None => {}
            }
        }

        info!(
            path = %root.display(),
            units = taxids.len(),
            next_event = %store.next_id(),
            "opened repository"
        );

        Ok(Repository {
            lock: RepoLock::new(&root),
            root,
            snapshots,
            config,
            inner: Mutex::new(Inner {
                store,
                taxids,
                pending_snapshot: HashMap::new(),
            }),
        })
    }

    /// The repository root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Acquires the exclusive writer lock.
    ///
    /// Blocks up to the configured timeout. All mutating operations fail
    /// with [`crate::lock::LockError::Required`] unless called while the
    /// returned guard is live; the guard releases on every exit path.
    pub fn lock(&self) -> Result<LockGuard<'_>> {
        Ok(self.lock.acquire(self.config.lock_timeout)?)
    }

    /// Creates a new taxonomic unit.
    ///
    /// Fails with [`RepoError::DuplicateTaxid`] if the taxid is already
    /// bound; taxid bindings are permanent.
    pub fn create_otu(
        &self,
        taxid: Taxid,
        name: impl Into<String>,
        acronym: impl Into<String>,
        plan: Plan,
    ) -> Result<Otu> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        if let Some(&otu_id) = inner.taxids.get(&taxid) {
            return Err(RepoError::DuplicateTaxid { taxid, otu_id });
        }

        let otu_id = OtuId::new();
        let payload = EventPayload::CreateOtu {
            otu_id,
            taxid,
            name: name.into(),
            acronym: acronym.into(),
            plan,
        };

        // Applying to empty state validates the payload and yields the
        // value to return, so the unit is not rebuilt from disk.
        let otu = apply(None, &payload)?;

        let query = EventQuery {
            otu_id,
            parent: inner.store.head(otu_id),
        };
        inner.store.append(query, payload)?;
        inner.taxids.insert(taxid, otu_id);

        self.note_appended(&mut inner, otu_id, 1);

        info!(%otu_id, %taxid, name = %otu.name, "created unit");

        Ok(otu)
    }

    /// Materializes the current state of a unit. Requires no lock.
    pub fn get_otu(&self, otu_id: OtuId) -> Result<Otu> {
        let inner = self.inner.lock();
        let builder = AggregateBuilder::new(&inner.store, &self.snapshots);
        Ok(builder.build(otu_id)?)
    }

    /// Materializes the unit bound to a taxid. Requires no lock.
    pub fn get_otu_by_taxid(&self, taxid: Taxid) -> Result<Otu> {
        let inner = self.inner.lock();

        let otu_id = *inner
            .taxids
            .get(&taxid)
            .ok_or(RepoError::UnknownTaxid(taxid))?;

        let builder = AggregateBuilder::new(&inner.store, &self.snapshots);
        Ok(builder.build(otu_id)?)
    }

    /// The id of the unit bound to a taxid, if any. Requires no lock.
    pub fn get_otu_id_by_taxid(&self, taxid: Taxid) -> Option<OtuId> {
        self.inner.lock().taxids.get(&taxid).copied()
    }

    /// Ids of all units in the repository, in stable order. Requires no lock.
    pub fn otu_ids(&self) -> Vec<OtuId> {
        self.inner.lock().store.partition_ids()
    }

    /// Adds an isolate with its sequences to a unit, all-or-nothing.
    ///
    /// The whole batch, the isolate and every sequence, is validated
    /// against an in-memory copy of the unit and against the plan before
    /// any event is appended. On any failure, zero events are written.
    pub fn add_isolate(
        &self,
        otu_id: OtuId,
        name: Option<IsolateName>,
        sequences: Vec<NewSequence>,
    ) -> Result<Isolate> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        let current = AggregateBuilder::new(&inner.store, &self.snapshots).build(otu_id)?;

        let isolate_id = IsolateId::new();
        let mut payloads = vec![EventPayload::CreateIsolate {
            isolate_id,
            name: name.clone(),
        }];

        for sequence in &sequences {
            payloads.push(EventPayload::CreateSequence {
                isolate_id,
                sequence_id: SequenceId::new(),
                accession: sequence.accession.clone(),
                segment: sequence.segment.clone(),
                length: sequence.length,
            });
        }

        // Stage the whole batch in memory first.
        let mut staged = current;
        for payload in &payloads {
            staged = apply(Some(staged), payload)?;
        }

        let isolate = staged
            .get_isolate(isolate_id)
            .cloned()
            .ok_or(RepoError::Apply(
                crate::state::apply::ApplyError::UnknownIsolate { isolate_id },
            ))?;

        staged.plan.validate_isolate(&isolate.sequences)?;

        // Validation passed; commit the batch.
        let appended = payloads.len() as u64;
        let mut parent = inner.store.head(otu_id);
        for payload in payloads {
            let query = EventQuery { otu_id, parent };
            let event = inner.store.append(query, payload)?;
            parent = Some(event.id);
        }

        self.note_appended(&mut inner, otu_id, appended);

        info!(
            %otu_id,
            %isolate_id,
            name = name.as_ref().map(|n| n.to_string()).unwrap_or_default(),
            sequences = isolate.sequences.len(),
            "added isolate"
        );

        Ok(isolate)
    }

    /// Removes an isolate from a unit's materialized state.
    ///
    /// The event log keeps the isolate's full history.
    pub fn delete_isolate(
        &self,
        otu_id: OtuId,
        isolate_id: IsolateId,
        rationale: impl Into<String>,
    ) -> Result<()> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        let current = AggregateBuilder::new(&inner.store, &self.snapshots).build(otu_id)?;

        let payload = EventPayload::DeleteIsolate {
            isolate_id,
            rationale: rationale.into(),
        };
        apply(Some(current), &payload)?;

        let query = EventQuery {
            otu_id,
            parent: inner.store.head(otu_id),
        };
        inner.store.append(query, payload)?;

        self.note_appended(&mut inner, otu_id, 1);

        info!(%otu_id, %isolate_id, "deleted isolate");

        Ok(())
    }

    /// Adds accession keys to a unit's exclusion set.
    ///
    /// Idempotent: already-excluded keys are dropped from the request, and
    /// keys currently in use by the unit cannot be excluded and are dropped
    /// with a warning. If nothing remains, no event is appended and the
    /// call succeeds. Returns the unit's exclusion set after the call.
    ///
    /// Versioned inputs are reduced to their keys, so `"AB123456.1"` and
    /// `"AB123456"` exclude the same record line.
    pub fn exclude_accessions(
        &self,
        otu_id: OtuId,
        accessions: &[String],
    ) -> Result<std::collections::BTreeSet<String>> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        let current = AggregateBuilder::new(&inner.store, &self.snapshots).build(otu_id)?;

        let mut excludable: Vec<String> = Vec::new();
        let mut in_use: Vec<String> = Vec::new();

        for raw in accessions {
            let key = accession_key(raw).to_string();

            if current.contains_accession(&key) {
                in_use.push(key);
            } else if !current.is_excluded(&key) && !excludable.contains(&key) {
                excludable.push(key);
            }
        }

        if !in_use.is_empty() {
            warn!(
                %otu_id,
                accessions = ?in_use,
                "accessions currently in the unit cannot be excluded"
            );
        }

        if excludable.is_empty() {
            return Ok(current.excluded_accessions);
        }

        excludable.sort();

        let payload = EventPayload::ExcludeAccessions {
            accessions: excludable.clone(),
        };
        let updated = apply(Some(current), &payload)?;

        let query = EventQuery {
            otu_id,
            parent: inner.store.head(otu_id),
        };
        inner.store.append(query, payload)?;

        self.note_appended(&mut inner, otu_id, 1);

        info!(%otu_id, accessions = ?excludable, "excluded accessions");

        Ok(updated.excluded_accessions)
    }

    /// Removes accession keys from a unit's exclusion set.
    ///
    /// Idempotent: keys that are not excluded are dropped from the request.
    /// Returns the unit's exclusion set after the call.
    pub fn allow_accessions(
        &self,
        otu_id: OtuId,
        accessions: &[String],
    ) -> Result<std::collections::BTreeSet<String>> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        let current = AggregateBuilder::new(&inner.store, &self.snapshots).build(otu_id)?;

        let mut allowable: Vec<String> = Vec::new();
        for raw in accessions {
            let key = accession_key(raw).to_string();
            if current.is_excluded(&key) && !allowable.contains(&key) {
                allowable.push(key);
            }
        }

        if allowable.is_empty() {
            return Ok(current.excluded_accessions);
        }

        allowable.sort();

        let payload = EventPayload::AllowAccessions {
            accessions: allowable.clone(),
        };
        let updated = apply(Some(current), &payload)?;

        let query = EventQuery {
            otu_id,
            parent: inner.store.head(otu_id),
        };
        inner.store.append(query, payload)?;

        self.note_appended(&mut inner, otu_id, 1);

        info!(%otu_id, accessions = ?allowable, "allowed accessions");

        Ok(updated.excluded_accessions)
    }

    /// Replaces a unit's plan.
    ///
    /// Rejected if any existing isolate's contents would be invalid against
    /// the new plan.
    pub fn set_plan(&self, otu_id: OtuId, plan: Plan) -> Result<Plan> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        let current = AggregateBuilder::new(&inner.store, &self.snapshots).build(otu_id)?;

        let payload = EventPayload::SetPlan { plan };
        let updated = apply(Some(current), &payload)?;

        let query = EventQuery {
            otu_id,
            parent: inner.store.head(otu_id),
        };
        inner.store.append(query, payload)?;

        self.note_appended(&mut inner, otu_id, 1);

        info!(%otu_id, segments = updated.plan.segments().len(), "set plan");

        Ok(updated.plan)
    }

    /// Marks an isolate as the unit's representative.
    pub fn set_representative_isolate(
        &self,
        otu_id: OtuId,
        isolate_id: IsolateId,
    ) -> Result<()> {
        self.lock.ensure_held()?;
        let mut inner = self.inner.lock();

        let current = AggregateBuilder::new(&inner.store, &self.snapshots).build(otu_id)?;

        let payload = EventPayload::SetRepresentativeIsolate { isolate_id };
        apply(Some(current), &payload)?;

        let query = EventQuery {
            otu_id,
            parent: inner.store.head(otu_id),
        };
        inner.store.append(query, payload)?;

        self.note_appended(&mut inner, otu_id, 1);

        info!(%otu_id, %isolate_id, "set representative isolate");

        Ok(())
    }

    /// Tracks appended events and opportunistically refreshes snapshots.
    ///
    /// Best-effort: a failed refresh is logged and never fails the mutation
    /// that triggered it, since snapshots are purely derived.
    fn note_appended(&self, inner: &mut Inner, otu_id: OtuId, count: u64) {
        if self.config.snapshot_interval == 0 {
            return;
        }

        {
            let pending = inner.pending_snapshot.entry(otu_id).or_insert(0);
            *pending += count;

            if *pending < self.config.snapshot_interval {
                return;
            }

            *pending = 0;
        }

        let Some(head) = inner.store.head(otu_id) else {
            return;
        };

        let builder = AggregateBuilder::new(&inner.store, &self.snapshots);
        match builder.build(otu_id) {
            Ok(state) => {
                let snapshot = OtuSnapshot::new(state, head);
                if let Err(error) = save_snapshot_atomic(&self.snapshots, &snapshot) {
                    warn!(%otu_id, %error, "snapshot refresh failed");
                } else {
                    info!(%otu_id, at_event = %head, "refreshed snapshot");
                }
            }
            Err(error) => {
                warn!(%otu_id, %error, "could not rebuild unit for snapshot refresh");
            }
        }
    }
}
