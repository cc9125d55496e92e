//! The drop ledger: every scan ever recorded on this device, newest first

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::{
    domain::{
        drop::{DropEntry, DropId, TrackSnapshot},
        track::TrackCode,
    },
    storage::{error::StorageError, kv::KeyValueStore},
};

/// Key under which the ledger document is stored
pub const DROPS_KEY: &str = "@unheard_drops";

struct LedgerState {
    store: Box<dyn KeyValueStore>,
    entries: Vec<DropEntry>,
    last_id: i64,
    loaded: bool,
}

/// Ordered, persisted collection of drops.
///
/// All mutations go through one mutex and write the whole ledger back to the
/// store while holding it, so concurrent mutations cannot overwrite each other.
/// A failed write is logged and the in-memory ledger stays ahead of the store
/// until the next successful write.
pub struct DropLedger {
    state: Mutex<LedgerState>,
}

impl DropLedger {
    /// Creates a ledger that has not read its store yet
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                store,
                entries: Vec::new(),
                last_id: 0,
                loaded: false,
            }),
        }
    }

    /// Creates a ledger and loads it from the store
    pub fn open(store: Box<dyn KeyValueStore>) -> Self {
        let ledger = Self::new(store);
        ledger.load();
        ledger
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the in-memory ledger with the stored one.
    ///
    /// Missing or unreadable data yields an empty ledger.
    pub fn load(&self) -> Vec<DropEntry> {
        let mut state = self.lock();
        Self::load_locked(&mut state);
        state.entries.clone()
    }

    fn load_locked(state: &mut LedgerState) {
        state.entries = match Self::read(state.store.as_ref()) {
            Ok(entries) => {
                info!("loaded {} drops", entries.len());
                entries
            }
            Err(e) => {
                warn!("could not load drops, starting empty: {e}");
                Vec::new()
            }
        };
        state.last_id = state
            .entries
            .iter()
            .filter_map(|entry| entry.id.millis())
            .max()
            .unwrap_or(0);
        state.loaded = true;
    }

    fn read(store: &dyn KeyValueStore) -> Result<Vec<DropEntry>, StorageError> {
        match store.get(DROPS_KEY)? {
            Some(document) => Ok(serde_json::from_str(&document)?),
            None => Ok(Vec::new()),
        }
    }

    /// a mutation before the first `load` must not clobber stored drops
    fn ensure_loaded(state: &mut LedgerState) {
        if !state.loaded {
            debug!("ledger mutated before load, loading first");
            Self::load_locked(state);
        }
    }

    fn persist(state: &mut LedgerState) {
        let result = serde_json::to_string(&state.entries)
            .map_err(StorageError::from)
            .and_then(|document| state.store.set(DROPS_KEY, &document));

        match result {
            Ok(()) => info!("saved {} drops", state.entries.len()),
            Err(e) => error!("failed to save {} drops: {e}", state.entries.len()),
        }
    }

    /// Records a new drop at the head of the ledger.
    ///
    /// Missing metadata is replaced by placeholders; this never fails.
    pub fn append(&self, track_code: TrackCode, snapshot: Option<TrackSnapshot>) -> DropEntry {
        self.append_at(track_code, snapshot, Utc::now())
    }

    pub(crate) fn append_at(
        &self,
        track_code: TrackCode,
        snapshot: Option<TrackSnapshot>,
        scanned_at: DateTime<Utc>,
    ) -> DropEntry {
        let mut state = self.lock();
        Self::ensure_loaded(&mut state);

        let id = Self::next_id(&mut state, scanned_at);

        let entry = DropEntry::new(
            id,
            track_code,
            scanned_at,
            TrackSnapshot::or_placeholder(snapshot),
        );
        debug!("new drop {} for {}", entry.id, entry.track_code);

        state.entries.insert(0, entry.clone());
        Self::persist(&mut state);
        entry
    }

    /// Next id after `last_id`, or a suffixed one once numeric ids run out
    fn next_id(state: &mut LedgerState, scanned_at: DateTime<Utc>) -> DropId {
        let millis = scanned_at.timestamp_millis();
        if let Some(next) = state.last_id.checked_add(1) {
            state.last_id = millis.max(next);
            return DropId::from_millis(state.last_id);
        }

        warn!("drop ids exhausted at {}, using suffixed ids", state.last_id);
        let mut seq = state.entries.len();
        loop {
            let id = DropId(format!("{millis}-{seq}"));
            if state.entries.iter().all(|entry| entry.id != id) {
                return id;
            }
            seq += 1;
        }
    }

    /// Removes the drop with the given id, if there is one
    pub fn remove(&self, id: &DropId) {
        let mut state = self.lock();
        Self::ensure_loaded(&mut state);

        match state.entries.iter().position(|entry| &entry.id == id) {
            Some(index) => {
                state.entries.remove(index);
                debug!("removed drop {id}, {} left", state.entries.len());
            }
            None => debug!("drop {id} not in ledger"),
        }
        Self::persist(&mut state);
    }

    /// Forgets every drop, in memory and in the store
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.loaded = true;
        info!("clearing all drops");

        if let Err(e) = state.store.remove(DROPS_KEY) {
            error!("failed to delete stored drops: {e}");
        }
    }

    /// all drops, newest first
    pub fn entries(&self) -> Vec<DropEntry> {
        self.lock().entries.clone()
    }

    /// up to `limit` newest drops
    pub fn recent(&self, limit: usize) -> Vec<DropEntry> {
        self.lock().entries.iter().take(limit).cloned().collect()
    }

    pub fn get(&self, id: &DropId) -> Option<DropEntry> {
        self.lock().entries.iter().find(|e| &e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }
}
