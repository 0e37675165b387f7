//! A single journal: metadata plus a lazily loaded run table.

use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::cache::CacheCoordinator;
use crate::document::IndexEntry;
use crate::error::Result;
use crate::ranges::RunRangeSet;
use crate::source::Location;
use crate::types::{JournalSummary, RunTable};

/// One index entry and, once loaded, its runs.
///
/// The run table is only ever replaced wholesale through [`Journal::install`],
/// which recomputes the coverage ranges in the same critical section. Loads
/// are serialized per journal by `load_lane`, so request threads and the
/// background worker never race on the same table.
#[derive(Debug)]
pub struct Journal {
    display_name: String,
    data_directory: String,
    location: Location,
    state: RwLock<JournalState>,
    load_lane: Mutex<()>,
}

#[derive(Debug, Default)]
struct JournalState {
    /// `None` until the first load.
    run_table: Option<Arc<RunTable>>,
    ranges: RunRangeSet,
    last_modified: Option<DateTime<Utc>>,
}

impl Journal {
    /// Creates an unloaded journal whose document lives in `directory`.
    pub fn new(entry: IndexEntry, directory: impl Into<String>) -> Self {
        Self {
            display_name: entry.display_name,
            data_directory: entry.data_directory,
            location: Location::new(directory, entry.filename),
            state: RwLock::new(JournalState::default()),
            load_lane: Mutex::new(()),
        }
    }

    pub fn filename(&self) -> &str {
        &self.location.filename
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn data_directory(&self) -> &str {
        &self.data_directory
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn entry(&self) -> IndexEntry {
        IndexEntry {
            filename: self.filename().to_string(),
            display_name: self.display_name.clone(),
            data_directory: self.data_directory.clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().run_table.is_some()
    }

    pub fn run_table(&self) -> Option<Arc<RunTable>> {
        self.state.read().run_table.clone()
    }

    pub fn ranges(&self) -> RunRangeSet {
        self.state.read().ranges.clone()
    }

    pub fn first_run(&self) -> Option<i64> {
        self.state.read().ranges.first_run()
    }

    pub fn last_run(&self) -> Option<i64> {
        self.state.read().ranges.last_run()
    }

    pub fn contains_run(&self, run_number: i64) -> bool {
        self.state.read().ranges.contains(run_number)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_modified
    }

    /// All runs with a run number strictly greater than `run_number`.
    pub fn runs_after(&self, run_number: i64) -> RunTable {
        let state = self.state.read();
        match &state.run_table {
            Some(table) => table
                .range((Bound::Excluded(run_number), Bound::Unbounded))
                .map(|(run, record)| (*run, record.clone()))
                .collect(),
            None => RunTable::new(),
        }
    }

    pub fn summary(&self) -> JournalSummary {
        let state = self.state.read();
        JournalSummary {
            filename: self.filename().to_string(),
            display_name: self.display_name.clone(),
            data_directory: self.data_directory.clone(),
            loaded: state.run_table.is_some(),
            first_run: state.ranges.first_run(),
            last_run: state.ranges.last_run(),
            last_modified: state.last_modified,
        }
    }

    /// Replaces the run table and recomputes coverage.
    pub(crate) fn install(
        &self,
        table: RunTable,
        modified: Option<DateTime<Utc>>,
    ) -> Arc<RunTable> {
        let ranges = RunRangeSet::from_runs(table.keys().copied());
        let table = Arc::new(table);
        let mut state = self.state.write();
        state.run_table = Some(table.clone());
        state.ranges = ranges;
        state.last_modified = modified;
        table
    }

    /// Serializes loads of this journal.
    pub(crate) fn lock_load(&self) -> MutexGuard<'_, ()> {
        self.load_lane.lock()
    }

    /// Loads the run table, from a trusted cached copy unless `force`.
    pub fn load(&self, cache: &CacheCoordinator, force: bool) -> Result<()> {
        cache.get_run_data(self, force).map(|_| ())
    }

    /// Loads the run table unless it is already present.
    pub fn ensure_loaded(&self, cache: &CacheCoordinator) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let _lane = self.lock_load();
        if self.is_loaded() {
            return Ok(());
        }
        cache.get_run_data_locked(self, false).map(|_| ())
    }

    /// Whether the loaded table still matches the origin.
    pub fn is_fresh(&self, cache: &CacheCoordinator) -> Result<bool> {
        cache.is_fresh(self)
    }
}
