//! One source's journals.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};

use crate::cache::{CacheCoordinator, Origin};
use crate::document::{parse_index_document, EntryDefaults, IndexEntry};
use crate::error::{JournalError, Result};
use crate::journal::Journal;
use crate::query::{QueryEngine, SearchRequest};
use crate::source::{Location, Source, SourceKey};
use crate::types::{JournalSummary, SearchHit};

/// Blob store name of a generated source's persisted journal list.
pub const GENERATED_INDEX_NAME: &str = "journal_main.generated";

/// Index document conventions for archive sources.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub index_document: String,
    pub sentinel: String,
    pub archive_data_root: String,
}

/// Ordered journals of one source, addressable by filename.
///
/// For archive sources the order is the index document's order, which is
/// assumed chronological (run numbers grow with position). Journals are
/// only ever appended; a refresh never drops or resets one.
#[derive(Debug)]
pub struct JournalIndex {
    source: Source,
    key: SourceKey,
    cache: CacheCoordinator,
    settings: IndexSettings,
    state: RwLock<IndexState>,
    refresh_lane: Mutex<()>,
}

#[derive(Debug, Default)]
struct IndexState {
    journals: Vec<Arc<Journal>>,
    by_filename: FnvHashMap<String, usize>,
    last_modified: Option<DateTime<Utc>>,
}

impl JournalIndex {
    pub fn new(source: Source, cache: CacheCoordinator, settings: IndexSettings) -> Self {
        Self {
            key: source.key(),
            source,
            cache,
            settings,
            state: RwLock::new(IndexState::default()),
            refresh_lane: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    pub fn is_chronological(&self) -> bool {
        self.source.is_chronological()
    }

    pub fn len(&self) -> usize {
        self.state.read().journals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().journals.is_empty()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_modified
    }

    /// Snapshot of the journals in index order.
    pub fn journals(&self) -> Vec<Arc<Journal>> {
        self.state.read().journals.clone()
    }

    pub fn journal(&self, filename: &str) -> Option<Arc<Journal>> {
        let state = self.state.read();
        state
            .by_filename
            .get(filename)
            .map(|position| state.journals[*position].clone())
    }

    pub fn summaries(&self) -> Vec<JournalSummary> {
        self.journals()
            .iter()
            .map(|journal| journal.summary())
            .collect()
    }

    /// Location of the archive's index document.
    pub fn index_location(&self) -> Location {
        Location::new(
            self.source.journal_directory(),
            self.settings.index_document.clone(),
        )
    }

    /// Adds unloaded journals for entries not yet tracked. Returns how many
    /// were added.
    pub fn append<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        let directory = self.source.journal_directory();
        let mut state = self.state.write();
        let mut added = 0;
        for entry in entries {
            if state.by_filename.contains_key(&entry.filename) {
                continue;
            }
            let position = state.journals.len();
            state.by_filename.insert(entry.filename.clone(), position);
            state
                .journals
                .push(Arc::new(Journal::new(entry, directory.clone())));
            added += 1;
        }
        added
    }

    /// Fetches the index document and appends journals it newly lists.
    ///
    /// Generated sources have no index document and fail with
    /// [`JournalError::IndexNotApplicable`].
    pub fn refresh_index(&self) -> Result<usize> {
        let Origin::Archive { transport } = self.cache.origin() else {
            return Err(JournalError::IndexNotApplicable(self.key.to_string()));
        };

        let _lane = self.refresh_lane.lock();
        let location = self.index_location().resolve();
        let document = transport.fetch(&location)?;
        let defaults = EntryDefaults {
            instrument: self.source.instrument(),
            archive_data_root: &self.settings.archive_data_root,
            sentinel: &self.settings.sentinel,
        };
        let entries = parse_index_document(&document.bytes, &location, &defaults)?;
        let listed = entries.len();
        let added = self.append(entries);
        self.state.write().last_modified = document.modified;

        log::info!(
            "journal index refreshed source={} listed={} added={} total={}",
            self.key,
            listed,
            added,
            self.len()
        );
        Ok(added)
    }

    /// Populates an archive index on first use.
    pub fn ensure_index(&self) -> Result<()> {
        if self.is_chronological() && self.is_empty() {
            self.refresh_index()?;
        }
        Ok(())
    }

    /// Restores a generated source's journal list from the blob store.
    pub(crate) fn restore_generated(&self) -> usize {
        if self.is_chronological() {
            return 0;
        }
        match self.cache.load_stored_index(GENERATED_INDEX_NAME) {
            Some(entries) => {
                let restored = self.append(entries);
                log::info!(
                    "generated index restored source={} journals={}",
                    self.key,
                    restored
                );
                restored
            }
            None => 0,
        }
    }

    /// Persists a generated source's journal list.
    pub fn persist_generated(&self) -> Result<()> {
        let entries = self
            .journals()
            .iter()
            .map(|journal| journal.entry())
            .collect::<Vec<_>>();
        let modified = Utc::now();
        self.cache
            .store_index(GENERATED_INDEX_NAME, entries, Some(modified))?;
        self.state.write().last_modified = Some(modified);
        Ok(())
    }

    /// Searches every journal that is already loaded, in index order.
    /// Journals without matches are left out.
    pub fn search_loaded(&self, engine: &QueryEngine, request: &SearchRequest) -> Vec<SearchHit> {
        self.journals()
            .iter()
            .filter_map(|journal| {
                let table = journal.run_table()?;
                let runs = engine.search(&table, request);
                if runs.is_empty() {
                    None
                } else {
                    Some(SearchHit {
                        filename: journal.filename().to_string(),
                        runs,
                    })
                }
            })
            .collect()
    }
}
