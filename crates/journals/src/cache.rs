//! Cache coordination: where a journal's run data comes from.
//!
//! A cached copy in the blob store is trusted without contacting the origin
//! unless the caller asks to ignore the cache. Asking is the only path that
//! re-validates against the origin. `CachePolicy::Revalidate` swaps in a
//! stricter rule that probes the origin whenever a cached copy exists.
//!
//! The origin is dispatched here and nowhere else: archives go through a
//! [`Transport`], generated journals through an [`InstrumentFileReader`].

use std::fmt;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{parse_run_document, IndexEntry};
use crate::error::Result;
use crate::journal::Journal;
use crate::reader::{
    data_files, generate_run_table, latest_modified, DiscoverySettings, InstrumentFileReader,
};
use crate::source::SourceKey;
use crate::storage::{decode_compressed, encode_compressed, BlobStore, CacheKey};
use crate::transport::Transport;
use crate::types::RunTable;

/// Format version of cached run tables.
pub const RUN_CACHE_VERSION: u32 = 1;

/// Format version of persisted generated indexes.
pub const INDEX_CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// A present cache entry is fresh by definition.
    #[default]
    TrustCached,
    /// A present cache entry is used only if the origin still reports the
    /// same modification time.
    Revalidate,
}

/// Where run data originates.
pub enum Origin {
    Archive {
        transport: Arc<dyn Transport>,
    },
    Generated {
        reader: Arc<dyn InstrumentFileReader>,
        settings: DiscoverySettings,
    },
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive { .. } => f.debug_struct("Archive").finish_non_exhaustive(),
            Self::Generated { settings, .. } => f
                .debug_struct("Generated")
                .field("settings", settings)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Serialize)]
struct CachedRunsRef<'a> {
    version: u32,
    runs: &'a RunTable,
}

#[derive(Deserialize)]
struct CachedRuns {
    version: u32,
    runs: RunTable,
}

#[derive(Serialize, Deserialize)]
struct StoredIndex {
    version: u32,
    entries: Vec<IndexEntry>,
}

pub struct CacheCoordinator {
    source: SourceKey,
    origin: Origin,
    store: Arc<dyn BlobStore>,
    policy: CachePolicy,
}

impl fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("source", &self.source)
            .field("origin", &self.origin)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CacheCoordinator {
    pub fn new(
        source: SourceKey,
        origin: Origin,
        store: Arc<dyn BlobStore>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            source,
            origin,
            store,
            policy,
        }
    }

    pub fn source_key(&self) -> &SourceKey {
        &self.source
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Loads a journal's runs, installs them and returns them with their
    /// modification time.
    pub fn get_run_data(
        &self,
        journal: &Journal,
        ignore_cache: bool,
    ) -> Result<(Arc<RunTable>, Option<DateTime<Utc>>)> {
        let _lane = journal.lock_load();
        self.get_run_data_locked(journal, ignore_cache)
    }

    /// [`Self::get_run_data`] for callers already holding the journal's load lane.
    pub(crate) fn get_run_data_locked(
        &self,
        journal: &Journal,
        ignore_cache: bool,
    ) -> Result<(Arc<RunTable>, Option<DateTime<Utc>>)> {
        let key = CacheKey::new(&self.source, journal.filename());

        if !ignore_cache {
            if let Some((runs, modified)) = self.read_cached(journal, &key) {
                log::debug!(
                    "journal cache hit source={} journal={} runs={}",
                    self.source,
                    journal.filename(),
                    runs.len()
                );
                return Ok((journal.install(runs, modified), modified));
            }
        }

        let (runs, modified) = self.fetch_from_origin(journal)?;
        log::info!(
            "journal fetched source={} journal={} runs={} ignore_cache={}",
            self.source,
            journal.filename(),
            runs.len(),
            ignore_cache
        );
        self.write_cached(&key, &runs, modified);
        Ok((journal.install(runs, modified), modified))
    }

    /// Whether a loaded journal still matches its origin.
    ///
    /// Archive journals compare the origin's modification time for exact
    /// equality. Generated journals are always fresh once loaded.
    pub fn is_fresh(&self, journal: &Journal) -> Result<bool> {
        if !journal.is_loaded() {
            return Ok(false);
        }
        match &self.origin {
            Origin::Archive { transport } => {
                let origin = transport.probe(&journal.location().resolve())?;
                Ok(origin.is_some() && origin == journal.last_modified())
            }
            Origin::Generated { .. } => Ok(true),
        }
    }

    /// Runs added since the journal was last loaded, or `None` if nothing new.
    ///
    /// Growth is assumed to be append-only: edits to runs at or below the
    /// previous last run are not reported.
    pub fn get_updates(&self, journal: &Journal) -> Result<Option<RunTable>> {
        if self.is_fresh(journal)? {
            return Ok(None);
        }

        let previous_last = journal.last_run();
        let (runs, _) = self.get_run_data(journal, true)?;

        let Some(previous_last) = previous_last else {
            return Ok(Some(runs.as_ref().clone()));
        };
        // Judge against the table this call installed, not whatever a
        // concurrent load may have put in place since.
        if runs.keys().next_back() == Some(&previous_last) {
            return Ok(None);
        }
        Ok(Some(
            runs.range((Bound::Excluded(previous_last), Bound::Unbounded))
                .map(|(run, record)| (*run, record.clone()))
                .collect(),
        ))
    }

    /// Reads the persisted journal list of a generated source.
    pub fn load_stored_index(&self, name: &str) -> Option<Vec<IndexEntry>> {
        let key = CacheKey::new(&self.source, name);
        let blob = match self.store.get(&key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(error) => {
                log::warn!("stored index read failed for {}: {}", self.source, error);
                return None;
            }
        };
        match decode_compressed::<StoredIndex>(&blob.bytes) {
            Ok(stored) if stored.version == INDEX_CACHE_VERSION => Some(stored.entries),
            Ok(stored) => {
                log::debug!(
                    "stored index version mismatch: {} != {}",
                    stored.version,
                    INDEX_CACHE_VERSION
                );
                None
            }
            Err(error) => {
                log::warn!("stored index decode failed for {}: {}", self.source, error);
                None
            }
        }
    }

    /// Persists the journal list of a generated source.
    pub fn store_index(
        &self,
        name: &str,
        entries: Vec<IndexEntry>,
        modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let bytes = encode_compressed(&StoredIndex {
            version: INDEX_CACHE_VERSION,
            entries,
        })?;
        self.store
            .put(&CacheKey::new(&self.source, name), &bytes, modified)
    }

    fn read_cached(
        &self,
        journal: &Journal,
        key: &CacheKey,
    ) -> Option<(RunTable, Option<DateTime<Utc>>)> {
        let blob = match self.store.get(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(error) => {
                log::warn!(
                    "journal cache read failed for {}: {}",
                    journal.filename(),
                    error
                );
                return None;
            }
        };

        let cached = match decode_compressed::<CachedRuns>(&blob.bytes) {
            Ok(cached) if cached.version == RUN_CACHE_VERSION => cached,
            Ok(cached) => {
                log::debug!(
                    "journal cache version mismatch: {} != {}",
                    cached.version,
                    RUN_CACHE_VERSION
                );
                return None;
            }
            Err(error) => {
                log::warn!(
                    "journal cache decode failed for {}: {}",
                    journal.filename(),
                    error
                );
                return None;
            }
        };

        if self.policy == CachePolicy::Revalidate {
            match self.origin_modified(journal) {
                Ok(origin) if origin.is_some() && origin == blob.modified => {}
                Ok(_) => {
                    log::debug!("journal cache stale: {}", journal.filename());
                    return None;
                }
                Err(error) => {
                    log::warn!(
                        "origin probe failed for {}, using cached copy: {}",
                        journal.filename(),
                        error
                    );
                }
            }
        }

        Some((cached.runs, blob.modified))
    }

    fn write_cached(&self, key: &CacheKey, runs: &RunTable, modified: Option<DateTime<Utc>>) {
        let write = encode_compressed(&CachedRunsRef {
            version: RUN_CACHE_VERSION,
            runs,
        })
        .and_then(|bytes| self.store.put(key, &bytes, modified));

        if let Err(error) = write {
            log::warn!(
                "journal cache write failed for {} ({}): {}",
                self.source,
                key.as_str(),
                error
            );
        }
    }

    fn fetch_from_origin(&self, journal: &Journal) -> Result<(RunTable, Option<DateTime<Utc>>)> {
        match &self.origin {
            Origin::Archive { transport } => {
                let location = journal.location().resolve();
                let document = transport.fetch(&location)?;
                let runs = parse_run_document(&document.bytes, &location)?;
                Ok((runs, document.modified))
            }
            Origin::Generated { reader, settings } => {
                let files = data_files(Path::new(journal.data_directory()), settings)?;
                let runs = generate_run_table(reader.as_ref(), &files, &settings.fields)?;
                Ok((runs, latest_modified(&files)))
            }
        }
    }

    fn origin_modified(&self, journal: &Journal) -> Result<Option<DateTime<Utc>>> {
        match &self.origin {
            Origin::Archive { transport } => transport.probe(&journal.location().resolve()),
            Origin::Generated { settings, .. } => {
                let files = data_files(Path::new(journal.data_directory()), settings)?;
                Ok(latest_modified(&files))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use crate::storage::MemoryBlobStore;
    use crate::testing::{at, run_document, write_data_file, MemoryTransport, StubReader};
    use crate::ranges::RunRangeSet;
    use crate::JournalError;

    const DIRECTORY: &str = "http://data.example/journals/ndxmerlin";
    const LOCATION: &str = "http://data.example/journals/ndxmerlin/journal_19_1.xml";

    fn new_journal() -> Journal {
        Journal::new(
            IndexEntry {
                filename: "journal_19_1.xml".to_string(),
                display_name: "Cycle 19 1".to_string(),
                data_directory: "/data".to_string(),
            },
            DIRECTORY,
        )
    }

    fn coordinator(
        transport: Arc<MemoryTransport>,
        store: Arc<MemoryBlobStore>,
        policy: CachePolicy,
    ) -> CacheCoordinator {
        CacheCoordinator::new(
            Source::archive("http://data.example/journals", Some("MERLIN")).key(),
            Origin::Archive { transport },
            store,
            policy,
        )
    }

    fn setup(
        policy: CachePolicy,
    ) -> (Arc<MemoryTransport>, Arc<MemoryBlobStore>, CacheCoordinator) {
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(MemoryBlobStore::new());
        let cache = coordinator(transport.clone(), store.clone(), policy);
        (transport, store, cache)
    }

    #[test]
    fn present_cache_entry_is_trusted_without_origin_contact() {
        let (transport, store, cache) = setup(CachePolicy::TrustCached);
        transport.insert(LOCATION, &run_document(&[1, 2, 3]), Some(at(100)));

        let first = new_journal();
        let (runs, modified) = cache.get_run_data(&first, false).expect("fetch");
        assert_eq!(runs.len(), 3);
        assert_eq!(modified, Some(at(100)));
        assert_eq!(transport.fetch_count(), 1);
        assert_eq!(store.len(), 1);

        // The origin moves on, but a fresh journal object still reads the cache.
        transport.insert(LOCATION, &run_document(&[1, 2, 3, 4]), Some(at(200)));
        let second = new_journal();
        let (runs, modified) = cache.get_run_data(&second, false).expect("cached");
        assert_eq!(runs.len(), 3);
        assert_eq!(modified, Some(at(100)));
        assert_eq!(transport.fetch_count(), 1);
        assert_eq!(second.last_modified(), Some(at(100)));
    }

    #[test]
    fn ignore_cache_refetches_and_overwrites() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        transport.insert(LOCATION, &run_document(&[1]), Some(at(100)));
        let journal = new_journal();
        journal.load(&cache, false).expect("load");

        transport.insert(LOCATION, &run_document(&[1, 2]), Some(at(200)));
        journal.load(&cache, true).expect("reload");
        assert_eq!(journal.last_run(), Some(2));
        assert_eq!(transport.fetch_count(), 2);

        let other = new_journal();
        let (runs, modified) = cache.get_run_data(&other, false).expect("cached");
        assert_eq!(runs.len(), 2);
        assert_eq!(modified, Some(at(200)));
    }

    #[test]
    fn revalidate_policy_refetches_stale_entries() {
        let (transport, _store, cache) = setup(CachePolicy::Revalidate);
        transport.insert(LOCATION, &run_document(&[1]), Some(at(100)));
        cache.get_run_data(&new_journal(), false).expect("fetch");

        cache.get_run_data(&new_journal(), false).expect("unchanged");
        assert_eq!(transport.fetch_count(), 1);

        transport.insert(LOCATION, &run_document(&[1, 2]), Some(at(101)));
        let (runs, _) = cache.get_run_data(&new_journal(), false).expect("stale");
        assert_eq!(runs.len(), 2);
        assert_eq!(transport.fetch_count(), 2);
    }

    #[test]
    fn freshness_requires_exact_timestamp_match() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        transport.insert(LOCATION, &run_document(&[1]), Some(at(100)));
        assert!(!journal.is_fresh(&cache).expect("unloaded"));

        journal.load(&cache, false).expect("load");
        assert!(journal.is_fresh(&cache).expect("fresh"));

        transport.insert(LOCATION, &run_document(&[1]), Some(at(99)));
        assert!(!journal.is_fresh(&cache).expect("older origin"));

        transport.insert(LOCATION, &run_document(&[1]), None);
        assert!(!journal.is_fresh(&cache).expect("no origin timestamp"));
    }

    #[test]
    fn updates_report_only_new_runs() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        transport.insert(LOCATION, &run_document(&[1, 2, 3, 4, 5]), Some(at(100)));
        journal.load(&cache, false).expect("load");

        assert_eq!(cache.get_updates(&journal).expect("fresh"), None);

        transport.insert(
            LOCATION,
            &run_document(&[1, 2, 3, 4, 5, 6, 7]),
            Some(at(200)),
        );
        let updates = cache.get_updates(&journal).expect("stale").expect("new runs");
        assert_eq!(updates.keys().copied().collect::<Vec<_>>(), [6, 7]);
        assert_eq!(journal.last_modified(), Some(at(200)));
    }

    #[test]
    fn updates_reach_the_largest_run_number() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        transport.insert(LOCATION, &run_document(&[1, i64::MAX - 1]), Some(at(100)));
        journal.load(&cache, false).expect("load");

        transport.insert(
            LOCATION,
            &run_document(&[1, i64::MAX - 1, i64::MAX]),
            Some(at(200)),
        );
        let updates = cache.get_updates(&journal).expect("stale").expect("new runs");
        assert_eq!(updates.keys().copied().collect::<Vec<_>>(), [i64::MAX]);
        assert_eq!(cache.get_updates(&journal).expect("fresh"), None);
    }

    #[test]
    fn concurrent_loads_fetch_once() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        transport.insert(LOCATION, &run_document(&[1, 2, 3, 7, 8]), Some(at(100)));
        let journal = new_journal();
        let barrier = std::sync::Barrier::new(16);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    barrier.wait();
                    journal.ensure_loaded(&cache).expect("load");
                });
            }
        });

        assert_eq!(transport.fetch_count(), 1);
        let table = journal.run_table().expect("loaded");
        assert_eq!(journal.ranges(), RunRangeSet::from_runs(table.keys().copied()));
        assert_eq!(journal.first_run(), Some(1));
        assert!(!journal.contains_run(5));
    }

    #[test]
    fn updates_ignore_timestamp_only_changes() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        transport.insert(LOCATION, &run_document(&[1, 2]), Some(at(100)));
        journal.load(&cache, false).expect("load");

        transport.insert(LOCATION, &run_document(&[1, 2]), Some(at(300)));
        assert_eq!(cache.get_updates(&journal).expect("touched"), None);
        assert_eq!(transport.fetch_count(), 2);
    }

    #[test]
    fn updates_on_unloaded_journal_return_everything() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        transport.insert(LOCATION, &run_document(&[1, 2, 3]), Some(at(100)));

        let updates = cache.get_updates(&journal).expect("updates").expect("runs");
        assert_eq!(updates.keys().copied().collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn updates_on_previously_empty_journal_return_everything() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        transport.insert(LOCATION, &run_document(&[]), Some(at(100)));
        journal.load(&cache, false).expect("load");
        assert!(journal.is_loaded());

        transport.insert(LOCATION, &run_document(&[1, 2, 3]), Some(at(200)));
        let updates = cache.get_updates(&journal).expect("updates").expect("runs");
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn transport_failure_leaves_journal_unloaded() {
        let (_transport, store, cache) = setup(CachePolicy::TrustCached);
        let journal = new_journal();
        let error = journal.load(&cache, false).expect_err("missing document");
        assert!(matches!(error, JournalError::Transport { .. }));
        assert!(!journal.is_loaded());
        assert!(store.is_empty());
    }

    #[test]
    fn schema_errors_propagate() {
        let (transport, _store, cache) = setup(CachePolicy::TrustCached);
        transport.insert(
            LOCATION,
            "<NXroot><NXentry><title>orphan</title></NXentry></NXroot>",
            Some(at(1)),
        );
        let error = new_journal().load(&cache, false).expect_err("schema");
        assert!(error.is_fatal());
    }

    #[test]
    fn corrupt_cache_entry_falls_back_to_origin() {
        let (transport, store, cache) = setup(CachePolicy::TrustCached);
        transport.insert(LOCATION, &run_document(&[4]), Some(at(5)));
        let key = CacheKey::new(cache.source_key(), "journal_19_1.xml");
        store.put(&key, b"garbage", Some(at(1))).expect("put");

        let (runs, modified) = cache.get_run_data(&new_journal(), false).expect("fallback");
        assert!(runs.contains_key(&4));
        assert_eq!(modified, Some(at(5)));
    }

    #[test]
    fn generated_origin_reads_data_files() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let directory = temp.path().join("cycle_a");
        write_data_file(&directory, 31, "first");
        write_data_file(&directory, 32, "second");

        let source = Source::generated(temp.path(), None);
        let cache = CacheCoordinator::new(
            source.key(),
            Origin::Generated {
                reader: Arc::new(StubReader),
                settings: DiscoverySettings {
                    extensions: vec!["nxs".to_string()],
                    fields: vec!["run_number".to_string(), "title".to_string()],
                },
            },
            Arc::new(MemoryBlobStore::new()),
            CachePolicy::TrustCached,
        );
        let journal = Journal::new(
            IndexEntry {
                filename: "journal_cycle_a.xml".to_string(),
                display_name: "cycle_a".to_string(),
                data_directory: directory.to_string_lossy().to_string(),
            },
            source.journal_directory(),
        );

        assert!(!journal.is_fresh(&cache).expect("unloaded"));
        journal.ensure_loaded(&cache).expect("generate");
        assert_eq!(journal.first_run(), Some(31));
        assert_eq!(journal.last_run(), Some(32));
        assert!(journal.is_fresh(&cache).expect("generated is fresh"));
    }

    #[test]
    fn stored_index_round_trips() {
        let (_transport, _store, cache) = setup(CachePolicy::TrustCached);
        assert!(cache.load_stored_index("journal_main.xml").is_none());
        let entries = vec![IndexEntry {
            filename: "journal_a.xml".to_string(),
            display_name: "a".to_string(),
            data_directory: "/data/a".to_string(),
        }];
        cache
            .store_index("journal_main.xml", entries.clone(), None)
            .expect("store");
        assert_eq!(cache.load_stored_index("journal_main.xml"), Some(entries));
    }
}
