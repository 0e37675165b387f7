//! Request-level operations over the journal library.
//!
//! A [`JournalService`] is built once per process and shared by request
//! handlers. It owns the source registry, the background worker slot and
//! the query engine.

use std::sync::Arc;

use serde::Serialize;

use crate::config::JournalConfig;
use crate::error::{JournalError, Result};
use crate::index::{locate, IndexSettings, JournalIndex, Library, LibraryContext};
use crate::journal::Journal;
use crate::query::{QueryEngine, SearchRequest};
use crate::reader::{discover_journals, DiscoverySettings, InstrumentFileReader};
use crate::source::Source;
use crate::storage::DiskBlobStore;
use crate::transport::DefaultTransport;
use crate::types::{JournalSummary, RunTable, SearchHit};
use crate::worker::{BackgroundWorker, WorkerJob, WorkerProgress};

/// Result of asking a journal for runs published since it was last loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "runs", rename_all = "snake_case")]
pub enum RunUpdates {
    Unchanged,
    Added(RunTable),
}

#[derive(Debug)]
pub struct JournalService {
    config: JournalConfig,
    library: Library,
    worker: BackgroundWorker,
    engine: QueryEngine,
}

impl JournalService {
    pub fn new(config: JournalConfig, context: LibraryContext) -> Self {
        Self {
            engine: QueryEngine::new(config.fields.clone()),
            library: Library::new(context),
            worker: BackgroundWorker::new(),
            config,
        }
    }

    /// Builds a service backed by the on-disk cache and the default
    /// transports. `reader` is required only for generated sources.
    pub fn from_config(
        config: JournalConfig,
        reader: Option<Arc<dyn InstrumentFileReader>>,
    ) -> Result<Self> {
        config.validate()?;
        let transport = DefaultTransport::new(config.request_timeout())?;
        let store = DiskBlobStore::open(&config.cache_dir)?;
        log::info!(
            "journal service starting cache_dir={} policy={:?}",
            config.cache_dir.display(),
            config.cache_policy
        );
        let context = LibraryContext {
            transport: Arc::new(transport),
            store: Arc::new(store),
            reader,
            policy: config.cache_policy,
            index: IndexSettings {
                index_document: config.index_document.clone(),
                sentinel: config.index_sentinel.clone(),
                archive_data_root: config.archive_data_root.clone(),
            },
            discovery: DiscoverySettings {
                extensions: config.data_file_extensions.clone(),
                fields: config.generated_fields.clone(),
            },
        };
        Ok(Self::new(config, context))
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// The source's index, fetched on first use.
    fn open(&self, source: &Source) -> Result<Arc<JournalIndex>> {
        let index = self.library.get_or_create(source)?;
        index.ensure_index()?;
        Ok(index)
    }

    /// Journal metadata for a source, in index order.
    pub fn index(&self, source: &Source) -> Result<Vec<JournalSummary>> {
        Ok(self.open(source)?.summaries())
    }

    /// Re-reads an archive's index document. Returns how many journals were
    /// added.
    pub fn refresh_index(&self, source: &Source) -> Result<usize> {
        self.library.get_or_create(source)?.refresh_index()
    }

    pub fn journals(&self, source: &Source) -> Result<Vec<Arc<Journal>>> {
        Ok(self.open(source)?.journals())
    }

    /// Run table of one journal, loading it if needed. `ignore_cache`
    /// re-reads the origin even when a cached copy exists.
    pub fn run_data(
        &self,
        source: &Source,
        filename: &str,
        ignore_cache: bool,
    ) -> Result<Option<Arc<RunTable>>> {
        let index = self.open(source)?;
        let Some(journal) = index.journal(filename) else {
            return Ok(None);
        };
        if ignore_cache {
            let (table, _) = index.cache().get_run_data(&journal, true)?;
            return Ok(Some(table));
        }
        journal.ensure_loaded(index.cache())?;
        Ok(journal.run_table())
    }

    /// Runs added to a journal at its origin since it was loaded.
    pub fn updates(&self, source: &Source, filename: &str) -> Result<Option<RunUpdates>> {
        let index = self.open(source)?;
        let Some(journal) = index.journal(filename) else {
            return Ok(None);
        };
        let updates = match index.cache().get_updates(&journal)? {
            Some(runs) => RunUpdates::Added(runs),
            None => RunUpdates::Unchanged,
        };
        Ok(Some(updates))
    }

    pub fn locate(&self, source: &Source, run_number: i64) -> Result<Option<Arc<Journal>>> {
        let index = self.open(source)?;
        locate(&index, run_number)
    }

    /// Searches one journal, loading it on demand, or every loaded journal
    /// of the source when `filename` is `None`.
    pub fn search<I, K, V>(
        &self,
        source: &Source,
        filename: Option<&str>,
        pairs: I,
    ) -> Result<Vec<SearchHit>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = SearchRequest::from_pairs(pairs, &self.config.case_sensitive_key);
        let index = self.open(source)?;
        let Some(filename) = filename else {
            return Ok(index.search_loaded(&self.engine, &request));
        };

        let Some(journal) = index.journal(filename) else {
            return Ok(Vec::new());
        };
        journal.ensure_loaded(index.cache())?;
        let Some(table) = journal.run_table() else {
            return Ok(Vec::new());
        };
        let runs = self.engine.search(&table, &request);
        if runs.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![SearchHit {
            filename: filename.to_string(),
            runs,
        }])
    }

    /// Starts loading every journal of `source` in the background.
    pub fn start_acquisition(&self, source: &Source) -> Result<WorkerProgress> {
        let index = self.open(source)?;
        self.worker.start(WorkerJob::Acquire { index })?;
        Ok(self.worker.poll())
    }

    /// Discovers the data files of a generated source and builds its
    /// journals in the background.
    pub fn start_generation(&self, source: &Source, force: bool) -> Result<WorkerProgress> {
        let Source::Generated { data_root, .. } = source else {
            return Err(JournalError::InvalidInput(format!(
                "{} is not a generated source",
                source.key()
            )));
        };
        let index = self.library.get_or_create(source)?;
        let entries = discover_journals(data_root, &self.library.context().discovery)?;
        self.worker.start(WorkerJob::Generate {
            index,
            entries,
            force,
        })?;
        Ok(self.worker.poll())
    }

    pub fn poll(&self) -> WorkerProgress {
        self.worker.poll()
    }

    /// Cancels any background job and waits for it to exit.
    pub fn stop(&self) -> WorkerProgress {
        self.worker.stop()
    }

    /// Waits for the background job to finish on its own.
    pub fn wait(&self) -> WorkerProgress {
        self.worker.wait()
    }
}
