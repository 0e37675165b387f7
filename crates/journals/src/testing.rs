//! Test doubles shared by the unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use fnv::FnvHashMap;
use parking_lot::Mutex;

use crate::cache::{CacheCoordinator, CachePolicy, Origin};
use crate::error::{JournalError, Result};
use crate::index::{IndexSettings, JournalIndex};
use crate::reader::InstrumentFileReader;
use crate::source::Source;
use crate::storage::MemoryBlobStore;
use crate::transport::{FetchedDocument, Transport};
use crate::types::{FieldValue, RunRecord, RunTable};

/// Serves documents from memory and records every fetch.
#[derive(Debug, Default)]
pub(crate) struct MemoryTransport {
    documents: Mutex<FnvHashMap<String, FetchedDocument>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, location: &str, body: &str, modified: Option<DateTime<Utc>>) {
        self.documents.lock().insert(
            location.to_string(),
            FetchedDocument {
                bytes: body.as_bytes().to_vec(),
                modified,
            },
        );
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }

    pub(crate) fn fetches_of(&self, location: &str) -> usize {
        self.fetched
            .lock()
            .iter()
            .filter(|fetched| fetched.as_str() == location)
            .count()
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, location: &str) -> Result<FetchedDocument> {
        self.fetched.lock().push(location.to_string());
        self.documents
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| JournalError::transport(location, "not found"))
    }

    fn probe(&self, location: &str) -> Result<Option<DateTime<Utc>>> {
        self.documents
            .lock()
            .get(location)
            .map(|document| document.modified)
            .ok_or_else(|| JournalError::transport(location, "not found"))
    }
}

/// Reads `key=value` lines from a text file posing as a data file.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StubReader;

impl InstrumentFileReader for StubReader {
    fn read_fields(&self, path: &Path, fields: &[String]) -> Result<RunRecord> {
        let raw = fs::read_to_string(path).map_err(|error| JournalError::Reader {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Ok(raw
            .lines()
            .filter_map(|line| line.split_once('='))
            .filter(|(key, _)| fields.iter().any(|field| field == key))
            .map(|(key, value)| (key.to_string(), FieldValue::from(value)))
            .collect())
    }
}

/// Writes a stub data file for `run` into `directory`.
pub(crate) fn write_data_file(directory: &Path, run: i64, title: &str) -> PathBuf {
    fs::create_dir_all(directory).expect("create data directory");
    let path = directory.join(format!("RUN{run:05}.nxs"));
    let day = run % 28 + 1;
    let body = format!("run_number={run}\ntitle={title}\nstart_time=2019-02-{day:02}T10:00:00\n");
    fs::write(&path, body).expect("write data file");
    path
}

pub(crate) fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

pub(crate) fn record(run: i64) -> RunRecord {
    let mut record = RunRecord::new();
    record.insert("run_number".to_string(), FieldValue::from(run.to_string()));
    record.insert("title".to_string(), FieldValue::from(format!("Run {run}")));
    record
}

pub(crate) fn table_of(runs: &[i64]) -> RunTable {
    runs.iter().map(|run| (*run, record(*run))).collect()
}

/// A run document with one entry per run.
pub(crate) fn run_document(runs: &[i64]) -> String {
    let mut body = String::from("<NXroot>");
    for run in runs {
        body.push_str(&format!(
            "<NXentry name=\"MER{run:05}\"><run_number>{run}</run_number><title>Run {run}</title></NXentry>"
        ));
    }
    body.push_str("</NXroot>");
    body
}

/// An index document listing `files` in order.
pub(crate) fn index_document(files: &[&str]) -> String {
    let mut body = String::from("<journal><file name=\"journal.xml\"/>");
    for file in files {
        body.push_str(&format!("<file name=\"{file}\"/>"));
    }
    body.push_str("</journal>");
    body
}

pub(crate) const ARCHIVE_ROOT: &str = "http://data.example/journals";
pub(crate) const JOURNAL_DIR: &str = "http://data.example/journals/ndxmerlin";

pub(crate) fn index_settings() -> IndexSettings {
    IndexSettings {
        index_document: "journal_main.xml".to_string(),
        sentinel: "journal.xml".to_string(),
        archive_data_root: "//isis/inst$".to_string(),
    }
}

/// An empty MERLIN archive index backed by `transport` and a fresh store.
pub(crate) fn archive_index(transport: Arc<MemoryTransport>) -> JournalIndex {
    let source = Source::archive(ARCHIVE_ROOT, Some("MERLIN"));
    let cache = CacheCoordinator::new(
        source.key(),
        Origin::Archive { transport },
        Arc::new(MemoryBlobStore::new()),
        CachePolicy::TrustCached,
    );
    JournalIndex::new(source, cache, index_settings())
}

/// Publishes `journal_<n>.xml` for each run list plus an index listing them
/// in order. Returns the filenames.
pub(crate) fn publish(transport: &MemoryTransport, journals: &[Vec<i64>]) -> Vec<String> {
    let names = (0..journals.len())
        .map(|position| format!("journal_{position}.xml"))
        .collect::<Vec<_>>();
    for (name, runs) in names.iter().zip(journals) {
        transport.insert(&format!("{JOURNAL_DIR}/{name}"), &run_document(runs), Some(at(1)));
    }
    let listed = names.iter().map(String::as_str).collect::<Vec<_>>();
    transport.insert(
        &format!("{JOURNAL_DIR}/journal_main.xml"),
        &index_document(&listed),
        Some(at(1)),
    );
    names
}
