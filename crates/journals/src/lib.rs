//! Run journal metadata library.
//!
//! This crate tracks experiment runs published in per-cycle journals:
//! - Lazily loaded journal indexes per source, with run coverage ranges
//! - Bisection lookup of the journal owning a run number
//! - Cached run data validated against the origin's modification time
//! - Field-predicate search over run tables
//! - A single cancellable background worker for bulk loading and generation

pub mod cache;
pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod journal;
pub mod query;
pub mod ranges;
pub mod reader;
pub mod service;
pub mod source;
pub mod storage;
pub mod transport;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use cache::{CacheCoordinator, CachePolicy, Origin};
pub use cancel::CancellationToken;
pub use config::{FieldSchemaConfig, JournalConfig};
pub use document::IndexEntry;
pub use error::{ErrorPayload, JournalError, Result};
pub use index::{locate, JournalIndex, Library, LibraryContext};
pub use journal::Journal;
pub use query::{QueryEngine, SearchRequest};
pub use ranges::{RunRange, RunRangeSet};
pub use reader::InstrumentFileReader;
pub use service::{JournalService, RunUpdates};
pub use source::{Location, Source, SourceKey};
pub use storage::{BlobStore, DiskBlobStore, MemoryBlobStore};
pub use transport::{DefaultTransport, FileTransport, HttpTransport, Transport};
pub use types::{FieldValue, JournalSummary, RunRecord, RunTable, SearchHit};
pub use worker::{BackgroundWorker, WorkerJob, WorkerProgress, WorkerState};
