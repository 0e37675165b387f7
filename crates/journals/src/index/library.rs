//! Registry of journal indexes, one per source.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::collection::{IndexSettings, JournalIndex};
use crate::cache::{CacheCoordinator, CachePolicy, Origin};
use crate::error::{JournalError, Result};
use crate::reader::{DiscoverySettings, InstrumentFileReader};
use crate::source::{Source, SourceKey};
use crate::storage::BlobStore;
use crate::transport::Transport;

/// Collaborators shared by every index the library creates.
#[derive(Clone)]
pub struct LibraryContext {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn BlobStore>,
    /// Needed only for generated sources.
    pub reader: Option<Arc<dyn InstrumentFileReader>>,
    pub policy: CachePolicy,
    pub index: IndexSettings,
    pub discovery: DiscoverySettings,
}

impl fmt::Debug for LibraryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryContext")
            .field("transport", &"<transport>")
            .field("store", &"<store>")
            .field("reader", &self.reader.as_ref().map(|_| "<reader>"))
            .field("policy", &self.policy)
            .field("index", &self.index)
            .field("discovery", &self.discovery)
            .finish()
    }
}

/// Holds at most one [`JournalIndex`] per source key for the process
/// lifetime.
#[derive(Debug)]
pub struct Library {
    context: LibraryContext,
    indexes: RwLock<HashMap<SourceKey, Arc<JournalIndex>>>,
    index_init_lane: Mutex<()>,
}

impl Library {
    pub fn new(context: LibraryContext) -> Self {
        Self {
            context,
            indexes: RwLock::new(HashMap::new()),
            index_init_lane: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &LibraryContext {
        &self.context
    }

    pub fn get(&self, key: &SourceKey) -> Option<Arc<JournalIndex>> {
        self.indexes.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<SourceKey> {
        let mut keys = self.indexes.read().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    /// Returns the index for `source`, creating an empty one on first use.
    ///
    /// Creation is serialized so two callers racing on a new source end up
    /// sharing the same index.
    pub fn get_or_create(&self, source: &Source) -> Result<Arc<JournalIndex>> {
        let key = source.key();
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }

        let _init_lane_guard = self.index_init_lane.lock();
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }

        let started = Instant::now();
        let index = Arc::new(self.create_index(source)?);
        let restored = index.restore_generated();
        log::info!(
            "journal index created source={} restored={} init_ms={}",
            key,
            restored,
            started.elapsed().as_millis()
        );

        let mut indexes = self.indexes.write();
        if let Some(existing) = indexes.get(&key).cloned() {
            return Ok(existing);
        }
        indexes.insert(key, index.clone());
        Ok(index)
    }

    fn create_index(&self, source: &Source) -> Result<JournalIndex> {
        let origin = match source {
            Source::Archive { .. } => Origin::Archive {
                transport: self.context.transport.clone(),
            },
            Source::Generated { .. } => {
                let reader = self.context.reader.clone().ok_or_else(|| {
                    JournalError::InvalidInput(format!(
                        "no instrument file reader configured for {}",
                        source.key()
                    ))
                })?;
                Origin::Generated {
                    reader,
                    settings: self.context.discovery.clone(),
                }
            }
        };
        let cache = CacheCoordinator::new(
            source.key(),
            origin,
            self.context.store.clone(),
            self.context.policy,
        );
        Ok(JournalIndex::new(
            source.clone(),
            cache,
            self.context.index.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use crate::testing::{MemoryTransport, StubReader};
    use std::thread;

    fn context(reader: bool) -> LibraryContext {
        LibraryContext {
            transport: Arc::new(MemoryTransport::new()),
            store: Arc::new(MemoryBlobStore::new()),
            reader: reader.then(|| Arc::new(StubReader) as Arc<dyn InstrumentFileReader>),
            policy: CachePolicy::TrustCached,
            index: IndexSettings {
                index_document: "journal_main.xml".to_string(),
                sentinel: "journal.xml".to_string(),
                archive_data_root: "//isis/inst$".to_string(),
            },
            discovery: DiscoverySettings {
                extensions: vec!["nxs".to_string()],
                fields: vec!["run_number".to_string()],
            },
        }
    }

    #[test]
    fn same_source_shares_one_index() {
        let library = Library::new(context(false));
        let first = library
            .get_or_create(&Source::archive("http://data.example/journals/", Some("merlin")))
            .expect("create");
        let second = library
            .get_or_create(&Source::archive("http://data.example/journals", Some("MERLIN")))
            .expect("create");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(library.len(), 1);

        library
            .get_or_create(&Source::archive("http://data.example/journals", Some("LET")))
            .expect("create");
        assert_eq!(library.len(), 2);
    }

    #[test]
    fn concurrent_creation_yields_one_index() {
        let library = Arc::new(Library::new(context(false)));
        let handles = (0..8)
            .map(|_| {
                let library = library.clone();
                thread::spawn(move || {
                    library
                        .get_or_create(&Source::archive("http://data.example", Some("MARI")))
                        .expect("create")
                })
            })
            .collect::<Vec<_>>();
        let indexes = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect::<Vec<_>>();
        assert!(indexes.iter().all(|index| Arc::ptr_eq(index, &indexes[0])));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn generated_source_needs_a_reader() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let source = Source::generated(temp.path(), None);

        let without = Library::new(context(false));
        assert!(matches!(
            without.get_or_create(&source),
            Err(JournalError::InvalidInput(_))
        ));
        assert!(without.is_empty());

        let with = Library::new(context(true));
        let index = with.get_or_create(&source).expect("create");
        assert!(!index.is_chronological());
        assert!(with.get(&source.key()).is_some());
    }
}
