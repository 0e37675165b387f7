//! Journal indexes: per-source collections, the process-wide registry and
//! run lookup.

mod collection;
mod library;
mod locate;

pub use collection::{IndexSettings, JournalIndex, GENERATED_INDEX_NAME};
pub use library::{Library, LibraryContext};
pub use locate::locate;
