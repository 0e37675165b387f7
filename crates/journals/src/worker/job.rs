//! Units of background work and the loop that runs them.

use std::sync::Arc;

use parking_lot::Mutex;

use super::progress::WorkerProgress;
use crate::cancel::CancellationToken;
use crate::document::IndexEntry;
use crate::error::Result;
use crate::index::JournalIndex;

/// Bulk work the background worker can run.
#[derive(Debug, Clone)]
pub enum WorkerJob {
    /// Loads run data for every journal of an index that is not loaded yet.
    Acquire { index: Arc<JournalIndex> },
    /// Adds discovered journals to a generated index and builds their run
    /// tables from the data files. Loaded journals are skipped unless
    /// `force` is set.
    Generate {
        index: Arc<JournalIndex>,
        entries: Vec<IndexEntry>,
        force: bool,
    },
}

/// How a job ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Cancelled,
}

impl WorkerJob {
    pub fn len(&self) -> usize {
        match self {
            Self::Acquire { index } => index.len(),
            Self::Generate { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Acquire { .. } => "acquire",
            Self::Generate { .. } => "generate",
        }
    }

    /// Runs the job, checking `cancel` before each item.
    pub(crate) fn run(
        &self,
        progress: &Mutex<WorkerProgress>,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        match self {
            Self::Acquire { index } => acquire(index, progress, cancel),
            Self::Generate {
                index,
                entries,
                force,
            } => generate(index, entries, *force, progress, cancel),
        }
    }
}

fn acquire(
    index: &JournalIndex,
    progress: &Mutex<WorkerProgress>,
    cancel: &CancellationToken,
) -> Result<JobOutcome> {
    for journal in index.journals() {
        if cancel.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }
        if !journal.is_loaded() {
            journal.ensure_loaded(index.cache())?;
        }
        progress.lock().record_item(journal.filename());
    }
    Ok(JobOutcome::Completed)
}

fn generate(
    index: &JournalIndex,
    entries: &[IndexEntry],
    force: bool,
    progress: &Mutex<WorkerProgress>,
    cancel: &CancellationToken,
) -> Result<JobOutcome> {
    let mut outcome = JobOutcome::Completed;
    let mut result = Ok(());
    for entry in entries {
        if cancel.is_cancelled() {
            outcome = JobOutcome::Cancelled;
            break;
        }
        index.append([entry.clone()]);
        let Some(journal) = index.journal(&entry.filename) else {
            continue;
        };
        if force || !journal.is_loaded() {
            if let Err(error) = journal.load(index.cache(), true) {
                result = Err(error);
                break;
            }
        }
        progress.lock().record_item(journal.filename());
    }

    // Journals appended so far are kept even when the loop stopped early.
    let persisted = index.persist_generated();
    result?;
    persisted?;
    Ok(outcome)
}
