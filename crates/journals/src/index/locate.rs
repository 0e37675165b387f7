//! Finding the journal that owns a run number.

use std::sync::Arc;

use super::collection::JournalIndex;
use crate::error::Result;
use crate::journal::Journal;

/// Returns the journal whose runs include `run_number`, loading journals on
/// demand. `None` when no journal covers it.
///
/// Generated sources carry no ordering, so every journal is loaded and
/// scanned. Archive indexes are chronological: run numbers grow with list
/// position, which lets the search narrow a `[left, right]` window using
/// whatever journals are loaded and load only midpoints.
pub fn locate(index: &JournalIndex, run_number: i64) -> Result<Option<Arc<Journal>>> {
    let journals = index.journals();
    if journals.is_empty() {
        return Ok(None);
    }

    if !index.is_chronological() {
        for journal in &journals {
            journal.ensure_loaded(index.cache())?;
        }
        return Ok(journals
            .into_iter()
            .find(|journal| journal.contains_run(run_number)));
    }

    if let Some(found) = journals
        .iter()
        .find(|journal| journal.is_loaded() && journal.contains_run(run_number))
    {
        return Ok(Some(found.clone()));
    }

    let mut loads = 0usize;
    loop {
        let (left, right) = window(&journals, run_number);
        if left > right {
            // Neighbouring coverage brackets the run but neither holds it.
            return Ok(None);
        }

        let candidate = if left == right {
            left
        } else {
            let midpoint = left + (right - left) / 2;
            if journals[midpoint].is_loaded() {
                match (left..=right).find(|position| !journals[*position].is_loaded()) {
                    Some(position) => position,
                    None => return Ok(None),
                }
            } else {
                midpoint
            }
        };

        let journal = &journals[candidate];
        if !journal.is_loaded() {
            journal.ensure_loaded(index.cache())?;
            loads += 1;
        }
        if journal.contains_run(run_number) {
            log::debug!(
                "located run={} journal={} loads={}",
                run_number,
                journal.filename(),
                loads
            );
            return Ok(Some(journal.clone()));
        }
        if left == right {
            return Ok(None);
        }
    }
}

/// Narrowest window the loaded journals allow: `left` is the last journal
/// starting at or below the run, `right` the first ending at or above it.
fn window(journals: &[Arc<Journal>], run_number: i64) -> (usize, usize) {
    let mut left = 0;
    let mut right = journals.len() - 1;
    for (position, journal) in journals.iter().enumerate() {
        if journal.first_run().is_some_and(|first| first <= run_number) {
            left = position;
        }
    }
    for (position, journal) in journals.iter().enumerate().rev() {
        if journal.last_run().is_some_and(|last| last >= run_number) {
            right = position;
        }
    }
    (left, right)
}
