//! Instrument data files: discovery and run generation.
//!
//! Generated sources have no index document. Their journals are derived
//! from the data files found under the source's data root, one journal per
//! sub-directory, and each file contributes one run record.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::document::IndexEntry;
use crate::error::{JournalError, Result};
use crate::transport::file_modified;
use crate::types::{record_run_number, RunRecord, RunTable};

/// Journal name used for data files sitting directly in the data root.
pub const ROOT_GROUP: &str = "root";

/// Extracts named fields from one instrument data file.
pub trait InstrumentFileReader: Send + Sync {
    /// Returns the requested fields that the file provides. The record must
    /// include `run_number` for the file to be usable.
    fn read_fields(&self, path: &Path, fields: &[String]) -> Result<RunRecord>;
}

/// Which files count as data files and which fields to read from them.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub extensions: Vec<String>,
    pub fields: Vec<String>,
}

impl DiscoverySettings {
    fn is_data_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                self.extensions
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(extension))
            })
    }
}

/// Lists data files directly inside `directory`, sorted by path.
pub fn data_files(directory: &Path, settings: &DiscoverySettings) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && settings.is_data_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Finds the journals a data root would generate, sorted by group name.
pub fn discover_journals(
    data_root: &Path,
    settings: &DiscoverySettings,
) -> Result<Vec<IndexEntry>> {
    if !data_root.is_dir() {
        return Err(JournalError::InvalidInput(format!(
            "data root is not a directory: {}",
            data_root.display()
        )));
    }

    let mut groups = Vec::new();
    if !data_files(data_root, settings)?.is_empty() {
        groups.push((ROOT_GROUP.to_string(), data_root.to_path_buf()));
    }

    let mut subdirectories = Vec::new();
    for entry in fs::read_dir(data_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirectories.push(entry.path());
        }
    }
    subdirectories.sort();

    for directory in subdirectories {
        match data_files(&directory, settings) {
            Ok(files) if files.is_empty() => {}
            Ok(_) => {
                let group = directory
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| ROOT_GROUP.to_string());
                groups.push((group, directory));
            }
            Err(error) => {
                log::warn!(
                    "skipping unreadable data directory {}: {}",
                    directory.display(),
                    error
                );
            }
        }
    }

    groups.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(groups
        .into_iter()
        .map(|(group, directory)| IndexEntry {
            filename: format!("journal_{group}.xml"),
            display_name: group,
            data_directory: directory.to_string_lossy().to_string(),
        })
        .collect())
}

/// Reads every file into a run table. Files are read in parallel.
pub fn generate_run_table(
    reader: &dyn InstrumentFileReader,
    files: &[PathBuf],
    fields: &[String],
) -> Result<RunTable> {
    let records = files
        .par_iter()
        .map(|path| reader.read_fields(path, fields).map(|record| (path, record)))
        .collect::<Result<Vec<_>>>()?;

    let mut table = RunTable::new();
    for (path, record) in records {
        let Some(run_number) = record_run_number(&record) else {
            return Err(JournalError::Schema {
                location: path.to_string_lossy().to_string(),
                record: path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
            });
        };
        if table.insert(run_number, record).is_some() {
            log::warn!(
                "run {} appears in more than one file; keeping {}",
                run_number,
                path.display()
            );
        }
    }
    Ok(table)
}

/// Newest modification time among `files`.
pub fn latest_modified(files: &[PathBuf]) -> Option<DateTime<Utc>> {
    files.iter().filter_map(|path| file_modified(path)).max()
}
