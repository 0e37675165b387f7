//! Service configuration.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CachePolicy;
use crate::error::{JournalError, Result};

pub const DEFAULT_INDEX_DOCUMENT: &str = "journal_main.xml";
pub const DEFAULT_INDEX_SENTINEL: &str = "journal.xml";
pub const DEFAULT_CASE_SENSITIVE_KEY: &str = "case_sensitive";
pub const DEFAULT_ARCHIVE_DATA_ROOT: &str = "//isis/inst$";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Directory of the on-disk blob store.
    pub cache_dir: PathBuf,
    pub cache_policy: CachePolicy,
    /// Name of an archive's index document.
    pub index_document: String,
    /// Index entry that never names a journal.
    pub index_sentinel: String,
    /// Root used to derive default data directories for archive journals.
    pub archive_data_root: String,
    pub request_timeout_secs: u64,
    /// Extensions (without dot) of data files picked up for generation.
    pub data_file_extensions: Vec<String>,
    /// Fields requested from each data file during generation.
    pub generated_fields: Vec<String>,
    /// Query key that toggles case-sensitive matching.
    pub case_sensitive_key: String,
    pub fields: FieldSchemaConfig,
}

/// How query values are interpreted per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchemaConfig {
    pub exact_fields: BTreeSet<String>,
    pub integer_fields: BTreeSet<String>,
    pub timestamp_fields: BTreeSet<String>,
    /// chrono format of timestamps stored in records.
    pub timestamp_format: String,
    /// chrono format of dates in timestamp-range queries.
    pub query_date_format: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_policy: CachePolicy::TrustCached,
            index_document: DEFAULT_INDEX_DOCUMENT.to_string(),
            index_sentinel: DEFAULT_INDEX_SENTINEL.to_string(),
            archive_data_root: DEFAULT_ARCHIVE_DATA_ROOT.to_string(),
            request_timeout_secs: 30,
            data_file_extensions: vec!["nxs".to_string()],
            generated_fields: [
                "run_number",
                "title",
                "start_time",
                "end_time",
                "duration",
                "experiment_identifier",
                "user_name",
                "good_frames",
                "raw_frames",
                "proton_charge",
                "sample_id",
                "isis_cycle",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            case_sensitive_key: DEFAULT_CASE_SENSITIVE_KEY.to_string(),
            fields: FieldSchemaConfig::default(),
        }
    }
}

impl Default for FieldSchemaConfig {
    fn default() -> Self {
        fn set(names: &[&str]) -> BTreeSet<String> {
            names.iter().map(|name| name.to_string()).collect()
        }

        Self {
            exact_fields: set(&["experiment_identifier", "sample_id", "isis_cycle"]),
            integer_fields: set(&["run_number", "duration", "good_frames", "raw_frames"]),
            timestamp_fields: set(&["start_time", "end_time"]),
            timestamp_format: "%Y-%m-%dT%H:%M:%S".to_string(),
            query_date_format: "%Y/%m/%d".to_string(),
        }
    }
}

impl JournalConfig {
    /// Reads a JSON configuration file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            JournalError::Config(format!("unable to read {}: {error}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            JournalError::Config(format!("invalid config {}: {error}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_file_extensions.is_empty() {
            return Err(JournalError::Config(
                "data_file_extensions must not be empty".to_string(),
            ));
        }
        if self.case_sensitive_key.trim().is_empty() {
            return Err(JournalError::Config(
                "case_sensitive_key must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(JournalError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.index_document.trim().is_empty() {
            return Err(JournalError::Config(
                "index_document must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("journals")
}
