//! Journal sources and document locations.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a set of journals comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Journals published by a remote or mounted archive, with an index
    /// document listing them in chronological order.
    Archive {
        root: String,
        instrument: Option<String>,
    },
    /// Journals generated locally from data files found under `data_root`.
    Generated {
        data_root: PathBuf,
        instrument: Option<String>,
    },
}

impl Source {
    pub fn archive(root: impl Into<String>, instrument: Option<&str>) -> Self {
        Self::Archive {
            root: root.into(),
            instrument: instrument.map(str::to_string),
        }
    }

    pub fn generated(data_root: impl Into<PathBuf>, instrument: Option<&str>) -> Self {
        Self::Generated {
            data_root: data_root.into(),
            instrument: instrument.map(str::to_string),
        }
    }

    /// Deterministic registry and cache key for this source.
    pub fn key(&self) -> SourceKey {
        let (kind, root, instrument) = match self {
            Self::Archive { root, instrument } => ("archive", root.clone(), instrument),
            Self::Generated {
                data_root,
                instrument,
            } => (
                "generated",
                data_root.to_string_lossy().to_string(),
                instrument,
            ),
        };
        let root = root.trim_end_matches(['/', '\\']);
        match instrument {
            Some(instrument) => SourceKey(format!(
                "{kind}:{root}#{}",
                instrument.to_ascii_uppercase()
            )),
            None => SourceKey(format!("{kind}:{root}")),
        }
    }

    pub fn instrument(&self) -> Option<&str> {
        match self {
            Self::Archive { instrument, .. } | Self::Generated { instrument, .. } => {
                instrument.as_deref()
            }
        }
    }

    /// Whether journal order follows run-number order.
    pub fn is_chronological(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }

    /// Directory holding this source's journal documents.
    ///
    /// Archives keep one directory per instrument, named `ndx<instrument>`.
    pub fn journal_directory(&self) -> String {
        match self {
            Self::Archive { root, instrument } => {
                let root = root.trim_end_matches(['/', '\\']);
                match instrument {
                    Some(instrument) => {
                        format!("{root}/ndx{}", instrument.to_ascii_lowercase())
                    }
                    None => root.to_string(),
                }
            }
            Self::Generated { data_root, .. } => data_root.to_string_lossy().to_string(),
        }
    }
}

/// Registry key derived from a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document address split into directory and file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub directory: String,
    pub filename: String,
}

impl Location {
    pub fn new(directory: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }

    /// Joins directory and file name into a URL or path.
    pub fn resolve(&self) -> String {
        let directory = self.directory.trim_end_matches(['/', '\\']);
        if directory.is_empty() {
            self.filename.clone()
        } else {
            format!("{directory}/{}", self.filename)
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve())
    }
}
