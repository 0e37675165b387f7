use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Transport error for {location}: {message}")]
    Transport { location: String, message: String },

    #[error("Unexpected status {status} for {location}")]
    Status { location: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {location}: {message}")]
    Parse { location: String, message: String },

    /// A run record without its mandatory `run_number` field.
    #[error("Schema error in {location}: record {record} has no run_number")]
    Schema { location: String, record: String },

    #[error("Index not applicable for generated source: {0}")]
    IndexNotApplicable(String),

    #[error("Background worker is already running")]
    WorkerBusy,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Instrument file error for {path}: {message}")]
    Reader { path: PathBuf, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, JournalError>;

/// Serializable error body handed back to request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub kind: &'static str,
    pub message: String,
    pub fatal: bool,
}

impl JournalError {
    /// Source data that breaks the record contract. Never recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } | Self::Status { .. } | Self::Io(_) => "transport",
            Self::Parse { .. } => "parse",
            Self::Schema { .. } => "schema",
            Self::IndexNotApplicable(_) => "index_not_applicable",
            Self::WorkerBusy => "worker_busy",
            Self::Cache(_) => "cache",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Reader { .. } => "reader",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            fatal: self.is_fatal(),
        }
    }

    pub(crate) fn parse(location: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn transport(location: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            location: location.into(),
            message: message.to_string(),
        }
    }
}
