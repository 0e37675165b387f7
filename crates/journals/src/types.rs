//! Core record types shared across the crate.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the mandatory per-record field.
pub const RUN_NUMBER_FIELD: &str = "run_number";

/// A single field value of a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    /// Returns the value rendered as text, borrowing when possible.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(value) => Cow::Borrowed(value.as_str()),
            Self::Integer(value) => Cow::Owned(value.to_string()),
            Self::Float(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Returns the value as an integer if it is one or parses as one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
            Self::Float(value)
                if value.is_finite()
                    && value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value < i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            Self::Float(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Field name to value mapping for one run.
pub type RunRecord = BTreeMap<String, FieldValue>;

/// Run records keyed by run number.
pub type RunTable = BTreeMap<i64, RunRecord>;

/// Reads the run number out of a record.
pub fn record_run_number(record: &RunRecord) -> Option<i64> {
    record.get(RUN_NUMBER_FIELD).and_then(FieldValue::as_integer)
}

/// Metadata view of a journal, without its run table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalSummary {
    pub filename: String,
    pub display_name: String,
    pub data_directory: String,
    pub loaded: bool,
    pub first_run: Option<i64>,
    pub last_run: Option<i64>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Result of searching one journal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub filename: String,
    pub runs: RunTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_values_parse_as_integers() {
        assert_eq!(FieldValue::from(" 42 ").as_integer(), Some(42));
        assert_eq!(FieldValue::from("abc").as_integer(), None);
        assert_eq!(FieldValue::Float(3.0).as_integer(), Some(3));
        assert_eq!(FieldValue::Float(3.5).as_integer(), None);
    }

    #[test]
    fn floats_outside_the_integer_range_are_not_integers() {
        assert_eq!(FieldValue::Float(f64::NAN).as_integer(), None);
        assert_eq!(FieldValue::Float(f64::INFINITY).as_integer(), None);
        assert_eq!(FieldValue::Float(f64::NEG_INFINITY).as_integer(), None);
        assert_eq!(FieldValue::Float(1e19).as_integer(), None);
        assert_eq!(FieldValue::Float(-1e19).as_integer(), None);
        assert_eq!(FieldValue::Float(i64::MAX as f64).as_integer(), None);
        assert_eq!(
            FieldValue::Float(i64::MIN as f64).as_integer(),
            Some(i64::MIN)
        );
        assert_eq!(FieldValue::Float(-12.0).as_integer(), Some(-12));
    }

    #[test]
    fn run_number_is_read_from_text_or_integer() {
        let mut record = RunRecord::new();
        assert_eq!(record_run_number(&record), None);
        record.insert(RUN_NUMBER_FIELD.to_string(), "17".into());
        assert_eq!(record_run_number(&record), Some(17));
        record.insert(RUN_NUMBER_FIELD.to_string(), 18i64.into());
        assert_eq!(record_run_number(&record), Some(18));
    }
}
