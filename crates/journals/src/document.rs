//! Index and run document parsing.
//!
//! An index document lists journals:
//!
//! ```xml
//! <journal>
//!   <file name="journal_19_1.xml" display_name="Cycle 19/1"/>
//!   <file name="journal_19_2.xml"/>
//! </journal>
//! ```
//!
//! A run document holds one element per run, whose children are the run's
//! fields. Field elements may be namespace-qualified; only the local name is
//! kept.

use roxmltree::{Document, Node, ParsingOptions};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::types::{record_run_number, FieldValue, RunRecord, RunTable};

/// One journal listed by an index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub filename: String,
    pub display_name: String,
    pub data_directory: String,
}

/// Fallbacks for index entries without explicit attributes.
#[derive(Debug, Clone)]
pub struct EntryDefaults<'a> {
    pub instrument: Option<&'a str>,
    pub archive_data_root: &'a str,
    /// Entry name that never denotes a journal.
    pub sentinel: &'a str,
}

impl IndexEntry {
    pub fn with_defaults(filename: &str, defaults: &EntryDefaults<'_>) -> Self {
        Self {
            filename: filename.to_string(),
            display_name: default_display_name(filename),
            data_directory: default_data_directory(
                filename,
                defaults.instrument,
                defaults.archive_data_root,
            ),
        }
    }
}

/// `journal_19_1.xml` becomes `Cycle 19 1`.
pub fn default_display_name(filename: &str) -> String {
    let renamed = filename.replace("journal", "Cycle");
    renamed
        .strip_suffix(".xml")
        .unwrap_or(&renamed)
        .replace('_', " ")
}

/// Conventional archive folder for the cycle a journal file names.
pub fn default_data_directory(
    filename: &str,
    instrument: Option<&str>,
    archive_data_root: &str,
) -> String {
    let stem = filename.strip_suffix(".xml").unwrap_or(filename);
    let cycle = stem.strip_prefix("journal_").unwrap_or(stem);
    let root = archive_data_root.trim_end_matches(['/', '\\']);
    match instrument {
        Some(instrument) => format!(
            "{root}/NDX{}/Instrument/data/cycle_{cycle}",
            instrument.to_ascii_uppercase()
        ),
        None => format!("{root}/data/cycle_{cycle}"),
    }
}

fn parse_xml<'a>(bytes: &'a [u8], location: &str) -> Result<Document<'a>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|error| JournalError::parse(location, format!("invalid UTF-8: {error}")))?;
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options)
        .map_err(|error| JournalError::parse(location, error))
}

/// Parses an index document into entries, in document order.
pub fn parse_index_document(
    bytes: &[u8],
    location: &str,
    defaults: &EntryDefaults<'_>,
) -> Result<Vec<IndexEntry>> {
    let document = parse_xml(bytes, location)?;
    let mut entries = Vec::new();

    for node in document.root_element().children().filter(Node::is_element) {
        if node.tag_name().name() != "file" {
            continue;
        }
        let Some(filename) = node.attribute("name") else {
            return Err(JournalError::parse(
                location,
                format!("file entry without name at byte {}", node.range().start),
            ));
        };
        if filename == defaults.sentinel {
            continue;
        }

        let mut entry = IndexEntry::with_defaults(filename, defaults);
        if let Some(display_name) = node.attribute("display_name") {
            entry.display_name = display_name.to_string();
        }
        if let Some(data_directory) = node.attribute("data_directory") {
            entry.data_directory = data_directory.to_string();
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Parses a run document into a table keyed by run number.
///
/// A record without a usable `run_number` is a schema violation and fails
/// the whole document.
pub fn parse_run_document(bytes: &[u8], location: &str) -> Result<RunTable> {
    let document = parse_xml(bytes, location)?;
    let mut table = RunTable::new();

    for (position, node) in document
        .root_element()
        .children()
        .filter(Node::is_element)
        .enumerate()
    {
        let record = parse_record(node);
        let Some(run_number) = record_run_number(&record) else {
            let identity = node
                .attribute("name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{position}"));
            return Err(JournalError::Schema {
                location: location.to_string(),
                record: identity,
            });
        };
        table.insert(run_number, record);
    }

    Ok(table)
}

fn parse_record(node: Node<'_, '_>) -> RunRecord {
    let mut record = RunRecord::new();
    if let Some(name) = node.attribute("name") {
        record.insert("name".to_string(), FieldValue::from(name));
    }
    for field in node.children().filter(Node::is_element) {
        let value = field.text().map(str::trim).unwrap_or_default();
        record.insert(field_name(field), FieldValue::from(value));
    }
    record
}

/// Local name of an element. The parser resolves any namespace prefix.
fn field_name(node: Node<'_, '_>) -> String {
    node.tag_name().name().to_string()
}
