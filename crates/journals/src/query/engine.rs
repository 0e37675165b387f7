//! Search requests and their evaluation against a run table.

use crate::config::FieldSchemaConfig;
use crate::types::{FieldValue, RunTable};

use super::integer::IntegerPredicate;
use super::timestamp::TimestampPredicate;

/// How a field's query value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Substring containment.
    Text,
    /// Whole-value equality, for identifier-like fields.
    Exact,
    Integer,
    Timestamp,
}

/// Ordered `field -> value` terms plus the case-sensitivity flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    terms: Vec<(String, String)>,
    case_sensitive: bool,
}

impl SearchRequest {
    pub fn new(terms: Vec<(String, String)>) -> Self {
        Self {
            terms,
            case_sensitive: false,
        }
    }

    /// Builds a request from raw query pairs, consuming `reserved_key` as the
    /// case-sensitivity toggle instead of treating it as a field.
    pub fn from_pairs<I, K, V>(pairs: I, reserved_key: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::default();
        for (field, value) in pairs {
            let (field, value) = (field.into(), value.into());
            if field == reserved_key {
                request.case_sensitive = is_truthy(&value);
            } else {
                request.terms.push((field, value));
            }
        }
        request
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn terms(&self) -> &[(String, String)] {
        &self.terms
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone)]
enum FieldPredicate {
    Contains(String),
    Exact(String),
    Integer(IntegerPredicate),
    Timestamp(TimestampPredicate),
}

impl FieldPredicate {
    fn is_satisfiable(&self) -> bool {
        match self {
            Self::Contains(_) | Self::Exact(_) => true,
            Self::Integer(predicate) => predicate.is_satisfiable(),
            Self::Timestamp(predicate) => predicate.is_satisfiable(),
        }
    }
}

/// A compiled term.
#[derive(Debug, Clone)]
struct Term<'a> {
    field: &'a str,
    predicate: FieldPredicate,
}

/// Evaluates search requests using a field schema.
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    schema: FieldSchemaConfig,
}

impl QueryEngine {
    pub fn new(schema: FieldSchemaConfig) -> Self {
        Self { schema }
    }

    pub fn field_kind(&self, field: &str) -> FieldKind {
        if self.schema.integer_fields.contains(field) {
            FieldKind::Integer
        } else if self.schema.timestamp_fields.contains(field) {
            FieldKind::Timestamp
        } else if self.schema.exact_fields.contains(field) {
            FieldKind::Exact
        } else {
            FieldKind::Text
        }
    }

    pub fn search(&self, table: &RunTable, request: &SearchRequest) -> RunTable {
        self.search_terms(table, request.terms(), request.is_case_sensitive())
    }

    /// Filters `table` by every term in order. Each term only sees the runs
    /// that survived the previous ones. A request without terms keeps every
    /// run.
    pub fn search_terms(
        &self,
        table: &RunTable,
        terms: &[(String, String)],
        case_sensitive: bool,
    ) -> RunTable {
        let compiled = terms
            .iter()
            .map(|(field, value)| self.compile(field, value, case_sensitive))
            .collect::<Vec<_>>();
        if compiled.iter().any(|term| !term.predicate.is_satisfiable()) {
            return RunTable::new();
        }

        let mut survivors = table.keys().copied().collect::<Vec<_>>();
        for term in &compiled {
            if survivors.is_empty() {
                break;
            }
            survivors.retain(|run| {
                let value = table.get(run).and_then(|record| record.get(term.field));
                self.matches(&term.predicate, value, case_sensitive)
            });
        }

        survivors
            .into_iter()
            .filter_map(|run| table.get(&run).map(|record| (run, record.clone())))
            .collect()
    }

    fn compile<'a>(&self, field: &'a str, value: &str, case_sensitive: bool) -> Term<'a> {
        let predicate = match self.field_kind(field) {
            FieldKind::Text => FieldPredicate::Contains(fold(value.trim(), case_sensitive)),
            FieldKind::Exact => FieldPredicate::Exact(fold(value.trim(), case_sensitive)),
            FieldKind::Integer => FieldPredicate::Integer(IntegerPredicate::parse(value)),
            FieldKind::Timestamp => FieldPredicate::Timestamp(TimestampPredicate::parse(
                value,
                &self.schema.query_date_format,
            )),
        };
        Term { field, predicate }
    }

    fn matches(
        &self,
        predicate: &FieldPredicate,
        value: Option<&FieldValue>,
        case_sensitive: bool,
    ) -> bool {
        let Some(value) = value else {
            return false;
        };
        match predicate {
            FieldPredicate::Contains(needle) => {
                fold(&value.as_text(), case_sensitive).contains(needle.as_str())
            }
            FieldPredicate::Exact(expected) => {
                fold(value.as_text().trim(), case_sensitive) == *expected
            }
            FieldPredicate::Integer(predicate) => value
                .as_integer()
                .is_some_and(|number| predicate.matches(number)),
            FieldPredicate::Timestamp(predicate) => {
                predicate.matches(&value.as_text(), &self.schema.timestamp_format)
            }
        }
    }
}

fn fold(value: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        value.to_string()
    } else {
        value.to_lowercase()
    }
}
