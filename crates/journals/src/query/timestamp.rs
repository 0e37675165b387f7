//! Timestamp range predicate parsing and matching.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// A parsed `START-END` date range, inclusive of both whole days.
///
/// Dates use the configured query format (`%Y/%m/%d` by default). A single
/// date selects that day. Malformed input matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampPredicate {
    /// Half-open `[start, end)` bounds; `None` when the input was malformed.
    bounds: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl TimestampPredicate {
    pub fn parse(raw: &str, date_format: &str) -> Self {
        let trimmed = raw.trim();
        let bounds = parse_dates(trimmed, date_format).and_then(|(start, end)| {
            Some((
                start.and_hms_opt(0, 0, 0)?,
                end.succ_opt()?.and_hms_opt(0, 0, 0)?,
            ))
        });
        if bounds.is_none() {
            log::debug!("malformed timestamp predicate {trimmed:?}");
        }
        Self { bounds }
    }

    pub fn is_satisfiable(&self) -> bool {
        self.bounds.is_some_and(|(start, end)| start < end)
    }

    /// Matches a record value stored in `record_format`.
    pub fn matches(&self, value: &str, record_format: &str) -> bool {
        let Some((start, end)) = self.bounds else {
            return false;
        };
        match parse_record_timestamp(value.trim(), record_format) {
            Some(timestamp) => start <= timestamp && timestamp < end,
            None => false,
        }
    }
}

fn parse_dates(raw: &str, format: &str) -> Option<(NaiveDate, NaiveDate)> {
    for (split, _) in raw.match_indices('-') {
        let start = NaiveDate::parse_from_str(raw[..split].trim(), format);
        let end = NaiveDate::parse_from_str(raw[split + 1..].trim(), format);
        if let (Ok(start), Ok(end)) = (start, end) {
            return Some((start, end));
        }
    }
    let day = NaiveDate::parse_from_str(raw, format).ok()?;
    Some((day, day))
}

fn parse_record_timestamp(value: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
        return Some(timestamp);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.naive_local());
    }
    NaiveDate::parse_from_str(value, format)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
}
