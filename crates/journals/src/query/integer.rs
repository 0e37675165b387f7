//! Integer predicate parsing and matching.

/// A parsed integer field predicate.
///
/// Accepted syntax: `A-B` (inclusive), `<N`, `>N` and a bare `N`. Anything
/// else parses to a predicate that matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerPredicate {
    kind: IntegerPredicateKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntegerPredicateKind {
    Range { min: i64, max: i64 },
    Less(i64),
    Greater(i64),
    Equal(i64),
    Never,
}

impl IntegerPredicate {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let kind = parse_kind(trimmed).unwrap_or_else(|| {
            log::debug!("malformed integer predicate {trimmed:?}");
            IntegerPredicateKind::Never
        });
        Self { kind }
    }

    /// Whether the predicate can match anything at all.
    pub fn is_satisfiable(&self) -> bool {
        match self.kind {
            IntegerPredicateKind::Range { min, max } => min <= max,
            IntegerPredicateKind::Never => false,
            _ => true,
        }
    }

    pub fn matches(&self, value: i64) -> bool {
        match self.kind {
            IntegerPredicateKind::Range { min, max } => min <= value && value <= max,
            IntegerPredicateKind::Less(bound) => value < bound,
            IntegerPredicateKind::Greater(bound) => value > bound,
            IntegerPredicateKind::Equal(expected) => value == expected,
            IntegerPredicateKind::Never => false,
        }
    }
}

fn parse_kind(raw: &str) -> Option<IntegerPredicateKind> {
    if let Some(bound) = raw.strip_prefix('<') {
        return parse_literal(bound).map(IntegerPredicateKind::Less);
    }
    if let Some(bound) = raw.strip_prefix('>') {
        return parse_literal(bound).map(IntegerPredicateKind::Greater);
    }
    // A leading '-' is a sign, not a range separator.
    if let Some(split) = raw.get(1..).and_then(|rest| rest.find('-')) {
        let (start, end) = (&raw[..split + 1], &raw[split + 2..]);
        return Some(IntegerPredicateKind::Range {
            min: parse_literal(start)?,
            max: parse_literal(end)?,
        });
    }
    parse_literal(raw).map(IntegerPredicateKind::Equal)
}

fn parse_literal(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_comparisons() {
        let range = IntegerPredicate::parse("10-20");
        assert!(range.matches(10));
        assert!(range.matches(20));
        assert!(!range.matches(21));

        assert!(IntegerPredicate::parse("<5").matches(4));
        assert!(!IntegerPredicate::parse("<5").matches(5));
        assert!(IntegerPredicate::parse(">5").matches(6));
        assert!(!IntegerPredicate::parse(">5").matches(5));
        assert!(IntegerPredicate::parse(" 42 ").matches(42));
        assert!(IntegerPredicate::parse("-3").matches(-3));
        assert!(IntegerPredicate::parse("-3--1").matches(-2));
    }

    #[test]
    fn malformed_input_matches_nothing() {
        for raw in ["abc-10", "", "<", ">x", "1-", "1-2-3", "12a"] {
            let predicate = IntegerPredicate::parse(raw);
            assert!(!predicate.is_satisfiable(), "{raw:?}");
            assert!(!predicate.matches(10), "{raw:?}");
        }
    }

    #[test]
    fn inverted_range_is_empty() {
        let predicate = IntegerPredicate::parse("20-10");
        assert!(!predicate.is_satisfiable());
        assert!(!predicate.matches(15));
    }
}
