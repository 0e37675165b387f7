//! Run-number coverage tracking.
//!
//! A journal's coverage is a set of inclusive, non-overlapping,
//! non-adjacent ranges sorted by their upper bound.

use serde::Serialize;

/// An inclusive range of run numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunRange {
    pub first: i64,
    pub last: i64,
}

impl RunRange {
    /// Creates a range covering a single run.
    pub fn single(value: i64) -> Self {
        Self {
            first: value,
            last: value,
        }
    }

    /// Grows the range by one if `value` touches either end.
    ///
    /// Only strict contiguity counts; values already inside or further away
    /// are rejected.
    pub fn extend_with(&mut self, value: i64) -> bool {
        if value == self.first.wrapping_sub(1) {
            self.first = value;
            true
        } else if value == self.last.wrapping_add(1) {
            self.last = value;
            true
        } else {
            false
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.first <= value && value <= self.last
    }
}

/// Merged coverage of a journal's run numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunRangeSet {
    ranges: Vec<RunRange>,
}

impl RunRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from any collection of run numbers.
    pub fn from_runs<I>(runs: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut set = Self::new();
        set.rebuild(runs);
        set
    }

    /// Offers `value` to the existing ranges; returns whether one grew.
    pub fn extend_with(&mut self, value: i64) -> bool {
        self.ranges.iter_mut().any(|range| range.extend_with(value))
    }

    /// Clears the set and folds every value back in.
    pub fn rebuild<I>(&mut self, runs: I)
    where
        I: IntoIterator<Item = i64>,
    {
        self.ranges.clear();
        let mut values = runs.into_iter().collect::<Vec<_>>();
        // Folding in ascending order means each value touches the tail of the
        // last range or starts a new one, so adjacency never survives.
        values.sort_unstable();
        values.dedup();
        for value in values {
            if self.contains(value) || self.extend_with(value) {
                continue;
            }
            self.ranges.push(RunRange::single(value));
        }
        self.ranges.sort_by_key(|range| range.last);
    }

    pub fn first_run(&self) -> Option<i64> {
        self.ranges.first().map(|range| range.first)
    }

    pub fn last_run(&self) -> Option<i64> {
        self.ranges.last().map(|range| range.last)
    }

    pub fn contains(&self, value: i64) -> bool {
        self.ranges.iter().any(|range| range.contains(value))
    }

    pub fn ranges(&self) -> &[RunRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Enumerates every covered run number in ascending order.
    pub fn runs(&self) -> impl Iterator<Item = i64> + '_ {
        self.ranges.iter().flat_map(|range| range.first..=range.last)
    }
}
