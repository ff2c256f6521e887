//! Finite integer domains as sorted disjoint closed intervals.

/// Set of `i64` values a variable may take, stored as sorted, disjoint, non-adjacent
/// closed intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Domain {
    intervals: Vec<(i64, i64)>,
}

impl Domain {
    /// The empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Closed range `[lower_bound, upper_bound]`; empty when the bounds cross.
    #[must_use]
    pub fn from_bounds(lower_bound: i64, upper_bound: i64) -> Self {
        if lower_bound > upper_bound {
            Self::empty()
        } else {
            Self {
                intervals: vec![(lower_bound, upper_bound)],
            }
        }
    }

    /// Single-value domain.
    #[must_use]
    pub fn constant(value: i64) -> Self {
        Self::from_bounds(value, value)
    }

    /// Domain holding exactly the provided values; duplicates are ignored and runs of
    /// consecutive values collapse into one interval.
    #[must_use]
    pub fn from_values(values: &[i64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut intervals: Vec<(i64, i64)> = Vec::new();
        for value in sorted {
            if let Some(last) = intervals.last_mut()
                && last.1 + 1 == value
            {
                last.1 = value;
            } else {
                intervals.push((value, value));
            }
        }
        Self { intervals }
    }

    /// Copy of this domain with every value moved by `offset`.
    #[must_use]
    pub fn shifted(&self, offset: i64) -> Self {
        Self {
            intervals: self
                .intervals
                .iter()
                .map(|&(lo, hi)| (lo + offset, hi + offset))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Smallest member, if any.
    #[must_use]
    pub fn min(&self) -> Option<i64> {
        self.intervals.first().map(|&(lo, _)| lo)
    }

    /// Largest member, if any.
    #[must_use]
    pub fn max(&self) -> Option<i64> {
        self.intervals.last().map(|&(_, hi)| hi)
    }

    /// Number of members, saturating at `u64::MAX`.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.intervals.iter().fold(0u64, |acc, &(lo, hi)| {
            acc.saturating_add((hi.wrapping_sub(lo) as u64).saturating_add(1))
        })
    }

    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        self.intervals
            .iter()
            .any(|&(lo, hi)| lo <= value && value <= hi)
    }

    /// Whether exactly one value remains.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self.intervals.as_slice(), [(lo, hi)] if lo == hi)
    }

    /// The single remaining value, if the domain is fixed.
    #[must_use]
    pub fn fixed_value(&self) -> Option<i64> {
        match self.intervals.as_slice() {
            [(lo, hi)] if lo == hi => Some(*lo),
            _ => None,
        }
    }

    /// Removes one value. Returns whether the domain changed.
    pub fn remove(&mut self, value: i64) -> bool {
        let Some(position) = self
            .intervals
            .iter()
            .position(|&(lo, hi)| lo <= value && value <= hi)
        else {
            return false;
        };
        let (lo, hi) = self.intervals[position];
        if lo == hi {
            let _ = self.intervals.remove(position);
        } else if value == lo {
            self.intervals[position].0 = lo + 1;
        } else if value == hi {
            self.intervals[position].1 = hi - 1;
        } else {
            self.intervals[position].1 = value - 1;
            self.intervals.insert(position + 1, (value + 1, hi));
        }
        true
    }

    /// Drops every value greater than `bound`. Returns whether the domain changed.
    pub fn retain_below(&mut self, bound: i64) -> bool {
        let mut changed = false;
        while let Some(&(lo, hi)) = self.intervals.last() {
            if lo > bound {
                let _ = self.intervals.pop();
                changed = true;
            } else {
                if hi > bound {
                    let last = self.intervals.len() - 1;
                    self.intervals[last].1 = bound;
                    changed = true;
                }
                break;
            }
        }
        changed
    }

    /// Drops every value smaller than `bound`. Returns whether the domain changed.
    pub fn retain_above(&mut self, bound: i64) -> bool {
        let mut changed = false;
        while let Some(&(lo, hi)) = self.intervals.first() {
            if hi < bound {
                let _ = self.intervals.remove(0);
                changed = true;
            } else {
                if lo < bound {
                    self.intervals[0].0 = bound;
                    changed = true;
                }
                break;
            }
        }
        changed
    }

    /// Reduces the domain to `{value}`, or to the empty set when `value` is not a member.
    /// Returns whether the domain changed.
    pub fn fix(&mut self, value: i64) -> bool {
        if self.contains(value) {
            if self.is_fixed() {
                return false;
            }
            self.intervals = vec![(value, value)];
        } else {
            if self.intervals.is_empty() {
                return false;
            }
            self.intervals.clear();
        }
        true
    }

    /// Members in ascending order.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.intervals.iter().flat_map(|&(lo, hi)| lo..=hi)
    }

    /// Raw interval view, sorted and disjoint.
    #[must_use]
    pub fn intervals(&self) -> &[(i64, i64)] {
        &self.intervals
    }
}
