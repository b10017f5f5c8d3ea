// Dottrace
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};

/// Trace-relative timestamp in nanoseconds.
///
/// Events and intervals are ordered by this value; it is never interpreted
/// as wall-clock time.
pub type Timestamp = i64;

/// A closed `[start, end]` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive range start
    pub start: Timestamp,
    /// Inclusive range end
    pub end: Timestamp,
}

impl TimeRange {
    /// Creates a new range. `start` must not be greater than `end`.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start <= end, "inverted time range {start}..{end}");
        Self { start, end }
    }

    /// Whether `t` falls inside this range, bounds included.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    /// Whether the two ranges share at least one timestamp.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Range length in nanoseconds.
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_bounds() {
        let range = TimeRange::new(10, 20);
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
    }

    #[test]
    fn test_intersects() {
        let range = TimeRange::new(10, 20);
        assert!(range.intersects(&TimeRange::new(20, 30)));
        assert!(range.intersects(&TimeRange::new(0, 10)));
        assert!(range.intersects(&TimeRange::new(12, 15)));
        assert!(!range.intersects(&TimeRange::new(21, 30)));
    }

    #[test]
    fn test_duration() {
        assert_eq!(TimeRange::new(5, 25).duration(), 20);
        assert_eq!(TimeRange::new(7, 7).duration(), 0);
    }
}
