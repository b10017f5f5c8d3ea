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

use dottrace_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value carried by one segment content field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentValue {
    /// String payload
    Str(String),
    /// Numeric payload
    Num(i64),
}

impl fmt::Display for SegmentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentValue::Str(value) => write!(f, "{value}"),
            SegmentValue::Num(value) => write!(f, "{value}"),
        }
    }
}

/// A named, time-bounded record derived from the interval store.
///
/// Segments are immutable once appended to a store; consumers share them
/// by `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment name, e.g. the category it was derived from
    pub name: String,
    /// Inclusive start time
    pub start: Timestamp,
    /// Inclusive end time
    pub end: Timestamp,
    /// Key/value content attached at derivation time
    pub content: BTreeMap<String, SegmentValue>,
}

impl Segment {
    /// Creates a segment without content fields.
    pub fn new(name: impl Into<String>, start: Timestamp, end: Timestamp) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            content: BTreeMap::new(),
        }
    }

    /// Adds one content field, builder style.
    pub fn with_content(mut self, key: impl Into<String>, value: SegmentValue) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    /// Segment length in nanoseconds.
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Content rendered as `key=value` pairs, comma separated.
    pub fn content_string(&self) -> String {
        self.content
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_string_is_sorted_by_key() {
        let segment = Segment::new("req", 0, 10)
            .with_content("count", SegmentValue::Num(3))
            .with_content("actor", SegmentValue::Str("alpha".into()));
        assert_eq!(segment.content_string(), "actor=alpha, count=3");
        assert_eq!(segment.duration(), 10);
    }
}
