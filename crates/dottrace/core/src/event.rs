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

//! Trace event model and event sources.
//!
//! The analysis core treats the trace as an opaque, replayable stream of
//! timestamped records. Builders iterate it from the beginning on every
//! build; a source must therefore hand out a fresh iterator per call.

use dottrace_common::{TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single timestamped trace record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Trace-relative timestamp in nanoseconds
    pub timestamp: Timestamp,
    /// Event type name, the categorical key of the statistics breakdown
    pub name: String,
    /// Free-form payload fields
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl TraceEvent {
    /// Creates an event without payload fields.
    pub fn new(timestamp: Timestamp, name: impl Into<String>) -> Self {
        Self {
            timestamp,
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }
}

/// A replayable, sequential stream of trace events.
///
/// Implementations must return events in non-decreasing timestamp order and
/// must support any number of independent passes.
pub trait EventSource: Send + Sync {
    /// Display name of the trace, also the stem of its supplementary
    /// directory.
    fn name(&self) -> &str;

    /// Time span covered by the trace, `None` when it holds no events.
    fn time_range(&self) -> Option<TimeRange>;

    /// A fresh pass over the whole event stream.
    fn iter(&self) -> Box<dyn Iterator<Item = TraceEvent> + Send + '_>;
}

/// In-memory event source backed by a sorted vector.
///
/// The canonical source for tests and for traces small enough to load
/// whole, e.g. the JSON traces the CLI consumes.
#[derive(Debug, Clone)]
pub struct RecordedTrace {
    name: String,
    events: Vec<TraceEvent>,
}

impl RecordedTrace {
    /// Creates a trace from unordered events; they are sorted by timestamp.
    pub fn new(name: impl Into<String>, mut events: Vec<TraceEvent>) -> Self {
        events.sort_by_key(|event| event.timestamp);
        Self { name: name.into(), events }
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the trace holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSource for RecordedTrace {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_range(&self) -> Option<TimeRange> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => Some(TimeRange::new(first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TraceEvent> + Send + '_> {
        Box::new(self.events.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_sorted_on_construction() {
        let trace = RecordedTrace::new(
            "scrambled",
            vec![
                TraceEvent::new(30, "c"),
                TraceEvent::new(10, "a"),
                TraceEvent::new(20, "b"),
            ],
        );

        let names: Vec<String> = trace.iter().map(|event| event.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(trace.time_range(), Some(TimeRange::new(10, 30)));
    }

    #[test]
    fn test_empty_trace_has_no_range() {
        let trace = RecordedTrace::new("empty", Vec::new());
        assert!(trace.is_empty());
        assert_eq!(trace.time_range(), None);
    }

    #[test]
    fn test_iter_is_replayable() {
        let trace = RecordedTrace::new("replay", vec![TraceEvent::new(1, "x")]);
        assert_eq!(trace.iter().count(), 1);
        assert_eq!(trace.iter().count(), 1);
    }
}
