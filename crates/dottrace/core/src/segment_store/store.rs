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

use super::segment::Segment;
use dottrace_common::TimeRange;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared segment container with single-writer append and snapshot reads.
///
/// The builder is the only appender; any number of readers may take
/// snapshots while appends continue. Segments are stored behind `Arc`, so
/// a snapshot is a cheap pointer copy and a reader can never observe a
/// half-written segment.
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: RwLock<Vec<Arc<Segment>>>,
}

impl SegmentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `segments`, e.g. from an artifact.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self {
            segments: RwLock::new(segments.into_iter().map(Arc::new).collect()),
        }
    }

    /// Appends a batch and returns the shared handles just added.
    pub fn append_batch(&self, batch: Vec<Segment>) -> Vec<Arc<Segment>> {
        let added: Vec<Arc<Segment>> = batch.into_iter().map(Arc::new).collect();
        self.segments.write().extend(added.iter().cloned());
        added
    }

    /// Point-in-time view of every segment appended so far.
    pub fn snapshot(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    /// Segments intersecting `range`, in append order.
    pub fn intersecting(&self, range: TimeRange) -> Vec<Arc<Segment>> {
        self.segments
            .read()
            .iter()
            .filter(|segment| TimeRange::new(segment.start, segment.end).intersects(&range))
            .cloned()
            .collect()
    }

    /// Number of committed segments.
    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    /// Whether no segment was committed yet.
    pub fn is_empty(&self) -> bool {
        self.segments.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_snapshot_is_stable_under_append() {
        let store = SegmentStore::new();
        store.append_batch(vec![Segment::new("a", 0, 1)]);

        let snapshot = store.snapshot();
        store.append_batch(vec![Segment::new("b", 1, 2)]);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_intersecting_filters_by_range() {
        let store = SegmentStore::from_segments(vec![
            Segment::new("a", 0, 10),
            Segment::new("b", 20, 30),
        ]);

        let hits = store.intersecting(TimeRange::new(5, 15));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "a");
    }

    #[test]
    fn test_concurrent_append_and_read() {
        let store = Arc::new(SegmentStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for index in 0..100i64 {
                    store.append_batch(vec![Segment::new(format!("seg-{index}"), index, index + 1)]);
                }
            })
        };

        // readers only ever see whole segments
        for _ in 0..50 {
            for segment in store.snapshot() {
                assert!(segment.name.starts_with("seg-"));
                assert_eq!(segment.end, segment.start + 1);
            }
        }
        writer.join().unwrap();
        assert_eq!(store.len(), 100);
    }
}
