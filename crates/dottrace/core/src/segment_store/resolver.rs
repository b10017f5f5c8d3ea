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

//! The derivation seam of the segment-store stage.

use super::segment::{Segment, SegmentValue};
use crate::state_system::StateSystem;

/// Derives segments from a built interval store.
///
/// The derivation must be deterministic with respect to the store's
/// committed contents; the builder owns batching, listener notification
/// and cancellation around it.
pub trait SegmentResolver: Send {
    /// Produces every segment implied by `store`.
    fn resolve(&mut self, store: &StateSystem) -> Vec<Segment>;
}

/// Default resolver: one segment per category attribute, spanning the
/// attribute's recorded activity and carrying its final count.
#[derive(Debug, Default)]
pub struct CategorySegmentResolver;

impl CategorySegmentResolver {
    /// Content key of the per-category count.
    pub const COUNT_KEY: &'static str = "count";
}

impl SegmentResolver for CategorySegmentResolver {
    fn resolve(&mut self, store: &StateSystem) -> Vec<Segment> {
        let mut segments = Vec::new();
        for (attribute, path) in store.attributes() {
            let intervals = store.intervals(attribute);
            let (Some(first), Some(last)) = (intervals.first(), intervals.last()) else {
                continue;
            };
            let count = last.value.as_int().unwrap_or(0);
            segments.push(
                Segment::new(path, first.start, last.end)
                    .with_content(Self::COUNT_KEY, SegmentValue::Num(count)),
            );
        }
        segments.sort_by(|a, b| (a.start, a.end, &a.name).cmp(&(b.start, b.end, &b.name)));
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_system::{StateSystem, StateValue};

    #[test]
    fn test_category_resolver_emits_one_segment_per_attribute() {
        let (system, mut writer) = StateSystem::begin("event-types", 0);
        writer.modify_attribute("alpha", StateValue::Int(1), 10);
        writer.modify_attribute("alpha", StateValue::Int(2), 30);
        writer.modify_attribute("beta", StateValue::Int(1), 20);
        writer.close(40);
        writer.seal_built();

        let mut resolver = CategorySegmentResolver;
        let segments = resolver.resolve(&system);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "alpha");
        assert_eq!(segments[0].start, 10);
        assert_eq!(segments[0].end, 40);
        assert_eq!(
            segments[0].content.get(CategorySegmentResolver::COUNT_KEY),
            Some(&SegmentValue::Num(2))
        );
        assert_eq!(segments[1].name, "beta");
        assert_eq!(
            segments[1].content.get(CategorySegmentResolver::COUNT_KEY),
            Some(&SegmentValue::Num(1))
        );
    }

    #[test]
    fn test_empty_store_yields_no_segments() {
        let (system, writer) = StateSystem::begin("event-types", 0);
        writer.seal_built();
        assert!(CategorySegmentResolver.resolve(&system).is_empty());
    }
}
