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
use std::sync::Arc;

/// Handle identifying a registered listener, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Progress callback of the segment-store build.
///
/// Each registered listener receives every appended batch at least once,
/// in append order; no ordering is guaranteed across listeners. Listeners
/// may be registered and removed while construction is active.
pub trait SegmentListener: Send + Sync {
    /// Called after a batch of segments was committed to the store.
    fn on_new_segments(&self, batch: &[Arc<Segment>]);
}
